//! Permission Codec
//!
//! Translates between the nested `{module: {action: bool}}` payload and one
//! [`AccessMask`] per module.
//!
//! Decoding is pure: it either yields a complete [`DecodedAccess`] or a
//! [`DecodeError`] listing every offending field, and never touches storage.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::action::Action;
use super::error::{DecodeError, DecodeErrorKind, FieldError};
use super::mask::AccessMask;
use super::registry::ModuleRegistry;
use super::AccessGrant;

/// Per-action flags of one module, as shown to clients
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFlags {
    pub read: bool,
    pub create: bool,
    pub update: bool,
    pub delete: bool,
}

impl ActionFlags {
    pub fn get(&self, action: Action) -> bool {
        match action {
            Action::Read => self.read,
            Action::Create => self.create,
            Action::Update => self.update,
            Action::Delete => self.delete,
        }
    }

    pub fn to_mask(self) -> AccessMask {
        AccessMask::from_actions(Action::ALL.into_iter().filter(|a| self.get(*a)))
    }
}

impl From<AccessMask> for ActionFlags {
    fn from(mask: AccessMask) -> Self {
        Self {
            read: mask.contains(Action::Read),
            create: mask.contains(Action::Create),
            update: mask.contains(Action::Update),
            delete: mask.contains(Action::Delete),
        }
    }
}

/// Outbound access representation: module name to action flags
pub type AccessView = BTreeMap<String, ActionFlags>;

/// Validated access payload, one mask per module (masks may be empty)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedAccess(BTreeMap<String, AccessMask>);

impl DecodedAccess {
    pub fn get(&self, module: &str) -> Option<AccessMask> {
        self.0.get(module).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, AccessMask)> {
        self.0.iter().map(|(name, mask)| (name.as_str(), *mask))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, AccessMask)> for DecodedAccess {
    fn from_iter<T: IntoIterator<Item = (String, AccessMask)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

pub struct PermissionCodec<'r> {
    registry: &'r ModuleRegistry,
}

impl<'r> PermissionCodec<'r> {
    pub fn new(registry: &'r ModuleRegistry) -> Self {
        Self { registry }
    }

    /// Validate and decode an inbound access payload
    pub fn decode(&self, data: &Value) -> Result<DecodedAccess, DecodeError> {
        let Value::Object(modules) = data else {
            return Err(DecodeError {
                errors: vec![FieldError::new("", DecodeErrorKind::InvalidFormat)],
            });
        };

        let mut errors = Vec::new();
        let mut decoded = BTreeMap::new();

        for (module, access) in modules {
            let Value::Object(actions) = access else {
                errors.push(FieldError::new(module.as_str(), DecodeErrorKind::InvalidFormat));
                continue;
            };
            if !self.registry.exists(module) {
                errors.push(FieldError::new(module.as_str(), DecodeErrorKind::ModuleUnavailable));
                continue;
            }

            let before = errors.len();
            if Action::ALL.iter().any(|a| !actions.contains_key(a.name())) {
                errors.push(FieldError::new(
                    module.as_str(),
                    DecodeErrorKind::InsufficientPermissions,
                ));
            }

            let mut bits = 0u8;
            for (key, value) in actions {
                let Some(action) = Action::from_name(key) else {
                    errors.push(FieldError::new(
                        format!("{module}.{key}"),
                        DecodeErrorKind::UnknownAction,
                    ));
                    continue;
                };
                match coerce_flag(value) {
                    Some(flag) => bits ^= flag << action.shift(),
                    None => errors.push(FieldError::new(
                        format!("{module}.{key}"),
                        DecodeErrorKind::InvalidActionPermission,
                    )),
                }
            }

            if errors.len() == before {
                // Each action contributes at most its own bit.
                let mask = AccessMask::from_bits(bits).unwrap_or(AccessMask::EMPTY);
                decoded.insert(module.clone(), mask);
            }
        }

        if errors.is_empty() {
            Ok(DecodedAccess(decoded))
        } else {
            Err(DecodeError { errors })
        }
    }

    /// Render a role's grants. Modules without a grant are omitted.
    pub fn encode<'g, I>(grants: I) -> AccessView
    where
        I: IntoIterator<Item = &'g AccessGrant>,
    {
        grants
            .into_iter()
            .filter(|g| !g.mask.is_empty())
            .map(|g| (g.module.clone(), ActionFlags::from(g.mask)))
            .collect()
    }
}

/// Booleans, 0/1 numbers and "0"/"1" strings are accepted
fn coerce_flag(value: &Value) -> Option<u8> {
    let n = match value {
        Value::Bool(b) => i64::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i,
            None => {
                let f = n.as_f64()?;
                if f == 0.0 || f == 1.0 {
                    f as i64
                } else {
                    return None;
                }
            }
        },
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    match n {
        0 => Some(0),
        1 => Some(1),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rbac::registry::ResourceType;
    use serde_json::json;

    fn registry() -> ModuleRegistry {
        ModuleRegistry::builder()
            .module("Users", [ResourceType::new("auth", "user")])
            .module("Billing", [ResourceType::new("billing", "invoice")])
            .build()
            .unwrap()
    }

    fn grant(module: &str, bits: u8) -> AccessGrant {
        AccessGrant {
            role_id: 1,
            module_id: 1,
            module: module.to_string(),
            mask: AccessMask::from_bits(bits).unwrap(),
            updated_at: String::new(),
        }
    }

    fn decode_err(data: Value) -> DecodeError {
        let registry = registry();
        PermissionCodec::new(&registry).decode(&data).unwrap_err()
    }

    #[test]
    fn test_decode_all_actions() {
        let registry = registry();
        let codec = PermissionCodec::new(&registry);
        let decoded = codec
            .decode(&json!({"Users": {"read": 1, "create": 1, "update": 1, "delete": 1}}))
            .unwrap();
        assert_eq!(decoded.get("Users"), Some(AccessMask::ALL));
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn test_decode_bit_positions() {
        let registry = registry();
        let codec = PermissionCodec::new(&registry);
        let decoded = codec
            .decode(&json!({
                "Users": {"read": 1, "create": 0, "update": 1, "delete": 0},
                "Billing": {"read": false, "create": true, "update": false, "delete": true},
            }))
            .unwrap();
        assert_eq!(decoded.get("Users").map(AccessMask::bits), Some(0b0101));
        assert_eq!(decoded.get("Billing").map(AccessMask::bits), Some(0b1010));
    }

    #[test]
    fn test_decode_all_false_is_empty_mask() {
        let registry = registry();
        let decoded = PermissionCodec::new(&registry)
            .decode(&json!({"Users": {"read": 0, "create": 0, "update": 0, "delete": 0}}))
            .unwrap();
        assert_eq!(decoded.get("Users"), Some(AccessMask::EMPTY));
    }

    #[test]
    fn test_decode_empty_payload() {
        let registry = registry();
        let decoded = PermissionCodec::new(&registry).decode(&json!({})).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_non_object_payload() {
        for data in [json!([]), json!("Users"), json!(3), Value::Null] {
            let err = decode_err(data);
            assert_eq!(err.kinds(), vec![DecodeErrorKind::InvalidFormat]);
        }
    }

    #[test]
    fn test_module_value_not_object() {
        let err = decode_err(json!({"Users": "invalid"}));
        assert_eq!(err.kinds(), vec![DecodeErrorKind::InvalidFormat]);
        assert_eq!(err.errors[0].field, "Users");
    }

    #[test]
    fn test_unknown_module_regardless_of_content() {
        let err = decode_err(json!({"UnknownModule": {"read": 1, "create": 1, "update": 1, "delete": 1}}));
        assert_eq!(err.kinds(), vec![DecodeErrorKind::ModuleUnavailable]);

        let err = decode_err(json!({"UnknownModule": {"bogus": "yes"}}));
        assert_eq!(err.kinds(), vec![DecodeErrorKind::ModuleUnavailable]);
    }

    #[test]
    fn test_missing_actions() {
        let err = decode_err(json!({"Users": {"read": 1}}));
        assert_eq!(err.kinds(), vec![DecodeErrorKind::InsufficientPermissions]);
        assert_eq!(err.errors[0].field, "Users");
    }

    #[test]
    fn test_extra_action() {
        let err = decode_err(json!({
            "Users": {"read": 1, "create": 1, "update": 1, "delete": 1, "extra": 1}
        }));
        assert_eq!(err.kinds(), vec![DecodeErrorKind::UnknownAction]);
        assert_eq!(err.errors[0].field, "Users.extra");
    }

    #[test]
    fn test_invalid_action_values() {
        let err = decode_err(json!({
            "Users": {"read": "yes", "create": "yes", "update": "yes", "delete": "yes"}
        }));
        assert_eq!(err.errors.len(), 4);
        assert!(err.errors.iter().all(|e| e.kind == DecodeErrorKind::InvalidActionPermission));

        // Values other than 0/1 would spill into neighbouring bits.
        let err = decode_err(json!({"Users": {"read": 2, "create": 0, "update": 0, "delete": 0}}));
        assert_eq!(err.kinds(), vec![DecodeErrorKind::InvalidActionPermission]);

        let err = decode_err(json!({"Users": {"read": null, "create": [], "update": {}, "delete": 0.5}}));
        assert_eq!(err.errors.len(), 4);
    }

    #[test]
    fn test_lenient_numeric_forms() {
        let registry = registry();
        let decoded = PermissionCodec::new(&registry)
            .decode(&json!({"Users": {"read": "1", "create": " 0 ", "update": 1.0, "delete": true}}))
            .unwrap();
        assert_eq!(decoded.get("Users").map(AccessMask::bits), Some(0b1101));
    }

    #[test]
    fn test_errors_accumulate_across_modules() {
        let err = decode_err(json!({
            "Billing": {"read": 1},
            "Ghost": {},
            "Users": {"read": 1, "create": 1, "update": "x", "delete": 1, "purge": 1},
        }));
        assert_eq!(
            err.kinds(),
            vec![
                DecodeErrorKind::InsufficientPermissions,
                DecodeErrorKind::ModuleUnavailable,
                DecodeErrorKind::UnknownAction,
                DecodeErrorKind::InvalidActionPermission,
            ]
        );
    }

    #[test]
    fn test_one_bad_module_rejects_payload() {
        let err = decode_err(json!({
            "Billing": {"read": 1, "create": 1, "update": 1, "delete": 1},
            "Users": {"read": 1},
        }));
        assert_eq!(err.errors.len(), 1);
        assert_eq!(err.errors[0].field, "Users");
    }

    #[test]
    fn test_encode_shape() {
        let view = PermissionCodec::encode(&[grant("Users", 0b0101), grant("Billing", 0b0001)]);
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            json!({
                "Billing": {"read": true, "create": false, "update": false, "delete": false},
                "Users": {"read": true, "create": false, "update": true, "delete": false},
            })
        );
    }

    #[test]
    fn test_encode_omits_modules_without_grant() {
        let view = PermissionCodec::encode(&[grant("Users", 0b0011)]);
        assert!(view.contains_key("Users"));
        assert!(!view.contains_key("Billing"));
        assert!(PermissionCodec::encode(&Vec::<AccessGrant>::new()).is_empty());
    }

    #[test]
    fn test_round_trip_every_mask() {
        let registry = registry();
        let codec = PermissionCodec::new(&registry);
        for bits in 1..=15u8 {
            let view = PermissionCodec::encode(&[grant("Users", bits)]);
            let decoded = codec.decode(&serde_json::to_value(&view).unwrap()).unwrap();
            assert_eq!(decoded.get("Users").map(AccessMask::bits), Some(bits));
        }
    }

    #[test]
    fn test_action_flags_mask_conversion() {
        for bits in 0..=15u8 {
            let mask = AccessMask::from_bits(bits).unwrap();
            assert_eq!(ActionFlags::from(mask).to_mask(), mask);
        }
    }
}
