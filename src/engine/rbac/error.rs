//! RBAC Error Types

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use super::{ModuleId, RoleId};

/// Kind of a rejected field in an access payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeErrorKind {
    InvalidFormat,
    ModuleUnavailable,
    #[serde(rename = "module_insufficient_perms")]
    InsufficientPermissions,
    UnknownAction,
    InvalidActionPermission,
}

impl DecodeErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            DecodeErrorKind::InvalidFormat => "invalid_format",
            DecodeErrorKind::ModuleUnavailable => "module_unavailable",
            DecodeErrorKind::InsufficientPermissions => "module_insufficient_perms",
            DecodeErrorKind::UnknownAction => "unknown_action",
            DecodeErrorKind::InvalidActionPermission => "invalid_action_permission",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            DecodeErrorKind::InvalidFormat => "Format of the data is not valid",
            DecodeErrorKind::ModuleUnavailable => "Module Not Available",
            DecodeErrorKind::InsufficientPermissions => {
                "Permission is not specified for all actions of a module"
            }
            DecodeErrorKind::UnknownAction => "Unknown action specified in data",
            DecodeErrorKind::InvalidActionPermission => {
                "Action permission needs to be boolean or number"
            }
        }
    }
}

/// One offending field. `field` is `module` or `module.action`, empty for the
/// payload root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub kind: DecodeErrorKind,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, kind: DecodeErrorKind) -> Self {
        Self {
            field: field.into(),
            kind,
            message: kind.message().to_string(),
        }
    }
}

/// Every problem found while decoding one payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeError {
    pub errors: Vec<FieldError>,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid access payload: {}", summarize(&self.errors))
    }
}

impl std::error::Error for DecodeError {}

impl DecodeError {
    pub fn has_kind(&self, kind: DecodeErrorKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }

    pub fn kinds(&self) -> Vec<DecodeErrorKind> {
        self.errors.iter().map(|e| e.kind).collect()
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| {
            if e.field.is_empty() {
                e.kind.code().to_string()
            } else {
                format!("{} ({})", e.kind.code(), e.field)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Module not found: {0}")]
    ModuleNotFound(String),
    #[error("Module already exists: {0}")]
    ModuleExists(String),
    #[error("Resource type not found: {0}")]
    ResourceTypeNotFound(String),
    #[error("Resource type already registered: {0}")]
    ResourceTypeExists(String),
    #[error("Resource type {resource_type} already belongs to module {module}")]
    ResourceTypeTaken { resource_type: String, module: String },
    #[error("Invalid resource type '{0}', expected app_label.model")]
    InvalidResourceType(String),
    #[error("Invalid module name: {0:?}")]
    InvalidModuleName(String),
    #[error("Failed to re-project grants: {0}")]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Access bitmask {0} is outside 0..=15")]
    BitmaskOutOfRange(u8),
    #[error("Conflicting access grant for role {role_id} in module {module_id}")]
    ConstraintViolation { role_id: RoleId, module_id: ModuleId },
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Permission store error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Error, Debug)]
pub enum SyncError {
    /// The permission store was not provisioned with a codename implied by
    /// the configured templates.
    #[error("Permission {codename} for resource type {resource_type} is not provisioned")]
    MissingExternalPermission { resource_type: String, codename: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure while applying one (role, module) pair. The pair's transaction has
/// been rolled back.
#[derive(Error, Debug)]
pub enum ApplyError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Error, Debug)]
pub enum RoleError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("Role not found: {0}")]
    NotFound(RoleId),
    #[error("Role name already taken: {0}")]
    NameTaken(String),
    #[error("Invalid role name: {0}")]
    InvalidName(String),
    #[error("Failed to apply access for module {module}: {source}")]
    ApplyFailed {
        module: String,
        #[source]
        source: ApplyError,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("Database error: {0}")]
    Database(#[from] crate::engine::database::DatabaseError),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl RoleError {
    /// True for configuration problems that must not be shown to callers as
    /// a correctable input error.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            RoleError::ApplyFailed {
                source: ApplyError::Sync(SyncError::MissingExternalPermission { .. }),
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_match_serde() {
        for kind in [
            DecodeErrorKind::InvalidFormat,
            DecodeErrorKind::ModuleUnavailable,
            DecodeErrorKind::InsufficientPermissions,
            DecodeErrorKind::UnknownAction,
            DecodeErrorKind::InvalidActionPermission,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::json!(kind.code()));
        }
    }

    #[test]
    fn test_decode_error_display_lists_fields() {
        let err = DecodeError {
            errors: vec![
                FieldError::new("Users", DecodeErrorKind::InsufficientPermissions),
                FieldError::new("Users.extra", DecodeErrorKind::UnknownAction),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("module_insufficient_perms (Users)"));
        assert!(text.contains("unknown_action (Users.extra)"));
    }
}
