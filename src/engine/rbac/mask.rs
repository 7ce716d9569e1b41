//! Access mask
//!
//! A four-bit set keyed by [`Action`]. This is the value stored per
//! (role, module) pair.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::action::Action;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessMask(u8);

impl AccessMask {
    pub const EMPTY: AccessMask = AccessMask(0);
    pub const ALL: AccessMask = AccessMask(0b1111);

    /// Build a mask from raw bits. Returns `None` above 15.
    pub fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::ALL.0 == 0 {
            Some(Self(bits))
        } else {
            None
        }
    }

    pub fn from_actions<I: IntoIterator<Item = Action>>(actions: I) -> Self {
        actions.into_iter().fold(Self::EMPTY, |mask, a| mask.with(a))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, action: Action) -> bool {
        self.0 & action.bit() != 0
    }

    pub fn insert(&mut self, action: Action) {
        self.0 |= action.bit();
    }

    pub fn remove(&mut self, action: Action) {
        self.0 &= !action.bit();
    }

    pub fn set(&mut self, action: Action, granted: bool) {
        if granted {
            self.insert(action);
        } else {
            self.remove(action);
        }
    }

    pub fn with(mut self, action: Action) -> Self {
        self.insert(action);
        self
    }

    /// Granted actions in bit order
    pub fn iter(self) -> impl Iterator<Item = Action> {
        Action::ALL.into_iter().filter(move |a| self.contains(*a))
    }

    pub fn can_read(self) -> bool {
        self.contains(Action::Read)
    }

    pub fn can_create(self) -> bool {
        self.contains(Action::Create)
    }

    pub fn can_update(self) -> bool {
        self.contains(Action::Update)
    }

    pub fn can_delete(self) -> bool {
        self.contains(Action::Delete)
    }
}

impl fmt::Display for AccessMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.iter().map(Action::name).collect();
        f.write_str(&names.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bits_range() {
        for bits in 0..=15u8 {
            assert_eq!(AccessMask::from_bits(bits).map(|m| m.bits()), Some(bits));
        }
        assert_eq!(AccessMask::from_bits(16), None);
        assert_eq!(AccessMask::from_bits(0xff), None);
    }

    #[test]
    fn test_bit_independence() {
        for bits in 0..=15u8 {
            let original = AccessMask::from_bits(bits).unwrap();
            for action in Action::ALL {
                for granted in [true, false] {
                    let mut mask = original;
                    mask.set(action, granted);
                    assert_eq!(mask.contains(action), granted);
                    for other in Action::ALL.into_iter().filter(|o| *o != action) {
                        assert_eq!(
                            mask.contains(other),
                            original.contains(other),
                            "setting {action} on {bits:#06b} touched {other}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_named_accessors() {
        let mask = AccessMask::from_bits(0b0101).unwrap();
        assert!(mask.can_read());
        assert!(!mask.can_create());
        assert!(mask.can_update());
        assert!(!mask.can_delete());
        assert_eq!(mask.to_string(), "read,update");
        assert_eq!(AccessMask::EMPTY.to_string(), "none");
    }

    #[test]
    fn test_from_actions() {
        let mask = AccessMask::from_actions([Action::Delete, Action::Create]);
        assert_eq!(mask.bits(), 0b1010);
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![Action::Create, Action::Delete]);
        assert_eq!(AccessMask::from_actions(Action::ALL), AccessMask::ALL);
    }
}
