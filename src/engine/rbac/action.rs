//! Action Set
//!
//! The four action kinds a role can hold on a module, each bound to a fixed
//! bit of the access mask.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Action kinds, in bit order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

impl Action {
    /// Every action, ordered by bit position
    pub const ALL: [Action; 4] = [Action::Read, Action::Create, Action::Update, Action::Delete];

    /// Number of defined actions
    pub const COUNT: usize = Self::ALL.len();

    /// Bit position inside an access mask
    pub const fn shift(self) -> u32 {
        match self {
            Action::Read => 0,
            Action::Create => 1,
            Action::Update => 2,
            Action::Delete => 3,
        }
    }

    /// Power-of-two value of this action
    pub const fn bit(self) -> u8 {
        1 << self.shift()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }

    /// Reverse lookup by name (exact, lowercase)
    pub fn from_name(name: &str) -> Option<Action> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownActionName(pub String);

impl fmt::Display for UnknownActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown action: {}", self.0)
    }
}

impl std::error::Error for UnknownActionName {}

impl FromStr for Action {
    type Err = UnknownActionName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::from_name(s).ok_or_else(|| UnknownActionName(s.to_string()))
    }
}
