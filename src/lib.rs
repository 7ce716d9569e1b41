//! Rolegate - Module-scoped role access control
//! Library behind the `rolegate` CLI and REST API

pub mod engine;

pub use engine::config::Config;
pub use engine::database::Database;
pub use engine::rbac::{AccessMask, Action, ModuleRegistry, PermissionCodec, RoleService};
