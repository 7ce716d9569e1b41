//! RBAC Module
//!
//! Module-scoped role access: a four-bit mask per (role, module) pair,
//! projected onto per-resource-type permissions held by the role.

pub mod action;
pub mod mask;
pub mod error;
pub mod registry;
pub mod admin;
pub mod codec;
pub mod access;
pub mod store;
pub mod sync;
pub mod role;
pub mod service;

use serde::Serialize;

pub type RoleId = i64;
pub type ModuleId = i64;
pub type PermissionId = i64;

/// Stored (role, module, mask) record. The mask is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessGrant {
    pub role_id: RoleId,
    pub module_id: ModuleId,
    pub module: String,
    pub mask: AccessMask,
    pub updated_at: String,
}

pub use action::Action;
pub use mask::AccessMask;
pub use error::{
    AccessError, ApplyError, DecodeError, DecodeErrorKind, FieldError, RegistryError, RoleError,
    StoreError, SyncError,
};
pub use registry::{Module, ModuleRegistry, ResourceType};
pub use admin::{RegistryAdmin, ResourceTypeEntry};
pub use codec::{AccessView, ActionFlags, DecodedAccess, PermissionCodec};
pub use access::{AccessStore, UpsertOutcome};
pub use store::{PermissionRecord, PermissionStore, SqlitePermissionStore};
pub use sync::{CodenameMap, PermissionSynchronizer, SyncReport};
pub use role::{Role, RoleStore};
pub use service::{ModuleChange, RoleInput, RoleService, RoleUpdate, RoleView};
