//! Role Service
//!
//! Role CRUD with the nested access payload. Access changes run in two
//! phases: the whole payload is decoded first, and only a fully valid payload
//! is applied. Each (role, module) pair is then applied in its own immediate
//! transaction covering both the stored mask and its projection. A role
//! created with access is written in one transaction together with all of its
//! pairs.
//!
//! Modules are read from the database on every request. Inside a pair's
//! transaction the module's resource types are re-read, so a projection always
//! covers what the module owns at commit time.

use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::access::AccessStore;
use super::codec::{AccessView, DecodedAccess, PermissionCodec};
use super::error::{ApplyError, RegistryError, RoleError};
use super::mask::AccessMask;
use super::registry::ModuleRegistry;
use super::role::{Role, RoleStore};
use super::store::SqlitePermissionStore;
use super::sync::{CodenameMap, PermissionSynchronizer, SyncReport};
use super::RoleId;
use crate::engine::database::Database;

/// Body of a role creation, or of a full replacement
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleInput {
    pub name: String,
    #[serde(default)]
    pub access: Option<Value>,
}

/// Partial role update; absent fields are left alone
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub access: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleView {
    pub id: RoleId,
    pub name: String,
    pub access: AccessView,
}

/// What applying one module's mask did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleChange {
    pub module: String,
    pub outcome: &'static str,
    pub mask: AccessMask,
    pub report: SyncReport,
}

pub struct RoleService {
    db: Database,
    codenames: CodenameMap,
}

impl RoleService {
    /// Build a service over `db`. Fails if the module tables cannot be read.
    pub fn new(db: Database, codenames: CodenameMap) -> Result<Self, RoleError> {
        {
            let conn = db.get_connection()?;
            ModuleRegistry::load(&conn)?;
        }
        Ok(Self { db, codenames })
    }

    /// Modules and their resource types as currently stored
    pub fn registry(&self) -> Result<ModuleRegistry, RoleError> {
        let conn = self.db.get_connection()?;
        Ok(ModuleRegistry::load(&conn)?)
    }

    pub fn codenames(&self) -> &CodenameMap {
        &self.codenames
    }

    /// Validate a payload against the modules currently stored
    pub fn decode(&self, access: &Value) -> Result<DecodedAccess, RoleError> {
        let registry = self.registry()?;
        Ok(PermissionCodec::new(&registry).decode(access)?)
    }

    pub fn list_roles(&self) -> Result<Vec<RoleView>, RoleError> {
        let conn = self.db.get_connection()?;
        RoleStore::new(&conn)
            .list()?
            .into_iter()
            .map(|role| view(&conn, role))
            .collect()
    }

    pub fn get_role(&self, id: RoleId) -> Result<RoleView, RoleError> {
        let conn = self.db.get_connection()?;
        let role = RoleStore::new(&conn).require(id)?;
        view(&conn, role)
    }

    /// Create a role. An invalid access payload rejects the request before
    /// anything is written; a failing module rolls back the role as well.
    pub fn create_role(&self, input: RoleInput) -> Result<RoleView, RoleError> {
        let decoded = input.access.as_ref().map(|a| self.decode(a)).transpose()?;

        let mut conn = self.db.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let role = RoleStore::new(&tx).insert(&input.name)?;
        let mut changes = Vec::new();
        if let Some(decoded) = &decoded {
            for (name, mask) in decoded.iter() {
                let change = self
                    .project(&tx, role.id, name, mask)
                    .map_err(|source| apply_failed(role.id, name, source))?;
                changes.push(change);
            }
        }
        tx.commit()?;

        info!(role = role.id, name = %role.name, "role created");
        for change in &changes {
            log_applied(role.id, change);
        }
        view(&conn, role)
    }

    /// Rename and/or change access. Access is decoded before the rename so a
    /// bad payload leaves the role untouched.
    pub fn update_role(&self, id: RoleId, update: RoleUpdate) -> Result<RoleView, RoleError> {
        let decoded = update.access.as_ref().map(|a| self.decode(a)).transpose()?;

        {
            let conn = self.db.get_connection()?;
            let store = RoleStore::new(&conn);
            store.require(id)?;
            if let Some(name) = &update.name {
                store.rename(id, name)?;
                info!(role = id, name = %name.trim(), "role renamed");
            }
        }

        if let Some(decoded) = decoded {
            self.apply_access(id, &decoded)?;
        }
        self.get_role(id)
    }

    /// Delete a role together with its grants and projected permissions
    pub fn delete_role(&self, id: RoleId) -> Result<(), RoleError> {
        let conn = self.db.get_connection()?;
        RoleStore::new(&conn).delete(id)?;
        info!(role = id, "role deleted");
        Ok(())
    }

    /// Apply a decoded payload, one module at a time in name order. Pairs
    /// applied before a failing module stay committed.
    pub fn apply_access(&self, role: RoleId, access: &DecodedAccess) -> Result<Vec<ModuleChange>, RoleError> {
        let mut conn = self.db.get_connection()?;
        RoleStore::new(&conn).require(role)?;

        let mut changes = Vec::with_capacity(access.len());
        for (name, mask) in access.iter() {
            let change = self
                .apply_pair(&mut conn, role, name, mask)
                .map_err(|source| apply_failed(role, name, source))?;
            changes.push(change);
        }
        Ok(changes)
    }

    /// Set the mask of a single module directly, bypassing the payload codec
    pub fn set_module_access(&self, role: RoleId, module: &str, mask: AccessMask) -> Result<ModuleChange, RoleError> {
        let decoded: DecodedAccess = [(module.to_string(), mask)].into_iter().collect();
        let mut changes = self.apply_access(role, &decoded)?;
        changes
            .pop()
            .ok_or_else(|| RoleError::from(RegistryError::ModuleNotFound(module.to_string())))
    }

    fn apply_pair(
        &self,
        conn: &mut Connection,
        role: RoleId,
        module: &str,
        mask: AccessMask,
    ) -> Result<ModuleChange, ApplyError> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let change = self.project(&tx, role, module, mask)?;
        tx.commit()?;
        log_applied(role, &change);
        Ok(change)
    }

    /// Store the pair's mask and project it onto the module's resource types
    /// as stored on `conn`. Runs inside the caller's transaction.
    fn project(
        &self,
        conn: &Connection,
        role: RoleId,
        module: &str,
        mask: AccessMask,
    ) -> Result<ModuleChange, ApplyError> {
        let module = ModuleRegistry::load_module(conn, module)?
            .ok_or_else(|| RegistryError::ModuleNotFound(module.to_string()))?;
        let outcome = AccessStore::new(conn).upsert(role, module.id, mask.bits())?;
        // Revocation runs for deleted and unchanged grants too.
        let report = PermissionSynchronizer::new(&self.codenames).sync(
            &SqlitePermissionStore::new(conn),
            role,
            &module,
            mask,
        )?;
        Ok(ModuleChange {
            module: module.name,
            outcome: outcome.label(),
            mask,
            report,
        })
    }
}

fn apply_failed(role: RoleId, module: &str, source: ApplyError) -> RoleError {
    match source {
        ApplyError::Registry(err) => err.into(),
        source => {
            warn!(role, module, error = %source, "access change rolled back");
            RoleError::ApplyFailed {
                module: module.to_string(),
                source,
            }
        }
    }
}

fn log_applied(role: RoleId, change: &ModuleChange) {
    info!(
        role,
        module = %change.module,
        outcome = change.outcome,
        mask = %change.mask,
        granted = change.report.granted,
        revoked = change.report.revoked,
        "module access applied"
    );
}

fn view(conn: &Connection, role: Role) -> Result<RoleView, RoleError> {
    let grants = AccessStore::new(conn).list_for_role(role.id)?;
    Ok(RoleView {
        id: role.id,
        name: role.name,
        access: PermissionCodec::encode(&grants),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rbac::admin::RegistryAdmin;
    use crate::engine::rbac::error::{DecodeErrorKind, SyncError};
    use crate::engine::rbac::registry::ResourceType;
    use crate::engine::rbac::store::PermissionStore;
    use crate::engine::rbac::ActionFlags;
    use serde_json::json;

    fn setup() -> (Database, RoleService) {
        let db = Database::in_memory().unwrap();
        let codenames = CodenameMap::default();
        {
            let mut conn = db.get_connection().unwrap();
            let admin = RegistryAdmin::new(&codenames);
            for (module, app, model) in [("Billing", "billing", "invoice"), ("Users", "auth", "user")] {
                let rt = ResourceType::new(app, model);
                admin.create_module(&conn, module).unwrap();
                admin.register_resource_type(&mut conn, &rt).unwrap();
                admin.assign(&mut conn, module, &rt).unwrap();
            }
        }
        let service = RoleService::new(db.clone(), codenames).unwrap();
        (db, service)
    }

    fn held(db: &Database, role: RoleId) -> Vec<String> {
        let conn = db.get_connection().unwrap();
        SqlitePermissionStore::new(&conn)
            .role_permissions(role)
            .unwrap()
            .into_iter()
            .map(|p| p.codename)
            .collect()
    }

    #[test]
    fn test_create_with_access() {
        let (db, service) = setup();
        let role = service
            .create_role(RoleInput {
                name: "Accountants".to_string(),
                access: Some(json!({
                    "Billing": {"read": 1, "create": 0, "update": 1, "delete": 0}
                })),
            })
            .unwrap();

        assert_eq!(role.name, "Accountants");
        assert_eq!(
            role.access.get("Billing"),
            Some(&ActionFlags { read: true, create: false, update: true, delete: false })
        );
        assert!(!role.access.contains_key("Users"));
        assert_eq!(held(&db, role.id), vec!["change_invoice", "view_invoice"]);
    }

    #[test]
    fn test_invalid_payload_writes_nothing() {
        let (_db, service) = setup();
        let err = service
            .create_role(RoleInput {
                name: "Ghosts".to_string(),
                access: Some(json!({
                    "Billing": {"read": 1, "create": 1, "update": 1, "delete": 1},
                    "Nope": {"read": 1}
                })),
            })
            .unwrap_err();
        match err {
            RoleError::Decode(e) => assert!(e.has_kind(DecodeErrorKind::ModuleUnavailable)),
            other => panic!("unexpected error: {other}"),
        }
        assert!(service.list_roles().unwrap().is_empty());
    }

    #[test]
    fn test_zero_mask_deletes_and_revokes() {
        let (db, service) = setup();
        let role = service
            .create_role(RoleInput {
                name: "Support".to_string(),
                access: Some(json!({
                    "Billing": {"read": true, "create": true, "update": true, "delete": true},
                    "Users": {"read": true, "create": false, "update": false, "delete": false}
                })),
            })
            .unwrap();
        assert_eq!(held(&db, role.id).len(), 5);

        let updated = service
            .update_role(
                role.id,
                RoleUpdate {
                    name: None,
                    access: Some(json!({
                        "Billing": {"read": 0, "create": 0, "update": 0, "delete": 0},
                        "Users": {"read": 1, "create": 1, "update": 0, "delete": 0}
                    })),
                },
            )
            .unwrap();

        assert!(!updated.access.contains_key("Billing"));
        assert_eq!(updated.access["Users"].to_mask().bits(), 0b0011);
        assert_eq!(held(&db, role.id), vec!["add_user", "view_user"]);
    }

    #[test]
    fn test_apply_reports_changes() {
        let (_db, service) = setup();
        let role = service.create_role(RoleInput { name: "Ops".into(), access: None }).unwrap();

        let change = service.set_module_access(role.id, "Users", AccessMask::ALL).unwrap();
        assert_eq!(change.outcome, "created");
        assert_eq!(change.report.granted, 4);

        let change = service.set_module_access(role.id, "Users", AccessMask::ALL).unwrap();
        assert_eq!(change.outcome, "updated");
        assert!(change.report.is_noop());

        let change = service.set_module_access(role.id, "Billing", AccessMask::EMPTY).unwrap();
        assert_eq!(change.outcome, "unchanged");

        assert!(matches!(
            service.set_module_access(role.id, "Nope", AccessMask::ALL),
            Err(RoleError::Registry(RegistryError::ModuleNotFound(_)))
        ));
        assert!(matches!(
            service.set_module_access(999, "Users", AccessMask::ALL),
            Err(RoleError::NotFound(999))
        ));
    }

    #[test]
    fn test_missing_codename_rolls_back_pair() {
        let (db, service) = setup();
        let role = service.create_role(RoleInput { name: "Auditors".into(), access: None }).unwrap();

        // Drop a provisioned permission behind the service's back
        {
            let conn = db.get_connection().unwrap();
            conn.execute("DELETE FROM permissions WHERE codename = 'delete_invoice'", [])
                .unwrap();
        }

        let err = service.set_module_access(role.id, "Billing", AccessMask::ALL).unwrap_err();
        assert!(err.is_configuration_error());
        match &err {
            RoleError::ApplyFailed { module, source } => {
                assert_eq!(module, "Billing");
                assert!(matches!(source, ApplyError::Sync(SyncError::MissingExternalPermission { .. })));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(service.get_role(role.id).unwrap().access.is_empty());
        assert!(held(&db, role.id).is_empty());
    }

    #[test]
    fn test_rename_and_delete() {
        let (db, service) = setup();
        let role = service
            .create_role(RoleInput {
                name: "Temps".into(),
                access: Some(json!({"Users": {"read": 1, "create": 0, "update": 0, "delete": 0}})),
            })
            .unwrap();
        service.create_role(RoleInput { name: "Staff".into(), access: None }).unwrap();

        assert!(matches!(
            service.update_role(role.id, RoleUpdate { name: Some("Staff".into()), access: None }),
            Err(RoleError::NameTaken(_))
        ));
        let renamed = service
            .update_role(role.id, RoleUpdate { name: Some("Contractors".into()), access: None })
            .unwrap();
        assert_eq!(renamed.name, "Contractors");
        assert_eq!(renamed.access.len(), 1);

        service.delete_role(role.id).unwrap();
        assert!(matches!(service.get_role(role.id), Err(RoleError::NotFound(_))));
        assert!(held(&db, role.id).is_empty());
        assert_eq!(service.list_roles().unwrap().len(), 1);
    }

    #[test]
    fn test_failed_create_leaves_no_role() {
        let (db, service) = setup();
        {
            let conn = db.get_connection().unwrap();
            conn.execute("DELETE FROM permissions WHERE codename = 'delete_invoice'", [])
                .unwrap();
        }
        let input = RoleInput {
            name: "Auditors".into(),
            access: Some(json!({
                "Billing": {"read": 1, "create": 1, "update": 1, "delete": 1},
                "Users": {"read": 1, "create": 0, "update": 0, "delete": 0}
            })),
        };

        let err = service.create_role(input.clone()).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(service.list_roles().unwrap().is_empty());
        {
            let conn = db.get_connection().unwrap();
            let grants: i64 = conn
                .query_row("SELECT COUNT(*) FROM module_access", [], |row| row.get(0))
                .unwrap();
            let held: i64 = conn
                .query_row("SELECT COUNT(*) FROM role_permissions", [], |row| row.get(0))
                .unwrap();
            assert_eq!((grants, held), (0, 0));
        }

        // Same request goes through once the permission is back
        {
            let mut conn = db.get_connection().unwrap();
            RegistryAdmin::new(service.codenames())
                .provision(&mut conn, &ResourceType::new("billing", "invoice"))
                .unwrap();
        }
        let role = service.create_role(input).unwrap();
        assert_eq!(role.name, "Auditors");
        assert_eq!(held(&db, role.id).len(), 5);
    }

    #[test]
    fn test_assign_after_start_is_synced() {
        let (db, service) = setup();
        let role = service.create_role(RoleInput { name: "Clerks".into(), access: None }).unwrap();
        service.set_module_access(role.id, "Billing", AccessMask::ALL).unwrap();

        {
            let mut conn = db.get_connection().unwrap();
            let admin = RegistryAdmin::new(service.codenames());
            let payment = ResourceType::new("billing", "payment");
            admin.register_resource_type(&mut conn, &payment).unwrap();
            admin.assign(&mut conn, "Billing", &payment).unwrap();
        }
        assert_eq!(held(&db, role.id).len(), 8);

        let change = service.set_module_access(role.id, "Billing", AccessMask::EMPTY).unwrap();
        assert_eq!(change.report.revoked, 8);
        assert!(service.get_role(role.id).unwrap().access.is_empty());
        assert!(held(&db, role.id).is_empty());
    }

    #[test]
    fn test_modules_are_read_per_request() {
        let (db, service) = setup();
        {
            let conn = db.get_connection().unwrap();
            RegistryAdmin::new(service.codenames()).create_module(&conn, "Reports").unwrap();
        }
        assert!(service.registry().unwrap().exists("Reports"));
        assert!(service.decode(&json!({"Reports": {"read": 1, "create": 0, "update": 0, "delete": 0}})).is_ok());

        {
            let mut conn = db.get_connection().unwrap();
            RegistryAdmin::new(service.codenames()).delete_module(&mut conn, "Reports").unwrap();
        }
        let role = service.create_role(RoleInput { name: "Readers".into(), access: None }).unwrap();
        assert!(matches!(
            service.set_module_access(role.id, "Reports", AccessMask::ALL),
            Err(RoleError::Registry(RegistryError::ModuleNotFound(_)))
        ));
    }
}
