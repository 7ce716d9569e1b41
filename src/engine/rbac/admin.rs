//! Registry administration
//!
//! Writes to the module / resource-type reference data. Every change that
//! alters which resource types a module governs re-projects the existing
//! grants of that module in the same transaction, so stored masks and held
//! permissions keep agreeing.

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use tracing::info;

use super::access::AccessStore;
use super::error::RegistryError;
use super::mask::AccessMask;
use super::registry::{module_resource_types, ResourceType};
use super::store::SqlitePermissionStore;
use super::sync::{CodenameMap, PermissionSynchronizer, SyncReport};
use super::ModuleId;

/// Longest accepted module name
pub const MAX_MODULE_NAME: usize = 100;

/// A registered resource type and the module owning it, if any
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ResourceTypeEntry {
    pub resource_type: ResourceType,
    pub module: Option<String>,
}

pub struct RegistryAdmin<'a> {
    codenames: &'a CodenameMap,
}

impl<'a> RegistryAdmin<'a> {
    pub fn new(codenames: &'a CodenameMap) -> Self {
        Self { codenames }
    }

    pub fn create_module(&self, conn: &Connection, name: &str) -> Result<ModuleId, RegistryError> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_MODULE_NAME {
            return Err(RegistryError::InvalidModuleName(name.to_string()));
        }
        conn.execute("INSERT INTO modules (name) VALUES (?1)", params![name])
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation => {
                    RegistryError::ModuleExists(name.to_string())
                }
                other => RegistryError::Sqlite(other),
            })?;
        info!(module = name, "module created");
        Ok(conn.last_insert_rowid())
    }

    /// Revoke every permission projected from the module's grants, then
    /// delete it. Grants cascade.
    pub fn delete_module(&self, conn: &mut Connection, name: &str) -> Result<SyncReport, RegistryError> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let module = module_id(&tx, name)?;
        let resource_types = module_resource_types(&tx, module)?;
        let report = self.reproject(&tx, module, &resource_types, Some(AccessMask::EMPTY))?;
        tx.execute("DELETE FROM modules WHERE id = ?1", params![module])?;
        tx.commit()?;
        info!(module = name, revoked = report.revoked, "module deleted");
        Ok(report)
    }

    /// Register a resource type and provision every codename the configured
    /// templates imply for it
    pub fn register_resource_type(
        &self,
        conn: &mut Connection,
        resource_type: &ResourceType,
    ) -> Result<Vec<String>, RegistryError> {
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO resource_types (app_label, model) VALUES (?1, ?2)",
            params![resource_type.app_label, resource_type.model],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation => {
                RegistryError::ResourceTypeExists(resource_type.to_string())
            }
            other => RegistryError::Sqlite(other),
        })?;
        let codenames = self.provision_codenames(&tx, resource_type)?;
        tx.commit()?;
        info!(resource_type = %resource_type, codenames = codenames.len(), "resource type registered");
        Ok(codenames)
    }

    /// Provision codenames for an already registered resource type, e.g.
    /// after the template configuration grew
    pub fn provision(&self, conn: &mut Connection, resource_type: &ResourceType) -> Result<Vec<String>, RegistryError> {
        let tx = conn.transaction()?;
        resource_type_id(&tx, resource_type)?;
        let codenames = self.provision_codenames(&tx, resource_type)?;
        tx.commit()?;
        Ok(codenames)
    }

    /// Put a resource type under a module and grant the module's existing
    /// holders the matching permissions
    pub fn assign(
        &self,
        conn: &mut Connection,
        module: &str,
        resource_type: &ResourceType,
    ) -> Result<SyncReport, RegistryError> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let module_id = module_id(&tx, module)?;
        let resource_type_id = resource_type_id(&tx, resource_type)?;

        if let Some(owner) = owner_of(&tx, resource_type_id)? {
            if owner == module {
                return Ok(SyncReport::default());
            }
            return Err(RegistryError::ResourceTypeTaken {
                resource_type: resource_type.to_string(),
                module: owner,
            });
        }

        tx.execute(
            "INSERT INTO module_resource_types (module_id, resource_type_id) VALUES (?1, ?2)",
            params![module_id, resource_type_id],
        )?;
        let report = self.reproject(&tx, module_id, std::slice::from_ref(resource_type), None)?;
        tx.commit()?;
        info!(module, resource_type = %resource_type, granted = report.granted, "resource type assigned");
        Ok(report)
    }

    /// Take a resource type away from a module, revoking what its holders
    /// were granted on it
    pub fn unassign(
        &self,
        conn: &mut Connection,
        module: &str,
        resource_type: &ResourceType,
    ) -> Result<SyncReport, RegistryError> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let module_id = module_id(&tx, module)?;
        let resource_type_id = resource_type_id(&tx, resource_type)?;

        if owner_of(&tx, resource_type_id)?.as_deref() != Some(module) {
            return Err(RegistryError::ResourceTypeNotFound(format!(
                "{resource_type} in module {module}"
            )));
        }

        let report = self.reproject(
            &tx,
            module_id,
            std::slice::from_ref(resource_type),
            Some(AccessMask::EMPTY),
        )?;
        tx.execute(
            "DELETE FROM module_resource_types WHERE module_id = ?1 AND resource_type_id = ?2",
            params![module_id, resource_type_id],
        )?;
        tx.commit()?;
        info!(module, resource_type = %resource_type, revoked = report.revoked, "resource type unassigned");
        Ok(report)
    }

    pub fn list_resource_types(&self, conn: &Connection) -> Result<Vec<ResourceTypeEntry>, RegistryError> {
        let mut stmt = conn.prepare(
            "SELECT r.app_label, r.model, m.name
             FROM resource_types r
             LEFT JOIN module_resource_types mr ON mr.resource_type_id = r.id
             LEFT JOIN modules m ON m.id = mr.module_id
             ORDER BY r.app_label, r.model",
        )?;
        let entries = stmt
            .query_map([], |row| {
                Ok(ResourceTypeEntry {
                    resource_type: ResourceType {
                        app_label: row.get(0)?,
                        model: row.get(1)?,
                    },
                    module: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn provision_codenames(&self, conn: &Connection, resource_type: &ResourceType) -> Result<Vec<String>, RegistryError> {
        let store = SqlitePermissionStore::new(conn);
        let codenames = self.codenames.all_codenames_for(&resource_type.model);
        for codename in &codenames {
            store.provision(resource_type, codename)?;
        }
        Ok(codenames)
    }

    /// Re-sync every grant of `module` over `resource_types`, either with the
    /// grant's own mask or with `forced`
    fn reproject(
        &self,
        conn: &Connection,
        module: ModuleId,
        resource_types: &[ResourceType],
        forced: Option<AccessMask>,
    ) -> Result<SyncReport, RegistryError> {
        let store = SqlitePermissionStore::new(conn);
        let sync = PermissionSynchronizer::new(self.codenames);
        let mut report = SyncReport::default();
        for grant in AccessStore::new(conn).list_for_module(module)? {
            let mask = forced.unwrap_or(grant.mask);
            report += sync.sync_resource_types(&store, grant.role_id, resource_types, mask)?;
        }
        Ok(report)
    }
}

fn module_id(conn: &Connection, name: &str) -> Result<ModuleId, RegistryError> {
    conn.query_row("SELECT id FROM modules WHERE name = ?1", params![name], |row| row.get(0))
        .optional()?
        .ok_or_else(|| RegistryError::ModuleNotFound(name.to_string()))
}

fn resource_type_id(conn: &Connection, resource_type: &ResourceType) -> Result<i64, RegistryError> {
    conn.query_row(
        "SELECT id FROM resource_types WHERE app_label = ?1 AND model = ?2",
        params![resource_type.app_label, resource_type.model],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| RegistryError::ResourceTypeNotFound(resource_type.to_string()))
}

fn owner_of(conn: &Connection, resource_type_id: i64) -> Result<Option<String>, RegistryError> {
    let owner = conn
        .query_row(
            "SELECT m.name FROM module_resource_types mr
             JOIN modules m ON m.id = mr.module_id
             WHERE mr.resource_type_id = ?1",
            params![resource_type_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(owner)
}
