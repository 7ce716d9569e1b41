//! Permission Store
//!
//! The fine-grained permission table the access masks are projected onto:
//! one permission per (resource type, codename), granted to roles.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::error::StoreError;
use super::registry::ResourceType;
use super::{PermissionId, RoleId};

/// A permission held by a role
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct PermissionRecord {
    pub id: PermissionId,
    pub resource_type: ResourceType,
    pub codename: String,
}

pub trait PermissionStore {
    /// Look up a permission by resource type and codename
    fn find_permission(
        &self,
        resource_type: &ResourceType,
        codename: &str,
    ) -> Result<Option<PermissionId>, StoreError>;

    /// Grant a permission. Returns `true` if the role did not hold it yet.
    fn grant(&self, role: RoleId, permission: PermissionId) -> Result<bool, StoreError>;

    /// Revoke a permission. Returns `true` if the role held it.
    fn revoke(&self, role: RoleId, permission: PermissionId) -> Result<bool, StoreError>;

    /// Every permission the role holds
    fn role_permissions(&self, role: RoleId) -> Result<Vec<PermissionRecord>, StoreError>;
}

/// SQLite-backed store. Runs on whatever connection or transaction it is
/// given, so grants commit or roll back with the caller.
pub struct SqlitePermissionStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqlitePermissionStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Create the permission row for a codename if it does not exist yet
    pub fn provision(
        &self,
        resource_type: &ResourceType,
        codename: &str,
    ) -> Result<PermissionId, StoreError> {
        let resource_type_id: i64 = self.conn.query_row(
            "SELECT id FROM resource_types WHERE app_label = ?1 AND model = ?2",
            params![resource_type.app_label, resource_type.model],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT OR IGNORE INTO permissions (resource_type_id, codename, name)
             VALUES (?1, ?2, ?3)",
            params![resource_type_id, codename, describe(codename)],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM permissions WHERE resource_type_id = ?1 AND codename = ?2",
            params![resource_type_id, codename],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// All permissions provisioned for a resource type
    pub fn permissions_for(&self, resource_type: &ResourceType) -> Result<Vec<PermissionRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, r.app_label, r.model, p.codename
             FROM permissions p
             JOIN resource_types r ON r.id = p.resource_type_id
             WHERE r.app_label = ?1 AND r.model = ?2
             ORDER BY p.codename",
        )?;
        let records = stmt
            .query_map(params![resource_type.app_label, resource_type.model], map_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

impl PermissionStore for SqlitePermissionStore<'_> {
    fn find_permission(
        &self,
        resource_type: &ResourceType,
        codename: &str,
    ) -> Result<Option<PermissionId>, StoreError> {
        let id = self
            .conn
            .query_row(
                "SELECT p.id FROM permissions p
                 JOIN resource_types r ON r.id = p.resource_type_id
                 WHERE r.app_label = ?1 AND r.model = ?2 AND p.codename = ?3",
                params![resource_type.app_label, resource_type.model, codename],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn grant(&self, role: RoleId, permission: PermissionId) -> Result<bool, StoreError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO role_permissions (role_id, permission_id) VALUES (?1, ?2)",
            params![role, permission],
        )?;
        Ok(inserted > 0)
    }

    fn revoke(&self, role: RoleId, permission: PermissionId) -> Result<bool, StoreError> {
        let deleted = self.conn.execute(
            "DELETE FROM role_permissions WHERE role_id = ?1 AND permission_id = ?2",
            params![role, permission],
        )?;
        Ok(deleted > 0)
    }

    fn role_permissions(&self, role: RoleId) -> Result<Vec<PermissionRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, r.app_label, r.model, p.codename
             FROM role_permissions rp
             JOIN permissions p ON p.id = rp.permission_id
             JOIN resource_types r ON r.id = p.resource_type_id
             WHERE rp.role_id = ?1
             ORDER BY r.app_label, r.model, p.codename",
        )?;
        let records = stmt
            .query_map(params![role], map_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn map_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<PermissionRecord> {
    Ok(PermissionRecord {
        id: row.get(0)?,
        resource_type: ResourceType {
            app_label: row.get(1)?,
            model: row.get(2)?,
        },
        codename: row.get(3)?,
    })
}

/// `view_invoice` -> `Can view invoice`
fn describe(codename: &str) -> String {
    format!("Can {}", codename.replace('_', " "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::database::Database;

    #[test]
    fn test_provision_grant_revoke() {
        let db = Database::in_memory().unwrap();
        let conn = db.get_connection().unwrap();
        conn.execute(
            "INSERT INTO resource_types (app_label, model) VALUES ('billing', 'invoice')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO roles (name, created_at) VALUES ('Accountants', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let role = conn.last_insert_rowid();

        let store = SqlitePermissionStore::new(&conn);
        let invoice = ResourceType::new("billing", "invoice");
        let id = store.provision(&invoice, "view_invoice").unwrap();
        assert_eq!(store.provision(&invoice, "view_invoice").unwrap(), id);
        assert_eq!(store.find_permission(&invoice, "view_invoice").unwrap(), Some(id));
        assert_eq!(store.find_permission(&invoice, "add_invoice").unwrap(), None);

        assert!(store.grant(role, id).unwrap());
        assert!(!store.grant(role, id).unwrap());
        let held = store.role_permissions(role).unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].codename, "view_invoice");

        assert!(store.revoke(role, id).unwrap());
        assert!(!store.revoke(role, id).unwrap());
        assert!(store.role_permissions(role).unwrap().is_empty());
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe("view_invoice"), "Can view invoice");
    }
}
