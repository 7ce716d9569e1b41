//! Access Store
//!
//! Persists at most one [`AccessGrant`] per (role, module). An empty mask is
//! never stored: writing zero deletes the record.

use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::warn;

use super::error::AccessError;
use super::mask::AccessMask;
use super::{AccessGrant, ModuleId, RoleId};

/// Result of an [`AccessStore::upsert`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(AccessGrant),
    Updated(AccessGrant),
    Deleted,
    /// No record existed and the mask was empty
    Unchanged,
}

impl UpsertOutcome {
    pub fn grant(&self) -> Option<&AccessGrant> {
        match self {
            UpsertOutcome::Created(g) | UpsertOutcome::Updated(g) => Some(g),
            UpsertOutcome::Deleted | UpsertOutcome::Unchanged => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            UpsertOutcome::Created(_) => "created",
            UpsertOutcome::Updated(_) => "updated",
            UpsertOutcome::Deleted => "deleted",
            UpsertOutcome::Unchanged => "unchanged",
        }
    }
}

const SELECT_GRANT: &str = "SELECT a.role_id, a.module_id, m.name, a.permissions, a.updated_at
     FROM module_access a
     JOIN modules m ON m.id = a.module_id";

pub struct AccessStore<'c> {
    conn: &'c Connection,
}

impl<'c> AccessStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Create, update or delete the grant for (role, module)
    pub fn upsert(
        &self,
        role: RoleId,
        module: ModuleId,
        bits: u8,
    ) -> Result<UpsertOutcome, AccessError> {
        let mask = AccessMask::from_bits(bits).ok_or(AccessError::BitmaskOutOfRange(bits))?;

        match self.get(role, module)? {
            None if mask.is_empty() => Ok(UpsertOutcome::Unchanged),
            None => self.insert(role, module, mask),
            Some(_) if mask.is_empty() => {
                self.delete(role, module)?;
                Ok(UpsertOutcome::Deleted)
            }
            Some(_) => {
                self.update(role, module, mask)?;
                self.reload(role, module).map(UpsertOutcome::Updated)
            }
        }
    }

    pub fn get(&self, role: RoleId, module: ModuleId) -> Result<Option<AccessGrant>, AccessError> {
        let grant = self
            .conn
            .query_row(
                &format!("{SELECT_GRANT} WHERE a.role_id = ?1 AND a.module_id = ?2"),
                params![role, module],
                map_grant,
            )
            .optional()?;
        Ok(grant)
    }

    /// Grants of a role, ordered by module name
    pub fn list_for_role(&self, role: RoleId) -> Result<Vec<AccessGrant>, AccessError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_GRANT} WHERE a.role_id = ?1 ORDER BY m.name"))?;
        let grants = stmt
            .query_map(params![role], map_grant)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(grants)
    }

    /// Grants held in a module, ordered by role
    pub fn list_for_module(&self, module: ModuleId) -> Result<Vec<AccessGrant>, AccessError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_GRANT} WHERE a.module_id = ?1 ORDER BY a.role_id"))?;
        let grants = stmt
            .query_map(params![module], map_grant)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(grants)
    }

    fn insert(&self, role: RoleId, module: ModuleId, mask: AccessMask) -> Result<UpsertOutcome, AccessError> {
        let result = self.conn.execute(
            "INSERT INTO module_access (role_id, module_id, permissions, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![role, module, mask.bits(), Utc::now().to_rfc3339()],
        );

        match result {
            Ok(_) => self.reload(role, module).map(UpsertOutcome::Created),
            Err(e) if is_unique_violation(&e) => {
                warn!(role, module, "access grant appeared concurrently, retrying as update");
                if self.update(role, module, mask)? == 0 {
                    return Err(AccessError::ConstraintViolation {
                        role_id: role,
                        module_id: module,
                    });
                }
                self.reload(role, module).map(UpsertOutcome::Updated)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn update(&self, role: RoleId, module: ModuleId, mask: AccessMask) -> Result<usize, AccessError> {
        let updated = self.conn.execute(
            "UPDATE module_access SET permissions = ?3, updated_at = ?4
             WHERE role_id = ?1 AND module_id = ?2",
            params![role, module, mask.bits(), Utc::now().to_rfc3339()],
        )?;
        Ok(updated)
    }

    fn delete(&self, role: RoleId, module: ModuleId) -> Result<usize, AccessError> {
        let deleted = self.conn.execute(
            "DELETE FROM module_access WHERE role_id = ?1 AND module_id = ?2",
            params![role, module],
        )?;
        Ok(deleted)
    }

    fn reload(&self, role: RoleId, module: ModuleId) -> Result<AccessGrant, AccessError> {
        self.get(role, module)?.ok_or(AccessError::ConstraintViolation {
            role_id: role,
            module_id: module,
        })
    }
}

fn map_grant(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccessGrant> {
    let bits: u8 = row.get(3)?;
    let mask = AccessMask::from_bits(bits).ok_or_else(|| {
        rusqlite::Error::IntegralValueOutOfRange(3, i64::from(bits))
    })?;
    Ok(AccessGrant {
        role_id: row.get(0)?,
        module_id: row.get(1)?,
        module: row.get(2)?,
        mask,
        updated_at: row.get(4)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
