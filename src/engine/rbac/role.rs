//! Role records

use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::error::RoleError;
use super::RoleId;

/// Longest accepted role name
pub const MAX_ROLE_NAME: usize = 150;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub created_at: String,
}

pub struct RoleStore<'c> {
    conn: &'c Connection,
}

impl<'c> RoleStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, name: &str) -> Result<Role, RoleError> {
        let name = validate_name(name)?;
        let created_at = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO roles (name, created_at) VALUES (?1, ?2)",
                params![name, created_at],
            )
            .map_err(|e| name_conflict(e, name))?;

        Ok(Role {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            created_at,
        })
    }

    pub fn get(&self, id: RoleId) -> Result<Option<Role>, RoleError> {
        let role = self
            .conn
            .query_row(
                "SELECT id, name, created_at FROM roles WHERE id = ?1",
                params![id],
                map_role,
            )
            .optional()?;
        Ok(role)
    }

    pub fn require(&self, id: RoleId) -> Result<Role, RoleError> {
        self.get(id)?.ok_or(RoleError::NotFound(id))
    }

    pub fn list(&self) -> Result<Vec<Role>, RoleError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM roles ORDER BY id")?;
        let roles = stmt
            .query_map([], map_role)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(roles)
    }

    pub fn rename(&self, id: RoleId, name: &str) -> Result<(), RoleError> {
        let name = validate_name(name)?;
        let updated = self
            .conn
            .execute("UPDATE roles SET name = ?2 WHERE id = ?1", params![id, name])
            .map_err(|e| name_conflict(e, name))?;
        if updated == 0 {
            return Err(RoleError::NotFound(id));
        }
        Ok(())
    }

    /// Delete a role. Grants and held permissions cascade.
    pub fn delete(&self, id: RoleId) -> Result<(), RoleError> {
        let deleted = self
            .conn
            .execute("DELETE FROM roles WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(RoleError::NotFound(id));
        }
        Ok(())
    }
}

fn map_role(row: &rusqlite::Row<'_>) -> rusqlite::Result<Role> {
    Ok(Role {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn validate_name(name: &str) -> Result<&str, RoleError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RoleError::InvalidName("name must not be blank".to_string()));
    }
    if trimmed.chars().count() > MAX_ROLE_NAME {
        return Err(RoleError::InvalidName(format!(
            "name must be at most {MAX_ROLE_NAME} characters"
        )));
    }
    Ok(trimmed)
}

fn name_conflict(err: rusqlite::Error, name: &str) -> RoleError {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            RoleError::NameTaken(name.to_string())
        }
        other => RoleError::Sqlite(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::database::Database;

    #[test]
    fn test_role_crud() {
        let db = Database::in_memory().unwrap();
        let conn = db.get_connection().unwrap();
        let store = RoleStore::new(&conn);

        let role = store.insert("  Admins ").unwrap();
        assert_eq!(role.name, "Admins");
        assert_eq!(store.require(role.id).unwrap(), role);

        assert!(matches!(store.insert("Admins"), Err(RoleError::NameTaken(_))));
        assert!(matches!(store.insert("   "), Err(RoleError::InvalidName(_))));
        assert!(matches!(
            store.insert(&"x".repeat(MAX_ROLE_NAME + 1)),
            Err(RoleError::InvalidName(_))
        ));

        store.rename(role.id, "Owners").unwrap();
        assert_eq!(store.require(role.id).unwrap().name, "Owners");
        assert_eq!(store.list().unwrap().len(), 1);

        store.delete(role.id).unwrap();
        assert!(store.get(role.id).unwrap().is_none());
        assert!(matches!(store.delete(role.id), Err(RoleError::NotFound(_))));
        assert!(matches!(store.rename(role.id, "Ghost"), Err(RoleError::NotFound(_))));
    }
}
