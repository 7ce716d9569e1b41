//! Rolegate Database Module
//! SQLite store with connection pooling

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS roles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS modules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS resource_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app_label TEXT NOT NULL,
    model TEXT NOT NULL,
    UNIQUE (app_label, model)
);

CREATE TABLE IF NOT EXISTS module_resource_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    module_id INTEGER NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
    resource_type_id INTEGER NOT NULL UNIQUE REFERENCES resource_types(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS module_access (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
    module_id INTEGER NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
    permissions INTEGER NOT NULL CHECK (permissions BETWEEN 1 AND 15),
    updated_at TEXT NOT NULL,
    UNIQUE (role_id, module_id)
);

CREATE TABLE IF NOT EXISTS permissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    resource_type_id INTEGER NOT NULL REFERENCES resource_types(id) ON DELETE CASCADE,
    codename TEXT NOT NULL,
    name TEXT NOT NULL,
    UNIQUE (resource_type_id, codename)
);

CREATE TABLE IF NOT EXISTS role_permissions (
    role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
    permission_id INTEGER NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
    PRIMARY KEY (role_id, permission_id)
);
";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to create database pool: {0}")]
    PoolError(#[from] r2d2::Error),
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Row counts shown by `status`
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatabaseStats {
    pub roles: i64,
    pub modules: i64,
    pub resource_types: i64,
    pub grants: i64,
    pub role_permissions: i64,
}

#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    pub fn new(db_path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(init_connection);
        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Single-connection in-memory database, mostly for tests
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let manager = SqliteConnectionManager::memory().with_init(init_connection);
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;
        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.pool.get()?;

        // PRAGMA journal_mode returns the resulting mode
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.execute_batch(SCHEMA)?;

        Ok(())
    }

    pub fn get_connection(&self) -> Result<DbConnection, DatabaseError> {
        Ok(self.pool.get()?)
    }

    pub fn stats(&self) -> Result<DatabaseStats, DatabaseError> {
        let conn = self.get_connection()?;
        let count = |table: &str| -> Result<i64, rusqlite::Error> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        };
        Ok(DatabaseStats {
            roles: count("roles")?,
            modules: count("modules")?,
            resource_types: count("resource_types")?,
            grants: count("module_access")?,
            role_permissions: count("role_permissions")?,
        })
    }
}

/// Runs on every pooled connection; foreign keys are per connection in SQLite
fn init_connection(conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA foreign_keys=ON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_schema_and_foreign_keys() {
        let db = Database::in_memory().unwrap();
        let conn = db.get_connection().unwrap();
        let fk: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)).unwrap();
        assert_eq!(fk, 1);

        let orphan = conn.execute(
            "INSERT INTO module_access (role_id, module_id, permissions, updated_at) VALUES (42, 42, 1, '')",
            [],
        );
        assert!(orphan.is_err());
    }

    #[test]
    fn test_file_database_is_reopenable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("rolegate.db");

        {
            let db = Database::new(&path).unwrap();
            let conn = db.get_connection().unwrap();
            conn.execute("INSERT INTO modules (name) VALUES ('Users')", []).unwrap();
        }

        let db = Database::new(&path).unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.modules, 1);
        assert_eq!(stats.roles, 0);
    }
}
