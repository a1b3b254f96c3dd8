//! RBAC Manager Database Module
//! SQLite connection pooling and the authorization schema

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use thiserror::Error;

use crate::engine::config::{ConfigError, TableConfig};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to create database pool: {0}")]
    PoolError(#[from] r2d2::Error),
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Invalid table configuration: {0}")]
    TableConfig(#[from] ConfigError),
}

#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    tables: TableConfig,
}

impl Database {
    pub fn new(db_path: &Path, tables: TableConfig) -> Result<Self, DatabaseError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path)
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys=ON"));
        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self { pool, tables };
        db.init_schema()?;
        Ok(db)
    }

    pub fn in_memory(tables: TableConfig) -> Result<Self, DatabaseError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys=ON"));
        let pool = Pool::builder().max_size(1).build(manager)?;
        let db = Self { pool, tables };
        db.init_schema()?;
        Ok(db)
    }

    pub fn tables(&self) -> &TableConfig {
        &self.tables
    }

    fn init_schema(&self) -> Result<(), DatabaseError> {
        self.tables.validate()?;
        let conn = self.pool.get()?;
        let TableConfig {
            item,
            item_child,
            assignment,
        } = &self.tables;

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {item} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                type TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                path TEXT,
                created_time TEXT,
                updated_time TEXT
            );
            CREATE TABLE IF NOT EXISTS {item_child} (
                parent INTEGER NOT NULL REFERENCES {item}(id) ON DELETE CASCADE,
                child INTEGER NOT NULL REFERENCES {item}(id) ON DELETE CASCADE,
                PRIMARY KEY (parent, child)
            );
            CREATE TABLE IF NOT EXISTS {assignment} (
                item_id INTEGER NOT NULL REFERENCES {item}(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                created_at TEXT,
                PRIMARY KEY (item_id, user_id)
            );
            CREATE INDEX IF NOT EXISTS idx_{assignment}_user ON {assignment}(user_id);"
        ))?;

        Ok(())
    }

    pub fn get_connection(&self) -> Result<DbConnection, DatabaseError> {
        Ok(self.pool.get()?)
    }

    pub fn get_tables(&self) -> Result<Vec<String>, DatabaseError> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let tables = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tables)
    }

    pub fn backup(&self, backup_path: &Path) -> Result<(), DatabaseError> {
        let conn = self.get_connection()?;
        conn.execute(
            "VACUUM INTO ?1",
            [backup_path.to_string_lossy().as_ref()],
        )?;
        Ok(())
    }
}
