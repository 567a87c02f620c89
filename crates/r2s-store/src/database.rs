//! Pooled SQLite access.
//!
//! Every call checks a connection out of an `r2d2` pool and returns it when
//! the closure finishes, whether it succeeded or not. The pragma customizer
//! applies the schema pragmas to each new connection.

use std::path::{Path, PathBuf};
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::info;

use crate::error::StoreError;
use crate::schema;

/// Alias for the connection pool type.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct PragmaCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(schema::PRAGMAS)
    }
}

/// Shared handle to the snapshot database. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    pool: ConnectionPool,
    path: PathBuf,
}

impl Database {
    /// Open or create a database file and bring its schema up to date.
    pub fn open(path: &Path, pool_size: u32) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(format!("create dir: {e}")))?;
        }

        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(CONNECTION_TIMEOUT)
            .connection_customizer(Box::new(PragmaCustomizer))
            .build(SqliteConnectionManager::file(path))?;

        let db = Self {
            pool,
            path: path.to_owned(),
        };
        db.bootstrap()?;
        info!(path = %path.display(), pool_size, "snapshot database opened");
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    ///
    /// Each in-memory connection is a separate database, so the pool holds
    /// exactly one connection that is never recycled.
    pub fn in_memory() -> Result<Self, StoreError> {
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_timeout(CONNECTION_TIMEOUT)
            .connection_customizer(Box::new(PragmaCustomizer))
            .build(SqliteConnectionManager::memory())?;

        let db = Self {
            pool,
            path: PathBuf::from(":memory:"),
        };
        db.bootstrap()?;
        Ok(db)
    }

    fn bootstrap(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute_batch(schema::CREATE_TABLES)
                .map_err(|e| StoreError::Database(format!("schema: {e}")))?;

            let version: Option<u32> = conn
                .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
                .ok();
            if version.is_none() {
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    [schema::SCHEMA_VERSION],
                )
                .map_err(|e| StoreError::Database(format!("schema version: {e}")))?;
            }
            Ok(())
        })
    }

    /// Execute a closure with a pooled connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.pool.get()?;
        f(&conn)
    }

    /// Whether a connection can be acquired and answers a trivial query.
    pub fn ping(&self) -> bool {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(StoreError::from)
        })
        .is_ok()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
