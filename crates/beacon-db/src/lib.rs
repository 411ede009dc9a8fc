pub mod cache;
pub mod directory;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod presence;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

pub struct Database {
    conn: Mutex<Connection>,
    message_table_count: u32,
}

impl Database {
    pub fn open(path: &Path, message_table_count: u32) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let db = Self::init(conn, message_table_count)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory(message_table_count: u32) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, message_table_count)
    }

    fn init(conn: Connection, message_table_count: u32) -> Result<Self> {
        let message_table_count = message_table_count.max(1);
        migrations::run(&conn, message_table_count)?;
        Ok(Self {
            conn: Mutex::new(conn),
            message_table_count,
        })
    }

    pub fn message_table_count(&self) -> u32 {
        self.message_table_count
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    /// Exclusive access for work that opens a transaction.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&mut conn)
    }
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// `?1, ?2, ...` for a dynamic IN list starting at `start`.
pub(crate) fn placeholders(start: usize, n: usize) -> String {
    (start..start + n)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}
