mod schema;
pub mod files;
pub mod projects;
pub mod scans;
pub mod stats;

use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;

use crate::error::Result;

pub use files::{FileHistory, FileHistoryEntry, FileQuery, TrackedFile};
pub use projects::Project;
pub use scans::{ChangeStatus, FileChange, Scan, ScanDetail, ScanQuery, ScanSummary};
pub use schema::{MIGRATIONS, SCHEMA};
pub use stats::{
    ActiveFile, ChangesByStatus, Granularity, LastScan, Period, RecentActivity, StatsSummary,
    TrendPoint,
};

/// SQLite-backed store for scans, file changes, tracked files, and projects.
///
/// A single connection guarded by a mutex: the control plane is one logical
/// thread of control, and the mutex makes the handle shareable with the
/// scheduler task. Write transactions are the atomicity boundary for
/// ingestion; readers tolerate concurrent writers via WAL.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn initialize(&self) -> Result<()> {
        self.with_conn(|conn| {
            // journal_mode returns the resulting mode as a row
            conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.execute_batch(SCHEMA)?;
            for migration in MIGRATIONS {
                let _ = conn.execute(migration, []);
            }
            Ok(())
        })
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        f(&conn)
    }

    pub(crate) fn with_conn_mut<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut conn)
    }
}

/// Pagination envelope returned by the list surfaces.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total_items: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub(crate) fn new(data: Vec<T>, page: i64, limit: i64, total_items: i64) -> Self {
        let total_pages = if limit > 0 {
            (total_items + limit - 1) / limit
        } else {
            0
        };
        Self {
            data,
            page,
            limit,
            total_items,
            total_pages,
        }
    }
}
