//! Project roots. Created lazily by backfill or registration, never deleted.

use serde::Serialize;

use super::Database;
use crate::error::Result;
use crate::ingest::timestamp::now_iso;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub path: String,
    pub name: String,
    pub has_claude_folder: bool,
    pub first_seen_at: String,
    pub last_seen_at: String,
}

impl Database {
    /// Insert or refresh a project keyed by its unique path, returning its id.
    pub fn record_project(&self, path: &str, name: &str, has_claude_folder: bool) -> Result<i64> {
        let now = now_iso();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO projects (path, name, has_claude_folder, first_seen_at, last_seen_at) \
                 VALUES (?1, ?2, ?3, ?4, ?4) \
                 ON CONFLICT(path) DO UPDATE SET \
                     name = excluded.name, \
                     has_claude_folder = excluded.has_claude_folder, \
                     last_seen_at = excluded.last_seen_at",
                rusqlite::params![path, name, has_claude_folder, now],
            )?;
            Ok(conn.query_row(
                "SELECT id FROM projects WHERE path = ?",
                [path],
                |row| row.get(0),
            )?)
        })
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, path, name, has_claude_folder, first_seen_at, last_seen_at \
                 FROM projects ORDER BY name",
            )?;
            let projects = stmt
                .query_map([], |row| {
                    Ok(Project {
                        id: row.get(0)?,
                        path: row.get(1)?,
                        name: row.get(2)?,
                        has_claude_folder: row.get::<_, i64>(3)? != 0,
                        first_seen_at: row.get(4)?,
                        last_seen_at: row.get(5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(projects)
        })
    }
}
