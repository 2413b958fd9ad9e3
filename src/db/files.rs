//! Tracked-file registry: the current-state record for every observed path.

use rusqlite::{params_from_iter, Connection};
use serde::Serialize;

use super::{ChangeStatus, Database, Page};
use crate::error::{Error, Result};

/// Minimum length for substring search queries.
const MIN_SEARCH_LEN: usize = 2;

/// Latest-known state for one file path, derived from its change history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedFile {
    pub id: i64,
    pub path: String,
    pub filename: String,
    pub project_id: Option<i64>,
    pub project_name: Option<String>,
    pub current_size_bytes: i64,
    pub is_deleted: bool,
    pub first_seen_at: String,
    pub last_seen_at: String,
}

/// Filters for the paginated tracked-file list.
#[derive(Debug, Clone)]
pub struct FileQuery {
    pub page: i64,
    pub limit: i64,
    pub project_id: Option<i64>,
    pub include_deleted: bool,
}

impl Default for FileQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 100,
            project_id: None,
            include_deleted: false,
        }
    }
}

/// One historical change for a file, joined with its scan.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHistoryEntry {
    pub scan_id: i64,
    pub scan_time: String,
    pub scan_time_iso: String,
    pub status: ChangeStatus,
    pub size_bytes: i64,
    pub delta_size_bytes: Option<i64>,
    pub attributes: Vec<String>,
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHistory {
    pub file: TrackedFile,
    pub history: Vec<FileHistoryEntry>,
}

/// Insert or refresh the current-state row for `path`, returning its id.
///
/// Must run inside the same transaction as the owning `file_changes` insert
/// so a crash mid-scan cannot leave registry and history diverged.
pub(crate) fn upsert_from_change(
    conn: &Connection,
    path: &str,
    filename: &str,
    size_bytes: i64,
    is_deleted: bool,
    scan_time_iso: &str,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO tracked_files (path, filename, first_seen_at, last_seen_at, \
                                    current_size_bytes, is_deleted) \
         VALUES (?1, ?2, ?3, ?3, ?4, ?5) \
         ON CONFLICT(path) DO UPDATE SET \
             last_seen_at = excluded.last_seen_at, \
             current_size_bytes = excluded.current_size_bytes, \
             is_deleted = excluded.is_deleted",
        rusqlite::params![path, filename, scan_time_iso, size_bytes, is_deleted],
    )?;
    conn.query_row(
        "SELECT id FROM tracked_files WHERE path = ?",
        [path],
        |row| row.get(0),
    )
}

const FILE_COLUMNS: &str = "tf.id, tf.path, tf.filename, tf.project_id, p.name, \
                            tf.current_size_bytes, tf.is_deleted, tf.first_seen_at, tf.last_seen_at";

fn file_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackedFile> {
    Ok(TrackedFile {
        id: row.get(0)?,
        path: row.get(1)?,
        filename: row.get(2)?,
        project_id: row.get(3)?,
        project_name: row.get(4)?,
        current_size_bytes: row.get(5)?,
        is_deleted: row.get::<_, i64>(6)? != 0,
        first_seen_at: row.get(7)?,
        last_seen_at: row.get(8)?,
    })
}

impl Database {
    /// List tracked files, most recently seen first.
    pub fn list_files(&self, query: &FileQuery) -> Result<Page<TrackedFile>> {
        let page = query.page.max(1);
        let limit = query.limit.max(1);
        let offset = (page - 1) * limit;

        let mut conditions: Vec<&str> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(project_id) = query.project_id {
            conditions.push("tf.project_id = ?");
            params.push(Box::new(project_id));
        }
        if !query.include_deleted {
            conditions.push("tf.is_deleted = 0");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM tracked_files tf {where_clause}"),
                params_from_iter(params.iter()),
                |row| row.get(0),
            )?;

            let sql = format!(
                "SELECT {FILE_COLUMNS} FROM tracked_files tf \
                 LEFT JOIN projects p ON p.id = tf.project_id \
                 {where_clause} \
                 ORDER BY tf.last_seen_at DESC LIMIT ? OFFSET ?"
            );
            params.push(Box::new(limit));
            params.push(Box::new(offset));

            let mut stmt = conn.prepare(&sql)?;
            let files = stmt
                .query_map(params_from_iter(params.iter()), file_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(Page::new(files, page, limit, total))
        })
    }

    /// Fetch one tracked file. `Ok(None)` when the id is unknown.
    pub fn get_file_by_id(&self, id: i64) -> Result<Option<TrackedFile>> {
        self.with_conn(|conn| {
            let result = conn.query_row(
                &format!(
                    "SELECT {FILE_COLUMNS} FROM tracked_files tf \
                     LEFT JOIN projects p ON p.id = tf.project_id \
                     WHERE tf.id = ?"
                ),
                [id],
                file_from_row,
            );
            match result {
                Ok(file) => Ok(Some(file)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Substring search over path and filename, most recently seen first.
    pub fn search_files(&self, query: &str, limit: i64) -> Result<Vec<TrackedFile>> {
        if query.chars().count() < MIN_SEARCH_LEN {
            return Err(Error::Validation(format!(
                "search query must be at least {MIN_SEARCH_LEN} characters"
            )));
        }
        let pattern = format!("%{query}%");

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FILE_COLUMNS} FROM tracked_files tf \
                 LEFT JOIN projects p ON p.id = tf.project_id \
                 WHERE tf.path LIKE ?1 OR tf.filename LIKE ?1 \
                 ORDER BY tf.last_seen_at DESC LIMIT ?2"
            ))?;
            let files = stmt
                .query_map(rusqlite::params![pattern, limit.max(1)], file_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(files)
        })
    }

    /// Change history for a file, newest first. `Ok(None)` for unknown ids.
    pub fn file_history(&self, id: i64, limit: i64) -> Result<Option<FileHistory>> {
        let file = match self.get_file_by_id(id)? {
            Some(file) => file,
            None => return Ok(None),
        };

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT fc.scan_id, s.scan_time, s.scan_time_iso, fc.status, fc.size_bytes, \
                        fc.delta_size_bytes, fc.attributes, fc.last_modified \
                 FROM file_changes fc \
                 JOIN scans s ON s.id = fc.scan_id \
                 WHERE fc.tracked_file_id = ? \
                 ORDER BY s.scan_time_iso DESC \
                 LIMIT ?",
            )?;
            let history = stmt
                .query_map(rusqlite::params![id, limit.max(1)], |row| {
                    let status: String = row.get(3)?;
                    let attributes: Option<String> = row.get(6)?;
                    Ok(FileHistoryEntry {
                        scan_id: row.get(0)?,
                        scan_time: row.get(1)?,
                        scan_time_iso: row.get(2)?,
                        status: ChangeStatus::from_str(&status).unwrap_or(ChangeStatus::Modified),
                        size_bytes: row.get(4)?,
                        delta_size_bytes: row.get(5)?,
                        attributes: attributes
                            .as_deref()
                            .and_then(|s| serde_json::from_str(s).ok())
                            .unwrap_or_default(),
                        last_modified: row.get(7)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(Some(FileHistory { file, history }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn upsert(db: &Database, path: &str, size: i64, deleted: bool, iso: &str) -> i64 {
        db.with_conn(|conn| {
            let filename = path.rsplit('/').next().unwrap_or(path);
            Ok(upsert_from_change(conn, path, filename, size, deleted, iso)?)
        })
        .unwrap()
    }

    #[test]
    fn registry_converges_on_last_change() {
        let db = test_db();

        let first = upsert(&db, "/a/b.txt", 100, false, "2025-06-01T10:00:00.000Z");
        let second = upsert(&db, "/a/b.txt", 250, false, "2025-06-01T11:00:00.000Z");
        let third = upsert(&db, "/a/b.txt", 0, true, "2025-06-01T12:00:00.000Z");
        assert_eq!(first, second);
        assert_eq!(second, third);

        let file = db.get_file_by_id(first).unwrap().unwrap();
        assert_eq!(file.current_size_bytes, 0);
        assert!(file.is_deleted);
        // first_seen_at from the first change, last_seen_at from the last
        assert_eq!(file.first_seen_at, "2025-06-01T10:00:00.000Z");
        assert_eq!(file.last_seen_at, "2025-06-01T12:00:00.000Z");
    }

    #[test]
    fn deleted_rows_are_retained_but_filtered_by_default() {
        let db = test_db();
        upsert(&db, "/a/live.txt", 10, false, "2025-06-01T10:00:00.000Z");
        upsert(&db, "/a/gone.txt", 0, true, "2025-06-01T10:00:00.000Z");

        let active = db.list_files(&FileQuery::default()).unwrap();
        assert_eq!(active.total_items, 1);
        assert_eq!(active.data[0].path, "/a/live.txt");

        let all = db
            .list_files(&FileQuery {
                include_deleted: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(all.total_items, 2);
    }

    #[test]
    fn search_requires_min_length() {
        let db = test_db();
        let err = db.search_files("a", 50).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn search_matches_path_and_filename() {
        let db = test_db();
        upsert(&db, "/proj/src/main.rs", 10, false, "2025-06-01T10:00:00.000Z");
        upsert(&db, "/proj/notes.md", 20, false, "2025-06-01T10:00:00.000Z");

        let by_filename = db.search_files("main", 50).unwrap();
        assert_eq!(by_filename.len(), 1);
        assert_eq!(by_filename[0].filename, "main.rs");

        let by_path = db.search_files("proj", 50).unwrap();
        assert_eq!(by_path.len(), 2);
    }

    #[test]
    fn unknown_file_id_is_absent() {
        let db = test_db();
        assert!(db.get_file_by_id(42).unwrap().is_none());
        assert!(db.file_history(42, 50).unwrap().is_none());
    }
}
