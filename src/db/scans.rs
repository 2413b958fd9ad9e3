//! Scan history queries.

use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};

use super::{Database, Page};
use crate::error::{Error, Result};

/// Status of one file within a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeStatus {
    New,
    Modified,
    Deleted,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::New => "NEW",
            ChangeStatus::Modified => "MODIFIED",
            ChangeStatus::Deleted => "DELETED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(ChangeStatus::New),
            "MODIFIED" => Some(ChangeStatus::Modified),
            "DELETED" => Some(ChangeStatus::Deleted),
            _ => None,
        }
    }
}

/// One ingested scan snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scan {
    pub id: i64,
    pub scan_time: String,
    pub scan_time_iso: String,
    pub scan_duration_ms: i64,
    pub projects_scanned: i64,
    pub projects_missing_claude: i64,
    pub files_no_change: i64,
    pub files_with_change: i64,
}

/// Scan plus its per-status change counts, as returned by the list surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    #[serde(flatten)]
    pub scan: Scan,
    pub new_count: i64,
    pub modified_count: i64,
    pub deleted_count: i64,
}

/// One file's reported delta within a scan.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub id: i64,
    pub scan_id: i64,
    pub path: String,
    pub size_bytes: i64,
    pub delta_size_bytes: Option<i64>,
    pub status: ChangeStatus,
    pub attributes: Vec<String>,
    pub last_modified: Option<String>,
    pub last_modified_iso: Option<String>,
}

/// Scan with its full change list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanDetail {
    #[serde(flatten)]
    pub scan: Scan,
    pub files_with_change: Vec<FileChange>,
}

/// Filters for the paginated scan list.
#[derive(Debug, Clone)]
pub struct ScanQuery {
    pub page: i64,
    pub limit: i64,
    /// Inclusive lower bound on `scan_time_iso`.
    pub start_date: Option<String>,
    /// Inclusive upper bound on `scan_time_iso`.
    pub end_date: Option<String>,
    pub has_changes: Option<bool>,
}

impl Default for ScanQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 50,
            start_date: None,
            end_date: None,
            has_changes: None,
        }
    }
}

const SCAN_COLUMNS: &str = "id, scan_time, scan_time_iso, scan_duration_ms, projects_scanned, \
                            projects_missing_claude, files_no_change, files_with_change";

fn scan_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Scan> {
    Ok(Scan {
        id: row.get(0)?,
        scan_time: row.get(1)?,
        scan_time_iso: row.get(2)?,
        scan_duration_ms: row.get(3)?,
        projects_scanned: row.get(4)?,
        projects_missing_claude: row.get(5)?,
        files_no_change: row.get(6)?,
        files_with_change: row.get(7)?,
    })
}

fn change_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileChange> {
    let status: String = row.get(5)?;
    let attributes: Option<String> = row.get(6)?;
    Ok(FileChange {
        id: row.get(0)?,
        scan_id: row.get(1)?,
        path: row.get(2)?,
        size_bytes: row.get(3)?,
        delta_size_bytes: row.get(4)?,
        status: ChangeStatus::from_str(&status).unwrap_or(ChangeStatus::Modified),
        attributes: attributes
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default(),
        last_modified: row.get(7)?,
        last_modified_iso: row.get(8)?,
    })
}

fn changes_for_scan(conn: &Connection, scan_id: i64) -> rusqlite::Result<Vec<FileChange>> {
    let mut stmt = conn.prepare(
        "SELECT id, scan_id, path, size_bytes, delta_size_bytes, status, attributes, \
                last_modified, last_modified_iso \
         FROM file_changes WHERE scan_id = ? ORDER BY status, path",
    )?;
    let changes = stmt
        .query_map([scan_id], change_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(changes)
}

impl Database {
    /// List scans newest first with pagination and optional date/changes filters.
    pub fn list_scans(&self, query: &ScanQuery) -> Result<Page<ScanSummary>> {
        let page = query.page.max(1);
        let limit = query.limit.max(1);
        let offset = (page - 1) * limit;

        let mut conditions: Vec<&str> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref start) = query.start_date {
            conditions.push("scan_time_iso >= ?");
            params.push(Box::new(start.clone()));
        }
        if let Some(ref end) = query.end_date {
            conditions.push("scan_time_iso <= ?");
            params.push(Box::new(end.clone()));
        }
        match query.has_changes {
            Some(true) => conditions.push("files_with_change > 0"),
            Some(false) => conditions.push("files_with_change = 0"),
            None => {}
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM scans {where_clause}"),
                params_from_iter(params.iter()),
                |row| row.get(0),
            )?;

            let sql = format!(
                "SELECT {SCAN_COLUMNS} FROM scans {where_clause} \
                 ORDER BY scan_time_iso DESC LIMIT ? OFFSET ?"
            );
            params.push(Box::new(limit));
            params.push(Box::new(offset));

            let mut stmt = conn.prepare(&sql)?;
            let scans = stmt
                .query_map(params_from_iter(params.iter()), scan_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut counts_stmt = conn.prepare(
                "SELECT \
                     COUNT(CASE WHEN status = 'NEW' THEN 1 END), \
                     COUNT(CASE WHEN status = 'MODIFIED' THEN 1 END), \
                     COUNT(CASE WHEN status = 'DELETED' THEN 1 END) \
                 FROM file_changes WHERE scan_id = ?",
            )?;

            let mut data = Vec::with_capacity(scans.len());
            for scan in scans {
                let (new_count, modified_count, deleted_count) = counts_stmt
                    .query_row([scan.id], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    })?;
                data.push(ScanSummary {
                    scan,
                    new_count,
                    modified_count,
                    deleted_count,
                });
            }

            Ok(Page::new(data, page, limit, total))
        })
    }

    /// Fetch one scan with its changes. `Ok(None)` when the id is unknown.
    pub fn get_scan_by_id(&self, id: i64) -> Result<Option<ScanDetail>> {
        self.with_conn(|conn| {
            let scan = conn.query_row(
                &format!("SELECT {SCAN_COLUMNS} FROM scans WHERE id = ?"),
                [id],
                scan_from_row,
            );
            let scan = match scan {
                Ok(scan) => scan,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                Err(e) => return Err(e.into()),
            };

            let files_with_change = changes_for_scan(conn, scan.id)?;
            Ok(Some(ScanDetail {
                scan,
                files_with_change,
            }))
        })
    }

    /// All scans on a calendar date, ascending, with their changes.
    ///
    /// Accepts `MM-DD-YY` or `YYYY-MM-DD`; anything else is a validation error.
    pub fn scans_for_date(&self, date: &str) -> Result<Vec<ScanDetail>> {
        let (start_iso, end_iso) = parse_date_bounds(date).ok_or_else(|| {
            Error::Validation(format!("invalid date format: {date} (use MM-DD-YY or YYYY-MM-DD)"))
        })?;

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SCAN_COLUMNS} FROM scans \
                 WHERE scan_time_iso >= ? AND scan_time_iso <= ? \
                 ORDER BY scan_time_iso ASC"
            ))?;
            let scans = stmt
                .query_map([&start_iso, &end_iso], scan_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut details = Vec::with_capacity(scans.len());
            for scan in scans {
                let files_with_change = changes_for_scan(conn, scan.id)?;
                details.push(ScanDetail {
                    scan,
                    files_with_change,
                });
            }
            Ok(details)
        })
    }
}

fn parse_date_bounds(date: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = date.split('-').collect();
    if parts.len() != 3 {
        return None;
    }

    let (year, month, day) = match (parts[0].len(), parts[1].len(), parts[2].len()) {
        // MM-DD-YY
        (2, 2, 2) => {
            let mm: u32 = parts[0].parse().ok()?;
            let dd: u32 = parts[1].parse().ok()?;
            let yy: u32 = parts[2].parse().ok()?;
            (2000 + yy, mm, dd)
        }
        // YYYY-MM-DD
        (4, 2, 2) => {
            let year: u32 = parts[0].parse().ok()?;
            let mm: u32 = parts[1].parse().ok()?;
            let dd: u32 = parts[2].parse().ok()?;
            (year, mm, dd)
        }
        _ => return None,
    };

    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    Some((
        format!("{year:04}-{month:02}-{day:02}T00:00:00.000Z"),
        format!("{year:04}-{month:02}-{day:02}T23:59:59.999Z"),
    ))
}
