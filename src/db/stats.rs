//! Read-only statistics over the stored scan history.

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::debug;

use super::Database;
use crate::error::Result;
use crate::ingest::timestamp::format_iso;

/// Lookback window for aggregate statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Week,
    Month,
    All,
}

impl Period {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "day" => Some(Period::Day),
            "week" => Some(Period::Week),
            "month" => Some(Period::Month),
            "all" => Some(Period::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::All => "all",
        }
    }

    fn window_start(&self) -> String {
        let now = Utc::now();
        match self {
            Period::Day => format_iso(now - Duration::hours(24)),
            Period::Week => format_iso(now - Duration::days(7)),
            Period::Month => format_iso(now - Duration::days(30)),
            Period::All => "1970-01-01T00:00:00.000Z".to_string(),
        }
    }
}

/// Bucket width for trend queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
}

impl Granularity {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hour" => Some(Granularity::Hour),
            "day" => Some(Granularity::Day),
            _ => None,
        }
    }

    fn bucket_format(&self) -> &'static str {
        match self {
            Granularity::Hour => "%Y-%m-%dT%H:00:00.000Z",
            Granularity::Day => "%Y-%m-%dT00:00:00.000Z",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct ChangesByStatus {
    pub new: i64,
    pub modified: i64,
    pub deleted: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveFile {
    pub path: String,
    pub change_count: i64,
    pub last_change: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub period: Period,
    pub total_scans: i64,
    pub total_changes: i64,
    pub total_files_tracked: i64,
    pub active_files: i64,
    pub total_projects: i64,
    pub projects_missing_claude: i64,
    pub changes_by_status: ChangesByStatus,
    pub most_active_files: Vec<ActiveFile>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub timestamp: String,
    pub scans: i64,
    pub changes: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendReport {
    pub granularity: Granularity,
    pub days: i64,
    pub data: Vec<TrendPoint>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastScan {
    pub scan_time: String,
    pub scan_time_iso: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivity {
    pub recent_scans: i64,
    pub recent_changes: i64,
    pub last_scan: Option<LastScan>,
}

impl Database {
    /// Aggregate statistics over the lookback window.
    pub fn stats(&self, period: Period) -> Result<StatsSummary> {
        let start_iso = period.window_start();
        debug!(period = period.as_str(), %start_iso, "Computing statistics");

        self.with_conn(|conn| {
            let (total_scans, total_changes): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(files_with_change), 0) \
                 FROM scans WHERE scan_time_iso >= ?",
                [&start_iso],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            // File and project counts are lifetime, not windowed
            let (total_files_tracked, active_files): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COUNT(CASE WHEN is_deleted = 0 THEN 1 END) \
                 FROM tracked_files",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let (total_projects, projects_missing_claude): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COUNT(CASE WHEN has_claude_folder = 0 THEN 1 END) \
                 FROM projects",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let changes_by_status = conn.query_row(
                "SELECT \
                     COUNT(CASE WHEN fc.status = 'NEW' THEN 1 END), \
                     COUNT(CASE WHEN fc.status = 'MODIFIED' THEN 1 END), \
                     COUNT(CASE WHEN fc.status = 'DELETED' THEN 1 END) \
                 FROM file_changes fc \
                 JOIN scans s ON s.id = fc.scan_id \
                 WHERE s.scan_time_iso >= ?",
                [&start_iso],
                |row| {
                    Ok(ChangesByStatus {
                        new: row.get(0)?,
                        modified: row.get(1)?,
                        deleted: row.get(2)?,
                    })
                },
            )?;

            let mut stmt = conn.prepare(
                "SELECT fc.path, COUNT(*) AS change_count, MAX(s.scan_time) \
                 FROM file_changes fc \
                 JOIN scans s ON s.id = fc.scan_id \
                 WHERE s.scan_time_iso >= ? \
                 GROUP BY fc.path \
                 ORDER BY change_count DESC, fc.path ASC \
                 LIMIT 10",
            )?;
            let most_active_files = stmt
                .query_map([&start_iso], |row| {
                    Ok(ActiveFile {
                        path: row.get(0)?,
                        change_count: row.get(1)?,
                        last_change: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(StatsSummary {
                period,
                total_scans,
                total_changes,
                total_files_tracked,
                active_files,
                total_projects,
                projects_missing_claude,
                changes_by_status,
                most_active_files,
            })
        })
    }

    /// Scan counts and summed changes bucketed by hour or day, ascending.
    ///
    /// `days` is clamped to 1..=90. Buckets with no scans are omitted.
    pub fn trends(&self, days: i64, granularity: Granularity) -> Result<TrendReport> {
        let days = days.clamp(1, 90);
        let start_iso = format_iso(Utc::now() - Duration::days(days));

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT strftime(?1, scan_time_iso) AS bucket, \
                        COUNT(*), COALESCE(SUM(files_with_change), 0) \
                 FROM scans \
                 WHERE scan_time_iso >= ?2 \
                 GROUP BY bucket \
                 ORDER BY bucket ASC",
            )?;
            let data = stmt
                .query_map(
                    rusqlite::params![granularity.bucket_format(), start_iso],
                    |row| {
                        Ok(TrendPoint {
                            timestamp: row.get(0)?,
                            scans: row.get(1)?,
                            changes: row.get(2)?,
                        })
                    },
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(TrendReport {
                granularity,
                days,
                data,
            })
        })
    }

    /// Scan/change counts within the last `hours` (clamped to 1..=168) and
    /// the most recent scan overall.
    pub fn recent_activity(&self, hours: i64) -> Result<RecentActivity> {
        let hours = hours.clamp(1, 168);
        let start_iso = format_iso(Utc::now() - Duration::hours(hours));

        self.with_conn(|conn| {
            let recent_scans: i64 = conn.query_row(
                "SELECT COUNT(*) FROM scans WHERE scan_time_iso >= ?",
                [&start_iso],
                |row| row.get(0),
            )?;

            let recent_changes: i64 = conn.query_row(
                "SELECT COUNT(*) FROM file_changes fc \
                 JOIN scans s ON s.id = fc.scan_id \
                 WHERE s.scan_time_iso >= ?",
                [&start_iso],
                |row| row.get(0),
            )?;

            let last_scan = conn
                .query_row(
                    "SELECT scan_time, scan_time_iso FROM scans \
                     ORDER BY scan_time_iso DESC LIMIT 1",
                    [],
                    |row| {
                        Ok(LastScan {
                            scan_time: row.get(0)?,
                            scan_time_iso: row.get(1)?,
                        })
                    },
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    e => Err(e),
                })?;

            Ok(RecentActivity {
                recent_scans,
                recent_changes,
                last_scan,
            })
        })
    }
}
