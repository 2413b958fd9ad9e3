//! Scan ingestion pipeline.
//!
//! Validates a raw scan snapshot, normalizes its timestamps, and persists the
//! scan together with its file-level deltas in one transaction, keeping the
//! tracked-file registry in step with the change history.

pub mod timestamp;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::{files, ChangeStatus, Database};
use crate::error::{Error, Result};
use crate::events::{EventSink, MonitorEvent};

/// Raw snapshot as posted by the external scanning process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanSnapshot {
    /// Source-formatted timestamp (`M/d/yy h:mm tt`). Required.
    pub scan_time: Option<String>,
    pub scan_duration_ms: i64,
    pub projects_scanned: i64,
    pub projects_missing_claude: i64,
    pub files_no_change: i64,
    pub files_with_change: Vec<ChangeRecord>,
}

/// One changed file within a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub path: String,
    pub size_bytes: i64,
    #[serde(default)]
    pub delta_size_bytes: Option<i64>,
    pub status: ChangeStatus,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

/// Result of ingesting one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored {
        scan_id: i64,
        files_processed: usize,
    },
    /// Acknowledged but not persisted (skip-empty policy).
    Skipped {
        reason: &'static str,
        files_tracked: i64,
    },
}

pub struct Ingestor {
    db: Arc<Database>,
    events: Arc<dyn EventSink>,
    skip_empty: bool,
}

impl Ingestor {
    pub fn new(db: Arc<Database>, events: Arc<dyn EventSink>, skip_empty: bool) -> Self {
        Self {
            db,
            events,
            skip_empty,
        }
    }

    /// Persist one scan snapshot with its file changes.
    ///
    /// Either the scan row and every change row are committed together, or
    /// nothing is. There is no internal retry; a failed snapshot is simply
    /// re-reported by the scanner on its next run.
    pub fn create_scan(&self, snapshot: &ScanSnapshot) -> Result<IngestOutcome> {
        let scan_time = snapshot
            .scan_time
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Validation("scanTime is required".to_string()))?;

        let scan_time_iso = timestamp::normalize_or_now(scan_time);

        if self.skip_empty && snapshot.files_with_change.is_empty() {
            debug!("Skipping DB storage for zero-change scan");
            // The audit trail still gets the event even though storage does not
            self.events.record(&MonitorEvent::ScanSkipped {
                files_tracked: snapshot.files_no_change,
                projects_scanned: snapshot.projects_scanned,
                duration_ms: snapshot.scan_duration_ms,
            });
            return Ok(IngestOutcome::Skipped {
                reason: "no_changes",
                files_tracked: snapshot.files_no_change,
            });
        }

        let files_processed = snapshot.files_with_change.len();
        let scan_id = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO scans (scan_time, scan_time_iso, scan_duration_ms, \
                                    projects_scanned, projects_missing_claude, \
                                    files_no_change, files_with_change) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    scan_time,
                    scan_time_iso,
                    snapshot.scan_duration_ms,
                    snapshot.projects_scanned,
                    snapshot.projects_missing_claude,
                    snapshot.files_no_change,
                    files_processed as i64,
                ],
            )?;
            let scan_id = tx.last_insert_rowid();

            {
                let mut insert_change = tx.prepare(
                    "INSERT INTO file_changes (scan_id, tracked_file_id, path, size_bytes, \
                                               delta_size_bytes, status, attributes, \
                                               last_modified, last_modified_iso) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )?;

                // Input order is preserved; insertion order defines
                // last-write-wins for the registry
                for change in &snapshot.files_with_change {
                    let filename = filename_of(&change.path);
                    let last_modified_iso = change
                        .last_modified
                        .as_deref()
                        .and_then(timestamp::normalize_scan_time);
                    let is_deleted = change.status == ChangeStatus::Deleted;

                    let tracked_file_id = files::upsert_from_change(
                        &tx,
                        &change.path,
                        filename,
                        change.size_bytes,
                        is_deleted,
                        &scan_time_iso,
                    )?;

                    let attributes = serde_json::to_string(&change.attributes)
                        .unwrap_or_else(|_| "[]".to_string());

                    insert_change.execute(rusqlite::params![
                        scan_id,
                        tracked_file_id,
                        change.path,
                        change.size_bytes,
                        change.delta_size_bytes,
                        change.status.as_str(),
                        attributes,
                        change.last_modified,
                        last_modified_iso,
                    ])?;
                }
            }

            tx.commit()?;
            Ok(scan_id)
        })?;

        info!(scan_id, files = files_processed, "Scan recorded");
        self.events.record(&MonitorEvent::ScanIngested {
            scan_id,
            files_processed,
            duration_ms: snapshot.scan_duration_ms,
        });

        Ok(IngestOutcome::Stored {
            scan_id,
            files_processed,
        })
    }
}

/// Final path segment; both separators occur in scanner-reported paths.
fn filename_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{FileQuery, Period};
    use crate::events::NullEventSink;
    use std::sync::Mutex;

    struct RecordingSink {
        events: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }

        fn names(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn record(&self, event: &MonitorEvent) {
            let name = match event {
                MonitorEvent::ScanIngested { .. } => "scan_ingested",
                MonitorEvent::ScanSkipped { .. } => "scan_skipped",
                MonitorEvent::SchedulerStarted { .. } => "scheduler_started",
                MonitorEvent::SchedulerStopped => "scheduler_stopped",
                MonitorEvent::RunCompleted { .. } => "run_completed",
                MonitorEvent::RunFailed { .. } => "run_failed",
            };
            self.events.lock().unwrap().push(name.to_string());
        }
    }

    fn test_db() -> Arc<Database> {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        Arc::new(db)
    }

    fn change(path: &str, size: i64, status: ChangeStatus) -> ChangeRecord {
        ChangeRecord {
            path: path.to_string(),
            size_bytes: size,
            delta_size_bytes: None,
            status,
            attributes: Vec::new(),
            last_modified: None,
        }
    }

    fn snapshot(scan_time: &str, changes: Vec<ChangeRecord>) -> ScanSnapshot {
        ScanSnapshot {
            scan_time: Some(scan_time.to_string()),
            scan_duration_ms: 1200,
            projects_scanned: 4,
            projects_missing_claude: 1,
            files_no_change: 10,
            files_with_change: changes,
        }
    }

    fn row_counts(db: &Database) -> (i64, i64) {
        db.with_conn(|conn| {
            let scans: i64 = conn.query_row("SELECT COUNT(*) FROM scans", [], |r| r.get(0))?;
            let changes: i64 =
                conn.query_row("SELECT COUNT(*) FROM file_changes", [], |r| r.get(0))?;
            Ok((scans, changes))
        })
        .unwrap()
    }

    #[test]
    fn missing_scan_time_is_rejected_without_writes() {
        let db = test_db();
        let ingestor = Ingestor::new(db.clone(), Arc::new(NullEventSink), true);

        let mut snap = snapshot("1/3/26 9:00 AM", vec![change("/a", 1, ChangeStatus::New)]);
        snap.scan_time = None;
        assert!(matches!(
            ingestor.create_scan(&snap),
            Err(Error::Validation(_))
        ));

        snap.scan_time = Some("   ".to_string());
        assert!(matches!(
            ingestor.create_scan(&snap),
            Err(Error::Validation(_))
        ));

        assert_eq!(row_counts(&db), (0, 0));
    }

    #[test]
    fn stored_scan_has_exactly_n_change_rows() {
        let db = test_db();
        let ingestor = Ingestor::new(db.clone(), Arc::new(NullEventSink), true);

        let outcome = ingestor
            .create_scan(&snapshot(
                "1/3/26 9:00 AM",
                vec![
                    change("/a/one.txt", 10, ChangeStatus::New),
                    change("/a/two.txt", 20, ChangeStatus::Modified),
                    change("/a/three.txt", 0, ChangeStatus::Deleted),
                ],
            ))
            .unwrap();

        let scan_id = match outcome {
            IngestOutcome::Stored {
                scan_id,
                files_processed,
            } => {
                assert_eq!(files_processed, 3);
                scan_id
            }
            other => panic!("expected stored outcome, got {other:?}"),
        };

        assert_eq!(row_counts(&db), (1, 3));
        let detail = db.get_scan_by_id(scan_id).unwrap().unwrap();
        assert_eq!(detail.scan.files_with_change, 3);
        assert_eq!(detail.files_with_change.len(), 3);
    }

    #[test]
    fn failed_transaction_leaves_no_rows() {
        let db = test_db();
        let ingestor = Ingestor::new(db.clone(), Arc::new(NullEventSink), true);

        // Force a mid-transaction failure at the registry upsert
        db.with_conn(|conn| {
            conn.execute("DROP TABLE tracked_files", [])?;
            Ok(())
        })
        .unwrap();

        let result = ingestor.create_scan(&snapshot(
            "1/3/26 9:00 AM",
            vec![change("/a/one.txt", 10, ChangeStatus::New)],
        ));
        assert!(matches!(result, Err(Error::Storage(_))));

        let scans: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM scans", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(scans, 0);
    }

    #[test]
    fn skip_empty_never_stores_regardless_of_call_count() {
        let db = test_db();
        let sink = RecordingSink::new();
        let ingestor = Ingestor::new(db.clone(), sink.clone(), true);

        for _ in 0..3 {
            let outcome = ingestor
                .create_scan(&snapshot("1/3/26 9:00 AM", Vec::new()))
                .unwrap();
            assert_eq!(
                outcome,
                IngestOutcome::Skipped {
                    reason: "no_changes",
                    files_tracked: 10,
                }
            );
        }

        assert_eq!(row_counts(&db), (0, 0));
        // The observability event fires even though nothing was persisted
        assert_eq!(sink.names(), vec!["scan_skipped"; 3]);
    }

    #[test]
    fn skip_empty_disabled_stores_zero_change_scan() {
        let db = test_db();
        let ingestor = Ingestor::new(db.clone(), Arc::new(NullEventSink), false);

        let outcome = ingestor
            .create_scan(&snapshot("1/3/26 9:00 AM", Vec::new()))
            .unwrap();
        assert!(matches!(
            outcome,
            IngestOutcome::Stored {
                files_processed: 0,
                ..
            }
        ));
        assert_eq!(row_counts(&db), (1, 0));
    }

    #[test]
    fn registry_tracks_last_change_across_scans() {
        let db = test_db();
        let ingestor = Ingestor::new(db.clone(), Arc::new(NullEventSink), true);

        ingestor
            .create_scan(&snapshot(
                "1/1/25 9:00 AM",
                vec![change("/p/f.txt", 100, ChangeStatus::New)],
            ))
            .unwrap();
        ingestor
            .create_scan(&snapshot(
                "1/1/25 10:00 AM",
                vec![change("/p/f.txt", 180, ChangeStatus::Modified)],
            ))
            .unwrap();

        let files = db
            .list_files(&FileQuery {
                include_deleted: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(files.total_items, 1);
        let file = &files.data[0];
        assert_eq!(file.current_size_bytes, 180);
        assert!(!file.is_deleted);
        assert_eq!(file.filename, "f.txt");
        assert!(file.first_seen_at < file.last_seen_at);
    }

    #[test]
    fn attribute_order_survives_round_trip() {
        let db = test_db();
        let ingestor = Ingestor::new(db.clone(), Arc::new(NullEventSink), true);

        let mut record = change("/p/f.txt", 1, ChangeStatus::Modified);
        record.attributes = vec!["z".to_string(), "a".to_string(), "m".to_string()];
        let outcome = ingestor
            .create_scan(&snapshot("1/1/25 9:00 AM", vec![record]))
            .unwrap();
        let scan_id = match outcome {
            IngestOutcome::Stored { scan_id, .. } => scan_id,
            other => panic!("expected stored outcome, got {other:?}"),
        };

        let detail = db.get_scan_by_id(scan_id).unwrap().unwrap();
        assert_eq!(detail.files_with_change[0].attributes, vec!["z", "a", "m"]);
    }

    #[test]
    fn windows_paths_derive_filename() {
        assert_eq!(filename_of("C:\\work\\app\\notes.md"), "notes.md");
        assert_eq!(filename_of("/home/user/notes.md"), "notes.md");
        assert_eq!(filename_of("notes.md"), "notes.md");
    }

    #[test]
    fn end_to_end_scan_feeds_daily_stats() {
        let db = test_db();
        let ingestor = Ingestor::new(db.clone(), Arc::new(NullEventSink), true);

        // A scan timestamped "now" so the day window includes it
        let scan_time = chrono::Local::now().format("%-m/%-d/%y %-I:%M %p").to_string();
        let mut record = change("/a/b.txt", 100, ChangeStatus::Modified);
        record.delta_size_bytes = Some(10);
        let outcome = ingestor
            .create_scan(&snapshot(&scan_time, vec![record]))
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Stored { .. }));

        let files = db.list_files(&FileQuery::default()).unwrap();
        assert_eq!(files.total_items, 1);
        assert_eq!(files.data[0].current_size_bytes, 100);
        assert!(!files.data[0].is_deleted);

        let stats = db.stats(Period::Day).unwrap();
        assert_eq!(stats.total_scans, 1);
        assert_eq!(stats.changes_by_status.modified, 1);
        assert_eq!(stats.most_active_files[0].path, "/a/b.txt");
    }

    #[test]
    fn snapshot_deserializes_from_scanner_json() {
        let snap: ScanSnapshot = serde_json::from_str(
            r#"{
                "scanTime": "1/3/26 9:00 AM",
                "scanDurationMs": 842,
                "projectsScanned": 12,
                "projectsMissingClaude": 2,
                "filesNoChange": 340,
                "filesWithChange": [
                    {
                        "path": "C:\\work\\app\\notes.md",
                        "sizeBytes": 2048,
                        "deltaSizeBytes": -12,
                        "status": "MODIFIED",
                        "attributes": ["Archive"],
                        "lastModified": "1/3/26 8:59 AM"
                    }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(snap.scan_time.as_deref(), Some("1/3/26 9:00 AM"));
        assert_eq!(snap.files_with_change.len(), 1);
        let change = &snap.files_with_change[0];
        assert_eq!(change.status, ChangeStatus::Modified);
        assert_eq!(change.delta_size_bytes, Some(-12));
    }
}
