//! Observability event log, independent of the scan database.
//!
//! Every scan result and every scheduler state transition is recorded here,
//! including zero-change scans that the skip-empty policy keeps out of the
//! database. This preserves an audit trail regardless of storage policy.

use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

use crate::ingest::timestamp::now_iso;

/// Number of daily event files retained.
const MAX_EVENT_FILES: usize = 7;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// A scan snapshot was persisted with its file changes.
    ScanIngested {
        scan_id: i64,
        files_processed: usize,
        duration_ms: i64,
    },
    /// A zero-change scan was acknowledged but not persisted.
    ScanSkipped {
        files_tracked: i64,
        projects_scanned: i64,
        duration_ms: i64,
    },
    SchedulerStarted {
        interval_ms: u64,
    },
    SchedulerStopped,
    RunCompleted {
        duration_ms: u64,
        changes: i64,
    },
    RunFailed {
        duration_ms: u64,
        error: String,
    },
}

/// Sink for monitor events. Implementations must never fail the caller;
/// a sink that cannot write simply drops the event.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &MonitorEvent);
}

/// Discards all events. Used in tests.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn record(&self, _event: &MonitorEvent) {}
}

/// Appends one JSON line per event to a per-day file in `dir`,
/// `events-YYYY-MM-DD.jsonl`. Old files beyond the retention window are
/// removed when the sink is created.
pub struct JsonlEventSink {
    dir: PathBuf,
    // Serializes appends from the scheduler task and ingest callers.
    write_lock: Mutex<()>,
}

impl JsonlEventSink {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let sink = Self {
            dir,
            write_lock: Mutex::new(()),
        };
        sink.clean_old_files();
        Ok(sink)
    }

    fn file_path(&self) -> PathBuf {
        let today = chrono::Utc::now().format("%Y-%m-%d");
        self.dir.join(format!("events-{today}.jsonl"))
    }

    fn clean_old_files(&self) {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("events-") && n.ends_with(".jsonl"))
                    .unwrap_or(false)
            })
            .collect();

        // Date-stamped names sort chronologically
        files.sort();
        files.reverse();

        for old in files.into_iter().skip(MAX_EVENT_FILES) {
            if let Err(e) = std::fs::remove_file(&old) {
                warn!("Failed to remove old event file {:?}: {}", old, e);
            }
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_path())?;
        writeln!(file, "{line}")
    }
}

impl EventSink for JsonlEventSink {
    fn record(&self, event: &MonitorEvent) {
        let mut value = match serde_json::to_value(event) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => return,
        };
        value.insert("ts".to_string(), serde_json::Value::String(now_iso()));

        let line = serde_json::Value::Object(value).to_string();
        if let Err(e) = self.append(&line) {
            warn!("Failed to write event log entry: {}", e);
        }
    }
}
