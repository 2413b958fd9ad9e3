pub const SCHEMA: &str = r#"
-- Project roots observed by the scanner
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    has_claude_folder INTEGER NOT NULL DEFAULT 0,
    first_seen_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL
);

-- Current state per observed file path, derived from the change stream.
-- Rows are mutated on every change but never deleted.
CREATE TABLE IF NOT EXISTS tracked_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    filename TEXT NOT NULL,
    project_id INTEGER,
    current_size_bytes INTEGER NOT NULL DEFAULT 0,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    first_seen_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    FOREIGN KEY (project_id) REFERENCES projects(id)
);

CREATE INDEX IF NOT EXISTS idx_tracked_files_project ON tracked_files(project_id);
CREATE INDEX IF NOT EXISTS idx_tracked_files_deleted ON tracked_files(is_deleted);
CREATE INDEX IF NOT EXISTS idx_tracked_files_last_seen ON tracked_files(last_seen_at);

-- Scan history: one immutable row per ingested snapshot
CREATE TABLE IF NOT EXISTS scans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_time TEXT NOT NULL,            -- source-formatted timestamp string
    scan_time_iso TEXT NOT NULL,        -- normalized ISO 8601 UTC
    scan_duration_ms INTEGER NOT NULL DEFAULT 0,
    projects_scanned INTEGER NOT NULL DEFAULT 0,
    projects_missing_claude INTEGER NOT NULL DEFAULT 0,
    files_no_change INTEGER NOT NULL DEFAULT 0,
    files_with_change INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_scans_time_iso ON scans(scan_time_iso);

-- One immutable row per file reported as changed within a scan
CREATE TABLE IF NOT EXISTS file_changes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_id INTEGER NOT NULL,
    tracked_file_id INTEGER NOT NULL,
    path TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    delta_size_bytes INTEGER,
    status TEXT NOT NULL,               -- 'NEW', 'MODIFIED', 'DELETED'
    attributes TEXT NOT NULL DEFAULT '[]',  -- JSON array, order preserved
    last_modified TEXT,
    last_modified_iso TEXT,
    FOREIGN KEY (scan_id) REFERENCES scans(id) ON DELETE CASCADE,
    FOREIGN KEY (tracked_file_id) REFERENCES tracked_files(id)
);

CREATE INDEX IF NOT EXISTS idx_file_changes_scan ON file_changes(scan_id);
CREATE INDEX IF NOT EXISTS idx_file_changes_path ON file_changes(path);
CREATE INDEX IF NOT EXISTS idx_file_changes_tracked_file ON file_changes(tracked_file_id);
"#;

/// Idempotent upgrades for databases created by earlier schema versions.
/// Failures (e.g. duplicate column) are ignored by the runner.
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE file_changes ADD COLUMN last_modified_iso TEXT",
    "ALTER TABLE projects ADD COLUMN has_claude_folder INTEGER NOT NULL DEFAULT 0",
];
