//! External scan process invocation.
//!
//! The scanner is an external command; this module owns spawning it and
//! interpreting the little it reports back on stdout.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to spawn scan command: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("scan command exited with status {code:?}: {detail}")]
    NonZeroExit { code: Option<i32>, detail: String },
}

#[derive(Debug, Clone)]
pub struct ScanOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Seam for executing one scan. The production implementation shells out;
/// tests substitute their own.
#[async_trait]
pub trait ScanRunner: Send + Sync {
    async fn run(&self) -> Result<ScanOutput, RunError>;
}

/// Runs the configured scan command as a child process.
pub struct ProcessScanRunner {
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
}

impl ProcessScanRunner {
    pub fn new(program: String, args: Vec<String>, working_dir: PathBuf) -> Self {
        Self {
            program,
            args,
            working_dir,
        }
    }
}

#[async_trait]
impl ScanRunner for ProcessScanRunner {
    async fn run(&self) -> Result<ScanOutput, RunError> {
        debug!(program = %self.program, "Spawning scan command");
        // kill_on_drop so a timed-out run does not leave the child behind
        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(RunError::NonZeroExit {
                code: output.status.code(),
                detail,
            });
        }

        Ok(ScanOutput { stdout, stderr })
    }
}

/// Pull the advisory change count out of the scanner's stdout.
///
/// Looks for a line like `Files with changes: 7`; absent or malformed output
/// counts as zero. The persisted scan rows remain the source of truth.
pub fn extract_change_count(stdout: &str) -> i64 {
    const MARKER: &str = "Files with changes:";
    let Some(pos) = stdout.find(MARKER) else {
        return 0;
    };
    let rest = stdout[pos + MARKER.len()..].trim_start();
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}
