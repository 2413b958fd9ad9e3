//! Periodic scan scheduler.
//!
//! Drives the external scan command on a fixed interval with a single-flight
//! guard: overlapping triggers (timer plus manual) never run two scans at
//! once, the loser is told the work was skipped.

pub mod runner;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::{EventSink, MonitorEvent};
use crate::ingest::timestamp::{format_iso, now_iso};
use self::runner::{extract_change_count, ScanRunner};

/// Hard ceiling on one scan execution. A run that exceeds it is killed and
/// reported as an error.
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

/// Point-in-time view of the scheduler, cheap to read at any time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub running: bool,
    pub scanning: bool,
    pub interval_ms: u64,
    pub last_run: Option<String>,
    pub last_run_duration_ms: Option<u64>,
    pub last_run_status: Option<RunStatus>,
    pub last_run_changes: Option<i64>,
    pub next_run: Option<String>,
    pub run_count: u64,
    pub error_count: u64,
}

/// What one trigger resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another execution already held the single-flight guard.
    Skipped { reason: &'static str },
    Completed { duration_ms: u64, changes: i64 },
    Failed { duration_ms: u64, error: String },
}

#[derive(Debug, Default)]
struct RunState {
    last_run: Option<String>,
    last_run_duration_ms: Option<u64>,
    last_run_status: Option<RunStatus>,
    last_run_changes: Option<i64>,
    next_run: Option<String>,
    run_count: u64,
    error_count: u64,
}

struct Shared {
    runner: Arc<dyn ScanRunner>,
    events: Arc<dyn EventSink>,
    interval: Duration,
    running: AtomicBool,
    scanning: AtomicBool,
    state: Mutex<RunState>,
}

pub struct Scheduler {
    shared: Arc<Shared>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        runner: Arc<dyn ScanRunner>,
        events: Arc<dyn EventSink>,
        interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                runner,
                events,
                interval,
                running: AtomicBool::new(false),
                scanning: AtomicBool::new(false),
                state: Mutex::new(RunState::default()),
            }),
            timer: Mutex::new(None),
        }
    }

    /// Begin periodic execution, with an immediate first run. Idempotent.
    pub fn start(&self) {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Scheduler already running");
            return;
        }

        let interval_ms = self.shared.interval.as_millis() as u64;
        info!(interval_ms, "Scheduler started");
        self.shared
            .events
            .record(&MonitorEvent::SchedulerStarted { interval_ms });

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            loop {
                // Each execution runs in its own task so aborting the timer
                // never cancels a scan mid-flight.
                let run_shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    Shared::execute(&run_shared).await;
                });

                tokio::time::sleep(shared.interval).await;
                if !shared.running.load(Ordering::SeqCst) {
                    break;
                }
            }
        });
        *self.timer.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Stop periodic execution. An in-flight scan is left to finish;
    /// only future timer firings are cancelled. Idempotent.
    pub fn stop(&self) {
        if self
            .shared
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        if let Some(handle) = self
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }

        self.shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .next_run = None;

        info!("Scheduler stopped");
        self.shared.events.record(&MonitorEvent::SchedulerStopped);
    }

    /// Trigger one scan immediately, subject to the single-flight guard.
    /// Works whether or not the periodic timer is running.
    pub async fn run_now(&self) -> RunOutcome {
        Shared::execute(&self.shared).await
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        SchedulerStatus {
            running: self.shared.running.load(Ordering::SeqCst),
            scanning: self.shared.scanning.load(Ordering::SeqCst),
            interval_ms: self.shared.interval.as_millis() as u64,
            last_run: state.last_run.clone(),
            last_run_duration_ms: state.last_run_duration_ms,
            last_run_status: state.last_run_status,
            last_run_changes: state.last_run_changes,
            next_run: state.next_run.clone(),
            run_count: state.run_count,
            error_count: state.error_count,
        }
    }
}

impl Shared {
    async fn execute(shared: &Arc<Shared>) -> RunOutcome {
        if shared
            .scanning
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Scan already in progress, skipping trigger");
            return RunOutcome::Skipped {
                reason: "already_running",
            };
        }

        // Guard held from here on; counted as an attempt either way it ends.
        {
            let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
            state.run_count += 1;
        }

        let started = Instant::now();
        let result = tokio::time::timeout(SCAN_TIMEOUT, shared.runner.run()).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(Ok(output)) => RunOutcome::Completed {
                duration_ms,
                changes: extract_change_count(&output.stdout),
            },
            Ok(Err(e)) => RunOutcome::Failed {
                duration_ms,
                error: e.to_string(),
            },
            Err(_) => RunOutcome::Failed {
                duration_ms,
                error: format!("scan timed out after {}s", SCAN_TIMEOUT.as_secs()),
            },
        };

        {
            let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
            state.last_run = Some(now_iso());
            state.last_run_duration_ms = Some(duration_ms);
            match &outcome {
                RunOutcome::Completed { changes, .. } => {
                    state.last_run_status = Some(RunStatus::Success);
                    state.last_run_changes = Some(*changes);
                }
                RunOutcome::Failed { .. } => {
                    state.last_run_status = Some(RunStatus::Error);
                    state.last_run_changes = None;
                    state.error_count += 1;
                }
                RunOutcome::Skipped { .. } => unreachable!(),
            }
            state.next_run = if shared.running.load(Ordering::SeqCst) {
                let next = chrono::Utc::now()
                    + chrono::Duration::milliseconds(shared.interval.as_millis() as i64);
                Some(format_iso(next))
            } else {
                None
            };
        }

        match &outcome {
            RunOutcome::Completed {
                duration_ms,
                changes,
            } => {
                info!(duration_ms, changes, "Scan run completed");
                shared.events.record(&MonitorEvent::RunCompleted {
                    duration_ms: *duration_ms,
                    changes: *changes,
                });
            }
            RunOutcome::Failed { duration_ms, error } => {
                warn!(duration_ms, %error, "Scan run failed");
                shared.events.record(&MonitorEvent::RunFailed {
                    duration_ms: *duration_ms,
                    error: error.clone(),
                });
            }
            RunOutcome::Skipped { .. } => unreachable!(),
        }

        shared.scanning.store(false, Ordering::SeqCst);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use super::runner::{RunError, ScanOutput};
    use std::sync::atomic::AtomicU64;

    use crate::events::NullEventSink;

    enum Behavior {
        Succeed(&'static str),
        Fail(&'static str),
        /// Sleeps for the given duration before succeeding.
        Slow(Duration),
    }

    struct FakeRunner {
        behavior: Behavior,
        calls: AtomicU64,
    }

    impl FakeRunner {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicU64::new(0),
            })
        }
    }

    #[async_trait]
    impl ScanRunner for FakeRunner {
        async fn run(&self) -> Result<ScanOutput, RunError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Succeed(stdout) => Ok(ScanOutput {
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                }),
                Behavior::Fail(detail) => Err(RunError::NonZeroExit {
                    code: Some(1),
                    detail: detail.to_string(),
                }),
                Behavior::Slow(delay) => {
                    tokio::time::sleep(*delay).await;
                    Ok(ScanOutput {
                        stdout: String::new(),
                        stderr: String::new(),
                    })
                }
            }
        }
    }

    fn scheduler(runner: Arc<FakeRunner>) -> Scheduler {
        Scheduler::new(runner, Arc::new(NullEventSink), Duration::from_secs(300))
    }

    #[tokio::test]
    async fn successful_run_updates_status() {
        let runner = FakeRunner::new(Behavior::Succeed("Files with changes: 3\n"));
        let sched = scheduler(runner.clone());

        let outcome = sched.run_now().await;
        assert!(matches!(outcome, RunOutcome::Completed { changes: 3, .. }));

        let status = sched.status();
        assert!(!status.running);
        assert!(!status.scanning);
        assert_eq!(status.run_count, 1);
        assert_eq!(status.error_count, 0);
        assert_eq!(status.last_run_status, Some(RunStatus::Success));
        assert_eq!(status.last_run_changes, Some(3));
        assert!(status.last_run.is_some());
        // Manual run without the timer schedules nothing
        assert!(status.next_run.is_none());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_run_increments_error_count() {
        let runner = FakeRunner::new(Behavior::Fail("disk on fire"));
        let sched = scheduler(runner);

        let outcome = sched.run_now().await;
        match outcome {
            RunOutcome::Failed { error, .. } => assert!(error.contains("disk on fire")),
            other => panic!("expected failure, got {other:?}"),
        }

        let status = sched.status();
        assert_eq!(status.run_count, 1);
        assert_eq!(status.error_count, 1);
        assert_eq!(status.last_run_status, Some(RunStatus::Error));
        assert_eq!(status.last_run_changes, None);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_triggers_collapse_to_one_run() {
        let runner = FakeRunner::new(Behavior::Slow(Duration::from_millis(50)));
        let sched = Arc::new(scheduler(runner.clone()));

        let (a, b) = tokio::join!(sched.run_now(), sched.run_now());
        let outcomes = [a, b];
        let completed = outcomes
            .iter()
            .filter(|o| matches!(o, RunOutcome::Completed { .. }))
            .count();
        let skipped = outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o,
                    RunOutcome::Skipped {
                        reason: "already_running"
                    }
                )
            })
            .count();
        assert_eq!(completed, 1);
        assert_eq!(skipped, 1);

        // Only the accepted trigger counts as an attempt
        assert_eq!(sched.status().run_count, 1);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overlong_run_is_killed_and_reported() {
        let runner = FakeRunner::new(Behavior::Slow(SCAN_TIMEOUT * 10));
        let sched = scheduler(runner);

        let outcome = sched.run_now().await;
        match outcome {
            RunOutcome::Failed { error, .. } => assert!(error.contains("timed out")),
            other => panic!("expected timeout failure, got {other:?}"),
        }

        let status = sched.status();
        assert_eq!(status.error_count, 1);
        assert!(!status.scanning);
    }

    #[tokio::test(start_paused = true)]
    async fn start_runs_immediately_and_stop_halts_the_timer() {
        let runner = FakeRunner::new(Behavior::Succeed("Files with changes: 0\n"));
        let sched = scheduler(runner.clone());

        sched.start();
        sched.start(); // second call is a no-op

        // Let the immediate first run execute
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);

        let status = sched.status();
        assert!(status.running);
        assert!(status.next_run.is_some());

        sched.stop();
        sched.stop();
        let status = sched.status();
        assert!(!status.running);
        assert!(status.next_run.is_none());

        // No further timer firings after stop
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_repeats_on_the_interval() {
        let runner = FakeRunner::new(Behavior::Succeed("Files with changes: 0\n"));
        let sched = Scheduler::new(
            runner.clone(),
            Arc::new(NullEventSink),
            Duration::from_secs(60),
        );

        sched.start();
        tokio::time::sleep(Duration::from_secs(185)).await;
        sched.stop();

        // Immediate run plus three interval firings
        assert_eq!(runner.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn manual_run_still_works_after_stop() {
        let runner = FakeRunner::new(Behavior::Succeed("Files with changes: 1\n"));
        let sched = scheduler(runner.clone());

        sched.start();
        sched.stop();

        let outcome = sched.run_now().await;
        assert!(matches!(outcome, RunOutcome::Completed { changes: 1, .. }));
    }
}
