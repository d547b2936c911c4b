//! Capture helper lifecycle.
//!
//! The supervisor launches the helper, notices when it exits, and classifies
//! the exit by how long the helper ran:
//!
//! ```text
//! run < threshold   → TargetNotFoundYet  (relaunch after a fixed delay, forever)
//! run ≥ threshold   → Shutdown           (target closed; end the session)
//! ```
//!
//! The threshold (2 s by default) is a heuristic: the helper exits quickly when
//! the target window does not exist yet, and only exits after a long run when
//! the window it was capturing went away. Under heavy load a slow failure can
//! be misread as a shutdown; there is no status channel from the helper that
//! would allow a stricter test.

use std::sync::Arc;
use std::time::Duration;

use capturelink_core::LaunchError;
use tokio::time::Instant;
use tracing::{error, info};

use crate::launcher::{HelperCommand, HelperHandle, HelperLauncher};
use crate::registry::HelperRegistry;

pub const DEFAULT_FAST_EXIT_THRESHOLD: Duration = Duration::from_secs(2);

// ── Exit classification ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    /// Helper gave up quickly; the target is probably still starting.
    TargetNotFoundYet,
    /// Helper ran and then stopped; the target was closed.
    Shutdown,
}

pub fn classify_exit(run_duration: Duration, threshold: Duration) -> ExitClass {
    if run_duration < threshold {
        ExitClass::TargetNotFoundYet
    } else {
        ExitClass::Shutdown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelperExit {
    pub pid: u32,
    pub run_duration: Duration,
    pub class: ExitClass,
}

/// Anything whose producer can go away while we wait on it.
pub trait SourceMonitor {
    /// Returns the exit exactly once, on the first poll after it happened.
    fn poll_exit(&mut self) -> Option<HelperExit>;
}

// ── HelperProcessState ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelperProcessState {
    pub process_id: Option<u32>,
    pub started_at: Option<Instant>,
    pub last_run_duration: Option<Duration>,
    pub consecutive_fast_exits: u32,
}

// ── ProcessSupervisor ─────────────────────────────────────────────────────────

pub struct ProcessSupervisor<L: HelperLauncher> {
    launcher: L,
    command: HelperCommand,
    registry: Arc<HelperRegistry>,
    fast_exit_threshold: Duration,
    state: HelperProcessState,
    child: Option<L::Handle>,
}

impl<L: HelperLauncher> ProcessSupervisor<L> {
    pub fn new(
        launcher: L,
        command: HelperCommand,
        registry: Arc<HelperRegistry>,
        fast_exit_threshold: Duration,
    ) -> Self {
        Self {
            launcher,
            command,
            registry,
            fast_exit_threshold,
            state: HelperProcessState::default(),
            child: None,
        }
    }

    /// Sweep stray helpers, then spawn a fresh one.
    ///
    /// Launch failures are configuration errors and are not retried here.
    pub fn start(&mut self) -> Result<u32, LaunchError> {
        self.stop();

        let keep = self.registry.snapshot();
        let swept = self.launcher.sweep_orphans(&self.command.process_name, &keep);
        if swept > 0 {
            info!("Removed {swept} orphaned capture helper(s) before launch");
        }

        info!("Launching capture helper: {}", self.command.display());
        let handle = self.launcher.spawn(&self.command).map_err(|e| {
            error!("Failed to start capture helper: {e}");
            e
        })?;

        let pid = handle.id();
        self.registry.register(pid);
        self.state.process_id = Some(pid);
        self.state.started_at = Some(Instant::now());
        self.child = Some(handle);
        info!("Started capture helper (PID: {pid})");
        Ok(pid)
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Kill the helper if it is still running.
    pub fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let pid = child.id();
            child.kill();
            self.registry.unregister(pid);
            info!("Killed capture helper (PID: {pid})");
        }
        self.state.process_id = None;
    }

    pub fn state(&self) -> &HelperProcessState {
        &self.state
    }

    pub fn command(&self) -> &HelperCommand {
        &self.command
    }

    pub fn fast_exit_threshold(&self) -> Duration {
        self.fast_exit_threshold
    }
}

impl<L: HelperLauncher> SourceMonitor for ProcessSupervisor<L> {
    fn poll_exit(&mut self) -> Option<HelperExit> {
        let child = self.child.as_mut()?;
        if !child.has_exited() {
            return None;
        }
        let pid = child.id();
        self.child = None;
        self.registry.unregister(pid);

        let run_duration = self
            .state
            .started_at
            .map(|t| t.elapsed())
            .unwrap_or_default();
        let class = classify_exit(run_duration, self.fast_exit_threshold);

        self.state.process_id = None;
        self.state.last_run_duration = Some(run_duration);
        match class {
            ExitClass::TargetNotFoundYet => {
                self.state.consecutive_fast_exits += 1;
                info!(
                    "Capture helper (PID: {pid}) exited after {:.2}s, target not found yet (attempt {})",
                    run_duration.as_secs_f32(),
                    self.state.consecutive_fast_exits
                );
            }
            ExitClass::Shutdown => {
                self.state.consecutive_fast_exits = 0;
                info!(
                    "Capture helper (PID: {pid}) exited after {:.2}s, capture ended",
                    run_duration.as_secs_f32()
                );
            }
        }
        Some(HelperExit { pid, run_duration, class })
    }
}

impl<L: HelperLauncher> Drop for ProcessSupervisor<L> {
    fn drop(&mut self) {
        self.stop();
    }
}
