//! Starting helper processes.
//!
//! [`HelperLauncher`] is the seam between the supervisor's lifecycle policy and
//! the OS. [`OsLauncher`] spawns real processes with `tokio::process` and uses
//! `sysinfo` for the orphan sweep.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use capturelink_core::{CaptureTarget, LaunchError, SessionConfig};
use sysinfo::System;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

// ── HelperCommand ─────────────────────────────────────────────────────────────

/// Everything needed to (re)launch one helper process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Executable name used to find stray copies of this helper.
    pub process_name: String,
}

impl HelperCommand {
    pub fn for_target(config: &SessionConfig, target: &CaptureTarget) -> Self {
        Self {
            program: config.helper_path.clone(),
            args: target.helper_args(),
            working_dir: config.helper_working_dir(),
            process_name: config.helper_process_name(),
        }
    }

    pub fn display(&self) -> String {
        format!("{} {}", self.program.display(), self.args.join(" "))
    }
}

// ── Traits ────────────────────────────────────────────────────────────────────

/// A running helper process.
pub trait HelperHandle {
    fn id(&self) -> u32;

    /// Non-blocking exit check.
    fn has_exited(&mut self) -> bool;

    /// Request termination; does not wait.
    fn kill(&mut self);
}

pub trait HelperLauncher {
    type Handle: HelperHandle;

    /// Kill stray processes named `process_name`, sparing the pids in `keep`.
    /// Returns how many were killed.
    fn sweep_orphans(&mut self, process_name: &str, keep: &[u32]) -> usize;

    fn spawn(&mut self, command: &HelperCommand) -> Result<Self::Handle, LaunchError>;
}

// ── OsLauncher ────────────────────────────────────────────────────────────────

/// Launches real OS processes. Must be used from inside a tokio runtime so the
/// helper's output can be forwarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsLauncher;

pub struct OsProcess {
    child: Child,
    pid: u32,
}

impl OsLauncher {
    /// Start the captured application itself (not the helper).
    pub fn launch_application(&self, path: &Path) -> Result<OsProcess, LaunchError> {
        let full = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().map(|cwd| cwd.join(path)).unwrap_or_else(|_| path.to_path_buf())
        };
        if !full.is_file() {
            return Err(LaunchError::ExecutableMissing { path: full });
        }
        let working_dir = full.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut cmd = application_command(&full);
        cmd.current_dir(&working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = cmd.spawn().map_err(|e| LaunchError::from_spawn(full.clone(), e))?;
        let pid = child.id().unwrap_or_default();
        info!("Launched target application {} (PID: {pid})", full.display());
        Ok(OsProcess { child, pid })
    }
}

impl HelperLauncher for OsLauncher {
    type Handle = OsProcess;

    fn sweep_orphans(&mut self, process_name: &str, keep: &[u32]) -> usize {
        if process_name.is_empty() {
            return 0;
        }
        let mut system = System::new();
        system.refresh_processes();

        let mut killed = 0;
        for process in system.processes_by_exact_name(process_name) {
            let pid = process.pid().as_u32();
            if keep.contains(&pid) {
                continue;
            }
            if process.kill() {
                killed += 1;
                info!("Killed orphaned {process_name} (PID: {pid})");
            } else {
                warn!("Could not kill orphaned {process_name} (PID: {pid})");
            }
        }
        killed
    }

    fn spawn(&mut self, command: &HelperCommand) -> Result<OsProcess, LaunchError> {
        if !command.program.is_file() {
            return Err(LaunchError::ExecutableMissing { path: command.program.clone() });
        }

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(target_os = "windows")]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let mut child = cmd
            .spawn()
            .map_err(|e| LaunchError::from_spawn(command.program.clone(), e))?;
        let pid = child.id().unwrap_or_default();

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, pid, false));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, pid, true));
        }

        Ok(OsProcess { child, pid })
    }
}

impl HelperHandle for OsProcess {
    fn id(&self) -> u32 {
        self.pid
    }

    fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!("Process {} exited with {status}", self.pid);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Process {} status unavailable: {e}", self.pid);
                true
            }
        }
    }

    fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!("Process {} kill: {e}", self.pid);
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn forward_lines<R: AsyncRead + Unpin>(stream: R, pid: u32, is_stderr: bool) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) if is_stderr => {
                warn!(target: "capturelink::helper", "[{pid}] {line}");
            }
            Ok(Some(line)) => {
                info!(target: "capturelink::helper", "[{pid}] {line}");
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Helper {pid} output closed: {e}");
                break;
            }
        }
    }
}

/// Shortcuts and URL files need the shell; everything else runs directly.
fn application_command(path: &Path) -> Command {
    let needs_shell = matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("lnk") | Some("url")
    );
    if cfg!(target_os = "windows") && needs_shell {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg("start").arg("").arg(path);
        cmd
    } else {
        Command::new(path)
    }
}
