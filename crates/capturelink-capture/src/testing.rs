//! Deterministic stand-ins for the OS and the host renderer.
//!
//! Scripted helpers exit on tokio's clock, so tests run them under
//! `#[tokio::test(start_paused = true)]` and move time with `advance`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use capturelink_core::{BridgeError, LaunchError, Resolution};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::ambient::{ReadbackHost, ReadbackStatus, ReadbackTicket};
use crate::backend::{RenderBackend, RenderEventFn};
use crate::bridge::{HostTexture, RenderHost};
use crate::launcher::{HelperCommand, HelperHandle, HelperLauncher};

// ── Scripted helper processes ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedRun {
    ExitsAfter(Duration),
    NeverExits,
    FailsToSpawn,
}

impl ScriptedRun {
    pub fn exits_after(run: Duration) -> Self {
        Self::ExitsAfter(run)
    }

    pub fn never_exits() -> Self {
        Self::NeverExits
    }

    pub fn fails_to_spawn() -> Self {
        Self::FailsToSpawn
    }
}

pub type SweepLog = Arc<Mutex<Vec<(String, Vec<u32>)>>>;

/// Launcher that plays back one [`ScriptedRun`] per spawn. Once the script is
/// used up every further helper runs until killed.
pub struct ScriptedLauncher {
    script: VecDeque<ScriptedRun>,
    next_pid: u32,
    sweeps: SweepLog,
    kills: Arc<Mutex<Vec<u32>>>,
    spawns: Arc<Mutex<Vec<HelperCommand>>>,
}

impl ScriptedLauncher {
    pub fn new(script: impl IntoIterator<Item = ScriptedRun>) -> Self {
        Self {
            script: script.into_iter().collect(),
            next_pid: 4100,
            sweeps: Arc::default(),
            kills: Arc::default(),
            spawns: Arc::default(),
        }
    }

    pub fn sweeps(&self) -> SweepLog {
        Arc::clone(&self.sweeps)
    }

    pub fn kills(&self) -> Arc<Mutex<Vec<u32>>> {
        Arc::clone(&self.kills)
    }

    /// Every command passed to a successful or failed spawn.
    pub fn spawns(&self) -> Arc<Mutex<Vec<HelperCommand>>> {
        Arc::clone(&self.spawns)
    }
}

pub struct ScriptedProcess {
    pid: u32,
    exits_at: Option<Instant>,
    killed: bool,
    kills: Arc<Mutex<Vec<u32>>>,
}

impl HelperHandle for ScriptedProcess {
    fn id(&self) -> u32 {
        self.pid
    }

    fn has_exited(&mut self) -> bool {
        self.killed || self.exits_at.is_some_and(|at| Instant::now() >= at)
    }

    fn kill(&mut self) {
        if !self.killed {
            self.killed = true;
            self.kills.lock().push(self.pid);
        }
    }
}

impl HelperLauncher for ScriptedLauncher {
    type Handle = ScriptedProcess;

    fn sweep_orphans(&mut self, process_name: &str, keep: &[u32]) -> usize {
        self.sweeps.lock().push((process_name.to_owned(), keep.to_vec()));
        0
    }

    fn spawn(&mut self, command: &HelperCommand) -> Result<ScriptedProcess, LaunchError> {
        self.spawns.lock().push(command.clone());
        let exits_at = match self.script.pop_front().unwrap_or(ScriptedRun::NeverExits) {
            ScriptedRun::FailsToSpawn => {
                return Err(LaunchError::ExecutableMissing { path: command.program.clone() })
            }
            ScriptedRun::NeverExits => None,
            ScriptedRun::ExitsAfter(run) => Some(Instant::now() + run),
        };
        let pid = self.next_pid;
        self.next_pid += 1;
        Ok(ScriptedProcess { pid, exits_at, killed: false, kills: Arc::clone(&self.kills) })
    }
}

// ── Recording renderer ────────────────────────────────────────────────────────

/// One observable effect on the host renderer or the native backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeCall {
    CreateTexture(Resolution),
    DestroyTexture(u64),
    SetTexture(u64),
    SetSharedHandle(u64),
    PluginEvent(i32),
}

type CallLog = Arc<Mutex<Vec<BridgeCall>>>;

/// Backend that appends to the log of the [`RecordingHost`] it came from.
#[derive(Debug, Clone)]
pub struct RecordingBackend {
    log: CallLog,
}

impl RenderBackend for RecordingBackend {
    fn render_event_func(&self) -> RenderEventFn {
        RenderEventFn(0xC0FFEE)
    }

    fn set_texture_from_host(&mut self, native_texture: u64) {
        self.log.lock().push(BridgeCall::SetTexture(native_texture));
    }

    fn set_shared_handle(&mut self, handle: u64) {
        self.log.lock().push(BridgeCall::SetSharedHandle(handle));
    }
}

/// In-memory render host. Texture allocation and readback results are
/// scriptable; every call is recorded in order.
#[derive(Debug, Default)]
pub struct RecordingHost {
    log: CallLog,
    next_texture: u64,
    live: Vec<u64>,
    fail_allocations: bool,
    readbacks: VecDeque<ReadbackStatus>,
    probe_requests: Vec<Vec<Resolution>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(&self) -> RecordingBackend {
        RecordingBackend { log: Arc::clone(&self.log) }
    }

    pub fn calls(&self) -> Vec<BridgeCall> {
        self.log.lock().clone()
    }

    pub fn clear_calls(&mut self) {
        self.log.lock().clear();
    }

    pub fn live_textures(&self) -> usize {
        self.live.len()
    }

    pub fn fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    /// Results for successive `poll_readback` calls; `Pending` once exhausted.
    pub fn script_readbacks(&mut self, statuses: impl IntoIterator<Item = ReadbackStatus>) {
        self.readbacks.extend(statuses);
    }

    pub fn probe_requests(&self) -> &[Vec<Resolution>] {
        &self.probe_requests
    }
}

impl RenderHost for RecordingHost {
    fn create_texture(&mut self, resolution: Resolution) -> Result<HostTexture, BridgeError> {
        if self.fail_allocations {
            return Err(BridgeError::TextureAllocation {
                width: resolution.width,
                height: resolution.height,
                reason: "scripted failure".into(),
            });
        }
        self.log.lock().push(BridgeCall::CreateTexture(resolution));
        self.next_texture += 1;
        let id = self.next_texture;
        self.live.push(id);
        Ok(HostTexture { id, native_ptr: 0x1000 + id, resolution })
    }

    fn destroy_texture(&mut self, texture: HostTexture) {
        self.log.lock().push(BridgeCall::DestroyTexture(texture.id));
        self.live.retain(|&id| id != texture.id);
    }

    fn issue_plugin_event(&mut self, _func: RenderEventFn, event_id: i32) {
        self.log.lock().push(BridgeCall::PluginEvent(event_id));
    }
}

impl ReadbackHost for RecordingHost {
    fn request_probe(&mut self, _source: &HostTexture, chain: &[Resolution]) -> Option<ReadbackTicket> {
        self.probe_requests.push(chain.to_vec());
        Some(ReadbackTicket(self.probe_requests.len() as u64))
    }

    fn poll_readback(&mut self, _ticket: ReadbackTicket) -> ReadbackStatus {
        self.readbacks.pop_front().unwrap_or(ReadbackStatus::Pending)
    }
}
