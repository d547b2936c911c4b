//! Process-wide registry of live capture helpers.
//!
//! Every helper spawned by any session is recorded here until its exit is
//! observed. A global shutdown hook calls [`HelperRegistry::terminate_all`]
//! so no helper outlives the host application.

use std::collections::BTreeSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use sysinfo::{Pid, System};
use tracing::{info, warn};

static GLOBAL: Lazy<Arc<HelperRegistry>> = Lazy::new(|| Arc::new(HelperRegistry::default()));

#[derive(Debug, Default)]
pub struct HelperRegistry {
    pids: Mutex<BTreeSet<u32>>,
}

impl HelperRegistry {
    /// The registry shared by all sessions in this process.
    pub fn global() -> Arc<HelperRegistry> {
        Arc::clone(&GLOBAL)
    }

    pub fn register(&self, pid: u32) {
        self.pids.lock().insert(pid);
    }

    pub fn unregister(&self, pid: u32) {
        self.pids.lock().remove(&pid);
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.pids.lock().contains(&pid)
    }

    pub fn len(&self) -> usize {
        self.pids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<u32> {
        self.pids.lock().iter().copied().collect()
    }

    /// Remove every registered pid and hand each one to `kill`.
    pub fn drain_with(&self, mut kill: impl FnMut(u32)) -> usize {
        let pids = std::mem::take(&mut *self.pids.lock());
        let count = pids.len();
        for pid in pids {
            kill(pid);
        }
        count
    }

    /// Force-terminate every registered helper.
    pub fn terminate_all(&self) -> usize {
        let mut system = System::new();
        system.refresh_processes();
        let count = self.drain_with(|pid| {
            let Some(process) = system.process(Pid::from_u32(pid)) else { return };
            if process.kill() {
                info!("Terminated capture helper (PID: {pid})");
            } else {
                warn!("Could not terminate capture helper (PID: {pid})");
            }
        });
        if count > 0 {
            info!("Helper registry drained ({count} helper(s))");
        }
        count
    }
}
