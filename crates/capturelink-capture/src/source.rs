//! Frame producers.
//!
//! Every producer satisfies the same contract: it publishes a [`FrameHeader`]
//! in a named shared-memory segment. They differ only in whether this module
//! has to start and supervise the producer.
//!
//! [`FrameHeader`]: capturelink_core::FrameHeader

use std::sync::Arc;

use capturelink_core::{CaptureMode, CaptureTarget, LaunchError, SessionConfig};
use tracing::info;

use crate::launcher::{HelperCommand, HelperLauncher};
use crate::registry::HelperRegistry;
use crate::supervisor::{HelperExit, ProcessSupervisor, SourceMonitor};

pub enum FrameSource<L: HelperLauncher> {
    /// Window, hooked-window, or desktop capture through the helper executable.
    Helper {
        supervisor: ProcessSupervisor<L>,
        shm_name: String,
    },
    /// A producer that already runs on its own.
    External { shm_name: String },
}

impl<L: HelperLauncher> FrameSource<L> {
    pub fn from_target(
        target: &CaptureTarget,
        config: &SessionConfig,
        launcher: L,
        registry: Arc<HelperRegistry>,
    ) -> Self {
        let shm_name = target.shm_name();
        match target.mode {
            CaptureMode::ExternalSource => Self::External { shm_name },
            CaptureMode::ProcessWindow | CaptureMode::HookedWindow | CaptureMode::Desktop => {
                let command = HelperCommand::for_target(config, target);
                Self::Helper {
                    supervisor: ProcessSupervisor::new(
                        launcher,
                        command,
                        registry,
                        config.fast_exit_threshold(),
                    ),
                    shm_name,
                }
            }
        }
    }

    pub fn shm_name(&self) -> &str {
        match self {
            Self::Helper { shm_name, .. } | Self::External { shm_name } => shm_name,
        }
    }

    /// Launch the producer if this source owns one.
    pub fn start(&mut self) -> Result<(), LaunchError> {
        match self {
            Self::Helper { supervisor, .. } => supervisor.start().map(|_| ()),
            Self::External { shm_name } => {
                info!("Waiting for external producer on '{shm_name}'");
                Ok(())
            }
        }
    }

    pub fn stop(&mut self) {
        if let Self::Helper { supervisor, .. } = self {
            supervisor.stop();
        }
    }

    pub fn supervisor(&self) -> Option<&ProcessSupervisor<L>> {
        match self {
            Self::Helper { supervisor, .. } => Some(supervisor),
            Self::External { .. } => None,
        }
    }
}

impl<L: HelperLauncher> SourceMonitor for FrameSource<L> {
    fn poll_exit(&mut self) -> Option<HelperExit> {
        match self {
            Self::Helper { supervisor, .. } => supervisor.poll_exit(),
            Self::External { .. } => None,
        }
    }
}
