//! Receive-only view of the helper's shared-memory header.
//!
//! The producer writes the header without any synchronisation, so a read can
//! observe a half-updated record or a segment that is being torn down. Any
//! read failure is reported to the caller, which drops the channel and starts
//! a fresh [`SharedMemoryChannel::connect`]. A single torn value is corrected
//! on the next tick.

use std::path::Path;
use std::time::Duration;

use capturelink_core::{ChannelError, FrameHeader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::supervisor::{HelperExit, SourceMonitor};

#[cfg(target_os = "windows")]
use crate::shm_win32::Segment;
#[cfg(not(target_os = "windows"))]
use crate::shm_file::Segment;

/// Why [`SharedMemoryChannel::connect`] stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    /// The producer exited before the segment appeared.
    SourceExited(HelperExit),
    /// The session was cancelled.
    Cancelled,
}

pub struct SharedMemoryChannel {
    name: String,
    segment: Segment,
}

impl SharedMemoryChannel {
    /// One non-blocking attempt to map the named segment.
    pub fn try_open(name: &str, shm_dir: &Path) -> Result<Option<Self>, ChannelError> {
        Ok(Segment::open(name, shm_dir)?.map(|segment| Self {
            name: name.to_owned(),
            segment,
        }))
    }

    /// Poll once per tick until the segment exists, the producer exits, or
    /// `cancel` fires. A missing segment is never an error on its own.
    pub async fn connect<M: SourceMonitor>(
        name: &str,
        shm_dir: &Path,
        monitor: &mut M,
        cancel: &CancellationToken,
        tick: Duration,
    ) -> Result<Self, ConnectError> {
        let mut polls: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(ConnectError::Cancelled);
            }

            match Self::try_open(name, shm_dir) {
                Ok(Some(channel)) => {
                    info!("Connected to shared memory '{name}' after {polls} poll(s)");
                    return Ok(channel);
                }
                Ok(None) => {}
                Err(e) => debug!("Shared memory '{name}' not ready: {e}"),
            }

            if let Some(exit) = monitor.poll_exit() {
                info!("Producer for '{name}' exited while waiting for shared memory");
                return Err(ConnectError::SourceExited(exit));
            }

            polls += 1;
            tokio::select! {
                _ = cancel.cancelled() => return Err(ConnectError::Cancelled),
                _ = tokio::time::sleep(tick) => {}
            }
        }
    }

    /// Read the current header. Never writes to the segment.
    pub fn read_header(&self) -> Result<FrameHeader, ChannelError> {
        let raw = self.segment.read()?;
        FrameHeader::from_le_bytes(&raw).ok_or_else(|| ChannelError::Truncated {
            name: self.name.clone(),
            len: raw.len(),
            needed: FrameHeader::SIZE,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for SharedMemoryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMemoryChannel").field("name", &self.name).finish()
    }
}

#[cfg(all(test, not(target_os = "windows")))]
mod tests {
    use super::*;
    use crate::supervisor::ExitClass;
    use std::fs;
    use std::path::PathBuf;

    const TICK: Duration = Duration::from_millis(16);

    fn write_header(dir: &Path, name: &str, header: FrameHeader) {
        fs::write(dir.join(name), header.to_le_bytes()).unwrap();
    }

    fn header(width: u32, height: u32, handle: u64) -> FrameHeader {
        FrameHeader { width, height, texture_handle: handle, source_window: 0x42 }
    }

    /// Monitor driven by a closure called on every poll.
    struct PollHook<F: FnMut(u32) -> Option<HelperExit>> {
        polls: u32,
        hook: F,
    }

    impl<F: FnMut(u32) -> Option<HelperExit>> SourceMonitor for PollHook<F> {
        fn poll_exit(&mut self) -> Option<HelperExit> {
            self.polls += 1;
            (self.hook)(self.polls)
        }
    }

    fn exit() -> HelperExit {
        HelperExit { pid: 7, run_duration: Duration::ZERO, class: ExitClass::TargetNotFoundYet }
    }

    #[test]
    fn reads_live_header_updates() {
        let dir = tempfile::tempdir().unwrap();
        write_header(dir.path(), "game.exe_SHM", header(640, 480, 0xA1));

        let channel = SharedMemoryChannel::try_open("game.exe_SHM", dir.path()).unwrap().unwrap();
        assert_eq!(channel.read_header().unwrap(), header(640, 480, 0xA1));

        write_header(dir.path(), "game.exe_SHM", header(640, 480, 0xB2));
        assert_eq!(channel.read_header().unwrap().texture_handle, 0xB2);
    }

    #[test]
    fn missing_or_short_segment_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SharedMemoryChannel::try_open("absent", dir.path()).unwrap().is_none());

        fs::write(dir.path().join("short"), [0u8; 10]).unwrap();
        assert!(SharedMemoryChannel::try_open("short", dir.path()).unwrap().is_none());
    }

    #[test]
    fn removed_segment_reads_as_vanished() {
        let dir = tempfile::tempdir().unwrap();
        write_header(dir.path(), "seg", header(1, 1, 1));
        let channel = SharedMemoryChannel::try_open("seg", dir.path()).unwrap().unwrap();

        fs::remove_file(dir.path().join("seg")).unwrap();
        assert!(matches!(channel.read_header(), Err(ChannelError::Vanished { .. })));
    }

    #[test]
    fn truncated_segment_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_header(dir.path(), "seg", header(1, 1, 1));
        let channel = SharedMemoryChannel::try_open("seg", dir.path()).unwrap().unwrap();

        fs::OpenOptions::new()
            .write(true)
            .open(dir.path().join("seg"))
            .unwrap()
            .set_len(8)
            .unwrap();
        assert!(matches!(channel.read_header(), Err(ChannelError::Truncated { len: 8, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_waits_for_segment_to_appear() {
        let dir = tempfile::tempdir().unwrap();
        let root: PathBuf = dir.path().to_path_buf();
        let mut monitor = PollHook {
            polls: 0,
            hook: |polls| {
                if polls == 3 {
                    write_header(&root, "late_SHM", header(800, 600, 9));
                }
                None
            },
        };

        let channel = SharedMemoryChannel::connect(
            "late_SHM",
            dir.path(),
            &mut monitor,
            &CancellationToken::new(),
            TICK,
        )
        .await
        .unwrap();
        assert_eq!(channel.read_header().unwrap().width, 800);
        assert_eq!(monitor.polls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_ends_when_producer_exits() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = PollHook { polls: 0, hook: |_| Some(exit()) };
        let started = tokio::time::Instant::now();

        let result = SharedMemoryChannel::connect(
            "never_SHM",
            dir.path(),
            &mut monitor,
            &CancellationToken::new(),
            TICK,
        )
        .await;

        assert_eq!(result.unwrap_err(), ConnectError::SourceExited(exit()));
        assert!(started.elapsed() < TICK, "no tick spent after the exit was seen");
    }

    #[tokio::test(start_paused = true)]
    async fn connect_observes_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut monitor = PollHook {
            polls: 0,
            hook: move |polls| {
                if polls == 5 {
                    trigger.cancel();
                }
                None
            },
        };

        let result =
            SharedMemoryChannel::connect("never_SHM", dir.path(), &mut monitor, &cancel, TICK).await;
        assert_eq!(result.unwrap_err(), ConnectError::Cancelled);
        assert_eq!(monitor.polls, 5);
    }
}
