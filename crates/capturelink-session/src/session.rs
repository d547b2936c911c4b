//! One capture session: producer lifecycle, per-tick frame relay, teardown.
//!
//! ```text
//! start source ──▶ connect ──▶ tick: read header → bridge → present → ambient
//!      ▲              │              │ read error: reconnect
//!      │              │              │
//!      │              └──── producer exited ────┐
//!      │                                        ▼
//!      └─ relaunch delay ◀─ TargetNotFoundYet ─ classify ─ Shutdown ─▶ CaptureEnded
//! ```
//!
//! Everything runs on the caller's task. Suspension happens only at "wait one
//! tick" and "wait the relaunch delay" points, where cancellation is observed.

use std::sync::Arc;
use std::time::Duration;

use capturelink_capture::{
    screen_stretch, AmbientSampler, ConnectError, ExitClass, FixedSurfaceParams, FrameBridge,
    FrameSource, HelperExit, HelperHandle, HelperLauncher, HelperRegistry, OsLauncher, OsProcess,
    RenderBackend, SharedMemoryChannel, SourceMonitor,
};
use capturelink_core::{CaptureLinkError, CaptureTarget, FrameHeader, SessionConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::host::DisplayHost;
use crate::touch::TouchTarget;

#[derive(Debug)]
pub enum SessionOutcome {
    /// The captured application closed.
    CaptureEnded,
    Cancelled,
    /// A configuration-class error; nothing was retried.
    Aborted(CaptureLinkError),
}

enum StreamEnd {
    SourceExited(HelperExit),
    Cancelled,
}

pub struct CaptureSession<L: HelperLauncher, B: RenderBackend, H: DisplayHost> {
    config: SessionConfig,
    target: CaptureTarget,
    source: FrameSource<L>,
    bridge: FrameBridge<B>,
    ambient: AmbientSampler,
    host: H,
    cancel: CancellationToken,
    channel: Option<SharedMemoryChannel>,
    touch: Option<Box<dyn TouchTarget>>,
    application: Option<OsProcess>,
    source_window: u64,
    frames: u64,
}

impl<L: HelperLauncher, B: RenderBackend, H: DisplayHost> CaptureSession<L, B, H> {
    pub fn new(
        config: SessionConfig,
        target: CaptureTarget,
        launcher: L,
        backend: B,
        host: H,
        registry: Arc<HelperRegistry>,
        cancel: CancellationToken,
    ) -> Self {
        let source = FrameSource::from_target(&target, &config, launcher, registry);
        let ambient = AmbientSampler::new(config.ambient.clone());
        Self {
            config,
            target,
            source,
            bridge: FrameBridge::new(backend),
            ambient,
            host,
            cancel,
            channel: None,
            touch: None,
            application: None,
            source_window: 0,
            frames: 0,
        }
    }

    /// Map touch contacts into the producer's source window from now on.
    pub fn attach_touch(&mut self, touch: impl TouchTarget + 'static) {
        self.touch = Some(Box::new(touch));
    }

    /// Whether a shared memory mapping is currently held.
    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Drive the session until the capture ends, the token is cancelled, or a
    /// configuration error aborts it. Always tears down before returning.
    pub async fn run(&mut self) -> SessionOutcome {
        info!(
            "Session[{}] starting ({:?}, shm '{}')",
            self.target.identifier,
            self.target.mode,
            self.source.shm_name()
        );
        self.launch_application();

        let outcome = self.drive().await;
        self.teardown().await;

        match &outcome {
            SessionOutcome::CaptureEnded => self.host.on_capture_ended(),
            SessionOutcome::Cancelled => info!("Session[{}] cancelled", self.target.identifier),
            SessionOutcome::Aborted(e) => error!("Session[{}] aborted: {e}", self.target.identifier),
        }
        outcome
    }

    async fn drive(&mut self) -> SessionOutcome {
        if let Err(e) = self.source.start() {
            return SessionOutcome::Aborted(e.into());
        }

        loop {
            let exit = match self.stream().await {
                StreamEnd::Cancelled => return SessionOutcome::Cancelled,
                StreamEnd::SourceExited(exit) => exit,
            };

            match exit.class {
                ExitClass::Shutdown => return SessionOutcome::CaptureEnded,
                ExitClass::TargetNotFoundYet => {
                    let delay = self.config.relaunch_delay();
                    debug!("Relaunching capture helper in {}ms", delay.as_millis());
                    if !self.wait(delay).await {
                        return SessionOutcome::Cancelled;
                    }
                    if let Err(e) = self.source.start() {
                        return SessionOutcome::Aborted(e.into());
                    }
                }
            }
        }
    }

    /// Connect and relay frames until the producer exits or the session is
    /// cancelled. Read failures drop the mapping and reconnect from scratch.
    /// The live mapping stays with the session until teardown releases it.
    async fn stream(&mut self) -> StreamEnd {
        let name = self.source.shm_name().to_owned();
        let shm_dir = self.config.shm_dir.clone();
        let tick = self.config.tick_interval();

        loop {
            self.channel = None;
            match SharedMemoryChannel::connect(&name, &shm_dir, &mut self.source, &self.cancel, tick).await {
                Ok(channel) => self.channel = Some(channel),
                Err(ConnectError::Cancelled) => return StreamEnd::Cancelled,
                Err(ConnectError::SourceExited(exit)) => return StreamEnd::SourceExited(exit),
            }

            loop {
                if let Some(exit) = self.source.poll_exit() {
                    return StreamEnd::SourceExited(exit);
                }
                let read = match &self.channel {
                    Some(channel) => channel.read_header(),
                    None => break,
                };
                match read {
                    Ok(header) => self.on_header(&header),
                    Err(e) => {
                        warn!("Shared memory '{name}' read failed, reconnecting: {e}");
                        break;
                    }
                }
                if !self.wait(tick).await {
                    return StreamEnd::Cancelled;
                }
            }
        }
    }

    fn on_header(&mut self, header: &FrameHeader) {
        if let Err(e) = self.bridge.update(&mut self.host, header) {
            warn!("Frame texture update failed: {e}");
            return;
        }

        if header.source_window != 0 && header.source_window != self.source_window {
            self.source_window = header.source_window;
            self.host.on_source_window(header.source_window);
            if let Some(touch) = self.touch.as_mut() {
                touch.set_target_window(Some(header.source_window));
            }
        }

        if let Some(texture) = self.bridge.texture().copied() {
            if self.bridge.has_displayable_texture() {
                let stretch = screen_stretch(texture.resolution, &self.host);
                self.host.present(&texture, stretch);
                self.frames += 1;
            }
        }

        let params = FixedSurfaceParams::snapshot(&self.host);
        if let Some(light) = self.ambient.tick(&mut self.host, self.bridge.texture(), &params) {
            self.host.set_ambient(light);
        }
    }

    /// Stop process → release display → wait one tick → release texture and
    /// mapping → finalize.
    async fn teardown(&mut self) {
        info!("Session[{}] tearing down", self.target.identifier);
        self.source.stop();
        self.host.release_display();
        if let Some(touch) = self.touch.as_mut() {
            touch.set_target_window(None);
        }

        tokio::time::sleep(self.config.tick_interval()).await;

        self.ambient.reset();
        self.bridge.release(&mut self.host);
        self.channel = None;
        self.source_window = 0;
        if let Some(mut app) = self.application.take() {
            app.kill();
            info!("Closed target application (PID: {})", app.id());
        }
        info!(
            "Session[{}] finished after {} frame(s)",
            self.target.identifier, self.frames
        );
    }

    fn launch_application(&mut self) {
        let Some(command) = self.target.launch_command.as_deref() else {
            return;
        };
        match OsLauncher.launch_application(command) {
            Ok(process) => self.application = Some(process),
            Err(e) => warn!("Could not launch {}: {e}; capturing anyway", command.display()),
        }
    }

    /// Sleep unless cancelled first. Returns `false` on cancellation.
    async fn wait(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capturelink_capture::testing::{ScriptedLauncher, ScriptedRun};
    use capturelink_capture::TracingBackend;
    use capturelink_core::{HandId, PixelPoint, ScreenRect, TouchConfig};
    use capturelink_touch::{
        ColliderKind, HandSample, LoggingInjector, ScreenGeometry, SurfaceProjection,
        TouchContactManager,
    };
    use glam::{Quat, Vec3};
    use parking_lot::Mutex;
    use std::path::Path;

    use crate::host::HeadlessHost;

    type TestSession = CaptureSession<ScriptedLauncher, TracingBackend, HeadlessHost>;

    fn config(shm_dir: &Path) -> SessionConfig {
        SessionConfig { shm_dir: shm_dir.to_path_buf(), ..Default::default() }
    }

    fn session(
        shm_dir: &Path,
        target: &str,
        launcher: ScriptedLauncher,
        registry: Arc<HelperRegistry>,
        cancel: CancellationToken,
    ) -> TestSession {
        CaptureSession::new(
            config(shm_dir),
            CaptureTarget::parse(target),
            launcher,
            TracingBackend::default(),
            HeadlessHost::default(),
            registry,
            cancel,
        )
    }

    #[cfg(not(target_os = "windows"))]
    fn publish(shm_dir: &Path, name: &str, width: u32, height: u32, handle: u64) {
        let header = FrameHeader { width, height, texture_handle: handle, source_window: 0x0042_0010 };
        std::fs::write(shm_dir.join(name), header.to_le_bytes()).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn long_running_helper_exit_ends_capture() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ScriptedLauncher::new([ScriptedRun::exits_after(Duration::from_millis(2100))]);
        let spawns = launcher.spawns();
        let mut s = session(dir.path(), "game.exe", launcher, Arc::default(), CancellationToken::new());

        let outcome = s.run().await;
        assert!(matches!(outcome, SessionOutcome::CaptureEnded));
        assert_eq!(spawns.lock().len(), 1, "no relaunch after a shutdown");
        assert!(s.host().capture_ended());
        assert!(s.host().display_released());
    }

    #[tokio::test(start_paused = true)]
    async fn fast_exits_are_relaunched_until_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(HelperRegistry::default());
        let launcher = ScriptedLauncher::new([
            ScriptedRun::exits_after(Duration::from_millis(300)),
            ScriptedRun::exits_after(Duration::from_millis(1900)),
            ScriptedRun::never_exits(),
        ]);
        let spawns = launcher.spawns();
        let kills = launcher.kills();
        let cancel = CancellationToken::new();
        let mut s = session(dir.path(), "game.exe", launcher, Arc::clone(&registry), cancel.clone());

        let (outcome, _) = tokio::join!(s.run(), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            cancel.cancel();
        });

        assert!(matches!(outcome, SessionOutcome::Cancelled));
        assert_eq!(spawns.lock().len(), 3);
        assert_eq!(kills.lock().len(), 1, "only the surviving helper is killed");
        assert!(registry.is_empty());
        assert!(!s.host().capture_ended());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_helper_aborts_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ScriptedLauncher::new([ScriptedRun::fails_to_spawn()]);
        let spawns = launcher.spawns();
        let mut s = session(dir.path(), "game.exe", launcher, Arc::default(), CancellationToken::new());

        match s.run().await {
            SessionOutcome::Aborted(e) => assert!(e.is_configuration()),
            other => panic!("expected abort, got {other:?}"),
        }
        assert_eq!(spawns.lock().len(), 1);
    }

    #[cfg(not(target_os = "windows"))]
    #[tokio::test(start_paused = true)]
    async fn frames_are_relayed_and_released_on_teardown() {
        let dir = tempfile::tempdir().unwrap();
        publish(dir.path(), "game.exe_SHM", 640, 480, 0xA1);
        let launcher = ScriptedLauncher::new([ScriptedRun::exits_after(Duration::from_secs(3))]);
        let mut s = session(dir.path(), "game.exe", launcher, Arc::default(), CancellationToken::new());

        let outcome = s.run().await;
        assert!(matches!(outcome, SessionOutcome::CaptureEnded));
        assert!(s.frames() > 100);

        let host = s.into_host();
        assert_eq!(host.presented_size(), Some(capturelink_core::Resolution::new(640, 480)));
        assert_eq!(host.source_window(), 0x0042_0010);
        assert!(host.plugin_events() > 100, "copy is issued every tick");
        assert_eq!(host.live_textures(), 0);
    }

    #[cfg(not(target_os = "windows"))]
    #[tokio::test(start_paused = true)]
    async fn external_source_reconnects_after_segment_vanishes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        publish(&root, "Camera", 320, 240, 0x5);
        let cancel = CancellationToken::new();
        let mut s = session(dir.path(), "spout:Camera", ScriptedLauncher::new([]), Arc::default(), cancel.clone());

        let (outcome, _) = tokio::join!(s.run(), async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            std::fs::remove_file(root.join("Camera")).unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
            publish(&root, "Camera", 1280, 720, 0x6);
            tokio::time::sleep(Duration::from_millis(500)).await;
            cancel.cancel();
        });

        assert!(matches!(outcome, SessionOutcome::Cancelled));
        assert_eq!(s.host().presented_size(), Some(capturelink_core::Resolution::new(1280, 720)));
        assert_eq!(s.host().live_textures(), 0);
    }

    #[cfg(not(target_os = "windows"))]
    #[tokio::test(start_paused = true)]
    async fn mapping_is_held_until_teardown() {
        let dir = tempfile::tempdir().unwrap();
        publish(dir.path(), "game.exe_SHM", 640, 480, 0xA1);
        let launcher = ScriptedLauncher::new([ScriptedRun::never_exits()]);
        let cancel = CancellationToken::new();
        let mut s = session(dir.path(), "game.exe", launcher, Arc::default(), cancel.clone());
        s.source.start().unwrap();

        let (end, _) = tokio::join!(s.stream(), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        });
        assert!(matches!(end, StreamEnd::Cancelled));
        assert!(s.is_connected(), "stream leaves the mapping to teardown");

        s.teardown().await;
        assert!(!s.is_connected());
        assert!(s.host().display_released());
        assert_eq!(s.host().live_textures(), 0);
    }

    struct WindowGeometry;

    impl ScreenGeometry for WindowGeometry {
        fn window_rect(&self, window: u64) -> Option<ScreenRect> {
            (window == 0x0042_0010).then(|| ScreenRect::new(200, 100, 400, 300))
        }

        fn desktop_rect(&self) -> Option<ScreenRect> {
            None
        }
    }

    #[cfg(not(target_os = "windows"))]
    #[tokio::test(start_paused = true)]
    async fn published_source_window_becomes_touch_destination() {
        let dir = tempfile::tempdir().unwrap();
        publish(dir.path(), "game.exe_SHM", 640, 480, 0xA1);
        let launcher = ScriptedLauncher::new([ScriptedRun::never_exits()]);
        let cancel = CancellationToken::new();
        let mut s = session(dir.path(), "game.exe", launcher, Arc::default(), cancel.clone());

        let manager = TouchContactManager::new(TouchConfig::default(), LoggingInjector::default(), WindowGeometry);
        let touch = Arc::new(Mutex::new(manager));
        s.attach_touch(Arc::clone(&touch));

        let (outcome, location) = tokio::join!(s.run(), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let location = {
                let mut m = touch.lock();
                m.on_enter(HandId::Primary, ColliderKind::Hover);
                let sample = HandSample::new(Vec3::ZERO, Quat::IDENTITY);
                m.on_stay(HandId::Primary, ColliderKind::Hover, &sample, &SurfaceProjection::default());
                m.fixed_tick();
                let loc = m.persistent().next().map(|c| c.location);
                loc
            };
            cancel.cancel();
            location
        });

        assert!(matches!(outcome, SessionOutcome::Cancelled));
        assert_eq!(location, Some(PixelPoint::new(400, 250)));
        assert_eq!(touch.lock().injector().batches(), 1);
        assert_eq!(touch.lock().target_window(), None, "cleared on teardown");
    }
}
