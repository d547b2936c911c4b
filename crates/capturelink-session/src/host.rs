//! The display side of a session.

use capturelink_capture::{
    AmbientLight, DisplaySurfaceParams, FixedSurfaceParams, HostTexture, ReadbackHost,
    ReadbackStatus, ReadbackTicket, RenderEventFn, RenderHost,
};
use capturelink_core::{BridgeError, Resolution};
use glam::Vec2;
use tracing::{debug, info};

/// Everything a session needs from the engine that shows the frames.
pub trait DisplayHost: RenderHost + ReadbackHost + DisplaySurfaceParams {
    /// Show `texture` on the display surface with the given scale.
    fn present(&mut self, texture: &HostTexture, stretch: Vec2);

    fn set_ambient(&mut self, light: AmbientLight);

    /// The producer reported a different source window.
    fn on_source_window(&mut self, _window: u64) {}

    /// Give the display surface back to the host's own content.
    fn release_display(&mut self);

    /// The captured application closed; the session is over.
    fn on_capture_ended(&mut self);
}

/// Host without a GPU. Textures are bookkeeping only and readbacks never start.
#[derive(Debug, Default)]
pub struct HeadlessHost {
    params: FixedSurfaceParams,
    next_texture: u64,
    live_textures: usize,
    plugin_events: u64,
    presented: u64,
    presented_size: Option<Resolution>,
    source_window: u64,
    ambient: Option<AmbientLight>,
    display_released: bool,
    capture_ended: bool,
}

impl HeadlessHost {
    pub fn new(params: FixedSurfaceParams) -> Self {
        Self { params, ..Default::default() }
    }

    pub fn presented_frames(&self) -> u64 {
        self.presented
    }

    pub fn presented_size(&self) -> Option<Resolution> {
        self.presented_size
    }

    pub fn plugin_events(&self) -> u64 {
        self.plugin_events
    }

    pub fn live_textures(&self) -> usize {
        self.live_textures
    }

    pub fn source_window(&self) -> u64 {
        self.source_window
    }

    pub fn ambient(&self) -> Option<AmbientLight> {
        self.ambient
    }

    pub fn display_released(&self) -> bool {
        self.display_released
    }

    pub fn capture_ended(&self) -> bool {
        self.capture_ended
    }
}

impl RenderHost for HeadlessHost {
    fn create_texture(&mut self, resolution: Resolution) -> Result<HostTexture, BridgeError> {
        self.next_texture += 1;
        self.live_textures += 1;
        Ok(HostTexture { id: self.next_texture, native_ptr: 0, resolution })
    }

    fn destroy_texture(&mut self, _texture: HostTexture) {
        self.live_textures = self.live_textures.saturating_sub(1);
    }

    fn issue_plugin_event(&mut self, _func: RenderEventFn, _event_id: i32) {
        self.plugin_events += 1;
    }
}

impl ReadbackHost for HeadlessHost {
    fn request_probe(&mut self, _source: &HostTexture, _chain: &[Resolution]) -> Option<ReadbackTicket> {
        None
    }

    fn poll_readback(&mut self, _ticket: ReadbackTicket) -> ReadbackStatus {
        ReadbackStatus::Failed
    }
}

impl DisplaySurfaceParams for HeadlessHost {
    fn aspect_ratio(&self) -> f32 {
        self.params.aspect_ratio
    }

    fn overscan(&self) -> Vec2 {
        self.params.overscan
    }

    fn light_scale(&self) -> f32 {
        self.params.light_scale
    }
}

impl DisplayHost for HeadlessHost {
    fn present(&mut self, texture: &HostTexture, stretch: Vec2) {
        if self.presented_size != Some(texture.resolution) {
            info!(
                "Presenting {} frames (stretch {:.3}×{:.3})",
                texture.resolution, stretch.x, stretch.y
            );
            self.presented_size = Some(texture.resolution);
        }
        self.presented += 1;
        self.display_released = false;
    }

    fn set_ambient(&mut self, light: AmbientLight) {
        self.ambient = Some(light);
    }

    fn on_source_window(&mut self, window: u64) {
        debug!("Source window {window:#x}");
        self.source_window = window;
    }

    fn release_display(&mut self) {
        self.display_released = true;
    }

    fn on_capture_ended(&mut self) {
        info!("Captured application closed");
        self.capture_ended = true;
    }
}
