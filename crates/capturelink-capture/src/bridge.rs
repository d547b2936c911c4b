//! Header → local texture + backend registration.
//!
//! ```text
//!            header (w,h,handle≠0)          same (w,h)
//! NoTexture ───────────────────────▶ Ready ───────────▶ Ready
//!                                      │  new (w,h)
//!                                      └──────────▶ destroy, create, register
//! ```
//!
//! Every tick with a nonzero handle the shared handle is registered again and
//! a render event is issued, whether or not the texture was resized. The
//! producer may swap its shared surface without changing dimensions.

use capturelink_core::{BridgeError, FrameHeader, Resolution};
use glam::Vec2;
use tracing::{debug, info, warn};

use crate::backend::{RenderBackend, RenderEventFn, COPY_FRAME_EVENT};

/// Textures this narrow are placeholders and never presented.
pub const MIN_DISPLAY_WIDTH: u32 = 8;

const FALLBACK_ASPECT_RATIO: f32 = 4.0 / 3.0;

// ── Host seam ─────────────────────────────────────────────────────────────────

/// A render texture owned by the host engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostTexture {
    pub id: u64,
    /// Native GPU resource pointer handed to the backend.
    pub native_ptr: u64,
    pub resolution: Resolution,
}

pub trait RenderHost {
    fn create_texture(&mut self, resolution: Resolution) -> Result<HostTexture, BridgeError>;

    fn destroy_texture(&mut self, texture: HostTexture);

    /// Schedule `func(event_id)` on the host's render thread.
    fn issue_plugin_event(&mut self, func: RenderEventFn, event_id: i32);
}

/// Calibration the host display surface exposes for presentation.
pub trait DisplaySurfaceParams {
    fn aspect_ratio(&self) -> f32;
    fn overscan(&self) -> Vec2;
    fn light_scale(&self) -> f32;
}

/// Constant surface parameters, for hosts without a calibrated display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedSurfaceParams {
    pub aspect_ratio: f32,
    pub overscan: Vec2,
    pub light_scale: f32,
}

impl Default for FixedSurfaceParams {
    fn default() -> Self {
        Self { aspect_ratio: FALLBACK_ASPECT_RATIO, overscan: Vec2::ONE, light_scale: 1.0 }
    }
}

impl FixedSurfaceParams {
    /// Copy the current values out of a live host.
    pub fn snapshot(params: &dyn DisplaySurfaceParams) -> Self {
        Self {
            aspect_ratio: params.aspect_ratio(),
            overscan: params.overscan(),
            light_scale: params.light_scale(),
        }
    }
}

impl DisplaySurfaceParams for FixedSurfaceParams {
    fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }

    fn overscan(&self) -> Vec2 {
        self.overscan
    }

    fn light_scale(&self) -> f32 {
        self.light_scale
    }
}

/// Scale applied to the displayed frame so it keeps its own aspect ratio on
/// the host surface, including the surface overscan.
pub fn screen_stretch(texture: Resolution, params: &dyn DisplaySurfaceParams) -> Vec2 {
    let mut surface_aspect = params.aspect_ratio();
    if surface_aspect <= 0.001 {
        surface_aspect = FALLBACK_ASPECT_RATIO;
    }
    let ratio = texture.aspect_ratio() as f32 / surface_aspect;
    let stretch = if ratio < 1.0 { Vec2::new(1.0 / ratio, 1.0) } else { Vec2::new(1.0, ratio) };
    stretch * params.overscan()
}

// ── FrameBridge ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    NoTexture,
    Ready,
}

/// What a single [`FrameBridge::update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameUpdate {
    /// No frame published yet; nothing registered.
    Idle,
    /// Handle registered and copy issued into the existing texture.
    Copied,
    /// Texture (re)allocated, then handle registered and copy issued.
    Resized,
}

pub struct FrameBridge<B: RenderBackend> {
    backend: B,
    texture: Option<HostTexture>,
    shared_handle: u64,
}

impl<B: RenderBackend> FrameBridge<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, texture: None, shared_handle: 0 }
    }

    pub fn state(&self) -> BridgeState {
        if self.texture.is_some() {
            BridgeState::Ready
        } else {
            BridgeState::NoTexture
        }
    }

    pub fn texture(&self) -> Option<&HostTexture> {
        self.texture.as_ref()
    }

    pub fn shared_handle(&self) -> u64 {
        self.shared_handle
    }

    /// Presentable only once a real frame (wider than a placeholder) arrived.
    pub fn has_displayable_texture(&self) -> bool {
        self.texture.is_some_and(|t| t.resolution.width > MIN_DISPLAY_WIDTH)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Apply one header read. Must be called from the logic thread once per tick.
    pub fn update<H: RenderHost>(
        &mut self,
        host: &mut H,
        header: &FrameHeader,
    ) -> Result<FrameUpdate, BridgeError> {
        if header.texture_handle == 0 || !header.has_frame() {
            return Ok(FrameUpdate::Idle);
        }

        let wanted = header.resolution();
        let resized = self.texture.map_or(true, |t| t.resolution != wanted);
        if resized {
            if let Some(old) = self.texture.take() {
                debug!("Destroying {} frame texture", old.resolution);
                host.destroy_texture(old);
            }
            let texture = host.create_texture(wanted)?;
            self.backend.set_texture_from_host(texture.native_ptr);
            info!("Frame texture allocated at {wanted}");
            self.texture = Some(texture);
        }

        if header.texture_handle != self.shared_handle {
            debug!(
                "Shared handle {:#x} → {:#x}",
                self.shared_handle, header.texture_handle
            );
        }
        self.shared_handle = header.texture_handle;
        self.backend.set_shared_handle(header.texture_handle);
        host.issue_plugin_event(self.backend.render_event_func(), COPY_FRAME_EVENT);

        Ok(if resized { FrameUpdate::Resized } else { FrameUpdate::Copied })
    }

    /// Destroy the local texture and forget the shared handle.
    pub fn release<H: RenderHost>(&mut self, host: &mut H) {
        if let Some(texture) = self.texture.take() {
            host.destroy_texture(texture);
            info!("Frame texture released");
        }
        if self.shared_handle != 0 {
            self.backend.set_shared_handle(0);
            self.shared_handle = 0;
        }
    }
}

impl<B: RenderBackend> Drop for FrameBridge<B> {
    fn drop(&mut self) {
        if self.texture.is_some() {
            warn!("FrameBridge dropped without release; host texture leaked");
        }
    }
}
