//! Native rendering backend seam.
//!
//! The backend is a small native plugin loaded into the host renderer. It
//! holds two pointers (the local texture and the producer's shared handle) and
//! performs the GPU copy when the host invokes its render-event function on
//! the render thread. The logic thread only passes identities across.

use tracing::debug;

/// Opaque address of the plugin's render-thread callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RenderEventFn(pub usize);

/// Event id the plugin interprets as "copy shared surface into local texture".
pub const COPY_FRAME_EVENT: i32 = 1;

pub trait RenderBackend {
    fn render_event_func(&self) -> RenderEventFn;

    /// Register the host texture the plugin copies into. Called once per resize.
    fn set_texture_from_host(&mut self, native_texture: u64);

    /// Register the producer's shared surface. Called every tick.
    fn set_shared_handle(&mut self, handle: u64);
}

impl<B: RenderBackend + ?Sized> RenderBackend for Box<B> {
    fn render_event_func(&self) -> RenderEventFn {
        (**self).render_event_func()
    }

    fn set_texture_from_host(&mut self, native_texture: u64) {
        (**self).set_texture_from_host(native_texture);
    }

    fn set_shared_handle(&mut self, handle: u64) {
        (**self).set_shared_handle(handle);
    }
}

/// Backend without a GPU path; records identities in the log only.
#[derive(Debug, Default)]
pub struct TracingBackend {
    texture: u64,
    shared_handle: u64,
}

impl RenderBackend for TracingBackend {
    fn render_event_func(&self) -> RenderEventFn {
        RenderEventFn::default()
    }

    fn set_texture_from_host(&mut self, native_texture: u64) {
        debug!("Render backend texture → {native_texture:#x}");
        self.texture = native_texture;
    }

    fn set_shared_handle(&mut self, handle: u64) {
        if handle != self.shared_handle {
            debug!("Render backend shared handle → {handle:#x}");
            self.shared_handle = handle;
        }
    }
}

// ── Platform split ─────────────────────────────────────────────────────────────

#[cfg(target_os = "windows")]
pub use crate::backend_win32::NativeRenderPlugin;

#[cfg(not(target_os = "windows"))]
pub use self::unsupported::NativeRenderPlugin;

#[cfg(not(target_os = "windows"))]
mod unsupported {
    use std::path::Path;

    use capturelink_core::BackendError;

    use super::{RenderBackend, RenderEventFn};

    /// Native plugins are Windows DLLs; loading always fails elsewhere.
    #[derive(Debug)]
    pub enum NativeRenderPlugin {}

    impl NativeRenderPlugin {
        pub fn load(path: &Path) -> Result<Self, BackendError> {
            tracing::warn!("Render plugin {} ignored: not on Windows", path.display());
            Err(BackendError::Unsupported)
        }
    }

    impl RenderBackend for NativeRenderPlugin {
        fn render_event_func(&self) -> RenderEventFn {
            match *self {}
        }

        fn set_texture_from_host(&mut self, _native_texture: u64) {
            match *self {}
        }

        fn set_shared_handle(&mut self, _handle: u64) {
            match *self {}
        }
    }
}
