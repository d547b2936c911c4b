//! capturelink-capture — frame producer supervision and the shared-memory
//! frame path.
//!
//! # Pipeline
//!
//! ```text
//! ProcessSupervisor ── spawn ──▶ helper (GraphicsCapture.exe --target … --memname …)
//!   │  poll_exit per tick                │ writes 24-byte header
//!   ▼                                    ▼
//! SharedMemoryChannel::connect ──▶ read_header() every tick
//!                                        │
//!                                        ▼
//!                FrameBridge::update ── resize? ──▶ RenderHost::create_texture
//!                        │                              RenderBackend::set_texture_from_host
//!                        └── every tick ──▶ RenderBackend::set_shared_handle
//!                                           RenderHost::issue_plugin_event
//! ```
//!
//! On Windows the segment is a named file mapping and the backend is the
//! native render plugin DLL. Elsewhere segments are files under a directory
//! (`/dev/shm` by default) and only [`TracingBackend`] is available.

pub mod ambient;
pub mod backend;
pub mod bridge;
pub mod launcher;
pub mod registry;
pub mod shm;
pub mod source;
pub mod supervisor;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// ── Platform split ─────────────────────────────────────────────────────────────

#[cfg(target_os = "windows")]
mod backend_win32;
#[cfg(target_os = "windows")]
mod shm_win32;

#[cfg(not(target_os = "windows"))]
mod shm_file;

pub use ambient::{AmbientLight, AmbientSampler, ReadbackHost, ReadbackStatus, ReadbackTicket};
pub use backend::{NativeRenderPlugin, RenderBackend, RenderEventFn, TracingBackend};
pub use bridge::{
    screen_stretch, BridgeState, DisplaySurfaceParams, FixedSurfaceParams, FrameBridge,
    FrameUpdate, HostTexture, RenderHost,
};
pub use launcher::{HelperCommand, HelperHandle, HelperLauncher, OsLauncher, OsProcess};
pub use registry::HelperRegistry;
pub use shm::{ConnectError, SharedMemoryChannel};
pub use source::FrameSource;
pub use supervisor::{
    classify_exit, ExitClass, HelperExit, HelperProcessState, ProcessSupervisor, SourceMonitor,
};
