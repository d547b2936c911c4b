pub mod config;
pub mod errors;
pub mod target;
pub mod touch;
pub mod types;

pub use config::{AmbientConfig, SessionConfig, TouchConfig};
pub use errors::{
    BackendError, BridgeError, CaptureLinkError, ChannelError, InjectError, LaunchError,
};
pub use target::{CaptureMode, CaptureTarget, DESKTOP_SHM_NAME};
pub use touch::{ContactFlags, TouchContact};
pub use types::*;
