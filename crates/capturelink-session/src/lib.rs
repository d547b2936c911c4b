//! capturelink-session — ties a frame source, the frame bridge and a display
//! host into one cooperative session loop.

pub mod host;
pub mod replay;
pub mod session;
pub mod touch;

pub use host::{DisplayHost, HeadlessHost};
pub use replay::{parse_line, ReplayDriver, ReplayEvent};
pub use session::{CaptureSession, SessionOutcome};
pub use touch::TouchTarget;
