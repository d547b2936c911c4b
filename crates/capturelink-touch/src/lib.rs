//! capturelink-touch — synthetic multitouch from hand collisions.
//!
//! Two tracked hands report enter/stay/exit against a physical collider on
//! the display surface and a larger hover volume in front of it.
//! [`TouchContactManager`] turns those callbacks into one batched OS touch
//! injection per fixed tick.
//!
//! On Windows batches go through `InjectTouchInput`. Elsewhere
//! [`OsTouchInjector::new`] fails with `InjectError::Unsupported` and
//! [`LoggingInjector`] can be used instead.

pub mod inject;
pub mod manager;
pub mod mapping;

pub use inject::{
    LoggingInjector, OsScreenGeometry, OsTouchInjector, ScreenGeometry, TouchInjector,
    MAX_CONTACTS,
};
pub use manager::{ColliderKind, TouchContactManager};
pub use mapping::{target_pixel, HandSample, SurfaceProjection};
