//! Routes the producer's source window to touch synthesis.

use std::sync::Arc;

use capturelink_touch::{ScreenGeometry, TouchContactManager, TouchInjector};
use parking_lot::Mutex;

/// Receives the window whose screen rect touch contacts are mapped into.
/// `None` once the capture is torn down.
pub trait TouchTarget {
    fn set_target_window(&mut self, window: Option<u64>);
}

impl<I: TouchInjector, G: ScreenGeometry> TouchTarget for TouchContactManager<I, G> {
    fn set_target_window(&mut self, window: Option<u64>) {
        TouchContactManager::set_target_window(self, window);
    }
}

/// A manager shared with whatever feeds it hand events.
impl<T: TouchTarget + ?Sized> TouchTarget for Arc<Mutex<T>> {
    fn set_target_window(&mut self, window: Option<u64>) {
        self.lock().set_target_window(window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capturelink_core::{ScreenRect, TouchConfig};
    use capturelink_touch::LoggingInjector;

    struct NoGeometry;

    impl ScreenGeometry for NoGeometry {
        fn window_rect(&self, _window: u64) -> Option<ScreenRect> {
            None
        }

        fn desktop_rect(&self) -> Option<ScreenRect> {
            None
        }
    }

    #[test]
    fn shared_manager_sees_window_updates() {
        let manager = TouchContactManager::new(TouchConfig::default(), LoggingInjector::default(), NoGeometry);
        let shared = Arc::new(Mutex::new(manager));
        let mut target: Box<dyn TouchTarget> = Box::new(Arc::clone(&shared));

        target.set_target_window(Some(0x77));
        assert_eq!(shared.lock().target_window(), Some(0x77));
        target.set_target_window(None);
        assert_eq!(shared.lock().target_window(), None);
    }
}
