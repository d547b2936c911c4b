//! OS touch injection and screen geometry.
//!
//! [`ContactFlags`] bit values are the Win32 `POINTER_FLAG_*` values, so a
//! batch maps onto `POINTER_TOUCH_INFO` records without translation.
//!
//! [`ContactFlags`]: capturelink_core::ContactFlags

use capturelink_core::{InjectError, ScreenRect, TouchContact};
use tracing::debug;

/// Number of simultaneous contacts the OS is told to expect (one per hand).
pub const MAX_CONTACTS: u32 = 2;

pub trait TouchInjector {
    /// Submit one batch. Called at most once per fixed tick.
    fn inject(&mut self, contacts: &[TouchContact]) -> Result<(), InjectError>;
}

impl<T: TouchInjector + ?Sized> TouchInjector for Box<T> {
    fn inject(&mut self, contacts: &[TouchContact]) -> Result<(), InjectError> {
        (**self).inject(contacts)
    }
}

/// Where the destination surface sits on the virtual desktop.
pub trait ScreenGeometry {
    /// Screen rectangle of the window whose handle the producer published.
    fn window_rect(&self, window: u64) -> Option<ScreenRect>;

    fn desktop_rect(&self) -> Option<ScreenRect>;
}

/// Injector that only logs each batch. Used where OS injection is unavailable.
#[derive(Debug, Default)]
pub struct LoggingInjector {
    batches: u64,
}

impl LoggingInjector {
    pub fn batches(&self) -> u64 {
        self.batches
    }
}

impl TouchInjector for LoggingInjector {
    fn inject(&mut self, contacts: &[TouchContact]) -> Result<(), InjectError> {
        self.batches += 1;
        for c in contacts {
            debug!(
                "Touch[{}] {:?} at ({}, {}) pressure={}",
                c.id, c.flags, c.location.x, c.location.y, c.pressure
            );
        }
        Ok(())
    }
}

// ── Platform split ─────────────────────────────────────────────────────────────

#[cfg(target_os = "windows")]
pub use self::win32::{OsScreenGeometry, OsTouchInjector};

#[cfg(not(target_os = "windows"))]
pub use self::unsupported::{OsScreenGeometry, OsTouchInjector};

#[cfg(target_os = "windows")]
mod win32 {
    use std::ffi::c_void;

    use capturelink_core::{InjectError, ScreenRect, TouchContact};
    use tracing::info;
    use windows::Win32::{
        Foundation::{HWND, POINT, RECT},
        UI::{
            Input::Pointer::{
                InitializeTouchInjection, InjectTouchInput, POINTER_FLAGS, POINTER_INFO,
                POINTER_TOUCH_INFO, TOUCH_FEEDBACK_DEFAULT, TOUCH_MASK_CONTACTAREA,
                TOUCH_MASK_PRESSURE,
            },
            WindowsAndMessaging::{
                GetSystemMetrics, GetWindowRect, IsWindow, PT_TOUCH, SM_CXSCREEN, SM_CYSCREEN,
            },
        },
    };

    use super::{ScreenGeometry, TouchInjector, MAX_CONTACTS};

    /// `InjectTouchInput` wrapper. Construct once per process.
    pub struct OsTouchInjector {
        records: Vec<POINTER_TOUCH_INFO>,
    }

    impl OsTouchInjector {
        pub fn new() -> Result<Self, InjectError> {
            unsafe { InitializeTouchInjection(MAX_CONTACTS, TOUCH_FEEDBACK_DEFAULT) }
                .map_err(|e| InjectError::InitFailed { reason: e.to_string() })?;
            info!("Touch injection initialised for {MAX_CONTACTS} contacts");
            Ok(Self { records: Vec::with_capacity(MAX_CONTACTS as usize) })
        }
    }

    impl TouchInjector for OsTouchInjector {
        fn inject(&mut self, contacts: &[TouchContact]) -> Result<(), InjectError> {
            self.records.clear();
            self.records.extend(contacts.iter().map(touch_info));
            unsafe { InjectTouchInput(&self.records) }.map_err(|e| InjectError::Rejected {
                count: contacts.len(),
                reason: e.to_string(),
            })
        }
    }

    fn touch_info(contact: &TouchContact) -> POINTER_TOUCH_INFO {
        let area = contact.contact_area;
        POINTER_TOUCH_INFO {
            pointerInfo: POINTER_INFO {
                pointerType: PT_TOUCH,
                pointerId: contact.id,
                pointerFlags: POINTER_FLAGS(contact.flags.bits()),
                ptPixelLocation: POINT { x: contact.location.x, y: contact.location.y },
                ..Default::default()
            },
            touchMask: TOUCH_MASK_CONTACTAREA | TOUCH_MASK_PRESSURE,
            rcContact: RECT {
                left: area.left,
                top: area.top,
                right: area.right(),
                bottom: area.bottom(),
            },
            pressure: contact.pressure,
            ..Default::default()
        }
    }

    #[derive(Debug, Default, Clone, Copy)]
    pub struct OsScreenGeometry;

    impl ScreenGeometry for OsScreenGeometry {
        fn window_rect(&self, window: u64) -> Option<ScreenRect> {
            if window == 0 {
                return None;
            }
            let hwnd = HWND(window as usize as *mut c_void);
            if !unsafe { IsWindow(hwnd) }.as_bool() {
                return None;
            }
            let mut rect = RECT::default();
            unsafe { GetWindowRect(hwnd, &mut rect) }.ok()?;
            let r = ScreenRect::new(rect.left, rect.top, rect.right - rect.left, rect.bottom - rect.top);
            (!r.is_empty()).then_some(r)
        }

        fn desktop_rect(&self) -> Option<ScreenRect> {
            let (w, h) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
            (w > 0 && h > 0).then(|| ScreenRect::new(0, 0, w, h))
        }
    }
}

#[cfg(not(target_os = "windows"))]
mod unsupported {
    use capturelink_core::{InjectError, ScreenRect, TouchContact};

    use super::{ScreenGeometry, TouchInjector};

    /// Touch injection needs Win32; construction always fails elsewhere.
    #[derive(Debug)]
    pub struct OsTouchInjector(());

    impl OsTouchInjector {
        pub fn new() -> Result<Self, InjectError> {
            Err(InjectError::Unsupported)
        }
    }

    impl TouchInjector for OsTouchInjector {
        fn inject(&mut self, _contacts: &[TouchContact]) -> Result<(), InjectError> {
            Err(InjectError::Unsupported)
        }
    }

    /// No window system queries; callers fall back to the configured desktop size.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct OsScreenGeometry;

    impl ScreenGeometry for OsScreenGeometry {
        fn window_rect(&self, _window: u64) -> Option<ScreenRect> {
            None
        }

        fn desktop_rect(&self) -> Option<ScreenRect> {
            None
        }
    }
}
