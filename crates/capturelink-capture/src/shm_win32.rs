//! Named file mappings (Windows).
//!
//! The helper creates the mapping with `CreateFileMappingA`; we open it by
//! name with `FILE_MAP_READ` and map exactly the header.

use std::path::Path;

use capturelink_core::{ChannelError, FrameHeader};
use tracing::debug;
use windows::{
    core::HSTRING,
    Win32::{
        Foundation::{CloseHandle, HANDLE},
        System::Memory::{
            MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, FILE_MAP_READ,
            MEMORY_MAPPED_VIEW_ADDRESS,
        },
    },
};

pub(crate) struct Segment {
    handle: HANDLE,
    view: MEMORY_MAPPED_VIEW_ADDRESS,
}

impl Segment {
    /// `Ok(None)` while no mapping with this name exists.
    ///
    /// `_shm_dir` is unused: Windows mappings live in the kernel object namespace.
    pub(crate) fn open(name: &str, _shm_dir: &Path) -> Result<Option<Self>, ChannelError> {
        let handle = match unsafe { OpenFileMappingW(FILE_MAP_READ.0, false, &HSTRING::from(name)) } {
            Ok(h) => h,
            Err(e) => {
                debug!("OpenFileMappingW('{name}'): {e}");
                return Ok(None);
            }
        };

        let view = unsafe { MapViewOfFile(handle, FILE_MAP_READ, 0, 0, FrameHeader::SIZE) };
        if view.Value.is_null() {
            let err = std::io::Error::last_os_error();
            unsafe {
                let _ = CloseHandle(handle);
            }
            return Err(err.into());
        }

        Ok(Some(Self { handle, view }))
    }

    pub(crate) fn read(&self) -> Result<[u8; FrameHeader::SIZE], ChannelError> {
        let mut out = [0u8; FrameHeader::SIZE];
        let base = self.view.Value as *const u8;
        for (i, byte) in out.iter_mut().enumerate() {
            // SAFETY: the view spans FrameHeader::SIZE bytes for as long as self lives.
            *byte = unsafe { std::ptr::read_volatile(base.add(i)) };
        }
        Ok(out)
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        unsafe {
            let _ = UnmapViewOfFile(self.view);
            let _ = CloseHandle(self.handle);
        }
    }
}
