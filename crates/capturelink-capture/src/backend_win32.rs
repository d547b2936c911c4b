//! Loader for the native render plugin DLL.
//!
//! Exports consumed:
//!
//! | symbol | signature |
//! |--------|-----------|
//! | `GetRenderEventFunc` | `void* ()` |
//! | `SetTextureFromUnity` | `void (void* texture)` |
//! | `SetSharedHandle` | `void (void* handle)` |
//! | `SetLogFunction` | `void (void (*)(const char*))` |

use std::ffi::{c_char, c_void, CStr};
use std::path::Path;

use capturelink_core::BackendError;
use tracing::{info, warn};
use windows::{
    core::{s, HSTRING, PCSTR},
    Win32::{
        Foundation::{FreeLibrary, HMODULE},
        System::LibraryLoader::{GetProcAddress, LoadLibraryW},
    },
};

use crate::backend::{RenderBackend, RenderEventFn};

type GetRenderEventFuncFn = unsafe extern "system" fn() -> *mut c_void;
type SetPointerFn = unsafe extern "system" fn(*mut c_void);
type LogCallback = unsafe extern "C" fn(*const c_char);
type SetLogFunctionFn = unsafe extern "system" fn(LogCallback);

pub struct NativeRenderPlugin {
    module: HMODULE,
    render_event: RenderEventFn,
    set_texture: SetPointerFn,
    set_shared_handle: SetPointerFn,
}

impl NativeRenderPlugin {
    pub fn load(path: &Path) -> Result<Self, BackendError> {
        if !path.is_file() {
            return Err(BackendError::LibraryMissing { path: path.to_path_buf() });
        }
        let module = unsafe { LoadLibraryW(&HSTRING::from(path.as_os_str())) }.map_err(|e| {
            warn!("LoadLibraryW({}): {e}", path.display());
            BackendError::LibraryMissing { path: path.to_path_buf() }
        })?;

        let resolved = (|| -> Result<Self, BackendError> {
            let get_event: GetRenderEventFuncFn =
                unsafe { std::mem::transmute(resolve(module, s!("GetRenderEventFunc"), "GetRenderEventFunc")?) };
            let set_texture: SetPointerFn =
                unsafe { std::mem::transmute(resolve(module, s!("SetTextureFromUnity"), "SetTextureFromUnity")?) };
            let set_shared_handle: SetPointerFn =
                unsafe { std::mem::transmute(resolve(module, s!("SetSharedHandle"), "SetSharedHandle")?) };
            let set_log: SetLogFunctionFn =
                unsafe { std::mem::transmute(resolve(module, s!("SetLogFunction"), "SetLogFunction")?) };

            unsafe { set_log(forward_plugin_log) };
            let render_event = RenderEventFn(unsafe { get_event() } as usize);

            Ok(Self { module, render_event, set_texture, set_shared_handle })
        })();

        match resolved {
            Ok(plugin) => {
                info!("Render plugin loaded from {}", path.display());
                Ok(plugin)
            }
            Err(e) => {
                unsafe {
                    let _ = FreeLibrary(module);
                }
                Err(e)
            }
        }
    }
}

impl RenderBackend for NativeRenderPlugin {
    fn render_event_func(&self) -> RenderEventFn {
        self.render_event
    }

    fn set_texture_from_host(&mut self, native_texture: u64) {
        unsafe { (self.set_texture)(native_texture as usize as *mut c_void) };
    }

    fn set_shared_handle(&mut self, handle: u64) {
        unsafe { (self.set_shared_handle)(handle as usize as *mut c_void) };
    }
}

impl Drop for NativeRenderPlugin {
    fn drop(&mut self) {
        unsafe {
            let _ = FreeLibrary(self.module);
        }
    }
}

fn resolve(
    module: HMODULE,
    symbol: PCSTR,
    name: &'static str,
) -> Result<unsafe extern "system" fn() -> isize, BackendError> {
    unsafe { GetProcAddress(module, symbol) }.ok_or(BackendError::MissingEntryPoint { name })
}

unsafe extern "C" fn forward_plugin_log(message: *const c_char) {
    if message.is_null() {
        return;
    }
    let text = unsafe { CStr::from_ptr(message) }.to_string_lossy();
    info!(target: "capturelink::render_plugin", "{text}");
}
