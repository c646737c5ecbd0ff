//! Library-wide entry points of the in-process native library.
//!
//! These are the functions a real openDAQ build exports next to its object
//! tables: the thread-local error-info slot and the allocator used for
//! strings handed to the caller.

use std::cell::Cell;
use std::ffi::{c_char, c_void, CString};
use std::ptr;
use std::sync::Once;

use log::{debug, trace};
use opendaq_interop::{runtime, ErrorCode, NativeRuntime, RawErrorCode, RawObject};

use crate::object::{self, Payload, Table};

/// Per-thread error-info slot; holds one reference while occupied.
struct ErrorSlot(Cell<RawObject>);

impl Drop for ErrorSlot {
    fn drop(&mut self) {
        // SAFETY: the slot owns the reference it stores.
        unsafe { object::release(self.0.replace(ptr::null_mut())) };
    }
}

thread_local! {
    static ERROR_INFO: ErrorSlot = const { ErrorSlot(Cell::new(ptr::null_mut())) };
}

static INSTALL: Once = Once::new();

/// Stores an error info on the calling thread, replacing any previous one.
pub fn set_error_info(message: &str, source: Option<&str>) {
    trace!("error info set on this thread: {message}");
    post(message, source, false);
}

/// Stores an error info whose `getMessage` fails and posts a new error info
/// of its own. `getSource` still answers with `source`.
pub fn set_unreadable_error_info(source: &str) {
    post("", Some(source), true);
}

fn post(message: &str, source: Option<&str>, unreadable: bool) {
    let info = object::allocate(
        Payload::ErrorInfo {
            message: new_string_object(message),
            source: source.map_or(ptr::null_mut(), new_string_object),
            unreadable,
        },
        Table::Default,
        None,
    );
    let previous = ERROR_INFO.with(|slot| slot.0.replace(info));
    // SAFETY: the slot owned the reference it held.
    unsafe { object::release(previous) };
}

/// True while the calling thread's error-info slot is occupied.
pub fn error_info_pending() -> bool {
    ERROR_INFO.with(|slot| !slot.0.get().is_null())
}

pub(crate) fn new_string_object(text: &str) -> RawObject {
    let text = CString::new(text.replace('\0', "")).unwrap_or_default();
    object::allocate(Payload::Str(text), Table::Default, None)
}

/// Returns the calling thread's error info with a new reference, or null.
#[no_mangle]
pub unsafe extern "C" fn daq_testkit_get_error_info(out: *mut RawObject) -> RawErrorCode {
    if out.is_null() {
        return ErrorCode::ARGUMENT_NULL.as_raw();
    }
    let info = ERROR_INFO.with(|slot| slot.0.get());
    object::retain(info);
    *out = info;
    ErrorCode::SUCCESS.as_raw()
}

/// Empties the calling thread's error-info slot.
#[no_mangle]
pub unsafe extern "C" fn daq_testkit_clear_error_info() {
    let previous = ERROR_INFO.with(|slot| slot.0.replace(ptr::null_mut()));
    object::release(previous);
}

/// Frees a string returned by `toString`.
#[no_mangle]
pub unsafe extern "C" fn daq_testkit_free_memory(memory: *mut c_void) {
    if !memory.is_null() {
        drop(CString::from_raw(memory as *mut c_char));
    }
}

/// Runtime table pointing at this library's entry points.
pub fn native_runtime() -> NativeRuntime {
    NativeRuntime {
        get_error_info: daq_testkit_get_error_info,
        clear_error_info: daq_testkit_clear_error_info,
        free_memory: daq_testkit_free_memory,
    }
}

/// Installs [`native_runtime`] into the interop layer. Safe to call from every
/// test; only the first call per process installs.
pub fn install() {
    INSTALL.call_once(|| {
        if let Err(e) = runtime::install(native_runtime()) {
            debug!("testkit runtime not installed: {e}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_slot_roundtrip() {
        assert!(!error_info_pending());
        set_error_info("first", None);
        set_error_info("second", Some("unit"));
        assert!(error_info_pending());

        let mut info: RawObject = ptr::null_mut();
        let code = unsafe { daq_testkit_get_error_info(&mut info) };
        assert_eq!(code, ErrorCode::SUCCESS.as_raw());
        assert!(!info.is_null());
        // The slot and the caller each hold a reference.
        assert_eq!(unsafe { object::ref_count(info) }, 2);

        unsafe { daq_testkit_clear_error_info() };
        assert!(!error_info_pending());
        assert_eq!(unsafe { object::ref_count(info) }, 1);
        unsafe { object::release(info) };
    }

    #[test]
    fn test_free_memory_accepts_null() {
        unsafe { daq_testkit_free_memory(ptr::null_mut()) };
    }
}
