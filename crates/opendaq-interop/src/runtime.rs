//! Process-level native entry points and the last-error channel.
//!
//! The native library keeps a thread-local error-info slot that failing calls
//! may fill with a message and a source name. After every failing call the
//! bridge reads that slot, clears it immediately and copies its contents into
//! the returned [`DaqError`](crate::DaqError), so diagnostics never leak into
//! an unrelated later error.

use std::cell::Cell;
use std::ffi::c_void;

use log::{debug, warn};
use once_cell::sync::OnceCell;

use crate::error::{DaqError, DaqResult, ErrorCode, ErrorDetails, RawErrorCode};
use crate::ffi::RawObject;
use crate::types::IErrorInfo;
use crate::view::TypedView;

/// Library-wide native functions the bridge needs besides object vtables.
#[derive(Debug, Clone, Copy)]
pub struct NativeRuntime {
    /// Returns the calling thread's `IErrorInfo` (new reference) or null.
    pub get_error_info: unsafe extern "C" fn(out: *mut RawObject) -> RawErrorCode,
    /// Clears the calling thread's error-info slot.
    pub clear_error_info: unsafe extern "C" fn(),
    /// Frees memory allocated by the native library (e.g. `toString` results).
    pub free_memory: unsafe extern "C" fn(ptr: *mut c_void),
}

static RUNTIME: OnceCell<NativeRuntime> = OnceCell::new();

thread_local! {
    static DRAINING: Cell<bool> = const { Cell::new(false) };
}

/// Installs the native runtime. Can be done once per process.
pub fn install(runtime: NativeRuntime) -> DaqResult<()> {
    RUNTIME.set(runtime).map_err(|_| {
        warn!("native runtime is already installed; keeping the first one");
        DaqError::with_message(ErrorCode::ALREADY_EXISTS, "native runtime already installed")
    })
}

/// Returns the installed runtime.
pub fn current() -> Option<&'static NativeRuntime> {
    RUNTIME.get()
}

pub fn is_installed() -> bool {
    RUNTIME.get().is_some()
}

pub(crate) fn require() -> DaqResult<&'static NativeRuntime> {
    current().ok_or_else(|| {
        DaqError::with_message(ErrorCode::UNINITIALIZED, "native runtime is not installed")
    })
}

/// Reads and clears the calling thread's error-info slot.
///
/// Returns `None` when no runtime is installed, the slot is empty, or when
/// called while the slot is already being drained on this thread (failures
/// while reading the error info must not recurse into the channel).
pub fn take_error_details() -> Option<ErrorDetails> {
    let runtime = current()?;
    if DRAINING.with(|flag| flag.replace(true)) {
        return None;
    }
    let details = drain(runtime);
    // Reading the error info may itself have failed and posted new diagnostics.
    // SAFETY: installed runtime functions are valid for the process lifetime.
    unsafe { (runtime.clear_error_info)() };
    DRAINING.with(|flag| flag.set(false));
    details
}

/// Discards whatever the native side left in the slot.
pub fn clear_error_info() {
    if let Some(runtime) = current() {
        // SAFETY: installed runtime functions are valid for the process lifetime.
        unsafe { (runtime.clear_error_info)() };
    }
}

fn drain(runtime: &NativeRuntime) -> Option<ErrorDetails> {
    let mut raw: RawObject = std::ptr::null_mut();
    // SAFETY: installed runtime functions are valid for the process lifetime.
    let code = ErrorCode::from_raw(unsafe { (runtime.get_error_info)(&mut raw) });
    // SAFETY: as above.
    unsafe { (runtime.clear_error_info)() };

    if !code.is_success() {
        debug!("failed to read native error info: {code}");
        return None;
    }
    if raw.is_null() {
        return None;
    }

    // SAFETY: get_error_info returns an IErrorInfo carrying one reference.
    let info = match unsafe { TypedView::<IErrorInfo>::from_owned_ptr(raw) } {
        Ok(info) => info,
        Err(e) => {
            debug!("native error info is unusable: {e}");
            return None;
        }
    };
    let details = ErrorDetails {
        message: info.message().ok().flatten(),
        origin: info.source().ok().flatten(),
    };
    if let Err(e) = info.dispose() {
        debug!("failed to release native error info: {e}");
    }
    (!details.is_empty()).then_some(details)
}
