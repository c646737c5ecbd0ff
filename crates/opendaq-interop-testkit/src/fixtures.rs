//! Factories for native test objects.
//!
//! Every factory returns a pointer carrying exactly one reference, like a
//! native `create*` function. Wrap it with `NativeHandle::from_owned_ptr` to
//! hand that reference to a handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use opendaq_interop::{ErrorCode, NativeHandle, RawObject};

use crate::exports::new_string_object;
use crate::object::{self, Payload, Table};

/// Observes whether an object has been destroyed.
#[derive(Debug, Clone, Default)]
pub struct DestroyFlag(Arc<AtomicBool>);

impl DestroyFlag {
    pub fn is_destroyed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Plain `IBaseObject`.
pub fn new_object() -> RawObject {
    object::allocate(Payload::Plain, Table::Default, None)
}

/// Plain object reporting its destruction through the returned flag.
pub fn new_tracked_object() -> (RawObject, DestroyFlag) {
    let flag = DestroyFlag::default();
    let raw = object::allocate(Payload::Plain, Table::Default, Some(Arc::clone(&flag.0)));
    (raw, flag)
}

/// `IString` holding `text`. Interior NUL bytes are dropped.
pub fn new_string(text: &str) -> RawObject {
    new_string_object(text)
}

/// Empty `IList`.
pub fn new_list() -> RawObject {
    list(false, None)
}

/// `IList` reporting its destruction through the returned flag.
pub fn new_tracked_list() -> (RawObject, DestroyFlag) {
    let flag = DestroyFlag::default();
    let raw = list(false, Some(Arc::clone(&flag.0)));
    (raw, flag)
}

/// `IList` that refuses every modification with `INVALID_OPERATION`.
pub fn new_frozen_list() -> RawObject {
    list(true, None)
}

fn list(frozen: bool, destroyed: Option<Arc<AtomicBool>>) -> RawObject {
    object::allocate(
        Payload::List {
            items: Mutex::new(Vec::new()),
            frozen,
        },
        Table::Default,
        destroyed,
    )
}

/// `IErrorInfo` with the given fields.
pub fn new_error_info(message: Option<&str>, source: Option<&str>) -> RawObject {
    object::allocate(
        Payload::ErrorInfo {
            message: message.map_or(std::ptr::null_mut(), new_string_object),
            source: source.map_or(std::ptr::null_mut(), new_string_object),
            unreadable: false,
        },
        Table::Default,
        None,
    )
}

/// Object whose negotiation, `getHashCode`, `equals` and `toString` fail with
/// `code` after posting `message` to the error-info slot. Reference counting
/// works normally.
pub fn new_faulty(code: ErrorCode, message: &str) -> RawObject {
    object::allocate(
        Payload::Faulty {
            code: code.as_raw(),
            message: message.to_owned(),
        },
        Table::Default,
        None,
    )
}

/// Object whose table has no `releaseRef` slot.
///
/// Each handle that fails to release it leaks one reference; the object is
/// never freed.
pub fn new_unreleasable() -> RawObject {
    object::allocate(Payload::Plain, Table::Unreleasable, None)
}

/// Convenience: a handle owning a new `IString`.
pub fn string_handle(text: &str) -> NativeHandle {
    // SAFETY: `new_string` returns a live object with one reference.
    match unsafe { NativeHandle::from_owned_ptr(new_string(text)) } {
        Ok(handle) => handle,
        Err(e) => panic!("testkit string rejected: {e}"),
    }
}
