//! `IString` view.

use std::ffi::{c_char, CStr};
use std::ptr;

use crate::error::{DaqError, DaqResult, ErrorCode};
use crate::ffi;
use crate::types::IString;
use crate::view::TypedView;

/// View of a native string object.
pub type StringView = TypedView<IString>;

impl TypedView<IString> {
    /// Length in bytes, excluding the terminator.
    pub fn length(&self) -> DaqResult<usize> {
        let (access, table) = self.table()?;
        let this = access.address();
        let get_length = ffi::slot(table.get_length, "getLength")?;
        let mut length = 0usize;
        // SAFETY: `access` keeps `this` live; `length` is a valid out-pointer.
        ErrorCode::from_raw(unsafe { get_length(this, &mut length) }).into_result()?;
        Ok(length)
    }

    /// Copies the contents into a Rust string.
    ///
    /// Fails with `CONVERSION_FAILED` if the native bytes are not UTF-8.
    pub fn to_rust_string(&self) -> DaqResult<String> {
        let (access, table) = self.table()?;
        let this = access.address();
        let get_char_ptr = ffi::slot(table.get_char_ptr, "getCharPtr")?;
        let mut chars: *const c_char = ptr::null();
        // SAFETY: `access` keeps `this` live; `chars` is a valid out-pointer.
        ErrorCode::from_raw(unsafe { get_char_ptr(this, &mut chars) }).into_result()?;
        if chars.is_null() {
            return Ok(String::new());
        }
        // SAFETY: the buffer is NUL-terminated and owned by the object, which
        // stays alive for the duration of the copy.
        let text = unsafe { CStr::from_ptr(chars) };
        text.to_str().map(str::to_owned).map_err(|e| {
            DaqError::with_message(
                ErrorCode::CONVERSION_FAILED,
                format!("native string is not valid UTF-8: {e}"),
            )
        })
    }
}
