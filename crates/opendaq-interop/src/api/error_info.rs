//! `IErrorInfo` view.

use std::ptr;

use crate::error::{DaqResult, ErrorCode, RawErrorCode};
use crate::ffi::{self, RawObject};
use crate::types::{IErrorInfo, IString};
use crate::view::TypedView;

/// View of the error-info object the native side attaches to failing calls.
pub type ErrorInfoView = TypedView<IErrorInfo>;

type StringGetter = unsafe extern "C" fn(this: RawObject, out: *mut RawObject) -> RawErrorCode;

impl TypedView<IErrorInfo> {
    /// Error message, if one was set.
    pub fn message(&self) -> DaqResult<Option<String>> {
        let (_, table) = self.table()?;
        self.read_string(table.get_message, "getMessage")
    }

    /// Name of the component that raised the error, if one was set.
    pub fn source(&self) -> DaqResult<Option<String>> {
        let (_, table) = self.table()?;
        self.read_string(table.get_source, "getSource")
    }

    fn read_string(&self, getter: Option<StringGetter>, name: &str) -> DaqResult<Option<String>> {
        let (access, _) = self.table()?;
        let this = access.address();
        let getter = ffi::slot(getter, name)?;
        let mut out: RawObject = ptr::null_mut();
        // SAFETY: `access` keeps `this` live; `out` is a valid out-pointer.
        ErrorCode::from_raw(unsafe { getter(this, &mut out) }).into_result()?;
        if out.is_null() {
            return Ok(None);
        }
        // SAFETY: the getter returns an IString carrying one reference.
        let text = unsafe { TypedView::<IString>::from_owned_ptr(out)? };
        text.to_rust_string().map(Some)
    }
}
