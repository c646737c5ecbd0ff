//! Status codes and error handling for native calls.
//!
//! Every function in the native object ABI returns a status code. This module
//! wraps those codes in [`ErrorCode`], converts failures into [`DaqError`] and
//! attaches the diagnostics the native side left in the thread's last-error
//! slot.

use std::fmt;
use thiserror::Error;

use crate::runtime;
use crate::types::IntfId;

/// Raw status code as returned across the C ABI.
pub type RawErrorCode = u32;

/// Status code returned by a native call.
///
/// Codes with the high bit set are failures. [`ErrorCode::SUCCESS`] is the only
/// success value; the remaining low codes are informational signals such as
/// [`ErrorCode::NO_MORE_ITEMS`] which a caller has to expect explicitly.
/// Unknown codes are carried through unchanged.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(RawErrorCode);

impl ErrorCode {
    pub const SUCCESS: Self = ErrorCode(0x0000_0000);
    pub const NO_MORE_ITEMS: Self = ErrorCode(0x0000_0004);
    pub const IGNORED: Self = ErrorCode(0x0000_0005);

    pub const NO_MEMORY: Self = ErrorCode(0x8000_0000);
    pub const INVALID_PARAMETER: Self = ErrorCode(0x8000_0001);
    pub const ARGUMENT_NULL: Self = ErrorCode(0x8000_0002);
    pub const SIZE_TOO_SMALL: Self = ErrorCode(0x8000_0003);
    pub const CONVERSION_FAILED: Self = ErrorCode(0x8000_0004);
    pub const OUT_OF_RANGE: Self = ErrorCode(0x8000_0005);
    pub const NOT_FOUND: Self = ErrorCode(0x8000_0006);
    pub const ALREADY_EXISTS: Self = ErrorCode(0x8000_0008);
    pub const INVALID_TYPE: Self = ErrorCode(0x8000_000A);
    pub const INVALID_STATE: Self = ErrorCode(0x8000_000B);
    pub const UNINITIALIZED: Self = ErrorCode(0x8000_000C);
    pub const INVALID_OPERATION: Self = ErrorCode(0x8000_0014);
    pub const CALL_FAILED: Self = ErrorCode(0x8000_0015);
    pub const GENERAL_ERROR: Self = ErrorCode(0x8000_0017);
    pub const VALIDATE_FAILED: Self = ErrorCode(0x8000_001C);
    pub const NOT_IMPLEMENTED: Self = ErrorCode(0x8000_4001);
    pub const NO_INTERFACE: Self = ErrorCode(0x8000_4002);

    const FAILURE_BIT: RawErrorCode = 0x8000_0000;

    /// Wraps a raw status code.
    pub const fn from_raw(code: RawErrorCode) -> Self {
        ErrorCode(code)
    }

    /// Returns the raw status code.
    pub const fn as_raw(&self) -> RawErrorCode {
        self.0
    }

    /// Returns true for the success sentinel.
    pub const fn is_success(&self) -> bool {
        self.0 == Self::SUCCESS.0
    }

    /// Returns true if the failure bit is set.
    pub const fn is_failure(&self) -> bool {
        self.0 & Self::FAILURE_BIT != 0
    }

    /// Returns true for non-success codes that are not failures
    /// (e.g. [`ErrorCode::NO_MORE_ITEMS`]).
    pub const fn is_informational(&self) -> bool {
        !self.is_success() && !self.is_failure()
    }

    /// Symbolic name of a known code.
    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            Self::SUCCESS => "OPENDAQ_SUCCESS",
            Self::NO_MORE_ITEMS => "OPENDAQ_NO_MORE_ITEMS",
            Self::IGNORED => "OPENDAQ_IGNORED",
            Self::NO_MEMORY => "OPENDAQ_ERR_NOMEMORY",
            Self::INVALID_PARAMETER => "OPENDAQ_ERR_INVALIDPARAMETER",
            Self::ARGUMENT_NULL => "OPENDAQ_ERR_ARGUMENT_NULL",
            Self::SIZE_TOO_SMALL => "OPENDAQ_ERR_SIZETOOSMALL",
            Self::CONVERSION_FAILED => "OPENDAQ_ERR_CONVERSIONFAILED",
            Self::OUT_OF_RANGE => "OPENDAQ_ERR_OUTOFRANGE",
            Self::NOT_FOUND => "OPENDAQ_ERR_NOTFOUND",
            Self::ALREADY_EXISTS => "OPENDAQ_ERR_ALREADYEXISTS",
            Self::INVALID_TYPE => "OPENDAQ_ERR_INVALIDTYPE",
            Self::INVALID_STATE => "OPENDAQ_ERR_INVALIDSTATE",
            Self::UNINITIALIZED => "OPENDAQ_ERR_UNINITIALIZED",
            Self::INVALID_OPERATION => "OPENDAQ_ERR_INVALID_OPERATION",
            Self::CALL_FAILED => "OPENDAQ_ERR_CALLFAILED",
            Self::GENERAL_ERROR => "OPENDAQ_ERR_GENERALERROR",
            Self::VALIDATE_FAILED => "OPENDAQ_ERR_VALIDATE_FAILED",
            Self::NOT_IMPLEMENTED => "OPENDAQ_ERR_NOTIMPLEMENTED",
            Self::NO_INTERFACE => "OPENDAQ_ERR_NOINTERFACE",
            _ => return None,
        };
        Some(name)
    }

    /// Converts to a Result, returning Ok(()) only for success.
    ///
    /// Failures pick up whatever the native side left in the last-error slot.
    pub fn into_result(self) -> DaqResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(DaqError::from_native(self))
        }
    }

    /// Like [`ErrorCode::into_result`], but lets the given informational codes
    /// through as `Ok(code)`.
    pub fn into_result_allowing(self, expected: &[ErrorCode]) -> DaqResult<ErrorCode> {
        if self.is_success() || expected.contains(&self) {
            Ok(self)
        } else {
            Err(DaqError::from_native(self))
        }
    }
}

impl From<RawErrorCode> for ErrorCode {
    fn from(code: RawErrorCode) -> Self {
        ErrorCode(code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

impl fmt::Debug for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorCode({self})")
    }
}

/// Diagnostics attached to a failing call by the native side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorDetails {
    pub message: Option<String>,
    pub origin: Option<String>,
}

impl ErrorDetails {
    pub fn is_empty(&self) -> bool {
        self.message.is_none() && self.origin.is_none()
    }
}

/// Error type for every operation of the interop layer.
///
/// Failures raised by the bridge itself (null pointers, use after dispose,
/// missing vtable slots) and failures returned by native calls share this
/// type; the [`ErrorCode`] tells them apart.
#[derive(Debug, Clone, Error)]
#[error("{}", render(.code, .details))]
pub struct DaqError {
    code: ErrorCode,
    details: ErrorDetails,
}

fn render(code: &ErrorCode, details: &ErrorDetails) -> String {
    match &details.message {
        Some(message) => format!("{code}: {message}"),
        None => code.to_string(),
    }
}

impl DaqError {
    /// Creates an error carrying only a status code.
    pub fn new(code: ErrorCode) -> Self {
        DaqError {
            code,
            details: ErrorDetails::default(),
        }
    }

    /// Creates an error with a message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        DaqError {
            code,
            details: ErrorDetails {
                message: Some(message.into()),
                origin: None,
            },
        }
    }

    /// Creates an error for a failed native call, draining the thread's
    /// last-error slot.
    pub fn from_native(code: ErrorCode) -> Self {
        let details = runtime::take_error_details().unwrap_or_default();
        DaqError { code, details }
    }

    /// A null native pointer was supplied where an object was expected.
    pub fn null_reference() -> Self {
        Self::with_message(ErrorCode::ARGUMENT_NULL, "native object pointer is null")
    }

    /// The handle was disposed or its pointer was stolen.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::INVALID_OPERATION, message)
    }

    /// The native object does not implement the requested interface.
    pub fn interface_not_supported(id: &IntfId) -> Self {
        Self::with_message(
            ErrorCode::NO_INTERFACE,
            format!("interface {id} is not supported"),
        )
    }

    /// A function pointer could not be invoked.
    pub fn call_failed(slot: &str) -> Self {
        Self::with_message(
            ErrorCode::CALL_FAILED,
            format!("native function '{slot}' is not available"),
        )
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn message(&self) -> Option<&str> {
        self.details.message.as_deref()
    }

    /// Name of the component that reported the error, if the native side
    /// provided one.
    pub fn origin(&self) -> Option<&str> {
        self.details.origin.as_deref()
    }

    pub fn is_null_reference(&self) -> bool {
        self.code == ErrorCode::ARGUMENT_NULL
    }

    pub fn is_invalid_operation(&self) -> bool {
        self.code == ErrorCode::INVALID_OPERATION
    }

    pub fn is_interface_not_supported(&self) -> bool {
        self.code == ErrorCode::NO_INTERFACE
    }

    pub fn is_call_failed(&self) -> bool {
        self.code == ErrorCode::CALL_FAILED
    }
}

/// Result type for interop operations.
pub type DaqResult<T> = Result<T, DaqError>;

/// Extension trait for converting raw status codes.
pub trait ErrorCodeExt {
    /// Converts a raw status code to a Result.
    fn check(self) -> DaqResult<()>;
}

impl ErrorCodeExt for RawErrorCode {
    fn check(self) -> DaqResult<()> {
        ErrorCode::from_raw(self).into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_classes() {
        assert!(ErrorCode::SUCCESS.is_success());
        assert!(!ErrorCode::SUCCESS.is_failure());
        assert!(ErrorCode::NO_MORE_ITEMS.is_informational());
        assert!(!ErrorCode::NO_MORE_ITEMS.is_failure());
        assert!(ErrorCode::NOT_FOUND.is_failure());
        assert!(!ErrorCode::NOT_FOUND.is_informational());
    }

    #[test]
    fn test_unknown_code_passes_through() {
        let code = ErrorCode::from_raw(0x8000_7777);
        assert!(code.is_failure());
        assert_eq!(code.name(), None);
        assert_eq!(code.to_string(), "0x80007777");
        assert_eq!(code.as_raw(), 0x8000_7777);
    }

    #[test]
    fn test_display_with_and_without_message() {
        let err = DaqError::new(ErrorCode::NOT_FOUND);
        assert_eq!(err.to_string(), "OPENDAQ_ERR_NOTFOUND");

        let err = DaqError::with_message(ErrorCode::NOT_FOUND, "channel 'ai0' missing");
        assert_eq!(err.to_string(), "OPENDAQ_ERR_NOTFOUND: channel 'ai0' missing");
    }

    #[test]
    fn test_taxonomy_helpers() {
        assert!(DaqError::null_reference().is_null_reference());
        assert!(DaqError::invalid_operation("disposed").is_invalid_operation());
        assert!(DaqError::call_failed("equals").is_call_failed());
        let id = IntfId::new(1, 2, 3, [4, 5, 6, 7, 8, 9, 10, 11]);
        let err = DaqError::interface_not_supported(&id);
        assert!(err.is_interface_not_supported());
        assert!(err.to_string().contains("00000001-0002-0003-0405-060708090a0b"));
    }

    #[test]
    fn test_allowing_expected_codes() {
        let code = ErrorCode::NO_MORE_ITEMS
            .into_result_allowing(&[ErrorCode::NO_MORE_ITEMS])
            .unwrap();
        assert_eq!(code, ErrorCode::NO_MORE_ITEMS);

        assert!(ErrorCode::NO_MORE_ITEMS.into_result().is_err());
        assert!(ErrorCode::NOT_FOUND
            .into_result_allowing(&[ErrorCode::NO_MORE_ITEMS])
            .is_err());
    }

    #[test]
    fn test_raw_code_check() {
        assert!(0_u32.check().is_ok());
        let err = 0x8000_0006_u32.check().unwrap_err();
        assert_eq!(err.code(), ErrorCode::NOT_FOUND);
    }
}
