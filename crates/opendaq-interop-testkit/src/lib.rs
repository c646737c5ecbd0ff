//! In-process native library for testing `opendaq-interop`.
//!
//! Implements the openDAQ object ABI in Rust so the interop layer can be
//! exercised without linking the SDK:
//!
//! ```text
//! [test] --NativeHandle--> [opendaq-interop] --vtable--> [testkit objects]
//!                                 |
//!                                 +--NativeRuntime--> [testkit error slot]
//! ```
//!
//! Objects keep atomic reference counts that tests read through
//! [`RefWatch`], and fault-injecting variants post diagnostics to the
//! thread-local error-info slot exactly like the native library.
//!
//! # Safety
//!
//! Pointers returned by [`fixtures`] are only valid for the functions in this
//! crate and for `opendaq-interop` handles. Each carries one reference that
//! must be released exactly once.

pub mod exports;
pub mod fixtures;
mod object;
pub mod verification;

pub use exports::{
    error_info_pending, install, native_runtime, set_error_info, set_unreadable_error_info,
};
pub use fixtures::DestroyFlag;
pub use verification::RefWatch;
