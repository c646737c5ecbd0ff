//! Reference-counted handles over the openDAQ native object ABI.
//!
//! Native openDAQ objects are reference counted and expose their operations
//! through a function table at offset zero, COM style. This crate binds a Rust
//! value to exactly one such object and makes sure the reference it holds is
//! released exactly once.
//!
//! # Architecture
//!
//! - [`ffi`]: raw table layouts; the only place that reads through object pointers
//! - [`types`]: interface identifiers and interface marker types
//! - [`error`]: status codes and the [`DaqError`] type
//! - [`runtime`]: library-wide native hooks and the last-error channel
//! - [`handle`]: [`NativeHandle`], the owning handle
//! - [`view`]: [`TypedView`], a handle tagged with its interface
//! - [`api`]: operations of individual interfaces (string, list, error info)
//! - [`config`]: process-wide options
//!
//! # Example
//!
//! ```ignore
//! use opendaq_interop::{DaqResult, IString, NativeHandle};
//!
//! fn describe(object: &NativeHandle) -> DaqResult<String> {
//!     if object.can_cast::<IString>() {
//!         // Borrowed view: no reference taken, valid while `object` is.
//!         return object.borrow::<IString>()?.to_rust_string();
//!     }
//!     object.to_native_string()
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod ffi;
pub mod handle;
pub mod runtime;
pub mod types;
pub mod view;

pub use api::{ErrorInfoView, IteratorView, ListIter, ListView, StringView};
pub use config::BridgeConfig;
pub use error::{DaqError, DaqResult, ErrorCode, ErrorCodeExt, ErrorDetails, RawErrorCode};
pub use ffi::RawObject;
pub use handle::NativeHandle;
pub use runtime::NativeRuntime;
pub use types::{IBaseObject, IErrorInfo, IIterator, IList, IString, Interface, IntfId};
pub use view::TypedView;
