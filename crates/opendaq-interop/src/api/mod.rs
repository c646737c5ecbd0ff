//! Typed views of individual native interfaces.
//!
//! Each submodule adds the interface-specific operations to
//! [`TypedView<T>`](crate::TypedView) for one interface. The wrappers:
//!
//! - Read the interface's function table once, when the view is created
//! - Convert status codes to `DaqResult`
//! - Return owning handles for every reference the native side hands out
//!
//! # Available views
//!
//! - [`string`]: `IString` contents
//! - [`list`]: `IList` access and `IIterator` traversal
//! - [`error_info`]: `IErrorInfo` message and source

pub mod error_info;
pub mod list;
pub mod string;

pub use error_info::ErrorInfoView;
pub use list::{IteratorView, ListIter, ListView};
pub use string::StringView;
