//! Interface-typed views over a [`NativeHandle`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;

use crate::config;
use crate::error::{DaqError, DaqResult};
use crate::ffi::{self, RawObject};
use crate::handle::{Access, NativeHandle};
use crate::types::Interface;

/// A [`NativeHandle`] known to point at interface `T`.
///
/// The view caches `T`'s function table next to the handle. It shares the
/// handle's reference and lifetime rules; all base operations are reachable
/// through `Deref`.
pub struct TypedView<T: Interface> {
    handle: NativeHandle,
    vtable: T::VTable,
    _marker: PhantomData<T>,
}

impl<T: Interface> TypedView<T> {
    /// Wraps a pointer to interface `T`.
    ///
    /// When interface verification is enabled the object is asked whether it
    /// implements `T`; a refusal fails with `NO_INTERFACE` and drops the
    /// handle (releasing its reference if it owned one).
    ///
    /// # Safety
    ///
    /// `address` must be null or point to a live native object exposing `T`.
    pub unsafe fn from_raw(address: RawObject, increment_reference: bool) -> DaqResult<Self> {
        let handle = NativeHandle::from_raw(address, increment_reference)?;
        Self::from_handle(handle)
    }

    /// # Safety
    ///
    /// See [`TypedView::from_raw`].
    pub unsafe fn from_owned_ptr(address: RawObject) -> DaqResult<Self> {
        Self::from_raw(address, false)
    }

    /// # Safety
    ///
    /// See [`TypedView::from_raw`].
    pub unsafe fn from_borrowed_ptr(address: RawObject) -> DaqResult<Self> {
        Self::from_raw(address, true)
    }

    /// Reinterprets a handle as interface `T`.
    ///
    /// Prefer [`NativeHandle::query`] or [`NativeHandle::borrow`], which
    /// negotiate the interface pointer first.
    ///
    /// # Safety
    ///
    /// The handle's address must be a pointer to interface `T`.
    pub unsafe fn from_handle(handle: NativeHandle) -> DaqResult<Self> {
        if config::get().verify_interfaces && !handle.can_cast::<T>() {
            return Err(DaqError::interface_not_supported(&T::ID));
        }
        Self::from_negotiated(handle)
    }

    /// Builds the view from a handle obtained by negotiating `T::ID`.
    pub(crate) fn from_negotiated(handle: NativeHandle) -> DaqResult<Self> {
        let access = handle.access()?;
        // SAFETY: the address was negotiated for `T`; `access` keeps it live.
        let vtable = unsafe { ffi::read_vtable::<T::VTable>(access.address())? };
        drop(access);
        Ok(TypedView {
            handle,
            vtable,
            _marker: PhantomData,
        })
    }

    /// Call guard and interface table, failing after dispose.
    pub(crate) fn table(&self) -> DaqResult<(Access<'_>, &T::VTable)> {
        Ok((self.handle.access()?, &self.vtable))
    }

    /// The underlying handle.
    pub fn handle(&self) -> &NativeHandle {
        &self.handle
    }

    /// Drops the interface tag, keeping the reference.
    pub fn into_handle(self) -> NativeHandle {
        self.handle
    }

    /// Another owning view of the same object.
    pub fn try_clone(&self) -> DaqResult<Self> {
        Self::from_negotiated(self.handle.try_clone()?)
    }
}

impl<T: Interface> Deref for TypedView<T> {
    type Target = NativeHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<T: Interface> PartialEq for TypedView<T> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl<T: Interface> Hash for TypedView<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

impl<T: Interface> fmt::Display for TypedView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.handle, f)
    }
}

impl<T: Interface> fmt::Debug for TypedView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedView")
            .field("interface", &T::NAME)
            .field("address", &self.handle.as_ptr())
            .field("borrowed", &self.handle.is_borrowed())
            .finish()
    }
}
