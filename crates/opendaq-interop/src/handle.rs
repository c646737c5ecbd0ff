//! Reference-counted handle to a native object.
//!
//! A [`NativeHandle`] binds to exactly one native object pointer and, unless it
//! is a borrowed view, to exactly one reference on that object. The reference
//! is released exactly once: either by an explicit [`NativeHandle::dispose`] or
//! by `Drop` if the handle is simply forgotten.
//!
//! # Concurrent use
//!
//! Handles are `Send + Sync`. Every native call made through a handle holds an
//! [`Access`] guard on the handle's slot for its whole duration. Disposing
//! closes the slot; if calls are still in flight, the last of them performs the
//! release. A native object is therefore never released while a call through
//! the handle is using it, and concurrent disposal still releases once.
//!
//! # Borrowed views
//!
//! [`NativeHandle::borrow_interface`] casts without taking a reference. The view
//! remembers the owning handle it came from, guards that handle's slot during
//! its own calls, and refuses every operation once the owner has been disposed
//! or stolen.

use std::ffi::{c_char, CStr};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, error, trace};

use crate::config;
use crate::error::{DaqError, DaqResult, ErrorCode};
use crate::ffi::{self, BaseObjectVTable, RawObject, ReleaseRefFn};
use crate::runtime;
use crate::types::{IntfId, Interface};
use crate::view::TypedView;

/// Set once the slot is disposed or stolen.
const CLOSED: usize = 1 << (usize::BITS - 1);
/// Set when the reference left the slot through `steal`.
const DETACHED: usize = 1 << (usize::BITS - 2);
/// Number of calls in flight.
const USERS: usize = !(CLOSED | DETACHED);

/// Shared state of one handle: its address, the release function for the
/// reference it holds, and the in-flight call count.
#[derive(Debug)]
struct Slot {
    address: AtomicPtr<std::ffi::c_void>,
    state: AtomicUsize,
    release_ref: Option<ReleaseRefFn>,
    owns_reference: bool,
}

impl Slot {
    fn new(address: RawObject, vtable: &BaseObjectVTable, owns_reference: bool) -> Arc<Self> {
        Arc::new(Slot {
            address: AtomicPtr::new(address),
            state: AtomicUsize::new(0),
            release_ref: vtable.release_ref,
            owns_reference,
        })
    }

    fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) & CLOSED != 0
    }

    /// Registers a call. `None` once the slot is closed.
    fn enter(&self) -> Option<SlotGuard<'_>> {
        let previous = self.state.fetch_add(1, Ordering::AcqRel);
        let guard = SlotGuard {
            slot: self,
            address: self.address.load(Ordering::Acquire),
        };
        (previous & CLOSED == 0).then_some(guard)
    }

    /// Unregisters a call. The last call leaving a disposed slot releases.
    fn leave(&self) {
        let previous = self.state.fetch_sub(1, Ordering::AcqRel);
        if previous != (CLOSED | 1) {
            return;
        }
        if let Some(address) = self.take() {
            if let Err(e) = self.release(address) {
                error!("deferred release of {address:p} failed: {e}");
            }
        }
    }

    /// Closes the slot for disposal. Returns the address to release now, or
    /// `None` if the slot was already closed or calls are still in flight.
    fn close(&self) -> Option<RawObject> {
        let previous = self.state.fetch_or(CLOSED, Ordering::AcqRel);
        if previous & CLOSED != 0 {
            return None;
        }
        if previous & USERS != 0 {
            trace!("release deferred until {} call(s) finish", previous & USERS);
            return None;
        }
        self.take()
    }

    /// Closes the slot and hands its address over without releasing.
    fn detach(&self) -> DaqResult<RawObject> {
        match self
            .state
            .compare_exchange(0, CLOSED | DETACHED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => self.take().ok_or_else(disposed),
            Err(state) if state & CLOSED != 0 => Err(disposed()),
            Err(_) => Err(DaqError::with_message(
                ErrorCode::INVALID_STATE,
                "native handle is in use by another call",
            )),
        }
    }

    fn take(&self) -> Option<RawObject> {
        let address = self.address.swap(ptr::null_mut(), Ordering::AcqRel);
        (!address.is_null()).then_some(address)
    }

    fn release(&self, address: RawObject) -> DaqResult<()> {
        if !self.owns_reference {
            return Ok(());
        }
        let release = ffi::slot(self.release_ref, "releaseRef")?;
        // SAFETY: the slot held a reference on `address` until `take` cleared
        // it; no other path can release it.
        let remaining = unsafe { release(address) };
        trace_reference("releaseRef", address, remaining);
        if remaining < 0 {
            return Err(DaqError::with_message(
                ErrorCode::INVALID_STATE,
                format!("reference count underflow on {address:p} ({remaining})"),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct SlotGuard<'a> {
    slot: &'a Slot,
    address: RawObject,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.slot.leave();
    }
}

/// Keeps a handle's object alive for the duration of a native call.
#[derive(Debug)]
pub(crate) struct Access<'a> {
    address: RawObject,
    _own: SlotGuard<'a>,
    _owner: Option<SlotGuard<'a>>,
}

impl Access<'_> {
    pub(crate) fn address(&self) -> RawObject {
        self.address
    }
}

#[derive(Debug)]
enum Lease {
    /// The handle holds one reference.
    Owned,
    /// The handle holds no reference and is valid while `owner` is.
    Borrowed { owner: Arc<Slot> },
}

/// Owning (or borrowing) handle to a native reference-counted object.
pub struct NativeHandle {
    slot: Arc<Slot>,
    vtable: BaseObjectVTable,
    lease: Lease,
}

fn trace_reference(operation: &str, address: RawObject, count: i32) {
    if config::get().trace_references {
        trace!("{operation} {address:p} -> {count}");
    }
}

fn disposed() -> DaqError {
    DaqError::invalid_operation("native handle has been disposed")
}

/// Maps a failed interface negotiation to an error. `NO_INTERFACE` without
/// native diagnostics names the requested interface.
fn check_negotiation(code: ErrorCode, id: &IntfId) -> DaqResult<()> {
    if code.is_success() {
        return Ok(());
    }
    let err = DaqError::from_native(code);
    if code == ErrorCode::NO_INTERFACE && err.message().is_none() {
        return Err(DaqError::interface_not_supported(id));
    }
    Err(err)
}

impl NativeHandle {
    /// Wraps a native object pointer.
    ///
    /// With `increment_reference` the handle takes a new reference (the
    /// pointer was borrowed from somewhere); without it the handle adopts the
    /// reference the caller already holds (e.g. a factory result).
    ///
    /// # Safety
    ///
    /// `address` must be null or point to a live native object.
    pub unsafe fn from_raw(address: RawObject, increment_reference: bool) -> DaqResult<Self> {
        if address.is_null() {
            return Err(DaqError::null_reference());
        }
        // SAFETY: guaranteed by the caller.
        let vtable = unsafe { ffi::read_vtable::<BaseObjectVTable>(address)? };
        if increment_reference {
            let add_ref = ffi::slot(vtable.add_ref, "addRef")?;
            // SAFETY: `address` is live and `add_ref` comes from its table.
            let count = unsafe { add_ref(address) };
            trace_reference("addRef", address, count);
        }
        Ok(NativeHandle {
            slot: Slot::new(address, &vtable, true),
            vtable,
            lease: Lease::Owned,
        })
    }

    /// Adopts a reference the caller already owns.
    ///
    /// # Safety
    ///
    /// See [`NativeHandle::from_raw`].
    pub unsafe fn from_owned_ptr(address: RawObject) -> DaqResult<Self> {
        Self::from_raw(address, false)
    }

    /// Takes a new reference on a pointer the caller does not own.
    ///
    /// # Safety
    ///
    /// See [`NativeHandle::from_raw`].
    pub unsafe fn from_borrowed_ptr(address: RawObject) -> DaqResult<Self> {
        Self::from_raw(address, true)
    }

    /// # Safety
    ///
    /// `address` must be live for as long as the object behind `owner` is.
    unsafe fn borrowed(address: RawObject, owner: Arc<Slot>) -> DaqResult<Self> {
        if address.is_null() {
            return Err(DaqError::null_reference());
        }
        // SAFETY: guaranteed by the caller.
        let vtable = unsafe { ffi::read_vtable::<BaseObjectVTable>(address)? };
        Ok(NativeHandle {
            slot: Slot::new(address, &vtable, false),
            vtable,
            lease: Lease::Borrowed { owner },
        })
    }

    /// Guards the object for one native call, failing if this handle (or the
    /// handle a borrowed view was taken from) has been disposed or stolen.
    pub(crate) fn access(&self) -> DaqResult<Access<'_>> {
        let owner = match &self.lease {
            Lease::Owned => None,
            Lease::Borrowed { owner } => Some(owner.enter().ok_or_else(|| {
                DaqError::invalid_operation(
                    "the handle this view was borrowed from has been disposed",
                )
            })?),
        };
        let own = self.slot.enter().ok_or_else(disposed)?;
        Ok(Access {
            address: own.address,
            _own: own,
            _owner: owner,
        })
    }

    /// Returns the native address, failing if this handle (or the handle a
    /// borrowed view was taken from) has been disposed or stolen.
    ///
    /// The address is not protected against a concurrent dispose once this
    /// returns.
    pub fn address(&self) -> DaqResult<RawObject> {
        self.access().map(|access| access.address())
    }

    /// Raw address without validity checks; null after dispose or steal.
    pub fn as_ptr(&self) -> RawObject {
        if self.slot.is_closed() {
            return ptr::null_mut();
        }
        self.slot.address.load(Ordering::Acquire)
    }

    /// True once this handle is disposed or stolen, and for borrowed views
    /// once the handle they were borrowed from is.
    pub fn is_disposed(&self) -> bool {
        match &self.lease {
            Lease::Borrowed { owner } if owner.is_closed() => true,
            _ => self.slot.is_closed(),
        }
    }

    /// True for views obtained through [`NativeHandle::borrow_interface`].
    pub fn is_borrowed(&self) -> bool {
        matches!(self.lease, Lease::Borrowed { .. })
    }

    /// Creates another owning handle to the same object (one more reference).
    pub fn try_clone(&self) -> DaqResult<NativeHandle> {
        let access = self.access()?;
        let address = access.address();
        let add_ref = ffi::slot(self.vtable.add_ref, "addRef")?;
        // SAFETY: `access` keeps `address` live.
        let count = unsafe { add_ref(address) };
        trace_reference("addRef", address, count);
        Ok(NativeHandle {
            slot: Slot::new(address, &self.vtable, true),
            vtable: self.vtable,
            lease: Lease::Owned,
        })
    }

    /// Asks the object for another interface. The returned handle owns its own
    /// reference and may outlive `self`.
    pub fn query_interface(&self, id: &IntfId) -> DaqResult<NativeHandle> {
        let access = self.access()?;
        let query = ffi::slot(self.vtable.query_interface, "queryInterface")?;
        let mut out: RawObject = ptr::null_mut();
        // SAFETY: `access` keeps the object live; `out` is a valid out-pointer.
        let code = ErrorCode::from_raw(unsafe { query(access.address(), id, &mut out) });
        check_negotiation(code, id)?;
        // SAFETY: a successful query hands out a live pointer with one reference.
        unsafe { Self::from_owned_ptr(out) }
    }

    /// Casts to another interface without taking a reference.
    ///
    /// The view is only usable while the owning handle it derives from is
    /// alive; disposing it never releases anything.
    pub fn borrow_interface(&self, id: &IntfId) -> DaqResult<NativeHandle> {
        let access = self.access()?;
        let borrow = ffi::slot(self.vtable.borrow_interface, "borrowInterface")?;
        let mut out: RawObject = ptr::null_mut();
        // SAFETY: `access` keeps the object live; `out` is a valid out-pointer.
        let code = ErrorCode::from_raw(unsafe { borrow(access.address(), id, &mut out) });
        check_negotiation(code, id)?;
        let owner = match &self.lease {
            Lease::Owned => Arc::clone(&self.slot),
            Lease::Borrowed { owner } => Arc::clone(owner),
        };
        // SAFETY: the borrowed pointer lives as long as the owner's reference,
        // which `access` still protects here.
        unsafe { Self::borrowed(out, owner) }
    }

    /// Checks for an interface. Never fails and never changes the count.
    pub fn can_cast_to(&self, id: &IntfId) -> bool {
        match self.borrow_interface(id) {
            Ok(_) => true,
            Err(e) => {
                debug!("cast to {id} rejected: {e}");
                false
            }
        }
    }

    /// Typed [`NativeHandle::query_interface`].
    pub fn query<T: Interface>(&self) -> DaqResult<TypedView<T>> {
        let handle = self.query_interface(&T::ID)?;
        TypedView::from_negotiated(handle)
    }

    /// Typed [`NativeHandle::borrow_interface`].
    pub fn borrow<T: Interface>(&self) -> DaqResult<TypedView<T>> {
        let handle = self.borrow_interface(&T::ID)?;
        TypedView::from_negotiated(handle)
    }

    /// Typed [`NativeHandle::can_cast_to`].
    pub fn can_cast<T: Interface>(&self) -> bool {
        self.can_cast_to(&T::ID)
    }

    /// Releases the handle's reference. Idempotent.
    ///
    /// Borrowed views are only marked disposed. If calls through the handle
    /// are still running on other threads, the last of them releases and logs
    /// any failure; otherwise failures of the native release are returned here.
    pub fn dispose(&self) -> DaqResult<()> {
        match self.slot.close() {
            Some(address) => self.slot.release(address),
            None => Ok(()),
        }
    }

    /// Zeroes the address without releasing the reference and returns it.
    ///
    /// Used when the reference is handed to native code that adopts it. The
    /// handle behaves as disposed afterwards; the new owner must release it.
    /// Fails with `INVALID_STATE` while another call through the handle is
    /// running.
    pub fn steal(&self) -> DaqResult<RawObject> {
        if self.is_borrowed() {
            return Err(DaqError::invalid_operation(
                "a borrowed view owns no reference to transfer",
            ));
        }
        let address = self.slot.detach()?;
        if config::get().trace_references {
            trace!("steal {address:p}");
        }
        Ok(address)
    }

    /// Consuming form of [`NativeHandle::steal`].
    pub fn into_raw(self) -> DaqResult<RawObject> {
        self.steal()
    }

    /// Calls the object's native `dispose`, which drops the references the
    /// object holds to others. The handle's own reference is not affected.
    pub fn dispose_native(&self) -> DaqResult<()> {
        let access = self.access()?;
        let dispose = ffi::slot(self.vtable.dispose, "dispose")?;
        // SAFETY: `access` keeps the object live.
        ErrorCode::from_raw(unsafe { dispose(access.address()) }).into_result()
    }

    /// Native hash code.
    pub fn hash_code(&self) -> DaqResult<usize> {
        let access = self.access()?;
        let get_hash_code = ffi::slot(self.vtable.get_hash_code, "getHashCode")?;
        let mut hash = 0usize;
        // SAFETY: `access` keeps the object live; `hash` is a valid out-pointer.
        ErrorCode::from_raw(unsafe { get_hash_code(access.address(), &mut hash) })
            .into_result()?;
        Ok(hash)
    }

    /// Native equality. A missing comparand is never equal.
    pub fn equals(&self, other: Option<&NativeHandle>) -> DaqResult<bool> {
        let access = self.access()?;
        let Some(other) = other else {
            return Ok(false);
        };
        let other_access = other.access()?;
        let equals = ffi::slot(self.vtable.equals, "equals")?;
        let mut result = 0u8;
        // SAFETY: both guards keep their objects live; `result` is a valid
        // out-pointer.
        ErrorCode::from_raw(unsafe {
            equals(access.address(), other_access.address(), &mut result)
        })
        .into_result()?;
        Ok(result != 0)
    }

    /// Native string representation.
    pub fn to_native_string(&self) -> DaqResult<String> {
        let access = self.access()?;
        let to_string = ffi::slot(self.vtable.to_string, "toString")?;
        let runtime = runtime::require()?;
        let mut out: *mut c_char = ptr::null_mut();
        // SAFETY: `access` keeps the object live; `out` is a valid out-pointer.
        ErrorCode::from_raw(unsafe { to_string(access.address(), &mut out) }).into_result()?;
        if out.is_null() {
            return Ok(String::new());
        }
        // SAFETY: the native side returned a NUL-terminated string that we own.
        let text = unsafe { CStr::from_ptr(out) }.to_string_lossy().into_owned();
        // SAFETY: the string was allocated by the native library.
        unsafe { (runtime.free_memory)(out.cast()) };
        Ok(text)
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            error!("failed to release native object on drop: {e}");
        }
    }
}

impl PartialEq for NativeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.equals(Some(other)).unwrap_or_else(|e| {
            debug!("native equality failed: {e}");
            false
        })
    }
}

impl Hash for NativeHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.hash_code() {
            Ok(hash) => state.write_usize(hash),
            Err(_) => state.write_usize(self.as_ptr() as usize),
        }
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_native_string() {
            Ok(text) => f.write_str(&text),
            Err(e) => write!(f, "<{}>", e.code()),
        }
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHandle")
            .field("address", &self.as_ptr())
            .field("borrowed", &self.is_borrowed())
            .finish()
    }
}
