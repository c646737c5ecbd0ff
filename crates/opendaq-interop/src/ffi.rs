//! Raw native object ABI.
//!
//! A native object is a pointer whose first machine word points at its
//! function table (vtable-at-offset-zero). Every table starts with the
//! [`BaseObjectVTable`] slots; interface tables append their own slots in
//! declaration order. All slots are nullable C function pointers.
//!
//! This is the only module that reads through object pointers. Everything
//! above it works with the copied tables.

use std::ffi::{c_char, c_void};

use crate::error::{DaqError, DaqResult, RawErrorCode};
use crate::types::IntfId;

/// Opaque native object pointer.
pub type RawObject = *mut c_void;

pub type QueryInterfaceFn =
    unsafe extern "C" fn(this: RawObject, id: *const IntfId, out: *mut RawObject) -> RawErrorCode;
pub type AddRefFn = unsafe extern "C" fn(this: RawObject) -> i32;
pub type ReleaseRefFn = unsafe extern "C" fn(this: RawObject) -> i32;
pub type DisposeFn = unsafe extern "C" fn(this: RawObject) -> RawErrorCode;
pub type GetHashCodeFn = unsafe extern "C" fn(this: RawObject, out: *mut usize) -> RawErrorCode;
pub type EqualsFn =
    unsafe extern "C" fn(this: RawObject, other: RawObject, out: *mut u8) -> RawErrorCode;
pub type ToStringFn = unsafe extern "C" fn(this: RawObject, out: *mut *mut c_char) -> RawErrorCode;

/// Slots shared by every native interface (`IBaseObject`).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BaseObjectVTable {
    pub query_interface: Option<QueryInterfaceFn>,
    pub add_ref: Option<AddRefFn>,
    pub release_ref: Option<ReleaseRefFn>,
    pub borrow_interface: Option<QueryInterfaceFn>,
    pub dispose: Option<DisposeFn>,
    pub get_hash_code: Option<GetHashCodeFn>,
    pub equals: Option<EqualsFn>,
    pub to_string: Option<ToStringFn>,
}

/// `IString` table.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct StringVTable {
    pub base: BaseObjectVTable,
    pub get_char_ptr:
        Option<unsafe extern "C" fn(this: RawObject, out: *mut *const c_char) -> RawErrorCode>,
    pub get_length: Option<unsafe extern "C" fn(this: RawObject, out: *mut usize) -> RawErrorCode>,
}

/// `IList` table.
///
/// `get_item_at` and `create_start_iterator` hand out a new reference.
/// `push_back` takes its own reference to the item; `move_back` adopts the
/// caller's reference.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ListVTable {
    pub base: BaseObjectVTable,
    pub get_item_at: Option<
        unsafe extern "C" fn(this: RawObject, index: usize, out: *mut RawObject) -> RawErrorCode,
    >,
    pub get_count: Option<unsafe extern "C" fn(this: RawObject, out: *mut usize) -> RawErrorCode>,
    pub push_back: Option<unsafe extern "C" fn(this: RawObject, item: RawObject) -> RawErrorCode>,
    pub move_back: Option<unsafe extern "C" fn(this: RawObject, item: RawObject) -> RawErrorCode>,
    pub clear: Option<unsafe extern "C" fn(this: RawObject) -> RawErrorCode>,
    pub create_start_iterator:
        Option<unsafe extern "C" fn(this: RawObject, out: *mut RawObject) -> RawErrorCode>,
}

/// `IIterator` table. `move_next` returns `NO_MORE_ITEMS` past the end.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct IteratorVTable {
    pub base: BaseObjectVTable,
    pub move_next: Option<unsafe extern "C" fn(this: RawObject) -> RawErrorCode>,
    pub get_current:
        Option<unsafe extern "C" fn(this: RawObject, out: *mut RawObject) -> RawErrorCode>,
}

/// `IErrorInfo` table. Both getters return an `IString` with a new reference,
/// or null when the field is unset.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ErrorInfoVTable {
    pub base: BaseObjectVTable,
    pub get_message:
        Option<unsafe extern "C" fn(this: RawObject, out: *mut RawObject) -> RawErrorCode>,
    pub get_source:
        Option<unsafe extern "C" fn(this: RawObject, out: *mut RawObject) -> RawErrorCode>,
}

/// Copies the function table of `object`.
///
/// # Safety
///
/// `object` must point to a live native object whose table has at least the
/// layout of `V`.
pub unsafe fn read_vtable<V: Copy>(object: RawObject) -> DaqResult<V> {
    if object.is_null() {
        return Err(DaqError::null_reference());
    }
    // SAFETY: the caller guarantees `object` is live; its first word is the
    // table pointer.
    let table = *(object as *const *const V);
    if table.is_null() {
        return Err(DaqError::call_failed("vtable"));
    }
    // SAFETY: the caller guarantees the table has at least `V`'s layout.
    Ok(*table)
}

/// Unwraps a nullable slot.
#[inline]
pub(crate) fn slot<F: Copy>(slot: Option<F>, name: &str) -> DaqResult<F> {
    slot.ok_or_else(|| DaqError::call_failed(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_table_layouts() {
        let word = size_of::<usize>();
        assert_eq!(size_of::<BaseObjectVTable>(), 8 * word);
        assert_eq!(size_of::<StringVTable>(), 10 * word);
        assert_eq!(size_of::<ListVTable>(), 14 * word);
        assert_eq!(size_of::<IteratorVTable>(), 10 * word);
        assert_eq!(size_of::<ErrorInfoVTable>(), 10 * word);
    }

    #[test]
    fn test_read_vtable_null_object() {
        let err = unsafe { read_vtable::<BaseObjectVTable>(std::ptr::null_mut()) }.unwrap_err();
        assert!(err.is_null_reference());
    }

    #[test]
    fn test_read_vtable_null_table() {
        let mut object: *const BaseObjectVTable = std::ptr::null();
        let raw = &mut object as *mut *const BaseObjectVTable as RawObject;
        let err = unsafe { read_vtable::<BaseObjectVTable>(raw) }.unwrap_err();
        assert!(err.is_call_failed());
    }

    #[test]
    fn test_missing_slot_is_call_failed() {
        let table = BaseObjectVTable {
            query_interface: None,
            add_ref: None,
            release_ref: None,
            borrow_interface: None,
            dispose: None,
            get_hash_code: None,
            equals: None,
            to_string: None,
        };
        let err = slot(table.equals, "equals").unwrap_err();
        assert!(err.is_call_failed());
        assert!(err.to_string().contains("equals"));
    }
}
