//! Native object model implemented in Rust.
//!
//! Every object is a heap-allocated [`MockObject`] whose first word is the
//! function table of its kind, exactly like an object handed out by the native
//! SDK. Reference counts are atomic; the object frees itself when the count
//! reaches zero and releases every reference it holds on other objects.

use std::collections::hash_map::DefaultHasher;
use std::ffi::{c_char, c_void, CString};
use std::hash::{Hash, Hasher};
use std::ptr;
use std::sync::atomic::{fence, AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::trace;
use opendaq_interop::ffi::{
    read_vtable, BaseObjectVTable, ErrorInfoVTable, IteratorVTable, ListVTable, StringVTable,
};
use opendaq_interop::{
    ErrorCode, IBaseObject, IErrorInfo, IIterator, IList, IString, Interface, IntfId,
    RawErrorCode, RawObject,
};

use crate::exports;

pub(crate) enum Payload {
    Plain,
    Str(CString),
    List {
        items: Mutex<Vec<RawObject>>,
        frozen: bool,
    },
    Iterator {
        list: RawObject,
        position: AtomicUsize,
    },
    ErrorInfo {
        message: RawObject,
        source: RawObject,
        unreadable: bool,
    },
    Faulty {
        code: RawErrorCode,
        message: String,
    },
}

#[repr(C)]
pub(crate) struct MockObject {
    // Only read through the object pointer.
    #[allow(dead_code)]
    vtable: *const c_void,
    refcount: AtomicI32,
    payload: Payload,
    destroyed: Option<Arc<AtomicBool>>,
}

const SUCCESS: RawErrorCode = ErrorCode::SUCCESS.as_raw();

const fn base_vtable() -> BaseObjectVTable {
    BaseObjectVTable {
        query_interface: Some(query_interface),
        add_ref: Some(add_ref),
        release_ref: Some(release_ref),
        borrow_interface: Some(borrow_interface),
        dispose: Some(dispose),
        get_hash_code: Some(get_hash_code),
        equals: Some(equals),
        to_string: Some(to_string),
    }
}

static BASE_VTABLE: BaseObjectVTable = base_vtable();

static UNRELEASABLE_VTABLE: BaseObjectVTable = BaseObjectVTable {
    release_ref: None,
    ..base_vtable()
};

static STRING_VTABLE: StringVTable = StringVTable {
    base: base_vtable(),
    get_char_ptr: Some(string_get_char_ptr),
    get_length: Some(string_get_length),
};

static LIST_VTABLE: ListVTable = ListVTable {
    base: base_vtable(),
    get_item_at: Some(list_get_item_at),
    get_count: Some(list_get_count),
    push_back: Some(list_push_back),
    move_back: Some(list_move_back),
    clear: Some(list_clear),
    create_start_iterator: Some(list_create_start_iterator),
};

static ITERATOR_VTABLE: IteratorVTable = IteratorVTable {
    base: base_vtable(),
    move_next: Some(iterator_move_next),
    get_current: Some(iterator_get_current),
};

static ERROR_INFO_VTABLE: ErrorInfoVTable = ErrorInfoVTable {
    base: base_vtable(),
    get_message: Some(error_info_get_message),
    get_source: Some(error_info_get_source),
};

/// Which table a new object is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Table {
    Default,
    Unreleasable,
}

/// Allocates an object with one reference.
pub(crate) fn allocate(
    payload: Payload,
    table: Table,
    destroyed: Option<Arc<AtomicBool>>,
) -> RawObject {
    let vtable: *const c_void = match (&payload, table) {
        (_, Table::Unreleasable) => {
            &UNRELEASABLE_VTABLE as *const BaseObjectVTable as *const c_void
        }
        (Payload::Str(_), _) => &STRING_VTABLE as *const StringVTable as *const c_void,
        (Payload::List { .. }, _) => &LIST_VTABLE as *const ListVTable as *const c_void,
        (Payload::Iterator { .. }, _) => {
            &ITERATOR_VTABLE as *const IteratorVTable as *const c_void
        }
        (Payload::ErrorInfo { .. }, _) => {
            &ERROR_INFO_VTABLE as *const ErrorInfoVTable as *const c_void
        }
        (Payload::Plain | Payload::Faulty { .. }, _) => {
            &BASE_VTABLE as *const BaseObjectVTable as *const c_void
        }
    };
    let object = Box::new(MockObject {
        vtable,
        refcount: AtomicI32::new(1),
        payload,
        destroyed,
    });
    Box::into_raw(object) as RawObject
}

/// # Safety
///
/// `this` must be a live object allocated by this module.
unsafe fn object<'a>(this: RawObject) -> &'a MockObject {
    &*(this as *const MockObject)
}

/// Current reference count.
///
/// # Safety
///
/// `this` must be a live object allocated by this module.
pub(crate) unsafe fn ref_count(this: RawObject) -> i32 {
    object(this).refcount.load(Ordering::Acquire)
}

/// Adds a reference through the object's own table.
///
/// # Safety
///
/// `this` must be a live object allocated by this module.
pub(crate) unsafe fn retain(this: RawObject) {
    if !this.is_null() {
        add_ref(this);
    }
}

/// Releases a reference through the object's own table.
///
/// # Safety
///
/// `this` must be null or a live object allocated by this module on which the
/// caller holds a reference.
pub(crate) unsafe fn release(this: RawObject) {
    if this.is_null() {
        return;
    }
    match read_vtable::<BaseObjectVTable>(this) {
        Ok(BaseObjectVTable {
            release_ref: Some(release_fn),
            ..
        }) => {
            release_fn(this);
        }
        _ => trace!("object {this:p} cannot be released"),
    }
}

fn supports(payload: &Payload, id: &IntfId) -> bool {
    if *id == IBaseObject::ID {
        return true;
    }
    match payload {
        Payload::Str(_) => *id == IString::ID,
        Payload::List { .. } => *id == IList::ID,
        Payload::Iterator { .. } => *id == IIterator::ID,
        Payload::ErrorInfo { .. } => *id == IErrorInfo::ID,
        Payload::Plain | Payload::Faulty { .. } => false,
    }
}

/// Fails the call the way the native SDK does: error info plus status code.
fn fail(code: RawErrorCode, message: &str) -> RawErrorCode {
    exports::set_error_info(message, Some("testkit"));
    code
}

fn check_faulty(payload: &Payload) -> Option<RawErrorCode> {
    match payload {
        Payload::Faulty { code, message } => Some(fail(*code, message)),
        _ => None,
    }
}

unsafe extern "C" fn query_interface(
    this: RawObject,
    id: *const IntfId,
    out: *mut RawObject,
) -> RawErrorCode {
    negotiate(this, id, out, true)
}

unsafe extern "C" fn borrow_interface(
    this: RawObject,
    id: *const IntfId,
    out: *mut RawObject,
) -> RawErrorCode {
    negotiate(this, id, out, false)
}

unsafe fn negotiate(
    this: RawObject,
    id: *const IntfId,
    out: *mut RawObject,
    add: bool,
) -> RawErrorCode {
    if id.is_null() || out.is_null() {
        return ErrorCode::ARGUMENT_NULL.as_raw();
    }
    let obj = object(this);
    if let Some(code) = check_faulty(&obj.payload) {
        *out = ptr::null_mut();
        return code;
    }
    if !supports(&obj.payload, &*id) {
        *out = ptr::null_mut();
        return ErrorCode::NO_INTERFACE.as_raw();
    }
    if add {
        add_ref(this);
    }
    *out = this;
    SUCCESS
}

unsafe extern "C" fn add_ref(this: RawObject) -> i32 {
    object(this).refcount.fetch_add(1, Ordering::Relaxed) + 1
}

unsafe extern "C" fn release_ref(this: RawObject) -> i32 {
    let remaining = object(this).refcount.fetch_sub(1, Ordering::Release) - 1;
    if remaining == 0 {
        fence(Ordering::Acquire);
        destroy(this);
    }
    remaining
}

unsafe fn destroy(this: RawObject) {
    trace!("destroying object {this:p}");
    let boxed = Box::from_raw(this as *mut MockObject);
    match &boxed.payload {
        Payload::List { items, .. } => release_items(items),
        Payload::Iterator { list, .. } => release(*list),
        Payload::ErrorInfo {
            message, source, ..
        } => {
            release(*message);
            release(*source);
        }
        Payload::Plain | Payload::Str(_) | Payload::Faulty { .. } => {}
    }
    if let Some(flag) = &boxed.destroyed {
        flag.store(true, Ordering::Release);
    }
}

unsafe fn release_items(items: &Mutex<Vec<RawObject>>) {
    let drained = match items.lock() {
        Ok(mut guard) => std::mem::take(&mut *guard),
        Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
    };
    for item in drained {
        release(item);
    }
}

unsafe extern "C" fn dispose(this: RawObject) -> RawErrorCode {
    if let Payload::List { items, .. } = &object(this).payload {
        release_items(items);
    }
    SUCCESS
}

unsafe extern "C" fn get_hash_code(this: RawObject, out: *mut usize) -> RawErrorCode {
    if out.is_null() {
        return ErrorCode::ARGUMENT_NULL.as_raw();
    }
    let obj = object(this);
    if let Some(code) = check_faulty(&obj.payload) {
        return code;
    }
    *out = match &obj.payload {
        Payload::Str(text) => {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            hasher.finish() as usize
        }
        _ => this as usize,
    };
    SUCCESS
}

unsafe extern "C" fn equals(this: RawObject, other: RawObject, out: *mut u8) -> RawErrorCode {
    if out.is_null() {
        return ErrorCode::ARGUMENT_NULL.as_raw();
    }
    let obj = object(this);
    if let Some(code) = check_faulty(&obj.payload) {
        return code;
    }
    if other.is_null() {
        *out = 0;
        return SUCCESS;
    }
    let same = match (&obj.payload, &object(other).payload) {
        (Payload::Str(a), Payload::Str(b)) => a == b,
        _ => this == other,
    };
    *out = u8::from(same);
    SUCCESS
}

unsafe extern "C" fn to_string(this: RawObject, out: *mut *mut c_char) -> RawErrorCode {
    if out.is_null() {
        return ErrorCode::ARGUMENT_NULL.as_raw();
    }
    let obj = object(this);
    if let Some(code) = check_faulty(&obj.payload) {
        return code;
    }
    let text = match &obj.payload {
        Payload::Str(text) => text.clone(),
        Payload::List { items, .. } => {
            let count = items.lock().map(|guard| guard.len()).unwrap_or(0);
            owned_c_string(&format!("List[{count}]"))
        }
        Payload::Iterator { .. } => owned_c_string("Iterator"),
        Payload::ErrorInfo { .. } => owned_c_string("ErrorInfo"),
        Payload::Plain | Payload::Faulty { .. } => owned_c_string("BaseObject"),
    };
    *out = text.into_raw();
    SUCCESS
}

fn owned_c_string(text: &str) -> CString {
    CString::new(text.replace('\0', "")).unwrap_or_default()
}

unsafe extern "C" fn string_get_char_ptr(this: RawObject, out: *mut *const c_char) -> RawErrorCode {
    if out.is_null() {
        return ErrorCode::ARGUMENT_NULL.as_raw();
    }
    match &object(this).payload {
        Payload::Str(text) => {
            *out = text.as_ptr();
            SUCCESS
        }
        _ => ErrorCode::INVALID_TYPE.as_raw(),
    }
}

unsafe extern "C" fn string_get_length(this: RawObject, out: *mut usize) -> RawErrorCode {
    if out.is_null() {
        return ErrorCode::ARGUMENT_NULL.as_raw();
    }
    match &object(this).payload {
        Payload::Str(text) => {
            *out = text.as_bytes().len();
            SUCCESS
        }
        _ => ErrorCode::INVALID_TYPE.as_raw(),
    }
}

unsafe fn list_parts<'a>(this: RawObject) -> Option<(&'a Mutex<Vec<RawObject>>, bool)> {
    match &object(this).payload {
        Payload::List { items, frozen } => Some((items, *frozen)),
        _ => None,
    }
}

unsafe extern "C" fn list_get_item_at(
    this: RawObject,
    index: usize,
    out: *mut RawObject,
) -> RawErrorCode {
    if out.is_null() {
        return ErrorCode::ARGUMENT_NULL.as_raw();
    }
    let Some((items, _)) = list_parts(this) else {
        return ErrorCode::INVALID_TYPE.as_raw();
    };
    let item = match items.lock() {
        Ok(guard) => guard.get(index).copied(),
        Err(_) => return ErrorCode::INVALID_STATE.as_raw(),
    };
    match item {
        Some(item) => {
            retain(item);
            *out = item;
            SUCCESS
        }
        None => {
            *out = ptr::null_mut();
            fail(
                ErrorCode::OUT_OF_RANGE.as_raw(),
                &format!("list index {index} is out of range"),
            )
        }
    }
}

unsafe extern "C" fn list_get_count(this: RawObject, out: *mut usize) -> RawErrorCode {
    if out.is_null() {
        return ErrorCode::ARGUMENT_NULL.as_raw();
    }
    let Some((items, _)) = list_parts(this) else {
        return ErrorCode::INVALID_TYPE.as_raw();
    };
    match items.lock() {
        Ok(guard) => {
            *out = guard.len();
            SUCCESS
        }
        Err(_) => ErrorCode::INVALID_STATE.as_raw(),
    }
}

unsafe fn list_append(this: RawObject, item: RawObject, adopt: bool) -> RawErrorCode {
    if item.is_null() {
        return ErrorCode::ARGUMENT_NULL.as_raw();
    }
    let Some((items, frozen)) = list_parts(this) else {
        return ErrorCode::INVALID_TYPE.as_raw();
    };
    if frozen {
        return fail(ErrorCode::INVALID_OPERATION.as_raw(), "list is frozen");
    }
    let Ok(mut guard) = items.lock() else {
        return ErrorCode::INVALID_STATE.as_raw();
    };
    if !adopt {
        retain(item);
    }
    guard.push(item);
    SUCCESS
}

unsafe extern "C" fn list_push_back(this: RawObject, item: RawObject) -> RawErrorCode {
    list_append(this, item, false)
}

unsafe extern "C" fn list_move_back(this: RawObject, item: RawObject) -> RawErrorCode {
    list_append(this, item, true)
}

unsafe extern "C" fn list_clear(this: RawObject) -> RawErrorCode {
    let Some((items, frozen)) = list_parts(this) else {
        return ErrorCode::INVALID_TYPE.as_raw();
    };
    if frozen {
        return fail(ErrorCode::INVALID_OPERATION.as_raw(), "list is frozen");
    }
    release_items(items);
    SUCCESS
}

unsafe extern "C" fn list_create_start_iterator(
    this: RawObject,
    out: *mut RawObject,
) -> RawErrorCode {
    if out.is_null() {
        return ErrorCode::ARGUMENT_NULL.as_raw();
    }
    if list_parts(this).is_none() {
        return ErrorCode::INVALID_TYPE.as_raw();
    }
    retain(this);
    *out = allocate(
        Payload::Iterator {
            list: this,
            position: AtomicUsize::new(0),
        },
        Table::Default,
        None,
    );
    SUCCESS
}

unsafe fn iterator_parts<'a>(this: RawObject) -> Option<(RawObject, &'a AtomicUsize)> {
    match &object(this).payload {
        Payload::Iterator { list, position } => Some((*list, position)),
        _ => None,
    }
}

unsafe extern "C" fn iterator_move_next(this: RawObject) -> RawErrorCode {
    let Some((list, position)) = iterator_parts(this) else {
        return ErrorCode::INVALID_TYPE.as_raw();
    };
    let mut count = 0usize;
    let code = list_get_count(list, &mut count);
    if code != SUCCESS {
        return code;
    }
    let current = position.load(Ordering::Acquire);
    if current >= count {
        position.store(count + 1, Ordering::Release);
        return ErrorCode::NO_MORE_ITEMS.as_raw();
    }
    position.store(current + 1, Ordering::Release);
    SUCCESS
}

unsafe extern "C" fn iterator_get_current(this: RawObject, out: *mut RawObject) -> RawErrorCode {
    let Some((list, position)) = iterator_parts(this) else {
        return ErrorCode::INVALID_TYPE.as_raw();
    };
    match position.load(Ordering::Acquire) {
        0 => fail(
            ErrorCode::INVALID_STATE.as_raw(),
            "iterator is positioned before the first item",
        ),
        current => list_get_item_at(list, current - 1, out),
    }
}

unsafe fn error_info_field(this: RawObject, out: *mut RawObject, message: bool) -> RawErrorCode {
    if out.is_null() {
        return ErrorCode::ARGUMENT_NULL.as_raw();
    }
    let field = match &object(this).payload {
        Payload::ErrorInfo {
            message: text,
            source,
            unreadable,
        } => {
            if message && *unreadable {
                return fail(
                    ErrorCode::INVALID_STATE.as_raw(),
                    "error info message is unreadable",
                );
            }
            if message {
                *text
            } else {
                *source
            }
        }
        _ => return ErrorCode::INVALID_TYPE.as_raw(),
    };
    retain(field);
    *out = field;
    SUCCESS
}

unsafe extern "C" fn error_info_get_message(this: RawObject, out: *mut RawObject) -> RawErrorCode {
    error_info_field(this, out, true)
}

unsafe extern "C" fn error_info_get_source(this: RawObject, out: *mut RawObject) -> RawErrorCode {
    error_info_field(this, out, false)
}
