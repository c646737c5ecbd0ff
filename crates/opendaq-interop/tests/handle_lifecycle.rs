//! Reference accounting of `NativeHandle` against the in-process native library.

mod common;

use common::{adopt, setup};
use opendaq_interop::{
    ErrorCode, IBaseObject, IErrorInfo, IIterator, IList, IString, Interface, NativeHandle,
    TypedView,
};
use opendaq_interop_testkit::{fixtures, RefWatch};
use pretty_assertions::assert_eq;
use std::ptr;

#[test]
fn test_null_construction_fails_for_every_interface() {
    setup();
    let null = ptr::null_mut();

    let errors = unsafe {
        [
            NativeHandle::from_owned_ptr(null).unwrap_err(),
            NativeHandle::from_borrowed_ptr(null).unwrap_err(),
            TypedView::<IBaseObject>::from_owned_ptr(null).unwrap_err(),
            TypedView::<IString>::from_owned_ptr(null).unwrap_err(),
            TypedView::<IList>::from_borrowed_ptr(null).unwrap_err(),
            TypedView::<IIterator>::from_owned_ptr(null).unwrap_err(),
            TypedView::<IErrorInfo>::from_borrowed_ptr(null).unwrap_err(),
        ]
    };
    for err in errors {
        assert!(err.is_null_reference());
        assert_eq!(err.code(), ErrorCode::ARGUMENT_NULL);
    }
}

#[test]
fn test_net_count_follows_owning_operations() {
    setup();
    let raw = fixtures::new_string("abc");
    let refs = unsafe { RefWatch::attach(raw) };

    let handle = adopt(raw);
    refs.assert_count(1);

    let extra = unsafe { NativeHandle::from_borrowed_ptr(raw) }.unwrap();
    refs.assert_count(2);

    let queried = handle.query::<IString>().unwrap();
    refs.assert_count(3);

    let borrowed = handle.borrow::<IString>().unwrap();
    refs.assert_count(3);

    let err = handle.query::<IList>().unwrap_err();
    assert!(err.is_interface_not_supported());
    refs.assert_count(3);

    borrowed.dispose().unwrap();
    refs.assert_count(3);
    queried.dispose().unwrap();
    refs.assert_count(2);
    extra.dispose().unwrap();
    refs.assert_count(1);
    handle.dispose().unwrap();
    refs.assert_count(0);
}

#[test]
fn test_repeated_dispose_releases_once() {
    setup();
    let raw = fixtures::new_object();
    let refs = unsafe { RefWatch::attach(raw) };
    let handle = adopt(raw);
    let other = unsafe { NativeHandle::from_borrowed_ptr(raw) }.unwrap();
    refs.assert_count(2);

    for _ in 0..3 {
        handle.dispose().unwrap();
        assert!(handle.is_disposed());
        refs.assert_count(1);
    }
    drop(handle);
    refs.assert_count(1);
    drop(other);
    refs.assert_count(0);
}

#[test]
fn test_use_after_dispose_is_invalid_operation() {
    setup();
    let handle = fixtures::string_handle("gone");
    let live = fixtures::string_handle("live");
    handle.dispose().unwrap();

    let err = handle.equals(Some(&live)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::INVALID_OPERATION);
    let err = handle.query_interface(&IString::ID).unwrap_err();
    assert!(err.is_invalid_operation());
    let err = handle.to_native_string().unwrap_err();
    assert!(err.is_invalid_operation());
    assert!(handle.borrow::<IString>().unwrap_err().is_invalid_operation());
    assert!(handle.hash_code().unwrap_err().is_invalid_operation());

    // The disposed side may also be the comparand.
    assert!(live.equals(Some(&handle)).unwrap_err().is_invalid_operation());
    assert!(!handle.can_cast::<IString>());
    assert_eq!(handle.to_string(), "<OPENDAQ_ERR_INVALID_OPERATION>");
}

#[test]
fn test_use_after_steal_is_invalid_operation() {
    setup();
    let handle = fixtures::string_handle("stolen");
    let raw = handle.steal().unwrap();

    assert!(handle.equals(Some(&handle)).unwrap_err().is_invalid_operation());
    assert!(handle.query::<IString>().unwrap_err().is_invalid_operation());
    assert!(handle.to_native_string().unwrap_err().is_invalid_operation());

    adopt(raw).dispose().unwrap();
}

#[test]
fn test_dispose_of_borrowed_view_releases_nothing() {
    setup();
    let raw = fixtures::new_string("view");
    let refs = unsafe { RefWatch::attach(raw) };
    let source = adopt(raw);

    let view = source.borrow_interface(&IString::ID).unwrap();
    assert!(view.is_borrowed());
    view.dispose().unwrap();
    view.dispose().unwrap();
    refs.assert_count(1);

    source.dispose().unwrap();
    refs.assert_count(0);
}

#[test]
fn test_steal_transfers_without_release() {
    setup();
    let raw = fixtures::new_object();
    let refs = unsafe { RefWatch::attach(raw) };
    let handle = adopt(raw);

    let stolen = handle.steal().unwrap();
    assert_eq!(stolen, raw);
    assert!(handle.is_disposed());
    assert!(handle.as_ptr().is_null());
    refs.assert_count(1);

    handle.dispose().unwrap();
    drop(handle);
    refs.assert_count(1);

    adopt(stolen).dispose().unwrap();
    refs.assert_count(0);
}

#[test]
fn test_steal_twice_and_steal_from_view_fail() {
    setup();
    let raw = fixtures::new_object();
    let refs = unsafe { RefWatch::attach(raw) };
    let handle = adopt(raw);

    let view = handle.borrow_interface(&IBaseObject::ID).unwrap();
    assert!(view.steal().unwrap_err().is_invalid_operation());
    refs.assert_count(1);

    let stolen = handle.steal().unwrap();
    assert!(handle.steal().unwrap_err().is_invalid_operation());
    refs.assert_count(1);

    adopt(stolen).dispose().unwrap();
    refs.assert_count(0);
}

#[test]
fn test_into_raw_keeps_the_reference() {
    setup();
    let raw = fixtures::new_object();
    let refs = unsafe { RefWatch::attach(raw) };

    let address = adopt(raw).into_raw().unwrap();
    assert_eq!(address, raw);
    refs.assert_count(1);

    drop(adopt(address));
    refs.assert_count(0);
}

#[test]
fn test_equality_is_symmetric() {
    setup();
    let raw = fixtures::new_object();
    let first = adopt(raw);
    let second = unsafe { NativeHandle::from_borrowed_ptr(raw) }.unwrap();

    assert!(first.equals(Some(&second)).unwrap());
    assert!(second.equals(Some(&first)).unwrap());
    assert_eq!(first, second);
    assert!(!first.equals(None).unwrap());

    let unrelated = adopt(fixtures::new_object());
    assert!(!first.equals(Some(&unrelated)).unwrap());
    assert!(!unrelated.equals(Some(&first)).unwrap());
    assert_ne!(first, unrelated);
}

#[test]
fn test_native_equality_and_hash_are_by_value_for_strings() {
    setup();
    let a = fixtures::string_handle("same");
    let b = fixtures::string_handle("same");
    let c = fixtures::string_handle("other");

    assert_ne!(a.as_ptr(), b.as_ptr());
    assert_eq!(a, b);
    assert_eq!(a.hash_code().unwrap(), b.hash_code().unwrap());
    assert_ne!(a, c);
}

#[test]
fn test_query_then_dispose_both_restores_count() {
    setup();
    let (raw, destroyed) = fixtures::new_tracked_object();
    let refs = unsafe { RefWatch::attach(raw) };
    let r0 = refs.count();

    let handle = adopt(raw);
    let queried = handle.query_interface(&IBaseObject::ID).unwrap();
    refs.assert_count(r0 + 1);
    queried.dispose().unwrap();
    refs.assert_count(r0);
    handle.dispose().unwrap();
    refs.assert_count(0);

    drop(refs);
    assert!(destroyed.is_destroyed());
}

#[test]
fn test_borrowed_view_fails_after_source_dispose() {
    setup();
    let raw = fixtures::new_string("borrowed");
    let refs = unsafe { RefWatch::attach(raw) };
    let source = adopt(raw);
    let view = source.borrow::<IString>().unwrap();
    let nested = view.borrow_interface(&IBaseObject::ID).unwrap();
    assert_eq!(view.to_rust_string().unwrap(), "borrowed");

    source.dispose().unwrap();
    // The watch still keeps the object alive; the views lost their claim on it.
    refs.assert_count(0);
    assert!(view.is_disposed());
    assert!(nested.is_disposed());

    assert!(view.to_rust_string().unwrap_err().is_invalid_operation());
    assert!(view.equals(Some(&nested)).unwrap_err().is_invalid_operation());
    assert!(view.query::<IString>().unwrap_err().is_invalid_operation());
    assert!(nested.to_native_string().unwrap_err().is_invalid_operation());
    assert!(nested.address().unwrap_err().is_invalid_operation());

    drop(view);
    drop(nested);
    refs.assert_count(0);
}

#[test]
fn test_can_cast_never_changes_count() {
    setup();
    let raw = fixtures::new_object();
    let refs = unsafe { RefWatch::attach(raw) };
    let handle = adopt(raw);

    assert!(!handle.can_cast::<IList>());
    assert!(!handle.can_cast::<IString>());
    assert!(handle.can_cast::<IBaseObject>());
    refs.assert_count(1);
}

#[test]
fn test_drop_releases_exactly_once() {
    setup();
    let raw = fixtures::new_object();
    let refs = unsafe { RefWatch::attach(raw) };
    {
        let _first = adopt(raw);
        let _second = unsafe { NativeHandle::from_borrowed_ptr(raw) }.unwrap();
        refs.assert_count(2);
    }
    refs.assert_count(0);
}

#[test]
fn test_release_failure_is_reported_by_dispose_and_swallowed_by_drop() {
    setup();
    let raw = fixtures::new_unreleasable();
    let disposed = unsafe { NativeHandle::from_borrowed_ptr(raw) }.unwrap();
    let err = disposed.dispose().unwrap_err();
    assert!(err.is_call_failed());
    // The address was given up even though the release failed.
    assert!(disposed.is_disposed());
    assert!(disposed.dispose().is_ok());

    let dropped = unsafe { NativeHandle::from_borrowed_ptr(raw) }.unwrap();
    drop(dropped);
}

#[test]
fn test_try_clone_takes_an_independent_reference() {
    setup();
    let raw = fixtures::new_string("clone");
    let refs = unsafe { RefWatch::attach(raw) };
    let handle = adopt(raw);

    let clone = handle.try_clone().unwrap();
    refs.assert_count(2);
    assert!(!clone.is_borrowed());
    handle.dispose().unwrap();
    assert_eq!(clone.to_native_string().unwrap(), "clone");
    drop(clone);
    refs.assert_count(0);

    assert!(handle.try_clone().unwrap_err().is_invalid_operation());
}

#[test]
fn test_clone_of_borrowed_view_owns_a_reference() {
    setup();
    let raw = fixtures::new_string("owned");
    let refs = unsafe { RefWatch::attach(raw) };
    let source = adopt(raw);
    let view = source.borrow::<IString>().unwrap();

    let owned = view.try_clone().unwrap();
    refs.assert_count(2);
    source.dispose().unwrap();
    assert_eq!(owned.to_rust_string().unwrap(), "owned");
    drop(owned);
    refs.assert_count(0);
}

#[test]
fn test_display_uses_native_to_string() {
    setup();
    assert_eq!(fixtures::string_handle("text").to_string(), "text");
    assert_eq!(adopt(fixtures::new_object()).to_string(), "BaseObject");
    assert_eq!(adopt(fixtures::new_list()).to_native_string().unwrap(), "List[0]");
}
