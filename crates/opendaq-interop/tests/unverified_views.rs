//! Typed views with interface verification and reference tracing turned off.
//!
//! Runs as its own test binary because the configuration is fixed by the
//! first `config::init` in a process.

use opendaq_interop::{config, BridgeConfig, ErrorCode, IBaseObject, IList, IString, TypedView};
use opendaq_interop_testkit::{error_info_pending, fixtures};
use pretty_assertions::assert_eq;

fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
    config::init(BridgeConfig {
        verify_interfaces: false,
        trace_references: false,
    });
    opendaq_interop_testkit::install();
}

#[test]
fn test_configuration_is_unverified() {
    setup();
    assert!(!config::get().verify_interfaces);
    assert!(!config::get().trace_references);
}

#[test]
fn test_wrapping_skips_negotiation() {
    setup();
    // Every negotiation with this object fails and posts diagnostics.
    let raw = fixtures::new_faulty(ErrorCode::GENERAL_ERROR, "never asked");
    let view = unsafe { TypedView::<IBaseObject>::from_owned_ptr(raw) }.unwrap();
    assert!(!error_info_pending());

    // Asking explicitly still reaches the object.
    assert!(!view.can_cast::<IString>());
    assert!(!error_info_pending());
    view.dispose().unwrap();
    assert!(view.is_disposed());
}

#[test]
fn test_unverified_views_read_through() {
    setup();
    let (raw, destroyed) = fixtures::new_tracked_list();
    let list = unsafe { TypedView::<IList>::from_owned_ptr(raw) }.unwrap();
    list.push_back(&fixtures::string_handle("unchecked")).unwrap();
    assert_eq!(list.count().unwrap(), 1);

    let text = unsafe { TypedView::<IString>::from_owned_ptr(fixtures::new_string("plain")) }
        .unwrap();
    assert_eq!(text.to_rust_string().unwrap(), "plain");
    assert_eq!(text.length().unwrap(), 5);

    let shared = unsafe { TypedView::<IString>::from_borrowed_ptr(text.as_ptr()) }.unwrap();
    drop(text);
    assert_eq!(shared.to_rust_string().unwrap(), "plain");

    drop(list);
    assert!(destroyed.is_destroyed());
}
