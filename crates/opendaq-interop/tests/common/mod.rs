//! Shared setup for integration tests.

use opendaq_interop::{config, BridgeConfig, NativeHandle, RawObject};

/// Initialises logging, the bridge configuration and the testkit runtime.
pub fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
    config::init(BridgeConfig {
        verify_interfaces: true,
        trace_references: true,
    });
    opendaq_interop_testkit::install();
}

/// Wraps a freshly created testkit object, adopting its reference.
pub fn adopt(raw: RawObject) -> NativeHandle {
    unsafe { NativeHandle::from_owned_ptr(raw) }.unwrap()
}
