//! Reference-count observation for tests.

use std::fmt;

use opendaq_interop::RawObject;

use crate::object;

/// Holds one extra reference on an object so its count can be read at any
/// point in a test, including after every handle to it is gone.
pub struct RefWatch {
    object: RawObject,
}

impl RefWatch {
    /// Attaches to `object`, taking one reference.
    ///
    /// # Safety
    ///
    /// `object` must be a live object created by this testkit.
    pub unsafe fn attach(object: RawObject) -> Self {
        object::retain(object);
        RefWatch { object }
    }

    /// References held by everyone except the watch.
    pub fn count(&self) -> i32 {
        // SAFETY: the watch keeps the object alive.
        unsafe { object::ref_count(self.object) - 1 }
    }

    pub fn as_ptr(&self) -> RawObject {
        self.object
    }

    /// Panics unless exactly `expected` references are held besides the watch.
    #[track_caller]
    pub fn assert_count(&self, expected: i32) {
        let actual = self.count();
        assert!(
            actual == expected,
            "expected {expected} reference(s) on {:p}, found {actual}",
            self.object
        );
    }
}

impl Drop for RefWatch {
    fn drop(&mut self) {
        // SAFETY: the watch owns one reference.
        unsafe { object::release(self.object) };
    }
}

impl fmt::Debug for RefWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefWatch")
            .field("object", &self.object)
            .field("count", &self.count())
            .finish()
    }
}
