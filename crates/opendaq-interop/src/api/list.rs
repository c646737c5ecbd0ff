//! `IList` and `IIterator` views.

use std::ptr;

use log::debug;

use crate::error::{DaqError, DaqResult, ErrorCode};
use crate::ffi::{self, RawObject};
use crate::handle::NativeHandle;
use crate::types::{IIterator, IList};
use crate::view::TypedView;

/// View of a native list.
pub type ListView = TypedView<IList>;

/// View of a native iterator.
pub type IteratorView = TypedView<IIterator>;

impl TypedView<IList> {
    /// Number of items.
    pub fn count(&self) -> DaqResult<usize> {
        let (access, table) = self.table()?;
        let this = access.address();
        let get_count = ffi::slot(table.get_count, "getCount")?;
        let mut count = 0usize;
        // SAFETY: `access` keeps `this` live; `count` is a valid out-pointer.
        ErrorCode::from_raw(unsafe { get_count(this, &mut count) }).into_result()?;
        Ok(count)
    }

    pub fn is_empty(&self) -> DaqResult<bool> {
        Ok(self.count()? == 0)
    }

    /// Item at `index`, as a new owning handle.
    pub fn item_at(&self, index: usize) -> DaqResult<NativeHandle> {
        let (access, table) = self.table()?;
        let this = access.address();
        let get_item_at = ffi::slot(table.get_item_at, "getItemAt")?;
        let mut item: RawObject = ptr::null_mut();
        // SAFETY: `access` keeps `this` live; `item` is a valid out-pointer.
        ErrorCode::from_raw(unsafe { get_item_at(this, index, &mut item) }).into_result()?;
        // SAFETY: getItemAt hands out a live pointer with one reference.
        unsafe { NativeHandle::from_owned_ptr(item) }
    }

    /// Appends `item`. The list takes its own reference; `item` stays valid.
    pub fn push_back(&self, item: &NativeHandle) -> DaqResult<()> {
        let (access, table) = self.table()?;
        let this = access.address();
        let push_back = ffi::slot(table.push_back, "pushBack")?;
        let item = item.access()?;
        // SAFETY: both guards keep their objects live.
        ErrorCode::from_raw(unsafe { push_back(this, item.address()) }).into_result()
    }

    /// Appends `item`, handing the handle's reference to the list.
    ///
    /// If the list refuses the item the reference is released here.
    pub fn move_back(&self, item: NativeHandle) -> DaqResult<()> {
        let (access, table) = self.table()?;
        let this = access.address();
        let move_back = ffi::slot(table.move_back, "moveBack")?;
        let raw = item.steal()?;
        // SAFETY: `access` keeps `this` live; `raw` carries the reference being moved.
        let code = ErrorCode::from_raw(unsafe { move_back(this, raw) });
        if code.is_success() {
            return Ok(());
        }
        let err = DaqError::from_native(code);
        // SAFETY: on failure the list did not adopt the reference.
        if let Err(e) = unsafe { NativeHandle::from_owned_ptr(raw) }.and_then(|h| h.dispose()) {
            debug!("failed to release rejected list item: {e}");
        }
        Err(err)
    }

    /// Removes all items.
    pub fn clear(&self) -> DaqResult<()> {
        let (access, table) = self.table()?;
        let this = access.address();
        let clear = ffi::slot(table.clear, "clear")?;
        // SAFETY: `access` keeps `this` live.
        ErrorCode::from_raw(unsafe { clear(this) }).into_result()
    }

    /// Native iterator positioned before the first item.
    pub fn create_start_iterator(&self) -> DaqResult<IteratorView> {
        let (access, table) = self.table()?;
        let this = access.address();
        let create = ffi::slot(table.create_start_iterator, "createStartIterator")?;
        let mut iterator: RawObject = ptr::null_mut();
        // SAFETY: `access` keeps `this` live; `iterator` is a valid out-pointer.
        ErrorCode::from_raw(unsafe { create(this, &mut iterator) }).into_result()?;
        // SAFETY: createStartIterator returns an IIterator with one reference.
        unsafe { TypedView::<IIterator>::from_owned_ptr(iterator) }
    }

    /// Iterates the list through its native iterator.
    pub fn iter(&self) -> DaqResult<ListIter> {
        Ok(ListIter {
            iterator: self.create_start_iterator()?,
            finished: false,
        })
    }
}

impl TypedView<IIterator> {
    /// Advances the iterator. Returns `false` once the native side reports
    /// `NO_MORE_ITEMS`.
    pub fn move_next(&self) -> DaqResult<bool> {
        let (access, table) = self.table()?;
        let this = access.address();
        let move_next = ffi::slot(table.move_next, "moveNext")?;
        // SAFETY: `access` keeps `this` live.
        let code = ErrorCode::from_raw(unsafe { move_next(this) })
            .into_result_allowing(&[ErrorCode::NO_MORE_ITEMS])?;
        Ok(code != ErrorCode::NO_MORE_ITEMS)
    }

    /// Item at the current position, as a new owning handle.
    pub fn current(&self) -> DaqResult<NativeHandle> {
        let (access, table) = self.table()?;
        let this = access.address();
        let get_current = ffi::slot(table.get_current, "getCurrent")?;
        let mut item: RawObject = ptr::null_mut();
        // SAFETY: `access` keeps `this` live; `item` is a valid out-pointer.
        ErrorCode::from_raw(unsafe { get_current(this, &mut item) }).into_result()?;
        // SAFETY: getCurrent hands out a live pointer with one reference.
        unsafe { NativeHandle::from_owned_ptr(item) }
    }
}

/// `Iterator` adapter over a native list iterator.
///
/// Stops after the first error.
#[derive(Debug)]
pub struct ListIter {
    iterator: IteratorView,
    finished: bool,
}

impl Iterator for ListIter {
    type Item = DaqResult<NativeHandle>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.iterator.move_next() {
            Ok(true) => {
                let item = self.iterator.current();
                if item.is_err() {
                    self.finished = true;
                }
                Some(item)
            }
            Ok(false) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
