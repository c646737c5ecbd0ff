//! Interface identifiers and interface marker types.
//!
//! Every capability a native object can expose is named by a 128-bit
//! [`IntfId`]. The marker types defined here pair that identifier with the
//! `#[repr(C)]` function table the capability uses, so that a
//! [`TypedView`](crate::TypedView) can only be built for a table layout that
//! matches the identifier it was negotiated with.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::{DaqError, DaqResult};
use crate::ffi::{BaseObjectVTable, ErrorInfoVTable, IteratorVTable, ListVTable, StringVTable};

/// Interface identifier (GUID layout, matches `IntfID` in the C ABI).
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IntfId {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl IntfId {
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }

    /// Parses the canonical `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` form.
    pub fn parse_str(input: &str) -> DaqResult<Self> {
        let uuid = Uuid::parse_str(input).map_err(|e| {
            DaqError::with_message(
                crate::ErrorCode::INVALID_PARAMETER,
                format!("invalid interface id '{input}': {e}"),
            )
        })?;
        Ok(Self::from(uuid))
    }

    pub fn as_uuid(&self) -> Uuid {
        Uuid::from_fields(self.data1, self.data2, self.data3, &self.data4)
    }
}

impl From<Uuid> for IntfId {
    fn from(uuid: Uuid) -> Self {
        let (data1, data2, data3, data4) = uuid.as_fields();
        Self::new(data1, data2, data3, *data4)
    }
}

impl From<IntfId> for Uuid {
    fn from(id: IntfId) -> Self {
        id.as_uuid()
    }
}

impl FromStr for IntfId {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl fmt::Display for IntfId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_uuid().hyphenated())
    }
}

impl fmt::Debug for IntfId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntfId({self})")
    }
}

/// Marker trait for native interfaces.
///
/// # Safety contract
///
/// `VTable` must be a `#[repr(C)]` struct whose first field is a
/// [`BaseObjectVTable`] and whose remaining fields mirror the native table of
/// the interface identified by `ID`.
pub trait Interface: Send + Sync + 'static {
    /// Interface identifier negotiated with `queryInterface`.
    const ID: IntfId;

    /// Interface name for diagnostics.
    const NAME: &'static str;

    /// Function table layout.
    type VTable: Copy + Send + Sync + 'static;
}

macro_rules! define_interface {
    ($name:ident, $type_name:literal, $vtable:ty, $id:expr) => {
        #[doc = concat!("Marker type for the native `", $type_name, "` interface.")]
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl Interface for $name {
            const ID: IntfId = $id;
            const NAME: &'static str = $type_name;
            type VTable = $vtable;
        }
    };
}

/// Marker type for the native `IBaseObject` interface.
///
/// Every native object implements it; its table is the common prefix of all
/// other tables.
#[derive(Debug, Clone, Copy)]
pub struct IBaseObject;

impl Interface for IBaseObject {
    const ID: IntfId = IntfId::new(
        0x9c91_1f6d,
        0x1664,
        0x5a5b,
        [0x9d, 0x3b, 0x1f, 0x2e, 0x7c, 0x3c, 0x4f, 0x57],
    );
    const NAME: &'static str = "IBaseObject";
    type VTable = BaseObjectVTable;
}

define_interface!(
    IString,
    "IString",
    StringVTable,
    IntfId::new(0x2d7e_3c1b, 0x6a0b, 0x5b8d, [0x8e, 0x1b, 0x3f, 0x6c, 0x81, 0x4a, 0x92, 0x07])
);
define_interface!(
    IList,
    "IList",
    ListVTable,
    IntfId::new(0x6f4d_1a58, 0x0d2c, 0x5e61, [0xb5, 0x0c, 0x59, 0x27, 0xe4, 0x1d, 0x33, 0x8a])
);
define_interface!(
    IIterator,
    "IIterator",
    IteratorVTable,
    IntfId::new(0xf3b0_6c2e, 0x4b39, 0x5c1f, [0xa7, 0x6d, 0x0e, 0x91, 0x2b, 0xc8, 0x55, 0x14])
);
define_interface!(
    IErrorInfo,
    "IErrorInfo",
    ErrorInfoVTable,
    IntfId::new(0x5a1e_94d0, 0x7c33, 0x5f02, [0x81, 0x9a, 0x6b, 0x0d, 0x2f, 0xe3, 0x70, 0x4c])
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intf_id_display_and_parse() {
        let id = IntfId::new(0x12345678, 0x9abc, 0xdef0, [1, 2, 3, 4, 5, 6, 7, 8]);
        let text = id.to_string();
        assert_eq!(text, "12345678-9abc-def0-0102-030405060708");
        assert_eq!(IntfId::parse_str(&text).unwrap(), id);
        assert_eq!(text.parse::<IntfId>().unwrap(), id);
    }

    #[test]
    fn test_intf_id_parse_failure() {
        let err = IntfId::parse_str("not-a-guid").unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::INVALID_PARAMETER);
    }

    #[test]
    fn test_uuid_round_trip_keeps_fields() {
        let id = IList::ID;
        let uuid: Uuid = id.into();
        assert_eq!(IntfId::from(uuid), id);
    }

    #[test]
    fn test_interface_ids_are_distinct() {
        let ids = [
            IBaseObject::ID,
            IString::ID,
            IList::ID,
            IIterator::ID,
            IErrorInfo::ID,
        ];
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_intf_id_layout() {
        assert_eq!(std::mem::size_of::<IntfId>(), 16);
    }
}
