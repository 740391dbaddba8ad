//! Record locator type.

use std::fmt;

/// Locates a record in the indexed relation.
///
/// The index never dereferences a `RecordId`; it only stores and returns it.
/// On disk it takes 8 bytes: page number (u32), slot number (u16), and two
/// bytes of zero padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RecordId {
    /// Page of the relation's file holding the record.
    pub page_number: u32,
    /// Slot of the record within that page.
    pub slot_number: u16,
}

impl RecordId {
    /// Bytes a record id occupies in a leaf slot.
    pub const SIZE: usize = 8;

    /// Create a new RecordId.
    #[inline]
    pub fn new(page_number: u32, slot_number: u16) -> Self {
        Self {
            page_number,
            slot_number,
        }
    }

    /// Write the on-disk form into `buf[..RecordId::SIZE]`.
    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.page_number.to_le_bytes());
        buf[4..6].copy_from_slice(&self.slot_number.to_le_bytes());
        buf[6..8].fill(0);
    }

    /// Read the on-disk form from `buf[..RecordId::SIZE]`.
    pub fn read_from(buf: &[u8]) -> Self {
        Self {
            page_number: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            slot_number: u16::from_le_bytes([buf[4], buf[5]]),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rid({}:{})", self.page_number, self.slot_number)
    }
}
