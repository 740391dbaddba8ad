//! Page identifier type.

use std::fmt;

/// Identifies a page within one index file.
///
/// Page 0 of every index file is its metadata page; node pages start at 1.
/// `PageId::INVALID` stands for "no page": an empty tree's root, and the
/// right sibling of the rightmost leaf.
///
/// # Example
/// ```
/// use pagetree::PageId;
///
/// let page_id = PageId::new(42);
/// assert!(page_id.is_valid());
/// assert_eq!(PageId::from_le_bytes(page_id.to_le_bytes()), page_id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    /// Invalid/sentinel page ID.
    pub const INVALID: PageId = PageId(u32::MAX);

    /// Bytes a page id occupies on disk.
    pub const SIZE: usize = 4;

    /// Create a new PageId.
    #[inline]
    pub fn new(id: u32) -> Self {
        PageId(id)
    }

    /// Check if this page ID is valid (not the sentinel value).
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Little-endian on-disk encoding.
    #[inline]
    pub fn to_le_bytes(self) -> [u8; Self::SIZE] {
        self.0.to_le_bytes()
    }

    /// Decode from little-endian bytes.
    #[inline]
    pub fn from_le_bytes(bytes: [u8; Self::SIZE]) -> Self {
        PageId(u32::from_le_bytes(bytes))
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "Page(INVALID)")
        } else {
            write!(f, "Page({})", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_id_invalid() {
        assert!(!PageId::INVALID.is_valid());
        assert!(PageId::new(0).is_valid());
        assert_eq!(PageId::INVALID.0, u32::MAX);
    }

    #[test]
    fn test_page_id_bytes() {
        let pid = PageId::new(0x0102_0304);
        assert_eq!(pid.to_le_bytes(), [0x04, 0x03, 0x02, 0x01]);
        assert_eq!(PageId::from_le_bytes([0xFF; 4]), PageId::INVALID);
    }

    #[test]
    fn test_page_id_display() {
        assert_eq!(format!("{}", PageId::new(42)), "Page(42)");
        assert_eq!(format!("{}", PageId::INVALID), "Page(INVALID)");
    }
}
