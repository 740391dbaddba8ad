//! Page - the fundamental 4KB unit of storage.
//!
//! A [`Page`] is a raw 4KB byte array. Node and metadata codecs read and
//! write it through the little-endian field accessors below, then seal it
//! with [`Page::update_checksum`].

use crate::common::config::PAGE_SIZE;

use super::page_header::{PageHeader, PageType};

/// A page of data (4KB, 4KB-aligned).
///
/// `Page` does not implement `Clone` outside tests; copying 4KB should be
/// explicit.
///
/// # Example
/// ```
/// use pagetree::storage::page::Page;
///
/// let mut page = Page::new();
/// page.write_u32(100, 0xDEADBEEF);
/// assert_eq!(page.read_u32(100), 0xDEADBEEF);
/// ```
#[repr(align(4096))]
pub struct Page {
    data: [u8; PAGE_SIZE],
}

impl Page {
    /// Create a new zeroed page.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0u8; PAGE_SIZE],
        }
    }

    /// Get immutable slice of page data.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Get mutable slice of page data.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Zero out the entire page.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// Read the page header.
    pub fn header(&self) -> PageHeader {
        PageHeader::from_bytes(&self.data)
    }

    /// Page type from the header.
    #[inline]
    pub fn page_type(&self) -> PageType {
        PageType::from_u8(self.data[PageHeader::OFFSET_PAGE_TYPE])
    }

    /// Write a page header.
    pub fn set_header(&mut self, header: &PageHeader) {
        header.write_to(&mut self.data);
    }

    /// Compute and store checksum in the header.
    ///
    /// Call this after all modifications to the page are complete.
    pub fn update_checksum(&mut self) {
        let checksum = PageHeader::compute_checksum(&self.data);
        self.data[PageHeader::OFFSET_CHECKSUM..PageHeader::OFFSET_CHECKSUM + 4]
            .copy_from_slice(&checksum.to_le_bytes());
    }

    /// Verify the page checksum is valid.
    pub fn verify_checksum(&self) -> bool {
        self.header().verify_checksum(&self.data)
    }

    #[inline]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    #[inline]
    pub fn write_u8(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }

    #[inline]
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }

    #[inline]
    pub fn write_u16(&mut self, offset: usize, value: u16) {
        self.data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.data[offset..offset + 4]);
        u32::from_le_bytes(bytes)
    }

    #[inline]
    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn read_u64(&self, offset: usize) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.data[offset..offset + 8]);
        u64::from_le_bytes(bytes)
    }

    #[inline]
    pub fn write_u64(&mut self, offset: usize, value: u64) {
        self.data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

// Clone only available in tests - forces explicit copying in production
#[cfg(test)]
impl Clone for Page {
    fn clone(&self) -> Self {
        let mut new_page = Page::new();
        new_page.data.copy_from_slice(&self.data);
        new_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_and_alignment() {
        assert_eq!(std::mem::size_of::<Page>(), PAGE_SIZE);
        assert_eq!(std::mem::align_of::<Page>(), 4096);
    }

    #[test]
    fn test_field_accessors() {
        let mut page = Page::new();
        page.write_u8(13, 7);
        page.write_u16(14, 0xBEEF);
        page.write_u32(16, 0xCAFEBABE);
        page.write_u64(24, u64::MAX - 1);

        assert_eq!(page.read_u8(13), 7);
        assert_eq!(page.read_u16(14), 0xBEEF);
        assert_eq!(page.read_u32(16), 0xCAFEBABE);
        assert_eq!(page.read_u64(24), u64::MAX - 1);
        assert_eq!(page.as_slice()[16], 0xBE);
    }

    #[test]
    fn test_header_and_checksum() {
        let mut page = Page::new();
        page.set_header(&PageHeader::new(PageType::BTreeLeaf));
        page.write_u32(100, 42);
        page.update_checksum();

        assert_eq!(page.page_type(), PageType::BTreeLeaf);
        assert!(page.verify_checksum());

        let mut tampered = page.clone();
        tampered.write_u32(100, 43);
        assert!(!tampered.verify_checksum());
    }

    #[test]
    fn test_page_reset() {
        let mut page = Page::new();
        page.as_mut_slice()[0] = 0xFF;
        page.reset();
        assert_eq!(page.page_type(), PageType::Invalid);
    }
}
