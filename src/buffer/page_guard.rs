//! RAII guards for page access.
//!
//! These guards are the pin discipline of the index:
//! - [`PageReadGuard`] - Shared read access (multiple allowed)
//! - [`PageWriteGuard`] - Exclusive access; dirty only once mutably borrowed
//!
//! Both guards unpin the page exactly once, when dropped. Early returns and
//! `?` propagation therefore never leak a pin.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageId;
use crate::storage::page::Page;

use super::buffer_pool_manager::BufferPoolManager;
use super::frame::FrameId;

/// Guard for read-only page access.
///
/// # Example
/// ```ignore
/// let guard = bpm.fetch_page_read(page_id)?;
/// let kind = guard.page_type();  // Deref to &Page
/// // guard drops here, page unpinned
/// ```
pub struct PageReadGuard<'a> {
    bpm: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
    lock: RwLockReadGuard<'a, Page>,
}

impl<'a> PageReadGuard<'a> {
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        frame_id: FrameId,
        page_id: PageId,
        lock: RwLockReadGuard<'a, Page>,
    ) -> Self {
        Self {
            bpm,
            frame_id,
            page_id,
            lock,
        }
    }

    /// Get the page ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        self.bpm.unpin_page_internal(self.frame_id, false);
    }
}

/// Guard for exclusive write access to a page.
///
/// The page is reported dirty on drop only if it was borrowed mutably, so a
/// descent that merely reads through a write-latched node leaves it clean.
///
/// # Example
/// ```ignore
/// let mut guard = bpm.fetch_page_write(page_id)?;
/// guard.write_u16(OFFSET, 3);  // DerefMut to &mut Page, marks dirty
/// // guard drops here, page marked dirty and unpinned
/// ```
pub struct PageWriteGuard<'a> {
    bpm: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
    lock: RwLockWriteGuard<'a, Page>,
    touched: bool,
}

impl<'a> PageWriteGuard<'a> {
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        frame_id: FrameId,
        page_id: PageId,
        lock: RwLockWriteGuard<'a, Page>,
    ) -> Self {
        Self {
            bpm,
            frame_id,
            page_id,
            lock,
            touched: false,
        }
    }

    /// Get the page ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Whether the page has been borrowed mutably through this guard.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.touched
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        self.touched = true;
        &mut self.lock
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        self.bpm.unpin_page_internal(self.frame_id, self.touched);
    }
}
