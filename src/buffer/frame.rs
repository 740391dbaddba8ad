//! Frame - a slot in the buffer pool.
//!
//! A [`Frame`] holds a [`Page`] plus metadata needed for buffer management:
//! - Which page is loaded (if any)
//! - Pin count for reference counting
//! - Dirty flag for write-back tracking

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageId;
use crate::storage::page::Page;

/// Identifies a frame in the buffer pool.
///
/// Frames live in a `Vec<Frame>`, so the id is the index: `frames[frame_id.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub usize);

impl FrameId {
    /// Create a new FrameId.
    #[inline]
    pub fn new(id: usize) -> Self {
        FrameId(id)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({})", self.0)
    }
}

/// A frame in the buffer pool.
///
/// All fields use interior mutability so the pool can be shared by `&self`:
/// - `page`: `RwLock` for read/write synchronization
/// - `page_id`: `Mutex` for safe updates
/// - `pin_count`: `AtomicU32` for lock-free reference counting
/// - `is_dirty`: `AtomicBool` for lock-free dirty tracking
pub struct Frame {
    page: RwLock<Page>,
    page_id: Mutex<Option<PageId>>,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
}

impl Frame {
    /// Create a new empty frame.
    pub fn new() -> Self {
        Self {
            page: RwLock::new(Page::new()),
            page_id: Mutex::new(None),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
        }
    }

    /// Acquire read lock on the page.
    #[inline]
    pub fn page(&self) -> RwLockReadGuard<'_, Page> {
        self.page.read()
    }

    /// Acquire write lock on the page.
    #[inline]
    pub fn page_mut(&self) -> RwLockWriteGuard<'_, Page> {
        self.page.write()
    }

    /// Get the page ID of the loaded page.
    #[inline]
    pub fn page_id(&self) -> Option<PageId> {
        *self.page_id.lock()
    }

    /// Set the page ID.
    #[inline]
    pub fn set_page_id(&self, page_id: Option<PageId>) {
        *self.page_id.lock() = page_id;
    }

    /// Increment the pin count. Returns the new pin count.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrement the pin count. Returns the new pin count.
    ///
    /// # Panics
    /// Panics if pin count is already 0: every unpin must match a pin.
    #[inline]
    pub fn unpin(&self) -> u32 {
        let old = self.pin_count.fetch_sub(1, Ordering::Relaxed);
        assert!(old > 0, "pin count underflow");
        old - 1
    }

    /// Get the current pin count.
    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Relaxed)
    }

    /// Check if the frame is currently pinned.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// Mark the frame as dirty (modified).
    #[inline]
    pub fn mark_dirty(&self) {
        self.is_dirty.store(true, Ordering::Relaxed);
    }

    /// Clear the dirty flag.
    #[inline]
    pub fn clear_dirty(&self) {
        self.is_dirty.store(false, Ordering::Relaxed);
    }

    /// Check if the frame is dirty.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Relaxed)
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_pin_unpin() {
        let frame = Frame::new();

        assert_eq!(frame.pin(), 1);
        assert_eq!(frame.pin(), 2);
        assert_eq!(frame.unpin(), 1);
        assert!(frame.is_pinned());
        assert_eq!(frame.unpin(), 0);
        assert!(!frame.is_pinned());
    }

    #[test]
    #[should_panic(expected = "pin count underflow")]
    fn test_frame_unpin_underflow() {
        let frame = Frame::new();
        frame.unpin();
    }

    #[test]
    fn test_frame_dirty_flag() {
        let frame = Frame::new();
        frame.mark_dirty();
        assert!(frame.is_dirty());
        frame.clear_dirty();
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_frame_id_display() {
        assert_eq!(format!("{}", FrameId::new(42)), "Frame(42)");
    }
}
