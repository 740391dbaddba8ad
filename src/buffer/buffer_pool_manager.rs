//! Buffer Pool Manager - the page store underneath an index.
//!
//! The [`BufferPoolManager`] provides:
//! - Page caching between disk and memory
//! - Pin-based reference counting through RAII guards
//! - Dirty page write-back on eviction and flush
//! - FIFO eviction of unpinned frames

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use parking_lot::{Mutex, RwLock};

use crate::buffer::frame::{Frame, FrameId};
use crate::buffer::replacer::FifoReplacer;
use crate::buffer::{BufferPoolStats, PageReadGuard, PageWriteGuard};
use crate::common::{Error, PageId, Result};
use crate::storage::DiskManager;

/// Manages a pool of buffer frames for caching the pages of one index file.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────────────┐
/// │                    BufferPoolManager                        │
/// │  ┌──────────────┐  ┌───────────────────────────────────┐   │
/// │  │ page_table   │  │        frames: Vec<Frame>         │   │
/// │  │PageId → Fid  │─▶│  [Frame0] [Frame1] [Frame2] ...   │   │
/// │  └──────────────┘  └───────────────────────────────────┘   │
/// │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
/// │  │  free_list   │  │   replacer   │  │disk_manager  │      │
/// │  │ Vec<FrameId> │  │ FifoReplacer │  │   Mutex      │      │
/// │  └──────────────┘  └──────────────┘  └──────────────┘      │
/// └─────────────────────────────────────────────────────────────┘
/// ```
///
/// # Page Store Contract
/// - allocate: [`BufferPoolManager::new_page`] returns the new id inside a
///   pinned write guard.
/// - read: [`BufferPoolManager::fetch_page_read`] /
///   [`BufferPoolManager::fetch_page_write`] return pinned guards.
/// - unpin(dirty): dropping the guard.
///
/// A pinned frame is never chosen for eviction. Running out of unpinned
/// frames yields `Error::NoFreeFrames`.
pub struct BufferPoolManager {
    /// Fixed pool of frames allocated at startup.
    frames: Vec<Frame>,

    /// Maps page IDs to frame IDs.
    page_table: RwLock<HashMap<PageId, FrameId>>,

    /// Stack of free frame IDs (LIFO for cache locality).
    free_list: Mutex<Vec<FrameId>>,

    /// Eviction policy for selecting victim frames.
    replacer: Mutex<FifoReplacer>,

    /// Handles all disk I/O.
    disk_manager: Mutex<DiskManager>,

    /// Performance statistics.
    stats: BufferPoolStats,
}

impl BufferPoolManager {
    /// Create a new buffer pool manager.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn new(pool_size: usize, disk_manager: DiskManager) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        let frames: Vec<Frame> = (0..pool_size).map(|_| Frame::new()).collect();
        let free_list: Vec<FrameId> = (0..pool_size).rev().map(FrameId::new).collect();

        Self {
            frames,
            page_table: RwLock::new(HashMap::new()),
            free_list: Mutex::new(free_list),
            replacer: Mutex::new(FifoReplacer::new()),
            disk_manager: Mutex::new(disk_manager),
            stats: BufferPoolStats::new(),
        }
    }

    // ========================================================================
    // Public API: Fetch pages
    // ========================================================================

    /// Fetch a page for reading (shared access).
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the page doesn't exist on disk
    /// - `Error::NoFreeFrames` if all frames are pinned
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let frame_id = self.fetch_page_internal(page_id)?;
        let lock = self.frames[frame_id.0].page();

        Ok(PageReadGuard::new(self, frame_id, page_id, lock))
    }

    /// Fetch a page for writing (exclusive access).
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the page doesn't exist on disk
    /// - `Error::NoFreeFrames` if all frames are pinned
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.fetch_page_internal(page_id)?;
        let lock = self.frames[frame_id.0].page_mut();

        Ok(PageWriteGuard::new(self, frame_id, page_id, lock))
    }

    /// Allocate a new zeroed page on disk and pin it in the pool.
    ///
    /// # Errors
    /// - `Error::NoFreeFrames` if all frames are pinned
    /// - I/O errors from disk allocation
    pub fn new_page(&self) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.get_free_frame()?;

        let allocated = self.disk_manager.lock().allocate_page();
        let page_id = match allocated {
            Ok(page_id) => page_id,
            Err(e) => {
                self.free_list.lock().push(frame_id);
                return Err(e);
            }
        };

        let frame = &self.frames[frame_id.0];
        frame.page_mut().reset();
        self.install(frame_id, page_id);

        let lock = frame.page_mut();
        Ok(PageWriteGuard::new(self, frame_id, page_id, lock))
    }

    // ========================================================================
    // Public API: Flush pages
    // ========================================================================

    /// Flush all dirty pages to disk and sync the file.
    pub fn flush_all_pages(&self) -> Result<()> {
        let pages: Vec<(PageId, FrameId)> = {
            let pt = self.page_table.read();
            pt.iter().map(|(&pid, &fid)| (pid, fid)).collect()
        };

        for (page_id, frame_id) in pages {
            self.flush_frame(frame_id, page_id)?;
        }

        self.disk_manager.lock().sync()
    }

    // ========================================================================
    // Public API: Stats and info
    // ========================================================================

    /// Get buffer pool statistics.
    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    /// Get the pool size.
    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    /// Get the number of free frames.
    pub fn free_frame_count(&self) -> usize {
        self.free_list.lock().len()
    }

    /// Number of frames currently pinned by a live guard.
    ///
    /// Zero whenever no index operation or scan is in progress.
    pub fn pinned_frame_count(&self) -> usize {
        self.frames.iter().filter(|f| f.is_pinned()).count()
    }

    /// Pin count of a resident page, or `None` if it is not in the pool.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let pt = self.page_table.read();
        pt.get(&page_id).map(|fid| self.frames[fid.0].pin_count())
    }

    /// Number of pages in the underlying file.
    pub fn disk_page_count(&self) -> u32 {
        self.disk_manager.lock().page_count()
    }

    // ========================================================================
    // Internal: Called by PageGuard on drop
    // ========================================================================

    pub(crate) fn unpin_page_internal(&self, frame_id: FrameId, is_dirty: bool) {
        let frame = &self.frames[frame_id.0];

        if is_dirty {
            frame.mark_dirty();
        }

        if frame.unpin() == 0 {
            // A pinned frame may have been skipped out of the queue by evict().
            let mut replacer = self.replacer.lock();
            replacer.record_access(frame_id);
            replacer.set_evictable(frame_id, true);
        }
    }

    // ========================================================================
    // Internal: Core fetch logic
    // ========================================================================

    fn fetch_page_internal(&self, page_id: PageId) -> Result<FrameId> {
        if let Some(&frame_id) = self.page_table.read().get(&page_id) {
            self.frames[frame_id.0].pin();
            {
                let mut replacer = self.replacer.lock();
                replacer.record_access(frame_id);
                replacer.set_evictable(frame_id, false);
            }
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(frame_id);
        }

        self.handle_cache_miss(page_id)
    }

    fn handle_cache_miss(&self, page_id: PageId) -> Result<FrameId> {
        self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);

        let frame_id = self.get_free_frame()?;

        let loaded = self.disk_manager.lock().read_page(page_id);
        let page_data = match loaded {
            Ok(page) => page,
            Err(e) => {
                self.free_list.lock().push(frame_id);
                return Err(e);
            }
        };
        self.stats.pages_read.fetch_add(1, Ordering::Relaxed);

        let frame = &self.frames[frame_id.0];
        frame
            .page_mut()
            .as_mut_slice()
            .copy_from_slice(page_data.as_slice());
        self.install(frame_id, page_id);

        Ok(frame_id)
    }

    /// Bind a frame to a page, pinned once and not evictable.
    fn install(&self, frame_id: FrameId, page_id: PageId) {
        let frame = &self.frames[frame_id.0];
        frame.set_page_id(Some(page_id));
        frame.pin();

        self.page_table.write().insert(page_id, frame_id);

        let mut replacer = self.replacer.lock();
        replacer.record_access(frame_id);
        replacer.set_evictable(frame_id, false);
    }

    // ========================================================================
    // Internal: Frame allocation and eviction
    // ========================================================================

    fn get_free_frame(&self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_list.lock().pop() {
            return Ok(frame_id);
        }

        self.evict_page()
    }

    fn evict_page(&self) -> Result<FrameId> {
        let frame_id = self
            .replacer
            .lock()
            .evict()
            .ok_or(Error::NoFreeFrames)?;

        self.stats.evictions.fetch_add(1, Ordering::Relaxed);

        let frame = &self.frames[frame_id.0];
        let old_page_id = frame.page_id();

        if let Some(pid) = old_page_id {
            if let Err(e) = self.flush_frame(frame_id, pid) {
                // Leave the victim resident; it stays evictable for a retry.
                let mut replacer = self.replacer.lock();
                replacer.record_access(frame_id);
                replacer.set_evictable(frame_id, true);
                return Err(e);
            }
            self.page_table.write().remove(&pid);
            tracing::trace!(
                target: "pagetree::buffer",
                page = pid.0,
                frame = frame_id.0,
                "evicted page"
            );
        }

        frame.clear_dirty();
        frame.set_page_id(None);

        Ok(frame_id)
    }

    fn flush_frame(&self, frame_id: FrameId, page_id: PageId) -> Result<()> {
        let frame = &self.frames[frame_id.0];

        if frame.is_dirty() {
            let page = frame.page();
            self.disk_manager.lock().write_page(page_id, &page)?;
            drop(page);

            frame.clear_dirty();
            self.stats.pages_written.fetch_add(1, Ordering::Relaxed);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_bpm(pool_size: usize) -> (BufferPoolManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("rel.0")).unwrap();
        (BufferPoolManager::new(pool_size, dm), dir)
    }

    #[test]
    fn test_new_page_ids_are_sequential() {
        let (bpm, _dir) = create_test_bpm(4);

        let guard = bpm.new_page().unwrap();
        assert_eq!(guard.page_id(), PageId::new(0));
        drop(guard);

        let guard = bpm.new_page().unwrap();
        assert_eq!(guard.page_id(), PageId::new(1));
    }

    #[test]
    fn test_write_then_read() {
        let (bpm, _dir) = create_test_bpm(4);

        let pid = {
            let mut guard = bpm.new_page().unwrap();
            guard.write_u32(40, 7);
            guard.page_id()
        };

        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(guard.read_u32(40), 7);
    }

    #[test]
    fn test_pin_counts_follow_guards() {
        let (bpm, _dir) = create_test_bpm(4);
        let pid = bpm.new_page().unwrap().page_id();
        assert_eq!(bpm.pin_count(pid), Some(0));

        let g1 = bpm.fetch_page_read(pid).unwrap();
        let g2 = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(bpm.pin_count(pid), Some(2));
        assert_eq!(bpm.pinned_frame_count(), 1);

        drop(g1);
        drop(g2);
        assert_eq!(bpm.pin_count(pid), Some(0));
        assert_eq!(bpm.pinned_frame_count(), 0);
    }

    #[test]
    fn test_untouched_write_guard_stays_clean() {
        let (bpm, _dir) = create_test_bpm(4);
        let pid = {
            let mut guard = bpm.new_page().unwrap();
            guard.write_u8(20, 1);
            guard.page_id()
        };
        bpm.flush_all_pages().unwrap();
        let written = bpm.stats().snapshot().pages_written;

        {
            let guard = bpm.fetch_page_write(pid).unwrap();
            assert_eq!(guard.read_u8(20), 1);
            assert!(!guard.is_dirty());
        }
        bpm.flush_all_pages().unwrap();

        assert_eq!(bpm.stats().snapshot().pages_written, written);
    }

    #[test]
    fn test_dirty_page_flushed_on_eviction() {
        let (bpm, _dir) = create_test_bpm(1);

        {
            let mut guard = bpm.new_page().unwrap();
            guard.write_u8(100, 0x42);
        }
        {
            let _guard = bpm.new_page().unwrap();
        }

        let guard = bpm.fetch_page_read(PageId::new(0)).unwrap();
        assert_eq!(guard.read_u8(100), 0x42);
        assert!(bpm.stats().snapshot().evictions >= 2);
    }

    #[test]
    fn test_no_free_frames_when_all_pinned() {
        let (bpm, _dir) = create_test_bpm(2);

        let _guard1 = bpm.new_page().unwrap();
        let _guard2 = bpm.new_page().unwrap();

        assert!(matches!(bpm.new_page(), Err(Error::NoFreeFrames)));
    }

    #[test]
    fn test_missing_page_returns_frame() {
        let (bpm, _dir) = create_test_bpm(2);

        assert!(matches!(
            bpm.fetch_page_read(PageId::new(999)),
            Err(Error::PageNotFound(999))
        ));
        assert_eq!(bpm.free_frame_count(), 2);
    }
}
