//! FIFO (First-In-First-Out) replacement policy.

use std::collections::{HashSet, VecDeque};

use crate::buffer::FrameId;

/// Evicts unpinned frames in the order their pages were first loaded.
///
/// Re-accessing a resident page does not move it. Pinned frames are skipped
/// and dropped from the queue; they re-enter it on their next access.
#[derive(Debug, Default)]
pub struct FifoReplacer {
    /// Queue of frame IDs in load order (front = oldest).
    queue: VecDeque<FrameId>,
    /// Set for O(1) membership check.
    in_queue: HashSet<FrameId>,
    /// Frames that are currently evictable (pin_count == 0).
    evictable: HashSet<FrameId>,
}

impl FifoReplacer {
    /// Create a new FIFO replacer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a frame was accessed.
    pub fn record_access(&mut self, frame_id: FrameId) {
        if self.in_queue.insert(frame_id) {
            self.queue.push_back(frame_id);
        }
    }

    /// Mark a frame as evictable (pin_count dropped to 0) or not.
    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        if evictable {
            self.evictable.insert(frame_id);
        } else {
            self.evictable.remove(&frame_id);
        }
    }

    /// Select a victim frame for eviction.
    ///
    /// Returns the oldest evictable frame, or None if all frames are pinned.
    pub fn evict(&mut self) -> Option<FrameId> {
        while let Some(frame_id) = self.queue.pop_front() {
            self.in_queue.remove(&frame_id);

            if self.evictable.remove(&frame_id) {
                return Some(frame_id);
            }
        }
        None
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.evictable.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut replacer = FifoReplacer::new();

        for i in 0..3 {
            replacer.record_access(FrameId::new(i));
            replacer.set_evictable(FrameId::new(i), true);
        }
        assert_eq!(replacer.size(), 3);

        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_fifo_skips_pinned() {
        let mut replacer = FifoReplacer::new();

        for i in 0..3 {
            replacer.record_access(FrameId::new(i));
        }
        replacer.set_evictable(FrameId::new(1), true);

        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_fifo_reaccess_no_reorder() {
        let mut replacer = FifoReplacer::new();

        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(1));
        replacer.record_access(FrameId::new(0));
        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);

        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    }
}
