//! Buffer pool management.
//!
//! The buffer pool is the page store the B+Tree runs on. It manages a fixed
//! pool of frames, each holding one page of the index file.
//!
//! # Components
//! - [`BufferPoolManager`] - The page cache and pin bookkeeping
//! - [`Frame`] - A slot in the buffer pool holding a page + metadata
//! - [`PageReadGuard`] / [`PageWriteGuard`] - RAII guards that unpin on drop
//! - [`BufferPoolStats`] - Hit/miss/eviction counters
//! - [`replacer`] - Eviction policy

mod buffer_pool_manager;
mod frame;
mod page_guard;
pub mod replacer;
mod stats;

pub use buffer_pool_manager::BufferPoolManager;
pub use frame::{Frame, FrameId};
pub use page_guard::{PageReadGuard, PageWriteGuard};
pub use stats::{BufferPoolStats, StatsSnapshot};
