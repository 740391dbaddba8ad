//! Eviction policy implementations (replacers).
//!
//! - [`FifoReplacer`] - evicts the oldest unpinned frame

mod fifo;

pub use fifo::FifoReplacer;
