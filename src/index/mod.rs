//! Index structures.
//!
//! - [`btree`] - Ordered B+Tree secondary index

pub mod btree;
