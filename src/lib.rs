//! pagetree - an ordered secondary B+Tree index over a buffered page file.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            pagetree                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Index Layer (index/btree)                   │   │
//! │  │   insert ──▶ descent + split propagation + root growth   │   │
//! │  │   ScanCursor ──▶ one descent, then the leaf chain        │   │
//! │  │   node codec ◀──▶ pages      metadata ◀──▶ page 0        │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │          ↑ bulk load                      ↓                     │
//! │  ┌──────────────────────┐  ┌─────────────────────────────────┐ │
//! │  │ relation/            │  │ Buffer Pool (buffer/)           │ │
//! │  │ RecordSource scans   │  │ frames, pins, FIFO eviction,    │ │
//! │  └──────────────────────┘  │ RAII page guards                │ │
//! │                            └─────────────────────────────────┘ │
//! │                                           ↓                     │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Storage Layer (storage/)                       │   │
//! │  │     DiskManager (one file per index) + Page + PageHeader │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, RecordId, Error, config)
//! - [`buffer`] - Buffer pool management and eviction
//! - [`storage`] - Disk I/O and page formats
//! - [`index`] - The B+Tree index
//! - [`relation`] - Record sources used to build an index
//!
//! # Quick Start
//! ```no_run
//! use pagetree::relation::InMemoryRelations;
//! use pagetree::{BTreeIndex, IndexConfig, IndexKey, KeyType, Operator};
//!
//! let mut relations = InMemoryRelations::new();
//! for price in [30i32, 10, 20] {
//!     let mut record = vec![0u8; 8];
//!     record[4..8].copy_from_slice(&price.to_le_bytes());
//!     relations.append("orders", record);
//! }
//!
//! // Builds "indexes/orders.4" from the relation, or opens it if present.
//! let index = BTreeIndex::create_or_open(
//!     "indexes", "orders", 4, KeyType::Integer, &relations, IndexConfig::default(),
//! )?;
//!
//! for rid in index.range(IndexKey::Int(15), Operator::Gte, IndexKey::Int(30), Operator::Lte)? {
//!     println!("{}", rid?);
//! }
//! # Ok::<(), pagetree::Error>(())
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod relation;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::PAGE_SIZE;
pub use common::{Error, IndexConfig, PageId, RecordId, Result};

pub use buffer::{BufferPoolManager, BufferPoolStats, StatsSnapshot};
pub use index::btree::{BTreeIndex, IndexKey, KeyType, Operator, ScanCursor, ScanStatus};
pub use relation::{InMemoryRelations, RecordSource};
pub use storage::page::{Page, PageHeader, PageType};
pub use storage::DiskManager;
