//! B+Tree secondary index over a single attribute of a relation.
//!
//! # Structure
//! ```text
//! page 0            metadata: attribute, root id, height, capacities
//! internal nodes    separators + child ids, level above the leaves
//! leaf nodes        sorted (key, record id) entries, linked left to right
//! ```
//!
//! - [`BTreeIndex::insert`] descends from the root, inserts into a leaf and
//!   splits full nodes on the way back up, growing a new root when the old
//!   one splits.
//! - [`ScanCursor`] descends once to the first qualifying entry and then
//!   follows the leaf chain.
//!
//! Every page access goes through a buffer pool guard, so a page is unpinned
//! on every exit path.

mod insert;
mod key;
mod metadata;
mod node;
mod scan;
mod split;
mod verify;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::buffer::{BufferPoolManager, StatsSnapshot};
use crate::common::{Error, IndexConfig, PageId, Result};
use crate::relation::RecordSource;
use crate::storage::DiskManager;

pub use key::{IndexKey, KeyType, STRING_KEY_SIZE};
pub use metadata::{IndexMetadata, FORMAT_VERSION, INDEX_MAGIC, META_PAGE_ID};
pub use node::{NodeLayout, NODE_HEADER_SIZE};
pub use scan::{Operator, ScanCursor, ScanStatus};
pub use verify::TreeSummary;

/// File name of the index on `relation` at `attr_byte_offset`.
pub fn index_name(relation: &str, attr_byte_offset: u32) -> String {
    format!("{}.{}", relation, attr_byte_offset)
}

/// An ordered index from attribute values to record ids, stored in one file.
///
/// Single writer: [`insert`](Self::insert) takes `&mut self`, and a
/// [`ScanCursor`] borrows the index, so scans and inserts never overlap.
///
/// Dropping the index flushes it; call [`flush`](Self::flush) to observe
/// errors.
pub struct BTreeIndex {
    name: String,
    path: PathBuf,
    bpm: BufferPoolManager,
    layout: NodeLayout,
    meta: IndexMetadata,
    /// Nodes allocated so far. Diagnostic only.
    node_count: AtomicU64,
}

impl BTreeIndex {
    /// Open the index on `relation.attr_byte_offset` in `dir`, building it
    /// from `source` if the file does not exist yet.
    ///
    /// An existing file must describe the same relation, offset and type.
    /// A new index is bulk-loaded by scanning every record of `relation`
    /// and inserting the attribute found at `attr_byte_offset`; if that
    /// fails, the partial file is removed.
    ///
    /// # Errors
    /// - `Error::InvalidConfig` for an unusable `config` or relation name,
    ///   including a pool smaller than [`NodeLayout::min_pool_size`]
    /// - `Error::AttributeMismatch` if an existing file describes another
    ///   attribute
    /// - `Error::InvalidMagic`, `Error::UnsupportedVersion`,
    ///   `Error::Corrupted` for a damaged or foreign file
    /// - `Error::RelationNotFound`, `Error::RecordTooShort` from the bulk load
    /// - I/O and page store errors
    pub fn create_or_open<S>(
        dir: impl AsRef<Path>,
        relation: &str,
        attr_byte_offset: u32,
        attr_type: KeyType,
        source: &S,
        config: IndexConfig,
    ) -> Result<Self>
    where
        S: RecordSource + ?Sized,
    {
        config.validate()?;
        metadata::validate_relation_name(relation)?;
        let name = index_name(relation, attr_byte_offset);
        let path = dir.as_ref().join(&name);

        if path.exists() {
            let index = Self::open(path, name, &config)?;
            index
                .meta
                .validate_against(&index.name, relation, attr_byte_offset, attr_type)?;
            return Ok(index);
        }

        let layout = NodeLayout::from_config(attr_type, &config);
        check_pool_size(&layout, &config)?;
        let meta = IndexMetadata::new(
            relation,
            attr_byte_offset,
            attr_type,
            layout.leaf_capacity as u16,
            layout.internal_capacity as u16,
        )?;

        let built = Self::create(path.clone(), name, layout, meta, &config).and_then(|mut index| {
            index.bulk_load(source)?;
            index.flush()?;
            Ok(index)
        });
        if built.is_err() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        target: "pagetree::btree",
                        path = %path.display(),
                        error = %e,
                        "failed to remove partially built index"
                    );
                }
            }
        }
        built
    }

    fn open(path: PathBuf, name: String, config: &IndexConfig) -> Result<Self> {
        let bpm = BufferPoolManager::new(config.pool_size, DiskManager::open(&path)?);
        let meta = {
            let guard = bpm.fetch_page_read(META_PAGE_ID)?;
            IndexMetadata::decode(&guard)?
        };
        let layout =
            NodeLayout::from_stored(meta.attr_type, meta.leaf_capacity, meta.internal_capacity)?;
        check_pool_size(&layout, config)?;

        tracing::info!(
            target: "pagetree::btree",
            index = %name,
            height = meta.height,
            root = meta.root_page_id.0,
            nodes = meta.node_count,
            "opened index"
        );

        Ok(Self {
            name,
            path,
            bpm,
            layout,
            node_count: AtomicU64::new(meta.node_count),
            meta,
        })
    }

    fn create(
        path: PathBuf,
        name: String,
        layout: NodeLayout,
        meta: IndexMetadata,
        config: &IndexConfig,
    ) -> Result<Self> {
        let bpm = BufferPoolManager::new(config.pool_size, DiskManager::create(&path)?);
        {
            let mut guard = bpm.new_page()?;
            if guard.page_id() != META_PAGE_ID {
                return Err(Error::corrupted(
                    guard.page_id().0,
                    "metadata page must be the first page of the file",
                ));
            }
            meta.encode_into(&mut guard);
        }

        tracing::info!(
            target: "pagetree::btree",
            index = %name,
            key_type = ?layout.key_type,
            leaf_capacity = layout.leaf_capacity,
            internal_capacity = layout.internal_capacity,
            "created index"
        );

        Ok(Self {
            name,
            path,
            bpm,
            layout,
            meta,
            node_count: AtomicU64::new(0),
        })
    }

    /// Insert every record of the indexed relation.
    fn bulk_load<S>(&mut self, source: &S) -> Result<u64>
    where
        S: RecordSource + ?Sized,
    {
        let key_type = self.layout.key_type;
        let offset = self.meta.attr_byte_offset as usize;
        let relation = self.meta.relation_name.clone();

        let mut loaded = 0u64;
        for record in source.scan_relation(&relation)? {
            let (rid, bytes) = record?;
            let key = IndexKey::extract(key_type, &bytes, offset, rid)?;
            self.insert(key, rid)?;
            loaded += 1;
        }

        tracing::info!(
            target: "pagetree::btree",
            index = %self.name,
            records = loaded,
            height = self.meta.height,
            "bulk load complete"
        );
        Ok(loaded)
    }

    /// Write the metadata page and every dirty page, then sync the file.
    pub fn flush(&self) -> Result<()> {
        self.write_metadata()?;
        self.bpm.flush_all_pages()?;
        tracing::debug!(target: "pagetree::btree", index = %self.name, "flushed");
        Ok(())
    }

    /// Rewrite page 0 from the in-memory metadata.
    fn write_metadata(&self) -> Result<()> {
        let mut meta = self.meta.clone();
        meta.node_count = self.node_count.load(Ordering::Relaxed);
        let mut guard = self.bpm.fetch_page_write(META_PAGE_ID)?;
        meta.encode_into(&mut guard);
        Ok(())
    }

    /// Index name, `relation.offset`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the index file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn relation_name(&self) -> &str {
        &self.meta.relation_name
    }

    pub fn attr_byte_offset(&self) -> u32 {
        self.meta.attr_byte_offset
    }

    pub fn key_type(&self) -> KeyType {
        self.layout.key_type
    }

    /// Levels in the tree: 0 when empty, 1 for a single leaf.
    pub fn height(&self) -> u32 {
        self.meta.height
    }

    /// Root page, or `PageId::INVALID` for an empty tree.
    pub fn root_page_id(&self) -> PageId {
        self.meta.root_page_id
    }

    /// Nodes allocated over the life of the index.
    pub fn node_count(&self) -> u64 {
        self.node_count.load(Ordering::Relaxed)
    }

    /// Key width and node capacities.
    pub fn layout(&self) -> &NodeLayout {
        &self.layout
    }

    pub fn buffer_stats(&self) -> StatsSnapshot {
        self.bpm.stats().snapshot()
    }

    /// The buffer pool backing this index.
    pub fn buffer_pool(&self) -> &BufferPoolManager {
        &self.bpm
    }
}

/// An insert must never run out of frames, however tall the tree grows.
fn check_pool_size(layout: &NodeLayout, config: &IndexConfig) -> Result<()> {
    let needed = layout.min_pool_size();
    if config.pool_size < needed {
        return Err(Error::InvalidConfig(format!(
            "pool size {} is too small for internal capacity {} (needs {} frames)",
            config.pool_size, layout.internal_capacity, needed
        )));
    }
    Ok(())
}

impl Drop for BTreeIndex {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(
                target: "pagetree::btree",
                index = %self.name,
                error = %e,
                "flush on drop failed"
            );
        }
    }
}
