//! Insertion engine: recursive descent with split propagation.

use std::sync::atomic::Ordering;

use crate::common::{Error, PageId, RecordId, Result};

use super::key::IndexKey;
use super::node::{InternalNode, LeafNode};
use super::split::Split;
use super::BTreeIndex;

impl BTreeIndex {
    /// Insert `(key, rid)` into the index.
    ///
    /// Duplicate keys are accepted; entries with equal keys are returned by a
    /// scan in insertion order.
    ///
    /// # Errors
    /// - `Error::KeyTypeMismatch` if `key` is not of the indexed type
    /// - page store errors, propagated unmodified
    pub fn insert(&mut self, key: IndexKey, rid: RecordId) -> Result<()> {
        key.expect_type(self.layout.key_type)?;

        if self.meta.is_empty() {
            return self.insert_first(key, rid);
        }

        let root = self.meta.root_page_id;
        if let Some(split) = self.insert_into(root, self.meta.height, &key, rid)? {
            self.grow_root(split)?;
        }
        Ok(())
    }

    /// Start the tree: a single leaf holding one entry.
    fn insert_first(&mut self, key: IndexKey, rid: RecordId) -> Result<()> {
        let mut leaf = LeafNode::new();
        leaf.insert(key, rid);

        let root = {
            let mut guard = self.bpm.new_page()?;
            leaf.encode(&self.layout, &mut guard);
            guard.page_id()
        };
        self.node_count.fetch_add(1, Ordering::Relaxed);

        self.meta.root_page_id = root;
        self.meta.height = 1;
        self.write_metadata()?;

        tracing::debug!(
            target: "pagetree::btree::insert",
            index = %self.name,
            root = root.0,
            "created root leaf"
        );
        Ok(())
    }

    /// Insert below `page_id`, a node `level` levels above the leaves
    /// counting the leaves as 1.
    ///
    /// The node stays pinned until its child returns. A returned split must
    /// be recorded by the caller.
    fn insert_into(
        &self,
        page_id: PageId,
        level: u32,
        key: &IndexKey,
        rid: RecordId,
    ) -> Result<Option<Split>> {
        let mut guard = self.bpm.fetch_page_write(page_id)?;

        if level == 1 {
            let mut leaf = LeafNode::decode(&self.layout, page_id, &guard)?;
            leaf.insert(*key, rid);
            if leaf.len() < self.layout.leaf_capacity {
                leaf.encode(&self.layout, &mut guard);
                return Ok(None);
            }
            return self.split_leaf_page(&mut guard, leaf).map(Some);
        }

        let mut node = InternalNode::decode(&self.layout, page_id, &guard)?;
        if u32::from(node.level) != level - 1 {
            return Err(Error::corrupted(
                page_id.0,
                format!("level {} where {} was expected", node.level, level - 1),
            ));
        }

        let index = node.child_index(key);
        tracing::trace!(
            target: "pagetree::btree::insert",
            page = page_id.0,
            level,
            child = index,
            "descend"
        );

        let split = match self.insert_into(node.children[index], level - 1, key, rid)? {
            Some(split) => split,
            None => return Ok(None),
        };

        node.insert_child(index, split.separator, split.right);
        if node.len() < self.layout.internal_capacity {
            node.encode(&self.layout, &mut guard);
            return Ok(None);
        }
        self.split_internal_page(&mut guard, node).map(Some)
    }

    /// Put a new root above the old one and its split-off sibling.
    fn grow_root(&mut self, split: Split) -> Result<()> {
        let old_root = self.meta.root_page_id;
        let level = u8::try_from(self.meta.height).map_err(|_| {
            Error::InvalidConfig(format!("tree height {} exceeds the level limit", self.meta.height))
        })?;

        let node = InternalNode {
            level,
            keys: vec![split.separator],
            children: vec![old_root, split.right],
        };
        let new_root = {
            let mut guard = self.bpm.new_page()?;
            node.encode(&self.layout, &mut guard);
            guard.page_id()
        };
        self.node_count.fetch_add(1, Ordering::Relaxed);

        self.meta.root_page_id = new_root;
        self.meta.height += 1;
        self.write_metadata()?;

        tracing::debug!(
            target: "pagetree::btree::insert",
            index = %self.name,
            old_root = old_root.0,
            new_root = new_root.0,
            height = self.meta.height,
            "grew root"
        );
        Ok(())
    }
}
