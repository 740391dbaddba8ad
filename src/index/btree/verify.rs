//! Structural checks over a whole tree, for tests and tooling.

use crate::common::{Error, PageId, RecordId, Result};

use super::key::IndexKey;
use super::node::{InternalNode, Node};
use super::BTreeIndex;

/// Shape of a tree that passed [`BTreeIndex::check_invariants`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeSummary {
    pub height: u32,
    pub leaves: u64,
    pub internal_nodes: u64,
    pub entries: u64,
    pub nodes: u64,
}

impl BTreeIndex {
    /// Every entry in key order, read by walking the leaf chain.
    pub fn leaf_entries(&self) -> Result<Vec<(IndexKey, RecordId)>> {
        let mut entries = Vec::new();
        let mut page_id = match self.leftmost_leaf()? {
            Some(page_id) => page_id,
            None => return Ok(entries),
        };

        while page_id.is_valid() {
            let (_guard, leaf) = self.read_leaf(page_id)?;
            entries.extend(leaf.keys.iter().copied().zip(leaf.rids.iter().copied()));
            page_id = leaf.right_sibling;
        }
        Ok(entries)
    }

    /// Walk the whole tree and check its structure.
    ///
    /// Verifies that all leaves are at the recorded height, that no node is
    /// full or (below the root) empty, that keys are sorted and lie within
    /// their parent's separators, and that the leaf chain links exactly the
    /// leaves of the tree in order.
    ///
    /// # Errors
    /// `Error::Corrupted` naming the first offending page.
    pub fn check_invariants(&self) -> Result<TreeSummary> {
        let mut summary = TreeSummary {
            height: self.meta.height,
            ..TreeSummary::default()
        };
        if self.meta.is_empty() {
            if self.meta.height != 0 {
                return Err(Error::corrupted(0, "empty tree with non-zero height"));
            }
            return Ok(summary);
        }

        let mut leaves = Vec::new();
        self.check_subtree(
            self.meta.root_page_id,
            self.meta.height,
            None,
            None,
            &mut leaves,
            &mut summary,
        )?;

        for (i, &page_id) in leaves.iter().enumerate() {
            let (_guard, leaf) = self.read_leaf(page_id)?;
            let expected = leaves.get(i + 1).copied().unwrap_or(PageId::INVALID);
            if leaf.right_sibling != expected {
                return Err(Error::corrupted(
                    page_id.0,
                    format!("right sibling {} but next leaf is {}", leaf.right_sibling, expected),
                ));
            }
        }

        summary.nodes = summary.leaves + summary.internal_nodes;
        Ok(summary)
    }

    fn check_subtree(
        &self,
        page_id: PageId,
        level: u32,
        lower: Option<IndexKey>,
        upper: Option<IndexKey>,
        leaves: &mut Vec<PageId>,
        summary: &mut TreeSummary,
    ) -> Result<()> {
        let node = {
            let guard = self.bpm.fetch_page_read(page_id)?;
            Node::decode(&self.layout, page_id, &guard)?
        };
        let is_root = page_id == self.meta.root_page_id;

        let (keys, capacity) = match &node {
            Node::Leaf(leaf) => (&leaf.keys, self.layout.leaf_capacity),
            Node::Internal(internal) => (&internal.keys, self.layout.internal_capacity),
        };
        let violation = |reason: String| Err(Error::corrupted(page_id.0, reason));

        if keys.len() >= capacity {
            return violation(format!("{} keys in a node of capacity {}", keys.len(), capacity));
        }
        if keys.is_empty() && !is_root {
            return violation("empty non-root node".to_string());
        }
        if keys.windows(2).any(|w| w[0] > w[1]) {
            return violation("keys out of order".to_string());
        }
        if let (Some(low), Some(first)) = (lower, keys.first()) {
            if *first < low {
                return violation(format!("key {} below separator {}", first, low));
            }
        }
        if let (Some(high), Some(last)) = (upper, keys.last()) {
            if *last > high {
                return violation(format!("key {} above separator {}", last, high));
            }
        }

        match &node {
            Node::Leaf(_) => {
                if level != 1 {
                    return violation(format!("leaf found at level {}", level));
                }
                summary.leaves += 1;
                summary.entries += keys.len() as u64;
                leaves.push(page_id);
            }
            Node::Internal(internal) => {
                if level < 2 || u32::from(internal.level) != level - 1 {
                    return violation(format!(
                        "internal node with level {} at tree level {}",
                        internal.level, level
                    ));
                }
                summary.internal_nodes += 1;
                for (i, &child) in internal.children.iter().enumerate() {
                    let child_lower = if i == 0 { lower } else { Some(internal.keys[i - 1]) };
                    let child_upper = internal.keys.get(i).copied().or(upper);
                    self.check_subtree(child, level - 1, child_lower, child_upper, leaves, summary)?;
                }
            }
        }
        Ok(())
    }

    fn leftmost_leaf(&self) -> Result<Option<PageId>> {
        if self.meta.is_empty() {
            return Ok(None);
        }
        let mut page_id = self.meta.root_page_id;
        for _ in 1..self.meta.height {
            let guard = self.bpm.fetch_page_read(page_id)?;
            page_id = InternalNode::decode(&self.layout, page_id, &guard)?.children[0];
        }
        Ok(Some(page_id))
    }
}
