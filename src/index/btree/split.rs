//! Midpoint splits for full nodes.
//!
//! A node splits when an insertion brings it to full occupancy. With
//! `m = capacity / 2`:
//! - a leaf keeps entries `[0, m)` and moves `[m, capacity)` to a new right
//!   sibling; the separator is the sibling's first key, which stays in the
//!   leaf.
//! - an internal node keeps separators `[0, m)` and children `[0, m]`, moves
//!   separators `(m, capacity)` and children `[m+1, capacity]` right, and
//!   pushes separator `m` up.

use std::sync::atomic::Ordering;

use crate::buffer::PageWriteGuard;
use crate::common::{PageId, Result};

use super::key::IndexKey;
use super::node::{InternalNode, LeafNode};
use super::BTreeIndex;

/// Result of splitting a child: the parent must add `separator` and `right`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Split {
    pub separator: IndexKey,
    pub right: PageId,
}

/// Move the upper half of `leaf` into a new sibling stored at `right_id`.
pub(crate) fn split_leaf(leaf: &mut LeafNode, right_id: PageId) -> LeafNode {
    let mid = leaf.len() / 2;
    let right = LeafNode {
        keys: leaf.keys.split_off(mid),
        rids: leaf.rids.split_off(mid),
        right_sibling: leaf.right_sibling,
    };
    leaf.right_sibling = right_id;
    right
}

/// Move the upper half of `node` into a new sibling, returning the separator
/// pushed up and the sibling.
pub(crate) fn split_internal(node: &mut InternalNode) -> (IndexKey, InternalNode) {
    let mid = node.len() / 2;
    let right_keys = node.keys.split_off(mid + 1);
    let right_children = node.children.split_off(mid + 1);
    // keys[mid] is the last key left behind; it moves up, not sideways.
    let separator = node.keys.remove(mid);
    let right = InternalNode {
        level: node.level,
        keys: right_keys,
        children: right_children,
    };
    (separator, right)
}

impl BTreeIndex {
    /// Split a full leaf held by `guard`, writing both halves.
    pub(crate) fn split_leaf_page(
        &self,
        guard: &mut PageWriteGuard<'_>,
        mut leaf: LeafNode,
    ) -> Result<Split> {
        let mut right_guard = self.bpm.new_page()?;
        let right_id = right_guard.page_id();

        let right = split_leaf(&mut leaf, right_id);
        let separator = right.keys[0];
        right.encode(&self.layout, &mut right_guard);
        leaf.encode(&self.layout, guard);
        self.node_count.fetch_add(1, Ordering::Relaxed);

        tracing::trace!(
            target: "pagetree::btree::insert",
            left = guard.page_id().0,
            right = right_id.0,
            separator = %separator,
            left_len = leaf.len(),
            right_len = right.len(),
            "split leaf"
        );

        Ok(Split {
            separator,
            right: right_id,
        })
    }

    /// Split a full internal node held by `guard`, writing both halves.
    pub(crate) fn split_internal_page(
        &self,
        guard: &mut PageWriteGuard<'_>,
        mut node: InternalNode,
    ) -> Result<Split> {
        let mut right_guard = self.bpm.new_page()?;
        let right_id = right_guard.page_id();

        let (separator, right) = split_internal(&mut node);
        right.encode(&self.layout, &mut right_guard);
        node.encode(&self.layout, guard);
        self.node_count.fetch_add(1, Ordering::Relaxed);

        tracing::trace!(
            target: "pagetree::btree::insert",
            left = guard.page_id().0,
            right = right_id.0,
            separator = %separator,
            level = node.level,
            "split internal node"
        );

        Ok(Split {
            separator,
            right: right_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::RecordId;

    fn ints(keys: &[IndexKey]) -> Vec<i32> {
        keys.iter()
            .map(|k| match k {
                IndexKey::Int(v) => *v,
                other => panic!("unexpected key {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_split_leaf_halves_and_links() {
        let mut leaf = LeafNode::new();
        for v in [10, 20, 30, 40] {
            leaf.insert(IndexKey::Int(v), RecordId::new(0, v as u16));
        }
        leaf.right_sibling = PageId::new(77);

        let right = split_leaf(&mut leaf, PageId::new(5));

        assert_eq!(ints(&leaf.keys), vec![10, 20]);
        assert_eq!(ints(&right.keys), vec![30, 40]);
        assert_eq!(right.rids[0], RecordId::new(0, 30));
        assert_eq!(leaf.right_sibling, PageId::new(5));
        assert_eq!(right.right_sibling, PageId::new(77));
    }

    #[test]
    fn test_split_leaf_odd_capacity() {
        let mut leaf = LeafNode::new();
        for v in 1..=5 {
            leaf.insert(IndexKey::Int(v), RecordId::new(0, 0));
        }
        let right = split_leaf(&mut leaf, PageId::new(1));

        assert_eq!(ints(&leaf.keys), vec![1, 2]);
        assert_eq!(ints(&right.keys), vec![3, 4, 5]);
        assert!(leaf.keys.iter().all(|k| *k < right.keys[0]));
    }

    #[test]
    fn test_split_internal_pushes_middle_up() {
        let mut node = InternalNode {
            level: 1,
            keys: [10, 20, 30, 40].into_iter().map(IndexKey::Int).collect(),
            children: (0..5).map(PageId::new).collect(),
        };

        let (separator, right) = split_internal(&mut node);

        assert_eq!(separator, IndexKey::Int(30));
        assert_eq!(ints(&node.keys), vec![10, 20]);
        assert_eq!(node.children, vec![PageId::new(0), PageId::new(1), PageId::new(2)]);
        assert_eq!(ints(&right.keys), vec![40]);
        assert_eq!(right.children, vec![PageId::new(3), PageId::new(4)]);
        assert_eq!(right.level, 1);
        assert!(node.keys.iter().all(|k| *k < separator));
        assert!(right.keys.iter().all(|k| *k > separator));
    }

    #[test]
    fn test_split_internal_odd_capacity() {
        let mut node = InternalNode {
            level: 2,
            keys: [1, 2, 3].into_iter().map(IndexKey::Int).collect(),
            children: (0..4).map(PageId::new).collect(),
        };

        let (separator, right) = split_internal(&mut node);

        assert_eq!(separator, IndexKey::Int(2));
        assert_eq!(ints(&node.keys), vec![1]);
        assert_eq!(ints(&right.keys), vec![3]);
        assert_eq!(node.children.len() + right.children.len(), 4);
    }
}
