//! Node codec: typed views of B+Tree pages.
//!
//! A node page is decoded into an owned [`LeafNode`] or [`InternalNode`],
//! modified in memory, and encoded back into the same page. Nothing outside
//! this module touches node bytes.
//!
//! # Layout
//! ```text
//! Offset  Size          Field
//! ------  ----          -----
//! 0       13            page header (type, checksum, lsn)
//! 13      1             level (0 = leaf, n = n levels above the leaves)
//! 14      2             occupancy (entries in a leaf, separators in an internal node)
//! 16      4             right sibling page id (leaves only, INVALID at the end)
//! 20      4             reserved
//! 24      cap * kw      key slots
//! ...     cap * 8       record ids                (leaf)
//! ...     (cap+1) * 4   child page ids            (internal)
//! ```

use crate::common::config::{IndexConfig, MIN_NODE_CAPACITY, MIN_POOL_SIZE, PAGE_SIZE};
use crate::common::{Error, PageId, RecordId, Result};
use crate::storage::page::{Page, PageHeader, PageType};

use super::key::{IndexKey, KeyType};

/// Bytes before the first key slot of a node page.
pub const NODE_HEADER_SIZE: usize = 24;

const OFFSET_LEVEL: usize = PageHeader::SIZE;
const OFFSET_COUNT: usize = 14;
const OFFSET_RIGHT_SIBLING: usize = 16;

/// Key width and node capacities of one tree.
///
/// Fixed when the index is created and persisted in its metadata, so every
/// page of a tree is laid out the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLayout {
    pub key_type: KeyType,
    /// Maximum entries in a leaf.
    pub leaf_capacity: usize,
    /// Maximum separator keys in an internal node.
    pub internal_capacity: usize,
}

impl NodeLayout {
    /// Largest leaf capacity that fits a page for this key type.
    pub const fn max_leaf_capacity(key_type: KeyType) -> usize {
        (PAGE_SIZE - NODE_HEADER_SIZE) / (key_type.width() + RecordId::SIZE)
    }

    /// Largest internal capacity that fits a page for this key type.
    pub const fn max_internal_capacity(key_type: KeyType) -> usize {
        (PAGE_SIZE - NODE_HEADER_SIZE - PageId::SIZE) / (key_type.width() + PageId::SIZE)
    }

    /// Layout for a new tree: page-derived capacities, lowered by any caps
    /// in `config`.
    pub fn from_config(key_type: KeyType, config: &IndexConfig) -> Self {
        let leaf_max = Self::max_leaf_capacity(key_type);
        let internal_max = Self::max_internal_capacity(key_type);
        Self {
            key_type,
            leaf_capacity: config.leaf_capacity.map_or(leaf_max, |cap| cap.min(leaf_max)),
            internal_capacity: config
                .internal_capacity
                .map_or(internal_max, |cap| cap.min(internal_max)),
        }
    }

    /// Layout of an existing tree, as recorded in its metadata page.
    pub fn from_stored(key_type: KeyType, leaf_capacity: u16, internal_capacity: u16) -> Result<Self> {
        let layout = Self {
            key_type,
            leaf_capacity: leaf_capacity as usize,
            internal_capacity: internal_capacity as usize,
        };
        let leaf_ok =
            (MIN_NODE_CAPACITY..=Self::max_leaf_capacity(key_type)).contains(&layout.leaf_capacity);
        let internal_ok = (MIN_NODE_CAPACITY..=Self::max_internal_capacity(key_type))
            .contains(&layout.internal_capacity);
        if !leaf_ok || !internal_ok {
            return Err(Error::corrupted(
                0,
                format!(
                    "stored capacities leaf={} internal={} out of range",
                    leaf_capacity, internal_capacity
                ),
            ));
        }
        Ok(layout)
    }

    /// Tallest tree this layout can reach with `u32` page ids.
    ///
    /// Splits leave every non-root internal node with at least
    /// `ceil(internal_capacity / 2)` children and the root with two, so a
    /// tree of height `h >= 2` spans at least `2 * fanout^(h - 2)` leaf pages.
    pub fn max_height(&self) -> u32 {
        let fanout = ((self.internal_capacity as u64 + 1) / 2).max(2);
        let pages = u64::from(u32::MAX);
        let mut height = 1;
        let mut min_leaves: u64 = 2;
        while min_leaves <= pages {
            height += 1;
            min_leaves = min_leaves.saturating_mul(fanout);
        }
        height
    }

    /// Frames an insert can hold pinned at once: the root-to-leaf path of
    /// the tallest tree plus the sibling a split allocates.
    pub fn min_pool_size(&self) -> usize {
        (self.max_height() as usize + 1).max(MIN_POOL_SIZE)
    }

    #[inline]
    fn key_offset(&self, slot: usize) -> usize {
        NODE_HEADER_SIZE + slot * self.key_type.width()
    }

    #[inline]
    fn rid_offset(&self, slot: usize) -> usize {
        self.key_offset(self.leaf_capacity) + slot * RecordId::SIZE
    }

    #[inline]
    fn child_offset(&self, slot: usize) -> usize {
        self.key_offset(self.internal_capacity) + slot * PageId::SIZE
    }
}

/// A decoded leaf: sorted `(key, record id)` entries plus the sibling link.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafNode {
    pub keys: Vec<IndexKey>,
    pub rids: Vec<RecordId>,
    pub right_sibling: PageId,
}

impl LeafNode {
    /// An empty, rightmost leaf.
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            rids: Vec::new(),
            right_sibling: PageId::INVALID,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Insert after every entry with an equal key.
    pub fn insert(&mut self, key: IndexKey, rid: RecordId) {
        let pos = self.keys.partition_point(|k| *k <= key);
        self.keys.insert(pos, key);
        self.rids.insert(pos, rid);
    }

    /// Position of the first entry above `key` (`inclusive`: at or above).
    pub fn lower_bound(&self, key: &IndexKey, inclusive: bool) -> usize {
        if inclusive {
            self.keys.partition_point(|k| k < key)
        } else {
            self.keys.partition_point(|k| k <= key)
        }
    }

    pub fn entry(&self, pos: usize) -> Option<(IndexKey, RecordId)> {
        Some((*self.keys.get(pos)?, *self.rids.get(pos)?))
    }

    pub fn encode(&self, layout: &NodeLayout, page: &mut Page) {
        debug_assert!(self.len() <= layout.leaf_capacity);
        page.reset();
        page.set_header(&PageHeader::new(PageType::BTreeLeaf));
        page.write_u8(OFFSET_LEVEL, 0);
        page.write_u16(OFFSET_COUNT, self.len() as u16);
        page.write_u32(OFFSET_RIGHT_SIBLING, self.right_sibling.0);

        let width = layout.key_type.width();
        for (slot, (key, rid)) in self.keys.iter().zip(&self.rids).enumerate() {
            let at = layout.key_offset(slot);
            key.encode(&mut page.as_mut_slice()[at..at + width]);
            let at = layout.rid_offset(slot);
            rid.write_to(&mut page.as_mut_slice()[at..at + RecordId::SIZE]);
        }
        page.update_checksum();
    }

    /// Decode `page`, failing unless it is a valid leaf.
    pub fn decode(layout: &NodeLayout, page_id: PageId, page: &Page) -> Result<Self> {
        match Node::decode(layout, page_id, page)? {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Internal(_) => Err(Error::corrupted(page_id.0, "expected leaf, found internal node")),
        }
    }
}

impl Default for LeafNode {
    fn default() -> Self {
        Self::new()
    }
}

/// A decoded internal node: `keys.len()` separators and one more child.
///
/// `children[i]` holds keys `k` with `keys[i-1] <= k <= keys[i]`; equality
/// with `keys[i]` only occurs for a run of duplicates cut by a leaf split.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalNode {
    /// Levels above the leaves; 1 means the children are leaves.
    pub level: u8,
    pub keys: Vec<IndexKey>,
    pub children: Vec<PageId>,
}

impl InternalNode {
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether the children of this node are leaves.
    #[inline]
    pub fn children_are_leaves(&self) -> bool {
        self.level == 1
    }

    /// Child to descend into when inserting `key`: the number of separators
    /// `<= key`.
    pub fn child_index(&self, key: &IndexKey) -> usize {
        self.keys.partition_point(|k| k <= key)
    }

    /// Leftmost child that can hold a key above `key` (`inclusive`: at or
    /// above).
    pub fn lower_bound_child(&self, key: &IndexKey, inclusive: bool) -> usize {
        if inclusive {
            self.keys.partition_point(|k| k < key)
        } else {
            self.keys.partition_point(|k| k <= key)
        }
    }

    /// Record a split of `children[index]`: `separator` goes to position
    /// `index`, the new sibling right after the split child.
    pub fn insert_child(&mut self, index: usize, separator: IndexKey, right: PageId) {
        self.keys.insert(index, separator);
        self.children.insert(index + 1, right);
    }

    pub fn encode(&self, layout: &NodeLayout, page: &mut Page) {
        debug_assert!(self.len() <= layout.internal_capacity);
        debug_assert_eq!(self.children.len(), self.keys.len() + 1);
        page.reset();
        page.set_header(&PageHeader::new(PageType::BTreeInternal));
        page.write_u8(OFFSET_LEVEL, self.level);
        page.write_u16(OFFSET_COUNT, self.len() as u16);
        page.write_u32(OFFSET_RIGHT_SIBLING, PageId::INVALID.0);

        let width = layout.key_type.width();
        for (slot, key) in self.keys.iter().enumerate() {
            let at = layout.key_offset(slot);
            key.encode(&mut page.as_mut_slice()[at..at + width]);
        }
        for (slot, child) in self.children.iter().enumerate() {
            page.write_u32(layout.child_offset(slot), child.0);
        }
        page.update_checksum();
    }

    /// Decode `page`, failing unless it is a valid internal node.
    pub fn decode(layout: &NodeLayout, page_id: PageId, page: &Page) -> Result<Self> {
        match Node::decode(layout, page_id, page)? {
            Node::Internal(node) => Ok(node),
            Node::Leaf(_) => Err(Error::corrupted(page_id.0, "expected internal node, found leaf")),
        }
    }
}

/// Either kind of node, chosen by the page type.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

impl Node {
    /// Decode a node page after verifying its checksum and occupancy.
    pub fn decode(layout: &NodeLayout, page_id: PageId, page: &Page) -> Result<Self> {
        let page_type = page.page_type();
        if !matches!(page_type, PageType::BTreeLeaf | PageType::BTreeInternal) {
            return Err(Error::corrupted(
                page_id.0,
                format!("expected a node page, found {:?}", page_type),
            ));
        }
        if !page.verify_checksum() {
            return Err(Error::corrupted(page_id.0, "checksum mismatch"));
        }

        let count = page.read_u16(OFFSET_COUNT) as usize;
        let level = page.read_u8(OFFSET_LEVEL);
        let width = layout.key_type.width();
        let read_key = |slot: usize| {
            let at = layout.key_offset(slot);
            IndexKey::decode(layout.key_type, &page.as_slice()[at..at + width])
        };

        if page_type == PageType::BTreeLeaf {
            if count > layout.leaf_capacity || level != 0 {
                return Err(Error::corrupted(
                    page_id.0,
                    format!("leaf header out of range (count {}, level {})", count, level),
                ));
            }
            let keys = (0..count).map(read_key).collect();
            let rids = (0..count)
                .map(|slot| {
                    let at = layout.rid_offset(slot);
                    RecordId::read_from(&page.as_slice()[at..at + RecordId::SIZE])
                })
                .collect();
            return Ok(Node::Leaf(LeafNode {
                keys,
                rids,
                right_sibling: PageId::new(page.read_u32(OFFSET_RIGHT_SIBLING)),
            }));
        }

        if count == 0 || count > layout.internal_capacity || level == 0 {
            return Err(Error::corrupted(
                page_id.0,
                format!("internal header out of range (count {}, level {})", count, level),
            ));
        }
        Ok(Node::Internal(InternalNode {
            level,
            keys: (0..count).map(read_key).collect(),
            children: (0..=count)
                .map(|slot| PageId::new(page.read_u32(layout.child_offset(slot))))
                .collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_layout(leaf: usize, internal: usize) -> NodeLayout {
        NodeLayout::from_config(
            KeyType::Integer,
            &IndexConfig::default()
                .with_leaf_capacity(leaf)
                .with_internal_capacity(internal),
        )
    }

    #[test]
    fn test_capacities_fit_page() {
        for key_type in [KeyType::Integer, KeyType::Double, KeyType::String] {
            let leaf = NodeLayout::max_leaf_capacity(key_type);
            let internal = NodeLayout::max_internal_capacity(key_type);
            let kw = key_type.width();
            assert!(NODE_HEADER_SIZE + leaf * (kw + RecordId::SIZE) <= PAGE_SIZE);
            assert!(NODE_HEADER_SIZE + internal * kw + (internal + 1) * PageId::SIZE <= PAGE_SIZE);
        }
        assert_eq!(NodeLayout::max_leaf_capacity(KeyType::Integer), 339);
        assert_eq!(NodeLayout::max_internal_capacity(KeyType::Integer), 508);
    }

    #[test]
    fn test_config_caps_capacity() {
        let layout = int_layout(4, 5);
        assert_eq!(layout.leaf_capacity, 4);
        assert_eq!(layout.internal_capacity, 5);

        let layout = int_layout(100_000, 100_000);
        assert_eq!(layout.leaf_capacity, 339);
        assert_eq!(layout.internal_capacity, 508);
    }

    #[test]
    fn test_from_stored_rejects_bad_capacities() {
        assert!(NodeLayout::from_stored(KeyType::Integer, 4, 4).is_ok());
        assert!(NodeLayout::from_stored(KeyType::Integer, 2, 4).is_err());
        assert!(NodeLayout::from_stored(KeyType::Integer, 4, 9999).is_err());
    }

    #[test]
    fn test_max_height_bounds_pool() {
        // Fan-out 2: 2^(h-1) leaves must fit in u32 page ids.
        let narrow = int_layout(3, 3);
        assert_eq!(narrow.max_height(), 32);
        assert_eq!(narrow.min_pool_size(), 33);

        // Fan-out 254: 2 * 254^3 leaves fit, 2 * 254^4 do not.
        let wide = NodeLayout::from_config(KeyType::Integer, &IndexConfig::default());
        assert_eq!(wide.max_height(), 5);
        assert_eq!(wide.min_pool_size(), 6);

        assert!(int_layout(3, 4).max_height() <= narrow.max_height());
        assert!(int_layout(3, 5).max_height() < narrow.max_height());
    }

    #[test]
    fn test_leaf_insert_keeps_order_and_duplicates() {
        let mut leaf = LeafNode::new();
        leaf.insert(IndexKey::Int(5), RecordId::new(1, 0));
        leaf.insert(IndexKey::Int(3), RecordId::new(1, 1));
        leaf.insert(IndexKey::Int(5), RecordId::new(1, 2));
        leaf.insert(IndexKey::Int(4), RecordId::new(1, 3));

        let keys: Vec<_> = leaf.keys.clone();
        assert_eq!(
            keys,
            vec![IndexKey::Int(3), IndexKey::Int(4), IndexKey::Int(5), IndexKey::Int(5)]
        );
        // Equal keys keep insertion order.
        assert_eq!(leaf.rids[2], RecordId::new(1, 0));
        assert_eq!(leaf.rids[3], RecordId::new(1, 2));

        assert_eq!(leaf.lower_bound(&IndexKey::Int(5), true), 2);
        assert_eq!(leaf.lower_bound(&IndexKey::Int(5), false), 4);
        assert_eq!(leaf.lower_bound(&IndexKey::Int(0), false), 0);
    }

    #[test]
    fn test_leaf_encode_decode() {
        let layout = int_layout(4, 4);
        let mut leaf = LeafNode::new();
        leaf.insert(IndexKey::Int(-7), RecordId::new(3, 1));
        leaf.insert(IndexKey::Int(12), RecordId::new(3, 2));
        leaf.right_sibling = PageId::new(9);

        let mut page = Page::new();
        leaf.encode(&layout, &mut page);
        assert_eq!(page.page_type(), PageType::BTreeLeaf);

        let decoded = LeafNode::decode(&layout, PageId::new(4), &page).unwrap();
        assert_eq!(decoded, leaf);
    }

    #[test]
    fn test_internal_encode_decode() {
        let layout = NodeLayout::from_config(KeyType::String, &IndexConfig::default());
        let node = InternalNode {
            level: 2,
            keys: vec![IndexKey::string("kiwi"), IndexKey::string("plum")],
            children: vec![PageId::new(1), PageId::new(2), PageId::new(3)],
        };

        let mut page = Page::new();
        node.encode(&layout, &mut page);

        match Node::decode(&layout, PageId::new(5), &page).unwrap() {
            Node::Internal(decoded) => {
                assert_eq!(decoded, node);
                assert!(!decoded.children_are_leaves());
            }
            Node::Leaf(_) => panic!("decoded an internal page as a leaf"),
        }
    }

    #[test]
    fn test_child_routing() {
        let node = InternalNode {
            level: 1,
            keys: vec![IndexKey::Int(10), IndexKey::Int(20)],
            children: vec![PageId::new(1), PageId::new(2), PageId::new(3)],
        };

        assert_eq!(node.child_index(&IndexKey::Int(5)), 0);
        assert_eq!(node.child_index(&IndexKey::Int(10)), 1);
        assert_eq!(node.child_index(&IndexKey::Int(25)), 2);

        assert_eq!(node.lower_bound_child(&IndexKey::Int(10), true), 0);
        assert_eq!(node.lower_bound_child(&IndexKey::Int(10), false), 1);
        assert_eq!(node.lower_bound_child(&IndexKey::Int(21), true), 2);
    }

    #[test]
    fn test_insert_child() {
        let mut node = InternalNode {
            level: 1,
            keys: vec![IndexKey::Int(10)],
            children: vec![PageId::new(1), PageId::new(2)],
        };
        node.insert_child(1, IndexKey::Int(15), PageId::new(7));

        assert_eq!(node.keys, vec![IndexKey::Int(10), IndexKey::Int(15)]);
        assert_eq!(node.children, vec![PageId::new(1), PageId::new(2), PageId::new(7)]);
    }

    #[test]
    fn test_decode_rejects_damage() {
        let layout = int_layout(4, 4);
        let mut leaf = LeafNode::new();
        leaf.insert(IndexKey::Int(1), RecordId::new(0, 0));
        let mut page = Page::new();
        leaf.encode(&layout, &mut page);

        assert!(matches!(
            InternalNode::decode(&layout, PageId::new(2), &page),
            Err(Error::Corrupted { page: 2, .. })
        ));

        page.write_u32(NODE_HEADER_SIZE, 99);
        assert!(matches!(
            Node::decode(&layout, PageId::new(2), &page),
            Err(Error::Corrupted { .. })
        ));

        let blank = Page::new();
        assert!(Node::decode(&layout, PageId::new(3), &blank).is_err());
    }
}
