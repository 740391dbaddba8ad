//! Index metadata: the persistent record in page 0 of every index file.

use crate::common::{Error, PageId, Result};
use crate::storage::page::{Page, PageHeader, PageType};

use super::key::KeyType;

/// Page holding the metadata record.
pub const META_PAGE_ID: PageId = PageId(0);

/// Identifies a pagetree index file ("PTIX").
pub const INDEX_MAGIC: u32 = 0x5854_4950;

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Maximum bytes of relation name stored in the metadata page.
pub const RELATION_NAME_SIZE: usize = 64;

const OFFSET_MAGIC: usize = 16;
const OFFSET_VERSION: usize = 20;
const OFFSET_ATTR_OFFSET: usize = 24;
const OFFSET_ATTR_TYPE: usize = 28;
const OFFSET_ROOT: usize = 32;
const OFFSET_HEIGHT: usize = 36;
const OFFSET_LEAF_CAPACITY: usize = 40;
const OFFSET_INTERNAL_CAPACITY: usize = 42;
const OFFSET_NODE_COUNT: usize = 48;
const OFFSET_NAME_LEN: usize = 56;
const OFFSET_NAME: usize = 58;

/// Reject relation names that cannot be stored or would not name a file
/// inside the index directory.
pub(crate) fn validate_relation_name(relation_name: &str) -> Result<()> {
    if relation_name.is_empty() || relation_name.len() > RELATION_NAME_SIZE {
        return Err(Error::InvalidConfig(format!(
            "relation name must be 1..={} bytes, got {}",
            RELATION_NAME_SIZE,
            relation_name.len()
        )));
    }
    if relation_name.contains(&['/', '\\', '\0'][..]) {
        return Err(Error::InvalidConfig(format!(
            "relation name {:?} contains a path separator or NUL",
            relation_name
        )));
    }
    Ok(())
}

/// Descriptor of the indexed attribute plus the tree's root and height.
///
/// # Layout (after the 13-byte page header)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 16      4     magic
/// 20      4     format version
/// 24      4     attribute byte offset
/// 28      1     attribute type tag
/// 32      4     root page id (INVALID = empty tree)
/// 36      4     height in levels (0 = empty, 1 = single leaf)
/// 40      2     leaf capacity
/// 42      2     internal capacity
/// 48      8     node count (diagnostic)
/// 56      2     relation name length
/// 58      64    relation name (UTF-8, zero-padded)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetadata {
    pub relation_name: String,
    pub attr_byte_offset: u32,
    pub attr_type: KeyType,
    pub root_page_id: PageId,
    pub height: u32,
    pub leaf_capacity: u16,
    pub internal_capacity: u16,
    pub node_count: u64,
}

impl IndexMetadata {
    /// Metadata for a new, empty index.
    pub fn new(
        relation_name: &str,
        attr_byte_offset: u32,
        attr_type: KeyType,
        leaf_capacity: u16,
        internal_capacity: u16,
    ) -> Result<Self> {
        validate_relation_name(relation_name)?;

        Ok(Self {
            relation_name: relation_name.to_string(),
            attr_byte_offset,
            attr_type,
            root_page_id: PageId::INVALID,
            height: 0,
            leaf_capacity,
            internal_capacity,
            node_count: 0,
        })
    }

    /// Whether no entry has ever been inserted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.root_page_id.is_valid()
    }

    /// Serialize into `page` and seal it with a checksum.
    pub fn encode_into(&self, page: &mut Page) {
        page.reset();
        page.set_header(&PageHeader::new(PageType::IndexMeta));
        page.write_u32(OFFSET_MAGIC, INDEX_MAGIC);
        page.write_u32(OFFSET_VERSION, FORMAT_VERSION);
        page.write_u32(OFFSET_ATTR_OFFSET, self.attr_byte_offset);
        page.write_u8(OFFSET_ATTR_TYPE, self.attr_type as u8);
        page.write_u32(OFFSET_ROOT, self.root_page_id.0);
        page.write_u32(OFFSET_HEIGHT, self.height);
        page.write_u16(OFFSET_LEAF_CAPACITY, self.leaf_capacity);
        page.write_u16(OFFSET_INTERNAL_CAPACITY, self.internal_capacity);
        page.write_u64(OFFSET_NODE_COUNT, self.node_count);

        let name = self.relation_name.as_bytes();
        page.write_u16(OFFSET_NAME_LEN, name.len() as u16);
        page.as_mut_slice()[OFFSET_NAME..OFFSET_NAME + name.len()].copy_from_slice(name);

        page.update_checksum();
    }

    /// Parse and validate the metadata page.
    pub fn decode(page: &Page) -> Result<Self> {
        let pid = META_PAGE_ID.0;
        if page.page_type() != PageType::IndexMeta {
            return Err(Error::corrupted(
                pid,
                format!("expected metadata page, found {:?}", page.page_type()),
            ));
        }
        if page.read_u32(OFFSET_MAGIC) != INDEX_MAGIC {
            return Err(Error::InvalidMagic);
        }
        if !page.verify_checksum() {
            return Err(Error::corrupted(pid, "checksum mismatch"));
        }
        let version = page.read_u32(OFFSET_VERSION);
        if version != FORMAT_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let tag = page.read_u8(OFFSET_ATTR_TYPE);
        let attr_type = KeyType::from_u8(tag)
            .ok_or_else(|| Error::corrupted(pid, format!("unknown attribute type tag {}", tag)))?;

        let name_len = page.read_u16(OFFSET_NAME_LEN) as usize;
        if name_len > RELATION_NAME_SIZE {
            return Err(Error::corrupted(pid, "relation name length out of range"));
        }
        let relation_name =
            std::str::from_utf8(&page.as_slice()[OFFSET_NAME..OFFSET_NAME + name_len])
                .map_err(|_| Error::corrupted(pid, "relation name is not UTF-8"))?
                .to_string();

        let root_page_id = PageId::new(page.read_u32(OFFSET_ROOT));
        let height = page.read_u32(OFFSET_HEIGHT);
        if root_page_id.is_valid() != (height > 0) {
            return Err(Error::corrupted(
                pid,
                format!("root {} disagrees with height {}", root_page_id, height),
            ));
        }

        Ok(Self {
            relation_name,
            attr_byte_offset: page.read_u32(OFFSET_ATTR_OFFSET),
            attr_type,
            root_page_id,
            height,
            leaf_capacity: page.read_u16(OFFSET_LEAF_CAPACITY),
            internal_capacity: page.read_u16(OFFSET_INTERNAL_CAPACITY),
            node_count: page.read_u64(OFFSET_NODE_COUNT),
        })
    }

    /// Check that this stored descriptor matches what a caller asked for.
    pub fn validate_against(
        &self,
        index_name: &str,
        relation_name: &str,
        attr_byte_offset: u32,
        attr_type: KeyType,
    ) -> Result<()> {
        let mismatch = |field: &'static str, stored: String, requested: String| {
            Err(Error::AttributeMismatch {
                index: index_name.to_string(),
                field,
                stored,
                requested,
            })
        };

        if self.relation_name != relation_name {
            return mismatch(
                "relation",
                self.relation_name.clone(),
                relation_name.to_string(),
            );
        }
        if self.attr_byte_offset != attr_byte_offset {
            return mismatch(
                "attribute offset",
                self.attr_byte_offset.to_string(),
                attr_byte_offset.to_string(),
            );
        }
        if self.attr_type != attr_type {
            return mismatch(
                "attribute type",
                format!("{:?}", self.attr_type),
                format!("{:?}", attr_type),
            );
        }
        Ok(())
    }
}
