//! Configuration constants and index options.

use super::error::{Error, Result};

/// Size of a page in bytes (4KB).
///
/// Every node of the tree and the metadata record each occupy exactly one
/// page, so this also bounds the fan-out of the tree.
pub const PAGE_SIZE: usize = 4096;

/// Frames in the buffer pool when the caller does not choose.
///
/// An insert pins one page per tree level plus the pages a split allocates.
/// 64 frames cover any height a 4KB-page tree can reach with `u32` page ids.
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Smallest node capacity accepted for leaves and internal nodes.
///
/// Below this a midpoint split leaves one half empty.
pub const MIN_NODE_CAPACITY: usize = 3;

/// Smallest buffer pool accepted for any tree.
///
/// A split pins the whole root-to-leaf path plus the new sibling, so an index
/// also requires [`NodeLayout::min_pool_size`] frames for its capacities.
///
/// [`NodeLayout::min_pool_size`]: crate::index::btree::NodeLayout::min_pool_size
pub const MIN_POOL_SIZE: usize = 4;

/// Options for creating or opening an index.
///
/// Capacities are upper bounds: the effective capacity is the smaller of the
/// configured cap and what fits in a page for the key type. A reopened index
/// always uses the capacities stored in its metadata page.
///
/// # Example
/// ```
/// use pagetree::IndexConfig;
///
/// let config = IndexConfig::default()
///     .with_pool_size(16)
///     .with_leaf_capacity(4);
/// assert_eq!(config.pool_size, 16);
/// assert_eq!(config.leaf_capacity, Some(4));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// Number of frames in the index's buffer pool.
    pub pool_size: usize,
    /// Cap on entries per leaf node.
    pub leaf_capacity: Option<usize>,
    /// Cap on separator keys per internal node.
    pub internal_capacity: Option<usize>,
}

impl IndexConfig {
    /// Set the buffer pool size.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Cap the number of entries per leaf.
    pub fn with_leaf_capacity(mut self, capacity: usize) -> Self {
        self.leaf_capacity = Some(capacity);
        self
    }

    /// Cap the number of separators per internal node.
    pub fn with_internal_capacity(mut self, capacity: usize) -> Self {
        self.internal_capacity = Some(capacity);
        self
    }

    /// Reject settings the tree cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size < MIN_POOL_SIZE {
            return Err(Error::InvalidConfig(format!(
                "pool size {} is too small (minimum {})",
                self.pool_size, MIN_POOL_SIZE
            )));
        }
        for (what, cap) in [
            ("leaf", self.leaf_capacity),
            ("internal", self.internal_capacity),
        ] {
            if let Some(cap) = cap {
                if cap < MIN_NODE_CAPACITY {
                    return Err(Error::InvalidConfig(format!(
                        "{} capacity {} is below the minimum of {}",
                        what, cap, MIN_NODE_CAPACITY
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            leaf_capacity: None,
            internal_capacity: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(PAGE_SIZE.is_power_of_two());
        assert_eq!(PAGE_SIZE, 4096);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = IndexConfig::default();
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_small_capacities_rejected() {
        let config = IndexConfig::default().with_leaf_capacity(2);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = IndexConfig::default().with_internal_capacity(1);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = IndexConfig::default().with_pool_size(1);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
