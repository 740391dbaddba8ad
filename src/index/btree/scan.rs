//! Range scans over the leaf chain.

use crate::buffer::PageReadGuard;
use crate::common::{Error, PageId, RecordId, Result};

use super::key::IndexKey;
use super::node::{InternalNode, LeafNode};
use super::BTreeIndex;

/// Comparison operator for a scan bound.
///
/// A low bound takes [`Operator::Gt`] or [`Operator::Gte`], a high bound
/// [`Operator::Lt`] or [`Operator::Lte`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Lt,
    Lte,
    Gte,
    Gt,
}

/// Where a cursor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    /// No scan started, or the last one was ended.
    Unstarted,
    /// Positioned on a pinned leaf.
    Active,
    /// Past the last qualifying entry; nothing is pinned.
    Exhausted,
}

#[derive(Debug, Clone, Copy)]
struct HighBound {
    key: IndexKey,
    inclusive: bool,
}

impl HighBound {
    #[inline]
    fn admits(&self, key: &IndexKey) -> bool {
        if self.inclusive {
            key <= &self.key
        } else {
            key < &self.key
        }
    }
}

struct ActiveScan<'a> {
    /// Pin on the current leaf, held until the cursor moves on.
    _guard: PageReadGuard<'a>,
    leaf: LeafNode,
    pos: usize,
    high: HighBound,
}

enum ScanState<'a> {
    Unstarted,
    Active(ActiveScan<'a>),
    Exhausted,
}

/// A cursor over the record ids of one index, in key order.
///
/// A cursor runs one scan at a time and pins at most one leaf while
/// `Active`. It borrows the index shared, so the index cannot be modified
/// while a cursor exists.
///
/// # Example
/// ```
/// use pagetree::{BTreeIndex, IndexConfig, IndexKey, KeyType, Operator, RecordId};
/// use pagetree::relation::InMemoryRelations;
///
/// let dir = tempfile::tempdir()?;
/// let mut source = InMemoryRelations::new();
/// source.add_relation("items");
/// let mut index = BTreeIndex::create_or_open(
///     dir.path(), "items", 0, KeyType::Integer, &source, IndexConfig::default(),
/// )?;
/// for v in [4, 1, 3] {
///     index.insert(IndexKey::Int(v), RecordId::new(0, v as u16))?;
/// }
///
/// let mut cursor = index.scan();
/// cursor.start_scan(IndexKey::Int(2), Operator::Gte, IndexKey::Int(4), Operator::Lt)?;
/// assert_eq!(cursor.scan_next()?, Some(RecordId::new(0, 3)));
/// assert_eq!(cursor.scan_next()?, None);
/// cursor.end_scan()?;
/// # Ok::<(), pagetree::Error>(())
/// ```
pub struct ScanCursor<'a> {
    index: &'a BTreeIndex,
    state: ScanState<'a>,
}

impl<'a> ScanCursor<'a> {
    pub(crate) fn new(index: &'a BTreeIndex) -> Self {
        Self {
            index,
            state: ScanState::Unstarted,
        }
    }

    /// Current lifecycle state.
    pub fn status(&self) -> ScanStatus {
        match self.state {
            ScanState::Unstarted => ScanStatus::Unstarted,
            ScanState::Active(_) => ScanStatus::Active,
            ScanState::Exhausted => ScanStatus::Exhausted,
        }
    }

    /// Position the cursor on the first entry satisfying `low_op low`.
    ///
    /// A scan already in progress is ended first. Invalid arguments are
    /// rejected before that, leaving the cursor as it was.
    ///
    /// # Errors
    /// - `Error::BadOpcodes` unless `low_op` is `Gt`/`Gte` and `high_op` is
    ///   `Lt`/`Lte`
    /// - `Error::KeyTypeMismatch` if a bound is not of the indexed type
    /// - `Error::BadScanRange` if `low > high`
    /// - page store errors from the descent
    pub fn start_scan(
        &mut self,
        low: IndexKey,
        low_op: Operator,
        high: IndexKey,
        high_op: Operator,
    ) -> Result<()> {
        let low_inclusive = match low_op {
            Operator::Gte => true,
            Operator::Gt => false,
            _ => return Err(Error::BadOpcodes { low: low_op, high: high_op }),
        };
        let high_inclusive = match high_op {
            Operator::Lte => true,
            Operator::Lt => false,
            _ => return Err(Error::BadOpcodes { low: low_op, high: high_op }),
        };
        let index = self.index;
        let key_type = index.layout.key_type;
        low.expect_type(key_type)?;
        high.expect_type(key_type)?;
        if low > high {
            return Err(Error::BadScanRange);
        }

        self.state = ScanState::Unstarted;

        let high = HighBound {
            key: high,
            inclusive: high_inclusive,
        };
        let (guard, leaf) = match index.find_leaf(&low, low_inclusive)? {
            Some(found) => found,
            None => {
                self.state = ScanState::Exhausted;
                return Ok(());
            }
        };
        let pos = leaf.lower_bound(&low, low_inclusive);

        tracing::trace!(
            target: "pagetree::btree::scan",
            index = %index.name,
            leaf = guard.page_id().0,
            pos,
            low = %low,
            high = %high.key,
            "scan started"
        );

        self.state = ScanState::Active(ActiveScan {
            _guard: guard,
            leaf,
            pos,
            high,
        });
        Ok(())
    }

    /// Next record id in key order, or `Ok(None)` once the range is done.
    ///
    /// A finished cursor keeps returning `Ok(None)`. If moving to the next
    /// leaf fails, the error is returned and the cursor is exhausted.
    ///
    /// # Errors
    /// - `Error::ScanNotInitialized` if no scan was started
    /// - page store errors while following the leaf chain
    pub fn scan_next(&mut self) -> Result<Option<RecordId>> {
        let index = self.index;
        loop {
            let scan = match &mut self.state {
                ScanState::Unstarted => return Err(Error::ScanNotInitialized),
                ScanState::Exhausted => return Ok(None),
                ScanState::Active(scan) => scan,
            };

            if let Some((key, rid)) = scan.leaf.entry(scan.pos) {
                if scan.high.admits(&key) {
                    scan.pos += 1;
                    return Ok(Some(rid));
                }
                self.finish("high bound reached");
                return Ok(None);
            }

            let next = scan.leaf.right_sibling;
            let high = scan.high;
            if !next.is_valid() {
                self.finish("end of leaf chain");
                return Ok(None);
            }

            // Unpin the current leaf before pinning its sibling.
            self.state = ScanState::Exhausted;
            let (guard, leaf) = index.read_leaf(next)?;
            self.state = ScanState::Active(ActiveScan {
                _guard: guard,
                leaf,
                pos: 0,
                high,
            });
        }
    }

    /// End the current scan and release its pinned leaf.
    ///
    /// # Errors
    /// `Error::ScanNotInitialized` if no scan is in progress.
    pub fn end_scan(&mut self) -> Result<()> {
        if matches!(self.state, ScanState::Unstarted) {
            return Err(Error::ScanNotInitialized);
        }
        self.state = ScanState::Unstarted;
        Ok(())
    }

    fn finish(&mut self, reason: &'static str) {
        tracing::trace!(
            target: "pagetree::btree::scan",
            index = %self.index.name,
            reason,
            "scan exhausted"
        );
        self.state = ScanState::Exhausted;
    }
}

/// Yields the remaining record ids. After an error the cursor is exhausted
/// and iteration stops.
impl Iterator for ScanCursor<'_> {
    type Item = Result<RecordId>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.scan_next() {
            Ok(rid) => rid.map(Ok),
            Err(e) => {
                self.state = ScanState::Exhausted;
                Some(Err(e))
            }
        }
    }
}

impl BTreeIndex {
    /// An unstarted cursor over this index.
    pub fn scan(&self) -> ScanCursor<'_> {
        ScanCursor::new(self)
    }

    /// A cursor already positioned on the range `low_op low .. high_op high`.
    pub fn range(
        &self,
        low: IndexKey,
        low_op: Operator,
        high: IndexKey,
        high_op: Operator,
    ) -> Result<ScanCursor<'_>> {
        let mut cursor = self.scan();
        cursor.start_scan(low, low_op, high, high_op)?;
        Ok(cursor)
    }

    /// Descend to the leftmost leaf that can hold a key above `low`, or
    /// `None` for an empty tree.
    fn find_leaf(
        &self,
        low: &IndexKey,
        inclusive: bool,
    ) -> Result<Option<(PageReadGuard<'_>, LeafNode)>> {
        if self.meta.is_empty() {
            return Ok(None);
        }

        let mut page_id = self.meta.root_page_id;
        for _ in 1..self.meta.height {
            let guard = self.bpm.fetch_page_read(page_id)?;
            let node = InternalNode::decode(&self.layout, page_id, &guard)?;
            page_id = node.children[node.lower_bound_child(low, inclusive)];
        }
        self.read_leaf(page_id).map(Some)
    }

    /// Pin and decode a leaf.
    pub(crate) fn read_leaf(&self, page_id: PageId) -> Result<(PageReadGuard<'_>, LeafNode)> {
        let guard = self.bpm.fetch_page_read(page_id)?;
        let leaf = LeafNode::decode(&self.layout, page_id, &guard)?;
        Ok((guard, leaf))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::common::IndexConfig;
    use crate::index::btree::KeyType;
    use crate::relation::InMemoryRelations;

    fn index_with(dir: &std::path::Path, keys: &[i32]) -> BTreeIndex {
        let config = IndexConfig::default()
            .with_leaf_capacity(4)
            .with_internal_capacity(4);
        let mut source = InMemoryRelations::new();
        source.add_relation("rel");
        let mut index =
            BTreeIndex::create_or_open(dir, "rel", 0, KeyType::Integer, &source, config).unwrap();
        for (slot, &v) in keys.iter().enumerate() {
            index.insert(IndexKey::Int(v), RecordId::new(0, slot as u16)).unwrap();
        }
        index
    }

    fn slots(cursor: &mut ScanCursor<'_>) -> Vec<u16> {
        let mut out = Vec::new();
        while let Some(rid) = cursor.scan_next().unwrap() {
            out.push(rid.slot_number);
        }
        out
    }

    #[test]
    fn test_state_machine() {
        let dir = tempdir().unwrap();
        let index = index_with(dir.path(), &[1, 2, 3]);
        let mut cursor = index.scan();

        assert_eq!(cursor.status(), ScanStatus::Unstarted);
        assert!(matches!(cursor.scan_next(), Err(Error::ScanNotInitialized)));
        assert!(matches!(cursor.end_scan(), Err(Error::ScanNotInitialized)));

        cursor
            .start_scan(IndexKey::Int(1), Operator::Gte, IndexKey::Int(2), Operator::Lte)
            .unwrap();
        assert_eq!(cursor.status(), ScanStatus::Active);
        assert_eq!(index.bpm.pinned_frame_count(), 1);

        assert_eq!(slots(&mut cursor), vec![0, 1]);
        assert_eq!(cursor.status(), ScanStatus::Exhausted);
        assert_eq!(cursor.scan_next().unwrap(), None);
        assert_eq!(index.bpm.pinned_frame_count(), 0);

        cursor.end_scan().unwrap();
        assert_eq!(cursor.status(), ScanStatus::Unstarted);
    }

    #[test]
    fn test_bad_operators_leave_cursor_untouched() {
        let dir = tempdir().unwrap();
        let index = index_with(dir.path(), &[1, 2, 3]);
        let mut cursor = index.scan();
        cursor
            .start_scan(IndexKey::Int(1), Operator::Gte, IndexKey::Int(3), Operator::Lte)
            .unwrap();

        let err = cursor
            .start_scan(IndexKey::Int(1), Operator::Lt, IndexKey::Int(3), Operator::Lte)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::BadOpcodes {
                low: Operator::Lt,
                high: Operator::Lte
            }
        ));
        assert!(matches!(
            cursor.start_scan(IndexKey::Int(1), Operator::Gt, IndexKey::Int(3), Operator::Gte),
            Err(Error::BadOpcodes { .. })
        ));
        assert!(matches!(
            cursor.start_scan(IndexKey::Int(5), Operator::Gt, IndexKey::Int(3), Operator::Lt),
            Err(Error::BadScanRange)
        ));
        assert!(matches!(
            cursor.start_scan(IndexKey::Double(1.0), Operator::Gt, IndexKey::Int(3), Operator::Lt),
            Err(Error::KeyTypeMismatch { .. })
        ));

        // The earlier scan is still in progress.
        assert_eq!(cursor.status(), ScanStatus::Active);
        assert_eq!(slots(&mut cursor), vec![0, 1, 2]);
    }

    #[test]
    fn test_exclusive_bounds() {
        let dir = tempdir().unwrap();
        let index = index_with(dir.path(), &[10, 20, 30, 40, 50, 60]);

        let mut cursor = index
            .range(IndexKey::Int(20), Operator::Gt, IndexKey::Int(50), Operator::Lt)
            .unwrap();
        assert_eq!(slots(&mut cursor), vec![2, 3]);

        let mut cursor = index
            .range(IndexKey::Int(20), Operator::Gte, IndexKey::Int(50), Operator::Lte)
            .unwrap();
        assert_eq!(slots(&mut cursor), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_empty_results() {
        let dir = tempdir().unwrap();
        let empty = index_with(dir.path(), &[]);
        let mut cursor = empty
            .range(IndexKey::Int(0), Operator::Gte, IndexKey::Int(100), Operator::Lte)
            .unwrap();
        assert_eq!(cursor.status(), ScanStatus::Exhausted);
        assert_eq!(cursor.scan_next().unwrap(), None);
        drop(cursor);

        let dir = tempdir().unwrap();
        let index = index_with(dir.path(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        let mut cursor = index
            .range(IndexKey::Int(100), Operator::Gte, IndexKey::Int(200), Operator::Lte)
            .unwrap();
        assert_eq!(cursor.scan_next().unwrap(), None);

        let mut cursor = index
            .range(IndexKey::Int(4), Operator::Gt, IndexKey::Int(4), Operator::Lte)
            .unwrap();
        assert_eq!(cursor.scan_next().unwrap(), None);
        assert_eq!(index.bpm.pinned_frame_count(), 0);
    }

    #[test]
    fn test_duplicates_across_leaves_are_found() {
        let dir = tempdir().unwrap();
        let index = index_with(dir.path(), &[7, 7, 7, 7, 7, 7, 7, 7, 7, 1, 9]);
        assert!(index.height() >= 2);

        let mut cursor = index
            .range(IndexKey::Int(7), Operator::Gte, IndexKey::Int(7), Operator::Lte)
            .unwrap();
        // Insertion order among equal keys.
        assert_eq!(slots(&mut cursor), (0..9).collect::<Vec<u16>>());

        let mut cursor = index
            .range(IndexKey::Int(1), Operator::Gt, IndexKey::Int(9), Operator::Lt)
            .unwrap();
        assert_eq!(slots(&mut cursor).len(), 9);
    }

    #[test]
    fn test_restart_releases_previous_leaf() {
        let dir = tempdir().unwrap();
        let index = index_with(dir.path(), &(0..50).collect::<Vec<_>>());
        let mut cursor = index.scan();

        cursor
            .start_scan(IndexKey::Int(0), Operator::Gte, IndexKey::Int(49), Operator::Lte)
            .unwrap();
        cursor.scan_next().unwrap();
        cursor
            .start_scan(IndexKey::Int(40), Operator::Gte, IndexKey::Int(49), Operator::Lte)
            .unwrap();
        assert_eq!(index.bpm.pinned_frame_count(), 1);
        assert_eq!(slots(&mut cursor), (40..50).collect::<Vec<u16>>());
    }

    #[test]
    fn test_iterator() {
        let dir = tempdir().unwrap();
        let index = index_with(dir.path(), &[3, 1, 2]);
        let rids: Vec<RecordId> = index
            .range(IndexKey::Int(1), Operator::Gte, IndexKey::Int(3), Operator::Lte)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(
            rids,
            vec![RecordId::new(0, 1), RecordId::new(0, 2), RecordId::new(0, 0)]
        );
    }
}
