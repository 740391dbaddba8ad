//! Record sources: where a new index reads its relation from.
//!
//! An index only needs a full scan of `(RecordId, record bytes)` pairs to
//! bulk-load itself. [`RecordSource`] is that scan; [`InMemoryRelations`]
//! is a simple implementation for tests and small tools.

use std::collections::HashMap;

use crate::common::{Error, RecordId, Result};

/// Records of one relation, in storage order.
pub type RecordScan<'a> = Box<dyn Iterator<Item = Result<(RecordId, Vec<u8>)>> + 'a>;

/// A store that can scan every record of a named relation.
pub trait RecordSource {
    /// Scan all records of `relation`.
    ///
    /// # Errors
    /// `Error::RelationNotFound` if the store has no such relation; the
    /// iterator may yield storage errors of its own.
    fn scan_relation(&self, relation: &str) -> Result<RecordScan<'_>>;
}

/// Record slots per page when [`InMemoryRelations::append`] assigns ids.
pub const RECORDS_PER_PAGE: u32 = 64;

/// Relations held in memory, keyed by name.
///
/// # Example
/// ```
/// use pagetree::relation::{InMemoryRelations, RecordSource};
///
/// let mut relations = InMemoryRelations::new();
/// let rid = relations.append("items", 7i32.to_le_bytes().to_vec());
///
/// let records: Vec<_> = relations.scan_relation("items")?.collect::<Result<_, _>>()?;
/// assert_eq!(records, vec![(rid, vec![7, 0, 0, 0])]);
/// # Ok::<(), pagetree::Error>(())
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryRelations {
    relations: HashMap<String, Vec<(RecordId, Vec<u8>)>>,
}

impl InMemoryRelations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty relation. Existing records are kept.
    pub fn add_relation(&mut self, relation: &str) {
        self.relations.entry(relation.to_string()).or_default();
    }

    /// Append a record, assigning the next free record id.
    pub fn append(&mut self, relation: &str, record: Vec<u8>) -> RecordId {
        let records = self.relations.entry(relation.to_string()).or_default();
        let n = records.len() as u32;
        let rid = RecordId::new(n / RECORDS_PER_PAGE, (n % RECORDS_PER_PAGE) as u16);
        records.push((rid, record));
        rid
    }

    /// Add a record under a caller-chosen id.
    pub fn insert(&mut self, relation: &str, rid: RecordId, record: Vec<u8>) {
        self.relations
            .entry(relation.to_string())
            .or_default()
            .push((rid, record));
    }

    /// Number of records in `relation`, or `None` if it does not exist.
    pub fn len(&self, relation: &str) -> Option<usize> {
        self.relations.get(relation).map(Vec::len)
    }
}

impl RecordSource for InMemoryRelations {
    fn scan_relation(&self, relation: &str) -> Result<RecordScan<'_>> {
        let records = self
            .relations
            .get(relation)
            .ok_or_else(|| Error::RelationNotFound(relation.to_string()))?;
        Ok(Box::new(
            records.iter().map(|(rid, bytes)| Ok((*rid, bytes.clone()))),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_assigns_ids() {
        let mut relations = InMemoryRelations::new();
        let mut last = RecordId::default();
        for i in 0..=RECORDS_PER_PAGE {
            last = relations.append("r", vec![i as u8]);
        }
        assert_eq!(last, RecordId::new(1, 0));
        assert_eq!(relations.len("r"), Some(RECORDS_PER_PAGE as usize + 1));
    }

    #[test]
    fn test_scan_in_storage_order() {
        let mut relations = InMemoryRelations::new();
        relations.insert("r", RecordId::new(9, 1), vec![1]);
        relations.insert("r", RecordId::new(2, 5), vec![2]);

        let rids: Vec<RecordId> = relations
            .scan_relation("r")
            .unwrap()
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(rids, vec![RecordId::new(9, 1), RecordId::new(2, 5)]);
    }

    #[test]
    fn test_missing_relation() {
        let mut relations = InMemoryRelations::new();
        relations.add_relation("empty");
        assert_eq!(relations.scan_relation("empty").unwrap().count(), 0);
        assert!(matches!(
            relations.scan_relation("nope"),
            Err(Error::RelationNotFound(name)) if name == "nope"
        ));
    }
}
