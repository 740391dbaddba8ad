//! Error types for pagetree.

use thiserror::Error;

use crate::index::btree::{KeyType, Operator};

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in pagetree.
///
/// Variants fall into four groups:
/// - **Storage**: page store and file failures, propagated unmodified.
/// - **Configuration**: the caller's attribute descriptor or keys do not match
///   the index. Fatal to the call.
/// - **Range**: invalid operators or bounds passed to a scan. Recoverable.
/// - **Scan state**: cursor operations called out of sequence. Recoverable.
///
/// A finished scan is not an error; see [`ScanCursor::scan_next`].
///
/// [`ScanCursor::scan_next`]: crate::index::btree::ScanCursor::scan_next
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page does not exist on disk.
    #[error("Page {0} not found")]
    PageNotFound(u32),

    /// Buffer pool has no free frames and cannot evict any pages.
    ///
    /// This happens when all frames are pinned.
    #[error("No free frames available in buffer pool")]
    NoFreeFrames,

    /// A page failed its checksum or does not hold the expected page type.
    #[error("Corrupted page {page}: {reason}")]
    Corrupted { page: u32, reason: String },

    /// The metadata page does not carry the index magic number.
    #[error("Invalid magic number in index metadata page")]
    InvalidMagic,

    /// The index file was written by an unknown format version.
    #[error("Unsupported index format version: {0}")]
    UnsupportedVersion(u32),

    /// An existing index file describes a different attribute than requested.
    #[error("Index {index} mismatch on {field}: stored {stored}, requested {requested}")]
    AttributeMismatch {
        index: String,
        field: &'static str,
        stored: String,
        requested: String,
    },

    /// A key of the wrong type was passed to the index.
    #[error("Key type mismatch: index holds {expected:?} keys, got {actual:?}")]
    KeyTypeMismatch { expected: KeyType, actual: KeyType },

    /// Index configuration is unusable (capacities, pool size, names).
    #[error("Invalid index configuration: {0}")]
    InvalidConfig(String),

    /// A record is too short to contain the indexed attribute.
    #[error("Record {rid} is {len} bytes, attribute needs bytes {offset}..{end}")]
    RecordTooShort {
        rid: String,
        len: usize,
        offset: usize,
        end: usize,
    },

    /// The record source knows no relation with this name.
    #[error("Relation not found: {0}")]
    RelationNotFound(String),

    /// Scan operators outside `{Gt, Gte}` for the low bound or `{Lt, Lte}`
    /// for the high bound.
    #[error("Bad scan operators: low {low:?}, high {high:?}")]
    BadOpcodes { low: Operator, high: Operator },

    /// The low bound of a scan is greater than its high bound.
    #[error("Bad scan range: low bound exceeds high bound")]
    BadScanRange,

    /// A cursor operation was called before `start_scan`.
    #[error("Scan not initialized")]
    ScanNotInitialized,
}

impl Error {
    /// Shorthand for [`Error::Corrupted`].
    pub(crate) fn corrupted(page: u32, reason: impl Into<String>) -> Self {
        Error::Corrupted {
            page,
            reason: reason.into(),
        }
    }
}
