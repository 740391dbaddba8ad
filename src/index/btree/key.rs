//! Index keys: the attribute types an index can be built on.

use std::cmp::Ordering;
use std::fmt;

use crate::common::{Error, RecordId, Result};

/// Bytes of a string key. Longer strings are truncated, shorter ones
/// zero-padded.
pub const STRING_KEY_SIZE: usize = 10;

/// Type of the indexed attribute.
///
/// Every key in an index has the same type, and therefore the same fixed
/// width on disk.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// 32-bit signed integer.
    Integer = 0,
    /// 64-bit IEEE-754 float, ordered by total order with `-0.0 == 0.0`.
    Double = 1,
    /// Fixed-size byte string, ordered bytewise.
    String = 2,
}

impl KeyType {
    /// On-disk width of one key of this type.
    #[inline]
    pub const fn width(self) -> usize {
        match self {
            KeyType::Integer => 4,
            KeyType::Double => 8,
            KeyType::String => STRING_KEY_SIZE,
        }
    }

    /// Convert from the persisted tag.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(KeyType::Integer),
            1 => Some(KeyType::Double),
            2 => Some(KeyType::String),
            _ => None,
        }
    }
}

/// A key value of one of the supported [`KeyType`]s.
///
/// Keys of the same type have a total order. Comparing keys of different
/// types orders them by type tag; the index never does this because it
/// rejects mismatched keys at its boundary.
///
/// # Example
/// ```
/// use pagetree::{IndexKey, KeyType};
///
/// assert!(IndexKey::Int(-3) < IndexKey::Int(2));
/// assert_eq!(IndexKey::string("abc").key_type(), KeyType::String);
/// assert_eq!(IndexKey::string("abc").to_string(), "abc");
/// ```
#[derive(Debug, Clone, Copy)]
pub enum IndexKey {
    Int(i32),
    Double(f64),
    Str([u8; STRING_KEY_SIZE]),
}

impl IndexKey {
    /// Build a string key, truncating or zero-padding to [`STRING_KEY_SIZE`].
    pub fn string(s: &str) -> Self {
        let mut bytes = [0u8; STRING_KEY_SIZE];
        let len = s.len().min(STRING_KEY_SIZE);
        bytes[..len].copy_from_slice(&s.as_bytes()[..len]);
        IndexKey::Str(bytes)
    }

    /// The type of this key.
    pub fn key_type(&self) -> KeyType {
        match self {
            IndexKey::Int(_) => KeyType::Integer,
            IndexKey::Double(_) => KeyType::Double,
            IndexKey::Str(_) => KeyType::String,
        }
    }

    /// Fail with `KeyTypeMismatch` unless this key has type `expected`.
    pub fn expect_type(&self, expected: KeyType) -> Result<()> {
        let actual = self.key_type();
        if actual == expected {
            Ok(())
        } else {
            Err(Error::KeyTypeMismatch { expected, actual })
        }
    }

    /// Extract the attribute at `offset` from a raw record.
    ///
    /// Integers and doubles are read little-endian; strings take
    /// [`STRING_KEY_SIZE`] bytes.
    pub fn extract(key_type: KeyType, record: &[u8], offset: usize, rid: RecordId) -> Result<Self> {
        let end = offset + key_type.width();
        let bytes = record.get(offset..end).ok_or_else(|| Error::RecordTooShort {
            rid: rid.to_string(),
            len: record.len(),
            offset,
            end,
        })?;
        Ok(Self::decode(key_type, bytes))
    }

    /// Write the fixed-width form into `buf[..width]`.
    pub(crate) fn encode(&self, buf: &mut [u8]) {
        match self {
            IndexKey::Int(v) => buf[..4].copy_from_slice(&v.to_le_bytes()),
            IndexKey::Double(v) => buf[..8].copy_from_slice(&v.to_le_bytes()),
            IndexKey::Str(bytes) => buf[..STRING_KEY_SIZE].copy_from_slice(bytes),
        }
    }

    /// Read the fixed-width form of a `key_type` key from `buf[..width]`.
    pub(crate) fn decode(key_type: KeyType, buf: &[u8]) -> Self {
        match key_type {
            KeyType::Integer => IndexKey::Int(i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])),
            KeyType::Double => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&buf[..8]);
                IndexKey::Double(f64::from_le_bytes(bytes))
            }
            KeyType::String => {
                let mut bytes = [0u8; STRING_KEY_SIZE];
                bytes.copy_from_slice(&buf[..STRING_KEY_SIZE]);
                IndexKey::Str(bytes)
            }
        }
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (IndexKey::Int(a), IndexKey::Int(b)) => a.cmp(b),
            (IndexKey::Double(a), IndexKey::Double(b)) => {
                unsigned_zero(*a).total_cmp(&unsigned_zero(*b))
            }
            (IndexKey::Str(a), IndexKey::Str(b)) => a.cmp(b),
            _ => (self.key_type() as u8).cmp(&(other.key_type() as u8)),
        }
    }
}

/// Both zeros compare as `+0.0`; `total_cmp` would put `-0.0` first.
#[inline]
fn unsigned_zero(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl From<i32> for IndexKey {
    fn from(v: i32) -> Self {
        IndexKey::Int(v)
    }
}

impl From<f64> for IndexKey {
    fn from(v: f64) -> Self {
        IndexKey::Double(v)
    }
}

impl From<&str> for IndexKey {
    fn from(s: &str) -> Self {
        IndexKey::string(s)
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Int(v) => write!(f, "{}", v),
            IndexKey::Double(v) => write!(f, "{}", v),
            IndexKey::Str(bytes) => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                write!(f, "{}", String::from_utf8_lossy(&bytes[..end]))
            }
        }
    }
}
