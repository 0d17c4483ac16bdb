// SPDX-License-Identifier: MIT OR Apache-2.0

//! Log-level key-value table, fixed when the log is created.
//!
//! Keys are 32-bit tags from a fixed enumeration (see the associated constants of
//! [`MetadataId`]). The serialized table is what names a log: [`Metadata::gdp_name`] is the
//! SHA-256 digest of [`Metadata::to_bytes`].
//!
//! Wire format, all integers big endian:
//!
//! ```text
//! u16 entry count
//! per entry: u32 key, u32 value length
//! values, concatenated in entry order
//! ```
use std::fmt;

use thiserror::Error;

use crate::hash::DigestAlgorithm;
use crate::keys::{KeyError, KeyPair, KeyRole};
use crate::name::GdpName;

/// Metadata key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetadataId(pub u32);

impl MetadataId {
    /// External (human) name of the log.
    pub const XID: Self = Self(0x0058_4944);

    /// Single public key of logs predating separate owner and writer keys.
    pub const PUBKEY: Self = Self(0x0050_5542);

    pub const OWNER_PUBKEY: Self = Self(0x004F_504B);

    pub const WRITER_PUBKEY: Self = Self(0x0057_504B);

    /// Creation time.
    pub const CTIME: Self = Self(0x0043_544D);

    /// Expiration, in seconds after creation.
    pub const EXPIRE: Self = Self(0x0058_544D);

    /// Creator id, `user@domain`.
    pub const CREATOR: Self = Self(0x0043_4944);

    /// Payload syntax descriptor.
    pub const SYNTAX: Self = Self(0x0053_594E);

    pub const LOCATION: Self = Self(0x004C_4F43);

    /// Random bytes making the name of each created log unique.
    pub const NONCE: Self = Self(0x004E_4F4E);

    /// End-of-list marker, never stored.
    pub const EOLIST: Self = Self(0);
}

impl fmt::Display for MetadataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag: String = self
            .0
            .to_be_bytes()
            .iter()
            .skip_while(|byte| **byte == 0)
            .map(|byte| *byte as char)
            .collect();

        if !tag.is_empty() && tag.chars().all(|c| c.is_ascii_graphic()) {
            write!(f, "{tag}")
        } else {
            write!(f, "{:#010x}", self.0)
        }
    }
}

impl fmt::Debug for MetadataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MetadataId({self})")
    }
}

impl From<u32> for MetadataId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct MetadataEntry {
    id: MetadataId,
    value: Vec<u8>,
}

/// Metadata table of a log.
///
/// Entries are kept in insertion order, keys are unique. Once sealed (when the log is created,
/// or when decoded from its wire form) the table is read-only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<MetadataEntry>,
    sealed: bool,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, replacing any existing entry with the same key.
    ///
    /// Adding [`MetadataId::EOLIST`] has no effect.
    pub fn add(&mut self, id: MetadataId, value: impl Into<Vec<u8>>) -> Result<(), MetadataError> {
        if self.sealed {
            return Err(MetadataError::Sealed);
        }

        if id == MetadataId::EOLIST {
            return Ok(());
        }

        let value = value.into();
        if u32::try_from(value.len()).is_err() {
            return Err(MetadataError::ValueTooLarge(id, value.len()));
        }

        match self.entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => entry.value = value,
            None => {
                if self.entries.len() == usize::from(u16::MAX) {
                    return Err(MetadataError::TooManyEntries);
                }
                self.entries.push(MetadataEntry { id, value });
            }
        }

        Ok(())
    }

    /// Positional access into the entry list.
    pub fn get(&self, index: usize) -> Result<(MetadataId, &[u8]), MetadataError> {
        self.entries
            .get(index)
            .map(|entry| (entry.id, entry.value.as_slice()))
            .ok_or(MetadataError::IndexOutOfRange(index, self.entries.len()))
    }

    pub fn find(&self, id: MetadataId) -> Result<&[u8], MetadataError> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.value.as_slice())
            .ok_or(MetadataError::KeyNotFound(id))
    }

    pub fn contains(&self, id: MetadataId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetadataId, &[u8])> {
        self.entries
            .iter()
            .map(|entry| (entry.id, entry.value.as_slice()))
    }

    /// Make the table read-only.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let values_len: usize = self.entries.iter().map(|entry| entry.value.len()).sum();
        let mut bytes = Vec::with_capacity(2 + self.entries.len() * 8 + values_len);

        // Both conversions are bounded by the checks in `add`.
        bytes.extend_from_slice(&(self.entries.len() as u16).to_be_bytes());
        for entry in &self.entries {
            bytes.extend_from_slice(&entry.id.0.to_be_bytes());
            bytes.extend_from_slice(&(entry.value.len() as u32).to_be_bytes());
        }
        for entry in &self.entries {
            bytes.extend_from_slice(&entry.value);
        }

        bytes
    }

    /// Decode a serialized table. The result is sealed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MetadataError> {
        let mut reader = Reader(bytes);
        let count = u16::from_be_bytes(reader.take()?);

        let mut headers = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let id = MetadataId(u32::from_be_bytes(reader.take()?));
            let len = u32::from_be_bytes(reader.take()?) as usize;
            headers.push((id, len));
        }

        let mut metadata = Metadata::new();
        for (id, len) in headers {
            if metadata.contains(id) || id == MetadataId::EOLIST {
                return Err(MetadataError::DuplicateKey(id));
            }
            let value = reader.take_slice(len)?;
            metadata.entries.push(MetadataEntry {
                id,
                value: value.to_vec(),
            });
        }

        if !reader.0.is_empty() {
            return Err(MetadataError::TrailingBytes(reader.0.len()));
        }

        metadata.seal();
        Ok(metadata)
    }

    /// Name of the log described by this table.
    pub fn gdp_name(&self) -> GdpName {
        let hash = DigestAlgorithm::Sha256.hash(self.to_bytes());
        let mut bytes = [0; 32];
        bytes.copy_from_slice(hash.as_bytes());
        GdpName::from(bytes)
    }

    /// External name the log was created with.
    pub fn external_name(&self) -> Option<&str> {
        self.find(MetadataId::XID)
            .ok()
            .and_then(|value| std::str::from_utf8(value).ok())
    }

    /// Owner public key, falling back to the deprecated single public key entry.
    pub fn owner_key(&self) -> Result<KeyPair, MetadataError> {
        let value = self
            .find(MetadataId::OWNER_PUBKEY)
            .or_else(|_| self.find(MetadataId::PUBKEY))?;
        Ok(KeyPair::from_metadata_value(value)?.with_role(KeyRole::Owner))
    }

    /// Writer public key, falling back to the owner key.
    pub fn writer_key(&self) -> Result<KeyPair, MetadataError> {
        let key_pair = match self.find(MetadataId::WRITER_PUBKEY) {
            Ok(value) => KeyPair::from_metadata_value(value)?,
            Err(_) => self.owner_key()?,
        };
        Ok(key_pair.with_role(KeyRole::Writer))
    }
}

struct Reader<'a>(&'a [u8]);

impl<'a> Reader<'a> {
    fn take_slice(&mut self, len: usize) -> Result<&'a [u8], MetadataError> {
        if self.0.len() < len {
            return Err(MetadataError::Truncated);
        }
        let (head, tail) = self.0.split_at(len);
        self.0 = tail;
        Ok(head)
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], MetadataError> {
        let mut bytes = [0; N];
        bytes.copy_from_slice(self.take_slice(N)?);
        Ok(bytes)
    }
}

/// Error types for `Metadata`.
#[derive(Error, Debug)]
pub enum MetadataError {
    /// Table was sealed when the log was created.
    #[error("metadata is sealed")]
    Sealed,

    #[error("metadata key {0} not found")]
    KeyNotFound(MetadataId),

    #[error("metadata index {0} out of range, table has {1} entries")]
    IndexOutOfRange(usize, usize),

    #[error("metadata value for {0} too large ({1} bytes)")]
    ValueTooLarge(MetadataId, usize),

    #[error("too many metadata entries")]
    TooManyEntries,

    /// Serialized table ended early.
    #[error("truncated metadata")]
    Truncated,

    #[error("{0} unexpected bytes after metadata")]
    TrailingBytes(usize),

    #[error("duplicate metadata key {0}")]
    DuplicateKey(MetadataId),

    /// Public key entry could not be decoded.
    #[error(transparent)]
    Key(#[from] KeyError),
}
