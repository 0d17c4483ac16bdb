// SPDX-License-Identifier: MIT OR Apache-2.0

//! CBOR encoding of stored records and encrypted key envelopes.
//!
//! The storage tier keeps every record as one self-contained CBOR item. A stored buffer has to
//! decode completely, bytes left over after the item mean the record was corrupted.
use ciborium::de::Error as DeserializeError;
use ciborium::ser::Error as SerializeError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Encodes a record or envelope as a single CBOR item.
pub fn encode_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, EncodeError> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes).map_err(|err| match err {
        SerializeError::Io(err) => EncodeError(err.to_string()),
        SerializeError::Value(description) => EncodeError(description),
    })?;
    Ok(bytes)
}

/// Decodes a buffer holding exactly one CBOR item.
pub fn decode_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
    let mut remaining = bytes;
    let value = ciborium::from_reader(&mut remaining)?;
    if !remaining.is_empty() {
        return Err(DecodeError::TrailingBytes(remaining.len()));
    }
    Ok(value)
}

/// A value could not be encoded, carries serde's description of the problem.
#[derive(Debug, Error)]
#[error("value can not be encoded as CBOR: {0}")]
pub struct EncodeError(String);

/// A stored buffer is not a valid encoding of the expected value.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The buffer ended in the middle of an item.
    #[error("buffer ends before the CBOR item is complete")]
    Truncated,

    /// Malformed CBOR at the given byte offset.
    #[error("malformed CBOR at byte {0}")]
    Malformed(usize),

    /// Well-formed CBOR which does not describe the expected value.
    #[error("unexpected CBOR value: {1}")]
    Unexpected(Option<usize>, String),

    #[error("{0} bytes left after the CBOR item")]
    TrailingBytes(usize),

    #[error("CBOR item is nested too deeply")]
    TooDeep,
}

impl From<DeserializeError<std::io::Error>> for DecodeError {
    fn from(value: DeserializeError<std::io::Error>) -> Self {
        match value {
            // Reading from a slice only fails once it is exhausted.
            DeserializeError::Io(_) => DecodeError::Truncated,
            DeserializeError::Syntax(offset) => DecodeError::Malformed(offset),
            DeserializeError::Semantic(offset, description) => {
                DecodeError::Unexpected(offset, description)
            }
            DeserializeError::RecursionLimitExceeded => DecodeError::TooDeep,
        }
    }
}
