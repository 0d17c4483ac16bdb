// SPDX-License-Identifier: MIT OR Apache-2.0

use gdp_core::cbor::{DecodeError, EncodeError};
use gdp_core::{GdpName, Hash, MetadataError, RecNo, Severity};
use thiserror::Error;

/// Outcomes reported by the storage tier and the directory.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No log with this name is known.
    #[error("log {0} not found")]
    LogNotFound(GdpName),

    /// The same log was created before.
    #[error("log {0} exists already")]
    AlreadyExists(GdpName),

    /// Human-readable name is registered for another log.
    #[error("name '{0}' is taken")]
    NameTaken(String),

    /// Request is malformed, for example its name does not match its metadata.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Owner signature of a creation request did not verify.
    #[error("creation request not signed by the log owner")]
    AuthenticationFailed,

    /// Record does not extend the current tail of the log.
    #[error("hash chain mismatch: tail is {expected:?}, record links to {found:?}")]
    HashChainMismatch {
        expected: Option<Hash>,
        found: Option<Hash>,
    },

    /// Record signature did not verify against the writer key.
    #[error("record signature invalid")]
    SignatureInvalid,

    #[error("record {0} not found")]
    RecordNotFound(RecNo),

    /// Storage tier can not be reached.
    #[error("storage tier unavailable")]
    Unavailable,

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl StoreError {
    pub fn severity(&self) -> Severity {
        match self {
            StoreError::AlreadyExists(_) => Severity::Info,
            StoreError::HashChainMismatch { .. } | StoreError::RecordNotFound(_) => {
                Severity::Warn
            }
            StoreError::LogNotFound(_)
            | StoreError::NameTaken(_)
            | StoreError::InvalidRequest(_)
            | StoreError::AuthenticationFailed
            | StoreError::SignatureInvalid
            | StoreError::Metadata(_) => Severity::Error,
            StoreError::Unavailable | StoreError::Encode(_) | StoreError::Decode(_) => {
                Severity::Severe
            }
        }
    }
}
