// SPDX-License-Identifier: MIT OR Apache-2.0

use gdp_core::{
    DatumError, GdpName, Hash, KeyError, KeyRole, MetadataError, MetadataId, NameError, Severity,
};
use gdp_store::StoreError;
use thiserror::Error;
use tracing::debug;

use crate::gin::IoMode;

/// Failures of GDP operations.
#[derive(Debug, Error)]
pub enum GdpError {
    /// String is neither a printable name nor resolvable through a directory.
    #[error("invalid name format '{0}'")]
    InvalidNameFormat(String),

    /// Directory has no entry for the name.
    #[error("name '{0}' not found")]
    NameNotFound(String),

    /// Log could not be opened.
    #[error(transparent)]
    Open(#[from] OpenError),

    /// Handle was closed before or during the operation.
    #[error("log handle is closed")]
    HandleClosed,

    /// Record does not extend the current tail of the log. Retry with the new tail hash.
    #[error("hash chain mismatch: tail is {expected:?}, append linked to {found:?}")]
    HashChainMismatch {
        expected: Option<Hash>,
        found: Option<Hash>,
    },

    /// Asynchronous appends take exactly one record.
    #[error("unsupported batch size {0}, asynchronous appends take exactly one record")]
    UnsupportedBatchSize(usize),

    #[error("record {0} not found")]
    RecordNotFound(i64),

    /// Handle was opened append-only.
    #[error("log is not readable in {0} mode")]
    NotReadable(IoMode),

    /// Handle was opened read-only.
    #[error("log is not writable in {0} mode")]
    NotWritable(IoMode),

    #[error("signature invalid")]
    SignatureInvalid,

    /// Record does not link to its predecessor.
    #[error("hash mismatch: expected previous hash {expected:?}, found {found:?}")]
    HashMismatch {
        expected: Option<Hash>,
        found: Option<Hash>,
    },

    /// Metadata can not be changed after the log was created.
    #[error("metadata is sealed")]
    MetadataSealed,

    #[error("metadata key {0} not found")]
    MetadataKeyNotFound(MetadataId),

    /// Owner or writer key is missing, or lacks the secret part it needs.
    #[error("missing {0} key material")]
    MissingKeyMaterial(KeyRole),

    /// Creation request was rejected.
    #[error("log creation failed: {0}")]
    CreationFailed(#[source] StoreError),

    /// No event arrived in time.
    #[error("timed out waiting for event")]
    Timeout,

    #[error(transparent)]
    Metadata(MetadataError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Store(StoreError),
}

impl GdpError {
    pub fn severity(&self) -> Severity {
        match self {
            GdpError::NameNotFound(_)
            | GdpError::HandleClosed
            | GdpError::HashChainMismatch { .. }
            | GdpError::UnsupportedBatchSize(_)
            | GdpError::RecordNotFound(_)
            | GdpError::NotReadable(_)
            | GdpError::NotWritable(_)
            | GdpError::MetadataKeyNotFound(_)
            | GdpError::Timeout => Severity::Warn,
            GdpError::InvalidNameFormat(_)
            | GdpError::SignatureInvalid
            | GdpError::HashMismatch { .. }
            | GdpError::MetadataSealed
            | GdpError::MissingKeyMaterial(_)
            | GdpError::Metadata(_)
            | GdpError::Key(_) => Severity::Error,
            GdpError::Open(err) => err.severity(),
            GdpError::CreationFailed(err) | GdpError::Store(err) => err.severity(),
        }
    }
}

impl From<StoreError> for GdpError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::HashChainMismatch { expected, found } => {
                GdpError::HashChainMismatch { expected, found }
            }
            StoreError::RecordNotFound(recno) => GdpError::RecordNotFound(recno as i64),
            StoreError::SignatureInvalid => GdpError::SignatureInvalid,
            StoreError::Metadata(err) => err.into(),
            err => GdpError::Store(err),
        }
    }
}

impl From<MetadataError> for GdpError {
    fn from(value: MetadataError) -> Self {
        match value {
            MetadataError::Sealed => GdpError::MetadataSealed,
            MetadataError::KeyNotFound(id) => GdpError::MetadataKeyNotFound(id),
            err => GdpError::Metadata(err),
        }
    }
}

impl From<DatumError> for GdpError {
    fn from(value: DatumError) -> Self {
        match value {
            DatumError::MissingSignature | DatumError::SignatureInvalid => {
                GdpError::SignatureInvalid
            }
            DatumError::HashMismatch { expected, found } => {
                GdpError::HashMismatch { expected, found }
            }
        }
    }
}

impl From<NameError> for GdpError {
    fn from(value: NameError) -> Self {
        GdpError::InvalidNameFormat(value.to_string())
    }
}

/// Reasons a log could not be opened.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("log {0} does not exist")]
    LogNotFound(GdpName),

    /// Handle would need a signing key matching the log's writer key.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Storage tier could not be reached or answered with an error.
    #[error("could not reach log: {0}")]
    Routing(#[source] StoreError),
}

impl OpenError {
    pub fn severity(&self) -> Severity {
        match self {
            OpenError::LogNotFound(_) | OpenError::PermissionDenied(_) => Severity::Error,
            OpenError::Routing(err) => err.severity().max(Severity::Error),
        }
    }
}

impl From<StoreError> for OpenError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::LogNotFound(name) => OpenError::LogNotFound(name),
            err => OpenError::Routing(err),
        }
    }
}

/// Surfaces failing store outcomes and drops informational ones.
pub(crate) fn surface<T>(result: Result<T, StoreError>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if !err.severity().is_failure() => {
            debug!(severity = %err.severity(), "ignore status: {err}");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
