// SPDX-License-Identifier: MIT OR Apache-2.0

use gdp_core::{Datum, GdpName, Hash, Metadata, RecNo, Signature};
use tokio::sync::broadcast;

use crate::error::StoreError;

/// Signed request to create a log.
#[derive(Clone, Debug)]
pub struct CreateRequest {
    /// Name of the new log, must be the SHA-256 digest of `metadata`.
    pub name: GdpName,

    /// Serialized metadata table.
    pub metadata: Vec<u8>,

    /// Owner's signature over `metadata`.
    pub signature: Signature,
}

/// Current end of a log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogTail {
    /// Number of records, which is also the record number of the latest record.
    pub nrecs: RecNo,

    /// Hash of the latest record, `None` for an empty log.
    pub hash: Option<Hash>,
}

/// Interface of the storage tier holding logs.
pub trait LogStore: Clone + Send + Sync + 'static {
    /// Validates and stores a new log.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if the exact same log was created before.
    fn create_log(
        &self,
        request: CreateRequest,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Returns the sealed metadata of a log.
    fn metadata(&self, name: &GdpName) -> impl Future<Output = Result<Metadata, StoreError>> + Send;

    /// Returns the current end of a log.
    fn tail(&self, name: &GdpName) -> impl Future<Output = Result<LogTail, StoreError>> + Send;

    /// Appends a signed record and returns the new tail.
    ///
    /// The record must carry the next record number and link to the current tail hash,
    /// otherwise it is rejected with [`StoreError::HashChainMismatch`]. Its signature must verify
    /// against the writer key of the log.
    fn append(
        &self,
        name: &GdpName,
        datum: Datum,
    ) -> impl Future<Output = Result<LogTail, StoreError>> + Send;

    /// Returns a single record.
    fn read(
        &self,
        name: &GdpName,
        recno: RecNo,
    ) -> impl Future<Output = Result<Datum, StoreError>> + Send;

    /// Returns a receiver of record numbers, notified after each successful append.
    fn watch(
        &self,
        name: &GdpName,
    ) -> impl Future<Output = Result<broadcast::Receiver<RecNo>, StoreError>> + Send;
}

/// Interface of the name directory.
pub trait Directory: Clone + Send + Sync + 'static {
    /// Looks up the log registered under a human-readable name.
    fn lookup(
        &self,
        human_name: &str,
    ) -> impl Future<Output = Result<Option<GdpName>, StoreError>> + Send;

    /// Registers a human-readable name.
    ///
    /// Returns `true` if the entry was inserted and `false` if the same mapping existed
    /// already. Fails with [`StoreError::NameTaken`] if the name points at another log.
    fn register(
        &self,
        human_name: &str,
        name: GdpName,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;
}
