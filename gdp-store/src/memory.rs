// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory storage tier.
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use gdp_core::cbor::{decode_cbor, encode_cbor};
use gdp_core::{Datum, DigestAlgorithm, GdpName, Hash, Metadata, PublicKey, RecNo};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::traits::{CreateRequest, LogStore, LogTail};

/// Capacity of the per-log append notification channel.
const NOTIFY_CAPACITY: usize = 256;

struct StoredLog {
    metadata: Metadata,
    writer: PublicKey,
    digest: DigestAlgorithm,
    /// CBOR encoded records, index `n` holds record `n + 1`.
    records: Vec<Vec<u8>>,
    tail: Option<Hash>,
    notify: broadcast::Sender<RecNo>,
}

impl StoredLog {
    fn tail(&self) -> LogTail {
        LogTail {
            nrecs: self.records.len() as RecNo,
            hash: self.tail,
        }
    }
}

/// Logs held by a [`MemoryStore`].
#[derive(Default)]
pub struct InnerMemoryStore {
    logs: HashMap<GdpName, StoredLog>,
    offline: bool,
}

impl InnerMemoryStore {
    fn log(&self, name: &GdpName) -> Result<&StoredLog, StoreError> {
        if self.offline {
            return Err(StoreError::Unavailable);
        }
        self.logs.get(name).ok_or(StoreError::LogNotFound(*name))
    }

    fn log_mut(&mut self, name: &GdpName) -> Result<&mut StoredLog, StoreError> {
        if self.offline {
            return Err(StoreError::Unavailable);
        }
        self.logs.get_mut(name).ok_or(StoreError::LogNotFound(*name))
    }
}

/// An in-memory storage tier.
///
/// `MemoryStore` supports usage in asynchronous and multi-threaded contexts by wrapping an
/// `InnerMemoryStore` with an `RwLock` and `Arc`. All appends to a log go through the write lock,
/// which makes the tail check and the insertion of a record one atomic step.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<InnerMemoryStore>>,
}

impl MemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Obtain a read-lock on the store.
    pub fn read_store(&self) -> RwLockReadGuard<'_, InnerMemoryStore> {
        self.inner
            .read()
            .expect("acquire shared read access on store")
    }

    /// Obtain a write-lock on the store.
    pub fn write_store(&self) -> RwLockWriteGuard<'_, InnerMemoryStore> {
        self.inner
            .write()
            .expect("acquire exclusive write access on store")
    }

    /// Make the store unreachable (or reachable again), every request fails with
    /// [`StoreError::Unavailable`] while offline.
    pub fn set_offline(&self, offline: bool) {
        self.write_store().offline = offline;
    }

    /// Number of logs held by the store.
    pub fn len(&self) -> usize {
        self.read_store().logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("logs", &self.len())
            .finish()
    }
}

impl LogStore for MemoryStore {
    async fn create_log(&self, request: CreateRequest) -> Result<(), StoreError> {
        let metadata = Metadata::from_bytes(&request.metadata)?;
        if metadata.gdp_name() != request.name {
            return Err(StoreError::InvalidRequest(
                "log name does not match metadata".into(),
            ));
        }

        let owner = metadata.owner_key()?;
        if !owner
            .public_key()
            .verify(&request.metadata, &request.signature)
        {
            warn!(name = %request.name, "reject creation request with invalid signature");
            return Err(StoreError::AuthenticationFailed);
        }
        let writer = metadata.writer_key()?;

        let mut store = self.write_store();
        if store.offline {
            return Err(StoreError::Unavailable);
        }
        if store.logs.contains_key(&request.name) {
            return Err(StoreError::AlreadyExists(request.name));
        }

        debug!(name = %request.name, digest = %writer.digest(), "create log");
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        store.logs.insert(
            request.name,
            StoredLog {
                metadata,
                writer: writer.public_key(),
                digest: writer.digest(),
                records: Vec::new(),
                tail: None,
                notify,
            },
        );

        Ok(())
    }

    async fn metadata(&self, name: &GdpName) -> Result<Metadata, StoreError> {
        Ok(self.read_store().log(name)?.metadata.clone())
    }

    async fn tail(&self, name: &GdpName) -> Result<LogTail, StoreError> {
        Ok(self.read_store().log(name)?.tail())
    }

    async fn append(&self, name: &GdpName, datum: Datum) -> Result<LogTail, StoreError> {
        let mut store = self.write_store();
        let log = store.log_mut(name)?;

        let tail = log.tail();
        if datum.recno() != tail.nrecs + 1 || datum.prev_hash() != tail.hash.as_ref() {
            debug!(
                %name,
                recno = datum.recno(),
                nrecs = tail.nrecs,
                "reject record not extending the tail"
            );
            return Err(StoreError::HashChainMismatch {
                expected: tail.hash,
                found: datum.prev_hash().copied(),
            });
        }

        let signed_with_log_digest = datum
            .signature()
            .is_some_and(|signature| signature.algorithm() == log.digest);
        if !signed_with_log_digest || datum.verify(name, &log.writer).is_err() {
            warn!(%name, recno = datum.recno(), "reject record with invalid signature");
            return Err(StoreError::SignatureInvalid);
        }

        let hash = datum.hash(name, log.digest);
        log.records.push(encode_cbor(&datum)?);
        log.tail = Some(hash);

        // Nobody listening is fine.
        let _ = log.notify.send(datum.recno());

        Ok(log.tail())
    }

    async fn read(&self, name: &GdpName, recno: RecNo) -> Result<Datum, StoreError> {
        let store = self.read_store();
        let log = store.log(name)?;

        let bytes = recno
            .checked_sub(1)
            .and_then(|index| log.records.get(index as usize))
            .ok_or(StoreError::RecordNotFound(recno))?;

        Ok(decode_cbor(&bytes[..])?)
    }

    async fn watch(&self, name: &GdpName) -> Result<broadcast::Receiver<RecNo>, StoreError> {
        Ok(self.read_store().log(name)?.notify.subscribe())
    }
}
