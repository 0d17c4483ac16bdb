// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reading and appending records of one log.
use gdp_core::{Datum, DigestAlgorithm, GdpName, Hash, PrivateKey, PublicKey, RecNo, Timestamp};
use gdp_store::LogStore;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::error::GdpError;

/// Reads records of a log, optionally verifying each of them.
#[derive(Clone)]
pub(crate) struct Reader<S> {
    store: S,
    name: GdpName,
    writer_key: PublicKey,
    verify: bool,
}

impl<S> Reader<S> {
    pub fn new(store: S, name: GdpName, writer_key: PublicKey, verify: bool) -> Self {
        Self {
            store,
            name,
            writer_key,
            verify,
        }
    }

    pub fn writer_key(&self) -> &PublicKey {
        &self.writer_key
    }
}

impl<S> Reader<S>
where
    S: LogStore,
{

    /// Receiver notified with the record number of every new record.
    pub async fn watch(&self) -> Result<broadcast::Receiver<RecNo>, GdpError> {
        Ok(self.store.watch(&self.name).await?)
    }

    pub async fn nrecs(&self) -> Result<RecNo, GdpError> {
        Ok(self.store.tail(&self.name).await?.nrecs)
    }

    /// Turns a positive record number or a negative offset from the tail into a record number.
    ///
    /// `-1` is the latest record. Offsets reaching before the first record resolve to `None`.
    pub async fn resolve(&self, recno: i64) -> Result<Option<RecNo>, GdpError> {
        if recno > 0 {
            return Ok(Some(recno as RecNo));
        }
        if recno == 0 {
            return Ok(None);
        }

        let nrecs = self.nrecs().await? as i64;
        let resolved = nrecs + 1 + recno;
        Ok((resolved > 0).then_some(resolved as RecNo))
    }

    pub async fn read(&self, recno: RecNo) -> Result<Datum, GdpError> {
        let datum = self.store.read(&self.name, recno).await?;
        if self.verify {
            self.verify(&datum).await?;
        }
        Ok(datum)
    }

    /// Checks the signature against the writer key and the link to the previous record.
    pub async fn verify(&self, datum: &Datum) -> Result<(), GdpError> {
        datum.verify(&self.name, &self.writer_key)?;

        let previous = match datum.recno() {
            0 | 1 => None,
            recno => Some(self.store.read(&self.name, recno - 1).await?),
        };
        datum.verify_chain(&self.name, previous.as_ref())?;

        trace!(name = %self.name, recno = datum.recno(), "verified record");
        Ok(())
    }
}

/// Signs and appends records with the writer key of a log.
#[derive(Clone)]
pub(crate) struct Writer<S> {
    store: S,
    name: GdpName,
    key: PrivateKey,
    digest: DigestAlgorithm,
}

impl<S> Writer<S>
where
    S: LogStore,
{
    pub fn new(store: S, name: GdpName, key: PrivateKey, digest: DigestAlgorithm) -> Self {
        Self {
            store,
            name,
            key,
            digest,
        }
    }

    /// Appends the datum after the current tail and returns its record number.
    ///
    /// Record number, timestamp, previous hash and signature of the datum are overwritten. When
    /// `prev_hash` is given it has to match the tail, otherwise the append is rejected with
    /// [`GdpError::HashChainMismatch`]. The storage tier repeats the check atomically, so of two
    /// writers racing on the same tail only one succeeds.
    pub async fn append(
        &self,
        datum: &mut Datum,
        prev_hash: Option<&Hash>,
    ) -> Result<RecNo, GdpError> {
        let tail = self.store.tail(&self.name).await?;
        if let Some(prev_hash) = prev_hash {
            if tail.hash.as_ref() != Some(prev_hash) {
                debug!(name = %self.name, nrecs = tail.nrecs, "append linked to stale tail");
                return Err(GdpError::HashChainMismatch {
                    expected: tail.hash,
                    found: Some(*prev_hash),
                });
            }
        }

        datum.set_recno(tail.nrecs + 1);
        datum.set_timestamp(Timestamp::now());
        datum.set_prev_hash(tail.hash);
        datum.sign(&self.name, &self.key, self.digest);

        let tail = self.store.append(&self.name, datum.clone()).await?;
        trace!(name = %self.name, recno = tail.nrecs, "appended record");

        Ok(tail.nrecs)
    }
}
