// SPDX-License-Identifier: MIT OR Apache-2.0

//! Records ("datums") of a log.
//!
//! A datum is bound to its log and position by its digest:
//!
//! ```text
//! H(log name || recno || ts.secs || ts.nanos || ts.accuracy || prev_hash? || H(payload))
//! ```
//!
//! All integers are big endian, the accuracy is encoded through its IEEE 754 bits. The digest
//! doubles as the hash the next record links to, and it is what the writer signs.
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::{DigestAlgorithm, Hash};
use crate::identity::{PrivateKey, PublicKey, Signature};
use crate::name::GdpName;

/// Record number, starting at 1.
pub type RecNo = u64;

/// Wall clock time a record was committed at.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Timestamp {
    pub secs: i64,
    pub nanos: u32,
    /// Accuracy of the clock in seconds, zero if unknown.
    pub accuracy: f32,
}

impl Timestamp {
    pub fn new(secs: i64, nanos: u32, accuracy: f32) -> Self {
        Self {
            secs,
            nanos,
            accuracy,
        }
    }

    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            secs: elapsed.as_secs() as i64,
            nanos: elapsed.subsec_nanos(),
            accuracy: 0.0,
        }
    }
}

/// One record of a log.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Datum {
    recno: RecNo,
    timestamp: Option<Timestamp>,
    #[serde(with = "serde_bytes")]
    payload: Vec<u8>,
    prev_hash: Option<Hash>,
    signature: Option<Signature>,
}

impl Datum {
    /// Fresh datum holding a payload, to be appended to a log.
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            ..Default::default()
        }
    }

    /// Record number, zero if the datum was not appended yet.
    pub fn recno(&self) -> RecNo {
        self.recno
    }

    pub fn set_recno(&mut self, recno: RecNo) {
        self.recno = recno;
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = Some(timestamp);
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: impl Into<Vec<u8>>) {
        self.payload = payload.into();
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Hash of the previous record in the log, `None` for the first record.
    pub fn prev_hash(&self) -> Option<&Hash> {
        self.prev_hash.as_ref()
    }

    pub fn set_prev_hash(&mut self, prev_hash: Option<Hash>) {
        self.prev_hash = prev_hash;
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// Clear everything so the datum can be reused for another append.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Digest binding this datum to a log, its position and predecessor.
    pub fn digest(&self, name: &GdpName, algorithm: DigestAlgorithm) -> Hash {
        let timestamp = self.timestamp.unwrap_or_default();

        let mut digester = algorithm.digester();
        digester.update(name.as_bytes());
        digester.update(self.recno.to_be_bytes());
        digester.update(timestamp.secs.to_be_bytes());
        digester.update(timestamp.nanos.to_be_bytes());
        digester.update(timestamp.accuracy.to_bits().to_be_bytes());
        if let Some(prev_hash) = &self.prev_hash {
            digester.update(prev_hash.as_bytes());
        }
        digester.update(algorithm.hash(&self.payload).as_bytes());
        digester.finalize()
    }

    /// Hash the following record links to. Identical to the digest.
    pub fn hash(&self, name: &GdpName, algorithm: DigestAlgorithm) -> Hash {
        self.digest(name, algorithm)
    }

    /// Sign the digest with the log's writer key.
    pub fn sign(&mut self, name: &GdpName, private_key: &PrivateKey, algorithm: DigestAlgorithm) {
        let digest = self.digest(name, algorithm);
        self.signature = Some(private_key.sign(digest.as_bytes(), algorithm));
    }

    /// Check the signature against a writer key.
    pub fn verify(&self, name: &GdpName, public_key: &PublicKey) -> Result<(), DatumError> {
        let signature = self.signature.as_ref().ok_or(DatumError::MissingSignature)?;
        let digest = self.digest(name, signature.algorithm());
        if !public_key.verify(digest.as_bytes(), signature) {
            return Err(DatumError::SignatureInvalid);
        }
        Ok(())
    }

    /// Check that this datum links to `previous`, or is the first record when there is none.
    pub fn verify_chain(&self, name: &GdpName, previous: Option<&Datum>) -> Result<(), DatumError> {
        let expected = match previous {
            Some(previous) => {
                let algorithm = self
                    .prev_hash
                    .map(|hash| hash.algorithm())
                    .unwrap_or_default();
                if previous.recno + 1 != self.recno {
                    return Err(DatumError::HashMismatch {
                        expected: Some(previous.hash(name, algorithm)),
                        found: self.prev_hash,
                    });
                }
                Some(previous.hash(name, algorithm))
            }
            None => None,
        };

        if expected != self.prev_hash {
            return Err(DatumError::HashMismatch {
                expected,
                found: self.prev_hash,
            });
        }
        Ok(())
    }
}

/// Error types for `Datum` verification.
#[derive(Error, Debug)]
pub enum DatumError {
    /// Datum was never signed.
    #[error("datum carries no signature")]
    MissingSignature,

    /// Signature does not match the datum's digest and the given key.
    #[error("signature invalid")]
    SignatureInvalid,

    /// Datum does not link to the expected predecessor.
    #[error("hash chain broken: expected previous hash {expected:?}, found {found:?}")]
    HashMismatch {
        expected: Option<Hash>,
        found: Option<Hash>,
    },
}

#[cfg(test)]
mod tests {
    use crate::hash::DigestAlgorithm;
    use crate::identity::PrivateKey;
    use crate::name::GdpName;

    use super::{Datum, DatumError, Timestamp};

    fn name() -> GdpName {
        GdpName::from([3; 32])
    }

    fn signed(recno: u64, payload: &[u8], prev: Option<&Datum>, key: &PrivateKey) -> Datum {
        let mut datum = Datum::new(payload);
        datum.set_recno(recno);
        datum.set_timestamp(Timestamp::new(1_700_000_000, 42, 0.5));
        datum.set_prev_hash(prev.map(|prev| prev.hash(&name(), DigestAlgorithm::Sha256)));
        datum.sign(&name(), key, DigestAlgorithm::Sha256);
        datum
    }

    #[test]
    fn sign_and_verify() {
        let private_key = PrivateKey::new();
        let datum = signed(1, b"hello", None, &private_key);

        assert!(datum.verify(&name(), &private_key.public_key()).is_ok());
        assert!(matches!(
            datum.verify(&name(), &PrivateKey::new().public_key()),
            Err(DatumError::SignatureInvalid)
        ));

        // Signature is bound to the log name.
        let other_log = GdpName::from([4; 32]);
        assert!(matches!(
            datum.verify(&other_log, &private_key.public_key()),
            Err(DatumError::SignatureInvalid)
        ));
    }

    #[test]
    fn tampering_breaks_signature() {
        let private_key = PrivateKey::new();
        let mut datum = signed(1, b"hello", None, &private_key);
        datum.set_payload(b"HELLO".to_vec());
        assert!(matches!(
            datum.verify(&name(), &private_key.public_key()),
            Err(DatumError::SignatureInvalid)
        ));

        let mut datum = signed(1, b"hello", None, &private_key);
        datum.set_recno(2);
        assert!(datum.verify(&name(), &private_key.public_key()).is_err());
    }

    #[test]
    fn unsigned() {
        let datum = Datum::new(b"hello");
        assert!(matches!(
            datum.verify(&name(), &PrivateKey::new().public_key()),
            Err(DatumError::MissingSignature)
        ));
    }

    #[test]
    fn digest_inputs() {
        let mut datum = Datum::new(b"payload");
        datum.set_recno(1);
        let digest = datum.digest(&name(), DigestAlgorithm::Sha256);
        assert_eq!(digest, datum.hash(&name(), DigestAlgorithm::Sha256));

        datum.set_timestamp(Timestamp::new(0, 0, 0.1));
        assert_ne!(digest, datum.digest(&name(), DigestAlgorithm::Sha256));

        let blake3 = datum.digest(&name(), DigestAlgorithm::Blake3);
        assert_eq!(blake3.algorithm(), DigestAlgorithm::Blake3);
    }

    #[test]
    fn chain() {
        let private_key = PrivateKey::new();
        let first = signed(1, b"one", None, &private_key);
        let second = signed(2, b"two", Some(&first), &private_key);
        let third = signed(3, b"three", Some(&second), &private_key);

        assert!(first.verify_chain(&name(), None).is_ok());
        assert!(second.verify_chain(&name(), Some(&first)).is_ok());
        assert!(third.verify_chain(&name(), Some(&second)).is_ok());

        assert!(matches!(
            third.verify_chain(&name(), Some(&first)),
            Err(DatumError::HashMismatch { .. })
        ));
        assert!(matches!(
            second.verify_chain(&name(), None),
            Err(DatumError::HashMismatch { expected: None, .. })
        ));
    }

    #[test]
    fn reset() {
        let mut datum = signed(1, b"one", None, &PrivateKey::new());
        datum.reset();
        assert_eq!(datum, Datum::default());
        assert!(datum.is_empty());
    }
}
