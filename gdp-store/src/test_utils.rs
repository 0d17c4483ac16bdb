// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixtures for building signed logs and records without a session.
use gdp_core::{
    Datum, DigestAlgorithm, GdpName, Hash, KeyAlgorithm, KeyPair, KeyRole, Metadata, MetadataId,
    RecNo, Timestamp,
};

use crate::CreateRequest;

/// Metadata and fresh owner and writer keys of a log which was not created yet.
pub struct TestLog {
    pub name: GdpName,
    pub metadata: Metadata,
    pub owner: KeyPair,
    pub writer: KeyPair,
}

impl TestLog {
    pub fn new(external_name: &str) -> Self {
        Self::with_digest(external_name, DigestAlgorithm::Sha256)
    }

    pub fn with_digest(external_name: &str, digest: DigestAlgorithm) -> Self {
        let owner = KeyPair::generate(digest, KeyAlgorithm::Ed25519, 0, None)
            .expect("valid key parameters")
            .with_role(KeyRole::Owner);
        let writer = KeyPair::generate(digest, KeyAlgorithm::Ed25519, 0, None)
            .expect("valid key parameters")
            .with_role(KeyRole::Writer);

        let mut metadata = Metadata::new();
        metadata
            .add(MetadataId::XID, external_name)
            .expect("metadata not sealed");
        metadata
            .add(MetadataId::OWNER_PUBKEY, owner.to_metadata_value())
            .expect("metadata not sealed");
        metadata
            .add(MetadataId::WRITER_PUBKEY, writer.to_metadata_value())
            .expect("metadata not sealed");
        metadata.seal();

        Self {
            name: metadata.gdp_name(),
            metadata,
            owner,
            writer,
        }
    }

    /// Creation request signed by the owner.
    pub fn create_request(&self) -> CreateRequest {
        let bytes = self.metadata.to_bytes();
        let signature = self
            .owner
            .private_key()
            .expect("generated key has secret")
            .sign(&bytes, self.owner.digest());

        CreateRequest {
            name: self.name,
            metadata: bytes,
            signature,
        }
    }

    /// Record signed by the writer.
    pub fn datum(&self, recno: RecNo, payload: &[u8], prev_hash: Option<Hash>) -> Datum {
        let mut datum = Datum::new(payload);
        datum.set_recno(recno);
        datum.set_timestamp(Timestamp::now());
        datum.set_prev_hash(prev_hash);
        datum.sign(
            &self.name,
            self.writer.private_key().expect("generated key has secret"),
            self.writer.digest(),
        );
        datum
    }
}
