// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core data types of the Global Data Plane (GDP).
//!
//! The GDP is a distributed service of append-only logs. A log is named by a 256-bit
//! [`GdpName`], which is the SHA-256 digest of the [`Metadata`] the log was created with. Its
//! records ([`Datum`]) are numbered from 1, timestamped, linked into a hash chain and signed
//! with the log's writer key.
//!
//! ## Example
//!
//! ```
//! use gdp_core::{Datum, DigestAlgorithm, KeyAlgorithm, KeyPair, Metadata, MetadataId};
//!
//! let writer = KeyPair::generate(DigestAlgorithm::Sha256, KeyAlgorithm::Ed25519, 0, None)?;
//!
//! let mut metadata = Metadata::new();
//! metadata.add(MetadataId::XID, "edu.example.sensor")?;
//! metadata.add(MetadataId::WRITER_PUBKEY, writer.to_metadata_value())?;
//! metadata.seal();
//! let name = metadata.gdp_name();
//!
//! let mut datum = Datum::new(b"hello");
//! datum.set_recno(1);
//! datum.sign(&name, writer.private_key().unwrap(), writer.digest());
//!
//! assert!(datum.verify(&name, &writer.public_key()).is_ok());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
pub mod cbor;
pub mod datum;
pub mod hash;
pub mod identity;
pub mod keys;
pub mod metadata;
pub mod name;
mod serde;
pub mod status;

pub use datum::{Datum, DatumError, RecNo, Timestamp};
pub use hash::{DigestAlgorithm, Digester, Hash, HashError};
pub use identity::{IdentityError, PrivateKey, PublicKey, Signature};
pub use keys::{
    KeyAlgorithm, KeyEncryption, KeyError, KeyFormat, KeyPair, KeyPart, KeyRole, generate_key,
    load_key, save_key,
};
pub use metadata::{Metadata, MetadataError, MetadataId};
pub use name::{GdpName, NameError};
pub use status::Severity;
