// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message digests used to name logs and to link records into a hash chain.
//!
//! Every log picks one [`DigestAlgorithm`] when it is created (it is stored next to the writer key
//! in the log's metadata). All record digests of that log are computed with it, which is why a
//! [`Hash`] always carries the algorithm it was produced with.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::Digest;
use thiserror::Error;

/// Largest digest produced by any supported algorithm (SHA-512).
pub const MAX_DIGEST_LEN: usize = 64;

/// Supported message digest algorithms.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
    Blake3,
}

impl DigestAlgorithm {
    /// Numeric identifier used in metadata entries and tagged hash encodings.
    pub const fn id(&self) -> u8 {
        match self {
            DigestAlgorithm::Sha256 => 1,
            DigestAlgorithm::Sha384 => 2,
            DigestAlgorithm::Sha512 => 3,
            DigestAlgorithm::Blake3 => 4,
        }
    }

    pub fn from_id(id: u8) -> Result<Self, HashError> {
        match id {
            1 => Ok(DigestAlgorithm::Sha256),
            2 => Ok(DigestAlgorithm::Sha384),
            3 => Ok(DigestAlgorithm::Sha512),
            4 => Ok(DigestAlgorithm::Blake3),
            _ => Err(HashError::UnknownAlgorithm(id)),
        }
    }

    /// Length of digests in bytes.
    pub const fn digest_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 | DigestAlgorithm::Blake3 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    /// Returns a hasher for incremental digest computation.
    pub fn digester(&self) -> Digester {
        match self {
            DigestAlgorithm::Sha256 => Digester::Sha256(sha2::Sha256::new()),
            DigestAlgorithm::Sha384 => Digester::Sha384(sha2::Sha384::new()),
            DigestAlgorithm::Sha512 => Digester::Sha512(sha2::Sha512::new()),
            DigestAlgorithm::Blake3 => Digester::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    /// Calculate the digest of the provided bytes.
    pub fn hash(&self, buf: impl AsRef<[u8]>) -> Hash {
        let mut digester = self.digester();
        digester.update(buf);
        digester.finalize()
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha384 => "sha384",
            DigestAlgorithm::Sha512 => "sha512",
            DigestAlgorithm::Blake3 => "blake3",
        };
        write!(f, "{name}")
    }
}

impl FromStr for DigestAlgorithm {
    type Err = HashError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "sha384" => Ok(DigestAlgorithm::Sha384),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            "blake3" => Ok(DigestAlgorithm::Blake3),
            _ => Err(HashError::UnknownAlgorithmName(value.to_string())),
        }
    }
}

/// Incremental hasher for one of the supported algorithms.
pub enum Digester {
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl Digester {
    pub fn update(&mut self, buf: impl AsRef<[u8]>) {
        let buf = buf.as_ref();
        match self {
            Digester::Sha256(hasher) => hasher.update(buf),
            Digester::Sha384(hasher) => hasher.update(buf),
            Digester::Sha512(hasher) => hasher.update(buf),
            Digester::Blake3(hasher) => {
                hasher.update(buf);
            }
        }
    }

    pub fn finalize(self) -> Hash {
        match self {
            Digester::Sha256(hasher) => {
                Hash::from_parts(DigestAlgorithm::Sha256, hasher.finalize().as_slice())
            }
            Digester::Sha384(hasher) => {
                Hash::from_parts(DigestAlgorithm::Sha384, hasher.finalize().as_slice())
            }
            Digester::Sha512(hasher) => {
                Hash::from_parts(DigestAlgorithm::Sha512, hasher.finalize().as_slice())
            }
            Digester::Blake3(hasher) => {
                Hash::from_parts(DigestAlgorithm::Blake3, hasher.finalize().as_bytes())
            }
        }
    }
}

/// Digest of bytes, tagged with the algorithm which produced it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash {
    algorithm: DigestAlgorithm,
    digest: [u8; MAX_DIGEST_LEN],
}

impl Hash {
    /// Calculate the hash of the provided bytes.
    pub fn new(algorithm: DigestAlgorithm, buf: impl AsRef<[u8]>) -> Self {
        algorithm.hash(buf)
    }

    /// Create a `Hash` from raw digest bytes.
    pub fn from_digest(algorithm: DigestAlgorithm, bytes: &[u8]) -> Result<Self, HashError> {
        let expected = algorithm.digest_len();
        if bytes.len() != expected {
            return Err(HashError::InvalidLength(bytes.len(), expected));
        }
        Ok(Self::from_parts(algorithm, bytes))
    }

    /// Decode the encoding produced by [`Hash::to_tagged_bytes`].
    pub fn from_tagged_bytes(bytes: &[u8]) -> Result<Self, HashError> {
        let Some((id, digest)) = bytes.split_first() else {
            return Err(HashError::InvalidLength(0, 1));
        };
        Self::from_digest(DigestAlgorithm::from_id(*id)?, digest)
    }

    fn from_parts(algorithm: DigestAlgorithm, bytes: &[u8]) -> Self {
        let mut digest = [0; MAX_DIGEST_LEN];
        digest[..bytes.len()].copy_from_slice(bytes);
        Self { algorithm, digest }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Bytes of the digest.
    pub fn as_bytes(&self) -> &[u8] {
        &self.digest[..self.algorithm.digest_len()]
    }

    /// Algorithm id followed by the digest bytes.
    pub fn to_tagged_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + self.algorithm.digest_len());
        bytes.push(self.algorithm.id());
        bytes.extend_from_slice(self.as_bytes());
        bytes
    }

    /// Convert the digest to a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl TryFrom<&[u8]> for Hash {
    type Error = HashError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::from_tagged_bytes(value)
    }
}

/// Parses the `<algorithm>:<hex>` form written by `Display`.
impl FromStr for Hash {
    type Err = HashError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (algorithm, digest) = value
            .split_once(':')
            .ok_or_else(|| HashError::UnknownAlgorithmName(value.to_string()))?;
        Self::from_digest(algorithm.parse()?, &hex::decode(digest)?)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hash")
            .field(&self.algorithm)
            .field(&self.to_hex())
            .finish()
    }
}

/// Error types for `Hash` and `DigestAlgorithm`.
#[derive(Error, Debug)]
pub enum HashError {
    /// Digest has an invalid length.
    #[error("invalid hash length {0} bytes, expected {1} bytes")]
    InvalidLength(usize, usize),

    /// Hash string contains invalid hexadecimal characters.
    #[error("invalid hex encoding in hash string")]
    InvalidHexEncoding(#[from] hex::FromHexError),

    /// Numeric algorithm identifier is not known.
    #[error("unknown digest algorithm id {0}")]
    UnknownAlgorithm(u8),

    /// Algorithm name is not known.
    #[error("unknown digest algorithm '{0}'")]
    UnknownAlgorithmName(String),
}
