// SPDX-License-Identifier: MIT OR Apache-2.0

//! Owner and writer key pairs: generation, key files and metadata encoding.
//!
//! Key files hold a PKCS#8 document for secret keys or a SubjectPublicKeyInfo document for public
//! keys, either DER encoded or PEM armored. Keys can be stored encrypted: a 256-bit key is derived
//! from a password with Argon2id and the DER document is sealed with XChaCha20-Poly1305. The
//! resulting envelope is CBOR encoded (and armored with the `GDP ENCRYPTED KEY` label in PEM
//! files).
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use argon2::Argon2;
use chacha20poly1305::{AeadInPlace, Key, KeyInit, XChaCha20Poly1305, XNonce};
use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::{SigningKey, VerifyingKey};
use pem_rfc7468::{self as pem, LineEnding};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use crate::hash::{DigestAlgorithm, HashError};
use crate::identity::{IdentityError, PUBLIC_KEY_LEN, PrivateKey, PublicKey};

const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";

const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";

const ENCRYPTED_KEY_LABEL: &str = "GDP ENCRYPTED KEY";

const SALT_LEN: usize = 16;

const NONCE_LEN: usize = 24;

/// Key size of ed25519 keys in bits.
pub const ED25519_BITS: u16 = 256;

/// Supported signature algorithms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    #[default]
    Ed25519,
}

impl KeyAlgorithm {
    /// Numeric identifier used in public key metadata entries.
    pub const fn id(&self) -> u8 {
        match self {
            KeyAlgorithm::Ed25519 => 4,
        }
    }

    pub fn from_id(id: u8) -> Result<Self, KeyError> {
        match id {
            4 => Ok(KeyAlgorithm::Ed25519),
            _ => Err(KeyError::UnsupportedAlgorithm(format!("key type {id}"))),
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::Ed25519 => write!(f, "ed25519"),
        }
    }
}

impl FromStr for KeyAlgorithm {
    type Err = KeyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "ed25519" => Ok(KeyAlgorithm::Ed25519),
            _ => Err(KeyError::UnsupportedAlgorithm(value.to_string())),
        }
    }
}

/// What a key is used for in a log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyRole {
    /// Signs the creation request and owns the log.
    Owner,

    /// Signs appended records.
    Writer,
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRole::Owner => write!(f, "owner"),
            KeyRole::Writer => write!(f, "writer"),
        }
    }
}

/// Encoding of key files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyFormat {
    #[default]
    Pem,
    Der,
}

impl KeyFormat {
    /// File extension conventionally used for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            KeyFormat::Pem => "pem",
            KeyFormat::Der => "der",
        }
    }
}

/// Which part of a key pair is read from or was written to a key file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPart {
    Public,
    Secret,
}

/// Encryption applied to key files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyEncryption {
    #[default]
    None,
    XChaCha20Poly1305,
}

impl FromStr for KeyEncryption {
    type Err = KeyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().replace('-', "").as_str() {
            "none" | "" => Ok(KeyEncryption::None),
            "xchacha20poly1305" => Ok(KeyEncryption::XChaCha20Poly1305),
            _ => Err(KeyError::UnsupportedAlgorithm(value.to_string())),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct EncryptedKey {
    part: KeyPart,
    #[serde(with = "serde_bytes")]
    salt: Vec<u8>,
    #[serde(with = "serde_bytes")]
    nonce: Vec<u8>,
    #[serde(with = "serde_bytes")]
    ciphertext: Vec<u8>,
}

/// Public key, optionally with its secret counterpart, and the digest algorithm of messages
/// signed with it.
///
/// A key pair is untagged until it is bound to a log as owner or writer key.
#[derive(Clone, Debug)]
pub struct KeyPair {
    algorithm: KeyAlgorithm,
    digest: DigestAlgorithm,
    role: Option<KeyRole>,
    public: PublicKey,
    secret: Option<PrivateKey>,
}

impl KeyPair {
    /// Generate a fresh key pair.
    ///
    /// `bits` may be zero (algorithm default) or the key size of the algorithm, `curve` is
    /// checked against the algorithm's curve when given.
    pub fn generate(
        digest: DigestAlgorithm,
        algorithm: KeyAlgorithm,
        bits: u32,
        curve: Option<&str>,
    ) -> Result<Self, KeyError> {
        match algorithm {
            KeyAlgorithm::Ed25519 => {
                if bits != 0 && bits != u32::from(ED25519_BITS) {
                    return Err(KeyError::UnsupportedParameters(format!(
                        "{bits} bit keys are not supported for {algorithm}"
                    )));
                }

                if let Some(curve) = curve {
                    let curve = curve.to_ascii_lowercase();
                    if curve != "ed25519" && curve != "curve25519" {
                        return Err(KeyError::UnsupportedParameters(format!(
                            "curve {curve} is not supported for {algorithm}"
                        )));
                    }
                }
            }
        }

        Ok(Self::from_private_key(PrivateKey::new(), digest))
    }

    pub fn from_private_key(private_key: PrivateKey, digest: DigestAlgorithm) -> Self {
        Self {
            algorithm: KeyAlgorithm::Ed25519,
            digest,
            role: None,
            public: private_key.public_key(),
            secret: Some(private_key),
        }
    }

    pub fn from_public_key(public_key: PublicKey, digest: DigestAlgorithm) -> Self {
        Self {
            algorithm: KeyAlgorithm::Ed25519,
            digest,
            role: None,
            public: public_key,
            secret: None,
        }
    }

    pub fn with_role(mut self, role: KeyRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn digest(&self) -> DigestAlgorithm {
        self.digest
    }

    pub fn role(&self) -> Option<KeyRole> {
        self.role
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub fn private_key(&self) -> Option<&PrivateKey> {
        self.secret.as_ref()
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    /// Read a key from a file.
    ///
    /// Encrypted PEM files are recognized by their label, encrypted DER files are assumed when a
    /// password is given. Loading a public key while asking for [`KeyPart::Secret`] fails,
    /// asking for [`KeyPart::Public`] drops any secret found in the file.
    pub fn load(
        path: impl AsRef<Path>,
        format: KeyFormat,
        part: KeyPart,
        password: Option<&str>,
    ) -> Result<Self, KeyError> {
        let bytes = Zeroizing::new(std::fs::read(path)?);

        let der = match format {
            KeyFormat::Pem => {
                let (label, body) = pem::decode_vec(&bytes).map_err(encoding_error)?;
                let body = Zeroizing::new(body);
                match label {
                    PRIVATE_KEY_LABEL | PUBLIC_KEY_LABEL => body,
                    ENCRYPTED_KEY_LABEL => open_envelope(&body, password)?,
                    other => return Err(KeyError::UnknownLabel(other.to_string())),
                }
            }
            KeyFormat::Der => match password {
                Some(_) => open_envelope(&bytes, password)?,
                None => bytes,
            },
        };

        let mut key_pair = Self::from_der(&der)?;
        match part {
            KeyPart::Secret if !key_pair.has_secret() => Err(KeyError::SecretKeyRequired),
            KeyPart::Secret => Ok(key_pair),
            KeyPart::Public => {
                key_pair.secret = None;
                Ok(key_pair)
            }
        }
    }

    /// Write the key to a file.
    ///
    /// Writes the secret key when present, otherwise the public key.
    pub fn save(
        &self,
        path: impl AsRef<Path>,
        format: KeyFormat,
        encryption: KeyEncryption,
        password: Option<&str>,
    ) -> Result<(), KeyError> {
        let (part, der) = self.to_der()?;

        let bytes = match encryption {
            KeyEncryption::None => {
                let label = match part {
                    KeyPart::Secret => PRIVATE_KEY_LABEL,
                    KeyPart::Public => PUBLIC_KEY_LABEL,
                };
                armor(format, label, &der)?
            }
            KeyEncryption::XChaCha20Poly1305 => {
                let password = password.ok_or(KeyError::PasswordRequired)?;
                let envelope = encode_cbor(&seal_envelope(part, &der, password)?)?;
                armor(format, ENCRYPTED_KEY_LABEL, &envelope)?
            }
        };

        std::fs::write(path, bytes.as_slice())?;
        Ok(())
    }

    /// Encode the public key as metadata value: digest id, key type, key size in bits (big
    /// endian) followed by the raw key bytes.
    pub fn to_metadata_value(&self) -> Vec<u8> {
        let mut value = Vec::with_capacity(4 + PUBLIC_KEY_LEN);
        value.push(self.digest.id());
        value.push(self.algorithm.id());
        value.extend_from_slice(&ED25519_BITS.to_be_bytes());
        value.extend_from_slice(self.public.as_bytes());
        value
    }

    /// Decode a public key metadata value.
    pub fn from_metadata_value(value: &[u8]) -> Result<Self, KeyError> {
        let [digest, algorithm, bits_hi, bits_lo, key @ ..] = value else {
            return Err(KeyError::InvalidMetadataValue(value.len()));
        };

        let digest = DigestAlgorithm::from_id(*digest)?;
        let algorithm = KeyAlgorithm::from_id(*algorithm)?;
        let bits = u16::from_be_bytes([*bits_hi, *bits_lo]);
        if bits != ED25519_BITS {
            return Err(KeyError::UnsupportedParameters(format!(
                "{bits} bit keys are not supported for {algorithm}"
            )));
        }

        let public = PublicKey::try_from(key)?;
        Ok(Self::from_public_key(public, digest))
    }

    fn to_der(&self) -> Result<(KeyPart, Zeroizing<Vec<u8>>), KeyError> {
        match &self.secret {
            Some(secret) => {
                let document = secret
                    .signing_key()
                    .to_pkcs8_der()
                    .map_err(encoding_error)?;
                Ok((KeyPart::Secret, Zeroizing::new(document.as_bytes().to_vec())))
            }
            None => {
                let document = self
                    .public
                    .verifying_key()
                    .to_public_key_der()
                    .map_err(encoding_error)?;
                Ok((KeyPart::Public, Zeroizing::new(document.as_bytes().to_vec())))
            }
        }
    }

    fn from_der(der: &[u8]) -> Result<Self, KeyError> {
        if let Ok(signing_key) = SigningKey::from_pkcs8_der(der) {
            return Ok(Self::from_private_key(
                signing_key.into(),
                DigestAlgorithm::default(),
            ));
        }

        let verifying_key = VerifyingKey::from_public_key_der(der).map_err(encoding_error)?;
        Ok(Self::from_public_key(
            verifying_key.into(),
            DigestAlgorithm::default(),
        ))
    }
}

/// Generate a fresh key pair, see [`KeyPair::generate`].
pub fn generate_key(
    digest: DigestAlgorithm,
    algorithm: KeyAlgorithm,
    bits: u32,
    curve: Option<&str>,
) -> Result<KeyPair, KeyError> {
    KeyPair::generate(digest, algorithm, bits, curve)
}

/// Read a key file, see [`KeyPair::load`].
pub fn load_key(
    path: impl AsRef<Path>,
    format: KeyFormat,
    part: KeyPart,
    password: Option<&str>,
) -> Result<KeyPair, KeyError> {
    KeyPair::load(path, format, part, password)
}

/// Write a key file, see [`KeyPair::save`].
pub fn save_key(
    key_pair: &KeyPair,
    path: impl AsRef<Path>,
    format: KeyFormat,
    encryption: KeyEncryption,
    password: Option<&str>,
) -> Result<(), KeyError> {
    key_pair.save(path, format, encryption, password)
}

fn armor(format: KeyFormat, label: &str, der: &[u8]) -> Result<Zeroizing<Vec<u8>>, KeyError> {
    match format {
        KeyFormat::Der => Ok(Zeroizing::new(der.to_vec())),
        KeyFormat::Pem => {
            let armored = pem::encode_string(label, LineEnding::LF, der).map_err(encoding_error)?;
            Ok(Zeroizing::new(armored.into_bytes()))
        }
    }
}

fn derive_key(password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, KeyError> {
    let mut key = Zeroizing::new([0; 32]);
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|err| KeyError::KeyDerivation(err.to_string()))?;
    Ok(key)
}

fn seal_envelope(part: KeyPart, der: &[u8], password: &str) -> Result<EncryptedKey, KeyError> {
    let mut salt = vec![0; SALT_LEN];
    let mut nonce = vec![0; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let key = derive_key(password, &salt)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key[..]));
    let mut ciphertext = der.to_vec();
    cipher
        .encrypt_in_place(XNonce::from_slice(&nonce), &[], &mut ciphertext)
        .map_err(|_| KeyError::Encryption)?;

    Ok(EncryptedKey {
        part,
        salt,
        nonce,
        ciphertext,
    })
}

fn open_envelope(bytes: &[u8], password: Option<&str>) -> Result<Zeroizing<Vec<u8>>, KeyError> {
    let password = password.ok_or(KeyError::PasswordRequired)?;
    let envelope: EncryptedKey = decode_cbor(bytes)?;
    if envelope.nonce.len() != NONCE_LEN {
        return Err(KeyError::Encoding(format!(
            "invalid nonce length {}",
            envelope.nonce.len()
        )));
    }

    let key = derive_key(password, &envelope.salt)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key[..]));
    let mut plaintext = Zeroizing::new(envelope.ciphertext);
    cipher
        .decrypt_in_place(XNonce::from_slice(&envelope.nonce), &[], &mut *plaintext)
        .map_err(|_| KeyError::Decryption)?;

    Ok(plaintext)
}

fn encoding_error(err: impl fmt::Display) -> KeyError {
    KeyError::Encoding(err.to_string())
}

/// Error types for key generation and key files.
#[derive(Error, Debug)]
pub enum KeyError {
    /// Reading or writing a key file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Algorithm is not supported.
    #[error("unsupported key algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    /// Key size or curve does not fit the algorithm.
    #[error("unsupported key parameters: {0}")]
    UnsupportedParameters(String),

    /// Key file could not be parsed or produced.
    #[error("invalid key encoding: {0}")]
    Encoding(String),

    /// PEM file carries a label which is not a key.
    #[error("unexpected PEM label '{0}'")]
    UnknownLabel(String),

    /// Key file is encrypted or encryption was requested, but no password was given.
    #[error("password required for encrypted key")]
    PasswordRequired,

    /// Password could not be turned into an encryption key.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("could not encrypt key")]
    Encryption,

    /// Wrong password or corrupted key file.
    #[error("could not decrypt key")]
    Decryption,

    /// Key file only holds a public key.
    #[error("key file does not contain a secret key")]
    SecretKeyRequired,

    /// Public key metadata value is too short.
    #[error("invalid public key metadata value of {0} bytes")]
    InvalidMetadataValue(usize),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}
