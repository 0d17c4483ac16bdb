// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parameters for creating and opening logs.
use std::fmt;
use std::path::{Path, PathBuf};

use gdp_core::{
    DigestAlgorithm, GdpName, KeyAlgorithm, KeyEncryption, KeyError, KeyFormat, KeyPair, KeyRole,
    Metadata, MetadataId, Timestamp,
};
use gdp_store::CreateRequest;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::GdpError;

/// Length of the random nonce making every log unique.
const NONCE_LEN: usize = 16;

/// Where the keys of a new log are written to.
#[derive(Clone)]
struct KeyStorage {
    dir: PathBuf,
    format: KeyFormat,
    encryption: KeyEncryption,
    password: Option<Zeroizing<String>>,
}

impl fmt::Debug for KeyStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStorage")
            .field("dir", &self.dir)
            .field("format", &self.format)
            .field("encryption", &self.encryption)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Metadata and keys of a log to be created with [`Gdp::create`].
///
/// Owner and writer keys are both required. The owner key signs the creation request, the writer
/// key every record appended later. The same key pair may be used for both.
///
/// [`Gdp::create`]: crate::Gdp::create
#[derive(Clone, Debug, Default)]
pub struct CreateInfo {
    metadata: Metadata,
    owner: Option<KeyPair>,
    writer: Option<KeyPair>,
    creation_service: Option<String>,
    key_storage: Option<KeyStorage>,
}

impl CreateInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records who created the log as `user@domain`.
    pub fn set_creator(&mut self, user: &str, domain: &str) -> Result<(), GdpError> {
        self.add_metadata(MetadataId::CREATOR, format!("{user}@{domain}"))
    }

    /// Sets the expiration time of the log in seconds since the epoch.
    pub fn set_expiration(&mut self, secs: u64) -> Result<(), GdpError> {
        self.add_metadata(MetadataId::EXPIRE, secs.to_be_bytes())
    }

    /// Names the service the log should be created on.
    pub fn set_creation_service(&mut self, service: &str) {
        self.creation_service = Some(service.to_string());
    }

    pub fn creation_service(&self) -> Option<&str> {
        self.creation_service.as_deref()
    }

    pub fn new_owner_key(
        &mut self,
        digest: DigestAlgorithm,
        algorithm: KeyAlgorithm,
        bits: u32,
        curve: Option<&str>,
    ) -> Result<(), GdpError> {
        let key_pair = KeyPair::generate(digest, algorithm, bits, curve)?;
        self.owner = Some(key_pair.with_role(KeyRole::Owner));
        Ok(())
    }

    pub fn new_writer_key(
        &mut self,
        digest: DigestAlgorithm,
        algorithm: KeyAlgorithm,
        bits: u32,
        curve: Option<&str>,
    ) -> Result<(), GdpError> {
        let key_pair = KeyPair::generate(digest, algorithm, bits, curve)?;
        self.writer = Some(key_pair.with_role(KeyRole::Writer));
        Ok(())
    }

    /// Uses an existing key as owner key. It needs its secret part to sign the creation request.
    pub fn set_owner_key(&mut self, key_pair: KeyPair, digest: DigestAlgorithm) {
        self.owner = Some(key_pair.with_digest(digest).with_role(KeyRole::Owner));
    }

    /// Uses an existing key as writer key, the public part is sufficient.
    pub fn set_writer_key(&mut self, key_pair: KeyPair, digest: DigestAlgorithm) {
        self.writer = Some(key_pair.with_digest(digest).with_role(KeyRole::Writer));
    }

    pub fn owner_key(&self) -> Option<&KeyPair> {
        self.owner.as_ref()
    }

    pub fn writer_key(&self) -> Option<&KeyPair> {
        self.writer.as_ref()
    }

    /// Writes owner and writer key to `dir` after the log was created.
    ///
    /// Files are named after the printable log name, `<name>-owner.<ext>` and
    /// `<name>-writer.<ext>`.
    pub fn save_keys(
        &mut self,
        dir: impl AsRef<Path>,
        format: KeyFormat,
        encryption: KeyEncryption,
        password: Option<&str>,
    ) -> Result<(), GdpError> {
        if encryption != KeyEncryption::None && password.is_none() {
            return Err(KeyError::PasswordRequired.into());
        }

        self.key_storage = Some(KeyStorage {
            dir: dir.as_ref().to_path_buf(),
            format,
            encryption,
            password: password.map(|password| Zeroizing::new(password.to_string())),
        });
        Ok(())
    }

    /// Adds a metadata entry, fails once the log was created.
    pub fn add_metadata(
        &mut self,
        id: MetadataId,
        value: impl Into<Vec<u8>>,
    ) -> Result<(), GdpError> {
        Ok(self.metadata.add(id, value)?)
    }

    /// Metadata of the log, complete and sealed after creation.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Builds the signed creation request.
    ///
    /// Adds external name, creation time, a nonce and both public keys to a copy of the metadata
    /// and seals it. The info itself is left untouched until [`CreateInfo::finish`].
    pub(crate) fn prepare(
        &self,
        external_name: &str,
    ) -> Result<(CreateRequest, Metadata), GdpError> {
        if self.metadata.is_sealed() {
            return Err(GdpError::MetadataSealed);
        }

        let owner = self
            .owner
            .as_ref()
            .ok_or(GdpError::MissingKeyMaterial(KeyRole::Owner))?;
        let owner_secret = owner
            .private_key()
            .ok_or(GdpError::MissingKeyMaterial(KeyRole::Owner))?;
        let writer = self
            .writer
            .as_ref()
            .ok_or(GdpError::MissingKeyMaterial(KeyRole::Writer))?;

        let mut metadata = self.metadata.clone();
        metadata.add(MetadataId::XID, external_name)?;
        if !metadata.contains(MetadataId::CTIME) {
            metadata.add(MetadataId::CTIME, Timestamp::now().secs.to_be_bytes())?;
        }
        metadata.add(MetadataId::NONCE, rand::random::<[u8; NONCE_LEN]>())?;
        metadata.add(MetadataId::OWNER_PUBKEY, owner.to_metadata_value())?;
        metadata.add(MetadataId::WRITER_PUBKEY, writer.to_metadata_value())?;
        metadata.seal();

        let bytes = metadata.to_bytes();
        let request = CreateRequest {
            name: metadata.gdp_name(),
            signature: owner_secret.sign(&bytes, owner.digest()),
            metadata: bytes,
        };
        Ok((request, metadata))
    }

    /// Takes over the metadata of the created log and writes the keys if requested.
    pub(crate) fn finish(&mut self, metadata: Metadata) -> Result<(), GdpError> {
        let name = metadata.gdp_name();
        self.metadata = metadata;

        let Some(storage) = &self.key_storage else {
            return Ok(());
        };

        let keys = [("owner", &self.owner), ("writer", &self.writer)];
        for (role, key_pair) in keys {
            let Some(key_pair) = key_pair else {
                continue;
            };

            let path = key_path(&storage.dir, &name, role, storage.format);
            key_pair.save(
                &path,
                storage.format,
                storage.encryption,
                storage.password.as_ref().map(|password| password.as_str()),
            )?;
            debug!(path = %path.display(), role, "saved key");
        }

        Ok(())
    }
}

/// Path of a key file written on log creation.
pub fn key_path(dir: &Path, name: &GdpName, role: &str, format: KeyFormat) -> PathBuf {
    dir.join(format!(
        "{}-{role}.{}",
        name.to_printable(),
        format.extension()
    ))
}

/// Options for opening a log with [`Gdp::open`].
///
/// [`Gdp::open`]: crate::Gdp::open
#[derive(Clone, Debug, Default)]
pub struct OpenInfo {
    signing_key: Option<KeyPair>,
    caching: bool,
    verify: Option<bool>,
}

impl OpenInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key signing appended records. Required when opening for appending, its public part has
    /// to match the writer key of the log.
    pub fn set_signing_key(&mut self, key_pair: KeyPair) -> &mut Self {
        self.signing_key = Some(key_pair);
        self
    }

    /// Reuse metadata of logs opened before in this session.
    pub fn set_caching(&mut self, caching: bool) -> &mut Self {
        self.caching = caching;
        self
    }

    /// Verify signature and chain link of every record read or delivered. Defaults to the
    /// session configuration.
    pub fn set_verify(&mut self, verify: bool) -> &mut Self {
        self.verify = Some(verify);
        self
    }

    pub(crate) fn signing_key(&self) -> Option<&KeyPair> {
        self.signing_key.as_ref()
    }

    pub(crate) fn caching(&self) -> bool {
        self.caching
    }

    pub(crate) fn verify(&self) -> Option<bool> {
        self.verify
    }
}

#[cfg(test)]
mod tests {
    use gdp_core::{
        DigestAlgorithm, KeyAlgorithm, KeyEncryption, KeyFormat, KeyPart, KeyPair, KeyRole,
        Metadata, MetadataId,
    };

    use crate::error::GdpError;

    use super::{CreateInfo, key_path};

    fn create_info() -> CreateInfo {
        let mut info = CreateInfo::new();
        info.new_owner_key(DigestAlgorithm::Sha256, KeyAlgorithm::Ed25519, 0, None)
            .unwrap();
        info.new_writer_key(DigestAlgorithm::Sha256, KeyAlgorithm::Ed25519, 256, Some("ed25519"))
            .unwrap();
        info
    }

    #[test]
    fn prepare_request() {
        let mut info = create_info();
        info.set_creator("alice", "example.org").unwrap();
        info.set_expiration(1_900_000_000).unwrap();

        let (request, metadata) = info.prepare("edu.example.prepare").expect("no errors");
        assert!(metadata.is_sealed());
        assert_eq!(request.name, metadata.gdp_name());
        assert_eq!(metadata.external_name(), Some("edu.example.prepare"));
        assert_eq!(
            metadata.find(MetadataId::CREATOR).unwrap(),
            b"alice@example.org"
        );
        for id in [
            MetadataId::CTIME,
            MetadataId::NONCE,
            MetadataId::OWNER_PUBKEY,
            MetadataId::WRITER_PUBKEY,
        ] {
            assert!(metadata.contains(id), "{id} missing");
        }

        let owner = info.owner_key().unwrap();
        assert!(owner.public_key().verify(&request.metadata, &request.signature));
        assert_eq!(Metadata::from_bytes(&request.metadata).unwrap(), metadata);

        // Info itself stays open until the log was created.
        assert!(!info.metadata().is_sealed());
        info.add_metadata(MetadataId::SYNTAX, "json").unwrap();
    }

    #[test]
    fn nonce_makes_names_unique() {
        let info = create_info();
        let (first, _) = info.prepare("edu.example.same").unwrap();
        let (second, _) = info.prepare("edu.example.same").unwrap();
        assert_ne!(first.name, second.name);
    }

    #[test]
    fn missing_key_material() {
        let mut info = CreateInfo::new();
        assert!(matches!(
            info.prepare("edu.example.keys"),
            Err(GdpError::MissingKeyMaterial(KeyRole::Owner))
        ));

        // Owner key without its secret can not sign.
        let owner = KeyPair::generate(DigestAlgorithm::Sha256, KeyAlgorithm::Ed25519, 0, None)
            .unwrap();
        let public_only = KeyPair::from_public_key(owner.public_key(), DigestAlgorithm::Sha256);
        info.set_owner_key(public_only, DigestAlgorithm::Sha256);
        assert!(matches!(
            info.prepare("edu.example.keys"),
            Err(GdpError::MissingKeyMaterial(KeyRole::Owner))
        ));

        info.set_owner_key(owner, DigestAlgorithm::Sha256);
        assert!(matches!(
            info.prepare("edu.example.keys"),
            Err(GdpError::MissingKeyMaterial(KeyRole::Writer))
        ));
    }

    #[test]
    fn sealed_after_finish() {
        let mut info = create_info();
        let (_, metadata) = info.prepare("edu.example.sealed").unwrap();
        info.finish(metadata).expect("no errors");

        assert!(matches!(
            info.add_metadata(MetadataId::SYNTAX, "json"),
            Err(GdpError::MetadataSealed)
        ));
        assert!(matches!(
            info.prepare("edu.example.sealed"),
            Err(GdpError::MetadataSealed)
        ));
    }

    #[test]
    fn save_keys_on_finish() {
        let dir = tempfile::tempdir().unwrap();
        let mut info = create_info();

        assert!(matches!(
            info.save_keys(dir.path(), KeyFormat::Pem, KeyEncryption::XChaCha20Poly1305, None),
            Err(GdpError::Key(_))
        ));
        info.save_keys(
            dir.path(),
            KeyFormat::Pem,
            KeyEncryption::XChaCha20Poly1305,
            Some("secret"),
        )
        .unwrap();

        let (request, metadata) = info.prepare("edu.example.save").unwrap();
        info.finish(metadata).unwrap();

        let path = key_path(dir.path(), &request.name, "writer", KeyFormat::Pem);
        let writer = KeyPair::load(&path, KeyFormat::Pem, KeyPart::Secret, Some("secret"))
            .expect("no errors");
        assert_eq!(writer.public_key(), info.writer_key().unwrap().public_key());

        let path = key_path(dir.path(), &request.name, "owner", KeyFormat::Pem);
        assert!(path.exists());
    }
}
