// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use gdp_core::{GdpName, Metadata};
use gdp_store::{Directory, LogStore, MemoryDirectory, StoreError};
use tracing::debug;

use crate::builder::GdpBuilder;
use crate::error::{GdpError, OpenError, surface};
use crate::event::{Event, EventQueue};
use crate::gin::{Gin, IoMode, OpenLog};
use crate::info::{CreateInfo, OpenInfo};
use crate::io::{Reader, Writer};
use crate::registry::{GinId, Registry};
use crate::resolver::NameResolver;

/// Session with the Global Data Plane.
///
/// A session opens and creates logs on a storage tier and owns the event queue all asynchronous
/// results of its handles are delivered to. Dropping the session closes every handle still open.
pub struct Gdp<S, D = MemoryDirectory> {
    store: S,
    resolver: NameResolver<D>,
    config: Config,
    events: Arc<EventQueue>,
    registry: Arc<Mutex<Registry<Gin<S>>>>,
    metadata_cache: RwLock<HashMap<GdpName, Metadata>>,
}

impl<S> Gdp<S>
where
    S: LogStore,
{
    pub fn builder(store: S) -> GdpBuilder<S> {
        GdpBuilder::new(store)
    }

    /// Session with default configuration and without name directory.
    pub fn new(store: S) -> Self {
        Self::builder(store).build()
    }
}

impl<S, D> Gdp<S, D>
where
    S: LogStore,
    D: Directory,
{
    pub(crate) fn from_parts(store: S, directory: Option<D>, config: Config) -> Self {
        Self {
            store,
            resolver: NameResolver::new(directory, config.name_root.clone()),
            config,
            events: Arc::new(EventQueue::new()),
            registry: Arc::new(Mutex::new(Registry::new())),
            metadata_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Parses a printable log name or resolves a human-readable one.
    pub async fn parse_name(&self, name: &str) -> Result<GdpName, GdpError> {
        self.resolver.parse(name).await
    }

    async fn fetch_metadata(&self, name: &GdpName, caching: bool) -> Result<Metadata, OpenError> {
        if caching {
            let cache = self
                .metadata_cache
                .read()
                .expect("acquire shared read access on metadata cache");
            if let Some(metadata) = cache.get(name) {
                return Ok(metadata.clone());
            }
        }

        let metadata = self.store.metadata(name).await?;
        if caching {
            self.cache_metadata(name, &metadata);
        }
        Ok(metadata)
    }

    fn cache_metadata(&self, name: &GdpName, metadata: &Metadata) {
        self.metadata_cache
            .write()
            .expect("acquire exclusive write access on metadata cache")
            .insert(*name, metadata.clone());
    }

    /// Opens a log.
    ///
    /// Appending requires a signing key in `info` matching the writer key of the log. Nothing is
    /// left behind when opening fails.
    pub async fn open(
        &self,
        name: &GdpName,
        mode: IoMode,
        info: &OpenInfo,
    ) -> Result<Gin<S>, GdpError> {
        let metadata = self.fetch_metadata(name, info.caching()).await?;
        let writer_key = metadata.writer_key()?;

        let writer = if mode.is_writable() {
            let key = info
                .signing_key()
                .and_then(|key_pair| key_pair.private_key())
                .ok_or_else(|| {
                    OpenError::PermissionDenied(format!("{mode} requires a secret signing key"))
                })?;
            if key.public_key() != writer_key.public_key() {
                return Err(OpenError::PermissionDenied(
                    "signing key does not match writer key of log".into(),
                )
                .into());
            }
            Some(Writer::new(
                self.store.clone(),
                *name,
                key.clone(),
                writer_key.digest(),
            ))
        } else {
            None
        };

        let verify = info.verify().unwrap_or(self.config.verify_by_default);
        let reader = Reader::new(self.store.clone(), *name, writer_key.public_key(), verify);

        let gin = {
            let weak = Arc::downgrade(&self.registry);
            let mut registry = self.registry();
            registry
                .insert_with(|id| {
                    let log = OpenLog::new(
                        id,
                        *name,
                        metadata,
                        reader,
                        writer,
                        &self.events,
                        self.config.append_queue_len,
                    );
                    Gin::new(id, *name, mode, log, self.events.clone(), weak)
                })
                .to_owned_handle()
        };

        debug!(%name, %mode, gin = %gin.id(), verify, "open log");
        Ok(gin)
    }

    /// Creates a log and registers its external name, returns the name of the new log.
    ///
    /// The metadata of `info` is completed and sealed, afterwards it can not be changed anymore.
    pub async fn create(
        &self,
        info: &mut CreateInfo,
        external_name: &str,
    ) -> Result<GdpName, GdpError> {
        let external_name = self.resolver.qualify(external_name);
        if self.resolver.lookup(&external_name).await?.is_some() {
            return Err(GdpError::CreationFailed(StoreError::NameTaken(
                external_name,
            )));
        }

        let (request, metadata) = info.prepare(&external_name)?;
        let name = request.name;
        debug!(
            %name,
            %external_name,
            service = info.creation_service(),
            "create log"
        );

        surface(self.store.create_log(request).await).map_err(GdpError::CreationFailed)?;
        self.resolver
            .update(&external_name, name)
            .await
            .map_err(|err| match err {
                GdpError::Store(err) => GdpError::CreationFailed(err),
                err => err,
            })?;

        self.cache_metadata(&name, &metadata);
        info.finish(metadata)?;

        Ok(name)
    }

    /// Waits for the next event, of one handle or of any. A zero timeout waits forever.
    pub async fn next_event(
        &self,
        gin: Option<&Gin<S>>,
        timeout: Duration,
    ) -> Result<Event, GdpError> {
        match gin {
            Some(gin) => gin.next_event(timeout).await,
            None => self.events.next(None, timeout).await,
        }
    }
}

impl<S, D> Gdp<S, D> {
    fn registry(&self) -> MutexGuard<'_, Registry<Gin<S>>> {
        self.registry
            .lock()
            .expect("acquire exclusive access on handle registry")
    }

    pub fn resolver(&self) -> &NameResolver<D> {
        &self.resolver
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Handle of an open log, not owning it. Ids of closed handles resolve to `None`.
    pub fn gin(&self, id: GinId) -> Option<Gin<S>> {
        self.registry().get(id).cloned()
    }

    pub fn open_handles(&self) -> usize {
        self.registry().len()
    }

    /// Number of undelivered events.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Closes all open handles.
    pub fn shutdown(&self) {
        let gins: Vec<Gin<S>> = self.registry().values().cloned().collect();
        if gins.is_empty() {
            return;
        }

        debug!(handles = gins.len(), "shut down session");
        for gin in gins {
            gin.close();
        }
    }
}

impl<S, D> Drop for Gdp<S, D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Root qualifying human-readable names without a dot.
    pub name_root: Option<String>,

    /// Asynchronous appends a handle queues before `append_async` waits.
    pub append_queue_len: usize,

    /// Verify records on read and delivery unless the handle was opened with an explicit choice.
    pub verify_by_default: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name_root: None,
            append_queue_len: 64,
            verify_by_default: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use gdp_core::{Datum, DigestAlgorithm, KeyAlgorithm, KeyPair};
    use gdp_store::{MemoryDirectory, MemoryStore};

    use crate::error::{GdpError, OpenError};
    use crate::gin::IoMode;
    use crate::info::{CreateInfo, OpenInfo};

    use super::Gdp;

    fn create_info() -> CreateInfo {
        let mut info = CreateInfo::new();
        info.new_owner_key(DigestAlgorithm::Sha256, KeyAlgorithm::Ed25519, 0, None)
            .unwrap();
        info.new_writer_key(DigestAlgorithm::Sha256, KeyAlgorithm::Ed25519, 0, None)
            .unwrap();
        info
    }

    fn signing_key(info: &CreateInfo) -> OpenInfo {
        let mut open_info = OpenInfo::new();
        open_info.set_signing_key(info.writer_key().unwrap().clone());
        open_info
    }

    #[tokio::test]
    async fn open_and_close() {
        let gdp = Gdp::new(MemoryStore::new());
        let mut info = create_info();
        let name = gdp.create(&mut info, "edu.example.session").await.unwrap();

        let gin = gdp
            .open(&name, IoMode::ReadAppend, &signing_key(&info))
            .await
            .expect("no errors");
        assert!(gin.is_owner());
        assert_eq!(gdp.open_handles(), 1);

        let view = gdp.gin(gin.id()).expect("registered handle");
        assert!(!view.is_owner());
        drop(view);
        assert!(!gin.is_closed());

        gin.close();
        assert!(gdp.gin(gin.id()).is_none());
        assert_eq!(gdp.open_handles(), 0);
    }

    #[tokio::test]
    async fn dropping_owner_closes() {
        let gdp = Gdp::new(MemoryStore::new());
        let mut info = create_info();
        let name = gdp.create(&mut info, "edu.example.drop").await.unwrap();

        let gin = gdp
            .open(&name, IoMode::ReadOnly, &OpenInfo::new())
            .await
            .unwrap();
        let view = gin.clone();
        drop(gin);

        assert!(view.is_closed());
        assert!(matches!(view.nrecs().await, Err(GdpError::HandleClosed)));
    }

    #[tokio::test]
    async fn permission_denied() {
        let gdp = Gdp::new(MemoryStore::new());
        let mut info = create_info();
        let name = gdp.create(&mut info, "edu.example.denied").await.unwrap();

        let result = gdp.open(&name, IoMode::AppendOnly, &OpenInfo::new()).await;
        assert!(matches!(
            result,
            Err(GdpError::Open(OpenError::PermissionDenied(_)))
        ));

        let mut open_info = OpenInfo::new();
        open_info.set_signing_key(
            KeyPair::generate(DigestAlgorithm::Sha256, KeyAlgorithm::Ed25519, 0, None).unwrap(),
        );
        let result = gdp.open(&name, IoMode::ReadAppend, &open_info).await;
        assert!(matches!(
            result,
            Err(GdpError::Open(OpenError::PermissionDenied(_)))
        ));
        assert_eq!(gdp.open_handles(), 0);

        // Reading needs no key, appending through a read-only handle fails.
        let gin = gdp
            .open(&name, IoMode::ReadOnly, &OpenInfo::new())
            .await
            .unwrap();
        assert!(matches!(
            gin.append(&mut Datum::new("nope"), None).await,
            Err(GdpError::NotWritable(IoMode::ReadOnly))
        ));
    }

    #[tokio::test]
    async fn metadata_cache() {
        let store = MemoryStore::new();
        let gdp = Gdp::builder(store.clone())
            .directory(MemoryDirectory::new())
            .build();
        let mut info = create_info();
        let name = gdp.create(&mut info, "edu.example.cache").await.unwrap();

        // Created logs are cached, opening with caching works while the store is offline.
        store.set_offline(true);
        let mut open_info = OpenInfo::new();
        open_info.set_caching(true);
        let gin = gdp
            .open(&name, IoMode::ReadOnly, &open_info)
            .await
            .expect("no errors");
        assert_eq!(gin.metadata().unwrap(), *info.metadata());

        assert!(matches!(
            gdp.open(&name, IoMode::ReadOnly, &OpenInfo::new()).await,
            Err(GdpError::Open(OpenError::Routing(_)))
        ));
    }

    #[tokio::test]
    async fn shutdown_closes_all() {
        let gdp = Gdp::new(MemoryStore::new());
        let mut info = create_info();
        let name = gdp.create(&mut info, "edu.example.shutdown").await.unwrap();

        let first = gdp
            .open(&name, IoMode::ReadOnly, &OpenInfo::new())
            .await
            .unwrap();
        let second = gdp
            .open(&name, IoMode::ReadAppend, &signing_key(&info))
            .await
            .unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(gdp.open_handles(), 2);

        gdp.shutdown();
        assert!(first.is_closed());
        assert!(second.is_closed());
        assert_eq!(gdp.open_handles(), 0);
    }
}
