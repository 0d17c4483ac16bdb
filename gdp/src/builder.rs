// SPDX-License-Identifier: MIT OR Apache-2.0

use gdp_store::{Directory, LogStore, MemoryDirectory};

use crate::Gdp;
use crate::session::Config;

pub struct GdpBuilder<S, D = MemoryDirectory> {
    store: S,
    directory: Option<D>,
    config: Config,
}

impl<S> GdpBuilder<S>
where
    S: LogStore,
{
    pub(crate) fn new(store: S) -> Self {
        GdpBuilder {
            store,
            directory: None,
            config: Config::default(),
        }
    }
}

impl<S, D> GdpBuilder<S, D>
where
    S: LogStore,
    D: Directory,
{
    /// Resolve and register human-readable names through this directory.
    pub fn directory<T>(self, directory: T) -> GdpBuilder<S, T>
    where
        T: Directory,
    {
        GdpBuilder {
            store: self.store,
            directory: Some(directory),
            config: self.config,
        }
    }

    pub fn name_root(mut self, root: &str) -> Self {
        self.config.name_root = Some(root.to_string());
        self
    }

    pub fn append_queue_len(mut self, len: usize) -> Self {
        self.config.append_queue_len = len;
        self
    }

    pub fn verify_by_default(mut self, value: bool) -> Self {
        self.config.verify_by_default = value;
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Gdp<S, D> {
        Gdp::from_parts(self.store, self.directory, self.config)
    }
}

#[cfg(test)]
mod tests {
    use gdp_store::{MemoryDirectory, MemoryStore};

    use crate::Gdp;
    use crate::session::Config;

    #[test]
    fn configure() {
        let gdp = Gdp::builder(MemoryStore::new())
            .directory(MemoryDirectory::new())
            .name_root("edu.example")
            .append_queue_len(8)
            .verify_by_default(true)
            .build();

        assert_eq!(gdp.config().name_root.as_deref(), Some("edu.example"));
        assert_eq!(gdp.config().append_queue_len, 8);
        assert!(gdp.config().verify_by_default);
        assert_eq!(gdp.resolver().root().as_deref(), Some("edu.example"));
        assert!(gdp.resolver().has_directory());

        let gdp = Gdp::builder(MemoryStore::new())
            .config(Config {
                name_root: None,
                ..Default::default()
            })
            .build();
        assert_eq!(gdp.config().append_queue_len, 64);
        assert!(!gdp.resolver().has_directory());
    }
}
