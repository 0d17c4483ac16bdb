// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use gdp_core::GdpName;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::Directory;

/// An in-memory name directory.
#[derive(Clone, Debug, Default)]
pub struct MemoryDirectory {
    entries: Arc<RwLock<HashMap<String, GdpName>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Directory for MemoryDirectory {
    async fn lookup(&self, human_name: &str) -> Result<Option<GdpName>, StoreError> {
        let entries = self
            .entries
            .read()
            .expect("acquire shared read access on directory");
        Ok(entries.get(human_name).copied())
    }

    async fn register(&self, human_name: &str, name: GdpName) -> Result<bool, StoreError> {
        let mut entries = self
            .entries
            .write()
            .expect("acquire exclusive write access on directory");

        match entries.get(human_name) {
            Some(existing) if *existing == name => Ok(false),
            Some(_) => Err(StoreError::NameTaken(human_name.to_string())),
            None => {
                debug!(%name, human_name, "register name");
                entries.insert(human_name.to_string(), name);
                Ok(true)
            }
        }
    }
}
