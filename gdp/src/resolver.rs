// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping of strings to log names.
//!
//! A log name is either given in its printable form or as human-readable name registered in a
//! directory. Human-readable names without a dot are qualified with the configured root first,
//! `sensor` with root `edu.example` resolves as `edu.example.sensor`.
use std::sync::RwLock;

use gdp_core::GdpName;
use gdp_core::name::PRINTABLE_NAME_LEN;
use gdp_store::Directory;
use tracing::trace;

use crate::error::GdpError;

pub struct NameResolver<D> {
    directory: Option<D>,
    root: RwLock<Option<String>>,
}

impl<D> NameResolver<D> {
    pub(crate) fn new(directory: Option<D>, root: Option<String>) -> Self {
        Self {
            directory,
            root: RwLock::new(root),
        }
    }

    pub fn to_printable(&self, name: &GdpName) -> String {
        name.to_printable()
    }

    /// Structural check, does not tell whether the log exists.
    pub fn is_valid(&self, name: &GdpName) -> bool {
        name.is_valid()
    }

    pub fn root(&self) -> Option<String> {
        self.root
            .read()
            .expect("acquire shared read access on name root")
            .clone()
    }

    pub fn set_root(&self, root: Option<&str>) {
        *self
            .root
            .write()
            .expect("acquire exclusive write access on name root") = root.map(str::to_string);
    }

    /// Prefixes human-readable names without a dot with the root.
    pub fn qualify(&self, human_name: &str) -> String {
        match self.root() {
            Some(root) if !human_name.contains('.') => format!("{root}.{human_name}"),
            _ => human_name.to_string(),
        }
    }

    pub fn has_directory(&self) -> bool {
        self.directory.is_some()
    }
}

impl<D> NameResolver<D>
where
    D: Directory,
{
    pub(crate) async fn lookup(&self, human_name: &str) -> Result<Option<GdpName>, GdpError> {
        let Some(directory) = &self.directory else {
            return Ok(None);
        };

        let qualified = self.qualify(human_name);
        let name = directory.lookup(&qualified).await?;
        trace!(human_name = %qualified, found = name.is_some(), "lookup name");
        Ok(name)
    }

    /// Parses a printable name or resolves a human-readable one.
    pub async fn parse(&self, name: &str) -> Result<GdpName, GdpError> {
        if name.len() == PRINTABLE_NAME_LEN {
            if let Ok(name) = GdpName::from_printable(name) {
                return Ok(name);
            }
        }

        if !self.has_directory() {
            return Err(GdpError::InvalidNameFormat(name.to_string()));
        }
        self.resolve(name).await
    }

    /// Looks up a human-readable name in the directory.
    pub async fn resolve(&self, human_name: &str) -> Result<GdpName, GdpError> {
        self.lookup(human_name)
            .await?
            .ok_or_else(|| GdpError::NameNotFound(self.qualify(human_name)))
    }

    /// Registers a human-readable name for a log. Returns false if the mapping existed already
    /// or there is no directory to register it with.
    pub async fn update(&self, human_name: &str, name: GdpName) -> Result<bool, GdpError> {
        let Some(directory) = &self.directory else {
            return Ok(false);
        };
        Ok(directory.register(&self.qualify(human_name), name).await?)
    }
}
