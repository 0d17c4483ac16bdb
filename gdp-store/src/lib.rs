// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interfaces and in-memory implementations of the collaborators a GDP session talks to.
//!
//! [`LogStore`] is the storage (and routing) tier: it accepts signed creation requests and
//! signed records, and serves metadata, records and append notifications. It is the single
//! point where appends to one log are serialized, every append is re-validated against the
//! current tail of the log (record number, previous hash) and the writer key the log was created
//! with.
//!
//! [`Directory`] maps human-readable names to log names.
//!
//! Both are traits so sessions can be backed by remote services. [`MemoryStore`] and
//! [`MemoryDirectory`] keep everything in-process.
mod directory;
mod error;
mod memory;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
mod traits;

pub use directory::MemoryDirectory;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use traits::{CreateRequest, Directory, LogStore, LogTail};
