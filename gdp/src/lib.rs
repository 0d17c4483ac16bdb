// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client sessions of the Global Data Plane (GDP).
//!
//! The GDP stores data in append-only, signed and hash-chained logs. A [`Gdp`] session creates
//! logs on a storage tier and opens them as [`Gin`] handles. Records are appended and read through
//! the handle, either waiting for the result or in the background, in which case results are
//! delivered as [`Event`]s on the session's event queue.
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//!
//! use gdp::{CreateInfo, EventKind, Gdp, IoMode, OpenInfo};
//! use gdp_core::{Datum, DigestAlgorithm, KeyAlgorithm};
//! use gdp_store::MemoryStore;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let gdp = Gdp::new(MemoryStore::new());
//!
//! let mut info = CreateInfo::new();
//! info.new_owner_key(DigestAlgorithm::Sha256, KeyAlgorithm::Ed25519, 0, None)?;
//! info.new_writer_key(DigestAlgorithm::Sha256, KeyAlgorithm::Ed25519, 0, None)?;
//! let name = gdp.create(&mut info, "edu.example.hello").await?;
//!
//! let mut open_info = OpenInfo::new();
//! open_info.set_signing_key(info.writer_key().unwrap().clone());
//! let gin = gdp.open(&name, IoMode::ReadAppend, &open_info).await?;
//!
//! gin.subscribe_by_recno(1, 1).await?;
//! gin.append(&mut Datum::new("hello"), None).await?;
//!
//! let event = gin.next_event(Duration::from_secs(1)).await?;
//! assert_eq!(event.kind(), EventKind::Data);
//! assert_eq!(event.datum().unwrap().payload(), b"hello");
//! # Ok(())
//! # }
//! ```
mod builder;
mod error;
mod event;
mod gin;
mod info;
mod io;
mod registry;
mod resolver;
mod session;
mod subscription;
#[cfg(feature = "test_utils")]
pub mod test_utils;

pub use builder::GdpBuilder;
pub use error::{GdpError, OpenError};
pub use event::{Event, EventKind, RequestId};
pub use gin::{Gin, IoMode};
pub use info::{CreateInfo, OpenInfo, key_path};
pub use registry::GinId;
pub use resolver::NameResolver;
pub use session::{Config, Gdp};
