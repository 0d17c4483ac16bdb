// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpers for tests of applications using GDP sessions.
use gdp_core::{DigestAlgorithm, GdpName, KeyAlgorithm};
use gdp_store::{Directory, LogStore};

use crate::{CreateInfo, Gdp, GdpError, OpenInfo};

pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}

/// Creates a log with fresh owner and writer keys.
///
/// Returns the log name and open options carrying the writer key, ready for appending.
pub async fn create_log<S, D>(
    gdp: &Gdp<S, D>,
    external_name: &str,
) -> Result<(GdpName, OpenInfo), GdpError>
where
    S: LogStore,
    D: Directory,
{
    let mut info = CreateInfo::new();
    info.new_owner_key(DigestAlgorithm::Sha256, KeyAlgorithm::Ed25519, 0, None)?;
    info.new_writer_key(DigestAlgorithm::Sha256, KeyAlgorithm::Ed25519, 0, None)?;
    let name = gdp.create(&mut info, external_name).await?;

    let mut open_info = OpenInfo::new();
    if let Some(writer) = info.writer_key() {
        open_info.set_signing_key(writer.clone());
    }
    Ok((name, open_info))
}
