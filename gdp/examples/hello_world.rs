// SPDX-License-Identifier: MIT OR Apache-2.0

//! Creates a log, subscribes to it and appends a few records.
//!
//! Run with `RUST_LOG=gdp=debug cargo run --example hello_world` to see what happens inside.
use std::time::Duration;

use gdp::test_utils::setup_logging;
use gdp::{CreateInfo, EventKind, Gdp, GdpError, IoMode, OpenInfo};
use gdp_core::{Datum, DigestAlgorithm, KeyAlgorithm};
use gdp_store::{MemoryDirectory, MemoryStore};

#[tokio::main]
async fn main() -> Result<(), GdpError> {
    setup_logging();

    let gdp = Gdp::builder(MemoryStore::new())
        .directory(MemoryDirectory::new())
        .name_root("edu.example")
        .build();

    let mut info = CreateInfo::new();
    info.new_owner_key(DigestAlgorithm::Sha256, KeyAlgorithm::Ed25519, 0, None)?;
    info.new_writer_key(DigestAlgorithm::Sha256, KeyAlgorithm::Ed25519, 0, None)?;
    info.set_creator("hello", "example.org")?;
    gdp.create(&mut info, "hello").await?;

    // Look the log up by its human-readable name again.
    let name = gdp.parse_name("hello").await?;
    println!("created log {name}");

    let mut open_info = OpenInfo::new();
    if let Some(writer) = info.writer_key() {
        open_info.set_signing_key(writer.clone());
    }
    open_info.set_verify(true);
    let gin = gdp.open(&name, IoMode::ReadAppend, &open_info).await?;

    gin.subscribe_by_recno(0, 3).await?;

    for n in 1..=3 {
        let mut datum = Datum::new(format!("hello world #{n}"));
        let recno = gin.append(&mut datum, None).await?;
        println!("appended record {recno}");
    }

    loop {
        let event = gdp.next_event(Some(&gin), Duration::from_secs(1)).await?;
        match event.kind() {
            EventKind::Data => {
                if let Some(datum) = event.datum() {
                    println!(
                        "received record {}: {}",
                        datum.recno(),
                        String::from_utf8_lossy(datum.payload())
                    );
                }
            }
            EventKind::Done => break,
            kind => println!("unexpected {kind:?} event"),
        }
    }

    let latest = gin.read_by_recno(-1).await?;
    gin.verify(&latest).await?;
    println!("latest record {} verified", latest.recno());

    gin.close();
    Ok(())
}
