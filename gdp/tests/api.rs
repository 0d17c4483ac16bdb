// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use gdp::test_utils::{create_log, setup_logging};
use gdp::{CreateInfo, EventKind, Gdp, GdpError, IoMode, OpenError, OpenInfo, key_path};
use gdp_core::{
    Datum, DigestAlgorithm, GdpName, KeyAlgorithm, KeyEncryption, KeyFormat, KeyPair, KeyPart,
    MetadataId,
};
use gdp_store::{LogStore, MemoryDirectory, MemoryStore, StoreError};

const TIMEOUT: Duration = Duration::from_secs(5);

#[test]
fn printable_names_round_trip() {
    for bytes in [[0; 32], [1; 32], [255; 32]] {
        let name = GdpName::from(bytes);
        let printable = name.to_printable();
        assert_eq!(printable.len(), 43);
        assert_eq!(GdpName::from_printable(&printable).unwrap(), name);
    }
}

#[tokio::test]
async fn sequential_appends_are_chained() {
    setup_logging();

    let gdp = Gdp::new(MemoryStore::new());
    let (name, open_info) = create_log(&gdp, "edu.example.chain").await.unwrap();
    let gin = gdp
        .open(&name, IoMode::ReadAppend, &open_info)
        .await
        .expect("no errors");

    for n in 1..=5 {
        let mut datum = Datum::new(format!("record {n}"));
        let recno = gin.append(&mut datum, None).await.expect("no errors");
        assert_eq!(recno, n);
        assert_eq!(datum.recno(), n);
    }
    assert_eq!(gin.nrecs().await.unwrap(), 5);

    let mut previous: Option<Datum> = None;
    for n in 1..=5 {
        let datum = gin.read_by_recno(n).await.expect("no errors");
        assert_eq!(datum.recno(), n as u64);
        let expected = previous
            .as_ref()
            .map(|previous| previous.hash(&name, DigestAlgorithm::Sha256));
        assert_eq!(datum.prev_hash(), expected.as_ref());
        gin.verify(&datum).await.expect("valid record");
        previous = Some(datum);
    }

    // Negative record numbers count back from the latest record.
    let latest = gin.read_by_recno(-1).await.unwrap();
    assert_eq!(latest.recno(), 5);
    assert_eq!(latest.payload(), b"record 5");
    assert_eq!(gin.read_by_recno(-5).await.unwrap().recno(), 1);

    for recno in [0, 6, -6] {
        assert!(matches!(
            gin.read_by_recno(recno).await,
            Err(GdpError::RecordNotFound(_))
        ));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_writers_with_stale_tail() {
    let gdp = Gdp::new(MemoryStore::new());
    let (name, open_info) = create_log(&gdp, "edu.example.race").await.unwrap();

    let first = gdp
        .open(&name, IoMode::AppendOnly, &open_info)
        .await
        .unwrap();
    let second = gdp
        .open(&name, IoMode::AppendOnly, &open_info)
        .await
        .unwrap();

    let mut datum = Datum::new("genesis");
    first.append(&mut datum, None).await.unwrap();
    let tail = datum.hash(&name, DigestAlgorithm::Sha256);

    let handles = [first, second].map(|gin| {
        tokio::spawn(async move {
            let mut datum = Datum::new("racing");
            gin.append(&mut datum, Some(&tail)).await
        })
    });

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    let succeeded = results.iter().filter(|result| result.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|result| matches!(result, Err(GdpError::HashChainMismatch { .. })))
        .count();
    assert_eq!(succeeded, 1);
    assert_eq!(rejected, 1);
    assert_eq!(gdp.store().tail(&name).await.unwrap().nrecs, 2);
}

#[tokio::test]
async fn operations_after_close() {
    let gdp = Gdp::new(MemoryStore::new());
    let (name, open_info) = create_log(&gdp, "edu.example.close").await.unwrap();
    let gin = gdp
        .open(&name, IoMode::ReadAppend, &open_info)
        .await
        .unwrap();
    gin.append(&mut Datum::new("before"), None).await.unwrap();

    gin.close();
    assert!(gin.is_closed());
    // Closing again is a no-op.
    gin.close();

    assert!(matches!(
        gin.append(&mut Datum::new("after"), None).await,
        Err(GdpError::HandleClosed)
    ));
    assert!(matches!(
        gin.read_by_recno(1).await,
        Err(GdpError::HandleClosed)
    ));
    assert!(matches!(
        gin.subscribe_by_recno(1, 0).await,
        Err(GdpError::HandleClosed)
    ));
    assert!(matches!(
        gin.append_async(vec![Datum::new("after")], None).await,
        Err(GdpError::HandleClosed)
    ));
    assert!(matches!(gin.metadata(), Err(GdpError::HandleClosed)));
    assert!(matches!(gin.writer_key(), Err(GdpError::HandleClosed)));
    assert!(matches!(gin.unsubscribe(), Err(GdpError::HandleClosed)));
    assert!(matches!(
        gin.next_event(Duration::from_millis(10)).await,
        Err(GdpError::HandleClosed)
    ));
    assert!(gdp.gin(gin.id()).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn close_races_appends() {
    let gdp = Gdp::new(MemoryStore::new());

    for round in 0..50 {
        let (name, open_info) = create_log(&gdp, &format!("edu.example.close-race-{round}"))
            .await
            .unwrap();
        let gin = gdp
            .open(&name, IoMode::ReadAppend, &open_info)
            .await
            .unwrap();
        gin.subscribe_by_recno(0, 0).await.unwrap();

        let mut closes = Vec::new();
        let mut appends = Vec::new();
        for n in 0..4 {
            let view = gin.clone();
            closes.push(tokio::spawn(async move { view.close() }));

            let view = gin.clone();
            appends.push(tokio::spawn(async move {
                view.append(&mut Datum::new(format!("record {n}")), None)
                    .await
            }));
        }

        for handle in closes {
            handle.await.expect("close task");
        }
        for handle in appends {
            let result = handle.await.expect("append task");
            assert!(
                matches!(result, Ok(_) | Err(GdpError::HandleClosed)),
                "unexpected append result {result:?}"
            );
        }

        assert!(gin.is_closed());
        assert!(gdp.gin(gin.id()).is_none());
        assert_eq!(gdp.open_handles(), 0);
        assert_eq!(gdp.pending_events(), 0);
    }
}

#[tokio::test]
async fn subscription_delivers_in_order() {
    let gdp = Gdp::new(MemoryStore::new());
    let (name, open_info) = create_log(&gdp, "edu.example.subscribe").await.unwrap();
    let gin = gdp
        .open(&name, IoMode::ReadAppend, &open_info)
        .await
        .unwrap();

    let request = gin.subscribe_by_recno(1, 3).await.expect("no errors");
    for payload in ["one", "two", "three"] {
        gin.append(&mut Datum::new(payload), None).await.unwrap();
    }

    for (recno, payload) in [(1, "one"), (2, "two"), (3, "three")] {
        let event = gdp.next_event(Some(&gin), TIMEOUT).await.expect("event");
        assert_eq!(event.kind(), EventKind::Data);
        assert_eq!(event.request(), request);
        assert_eq!(event.gin(), gin.id());
        assert_eq!(event.name(), &name);
        let datum = event.into_datum().unwrap();
        assert_eq!(datum.recno(), recno);
        assert_eq!(datum.payload(), payload.as_bytes());
    }

    let event = gdp.next_event(Some(&gin), TIMEOUT).await.unwrap();
    assert_eq!(event.kind(), EventKind::Done);

    // Nothing more after the subscription ended.
    gin.append(&mut Datum::new("four"), None).await.unwrap();
    assert!(matches!(
        gdp.next_event(Some(&gin), Duration::from_millis(50)).await,
        Err(GdpError::Timeout)
    ));
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let gdp = Gdp::new(MemoryStore::new());
    let (name, open_info) = create_log(&gdp, "edu.example.unsubscribe").await.unwrap();
    let gin = gdp
        .open(&name, IoMode::ReadAppend, &open_info)
        .await
        .unwrap();

    // Only new records.
    let request = gin.subscribe_by_recno(0, 0).await.unwrap();
    gin.append(&mut Datum::new("one"), None).await.unwrap();
    let event = gin.next_event(TIMEOUT).await.unwrap();
    assert_eq!(event.datum().unwrap().payload(), b"one");

    gin.append(&mut Datum::new("two"), None).await.unwrap();
    gin.unsubscribe().expect("no errors");
    assert!(!gin.unsubscribe_by_id(request).unwrap());

    gin.append(&mut Datum::new("three"), None).await.unwrap();
    assert!(matches!(
        gin.next_event(Duration::from_millis(50)).await,
        Err(GdpError::Timeout)
    ));
    assert_eq!(gdp.pending_events(), 0);
}

#[tokio::test]
async fn subscriptions_from_the_tail() {
    let gdp = Gdp::new(MemoryStore::new());
    let (name, open_info) = create_log(&gdp, "edu.example.tail").await.unwrap();
    let gin = gdp
        .open(&name, IoMode::ReadAppend, &open_info)
        .await
        .unwrap();

    for payload in ["one", "two", "three"] {
        gin.append(&mut Datum::new(payload), None).await.unwrap();
    }

    let first = gin.subscribe_by_recno(-2, 0).await.unwrap();
    let second = gin.subscribe_by_recno(3, 1).await.unwrap();

    let mut delivered = Vec::new();
    for _ in 0..4 {
        let event = gin.next_event(TIMEOUT).await.unwrap();
        delivered.push((event.request(), event.kind(), event.into_datum()));
    }

    let of_first: Vec<u64> = delivered
        .iter()
        .filter(|(request, _, _)| *request == first)
        .filter_map(|(_, _, datum)| datum.as_ref().map(|datum| datum.recno()))
        .collect();
    assert_eq!(of_first, vec![2, 3]);
    assert!(delivered
        .iter()
        .any(|(request, kind, _)| *request == second && *kind == EventKind::Done));

    assert!(gin.unsubscribe_by_id(first).unwrap());
}

#[tokio::test]
async fn create_append_read_verify() {
    let gdp = Gdp::new(MemoryStore::new());

    let key = KeyPair::generate(DigestAlgorithm::Sha256, KeyAlgorithm::Ed25519, 0, None).unwrap();
    let mut info = CreateInfo::new();
    info.set_owner_key(key.clone(), DigestAlgorithm::Sha256);
    info.set_writer_key(key.clone(), DigestAlgorithm::Sha256);
    let name = gdp.create(&mut info, "edu.example.hello").await.unwrap();

    let mut open_info = OpenInfo::new();
    open_info.set_signing_key(key.clone()).set_verify(true);
    let gin = gdp
        .open(&name, IoMode::ReadAppend, &open_info)
        .await
        .unwrap();

    let recno = gin
        .append(&mut Datum::new("hello"), None)
        .await
        .expect("no errors");
    assert_eq!(recno, 1);

    let datum = gin.read_by_recno(1).await.expect("no errors");
    assert_eq!(datum.payload(), b"hello");
    assert_eq!(gin.writer_key().unwrap(), key.public_key());
    assert!(gin.verify(&datum).await.is_ok());
    assert!(gin.verify_with_key(&datum, &key.public_key()).is_ok());

    let other = KeyPair::generate(DigestAlgorithm::Sha256, KeyAlgorithm::Ed25519, 0, None).unwrap();
    assert!(matches!(
        gin.verify_with_key(&datum, &other.public_key()),
        Err(GdpError::SignatureInvalid)
    ));

    let mut tampered = datum.clone();
    tampered.set_payload("HELLO");
    assert!(matches!(
        gin.verify(&tampered).await,
        Err(GdpError::SignatureInvalid)
    ));
}

#[tokio::test]
async fn open_errors() {
    let store = MemoryStore::new();
    let gdp = Gdp::new(store.clone());

    let unknown = GdpName::from([9; 32]);
    assert!(matches!(
        gdp.open(&unknown, IoMode::ReadOnly, &OpenInfo::new()).await,
        Err(GdpError::Open(OpenError::LogNotFound(_)))
    ));

    let (name, _) = create_log(&gdp, "edu.example.offline").await.unwrap();
    store.set_offline(true);
    let err = gdp
        .open(&name, IoMode::ReadOnly, &OpenInfo::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GdpError::Open(OpenError::Routing(StoreError::Unavailable))));
    assert!(err.severity().is_failure());
    assert_eq!(gdp.open_handles(), 0);
}

#[tokio::test]
async fn append_async_and_read_async() {
    let gdp = Gdp::new(MemoryStore::new());
    let (name, open_info) = create_log(&gdp, "edu.example.async").await.unwrap();
    let gin = gdp
        .open(&name, IoMode::ReadAppend, &open_info)
        .await
        .unwrap();

    assert!(matches!(
        gin.append_async(vec![], None).await,
        Err(GdpError::UnsupportedBatchSize(0))
    ));
    assert!(matches!(
        gin.append_async(vec![Datum::new("a"), Datum::new("b")], None).await,
        Err(GdpError::UnsupportedBatchSize(2))
    ));

    let mut requests = Vec::new();
    for payload in ["a", "b", "c"] {
        let request = gin
            .append_async(vec![Datum::new(payload)], None)
            .await
            .expect("no errors");
        requests.push(request);
    }

    for (request, recno) in requests.into_iter().zip(1..) {
        let event = gin.next_event(TIMEOUT).await.unwrap();
        assert_eq!(event.kind(), EventKind::Created);
        assert_eq!(event.request(), request);
        assert_eq!(event.datum().unwrap().recno(), recno);
    }

    let request = gin.read_by_recno_async(2, 0).await.unwrap();
    let kinds: Vec<(EventKind, Option<u64>)> = {
        let mut kinds = Vec::new();
        for _ in 0..3 {
            let event = gin.next_event(TIMEOUT).await.unwrap();
            assert_eq!(event.request(), request);
            kinds.push((event.kind(), event.datum().map(|datum| datum.recno())));
        }
        kinds
    };
    assert_eq!(
        kinds,
        vec![
            (EventKind::Data, Some(2)),
            (EventKind::Data, Some(3)),
            (EventKind::Done, None)
        ]
    );
}

#[tokio::test]
async fn io_modes_are_enforced() {
    let gdp = Gdp::new(MemoryStore::new());
    let (name, open_info) = create_log(&gdp, "edu.example.modes").await.unwrap();

    let append_only = gdp
        .open(&name, IoMode::AppendOnly, &open_info)
        .await
        .unwrap();
    append_only
        .append(&mut Datum::new("one"), None)
        .await
        .unwrap();
    assert!(matches!(
        append_only.read_by_recno(1).await,
        Err(GdpError::NotReadable(IoMode::AppendOnly))
    ));
    assert!(matches!(
        append_only.subscribe_by_recno(1, 1).await,
        Err(GdpError::NotReadable(_))
    ));

    let read_only = gdp
        .open(&name, IoMode::ReadOnly, &OpenInfo::new())
        .await
        .unwrap();
    assert!(matches!(
        read_only.append_async(vec![Datum::new("two")], None).await,
        Err(GdpError::NotWritable(IoMode::ReadOnly))
    ));
    assert_eq!(read_only.read_by_recno(1).await.unwrap().payload(), b"one");
}

#[tokio::test]
async fn events_are_filtered_per_handle() {
    let gdp = Gdp::new(MemoryStore::new());
    let (first_name, first_info) = create_log(&gdp, "edu.example.first").await.unwrap();
    let (second_name, second_info) = create_log(&gdp, "edu.example.second").await.unwrap();

    let first = gdp
        .open(&first_name, IoMode::ReadAppend, &first_info)
        .await
        .unwrap();
    let second = gdp
        .open(&second_name, IoMode::ReadAppend, &second_info)
        .await
        .unwrap();

    first
        .append_async(vec![Datum::new("first")], None)
        .await
        .unwrap();
    second
        .append_async(vec![Datum::new("second")], None)
        .await
        .unwrap();

    let event = gdp.next_event(Some(&second), TIMEOUT).await.unwrap();
    assert_eq!(event.name(), &second_name);

    // Events resolve to a non-owning handle of their log.
    let event = gdp.next_event(None, TIMEOUT).await.unwrap();
    assert_eq!(event.name(), &first_name);
    let gin = gdp.gin(event.gin()).expect("open handle");
    assert!(!gin.is_owner());
    assert_eq!(gin.name(), &first_name);
    drop(gin);
    assert!(!first.is_closed());

    assert!(matches!(
        gdp.next_event(None, Duration::from_millis(10)).await,
        Err(GdpError::Timeout)
    ));
}

#[tokio::test]
async fn closing_discards_queued_events() {
    let gdp = Gdp::new(MemoryStore::new());
    let (name, open_info) = create_log(&gdp, "edu.example.discard").await.unwrap();
    let gin = gdp
        .open(&name, IoMode::ReadAppend, &open_info)
        .await
        .unwrap();

    for payload in ["one", "two"] {
        gin.append(&mut Datum::new(payload), None).await.unwrap();
    }
    gin.subscribe_by_recno(1, 2).await.unwrap();
    let event = gin.next_event(TIMEOUT).await.unwrap();
    assert_eq!(event.kind(), EventKind::Data);

    let id = gin.id();
    drop(gin);
    assert!(gdp.gin(id).is_none());
    assert_eq!(gdp.pending_events(), 0);
}

#[tokio::test]
async fn human_names() {
    let gdp = Gdp::builder(MemoryStore::new())
        .directory(MemoryDirectory::new())
        .name_root("edu.example")
        .build();

    let (name, _) = create_log(&gdp, "sensor").await.unwrap();
    assert_eq!(gdp.parse_name("sensor").await.unwrap(), name);
    assert_eq!(gdp.parse_name("edu.example.sensor").await.unwrap(), name);
    assert_eq!(gdp.parse_name(&name.to_printable()).await.unwrap(), name);
    assert!(matches!(
        gdp.parse_name("unknown").await,
        Err(GdpError::NameNotFound(_))
    ));

    let gin = gdp
        .open(&name, IoMode::ReadOnly, &OpenInfo::new())
        .await
        .unwrap();
    let metadata = gin.metadata().unwrap();
    assert_eq!(metadata.external_name(), Some("edu.example.sensor"));
    assert!(metadata.is_sealed());

    // External names are unique.
    assert!(matches!(
        create_log(&gdp, "sensor").await,
        Err(GdpError::CreationFailed(StoreError::NameTaken(_)))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_creates_of_one_name() {
    let store = MemoryStore::new();
    let directory = MemoryDirectory::new();

    for round in 0..20 {
        let external_name = format!("edu.example.contested-{round}");
        let tasks = [0, 1].map(|_| {
            let gdp = Gdp::builder(store.clone())
                .directory(directory.clone())
                .build();
            let external_name = external_name.clone();
            tokio::spawn(async move { create_log(&gdp, &external_name).await.map(|(name, _)| name) })
        });

        let mut created = Vec::new();
        let mut rejected = 0;
        for task in tasks {
            match task.await.expect("create task") {
                Ok(name) => created.push(name),
                Err(GdpError::CreationFailed(StoreError::NameTaken(_))) => rejected += 1,
                Err(err) => panic!("unexpected error {err}"),
            }
        }
        assert_eq!(created.len(), 1);
        assert_eq!(rejected, 1);

        let gdp = Gdp::builder(store.clone())
            .directory(directory.clone())
            .build();
        assert_eq!(gdp.parse_name(&external_name).await.unwrap(), created[0]);
    }
}

#[tokio::test]
async fn create_log_with_saved_keys() {
    let gdp = Gdp::new(MemoryStore::new());
    let dir = tempfile::tempdir().unwrap();

    let mut info = CreateInfo::new();
    info.new_owner_key(DigestAlgorithm::Sha256, KeyAlgorithm::Ed25519, 0, None)
        .unwrap();
    info.new_writer_key(DigestAlgorithm::Sha256, KeyAlgorithm::Ed25519, 0, None)
        .unwrap();
    info.set_creator("alice", "example.org").unwrap();
    info.set_creation_service("edu.example.logd");
    info.save_keys(dir.path(), KeyFormat::Der, KeyEncryption::None, None)
        .unwrap();

    let name = gdp.create(&mut info, "edu.example.keys").await.unwrap();
    assert!(matches!(
        info.add_metadata(MetadataId::SYNTAX, "json"),
        Err(GdpError::MetadataSealed)
    ));

    // The saved writer key opens the log for appending.
    let path = key_path(dir.path(), &name, "writer", KeyFormat::Der);
    let writer = KeyPair::load(&path, KeyFormat::Der, KeyPart::Secret, None).unwrap();
    let mut open_info = OpenInfo::new();
    open_info.set_signing_key(writer);
    let gin = gdp
        .open(&name, IoMode::AppendOnly, &open_info)
        .await
        .expect("no errors");
    assert_eq!(gin.append(&mut Datum::new("x"), None).await.unwrap(), 1);

    let metadata = gin.metadata().unwrap();
    assert_eq!(
        metadata.find(MetadataId::CREATOR).unwrap(),
        b"alice@example.org"
    );
    assert!(matches!(
        metadata.find(MetadataId::SYNTAX),
        Err(gdp_core::MetadataError::KeyNotFound(_))
    ));
}

#[tokio::test]
async fn verified_reads_reject_foreign_records() {
    let gdp = Gdp::builder(MemoryStore::new())
        .verify_by_default(true)
        .build();
    let (name, open_info) = create_log(&gdp, "edu.example.verified").await.unwrap();
    let gin = gdp
        .open(&name, IoMode::ReadAppend, &open_info)
        .await
        .unwrap();
    gin.append(&mut Datum::new("one"), None).await.unwrap();

    // Records of another log are signed over another name.
    let (other_name, other_info) = create_log(&gdp, "edu.example.other").await.unwrap();
    let other = gdp
        .open(&other_name, IoMode::ReadAppend, &other_info)
        .await
        .unwrap();
    other.append(&mut Datum::new("one"), None).await.unwrap();
    let foreign = other.read_by_recno(1).await.unwrap();
    assert!(matches!(
        gin.verify(&foreign).await,
        Err(GdpError::SignatureInvalid)
    ));
    assert!(gin.read_by_recno(1).await.is_ok());
}
