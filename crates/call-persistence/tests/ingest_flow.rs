use call_domain::{CallState, PacketPayload};
use call_persistence::config::StorageConfig;
use call_persistence::pg::{build_pool, CallStore};
use call_persistence::schema::ensure_schema;
use uuid::Uuid;

async fn store() -> Option<CallStore> {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("skip (no DATABASE_URL)");
        return None;
    }
    let cfg = StorageConfig::from_env();
    let pool = build_pool(&cfg).await.expect("pool");
    ensure_schema(&pool).await.expect("schema");
    Some(CallStore::new(pool))
}

fn payload(sequence: i64, data: &str) -> PacketPayload {
    PacketPayload { sequence, data: data.to_string(), timestamp: 1706745600.0 + sequence as f64 }
}

#[tokio::test]
async fn test_ordered_ingest() {
    let Some(store) = store().await else { return };
    let call_id = format!("ordered-{}", Uuid::new_v4());

    for seq in 0..5 {
        let out = store.ingest_packet(&call_id, &payload(seq, &format!("packet_data_{seq}"))).await.expect("ingest");
        assert!(!out.duplicate);
        assert!(!out.sequence_mismatch, "secuencia {seq} debía ser la esperada");
        assert_eq!(out.expected_sequence, seq);
    }

    let status = store.call_status(&call_id).await.expect("status").expect("call exists");
    assert_eq!(status.last_sequence, 4);
    assert_eq!(status.packet_count, 5);
    assert_eq!(status.state, CallState::InProgress);
    assert!(!status.has_ai_result);
}

#[tokio::test]
async fn test_sequence_gap_is_warned_not_blocked() {
    let Some(store) = store().await else { return };
    let call_id = format!("gap-{}", Uuid::new_v4());

    let first = store.ingest_packet(&call_id, &payload(0, "p0")).await.expect("ingest 0");
    assert!(!first.sequence_mismatch);

    // Falta la 1; la 2 entra igual con aviso.
    let skipped = store.ingest_packet(&call_id, &payload(2, "p2")).await.expect("ingest 2");
    assert!(skipped.sequence_mismatch);
    assert_eq!(skipped.expected_sequence, 1);
    assert!(!skipped.duplicate);

    let status = store.call_status(&call_id).await.expect("status").expect("call");
    assert_eq!(status.last_sequence, 2);
    assert_eq!(status.packet_count, 2);
}

#[tokio::test]
async fn test_late_lower_sequence_does_not_regress() {
    let Some(store) = store().await else { return };
    let call_id = format!("late-{}", Uuid::new_v4());

    store.ingest_packet(&call_id, &payload(5, "p5")).await.expect("ingest 5");
    let late = store.ingest_packet(&call_id, &payload(3, "p3")).await.expect("ingest 3");
    assert!(late.sequence_mismatch);
    assert!(!late.duplicate);

    let status = store.call_status(&call_id).await.expect("status").expect("call");
    assert_eq!(status.last_sequence, 5, "un paquete tardío no retrocede el máximo");
    assert_eq!(status.packet_count, 2);
}

#[tokio::test]
async fn test_duplicate_keeps_first_committed_row() {
    let Some(store) = store().await else { return };
    let call_id = format!("dup-{}", Uuid::new_v4());

    let first = store.ingest_packet(&call_id, &payload(0, "original")).await.expect("first");
    assert!(!first.duplicate);

    // Mismo (call_id, sequence), payload distinto: se acepta en silencio y
    // no sobrescribe.
    let repeat = store.ingest_packet(&call_id, &payload(0, "impostor")).await.expect("repeat");
    assert!(repeat.duplicate);

    let details = store.load_call(&call_id).await.expect("load").expect("call");
    assert_eq!(details.packets.len(), 1);
    assert_eq!(details.packets[0].data, "original");
    assert_eq!(details.call.last_sequence, 0);
}

#[tokio::test]
async fn test_packets_load_ordered_by_sequence() {
    let Some(store) = store().await else { return };
    let call_id = format!("order-{}", Uuid::new_v4());

    for seq in [4, 0, 2, 1, 3] {
        store.ingest_packet(&call_id, &payload(seq, &format!("d{seq}"))).await.expect("ingest");
    }
    let details = store.load_call(&call_id).await.expect("load").expect("call");
    let seqs: Vec<i64> = details.packets.iter().map(|p| p.sequence).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    assert_eq!(details.call.last_sequence, 4);
}
