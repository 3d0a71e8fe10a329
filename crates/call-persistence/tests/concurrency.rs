use call_domain::PacketPayload;
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

// Cinco ingestas concurrentes sobre un call_id nuevo: exactamente una fila
// de llamada, cinco paquetes y last_sequence = 4.
#[tokio::test]
async fn test_concurrent_creation_race() {
    let Some(store) = store().await else { return };
    let call_id = format!("race-{}", Uuid::new_v4());

    let mut handles = Vec::new();
    for seq in 0..5i64 {
        let store = store.clone();
        let call_id = call_id.clone();
        handles.push(tokio::spawn(async move {
            let payload = PacketPayload { sequence: seq,
                                          data: format!("chunk_{seq}"),
                                          timestamp: 1706745600.0 + seq as f64 };
            store.ingest_packet(&call_id, &payload).await
        }));
    }
    for handle in handles {
        let out = handle.await.expect("join").expect("ingest");
        assert!(!out.duplicate);
    }

    let (call_rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM calls WHERE call_id = $1").bind(&call_id)
                                                                                              .fetch_one(store.pool())
                                                                                              .await
                                                                                              .expect("count calls");
    assert_eq!(call_rows, 1, "la carrera de creación debe dejar una sola fila");

    let status = store.call_status(&call_id).await.expect("status").expect("call");
    assert_eq!(status.packet_count, 5);
    assert_eq!(status.last_sequence, 4);
}

// Veinte ingestas concurrentes idénticas: todas aceptadas, un solo paquete.
#[tokio::test]
async fn test_duplicate_flood() {
    let Some(store) = store().await else { return };
    let call_id = format!("flood-{}", Uuid::new_v4());

    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        let call_id = call_id.clone();
        handles.push(tokio::spawn(async move {
            let payload = PacketPayload { sequence: 0, data: "D".to_string(), timestamp: 1706745600.0 };
            store.ingest_packet(&call_id, &payload).await
        }));
    }
    let mut duplicates = 0;
    for handle in handles {
        let out = handle.await.expect("join").expect("ingest acepta duplicados");
        if out.duplicate {
            duplicates += 1;
        }
    }
    assert_eq!(duplicates, 19, "exactamente una ingesta gana la inserción");

    let status = store.call_status(&call_id).await.expect("status").expect("call");
    assert_eq!(status.packet_count, 1);
    assert_eq!(status.last_sequence, 0);
}

// Idempotencia serial: K repeticiones del mismo payload comprometen un solo
// paquete y devuelven K aceptaciones.
#[tokio::test]
async fn test_repeated_ingest_is_idempotent() {
    let Some(store) = store().await else { return };
    let call_id = format!("idem-{}", Uuid::new_v4());
    let payload = PacketPayload { sequence: 0, data: "same".to_string(), timestamp: 42.0 };

    for attempt in 0..10 {
        let out = store.ingest_packet(&call_id, &payload).await.expect("ingest");
        assert_eq!(out.duplicate, attempt > 0);
    }
    let status = store.call_status(&call_id).await.expect("status").expect("call");
    assert_eq!(status.packet_count, 1);
}
