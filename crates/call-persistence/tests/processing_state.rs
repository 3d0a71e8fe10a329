use call_domain::{AiResultStatus, CallState, PacketPayload};
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

async fn seed_call(store: &CallStore) -> String {
    let call_id = format!("proc-{}", Uuid::new_v4());
    let payload = PacketPayload { sequence: 0, data: "blob".to_string(), timestamp: 1.0 };
    store.ingest_packet(&call_id, &payload).await.expect("seed ingest");
    call_id
}

#[tokio::test]
async fn test_claim_is_exclusive() {
    let Some(store) = store().await else { return };
    let call_id = seed_call(&store).await;

    let claimed = store.transition_state(&call_id, CallState::InProgress, CallState::ProcessingAi).await.expect("claim");
    assert!(claimed);

    // El segundo claim pierde: la fila ya no está en IN_PROGRESS.
    let second = store.transition_state(&call_id, CallState::InProgress, CallState::ProcessingAi).await.expect("claim 2");
    assert!(!second);
}

#[tokio::test]
async fn test_invalid_edge_is_rejected_in_memory() {
    let Some(store) = store().await else { return };
    let call_id = seed_call(&store).await;

    // Arista inexistente: rechazo antes de tocar la base.
    let jumped = store.transition_state(&call_id, CallState::InProgress, CallState::Archived).await.expect("tx");
    assert!(!jumped);
    let status = store.call_status(&call_id).await.expect("status").expect("call");
    assert_eq!(status.state, CallState::InProgress);
}

#[tokio::test]
async fn test_complete_call_upholds_invariants() {
    let Some(store) = store().await else { return };
    let call_id = seed_call(&store).await;

    assert!(store.transition_state(&call_id, CallState::InProgress, CallState::ProcessingAi).await.expect("claim"));
    let done = store.complete_call(&call_id, "transcript text", "positive", 2).await.expect("complete");
    assert!(done);

    let status = store.call_status(&call_id).await.expect("status").expect("call");
    assert_eq!(status.state, CallState::Completed);
    assert!(status.has_ai_result);

    let ai = store.load_ai_result(&call_id).await.expect("ai").expect("ai row");
    assert_eq!(ai.status, AiResultStatus::Completed);
    assert_eq!(ai.transcript.as_deref(), Some("transcript text"));
    assert_eq!(ai.sentiment.as_deref(), Some("positive"));
    assert_eq!(ai.retry_count, 2);
    assert!(ai.completed_at.is_some());
    assert!(ai.error_message.is_none());
}

#[tokio::test]
async fn test_complete_without_claim_rolls_back() {
    let Some(store) = store().await else { return };
    let call_id = seed_call(&store).await;

    // Sin claim previo: el UPDATE condicionado no coincide y nada queda
    // commiteado, ni siquiera el AiResult.
    let done = store.complete_call(&call_id, "t", "neutral", 0).await.expect("complete");
    assert!(!done);

    let status = store.call_status(&call_id).await.expect("status").expect("call");
    assert_eq!(status.state, CallState::InProgress);
    assert!(!status.has_ai_result);
}

#[tokio::test]
async fn test_retry_bookkeeping_and_failure() {
    let Some(store) = store().await else { return };
    let call_id = seed_call(&store).await;

    store.record_retry(&call_id, 1).await.expect("retry 1");
    store.record_retry(&call_id, 2).await.expect("retry 2");

    let ai = store.load_ai_result(&call_id).await.expect("ai").expect("ai row");
    assert_eq!(ai.status, AiResultStatus::Pending);
    assert_eq!(ai.retry_count, 2);
    assert!(ai.last_retry_at.is_some());
    assert!(ai.transcript.is_none());

    assert!(store.transition_state(&call_id, CallState::InProgress, CallState::ProcessingAi).await.expect("claim"));
    let failed = store.mark_failed(&call_id, "503 Service Unavailable").await.expect("fail");
    assert!(failed);

    let status = store.call_status(&call_id).await.expect("status").expect("call");
    assert_eq!(status.state, CallState::Failed);
    let ai = store.load_ai_result(&call_id).await.expect("ai").expect("ai row");
    assert_eq!(ai.status, AiResultStatus::Failed);
    assert_eq!(ai.error_message.as_deref(), Some("503 Service Unavailable"));
    assert_eq!(ai.retry_count, 2, "la contabilidad de reintentos se conserva");

    // Una llamada fallida puede volver a reclamarse (reprocesamiento).
    assert!(store.transition_state(&call_id, CallState::Failed, CallState::ProcessingAi).await.expect("reclaim"));
}

#[tokio::test]
async fn test_archive_terminal_path() {
    let Some(store) = store().await else { return };
    let call_id = seed_call(&store).await;

    assert!(store.transition_state(&call_id, CallState::InProgress, CallState::ProcessingAi).await.expect("claim"));
    assert!(store.complete_call(&call_id, "t", "mixed", 0).await.expect("complete"));
    assert!(store.transition_state(&call_id, CallState::Completed, CallState::Archived).await.expect("archive"));

    // Terminal: ninguna arista sale de ARCHIVED.
    for target in [CallState::InProgress, CallState::ProcessingAi, CallState::Completed, CallState::Failed] {
        let moved = store.transition_state(&call_id, CallState::Archived, target).await.expect("tx");
        assert!(!moved);
    }
}
