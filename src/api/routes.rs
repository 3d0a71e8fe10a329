//! Handlers HTTP.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;
use tracing::{error, warn};

use call_domain::PacketPayload;

use crate::api::types::{ApiError, CallStatusResponse, PacketResponse};
use crate::context::AppContext;

/// Ingesta de un paquete de metadatos de audio.
///
/// Requisitos del camino caliente:
/// - responder 202 sin bloquear jamás en el procesamiento downstream,
/// - validar antes de tomar cualquier lock (422 sin tocar filas),
/// - absorber duplicados como aceptación idempotente,
/// - disparar el orquestador después del commit y antes de responder, para
///   que ningún enqueue se pierda.
pub async fn ingest_packet(State(ctx): State<Arc<AppContext>>,
                           Path(call_id): Path<String>,
                           payload: Result<Json<PacketPayload>, JsonRejection>)
                           -> Result<impl IntoResponse, ApiError> {
    // Un cuerpo malformado o con tipos incorrectos es el mismo error de
    // cliente que la validación semántica: 422 con el sobre tipado.
    let Json(payload) = payload.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
    payload.validate()?;

    let outcome = match ctx.store.ingest_packet(&call_id, &payload).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(%call_id, "error ingesting packet: {e}");
            return Err(ApiError::Internal("failed to ingest packet".to_string()));
        }
    };

    if outcome.sequence_mismatch {
        warn!(%call_id,
              expected = outcome.expected_sequence,
              received = payload.sequence,
              "sequence mismatch");
    }

    // El trigger va después del commit: la recarga del orquestador ya ve el
    // paquete. Colapsa solo si la llamada ya está en vuelo.
    ctx.orchestrator.trigger(ctx.clone(), &call_id).await;

    let message = outcome.sequence_mismatch
                         .then(|| format!("Packet accepted but sequence mismatch (expected {})", outcome.expected_sequence));
    Ok((StatusCode::ACCEPTED,
        Json(PacketResponse { status: "accepted".to_string(),
                              call_id,
                              sequence: payload.sequence,
                              message })))
}

/// Status actual de una llamada para el dashboard.
pub async fn call_status(State(ctx): State<Arc<AppContext>>,
                         Path(call_id): Path<String>)
                         -> Result<Json<CallStatusResponse>, ApiError> {
    let status = ctx.store.call_status(&call_id).await.map_err(|e| {
                                                          error!(%call_id, "error loading status: {e}");
                                                          ApiError::from(e)
                                                      })?;
    match status {
        Some(status) => Ok(Json(CallStatusResponse::from(status))),
        None => Err(ApiError::NotFound(format!("Call {call_id} not found"))),
    }
}

/// Health check con ping real a la base.
pub async fn health(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").execute(ctx.store.pool()).await {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({"status": "healthy", "database": "connected"}))),
        Err(e) => {
            warn!("health check failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE,
             Json(serde_json::json!({"status": "unhealthy", "database": "disconnected"})))
        }
    }
}

/// Banner del servicio.
pub async fn banner() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "Callflow Call Processing",
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
