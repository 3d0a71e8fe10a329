//! DTOs y errores de la API pública.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use call_domain::DomainError;
use call_persistence::{CallStatus, PersistenceError};

/// Respuesta de `POST /v1/call/stream/{call_id}` (202).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketResponse {
    pub status: String,
    pub call_id: String,
    pub sequence: i64,
    /// Presente sólo cuando hubo mismatch de secuencia.
    pub message: Option<String>,
}

/// Respuesta de `GET /v1/call/{call_id}/status` (200).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallStatusResponse {
    pub call_id: String,
    pub state: String,
    pub last_sequence: i64,
    pub packet_count: i64,
    pub has_ai_result: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<CallStatus> for CallStatusResponse {
    fn from(status: CallStatus) -> Self {
        Self { call_id: status.call_id,
               state: status.state.as_str().to_string(),
               last_sequence: status.last_sequence,
               packet_count: status.packet_count,
               has_ai_result: status.has_ai_result,
               created_at: status.created_at.to_rfc3339(),
               updated_at: status.updated_at.to_rfc3339() }
    }
}

/// Cuerpo uniforme de error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub detail: String,
}

/// Errores tipados de la superficie HTTP.
#[derive(Debug)]
pub enum ApiError {
    /// Payload malformado o fuera de rango: 422, sin cambios de estado.
    Validation(String),
    /// `call_id` inexistente: 404.
    NotFound(String),
    /// Cualquier cosa inesperada: 500.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, kind, detail) = match self {
            ApiError::Validation(detail) => (StatusCode::UNPROCESSABLE_ENTITY, "validation", detail),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "not_found", detail),
            ApiError::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", detail),
        };
        (code, Json(ErrorBody { error: kind.to_string(), detail })).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(detail) => ApiError::Validation(detail),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<PersistenceError> for ApiError {
    fn from(err: PersistenceError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
