//! Entidad `AiResult`: resultado (a lo sumo uno) del paso de transcripción.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Estado del procesamiento de IA para una llamada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiResultStatus {
    Pending,
    Completed,
    Failed,
}

impl AiResultStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AiResultStatus::Pending => "pending",
            AiResultStatus::Completed => "completed",
            AiResultStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<AiResultStatus, DomainError> {
        match s {
            "pending" => Ok(AiResultStatus::Pending),
            "completed" => Ok(AiResultStatus::Completed),
            "failed" => Ok(AiResultStatus::Failed),
            other => Err(DomainError::UnknownAiStatus(other.to_string())),
        }
    }
}

/// Resultado de IA persistido, 1:1 con su `Call`.
///
/// Se crea perezosamente: o bien en el primer registro de reintento, o bien
/// directamente al completar. `retry_count` cuenta los backoffs consumidos y
/// nunca supera el máximo configurado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiResult {
    pub call_id: String,
    pub transcript: Option<String>,
    pub sentiment: Option<String>,
    pub status: AiResultStatus,
    pub retry_count: i32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}
