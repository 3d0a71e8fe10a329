//! Errores del dominio (simples por ahora).

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unknown call state: {0}")]
    UnknownState(String),

    #[error("unknown ai result status: {0}")]
    UnknownAiStatus(String),
}
