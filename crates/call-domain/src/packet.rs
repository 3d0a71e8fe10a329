//! Entidad `Packet` y validación del payload de ingesta.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Paquete de metadatos de audio ya persistido.
///
/// Identidad sintética (`id` BIGSERIAL); la unicidad real la impone la
/// restricción `(call_id, sequence)`. Un paquete nunca se muta después de
/// insertado y su vida está atada a la de su `Call` (cascade delete).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub id: i64,
    pub call_id: String,
    pub sequence: i64,
    pub data: String,
    pub timestamp: f64,
    pub received_at: DateTime<Utc>,
}

/// Payload entrante de `POST /v1/call/stream/{call_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketPayload {
    /// Número de secuencia 0-based.
    pub sequence: i64,
    /// Contenido opaco del chunk; no puede ser vacío.
    pub data: String,
    /// Timestamp unix provisto por el cliente; debe ser > 0.
    pub timestamp: f64,
}

impl PacketPayload {
    /// Valida el payload antes de adquirir cualquier lock.
    ///
    /// Un fallo aquí es un error de cliente (422) y garantiza que ninguna
    /// fila fue creada ni modificada.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.sequence < 0 {
            return Err(DomainError::Validation("sequence must be a non-negative integer".to_string()));
        }
        if self.data.is_empty() {
            return Err(DomainError::Validation("data must be a non-empty string".to_string()));
        }
        if !(self.timestamp > 0.0) {
            return Err(DomainError::Validation("timestamp must be greater than zero".to_string()));
        }
        Ok(())
    }
}
