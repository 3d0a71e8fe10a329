//! Errores de persistencia.
//! Mapea errores de sqlx / conexión a variantes semánticas del dominio de persistencia.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("check violation: {0}")]
    CheckViolation(String),
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("not found")]
    NotFound,
    #[error("serialization conflict (retryable)")]
    SerializationConflict,
    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),
    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl PersistenceError {
    /// Clasificación gruesa para decidir reintentos a nivel de llamador.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PersistenceError::SerializationConflict | PersistenceError::TransientIo(_))
    }
}

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(db) => {
                // 40001 = serialization_failure, 40P01 = deadlock_detected
                let code = db.code().map(|c| c.to_string());
                match db.kind() {
                    sqlx::error::ErrorKind::UniqueViolation => Self::UniqueViolation(db.message().to_string()),
                    sqlx::error::ErrorKind::CheckViolation => Self::CheckViolation(db.message().to_string()),
                    sqlx::error::ErrorKind::ForeignKeyViolation => Self::ForeignKeyViolation(db.message().to_string()),
                    _ if matches!(code.as_deref(), Some("40001") | Some("40P01")) => Self::SerializationConflict,
                    _ => Self::Unknown(db.message().to_string()),
                }
            }
            sqlx::Error::Io(e) => Self::TransientIo(format!("io: {e}")),
            sqlx::Error::PoolTimedOut => Self::TransientIo("pool timed out".into()),
            sqlx::Error::PoolClosed => Self::TransientIo("pool closed".into()),
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<call_domain::DomainError> for PersistenceError {
    fn from(err: call_domain::DomainError) -> Self {
        // Una fila que no decodifica a una entidad válida es corrupción, no
        // un error de cliente.
        Self::Unknown(format!("row decode: {err}"))
    }
}
