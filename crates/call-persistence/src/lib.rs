//! call-persistence
//!
//! Capa de persistencia Postgres (sqlx) del pipeline de llamadas.
//! Objetivo: concentrar todo el SQL del servicio detrás de `CallStore`,
//! manteniendo las entidades del dominio libres de detalles de filas y
//! ofreciendo las garantías que el resto del sistema asume:
//! - lock de fila sobre `calls` (`SELECT ... FOR UPDATE`) con esperas
//!   bloqueantes,
//! - unicidad de `(call_id, sequence)` en `call_packets` capturada como
//!   error propio ("duplicate"),
//! - commit atómico de upsert de llamada + inserción de paquete +
//!   actualización de `last_sequence` en una sola transacción.
//!
//! Módulos:
//! - `pg`: `CallStore` y los tipos de lectura (outcome de ingesta, status,
//!   carga eager).
//! - `schema`: bootstrap idempotente de tablas e índices.
//! - `config`: carga de configuración desde .env.
//! - `error`: mapeo de errores sqlx a variantes semánticas.

pub mod config;
pub mod error;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, StorageConfig};
pub use error::PersistenceError;
pub use pg::{build_pool, CallDetails, CallStatus, CallStore, IngestOutcome, PgPool};
pub use schema::ensure_schema;
