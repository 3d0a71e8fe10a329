//! Bootstrap idempotente del esquema.
//!
//! Creamos las tablas críticas con IF NOT EXISTS para poder levantar el
//! servicio contra una base recién creada sin un paso externo de
//! migraciones. Tres tablas: `calls`, `call_packets`, `call_ai_results`.

use crate::error::PersistenceError;
use crate::pg::PgPool;

pub async fn ensure_schema(pool: &PgPool) -> Result<(), PersistenceError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS calls ( \
             call_id VARCHAR(255) PRIMARY KEY, \
             state TEXT NOT NULL, \
             last_sequence BIGINT NOT NULL DEFAULT -1, \
             created_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
             updated_at TIMESTAMPTZ NOT NULL DEFAULT now() )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS call_packets ( \
             id BIGSERIAL PRIMARY KEY, \
             call_id VARCHAR(255) NOT NULL REFERENCES calls(call_id) ON DELETE CASCADE, \
             sequence BIGINT NOT NULL, \
             data TEXT NOT NULL, \
             timestamp DOUBLE PRECISION NOT NULL, \
             received_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
             CONSTRAINT uq_call_sequence UNIQUE (call_id, sequence) )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS call_ai_results ( \
             call_id VARCHAR(255) PRIMARY KEY REFERENCES calls(call_id) ON DELETE CASCADE, \
             transcript TEXT NULL, \
             sentiment VARCHAR(50) NULL, \
             status TEXT NOT NULL DEFAULT 'pending', \
             retry_count INT NOT NULL DEFAULT 0, \
             last_retry_at TIMESTAMPTZ NULL, \
             completed_at TIMESTAMPTZ NULL, \
             error_message TEXT NULL )",
    )
    .execute(pool)
    .await?;

    // Índices esenciales (idempotentes)
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_call_packets_call_id ON call_packets(call_id)").execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_calls_state ON calls(state)").execute(pool).await?;

    Ok(())
}
