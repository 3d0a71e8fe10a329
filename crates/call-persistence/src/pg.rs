//! Implementación Postgres (sqlx) del almacenamiento de llamadas.
//!
//! Objetivo general del módulo:
//! - Proveer la única puerta de entrada SQL del servicio (`CallStore`).
//! - Garantizar que cada ingesta es una transacción atómica con lock de fila
//!   sobre `calls`, de modo que paquetes concurrentes del mismo `call_id`
//!   queden linealizados por la base.
//! - Mantener los invariantes tras cada commit: `last_sequence` es el máximo
//!   de las secuencias persistidas (o -1 sin paquetes), nunca hay dos
//!   paquetes con la misma `(call_id, sequence)` y las transiciones de
//!   estado respetan el grafo del dominio.
//!
//! Las transiciones se persisten con un UPDATE condicionado al estado
//! observado: la decisión es del dominio (`can_transition_to`), pero el
//! WHERE convierte esa decisión en un claim autoritativo frente a otros
//! workers o instancias.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::debug;

use call_domain::{AiResult, AiResultStatus, Call, CallState, Packet, PacketPayload};

use crate::config::StorageConfig;
use crate::error::PersistenceError;

/// Alias de tipo para el pool sqlx de conexiones Postgres.
pub type PgPool = sqlx::Pool<sqlx::Postgres>;

/// Construye un pool Postgres con los límites base + overflow de la
/// configuración.
///
/// Devuelve `PersistenceError::TransientIo` ante errores de conexión para
/// que el arranque pueda abortar con código distinto de cero.
pub async fn build_pool(cfg: &StorageConfig) -> Result<PgPool, PersistenceError> {
    PgPoolOptions::new().min_connections(cfg.min_connections())
                        .max_connections(cfg.max_connections())
                        .connect(&cfg.url)
                        .await
                        .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))
}

/// Resultado de una ingesta ya commiteada.
///
/// `expected_sequence` se calcula con el `last_sequence` previo al insert;
/// el handler lo usa para armar el warning legible de secuencia fuera de
/// orden sin volver a consultar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    /// El paquete ya existía y se absorbió como aceptación idempotente.
    pub duplicate: bool,
    /// `last_sequence + 1` observado bajo el lock, antes de insertar.
    pub expected_sequence: i64,
    /// La secuencia recibida no era la esperada (se acepta igual).
    pub sequence_mismatch: bool,
}

/// Proyección de estado para `GET /v1/call/{call_id}/status`.
#[derive(Debug, Clone, Serialize)]
pub struct CallStatus {
    pub call_id: String,
    pub state: CallState,
    pub last_sequence: i64,
    pub packet_count: i64,
    pub has_ai_result: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Carga eager de una llamada: fila principal, paquetes ordenados por
/// secuencia ascendente y el resultado de IA si existe.
#[derive(Debug, Clone, Serialize)]
pub struct CallDetails {
    pub call: Call,
    pub packets: Vec<Packet>,
    pub ai_result: Option<AiResult>,
}

/// Puerta de entrada a todo el SQL del servicio.
#[derive(Clone)]
pub struct CallStore {
    pool: PgPool,
}

impl CallStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Acceso de solo lectura al pool (principalmente para tests de
    /// integración y el health check).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Ingesta transaccional de un paquete (el corazón del camino caliente).
    ///
    /// Precondición: el payload ya pasó `PacketPayload::validate`; aquí no se
    /// vuelve a validar para no pagar el costo bajo el lock.
    ///
    /// Algoritmo (una sola transacción):
    /// 1. Lock de la fila `calls` (`FOR UPDATE`). Si no existe, INSERT con
    ///    `ON CONFLICT DO NOTHING` y re-select con lock: la carrera de
    ///    creación entre dos primeras ingestas la gana una y la otra espera.
    /// 2. `expected = last_sequence + 1`; un mismatch se reporta en el
    ///    outcome pero no falla.
    /// 3. Chequeo de duplicado por `(call_id, sequence)`; un duplicado se
    ///    acepta en silencio sin sobrescribir la fila original.
    /// 4. INSERT del paquete y, si la secuencia supera `last_sequence`,
    ///    avance de `last_sequence` + `updated_at`.
    /// 5. Commit.
    pub async fn ingest_packet(&self, call_id: &str, payload: &PacketPayload) -> Result<IngestOutcome, PersistenceError> {
        debug!(call_id, sequence = payload.sequence, "ingest:start");
        let mut tx = self.pool.begin().await?;

        // 1. Lock de la llamada, creándola si es su primer paquete.
        let locked = sqlx::query("SELECT last_sequence FROM calls WHERE call_id = $1 FOR UPDATE").bind(call_id)
                                                                                                .fetch_optional(&mut *tx)
                                                                                                .await?;
        let last_sequence: i64 = match locked {
            Some(row) => row.try_get("last_sequence")?,
            None => {
                // Carrera de creación: el DO NOTHING deja pasar al perdedor,
                // que luego bloquea en el re-select hasta el commit del ganador.
                sqlx::query("INSERT INTO calls (call_id, state, last_sequence) VALUES ($1, $2, -1) ON CONFLICT (call_id) DO NOTHING")
                    .bind(call_id)
                    .bind(CallState::InProgress.as_str())
                    .execute(&mut *tx)
                    .await?;
                let row = sqlx::query("SELECT last_sequence FROM calls WHERE call_id = $1 FOR UPDATE").bind(call_id)
                                                                                                     .fetch_one(&mut *tx)
                                                                                                     .await?;
                row.try_get("last_sequence")?
            }
        };

        // 2. Validación de orden: warning, nunca bloqueo.
        let expected_sequence = last_sequence + 1;
        let sequence_mismatch = payload.sequence != expected_sequence;

        // 3. Idempotencia: un paquete repetido no sobrescribe el original.
        let (existing,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM call_packets WHERE call_id = $1 AND sequence = $2").bind(call_id)
                                                                                                    .bind(payload.sequence)
                                                                                                    .fetch_one(&mut *tx)
                                                                                                    .await?;
        let mut duplicate = existing > 0;
        if !duplicate {
            // 4. Insert del paquete. El ON CONFLICT es la segunda línea de
            //    defensa: bajo el lock de la llamada no debería dispararse,
            //    pero si lo hace se absorbe como duplicado.
            let inserted = sqlx::query(
                "INSERT INTO call_packets (call_id, sequence, data, timestamp) VALUES ($1, $2, $3, $4) \
                 ON CONFLICT ON CONSTRAINT uq_call_sequence DO NOTHING",
            )
            .bind(call_id)
            .bind(payload.sequence)
            .bind(&payload.data)
            .bind(payload.timestamp)
            .execute(&mut *tx)
            .await?;
            if inserted.rows_affected() == 0 {
                duplicate = true;
            } else if payload.sequence > last_sequence {
                // Un paquete tardío de secuencia menor no hace retroceder el máximo.
                sqlx::query("UPDATE calls SET last_sequence = $2, updated_at = now() WHERE call_id = $1").bind(call_id)
                                                                                                        .bind(payload.sequence)
                                                                                                        .execute(&mut *tx)
                                                                                                        .await?;
            }
        }

        // 5. Commit atómico de todo lo anterior.
        tx.commit().await?;
        debug!(call_id, sequence = payload.sequence, duplicate, "ingest:done");
        Ok(IngestOutcome { duplicate, expected_sequence, sequence_mismatch })
    }

    /// Proyección de status de una llamada, o `None` si no existe.
    pub async fn call_status(&self, call_id: &str) -> Result<Option<CallStatus>, PersistenceError> {
        let row = sqlx::query(
            "SELECT c.call_id, c.state, c.last_sequence, c.created_at, c.updated_at, \
                    (SELECT COUNT(*) FROM call_packets p WHERE p.call_id = c.call_id) AS packet_count, \
                    EXISTS (SELECT 1 FROM call_ai_results r WHERE r.call_id = c.call_id) AS has_ai_result \
             FROM calls c WHERE c.call_id = $1",
        )
        .bind(call_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let state_raw: String = row.try_get("state")?;
        Ok(Some(CallStatus { call_id: row.try_get("call_id")?,
                             state: CallState::parse(&state_raw)?,
                             last_sequence: row.try_get("last_sequence")?,
                             packet_count: row.try_get("packet_count")?,
                             has_ai_result: row.try_get("has_ai_result")?,
                             created_at: row.try_get("created_at")?,
                             updated_at: row.try_get("updated_at")? }))
    }

    /// Carga eager para el orquestador: llamada + paquetes (orden por
    /// secuencia) + resultado de IA.
    pub async fn load_call(&self, call_id: &str) -> Result<Option<CallDetails>, PersistenceError> {
        let row = sqlx::query("SELECT call_id, state, last_sequence, created_at, updated_at FROM calls WHERE call_id = $1")
            .bind(call_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let call = decode_call(&row)?;

        let packet_rows = sqlx::query(
            "SELECT id, call_id, sequence, data, timestamp, received_at \
             FROM call_packets WHERE call_id = $1 ORDER BY sequence ASC",
        )
        .bind(call_id)
        .fetch_all(&self.pool)
        .await?;
        let packets = packet_rows.iter().map(decode_packet).collect::<Result<Vec<_>, _>>()?;

        let ai_result = self.load_ai_result(call_id).await?;
        Ok(Some(CallDetails { call, packets, ai_result }))
    }

    /// Resultado de IA de una llamada, si ya fue creado.
    pub async fn load_ai_result(&self, call_id: &str) -> Result<Option<AiResult>, PersistenceError> {
        let row = sqlx::query(
            "SELECT call_id, transcript, sentiment, status, retry_count, last_retry_at, completed_at, error_message \
             FROM call_ai_results WHERE call_id = $1",
        )
        .bind(call_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(decode_ai_result).transpose()
    }

    /// Persiste la transición `from -> to` sólo si el grafo la permite y la
    /// fila todavía está en `from`.
    ///
    /// El `false` cubre dos casos que el llamador trata igual: arista
    /// inexistente (decisión en memoria) y claim perdido contra otro worker
    /// (el WHERE no coincidió).
    pub async fn transition_state(&self, call_id: &str, from: CallState, to: CallState) -> Result<bool, PersistenceError> {
        if !from.can_transition_to(to) {
            debug!(call_id, %from, %to, "transition rejected by state machine");
            return Ok(false);
        }
        let res = sqlx::query("UPDATE calls SET state = $3, updated_at = now() WHERE call_id = $1 AND state = $2")
            .bind(call_id)
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    /// Registra la contabilidad de un reintento: crea el AiResult perezoso si
    /// hace falta y actualiza `retry_count` + `last_retry_at`.
    pub async fn record_retry(&self, call_id: &str, retry_count: i32) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO call_ai_results (call_id, retry_count, last_retry_at) VALUES ($1, $2, now()) \
             ON CONFLICT (call_id) DO UPDATE SET retry_count = EXCLUDED.retry_count, last_retry_at = EXCLUDED.last_retry_at",
        )
        .bind(call_id)
        .bind(retry_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Cierra una llamada exitosa: upsert del resultado completo y transición
    /// `PROCESSING_AI -> COMPLETED`, todo en una transacción.
    ///
    /// Si el claim se perdió (la fila ya no está en `PROCESSING_AI`) se hace
    /// rollback completo para no dejar un AiResult `completed` colgando de
    /// una llamada en otro estado.
    pub async fn complete_call(&self,
                               call_id: &str,
                               transcript: &str,
                               sentiment: &str,
                               retry_count: i32)
                               -> Result<bool, PersistenceError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO call_ai_results (call_id, transcript, sentiment, status, retry_count, completed_at, error_message) \
             VALUES ($1, $2, $3, $4, $5, now(), NULL) \
             ON CONFLICT (call_id) DO UPDATE SET \
                 transcript = EXCLUDED.transcript, \
                 sentiment = EXCLUDED.sentiment, \
                 status = EXCLUDED.status, \
                 retry_count = EXCLUDED.retry_count, \
                 completed_at = EXCLUDED.completed_at, \
                 error_message = NULL",
        )
        .bind(call_id)
        .bind(transcript)
        .bind(sentiment)
        .bind(AiResultStatus::Completed.as_str())
        .bind(retry_count)
        .execute(&mut *tx)
        .await?;

        let res = sqlx::query("UPDATE calls SET state = $3, updated_at = now() WHERE call_id = $1 AND state = $2")
            .bind(call_id)
            .bind(CallState::ProcessingAi.as_str())
            .bind(CallState::Completed.as_str())
            .execute(&mut *tx)
            .await?;
        if res.rows_affected() == 1 {
            tx.commit().await?;
            Ok(true)
        } else {
            tx.rollback().await?;
            Ok(false)
        }
    }

    /// Marca una llamada como fallida con su mensaje de error.
    ///
    /// La transición a `FAILED` se intenta desde el estado observado bajo
    /// lock; aunque la arista no exista, el AiResult queda en `failed` con el
    /// diagnóstico (el worker sólo llega acá siendo dueño del claim).
    pub async fn mark_failed(&self, call_id: &str, error_message: &str) -> Result<bool, PersistenceError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT state FROM calls WHERE call_id = $1 FOR UPDATE").bind(call_id)
                                                                                     .fetch_optional(&mut *tx)
                                                                                     .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(false);
        };
        let state_raw: String = row.try_get("state")?;
        let state = CallState::parse(&state_raw)?;

        let transitioned = if state.can_transition_to(CallState::Failed) {
            sqlx::query("UPDATE calls SET state = $2, updated_at = now() WHERE call_id = $1")
                .bind(call_id)
                .bind(CallState::Failed.as_str())
                .execute(&mut *tx)
                .await?;
            true
        } else {
            false
        };

        sqlx::query(
            "INSERT INTO call_ai_results (call_id, status, error_message) VALUES ($1, $2, $3) \
             ON CONFLICT (call_id) DO UPDATE SET status = EXCLUDED.status, error_message = EXCLUDED.error_message",
        )
        .bind(call_id)
        .bind(AiResultStatus::Failed.as_str())
        .bind(error_message)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(transitioned)
    }
}

fn decode_call(row: &PgRow) -> Result<Call, PersistenceError> {
    let state_raw: String = row.try_get("state")?;
    Ok(Call { call_id: row.try_get("call_id")?,
              state: CallState::parse(&state_raw)?,
              last_sequence: row.try_get("last_sequence")?,
              created_at: row.try_get("created_at")?,
              updated_at: row.try_get("updated_at")? })
}

fn decode_packet(row: &PgRow) -> Result<Packet, PersistenceError> {
    Ok(Packet { id: row.try_get("id")?,
                call_id: row.try_get("call_id")?,
                sequence: row.try_get("sequence")?,
                data: row.try_get("data")?,
                timestamp: row.try_get("timestamp")?,
                received_at: row.try_get("received_at")? })
}

fn decode_ai_result(row: &PgRow) -> Result<AiResult, PersistenceError> {
    let status_raw: String = row.try_get("status")?;
    Ok(AiResult { call_id: row.try_get("call_id")?,
                  transcript: row.try_get("transcript")?,
                  sentiment: row.try_get("sentiment")?,
                  status: AiResultStatus::parse(&status_raw)?,
                  retry_count: row.try_get("retry_count")?,
                  last_retry_at: row.try_get("last_retry_at")?,
                  completed_at: row.try_get("completed_at")?,
                  error_message: row.try_get("error_message")? })
}
