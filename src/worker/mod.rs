//! Orquestador de procesamiento por llamada.
//!
//! Mantiene el conjunto `in_flight` de call_ids en vuelo, protegido por un
//! mutex: `trigger` es idempotente y colapsa disparos repetidos mientras una
//! corrida está en curso (incluso en pleno backoff). La exclusión definitiva
//! entre procesos la da la transición a `PROCESSING_AI`: es el claim
//! autoritativo y no puede quitarse aunque `in_flight` parezca suficiente,
//! porque es la única garantía a través de instancias.
//!
//! La corrida en background recarga la llamada en cada intento, invoca al
//! adaptador de transcripción y persiste el desenlace con backoff
//! exponencial `2^n + U[0,1)` segundos entre fallos transitorios. Nada puede
//! matar la tarea en silencio: todo error inesperado termina en una llamada
//! `FAILED` persistida más su evento publicado.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use call_domain::CallState;
use call_persistence::PersistenceError;

use crate::context::AppContext;
use crate::providers::TranscriberError;

/// Desenlace de un intento individual de procesamiento.
enum Attempt {
    /// Resultado persistido y evento publicado.
    Completed,
    /// La llamada no está lista o pertenece a otro worker; salir sin ruido.
    Skipped,
}

/// Error de un intento, ya clasificado para el loop de reintentos.
enum AttemptError {
    /// Dispara el backoff (fallo del servicio externo).
    Transient(String),
    /// No reintentable: se persiste el fallo y se corta la corrida.
    Fatal(String),
}

impl From<TranscriberError> for AttemptError {
    fn from(err: TranscriberError) -> Self {
        match err {
            TranscriberError::Transient => AttemptError::Transient(err.to_string()),
            TranscriberError::Permanent(_) => AttemptError::Fatal(err.to_string()),
        }
    }
}

impl From<PersistenceError> for AttemptError {
    fn from(err: PersistenceError) -> Self {
        AttemptError::Fatal(err.to_string())
    }
}

pub struct ProcessingOrchestrator {
    in_flight: Mutex<HashSet<String>>,
    max_retries: u32,
}

impl ProcessingOrchestrator {
    pub fn new(max_retries: u32) -> Self {
        Self { in_flight: Mutex::new(HashSet::new()), max_retries }
    }

    /// Dispara el procesamiento en background para una llamada.
    ///
    /// No bloqueante: si el call_id ya está en vuelo devuelve enseguida; si
    /// no, lo anota y lanza la tarea desacoplada del request.
    pub async fn trigger(&self, ctx: Arc<AppContext>, call_id: &str) {
        {
            let mut guard = self.in_flight.lock().await;
            if !guard.insert(call_id.to_string()) {
                return;
            }
        }
        let call_id = call_id.to_string();
        tokio::spawn(async move {
            run_with_retry(ctx, call_id).await;
        });
    }

    /// Cantidad de corridas en vuelo (para tests y diagnóstico).
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    async fn release(&self, call_id: &str) {
        self.in_flight.lock().await.remove(call_id);
    }
}

/// Loop de reintentos con backoff exponencial para una llamada.
async fn run_with_retry(ctx: Arc<AppContext>, call_id: String) {
    let max_retries = ctx.orchestrator.max_retries;
    let mut retry_count: u32 = 0;

    loop {
        match process_call(&ctx, &call_id, retry_count).await {
            Ok(Attempt::Completed) => {
                info!(%call_id, retry_count, "call processed successfully");
                break;
            }
            Ok(Attempt::Skipped) => break,
            Err(AttemptError::Transient(message)) => {
                retry_count += 1;
                if retry_count > max_retries {
                    error!(%call_id, max_retries, "max retries exceeded");
                    fail_call(&ctx, &call_id, &message).await;
                    break;
                }
                if let Err(e) = ctx.store.record_retry(&call_id, retry_count as i32).await {
                    warn!(%call_id, "could not persist retry bookkeeping: {e}");
                }
                // 2^n segundos más jitter uniforme real en [0, 1).
                let backoff = f64::powi(2.0, retry_count as i32) + rand::random::<f64>();
                info!(%call_id, "retry {retry_count}/{max_retries} after {backoff:.2}s");
                tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
            }
            Err(AttemptError::Fatal(message)) => {
                error!(%call_id, "unexpected error while processing: {message}");
                fail_call(&ctx, &call_id, &message).await;
                break;
            }
        }
    }

    ctx.orchestrator.release(&call_id).await;
}

/// Un intento de procesamiento de punta a punta.
///
/// En el primer intento la llamada debe estar en `IN_PROGRESS` o `FAILED` y
/// se reclama con la transición a `PROCESSING_AI`; en los reintentos la
/// corrida ya es dueña del claim y encuentra la fila en `PROCESSING_AI`, por
/// lo que no vuelve a transicionar. Cualquier otro estado significa que otro
/// worker es el dueño o que la llamada ya es terminal.
async fn process_call(ctx: &AppContext, call_id: &str, retry_count: u32) -> Result<Attempt, AttemptError> {
    let Some(details) = ctx.store.load_call(call_id).await? else {
        warn!(call_id, "call not found, nothing to process");
        return Ok(Attempt::Skipped);
    };

    let state = details.call.state;
    let owns_claim = retry_count > 0 && state == CallState::ProcessingAi;
    if !owns_claim {
        if !matches!(state, CallState::InProgress | CallState::Failed) {
            info!(call_id, %state, "call already claimed or terminal, skipping");
            return Ok(Attempt::Skipped);
        }
        if !ctx.store.transition_state(call_id, state, CallState::ProcessingAi).await? {
            info!(call_id, "processing claim lost to another worker");
            return Ok(Attempt::Skipped);
        }
        ctx.hub.publish(call_id, CallState::ProcessingAi, None);
    }

    // Blob de entrada: datos de los paquetes en orden ascendente de secuencia.
    let audio_data: String = details.packets.iter().map(|p| p.data.as_str()).collect();

    let result = ctx.transcriber.transcribe(call_id, &audio_data).await?;

    if !ctx.store.complete_call(call_id, &result.transcript, &result.sentiment, retry_count as i32).await? {
        warn!(call_id, "completion rejected, claim no longer held");
        return Ok(Attempt::Skipped);
    }
    ctx.hub.publish(call_id, CallState::Completed, Some(&result));
    Ok(Attempt::Completed)
}

/// Persiste el desenlace fallido y publica el evento. Si ni siquiera eso se
/// puede, queda el log como último recurso; la base sigue siendo la fuente
/// de verdad para el próximo disparo.
async fn fail_call(ctx: &AppContext, call_id: &str, error_message: &str) {
    match ctx.store.mark_failed(call_id, error_message).await {
        Ok(_) => ctx.hub.publish(call_id, CallState::Failed, None),
        Err(e) => error!(call_id, "could not persist failure: {e}"),
    }
}
