//! Adaptador de transcripción.
//!
//! Contrato asumido por el orquestador:
//! - los fallos transitorios son ensayos independientes con probabilidad
//!   configurable,
//! - la latencia del mock vive en [1s, 3s],
//! - el resultado exitoso es determinista respecto del `call_id` (para poder
//!   testear el sentimiento sin tocar el azar).

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Resultado del paso de transcripción.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcription {
    pub transcript: String,
    pub sentiment: String,
}

#[derive(Debug, Error)]
pub enum TranscriberError {
    /// Fallo transitorio del servicio externo; dispara el loop de backoff.
    #[error("503 Service Unavailable - transcription service temporarily down")]
    Transient,
    /// Fallo definitivo; reintentar no tiene sentido.
    #[error("transcription rejected: {0}")]
    Permanent(String),
}

/// Operación opaca de transcripción + sentimiento.
///
/// Único lugar donde se puede cambiar la dependencia externa.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, call_id: &str, audio_data: &str) -> Result<Transcription, TranscriberError>;
}

const SENTIMENTS: [&str; 4] = ["positive", "negative", "neutral", "mixed"];

/// Mock de transcripción intencionalmente poco confiable, para ejercitar el
/// loop de reintentos.
pub struct MockTranscriber {
    failure_rate: f64,
    latency_min: f64,
    latency_max: f64,
    call_count: AtomicU64,
    failure_count: AtomicU64,
}

impl MockTranscriber {
    /// Mock con latencia realista (1-3 segundos por intento).
    pub fn new(failure_rate: f64) -> Self {
        Self { failure_rate,
               latency_min: 1.0,
               latency_max: 3.0,
               call_count: AtomicU64::new(0),
               failure_count: AtomicU64::new(0) }
    }

    /// Ajusta la ventana de latencia (en tests conviene 0).
    pub fn with_latency(mut self, min_secs: f64, max_secs: f64) -> Self {
        self.latency_min = min_secs;
        self.latency_max = max_secs;
        self
    }

    /// Intentos totales observados por este mock.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Intentos que terminaron en fallo simulado.
    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, call_id: &str, audio_data: &str) -> Result<Transcription, TranscriberError> {
        let attempt = self.call_count.fetch_add(1, Ordering::Relaxed) + 1;

        // Latencia variable; el rng no se sostiene a través del await.
        let latency = if self.latency_max > self.latency_min {
            rand::thread_rng().gen_range(self.latency_min..self.latency_max)
        } else {
            self.latency_min
        };
        if latency > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(latency)).await;
        }

        if rand::random::<f64>() < self.failure_rate {
            let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(call_id, "transcription failure (failure rate: {failures}/{attempt})");
            return Err(TranscriberError::Transient);
        }

        let sentiment = SENTIMENTS[(stable_hash(call_id) % SENTIMENTS.len() as u64) as usize];
        info!(call_id, blob_len = audio_data.len(), "transcription success (latency: {latency:.2}s)");
        Ok(Transcription { transcript: format!("Mock transcript for call {call_id}: customer and agent conversation..."),
                           sentiment: sentiment.to_string() })
    }
}

// FNV-1a: hash estable entre procesos, para que el sentimiento de un call_id
// sea siempre el mismo.
fn stable_hash(s: &str) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in s.as_bytes() {
        h ^= u64::from(*b);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h
}
