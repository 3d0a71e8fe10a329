//! Hub de notificaciones en tiempo real.
//!
//! Mantiene dos registros: todos los peers conectados al canal push y los
//! peers suscriptos explícitamente a un `call_id`. `publish` entrega primero
//! a los suscriptores del call y después a todos los conectados; un peer que
//! está en ambos registros recibe el evento dos veces (comportamiento
//! aceptado por el dashboard). Un envío fallido desconecta al peer ofensor;
//! publicar nunca devuelve error al llamador.

use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::providers::Transcription;

use call_domain::CallState;

/// Identidad de un peer conectado al canal push.
pub type PeerId = u64;

#[derive(Default)]
pub struct NotificationHub {
    next_peer_id: AtomicU64,
    peers: DashMap<PeerId, mpsc::UnboundedSender<String>>,
    call_subscribers: DashMap<String, HashSet<PeerId>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra un peer nuevo y devuelve su identidad junto con el extremo
    /// receptor por el que le llegarán los eventos serializados.
    pub fn attach(&self) -> (PeerId, mpsc::UnboundedReceiver<String>) {
        let peer = self.next_peer_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.peers.insert(peer, tx);
        info!(peer, total = self.peers.len(), "push peer connected");
        (peer, rx)
    }

    /// Da de baja un peer y lo remueve de todas las suscripciones por call.
    /// Idempotente: desconectar dos veces es inocuo.
    pub fn detach(&self, peer: PeerId) {
        self.peers.remove(&peer);
        for mut entry in self.call_subscribers.iter_mut() {
            entry.value_mut().remove(&peer);
        }
        self.call_subscribers.retain(|_, subs| !subs.is_empty());
        info!(peer, total = self.peers.len(), "push peer disconnected");
    }

    /// Suscribe un peer a los eventos de un `call_id` puntual.
    pub fn subscribe(&self, peer: PeerId, call_id: &str) {
        if !self.peers.contains_key(&peer) {
            return;
        }
        self.call_subscribers.entry(call_id.to_string()).or_default().insert(peer);
        info!(peer, call_id, "push peer subscribed");
    }

    /// Cantidad de peers conectados (para logs y tests).
    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    /// Fan-out de un cambio de estado.
    ///
    /// El evento se serializa una sola vez. El orden de entrega es
    /// suscriptores del call primero, luego broadcast global; los peers cuyo
    /// canal ya está cerrado se desconectan al final de la pasada.
    pub fn publish(&self, call_id: &str, state: CallState, ai_result: Option<&Transcription>) {
        let mut event = serde_json::json!({
            "type": "call_update",
            "call_id": call_id,
            "state": state.as_str(),
            "timestamp": Utc::now().to_rfc3339(),
        });
        if let Some(result) = ai_result {
            event["ai_result"] = serde_json::json!({
                "transcript": result.transcript,
                "sentiment": result.sentiment,
            });
        }
        let text = event.to_string();

        // Copiamos las identidades para no sostener guards del mapa durante
        // los envíos ni durante el detach de peers muertos.
        let per_call: Vec<PeerId> =
            self.call_subscribers.get(call_id).map(|subs| subs.iter().copied().collect()).unwrap_or_default();
        let everyone: Vec<PeerId> = self.peers.iter().map(|entry| *entry.key()).collect();

        let mut dead: Vec<PeerId> = Vec::new();
        for peer in per_call.iter().chain(everyone.iter()) {
            let delivered = match self.peers.get(peer) {
                Some(tx) => tx.send(text.clone()).is_ok(),
                None => continue,
            };
            if !delivered {
                dead.push(*peer);
            }
        }

        dead.sort_unstable();
        dead.dedup();
        for peer in dead {
            debug!(peer, call_id, "dropping unreachable push peer");
            self.detach(peer);
        }
    }
}
