//! Contexto de servicio.
//!
//! Los singletons de proceso (pool/store, hub de notificaciones, adaptador
//! de transcripción y orquestador) se cablean acá como dependencias
//! explícitas en lugar de globals ambientales. Todo handler y toda tarea de
//! background reciben un `Arc<AppContext>`.

use std::sync::Arc;

use call_persistence::CallStore;

use crate::notify::NotificationHub;
use crate::providers::Transcriber;
use crate::worker::ProcessingOrchestrator;

pub struct AppContext {
    pub store: CallStore,
    pub hub: NotificationHub,
    pub transcriber: Arc<dyn Transcriber>,
    pub orchestrator: ProcessingOrchestrator,
}

impl AppContext {
    pub fn new(store: CallStore, transcriber: Arc<dyn Transcriber>, max_ai_retries: u32) -> Arc<Self> {
        Arc::new(Self { store,
                        hub: NotificationHub::new(),
                        transcriber,
                        orchestrator: ProcessingOrchestrator::new(max_ai_retries) })
    }
}
