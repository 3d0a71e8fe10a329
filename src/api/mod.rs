//! Superficie pública del servicio: API HTTP + canal push.
//!
//! Capa fina: traduce requests de wire a llamadas sobre el contexto (store,
//! orquestador, hub) y de vuelta. CORS permisivo para el dashboard y trazas
//! HTTP como capas tower.

pub mod routes;
pub mod types;
pub mod ws;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::context::AppContext;

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new().route("/", get(routes::banner))
                 .route("/health", get(routes::health))
                 .route("/v1/call/stream/:call_id", post(routes::ingest_packet))
                 .route("/v1/call/:call_id/status", get(routes::call_status))
                 .route("/ws/dashboard", get(ws::dashboard))
                 .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http())
                                             .layer(CorsLayer::permissive()))
                 .with_state(ctx)
}
