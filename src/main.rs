//! Punto de entrada del servicio.
//!
//! Arranque: .env + config, tracing, pool Postgres + bootstrap de esquema,
//! cableado del contexto y servidor axum con shutdown cooperativo. Un fallo
//! de inicialización (base inalcanzable incluida) termina el proceso con
//! código distinto de cero; un apagado limpio devuelve cero.

use anyhow::Context as _;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use call_persistence::{build_pool, ensure_schema, CallStore};
use callflow_rust::api;
use callflow_rust::config::AppConfig;
use callflow_rust::context::AppContext;
use callflow_rust::providers::MockTranscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env();

    let filter = EnvFilter::try_new(cfg.log_level.to_lowercase()).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("initializing database...");
    let pool = build_pool(&cfg.database).await.context("database unreachable at startup")?;
    ensure_schema(&pool).await.context("schema bootstrap failed")?;

    let store = CallStore::new(pool);
    let transcriber = Arc::new(MockTranscriber::new(cfg.ai_failure_rate));
    let ctx = AppContext::new(store, transcriber, cfg.max_ai_retries);

    let app = api::router(ctx);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("cannot bind {}", cfg.bind_addr))?;
    info!("application started, listening on {}", cfg.bind_addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    // Las corridas del orquestador son tareas desacopladas; al bajar el
    // runtime se cancelan cooperativamente y la base queda como fuente de
    // verdad para el próximo arranque.
    info!("application shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
