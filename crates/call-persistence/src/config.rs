//! Configuración de almacenamiento.
//!
//! El pool se dimensiona como base + overflow: `DATABASE_POOL_SIZE`
//! conexiones persistentes que mantienen caliente el camino de ingesta
//! (el objetivo de latencia depende de no pagar handshakes por request) y
//! `DATABASE_MAX_OVERFLOW` de margen para ráfagas de paquetes. `DATABASE_URL`
//! es obligatoria; sin ella el arranque aborta.

use std::env;
use std::sync::Once;

static DOTENV: Once = Once::new();

/// Carga `.env` una sola vez, compartida entre binario y tests.
pub fn init_dotenv() {
    DOTENV.call_once(|| {
        let _ = dotenvy::dotenv(); // que no exista .env no es un error
    });
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// URL completa de conexión (postgres://...).
    pub url: String,
    /// Conexiones persistentes del pool.
    pub pool_size: u32,
    /// Conexiones extra admitidas durante ráfagas de ingesta.
    pub max_overflow: u32,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        init_dotenv();
        let url = env::var("DATABASE_URL").expect("DATABASE_URL not set");
        let pool_size = read_u32("DATABASE_POOL_SIZE", 10);
        let max_overflow = read_u32("DATABASE_MAX_OVERFLOW", 20);
        Self { url, pool_size, max_overflow }
    }

    /// Piso de conexiones mantenidas vivas por el pool.
    pub fn min_connections(&self) -> u32 {
        self.pool_size.max(1)
    }

    /// Límite superior total del pool (base + overflow).
    pub fn max_connections(&self) -> u32 {
        self.pool_size.saturating_add(self.max_overflow).max(1)
    }
}

fn read_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
