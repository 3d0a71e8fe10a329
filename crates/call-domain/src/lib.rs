//! call-domain: entidades y reglas del dominio de llamadas.
//!
//! Propósito:
//! - Definir las tres entidades del pipeline (Call, Packet, AiResult) sin
//!   acoplarse a ninguna capa de transporte ni de persistencia.
//! - Centralizar la máquina de estados de una llamada y sus transiciones
//!   permitidas (la decisión es en memoria; la capa de persistencia la
//!   vuelve autoritativa).
//! - Validar payloads de ingesta antes de tocar cualquier fila.
//!
//! Re-exports: se exponen los símbolos clave para uso desde el servicio y
//! los tests.

pub mod ai_result;
pub mod call;
pub mod error;
pub mod packet;
pub mod state;

pub use ai_result::{AiResult, AiResultStatus};
pub use call::Call;
pub use error::DomainError;
pub use packet::{Packet, PacketPayload};
pub use state::CallState;
