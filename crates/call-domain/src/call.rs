//! Entidad `Call`: una sesión lógica identificada por `call_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::CallState;

/// Fila principal de seguimiento de una llamada.
///
/// `last_sequence` registra la secuencia más alta jamás observada (no la más
/// alta contigua); arranca en -1 y nunca decrece. `updated_at` se mueve en
/// cada transición de estado y en cada avance de `last_sequence`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub call_id: String,
    pub state: CallState,
    pub last_sequence: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Call {
    /// Llamada recién creada por su primer paquete.
    pub fn new(call_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Call { call_id: call_id.into(),
               state: CallState::InProgress,
               last_sequence: -1,
               created_at: now,
               updated_at: now }
    }

    /// Intenta la transición `state -> new_state`.
    ///
    /// Devuelve `true` y actualiza `updated_at` si la arista existe en el
    /// grafo; devuelve `false` sin mutar nada si no existe.
    pub fn transition_state(&mut self, new_state: CallState) -> bool {
        if !self.state.can_transition_to(new_state) {
            return false;
        }
        self.state = new_state;
        self.updated_at = Utc::now();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_call_defaults() {
        let call = Call::new("c1");
        assert_eq!(call.state, CallState::InProgress);
        assert_eq!(call.last_sequence, -1);
    }

    #[test]
    fn test_transition_mutates_only_when_valid() {
        let mut call = Call::new("c1");
        let before = call.updated_at;

        assert!(call.transition_state(CallState::ProcessingAi));
        assert_eq!(call.state, CallState::ProcessingAi);

        // transición inválida: no-op observable como false
        assert!(!call.transition_state(CallState::InProgress));
        assert_eq!(call.state, CallState::ProcessingAi);

        assert!(call.transition_state(CallState::Completed));
        assert!(call.transition_state(CallState::Archived));
        assert!(!call.transition_state(CallState::Completed));
        assert!(call.updated_at >= before);
    }
}
