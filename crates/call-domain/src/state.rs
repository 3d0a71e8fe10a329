//! Máquina de estados de una llamada.
//!
//! El enum define el contrato observable y estable del servicio: los nombres
//! serializados son los que viajan por la API y los que se guardan en la
//! columna `state`. Las transiciones se intentan por valor; una transición
//! inválida no es un error, es un `false` que el llamador decide cómo tratar.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// Estados posibles de una llamada.
///
/// Grafo de transiciones:
/// - `InProgress` -> `ProcessingAi` | `Failed` | `Completed`
/// - `ProcessingAi` -> `Completed` | `Failed`
/// - `Failed` -> `ProcessingAi` | `Archived`
/// - `Completed` -> `Archived`
/// - `Archived` -> (terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallState {
    InProgress,
    ProcessingAi,
    Completed,
    Failed,
    Archived,
}

impl CallState {
    /// Transiciones válidas desde `self`.
    pub fn valid_transitions(self) -> &'static [CallState] {
        match self {
            CallState::InProgress => &[CallState::ProcessingAi, CallState::Failed, CallState::Completed],
            CallState::ProcessingAi => &[CallState::Completed, CallState::Failed],
            CallState::Failed => &[CallState::ProcessingAi, CallState::Archived],
            CallState::Completed => &[CallState::Archived],
            CallState::Archived => &[],
        }
    }

    /// Indica si la transición `self -> next` está permitida.
    pub fn can_transition_to(self, next: CallState) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Nombre estable del estado (el mismo que produce serde).
    pub fn as_str(self) -> &'static str {
        match self {
            CallState::InProgress => "IN_PROGRESS",
            CallState::ProcessingAi => "PROCESSING_AI",
            CallState::Completed => "COMPLETED",
            CallState::Failed => "FAILED",
            CallState::Archived => "ARCHIVED",
        }
    }

    /// Inverso de `as_str`, para filas leídas de la base.
    pub fn parse(s: &str) -> Result<CallState, DomainError> {
        match s {
            "IN_PROGRESS" => Ok(CallState::InProgress),
            "PROCESSING_AI" => Ok(CallState::ProcessingAi),
            "COMPLETED" => Ok(CallState::Completed),
            "FAILED" => Ok(CallState::Failed),
            "ARCHIVED" => Ok(CallState::Archived),
            other => Err(DomainError::UnknownState(other.to_string())),
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use CallState::*;
        assert!(InProgress.can_transition_to(ProcessingAi));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Failed));
        assert!(ProcessingAi.can_transition_to(Completed));
        assert!(ProcessingAi.can_transition_to(Failed));
        assert!(Failed.can_transition_to(ProcessingAi));
        assert!(Failed.can_transition_to(Archived));
        assert!(Completed.can_transition_to(Archived));

        assert!(!InProgress.can_transition_to(Archived));
        assert!(!ProcessingAi.can_transition_to(InProgress));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Completed.can_transition_to(ProcessingAi));
        assert!(!Archived.can_transition_to(InProgress));
        assert!(Archived.valid_transitions().is_empty());
    }

    #[test]
    fn test_wire_roundtrip() {
        for st in [CallState::InProgress,
                   CallState::ProcessingAi,
                   CallState::Completed,
                   CallState::Failed,
                   CallState::Archived]
        {
            assert_eq!(CallState::parse(st.as_str()).unwrap(), st);
            // serde y as_str deben coincidir
            let json = serde_json::to_string(&st).unwrap();
            assert_eq!(json, format!("\"{}\"", st.as_str()));
        }
        assert!(CallState::parse("BOGUS").is_err());
    }
}
