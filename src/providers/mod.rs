//! Proveedores externos del servicio.
//!
//! El único proveedor actual es el de transcripción. El trait es el punto de
//! intercambio: el resto del sistema no sabe si habla con el mock o con un
//! servicio real.

pub mod transcriber;

pub use transcriber::{MockTranscriber, Transcriber, TranscriberError, Transcription};
