//! Inbound commands and results for the application service.
//!
//! These arrive from outside the state machine (the backend client and the
//! remote command listener) and are interpreted by the
//! [`AppService`](super::service::AppService). None of them carries the
//! authority to change device state by itself.

use crate::fsm::Mode;

/// Outcome of one inference request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceResult {
    /// The backend classified the window.
    Mode(Mode),
    /// No trained model, or no usable answer.
    NoModel,
}

/// An inference result tagged with the request it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceReply {
    pub request: u32,
    pub result: InferenceResult,
}

/// A mode change requested by an external app over the command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub mode: Mode,
    /// Free text that came with the command (voice transcription). Opaque
    /// to the device.
    pub annotation: String,
    /// Strictly increasing per sender; anything at or below the last
    /// applied value is stale.
    pub sequence: u64,
}
