//! JSON bodies carried on the backend link and the command channel.
//!
//! Backend requests are tagged with the route they address:
//!
//! | route      | request          | reply                          |
//! |------------|------------------|--------------------------------|
//! | `status`   | `{mode, data}`   | `{message, count}` / `{error}` |
//! | `get-mode` | `{id, data}`     | `{id, mode}`                   |
//!
//! `data` is the T×C window, oldest row first. A `get-mode` reply with a
//! missing, empty or `"default"` mode means the backend has no model.

use serde::{Deserialize, Serialize};

use crate::app::commands::{InferenceReply, InferenceResult, RemoteCommand};
use crate::error::CommsError;
use crate::fsm::Mode;
use crate::sensors::window::{CHANNELS, WINDOW_LEN};

pub type WindowMatrix = [[f32; CHANNELS]; WINDOW_LEN];

/// Device → backend.
#[derive(Debug, Serialize)]
#[serde(tag = "route", rename_all = "kebab-case")]
pub enum BackendRequest<'a> {
    /// Labelled window for the training set.
    Status {
        mode: &'static str,
        data: &'a WindowMatrix,
    },
    /// Window to classify.
    GetMode { id: u32, data: &'a WindowMatrix },
}

/// Backend → device.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "route", rename_all = "kebab-case")]
pub enum BackendReply {
    Status {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        count: Option<u32>,
        #[serde(default)]
        error: Option<String>,
    },
    GetMode {
        id: u32,
        #[serde(default)]
        mode: Option<String>,
    },
}

/// What an upload reply means for the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadAck {
    Accepted { count: Option<u32> },
    Rejected(String),
}

/// Decoded backend frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    Upload(UploadAck),
    Inference(InferenceReply),
}

pub fn encode_request(req: &BackendRequest<'_>) -> Result<Vec<u8>, CommsError> {
    serde_json::to_vec(req).map_err(|_| CommsError::Encode)
}

/// Map a backend mode string onto an inference result.
pub fn inference_from_label(label: Option<&str>) -> InferenceResult {
    match label.map(str::trim) {
        None | Some("") => InferenceResult::NoModel,
        Some(l) if l.eq_ignore_ascii_case("default") => InferenceResult::NoModel,
        Some(l) => Mode::parse(l).map_or(InferenceResult::NoModel, InferenceResult::Mode),
    }
}

pub fn decode_reply(payload: &[u8]) -> Result<BackendEvent, CommsError> {
    let reply: BackendReply = serde_json::from_slice(payload).map_err(|_| CommsError::Decode)?;
    Ok(match reply {
        BackendReply::Status {
            error: Some(e), ..
        } => BackendEvent::Upload(UploadAck::Rejected(e)),
        BackendReply::Status { count, .. } => BackendEvent::Upload(UploadAck::Accepted { count }),
        BackendReply::GetMode { id, mode } => BackendEvent::Inference(InferenceReply {
            request: id,
            result: inference_from_label(mode.as_deref()),
        }),
    })
}

// ───────────────────────────────────────────────────────────────
// Remote command channel
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CommandMessage {
    mode: String,
    #[serde(default)]
    transcription: String,
    #[serde(default)]
    sequence: Option<u64>,
}

/// Acknowledgement written back for a command that did not parse.
pub const ACK_ERROR: &str = "error";

/// Parse one newline-delimited command. A command without a usable mode or
/// without a sequence number is rejected.
pub fn parse_command(line: &[u8]) -> Result<RemoteCommand, CommsError> {
    let msg: CommandMessage = serde_json::from_slice(line).map_err(|_| CommsError::Decode)?;
    let mode = Mode::parse(&msg.mode).ok_or(CommsError::Decode)?;
    let sequence = msg.sequence.ok_or(CommsError::Decode)?;
    Ok(RemoteCommand {
        mode,
        annotation: msg.transcription,
        sequence,
    })
}

/// Status string returned to the sender.
pub fn ack_for(result: &Result<RemoteCommand, CommsError>) -> String {
    match result {
        Ok(cmd) => format!("received:{}", cmd.mode.label()),
        Err(_) => ACK_ERROR.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_body_carries_mode_and_matrix() {
        let data = [[0.0f32; CHANNELS]; WINDOW_LEN];
        let body = encode_request(&BackendRequest::Status {
            mode: Mode::Study.label(),
            data: &data,
        })
        .unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["route"], "status");
        assert_eq!(v["mode"], "STUDY");
        assert_eq!(v["data"].as_array().unwrap().len(), WINDOW_LEN);
        assert_eq!(v["data"][0].as_array().unwrap().len(), CHANNELS);
    }

    #[test]
    fn get_mode_body_carries_id() {
        let data = [[1.0f32; CHANNELS]; WINDOW_LEN];
        let body = encode_request(&BackendRequest::GetMode { id: 7, data: &data }).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["route"], "get-mode");
        assert_eq!(v["id"], 7);
    }

    #[test]
    fn decodes_inference_replies() {
        let ev = decode_reply(br#"{"route":"get-mode","id":3,"mode":"relax"}"#).unwrap();
        assert_eq!(
            ev,
            BackendEvent::Inference(InferenceReply {
                request: 3,
                result: InferenceResult::Mode(Mode::Relax)
            })
        );
        let ev = decode_reply(br#"{"route":"get-mode","id":4,"mode":null}"#).unwrap();
        assert!(matches!(
            ev,
            BackendEvent::Inference(InferenceReply {
                result: InferenceResult::NoModel,
                ..
            })
        ));
    }

    #[test]
    fn unknown_or_default_label_means_no_model() {
        assert_eq!(inference_from_label(Some("default")), InferenceResult::NoModel);
        assert_eq!(inference_from_label(Some("party")), InferenceResult::NoModel);
        assert_eq!(inference_from_label(None), InferenceResult::NoModel);
        assert_eq!(
            inference_from_label(Some(" AWAY ")),
            InferenceResult::Mode(Mode::Away)
        );
    }

    #[test]
    fn decodes_upload_replies() {
        let ok = decode_reply(br#"{"route":"status","message":"Data saved","count":12}"#).unwrap();
        assert_eq!(ok, BackendEvent::Upload(UploadAck::Accepted { count: Some(12) }));
        let bad = decode_reply(br#"{"route":"status","error":"Expected 210 features"}"#).unwrap();
        assert!(matches!(bad, BackendEvent::Upload(UploadAck::Rejected(_))));
        assert_eq!(decode_reply(b"not json"), Err(CommsError::Decode));
    }

    #[test]
    fn command_parsing_and_acks() {
        let ok = parse_command(br#"{"mode":"sleep","transcription":"good night","sequence":5}"#);
        let cmd = ok.as_ref().unwrap();
        assert_eq!(cmd.mode, Mode::Sleep);
        assert_eq!(cmd.sequence, 5);
        assert_eq!(cmd.annotation, "good night");
        assert_eq!(ack_for(&ok), "received:SLEEP");

        let no_seq = parse_command(br#"{"mode":"sleep"}"#);
        assert_eq!(no_seq, Err(CommsError::Decode));
        assert_eq!(ack_for(&no_seq), "error");

        let bad_mode = parse_command(br#"{"mode":"disco","sequence":1}"#);
        assert_eq!(bad_mode, Err(CommsError::Decode));
    }
}
