//! Wire vocabulary exchanged with the generation worker.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.
//! Payload field names follow the worker's camelCase spelling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::SessionId;
use crate::params::GenerationParameters;

/// Client → worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "generate_request")]
    GenerateRequest {
        #[serde(rename = "jobId")]
        session_id: SessionId,
        parameters: GenerationParameters,
    },

    #[serde(rename = "ping")]
    Ping { timestamp: DateTime<Utc> },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GenerateRequest { .. } => "generate_request",
            Self::Ping { .. } => "ping",
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Worker → client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "generation_progress")]
    Progress(ProgressUpdate),

    #[serde(rename = "generation_complete")]
    Complete(Completion),

    #[serde(rename = "generation_error")]
    Error(Failure),

    #[serde(rename = "pong")]
    Pong { timestamp: String },
}

impl ServerEvent {
    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Correlation id, when the event belongs to a session at all.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::Progress(update) => Some(&update.session_id),
            Self::Complete(completion) => Some(&completion.session_id),
            Self::Error(failure) => failure.session_id.as_ref(),
            Self::Pong { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Progress(_) => "generation_progress",
            Self::Complete(_) => "generation_complete",
            Self::Error(_) => "generation_error",
            Self::Pong { .. } => "pong",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStage {
    Initializing,
    Generating,
    Processing,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    #[serde(rename = "jobId")]
    pub session_id: SessionId,
    pub stage: ProgressStage,
    pub progress: u16,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    #[serde(rename = "jobId")]
    pub session_id: SessionId,
    #[serde(rename = "fileId")]
    pub artifact_id: String,
    pub filename: String,
    #[serde(rename = "fileSize")]
    pub file_size_bytes: u64,
    #[serde(rename = "downloadUrl", default)]
    pub download_reference: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Absent when the worker could not even parse the request.
    #[serde(rename = "jobId", default)]
    pub session_id: Option<SessionId>,
    pub error: String,
    #[serde(rename = "fallback", default)]
    pub fallback_in_progress: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{Backend, DurationBucket, Mood, MusicKey, MusicStyle, Tempo};
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn generate_request_wire_shape() {
        let event = ClientEvent::GenerateRequest {
            session_id: SessionId::from_raw("job_1_0_x"),
            parameters: GenerationParameters {
                backend: Backend::Simple,
                style: MusicStyle::Classical,
                key: MusicKey::CMajor,
                tempo: Tempo::DEFAULT,
                mood: Mood::Happy,
                duration: DurationBucket::ThirtySeconds,
                prompt: None,
            },
        };
        let value: serde_json::Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
        assert_eq!(value["event"], "generate_request");
        assert_eq!(value["data"]["jobId"], "job_1_0_x");
        assert_eq!(value["data"]["parameters"]["key"], "C major");
        assert_eq!(value["data"]["parameters"]["tempo"], 100);
    }

    #[test]
    fn decodes_progress() {
        let frame = json!({
            "event": "generation_progress",
            "data": {"jobId": "job_a", "stage": "generating", "progress": 30, "message": "Running model..."}
        })
        .to_string();
        let event = ServerEvent::decode(&frame).unwrap();
        assert_matches!(&event, ServerEvent::Progress(ProgressUpdate { stage: ProgressStage::Generating, progress: 30, .. }));
        assert_eq!(event.session_id().unwrap().as_str(), "job_a");
    }

    #[test]
    fn decodes_completion() {
        let frame = json!({
            "event": "generation_complete",
            "data": {
                "jobId": "job_a",
                "fileId": "f1",
                "filename": "out.mid",
                "fileSize": 2048,
                "downloadUrl": "/api/files/f1/download"
            }
        })
        .to_string();
        let ServerEvent::Complete(done) = ServerEvent::decode(&frame).unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(done.artifact_id, "f1");
        assert_eq!(done.filename, "out.mid");
        assert_eq!(done.file_size_bytes, 2048);
        assert_eq!(done.download_reference, "/api/files/f1/download");
    }

    #[test]
    fn decodes_error_without_job_id() {
        let frame = r#"{"event":"generation_error","data":{"jobId":null,"error":"bad payload","fallback":false}}"#;
        let event = ServerEvent::decode(frame).unwrap();
        assert!(event.session_id().is_none());
        assert_eq!(event.name(), "generation_error");
    }

    #[test]
    fn fallback_flag_maps() {
        let frame = r#"{"event":"generation_error","data":{"jobId":"job_a","error":"HF down","fallback":true}}"#;
        let ServerEvent::Error(failure) = ServerEvent::decode(frame).unwrap() else {
            panic!("expected failure");
        };
        assert!(failure.fallback_in_progress);
    }

    #[test]
    fn pong_has_no_session() {
        let frame = r#"{"event":"pong","data":{"timestamp":"2026-01-01T00:00:00"}}"#;
        let event = ServerEvent::decode(frame).unwrap();
        assert!(event.session_id().is_none());
    }

    #[test]
    fn unknown_event_is_an_error() {
        assert!(ServerEvent::decode(r#"{"event":"mystery","data":{}}"#).is_err());
    }
}
