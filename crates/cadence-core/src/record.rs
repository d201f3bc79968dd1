use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::SessionId;
use crate::params::GenerationParameters;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Idle,
    Initializing,
    Generating,
    Processing,
    Complete,
    Error,
}

impl Stage {
    /// A session in one of these stages still expects worker events.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Initializing | Self::Generating | Self::Processing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Generating => "generating",
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the finished artifact lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub artifact_id: String,
    pub filename: String,
    pub file_size_bytes: u64,
    pub download_reference: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFailure {
    pub message: String,
    /// The worker is retrying on an alternate backend; a completion may follow.
    pub fallback_in_progress: bool,
}

/// Observable state of the single generation session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Option<SessionId>,
    pub stage: Stage,
    pub progress: u8,
    pub message: String,
    pub parameters: Option<GenerationParameters>,
    pub result: Option<ArtifactDescriptor>,
    pub error: Option<SessionFailure>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.stage.is_active()
    }
}
