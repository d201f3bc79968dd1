//! Stage transitions for the one active generation session.
//!
//! ```text
//! idle ──submit──▶ initializing ─┬─progress──▶ generating ⇄ processing
//!                                ├─complete──▶ complete ──reset──▶ idle
//!                                └─error─────▶ error ─────reset──▶ idle
//!                                              error ──complete──▶ complete
//! ```
//!
//! The machine does no correlation of its own: callers route only events
//! whose id matches the active session (see [`crate::router`]).

use chrono::Utc;
use tracing::debug;

use crate::errors::SessionError;
use crate::events::{Completion, Failure, ProgressStage, ProgressUpdate};
use crate::ids::SessionId;
use crate::params::GenerationParameters;
use crate::record::{ArtifactDescriptor, SessionFailure, SessionRecord, Stage};

const STARTING_MESSAGE: &str = "Starting generation...";
const COMPLETE_MESSAGE: &str = "Generation completed successfully!";
/// 100 is reserved for a completed session.
const PROGRESS_CEILING: u16 = 99;

/// Result of feeding one event to the machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The record changed. `from == to` for in-stage progress updates.
    Applied { from: Stage, to: Stage },
    /// The event is not valid in the current stage; nothing changed.
    Ignored { stage: Stage },
}

impl Transition {
    pub fn changed(self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

#[derive(Debug, Default)]
pub struct SessionStateMachine {
    record: SessionRecord,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn stage(&self) -> Stage {
        self.record.stage
    }

    /// Start a new session. Allowed from idle and from either terminal stage.
    pub fn begin(
        &mut self,
        session_id: SessionId,
        parameters: GenerationParameters,
    ) -> Result<(), SessionError> {
        if self.record.is_active() {
            let active = self
                .record
                .session_id
                .clone()
                .unwrap_or_else(|| SessionId::from_raw(""));
            return Err(SessionError::SessionBusy { active });
        }
        self.record = SessionRecord {
            session_id: Some(session_id),
            stage: Stage::Initializing,
            progress: 0,
            message: STARTING_MESSAGE.to_owned(),
            parameters: Some(parameters),
            result: None,
            error: None,
            started_at: Some(Utc::now()),
            finished_at: None,
        };
        Ok(())
    }

    /// Progress is clamped to never run backwards; the channel gives no
    /// ordering guarantee.
    pub fn apply_progress(&mut self, update: ProgressUpdate) -> Transition {
        let from = self.record.stage;
        if !from.is_active() {
            debug!(stage = %from, "progress outside an active stage ignored");
            return Transition::Ignored { stage: from };
        }
        let to = match update.stage {
            ProgressStage::Generating => Stage::Generating,
            ProgressStage::Processing => Stage::Processing,
            // No edge leads back to initializing once the worker has moved on.
            ProgressStage::Initializing => from,
        };
        let incoming = update.progress.min(PROGRESS_CEILING) as u8;
        self.record.stage = to;
        self.record.progress = self.record.progress.max(incoming);
        self.record.message = update.message;
        Transition::Applied { from, to }
    }

    /// A completion after an `error` still wins: the worker may have
    /// recovered on a fallback backend.
    pub fn apply_completion(&mut self, completion: Completion) -> Transition {
        let from = self.record.stage;
        if !(from.is_active() || from == Stage::Error) {
            debug!(stage = %from, "completion ignored");
            return Transition::Ignored { stage: from };
        }
        self.record.stage = Stage::Complete;
        self.record.progress = 100;
        self.record.message = COMPLETE_MESSAGE.to_owned();
        self.record.error = None;
        self.record.result = Some(ArtifactDescriptor {
            artifact_id: completion.artifact_id,
            filename: completion.filename,
            file_size_bytes: completion.file_size_bytes,
            download_reference: completion.download_reference,
        });
        self.record.finished_at = Some(Utc::now());
        Transition::Applied {
            from,
            to: Stage::Complete,
        }
    }

    pub fn apply_failure(&mut self, failure: Failure) -> Transition {
        let from = self.record.stage;
        if !from.is_active() {
            debug!(stage = %from, "failure ignored");
            return Transition::Ignored { stage: from };
        }
        self.record.stage = Stage::Error;
        self.record.message = if failure.fallback_in_progress {
            format!("Primary backend failed: {}. Trying fallback...", failure.error)
        } else {
            format!("Generation failed: {}", failure.error)
        };
        self.record.error = Some(SessionFailure {
            message: failure.error,
            fallback_in_progress: failure.fallback_in_progress,
        });
        self.record.finished_at = Some(Utc::now());
        Transition::Applied {
            from,
            to: Stage::Error,
        }
    }

    /// Undo a `begin` whose request never reached the worker. `previous` is
    /// the record as it was before that `begin`.
    pub fn restore(&mut self, previous: SessionRecord) {
        debug!(from = %self.record.stage, to = %previous.stage, "begin rolled back");
        self.record = previous;
    }

    /// Back to idle from any stage.
    pub fn reset(&mut self) -> Stage {
        let from = self.record.stage;
        self.record = SessionRecord::idle();
        from
    }
}
