//! The single-session facade.
//!
//! [`GenerationSession`] glues the pieces together: it checks connectivity,
//! mints the correlation id, drives the state machine, and routes every
//! inbound event through the [`EventRouter`]. Observers watch the record
//! through [`GenerationSession::subscribe`]; the session itself needs
//! `&mut self` and so has exactly one driver.

use std::sync::Arc;
use std::time::Duration;

use cadence_channel::{ChannelError, ChannelManager, ConnectivityState};
use cadence_core::{
    ClientEvent, Correlator, EventRouter, GenerationParameters, RouteOutcome, ServerEvent,
    SessionError, SessionId, SessionRecord, SessionStateMachine, Stage,
};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How long a fallback error waits for a superseding completion.
pub const DEFAULT_FALLBACK_GRACE: Duration = Duration::from_secs(120);

pub struct GenerationSession {
    channel: Arc<ChannelManager>,
    correlator: Correlator,
    machine: SessionStateMachine,
    record: watch::Sender<SessionRecord>,
    fallback_grace: Duration,
}

impl GenerationSession {
    pub fn new(channel: Arc<ChannelManager>) -> Self {
        let (record, _) = watch::channel(SessionRecord::idle());
        Self {
            channel,
            correlator: Correlator::new(),
            machine: SessionStateMachine::new(),
            record,
            fallback_grace: DEFAULT_FALLBACK_GRACE,
        }
    }

    #[must_use]
    pub fn with_fallback_grace(mut self, grace: Duration) -> Self {
        self.fallback_grace = grace;
        self
    }

    pub fn channel(&self) -> &Arc<ChannelManager> {
        &self.channel
    }

    /// Start a generation task.
    ///
    /// Checked in order: parameters, connectivity, then whether a session is
    /// already running. Nothing is minted or sent unless all three pass. A
    /// request the channel refuses leaves the record and the active id as
    /// they were before the call.
    pub fn submit(&mut self, parameters: GenerationParameters) -> Result<SessionId, SessionError> {
        parameters.validate()?;
        if !self.channel.is_connected() {
            debug!("submit refused: channel not connected");
            return Err(SessionError::NotConnected);
        }
        if let Some(active) = self.active_session().filter(|_| self.machine.record().is_active()) {
            return Err(SessionError::SessionBusy {
                active: active.clone(),
            });
        }

        let previous_id = self.correlator.current().cloned();
        let previous_record = self.machine.record().clone();
        let session_id = self.correlator.mint();
        if let Err(e) = self.machine.begin(session_id.clone(), parameters.clone()) {
            self.correlator.restore(previous_id);
            return Err(e);
        }

        let request = ClientEvent::GenerateRequest {
            session_id: session_id.clone(),
            parameters,
        };
        if let Err(e) = self.channel.send(&request) {
            // Nothing went out: the earlier session and its outcome stay as they were.
            warn!(session_id = %session_id, error = %e, "generate request not sent, rolling back");
            self.correlator.restore(previous_id);
            self.machine.restore(previous_record);
            return Err(send_error(e));
        }

        info!(session_id = %session_id, "generation requested");
        self.publish();
        Ok(session_id)
    }

    /// Drop the current session, whatever its stage. The worker is not told;
    /// its late events for the old id are discarded on arrival.
    pub fn reset(&mut self) {
        let previous = self.correlator.clear();
        let from = self.machine.reset();
        if let Some(session_id) = previous {
            info!(session_id = %session_id, stage = %from, "session reset");
        }
        self.publish();
    }

    /// Route one inbound event.
    pub fn handle(&mut self, event: ServerEvent) -> RouteOutcome {
        let outcome = EventRouter::route(&self.correlator, &mut self.machine, event);
        if outcome.changed() {
            let record = self.machine.record();
            debug!(
                session_id = ?record.session_id.as_ref().map(SessionId::as_str),
                stage = %record.stage,
                progress = record.progress,
                "session updated"
            );
            self.publish();
        }
        outcome
    }

    /// Wait for the next event from the channel and route it.
    ///
    /// `None` once the channel has nothing more to deliver.
    pub async fn next(&mut self) -> Option<RouteOutcome> {
        let event = self.channel.recv().await?;
        Some(self.handle(event))
    }

    /// Pump events until the active session settles.
    ///
    /// A failure flagged as falling back is not final: the worker may still
    /// complete on another backend, so it is given the fallback grace period.
    pub async fn wait_for_outcome(&mut self) -> Result<SessionRecord, SessionError> {
        if self.active_session().is_none() {
            return Err(SessionError::NoActiveSession);
        }
        let mut grace_deadline: Option<Instant> = None;
        loop {
            let record = self.machine.record();
            let falling_back = record
                .error
                .as_ref()
                .is_some_and(|failure| failure.fallback_in_progress);
            match record.stage {
                Stage::Idle => return Err(SessionError::NoActiveSession),
                Stage::Complete => return Ok(record.clone()),
                Stage::Error if !falling_back => return Ok(record.clone()),
                Stage::Error => {
                    let deadline = *grace_deadline
                        .get_or_insert_with(|| Instant::now() + self.fallback_grace);
                    match tokio::time::timeout_at(deadline, self.next()).await {
                        Ok(Some(_)) => {}
                        Ok(None) | Err(_) => {
                            debug!("no completion after fallback, settling on the error");
                            return Ok(self.machine.record().clone());
                        }
                    }
                }
                Stage::Initializing | Stage::Generating | Stage::Processing => {
                    if self.next().await.is_none() {
                        return Err(SessionError::ChannelClosed);
                    }
                }
            }
        }
    }

    pub fn record(&self) -> &SessionRecord {
        self.machine.record()
    }

    pub fn active_session(&self) -> Option<&SessionId> {
        self.correlator.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionRecord> {
        self.record.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn connectivity(&self) -> watch::Receiver<ConnectivityState> {
        self.channel.subscribe()
    }

    fn publish(&self) {
        let _ = self.record.send_replace(self.machine.record().clone());
    }
}

fn send_error(error: ChannelError) -> SessionError {
    match error {
        ChannelError::SendQueueFull => SessionError::SendQueueFull,
        e if e.is_disconnect() => SessionError::NotConnected,
        e => SessionError::SendFailed(e.to_string()),
    }
}
