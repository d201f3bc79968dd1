use tracing::{debug, trace};

use crate::events::ServerEvent;
use crate::ids::Correlator;
use crate::machine::{SessionStateMachine, Transition};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The event carried the active id and reached the state machine.
    Applied(Transition),
    /// Stale or foreign session id. Expected after a reset; not an error.
    Discarded,
    /// Not a session event (heartbeat, id-less failure).
    Unrouted,
}

impl RouteOutcome {
    pub fn changed(self) -> bool {
        matches!(self, Self::Applied(t) if t.changed())
    }
}

/// Admission filter between the channel and the state machine.
pub struct EventRouter;

impl EventRouter {
    pub fn route(
        correlator: &Correlator,
        machine: &mut SessionStateMachine,
        event: ServerEvent,
    ) -> RouteOutcome {
        let Some(session_id) = event.session_id() else {
            trace!(event = event.name(), "event without session id");
            return RouteOutcome::Unrouted;
        };
        if !correlator.is_current(session_id) {
            debug!(
                event = event.name(),
                session_id = %session_id,
                active = ?correlator.current().map(|id| id.as_str()),
                "discarding event for inactive session"
            );
            return RouteOutcome::Discarded;
        }

        let transition = match event {
            ServerEvent::Progress(update) => machine.apply_progress(update),
            ServerEvent::Complete(completion) => machine.apply_completion(completion),
            ServerEvent::Error(failure) => machine.apply_failure(failure),
            ServerEvent::Pong { .. } => return RouteOutcome::Unrouted,
        };
        RouteOutcome::Applied(transition)
    }
}
