use crate::ids::SessionId;

/// Local contract violations surfaced synchronously to the caller.
///
/// Remote failures never appear here; they land in the session record as a
/// terminal `error` stage.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("channel is not connected")]
    NotConnected,

    /// Connected, but the outbound queue has no room for the request.
    #[error("send queue is full")]
    SendQueueFull,

    #[error("request not sent: {0}")]
    SendFailed(String),

    #[error("session {active} is still in progress")]
    SessionBusy { active: SessionId },

    #[error("invalid parameters: {0}")]
    InvalidParameters(#[from] ParameterError),

    #[error("no active session")]
    NoActiveSession,

    #[error("event channel closed")]
    ChannelClosed,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParameterError {
    #[error("tempo {0} BPM is outside 40..=180")]
    TempoOutOfRange(u16),

    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_names_the_active_session() {
        let err = SessionError::SessionBusy {
            active: SessionId::from_raw("job_1_0_abc"),
        };
        assert_eq!(err.to_string(), "session job_1_0_abc is still in progress");
    }

    #[test]
    fn parameter_error_converts() {
        let err: SessionError = ParameterError::TempoOutOfRange(12).into();
        assert_eq!(err.to_string(), "invalid parameters: tempo 12 BPM is outside 40..=180");
    }
}
