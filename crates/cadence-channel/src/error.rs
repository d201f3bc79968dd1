#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel is not connected")]
    NotConnected,

    #[error("send queue is full")]
    SendQueueFull,

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ChannelError {
    /// Whether the caller may retry once connectivity returns.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_classification() {
        assert!(ChannelError::NotConnected.is_disconnect());
        assert!(ChannelError::Transport("reset".into()).is_disconnect());
        assert!(!ChannelError::SendQueueFull.is_disconnect());
        assert!(!ChannelError::Connect("refused".into()).is_disconnect());
    }
}
