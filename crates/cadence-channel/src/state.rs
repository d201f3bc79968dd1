use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ChannelPhase {
    /// Never started, or shut down with `disconnect`.
    #[default]
    Idle,
    Connecting,
    Connected,
    /// Lost or failed to dial; a retry is scheduled.
    Disconnected,
    /// Retries exhausted; waits for an explicit `reconnect`.
    GaveUp,
}

impl ChannelPhase {
    /// No driver activity will change this phase on its own.
    pub fn is_dormant(self) -> bool {
        matches!(self, Self::Idle | Self::GaveUp)
    }
}

impl fmt::Display for ChannelPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::GaveUp => "gave-up",
        })
    }
}

/// Read-only view of the channel published to everyone but the driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectivityState {
    pub phase: ChannelPhase,
    /// Reconnect attempts made since the last successful connection.
    pub attempts: u32,
}

impl ConnectivityState {
    pub fn connected(&self) -> bool {
        self.phase == ChannelPhase::Connected
    }
}
