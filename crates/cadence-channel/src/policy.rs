use std::time::Duration;

/// How the channel behaves when the connection drops.
///
/// The delay between attempts is fixed; there is no exponential growth.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Retries after the first failed dial or a lost connection.
    pub max_attempts: u32,
    pub delay: Duration,
    pub heartbeat_interval: Duration,
    /// Outbound frames buffered per connection before `send` reports back-pressure.
    pub send_queue: usize,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(1000),
            heartbeat_interval: Duration::from_secs(30),
            send_queue: 64,
        }
    }
}
