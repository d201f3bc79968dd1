//! # cadence-channel
//!
//! One logical, long-lived event channel to the generation worker.
//!
//! [`ChannelManager`] dials through a [`Connector`], retries a bounded number
//! of times with a fixed delay, publishes a [`ConnectivityState`], and hands
//! inbound [`ServerEvent`](cadence_core::ServerEvent)s to a single consumer in
//! arrival order. Sending never queues across connections: when the channel
//! is down, [`ChannelManager::send`] fails immediately.

pub mod error;
pub mod manager;
pub mod memory;
pub mod policy;
pub mod state;
pub mod transport;

pub use error::ChannelError;
pub use manager::ChannelManager;
pub use memory::{Dial, MemoryConnector, RemotePeer};
pub use policy::ReconnectPolicy;
pub use state::{ChannelPhase, ConnectivityState};
pub use transport::{Connector, FrameChannel, FrameSink, FrameStream, WebSocketConnector};
