//! In-process connector for tests: no sockets, fully scripted dials.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cadence_core::{ClientEvent, ServerEvent};
use futures::channel::mpsc as frames;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::ChannelError;
use crate::transport::{Connector, FrameChannel};

/// Scripted outcome of one dial.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dial {
    Accept,
    Refuse,
    /// Never resolves, like a dial to a host that drops packets.
    Hang,
}

/// Connector whose peers are handed to the test as [`RemotePeer`]s.
///
/// Dials follow the script; once it runs dry every dial is accepted.
pub struct MemoryConnector {
    script: Mutex<VecDeque<Dial>>,
    peers: mpsc::UnboundedSender<RemotePeer>,
    dials: AtomicU32,
}

impl MemoryConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RemotePeer>) {
        let (peers, accepted) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            peers,
            dials: AtomicU32::new(0),
        });
        (connector, accepted)
    }

    pub fn script(&self, dials: impl IntoIterator<Item = Dial>) {
        self.script.lock().extend(dials);
    }

    pub fn refuse_next(&self, count: usize) {
        self.script(std::iter::repeat(Dial::Refuse).take(count));
    }

    /// Dials attempted so far, accepted or not.
    pub fn dials(&self) -> u32 {
        self.dials.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<FrameChannel, ChannelError> {
        let _ = self.dials.fetch_add(1, Ordering::Relaxed);
        let dial = self.script.lock().pop_front().unwrap_or(Dial::Accept);
        match dial {
            Dial::Accept => {}
            Dial::Refuse => return Err(ChannelError::Connect("connection refused".into())),
            Dial::Hang => std::future::pending::<()>().await,
        }

        let (out_tx, out_rx) = frames::unbounded::<String>();
        let (in_tx, in_rx) = frames::unbounded::<String>();
        let peer = RemotePeer {
            outbound: out_rx,
            inbound: in_tx,
        };
        self.peers
            .send(peer)
            .map_err(|_| ChannelError::Connect("no listener for memory peers".into()))?;

        Ok(FrameChannel {
            sink: Box::pin(out_tx.sink_map_err(|e| ChannelError::Transport(e.to_string()))),
            stream: Box::pin(in_rx.map(Ok::<String, ChannelError>)),
        })
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}

/// The worker's end of an in-memory connection. Dropping it closes the link.
pub struct RemotePeer {
    outbound: frames::UnboundedReceiver<String>,
    inbound: frames::UnboundedSender<String>,
}

impl RemotePeer {
    /// Next raw frame written by the client.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.outbound.next().await
    }

    /// Next decoded client event, skipping heartbeats and garbage.
    pub async fn next_request(&mut self) -> Option<ClientEvent> {
        while let Some(frame) = self.next_frame().await {
            match serde_json::from_str::<ClientEvent>(&frame) {
                Ok(ClientEvent::Ping { .. }) => {}
                Ok(event) => return Some(event),
                Err(e) => warn!(error = %e, "memory peer received an undecodable frame"),
            }
        }
        None
    }

    pub fn push(&self, event: &ServerEvent) -> Result<(), ChannelError> {
        self.push_raw(event.encode()?);
        Ok(())
    }

    pub fn push_raw(&self, frame: impl Into<String>) {
        let _ = self.inbound.unbounded_send(frame.into());
    }
}
