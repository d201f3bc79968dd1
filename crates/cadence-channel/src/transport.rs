use std::pin::Pin;

use async_trait::async_trait;
use futures::future;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::ChannelError;

/// Outgoing text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = ChannelError> + Send>>;

/// Incoming text frames. The stream ends when the peer closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, ChannelError>> + Send>>;

/// Both halves of one established connection.
pub struct FrameChannel {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Dials the worker. One call yields one connection.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<FrameChannel, ChannelError>;

    /// Human-readable target for logs.
    fn describe(&self) -> String;
}

/// WebSocket transport, the only one the worker speaks.
#[derive(Clone, Debug)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<FrameChannel, ChannelError> {
        let (ws, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        let (write, read) = ws.split();

        let sink = write
            .sink_map_err(|e| ChannelError::Transport(e.to_string()))
            .with(|frame: String| future::ready(Ok::<_, ChannelError>(Message::text(frame))));

        let stream = read
            .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
            .filter_map(|msg| {
                future::ready(match msg {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(Message::Binary(bytes)) => String::from_utf8(bytes.to_vec()).ok().map(Ok),
                    // Control frames are answered by tungstenite itself.
                    Ok(_) => None,
                    Err(e) => Some(Err(ChannelError::Transport(e.to_string()))),
                })
            });

        Ok(FrameChannel {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
