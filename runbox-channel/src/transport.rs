//! Channel transport abstraction and the WebSocket implementation

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use runbox_common::ChannelMessage;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

/// Outbound half of a duplex channel
#[async_trait]
pub trait ChannelSender: Send + 'static {
    async fn send(&mut self, msg: ChannelMessage) -> Result<()>;
}

/// Inbound half of a duplex channel; `recv` returns `None` once the peer
/// has closed the connection.
#[async_trait]
pub trait ChannelReceiver: Send + 'static {
    async fn recv(&mut self) -> Result<Option<ChannelMessage>>;
}

// In-process halves, used by tests and local embedding
#[async_trait]
impl ChannelSender for mpsc::Sender<ChannelMessage> {
    async fn send(&mut self, msg: ChannelMessage) -> Result<()> {
        mpsc::Sender::send(self, msg)
            .await
            .map_err(|_| anyhow::anyhow!("channel closed"))
    }
}

#[async_trait]
impl ChannelReceiver for mpsc::Receiver<ChannelMessage> {
    async fn recv(&mut self) -> Result<Option<ChannelMessage>> {
        Ok(mpsc::Receiver::recv(self).await)
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outbound WebSocket half: messages serialized as JSON text frames
pub struct WsSender {
    sink: SplitSink<WsStream, Message>,
}

/// Inbound WebSocket half
pub struct WsReceiver {
    stream: SplitStream<WsStream>,
}

/// Connect to the backend and split the socket into its two halves.
pub async fn ws_connect(url: &str) -> Result<(WsSender, WsReceiver)> {
    let (ws, _) = connect_async(url).await?;
    debug!(url, "connected to backend");
    let (sink, stream) = ws.split();
    Ok((WsSender { sink }, WsReceiver { stream }))
}

#[async_trait]
impl ChannelSender for WsSender {
    async fn send(&mut self, msg: ChannelMessage) -> Result<()> {
        let json = serde_json::to_string(&msg)?;
        self.sink.send(Message::Text(json)).await?;
        Ok(())
    }
}

#[async_trait]
impl ChannelReceiver for WsReceiver {
    async fn recv(&mut self) -> Result<Option<ChannelMessage>> {
        while let Some(frame) = self.stream.next().await {
            match frame? {
                Message::Text(text) => match serde_json::from_str(&text) {
                    Ok(msg) => return Ok(Some(msg)),
                    Err(err) => {
                        // Unknown messages are skipped, not fatal: the
                        // backend also multiplexes UI traffic on this socket
                        warn!(%err, "ignoring unparseable channel message");
                    }
                },
                Message::Close(_) => return Ok(None),
                // Pings are answered by the library; nothing else carries
                // channel traffic
                _ => {}
            }
        }
        Ok(None)
    }
}
