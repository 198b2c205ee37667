use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use crate::config::client::RemoteServerConfig;
use crate::error::TransportError;
use crate::protocol::ClientMessage;

/// What the socket task reports back to the consumer
#[derive(Debug)]
pub enum InboundFrame {
    Text(String),
    Closed,
    Failed(TransportError),
}

/// An open push channel. Dropping it closes the underlying socket.
pub struct PushConnection {
    pub inbound: mpsc::Receiver<InboundFrame>,
    pub outbound: mpsc::UnboundedSender<ClientMessage>,
    _guard: DropGuard,
}

impl PushConnection {
    /// Wrap a pair of channels. `cancel` is fired when the connection is dropped.
    pub fn new(
        inbound: mpsc::Receiver<InboundFrame>,
        outbound: mpsc::UnboundedSender<ClientMessage>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inbound,
            outbound,
            _guard: cancel.drop_guard(),
        }
    }

    pub fn send(&self, message: ClientMessage) -> bool {
        self.outbound.send(message).is_ok()
    }
}

/// Opens push channel connections
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self) -> Result<PushConnection, TransportError>;
}

/// Lightweight "is the server up" check
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn check(&self) -> Result<(), TransportError>;
}

/// Plain JSON GET against the server
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    async fn fetch_json(&self, path: &str) -> Result<serde_json::Value, TransportError>;
}

/// WebSocket push channel over tokio-tungstenite
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl PushTransport for WsTransport {
    async fn connect(&self) -> Result<PushConnection, TransportError> {
        let (stream, _response) = connect_async(self.url.as_str()).await?;
        let (mut write, mut read) = stream.split();

        let (inbound_tx, inbound) = mpsc::channel(64);
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    message = outbound_rx.recv() => {
                        let Some(message) = message else { break };
                        let text = match serde_json::to_string(&message) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!("Failed to encode {:?}: {}", message, e);
                                continue;
                            }
                        };
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            let _ = inbound_tx.send(InboundFrame::Failed(e.into())).await;
                            break;
                        }
                    }
                    frame = read.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            if inbound_tx.send(InboundFrame::Text(text.as_str().to_owned())).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            let _ = inbound_tx.send(InboundFrame::Closed).await;
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            let _ = inbound_tx.send(InboundFrame::Failed(e.into())).await;
                            break;
                        }
                    }
                }
            }
            debug!("Push channel task finished");
        });

        Ok(PushConnection::new(inbound, outbound, cancel))
    }
}

/// reqwest-backed access to the server's HTTP API
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    server: RemoteServerConfig,
}

impl HttpApi {
    pub fn new(server: &RemoteServerConfig, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            server: server.clone(),
        })
    }
}

#[async_trait]
impl StatusProbe for HttpApi {
    async fn check(&self) -> Result<(), TransportError> {
        let response = self.client.get(self.server.http_url(&self.server.status_path)).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(TransportError::Status(response.status().as_u16()))
        }
    }
}

#[async_trait]
impl JsonFetcher for HttpApi {
    async fn fetch_json(&self, path: &str) -> Result<serde_json::Value, TransportError> {
        let response = self.client.get(self.server.http_url(path)).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropping_connection_cancels_its_task() {
        let (_tx, inbound) = mpsc::channel(1);
        let (outbound, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let connection = PushConnection::new(inbound, outbound, cancel.clone());
        assert!(!cancel.is_cancelled());
        assert!(connection.send(ClientMessage::Ping));
        drop(connection);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        // port 9 (discard) is closed on test machines
        let transport = WsTransport::new("ws://127.0.0.1:9/ws");
        assert!(transport.connect().await.is_err());

        let api = HttpApi::new(
            &RemoteServerConfig {
                base_url: "http://127.0.0.1:9".to_string(),
                ..Default::default()
            },
            Duration::from_secs(2),
        )
        .unwrap();
        assert!(api.check().await.is_err());
    }
}
