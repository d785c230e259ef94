//! Live message feed.
//!
//! The backend pushes every incoming message for a session as one JSON frame
//! on a WebSocket at its root path, selected with `?sessionId=`.

use futures_util::StreamExt;
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use wabulk_common::error::AppError;
use wabulk_common::types::ChatMessage;

use crate::client::BackendClient;

/// Decoded messages buffered ahead of a slow reader.
const FEED_BUFFER: usize = 64;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

impl BackendClient {
    /// WebSocket address of the live feed for `session_id`.
    pub fn live_url(&self, session_id: &str) -> Result<Url, AppError> {
        let mut url = self.base_url().clone();
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(AppError::Config(format!(
                    "backend URL scheme {} has no WebSocket equivalent",
                    other
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| AppError::Config(format!("cannot switch {} to {}", url, scheme)))?;
        url.query_pairs_mut().append_pair("sessionId", session_id);
        Ok(url)
    }

    /// Open the live feed for a session.
    ///
    /// Messages arrive on the returned receiver until the backend closes the
    /// socket, the connection fails or `cancel` fires. Frames that are not a
    /// message object are logged and skipped.
    pub async fn subscribe_messages(
        &self,
        session_id: &str,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<ChatMessage>, AppError> {
        let url = self.live_url(session_id)?;
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| AppError::WebSocket(format!("{}: {}", url, e)))?;

        tracing::info!(session_id, "Live message feed connected");

        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        tokio::spawn(pump(socket, session_id.to_string(), tx, cancel));
        Ok(rx)
    }
}

async fn pump(
    mut socket: Socket,
    session_id: String,
    tx: mpsc::Sender<ChatMessage>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            frame = socket.next() => frame,
            _ = tx.closed() => break,
            _ = cancel.cancelled() => {
                if let Err(e) = socket.close(None).await {
                    tracing::debug!(session_id = %session_id, error = %e, "Close handshake failed");
                }
                break;
            }
        };

        let payload = match frame {
            Some(Ok(Message::Text(text))) => text.into_bytes(),
            Some(Ok(Message::Binary(bytes))) => bytes,
            Some(Ok(Message::Close(_))) | None => break,
            // Pings are answered by the socket itself.
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::warn!(session_id = %session_id, error = %e, "Live message feed failed");
                break;
            }
        };

        match serde_json::from_slice::<ChatMessage>(&payload) {
            Ok(message) => {
                if tx.send(message).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Skipping undecodable live message");
            }
        }
    }

    tracing::info!(session_id = %session_id, "Live message feed closed");
}
