//! WebSocket push channel.
//!
//! Opens one authenticated connection to the backend's push endpoint and
//! yields text and close frames. Reconnection policy deliberately lives
//! one layer up (`rescuelink-core`'s connection manager), which drives
//! this type through a trait so its state machine can be tested without
//! a socket.
//!
//! # Example
//!
//! ```rust,ignore
//! use rescuelink_api::websocket::{PushClient, PushFrame, authorized_url};
//!
//! let url = authorized_url(&"wss://alerts.example/ws".parse()?, &token);
//! let mut session = PushClient::default().open(&url).await?;
//!
//! while let Some(frame) = session.next_frame().await {
//!     if let PushFrame::Text(text) = frame? {
//!         println!("{text}");
//!     }
//! }
//! ```

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Error;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code sent by an intentional, clean disconnect.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the server closed without a status.
pub const NO_STATUS_RECEIVED: u16 = 1005;

// ── PushFrame ────────────────────────────────────────────────────────

/// A frame the core cares about. Pings are answered by tungstenite and
/// binary frames are not part of the protocol, so neither surfaces here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushFrame {
    Text(String),
    Close { code: u16, reason: String },
}

impl PushFrame {
    /// A close the server meant (code 1000). Anything else is abnormal.
    pub fn is_clean_close(&self) -> bool {
        matches!(self, Self::Close { code, .. } if *code == NORMAL_CLOSURE)
    }
}

// ── PushClient ───────────────────────────────────────────────────────

/// Opens push sessions.
#[derive(Debug, Clone)]
pub struct PushClient {
    /// Upper bound on the TCP + TLS + upgrade handshake. Default: 10s.
    pub connect_timeout: Duration,
}

impl Default for PushClient {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl PushClient {
    /// Perform the WebSocket handshake.
    ///
    /// An HTTP 401 on the upgrade request is reported as
    /// [`Error::Unauthorized`] so the caller can stop retrying.
    pub async fn open(&self, url: &Url) -> Result<PushSession, Error> {
        tracing::info!(host = url.host_str().unwrap_or(""), path = url.path(), "Connecting to push channel");

        let uri: tungstenite::http::Uri = url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

        let request = ClientRequestBuilder::new(uri);

        let connect = tokio_tungstenite::connect_async(request);
        let (ws_stream, _response) = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| {
                Error::WebSocketConnect(format!(
                    "handshake timed out after {}s",
                    self.connect_timeout.as_secs()
                ))
            })?
            .map_err(map_handshake_error)?;

        tracing::info!("Push channel connected");

        let (write, read) = ws_stream.split();
        Ok(PushSession { write, read })
    }
}

fn map_handshake_error(err: tungstenite::Error) -> Error {
    if let tungstenite::Error::Http(ref resp) = err {
        let status = resp.status().as_u16();
        if status == 401 {
            return Error::Unauthorized {
                status,
                message: "push channel upgrade rejected".into(),
            };
        }
    }
    Error::WebSocketConnect(err.to_string())
}

/// Append the bearer token as the `token` query parameter.
///
/// Any existing `token` parameter is replaced; other parameters are kept.
pub fn authorized_url(base: &Url, token: &SecretString) -> Url {
    let mut url = base.clone();
    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(k, _)| k != "token")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.set_query(None);
    {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair("token", token.expose_secret());
    }
    url
}

// ── PushSession ──────────────────────────────────────────────────────

/// One live connection.
pub struct PushSession {
    write: SplitSink<WsStream, tungstenite::Message>,
    read: SplitStream<WsStream>,
}

impl PushSession {
    /// Next frame of interest. `None` means the stream ended without a
    /// close frame, which callers should treat as abnormal.
    pub async fn next_frame(&mut self) -> Option<Result<PushFrame, Error>> {
        loop {
            match self.read.next().await? {
                Ok(tungstenite::Message::Text(text)) => {
                    return Some(Ok(PushFrame::Text(text.to_string())));
                }
                Ok(tungstenite::Message::Close(frame)) => {
                    let (code, reason) = frame.map_or_else(
                        || (NO_STATUS_RECEIVED, String::new()),
                        |cf| (u16::from(cf.code), cf.reason.to_string()),
                    );
                    tracing::info!(code, reason = %reason, "Push channel close frame received");
                    return Some(Ok(PushFrame::Close { code, reason }));
                }
                Ok(tungstenite::Message::Ping(_)) => {
                    // tungstenite queues the pong automatically
                    tracing::trace!("Push channel ping");
                }
                Ok(_) => {
                    // Binary, Pong, raw Frame -- not part of the protocol
                }
                Err(e) => return Some(Err(Error::WebSocketConnect(e.to_string()))),
            }
        }
    }

    /// Send a normal-closure frame and drop the connection.
    pub async fn close(mut self) {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "Intentional disconnect".into(),
        };
        if let Err(e) = self.write.send(tungstenite::Message::Close(Some(frame))).await {
            tracing::debug!(error = %e, "close frame not delivered");
        }
        let _ = self.write.close().await;
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn token_is_appended_as_query_param() {
        let base: Url = "wss://alerts.example/ws".parse().unwrap();
        let token = SecretString::from("abc def".to_string());
        let url = authorized_url(&base, &token);
        assert_eq!(url.as_str(), "wss://alerts.example/ws?token=abc+def");
    }

    #[test]
    fn existing_token_is_replaced_and_others_kept() {
        let base: Url = "wss://alerts.example/ws?v=2&token=old".parse().unwrap();
        let token = SecretString::from("new".to_string());
        let url = authorized_url(&base, &token);
        assert_eq!(url.as_str(), "wss://alerts.example/ws?v=2&token=new");
    }

    #[test]
    fn only_normal_closure_is_clean() {
        assert!(
            PushFrame::Close {
                code: NORMAL_CLOSURE,
                reason: String::new()
            }
            .is_clean_close()
        );
        assert!(
            !PushFrame::Close {
                code: 1006,
                reason: String::new()
            }
            .is_clean_close()
        );
        assert!(!PushFrame::Text("{}".into()).is_clean_close());
    }

    #[tokio::test]
    async fn open_fails_fast_on_unreachable_host() {
        let client = PushClient {
            connect_timeout: Duration::from_secs(2),
        };
        // Port 9 on loopback is almost never listening.
        let url: Url = "ws://127.0.0.1:9/ws".parse().unwrap();
        let result = client.open(&url).await;
        assert!(matches!(result, Err(Error::WebSocketConnect(_))));
    }
}
