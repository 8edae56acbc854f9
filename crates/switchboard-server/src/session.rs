//! Outbound session handle.
//!
//! A [`Session`] is the thin wrapper around one WebSocket connection's send
//! half: send text, close with a code and reason, nothing else. Inbound
//! events (messages, closure) are observed by the per-connection read task
//! in `lib.rs` and fed to the driver as `ServerEvent`s.
//!
//! Each session belongs to exactly one route for its entire lifetime; the
//! runtime keeps sessions behind per-session mutexes so all sends to one
//! connection go through a single ordered path.

use futures::{SinkExt, stream::SplitSink};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::{
        Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};

use crate::error::ServerError;

/// Send half of an accepted WebSocket connection.
pub(crate) type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Wrapper over one connection's send half.
pub(crate) struct Session {
    sink: WsSink,
}

impl Session {
    pub(crate) fn new(sink: WsSink) -> Self {
        Self { sink }
    }

    /// Send one text frame.
    pub(crate) async fn send_text(&mut self, text: String) -> Result<(), ServerError> {
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ServerError::Transport(format!("send failed: {e}")))
    }

    /// Initiate the closing handshake with a code and reason.
    pub(crate) async fn close(&mut self, code: u16, reason: &str) -> Result<(), ServerError> {
        let frame = CloseFrame { code: CloseCode::from(code), reason: reason.to_owned().into() };
        self.sink
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| ServerError::Transport(format!("close failed: {e}")))
    }
}
