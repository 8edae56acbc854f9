//! Switchboard relay server.
//!
//! A matchmaking + relay hub: hosts register under a display name, clients
//! attach to a host by name or id, and the server forwards opaque payloads
//! between each client and its host. Neither endpoint runs a listening
//! server of its own.
//!
//! # Architecture
//!
//! The protocol logic lives in [`RelayDriver`], which follows the Sans-IO
//! pattern: it consumes events, mutates the registry/route graph, and
//! returns actions, with no I/O of its own. This crate's runtime glue
//! ([`Server`]) executes those actions over WebSocket connections using
//! Tokio and tokio-tungstenite.
//!
//! # Components
//!
//! - [`RelayDriver`]: protocol state machine (pure logic, no I/O)
//! - [`Registry`]: host bookkeeping with id and name indexes
//! - [`HostRoute`]/[`ClientRoute`]: two-level route ownership tree
//! - [`Server`]: production runtime executing driver actions

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod registry;
mod routes;
mod session;

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

pub use driver::{
    ConnectionState, DriverConfig, DriverError, LogLevel, RelayDriver, ServerAction, ServerEvent,
};
pub use error::ServerError;
use futures::StreamExt;
pub use registry::Registry;
pub use routes::{ClientRoute, HostRoute};
use session::Session;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{Mutex, RwLock},
};
use tokio_tungstenite::tungstenite::Message;

/// Shared state for all connections.
///
/// Holds the outbound session handles for action execution. All messages to
/// a connection go through its single mutexed [`Session`], ensuring
/// ordering. Handles are cloned out of the map before any send, so the map
/// guard is never held across I/O: a backpressured peer can only stall its
/// own session, never the insert/remove path or other sessions.
struct SharedState {
    /// Session id → outbound handle.
    sessions: RwLock<HashMap<u64, Arc<Mutex<Session>>>>,
    /// Monotonic session id allocator. Ids are never reused.
    next_session_id: AtomicU64,
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:3000").
    pub bind_address: String,
    /// Driver configuration (connection limits).
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0:3000".to_owned(), driver: DriverConfig::default() }
    }
}

/// Production Switchboard server.
///
/// Wraps [`RelayDriver`] with a WebSocket listener. The listener accepts
/// connections and hands each one, role-less, to the driver; accept is
/// never blocked by relay processing because each connection runs in its
/// own task and driver access is a short critical section.
pub struct Server {
    listener: TcpListener,
    driver: RelayDriver,
}

impl Server {
    /// Create and bind a new server.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_address).await.map_err(|e| {
            ServerError::Config(format!("failed to bind '{}': {e}", config.bind_address))
        })?;

        Ok(Self { listener, driver: RelayDriver::new(config.driver) })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(|e| ServerError::Transport(e.to_string()))
    }

    /// Run the server, accepting connections and relaying messages.
    ///
    /// Runs until the process is shut down or the listener fails.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("server listening on {}", self.local_addr()?);

        let driver = Arc::new(Mutex::new(self.driver));
        let shared = Arc::new(SharedState {
            sessions: RwLock::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
        });

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let driver = Arc::clone(&driver);
                    let shared = Arc::clone(&shared);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, driver, shared).await {
                            tracing::debug!("connection from {peer} ended with error: {e}");
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("accept error: {e}");
                },
            }
        }
    }
}

/// Handle a single WebSocket connection from handshake to teardown.
async fn handle_connection(
    stream: TcpStream,
    driver: Arc<Mutex<RelayDriver>>,
    shared: Arc<SharedState>,
) -> Result<(), ServerError> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| ServerError::Transport(format!("WebSocket handshake failed: {e}")))?;

    let session_id = shared.next_session_id.fetch_add(1, Ordering::Relaxed);
    let (sink, mut inbound) = ws.split();

    {
        let mut sessions = shared.sessions.write().await;
        sessions.insert(session_id, Arc::new(Mutex::new(Session::new(sink))));
    }

    let actions = {
        let mut driver = driver.lock().await;
        driver.process_event(ServerEvent::ConnectionAccepted { session_id })?
    };
    execute_actions(actions, &shared).await;

    loop {
        match inbound.next().await {
            Some(Ok(Message::Text(text))) => {
                let actions = {
                    let mut driver = driver.lock().await;
                    match driver.process_event(ServerEvent::MessageReceived {
                        session_id,
                        text: text.to_string(),
                    }) {
                        Ok(actions) => actions,
                        Err(e) => {
                            tracing::warn!("event processing error on session {session_id}: {e}");
                            continue;
                        },
                    }
                };
                execute_actions(actions, &shared).await;
            },
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(other)) => {
                // Envelopes are text frames; tungstenite answers pings
                // itself, anything else is ignored.
                tracing::trace!("ignoring non-text frame on session {session_id}: {other:?}");
            },
            Some(Err(e)) => {
                // Transport faults tear down exactly like a clean close.
                tracing::debug!("read error on session {session_id}: {e}");
                break;
            },
        }
    }

    {
        let mut sessions = shared.sessions.write().await;
        sessions.remove(&session_id);
    }

    let actions = {
        let mut driver = driver.lock().await;
        driver.process_event(ServerEvent::ConnectionClosed {
            session_id,
            reason: "connection closed".to_owned(),
        })?
    };
    execute_actions(actions, &shared).await;

    Ok(())
}

/// Execute driver actions against the live sessions.
async fn execute_actions(actions: Vec<ServerAction>, shared: &SharedState) {
    for action in actions {
        match action {
            ServerAction::SendEnvelope { session_id, envelope } => match envelope.encode() {
                Ok(text) => send_text(shared, session_id, text).await,
                Err(e) => {
                    tracing::error!("failed to encode envelope for session {session_id}: {e}");
                },
            },

            ServerAction::SendText { session_id, text } => {
                send_text(shared, session_id, text).await;
            },

            ServerAction::CloseSession { session_id, code, reason } => {
                if let Some(session) = session_handle(shared, session_id).await {
                    let mut session = session.lock().await;
                    if let Err(e) = session.close(code, &reason).await {
                        tracing::debug!("close failed for session {session_id}: {e}");
                    }
                }
            },

            ServerAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{message}"),
                LogLevel::Info => tracing::info!("{message}"),
                LogLevel::Warn => tracing::warn!("{message}"),
                LogLevel::Error => tracing::error!("{message}"),
            },
        }
    }
}

/// Fetch a session handle, holding the map guard only for the lookup.
async fn session_handle(shared: &SharedState, session_id: u64) -> Option<Arc<Mutex<Session>>> {
    let sessions = shared.sessions.read().await;
    sessions.get(&session_id).map(Arc::clone)
}

/// Send text to a session, logging (never propagating) failures.
///
/// A missing session means the peer disconnected between the driver's
/// decision and execution; the driver will observe the close event shortly.
async fn send_text(shared: &SharedState, session_id: u64, text: String) {
    if let Some(session) = session_handle(shared, session_id).await {
        let mut session = session.lock().await;
        if let Err(e) = session.send_text(text).await {
            tracing::warn!("send failed for session {session_id}: {e}");
        }
    } else {
        tracing::debug!("send skipped, session {session_id} is gone");
    }
}
