//! Relay driver.
//!
//! The protocol state machine tying together the registry and routes. The
//! driver is Sans-IO: it consumes [`ServerEvent`]s produced by the runtime,
//! mutates the registry/route graph, and returns [`ServerAction`]s for the
//! runtime to execute. No I/O happens here, which keeps every protocol rule
//! directly unit-testable.
//!
//! Each live connection is in exactly one [`ConnectionState`]:
//! `Unregistered` until its first successful `HOST` or `CONNECT`, then
//! `Host` or `Client` until the session closes. Roles are terminal;
//! re-selection is rejected without disturbing the existing role.

use std::collections::HashMap;

use switchboard_proto::{
    ControlEnvelope, EnvelopeError, HOST_LEFT_REASON, ServerEnvelope, relay_text,
};

use crate::registry::Registry;

/// WebSocket close code for normal closure.
const CLOSE_NORMAL: u16 = 1000;
/// WebSocket close code for "try again later" (admission control).
const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Maximum concurrent connections; excess connections are closed on
    /// accept.
    pub max_connections: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { max_connections: 10_000 }
    }
}

/// Events the driver processes, produced by the runtime.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new connection was accepted and greeted by the transport.
    ConnectionAccepted {
        /// Unique session id assigned by the runtime.
        session_id: u64,
    },

    /// A text message arrived on a connection.
    MessageReceived {
        /// Session that sent the message.
        session_id: u64,
        /// Raw message text, not yet classified.
        text: String,
    },

    /// A connection was closed (by peer, error, or server action).
    ConnectionClosed {
        /// Session that closed.
        session_id: u64,
        /// Reason for closure, for logging.
        reason: String,
    },
}

/// Actions the driver produces, executed by the runtime.
#[derive(Debug, Clone)]
pub enum ServerAction {
    /// Send a protocol envelope to a session.
    SendEnvelope {
        /// Target session.
        session_id: u64,
        /// Envelope to encode and send.
        envelope: ServerEnvelope,
    },

    /// Send raw text to a session (untagged host→client relay delivery).
    SendText {
        /// Target session.
        session_id: u64,
        /// Text to send verbatim.
        text: String,
    },

    /// Close a session.
    CloseSession {
        /// Session to close.
        session_id: u64,
        /// Transport close code.
        code: u16,
        /// Close reason, passed through to the transport.
        reason: String,
    },

    /// Log a message.
    Log {
        /// Log level.
        level: LogLevel,
        /// Message to log.
        message: String,
    },
}

/// Log levels for [`ServerAction::Log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational message.
    Info,
    /// Warning.
    Warn,
    /// Error.
    Error,
}

/// Role of one live connection.
///
/// A tagged variant rather than behavior mutation: the driver dispatches on
/// the tag for every inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, no role chosen yet.
    Unregistered,
    /// Registered as a host.
    Host {
        /// The host's registry id.
        host_id: u64,
    },
    /// Attached as a client of one host.
    Client {
        /// Registry id of the owning host.
        host_id: u64,
        /// Host-scoped client id.
        client_id: u64,
    },
}

/// Errors from driver event processing.
///
/// These indicate runtime/driver desynchronization, not protocol misuse by
/// participants; protocol misuse is answered with envelopes, never errors.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// A message event referenced a session the driver does not track.
    #[error("session not found: {0}")]
    SessionNotFound(u64),

    /// An accept event reused a live session id. Session ids must be unique.
    #[error("session already exists: {0}")]
    SessionAlreadyExists(u64),
}

/// The relay protocol state machine.
///
/// Owns the registry and the per-connection role table. All access must be
/// serialized by the caller (the runtime holds it behind one async mutex),
/// which satisfies the ordering discipline for registry and per-host
/// mutations.
#[derive(Debug)]
pub struct RelayDriver {
    /// Session id → role. A session missing here is already torn down, so
    /// racing close events degrade to no-ops.
    connections: HashMap<u64, ConnectionState>,
    registry: Registry,
    config: DriverConfig,
}

impl Default for RelayDriver {
    fn default() -> Self {
        Self::new(DriverConfig::default())
    }
}

impl RelayDriver {
    /// Create a driver with the given configuration.
    pub fn new(config: DriverConfig) -> Self {
        Self { connections: HashMap::new(), registry: Registry::new(), config }
    }

    /// Process one event and return the actions to execute.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, DriverError> {
        match event {
            ServerEvent::ConnectionAccepted { session_id } => self.handle_accepted(session_id),
            ServerEvent::MessageReceived { session_id, text } => {
                self.handle_message(session_id, &text)
            },
            ServerEvent::ConnectionClosed { session_id, reason } => {
                Ok(self.handle_closed(session_id, &reason))
            },
        }
    }

    /// Number of live connections in any state.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Role of a session, if it is live.
    pub fn connection_state(&self, session_id: u64) -> Option<ConnectionState> {
        self.connections.get(&session_id).copied()
    }

    /// The host registry (read-only).
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn handle_accepted(&mut self, session_id: u64) -> Result<Vec<ServerAction>, DriverError> {
        if self.connections.len() >= self.config.max_connections {
            return Ok(vec![
                ServerAction::CloseSession {
                    session_id,
                    code: CLOSE_TRY_AGAIN_LATER,
                    reason: "max connections exceeded".to_owned(),
                },
                log(LogLevel::Warn, format!("rejecting connection {session_id}: at capacity")),
            ]);
        }

        if self.connections.contains_key(&session_id) {
            return Err(DriverError::SessionAlreadyExists(session_id));
        }
        self.connections.insert(session_id, ConnectionState::Unregistered);

        Ok(vec![
            ServerAction::SendEnvelope { session_id, envelope: ServerEnvelope::server_info() },
            log(LogLevel::Debug, format!("connection {session_id} accepted")),
        ])
    }

    fn handle_message(
        &mut self,
        session_id: u64,
        text: &str,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let state = self
            .connections
            .get(&session_id)
            .copied()
            .ok_or(DriverError::SessionNotFound(session_id))?;

        let actions = match state {
            ConnectionState::Unregistered => self.unregistered_message(session_id, text),
            ConnectionState::Host { host_id } => self.host_message(session_id, host_id, text),
            ConnectionState::Client { host_id, client_id } => {
                self.client_message(session_id, host_id, client_id, text)
            },
        };
        Ok(actions)
    }

    fn unregistered_message(&mut self, session_id: u64, text: &str) -> Vec<ServerAction> {
        match ControlEnvelope::parse(text) {
            Ok(ControlEnvelope::Host { payload }) => self.register_host(session_id, payload),
            Ok(ControlEnvelope::Connect(request)) => self.connect_client(session_id, &request),
            Ok(ControlEnvelope::List) => vec![self.list_reply(session_id)],
            Ok(ControlEnvelope::Send { .. }) => {
                protocol_error(session_id, "SEND requires the host role")
            },
            Err(EnvelopeError::UnknownType(tag)) => protocol_error(
                session_id,
                &format!("select a role with HOST or CONNECT before sending {tag:?}"),
            ),
            // Malformed payloads from role-less connections are dropped
            // without a reply.
            Err(e) => vec![log(
                LogLevel::Warn,
                format!("ignoring malformed message from unregistered connection {session_id}: {e}"),
            )],
        }
    }

    fn host_message(&mut self, session_id: u64, host_id: u64, text: &str) -> Vec<ServerAction> {
        match ControlEnvelope::parse(text) {
            Ok(ControlEnvelope::Send { client_id, message }) => {
                let Some(host) = self.registry.host(host_id) else {
                    return vec![log(
                        LogLevel::Error,
                        format!("host state for session {session_id} references dead host {host_id}"),
                    )];
                };
                match host.client(client_id) {
                    Some(client) => vec![ServerAction::SendText {
                        session_id: client.session_id(),
                        text: relay_text(&message),
                    }],
                    // Stale target: the client already disconnected and the
                    // host has observed (or will observe) LOST_CLIENT.
                    None => vec![log(
                        LogLevel::Debug,
                        format!("dropping relay from host {host_id} to departed client {client_id}"),
                    )],
                }
            },
            Ok(ControlEnvelope::List) => vec![self.list_reply(session_id)],
            Ok(ControlEnvelope::Host { .. } | ControlEnvelope::Connect(_)) => {
                protocol_error(session_id, "already registered as a host")
            },
            Err(e) => vec![log(
                LogLevel::Warn,
                format!("ignoring unaddressed message from host {host_id}: {e}"),
            )],
        }
    }

    fn client_message(
        &mut self,
        session_id: u64,
        host_id: u64,
        client_id: u64,
        text: &str,
    ) -> Vec<ServerAction> {
        match ControlEnvelope::parse(text) {
            Ok(ControlEnvelope::Host { .. } | ControlEnvelope::Connect(_)) => {
                protocol_error(session_id, "already connected to a host")
            },
            Ok(ControlEnvelope::List) => vec![self.list_reply(session_id)],
            // Everything else is opaque relay payload, forwarded verbatim.
            Ok(ControlEnvelope::Send { .. }) | Err(_) => {
                let Some(host) = self.registry.host(host_id) else {
                    // The cascade removes client states with their host, so
                    // a live Client state always has a live host.
                    return vec![log(
                        LogLevel::Error,
                        format!("client state for session {session_id} references dead host {host_id}"),
                    )];
                };
                match host.client(client_id) {
                    Some(client) => vec![ServerAction::SendEnvelope {
                        session_id: host.session_id(),
                        envelope: client.relay_to_host(text),
                    }],
                    None => vec![log(
                        LogLevel::Error,
                        format!("client {client_id} missing from host {host_id} client table"),
                    )],
                }
            },
        }
    }

    fn register_host(&mut self, session_id: u64, name: String) -> Vec<ServerAction> {
        let host_id = self.registry.register_host(&name, session_id).id();
        self.connections.insert(session_id, ConnectionState::Host { host_id });

        vec![
            ServerAction::SendEnvelope {
                session_id,
                envelope: ServerEnvelope::Registered { host_id, host_name: name.clone() },
            },
            log(LogLevel::Info, format!("session {session_id} registered host {host_id} ({name:?})")),
        ]
    }

    fn connect_client(
        &mut self,
        session_id: u64,
        request: &switchboard_proto::ConnectRequest,
    ) -> Vec<ServerAction> {
        use switchboard_proto::ConnectTarget;

        let target = match request.target() {
            Ok(target) => target,
            Err(e) => return protocol_error(session_id, &e.to_string()),
        };

        let resolved = match target {
            ConnectTarget::Name(name) => self.registry.host_by_name(name),
            ConnectTarget::Id(id) => {
                u64::try_from(id).ok().and_then(|id| self.registry.host(id))
            },
        };

        let Some(host_id) = resolved.map(crate::routes::HostRoute::id) else {
            // The sender stays unregistered and may retry.
            return vec![
                ServerAction::SendEnvelope {
                    session_id,
                    envelope: ServerEnvelope::ConnectFailed {
                        error: "no such host".to_owned(),
                        request: request.echo_fields(),
                    },
                },
                log(LogLevel::Debug, format!("session {session_id} failed to resolve a host")),
            ];
        };

        let echo = request.echo_fields();
        // Resolution succeeded against the live registry, so the mutable
        // re-borrow cannot miss.
        let Some(host) = self.registry.host_mut(host_id) else {
            return vec![log(LogLevel::Error, format!("host {host_id} vanished during connect"))];
        };
        let client_id = host.register_client(session_id, echo.clone());
        let host_session = host.session_id();
        let host_name = host.name().to_owned();

        self.connections.insert(session_id, ConnectionState::Client { host_id, client_id });

        vec![
            ServerAction::SendEnvelope {
                session_id,
                envelope: ServerEnvelope::Connected {
                    host_id,
                    host_name,
                    request: echo.clone(),
                },
            },
            ServerAction::SendEnvelope {
                session_id: host_session,
                envelope: ServerEnvelope::NewClient { client_id, request: echo },
            },
            log(
                LogLevel::Info,
                format!("session {session_id} attached to host {host_id} as client {client_id}"),
            ),
        ]
    }

    fn list_reply(&self, session_id: u64) -> ServerAction {
        ServerAction::SendEnvelope {
            session_id,
            envelope: ServerEnvelope::List { payload: self.registry.list_active_hosts() },
        }
    }

    /// Tear down whatever the closed session owned.
    ///
    /// Removing the connection entry first makes a racing close of the same
    /// session a no-op, so each route's teardown runs exactly once.
    fn handle_closed(&mut self, session_id: u64, reason: &str) -> Vec<ServerAction> {
        let Some(state) = self.connections.remove(&session_id) else {
            return Vec::new();
        };

        match state {
            ConnectionState::Unregistered => {
                vec![log(
                    LogLevel::Debug,
                    format!("unregistered connection {session_id} closed: {reason}"),
                )]
            },
            ConnectionState::Host { host_id } => self.close_host(session_id, host_id, reason),
            ConnectionState::Client { host_id, client_id } => {
                self.close_client(session_id, host_id, client_id, reason)
            },
        }
    }

    fn close_host(&mut self, session_id: u64, host_id: u64, reason: &str) -> Vec<ServerAction> {
        let Some(mut route) = self.registry.unregister_host(host_id) else {
            return Vec::new();
        };

        let clients = route.close();
        let mut actions = Vec::with_capacity(clients.len() + 1);
        for client in &clients {
            // Evict the client's role state now; its own close event will
            // find nothing left to do.
            self.connections.remove(&client.session_id());
            actions.push(ServerAction::CloseSession {
                session_id: client.session_id(),
                code: CLOSE_NORMAL,
                reason: HOST_LEFT_REASON.to_owned(),
            });
        }
        actions.push(log(
            LogLevel::Info,
            format!(
                "host {host_id} ({:?}) on session {session_id} closed ({reason}), cascading to {} clients",
                route.name(),
                clients.len()
            ),
        ));
        actions
    }

    fn close_client(
        &mut self,
        session_id: u64,
        host_id: u64,
        client_id: u64,
        reason: &str,
    ) -> Vec<ServerAction> {
        let mut actions = Vec::new();

        if let Some(host) = self.registry.host_mut(host_id) {
            // `remove_client` returning Some gates the notification, so the
            // host hears LOST_CLIENT exactly once per client.
            if host.remove_client(client_id).is_some() {
                actions.push(ServerAction::SendEnvelope {
                    session_id: host.session_id(),
                    envelope: ServerEnvelope::LostClient { payload: client_id },
                });
            }
        }

        actions.push(log(
            LogLevel::Debug,
            format!(
                "client {client_id} of host {host_id} on session {session_id} closed: {reason}"
            ),
        ));
        actions
    }
}

fn log(level: LogLevel, message: String) -> ServerAction {
    ServerAction::Log { level, message }
}

fn protocol_error(session_id: u64, message: &str) -> Vec<ServerAction> {
    vec![
        ServerAction::SendEnvelope {
            session_id,
            envelope: ServerEnvelope::ProtocolError { message: message.to_owned() },
        },
        log(LogLevel::Warn, format!("protocol violation on session {session_id}: {message}")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> RelayDriver {
        RelayDriver::new(DriverConfig::default())
    }

    fn accept(driver: &mut RelayDriver, session_id: u64) {
        driver.process_event(ServerEvent::ConnectionAccepted { session_id }).unwrap();
    }

    fn message(driver: &mut RelayDriver, session_id: u64, text: &str) -> Vec<ServerAction> {
        driver
            .process_event(ServerEvent::MessageReceived {
                session_id,
                text: text.to_owned(),
            })
            .unwrap()
    }

    fn close(driver: &mut RelayDriver, session_id: u64) -> Vec<ServerAction> {
        driver
            .process_event(ServerEvent::ConnectionClosed {
                session_id,
                reason: "test".to_owned(),
            })
            .unwrap()
    }

    fn envelopes(actions: &[ServerAction]) -> Vec<(u64, ServerEnvelope)> {
        actions
            .iter()
            .filter_map(|action| match action {
                ServerAction::SendEnvelope { session_id, envelope } => {
                    Some((*session_id, envelope.clone()))
                },
                _ => None,
            })
            .collect()
    }

    #[test]
    fn accept_greets_with_server_info() {
        let mut driver = driver();
        let actions = driver.process_event(ServerEvent::ConnectionAccepted { session_id: 1 }).unwrap();

        assert_eq!(envelopes(&actions), vec![(1, ServerEnvelope::server_info())]);
        assert_eq!(driver.connection_state(1), Some(ConnectionState::Unregistered));
    }

    #[test]
    fn accept_over_capacity_closes_connection() {
        let mut driver = RelayDriver::new(DriverConfig { max_connections: 1 });
        accept(&mut driver, 1);

        let actions = driver.process_event(ServerEvent::ConnectionAccepted { session_id: 2 }).unwrap();
        assert!(matches!(actions[0], ServerAction::CloseSession { session_id: 2, .. }));
        assert_eq!(driver.connection_count(), 1);
    }

    #[test]
    fn duplicate_session_id_is_an_error() {
        let mut driver = driver();
        accept(&mut driver, 1);

        let result = driver.process_event(ServerEvent::ConnectionAccepted { session_id: 1 });
        assert!(matches!(result, Err(DriverError::SessionAlreadyExists(1))));
    }

    #[test]
    fn message_from_unknown_session_is_an_error() {
        let mut driver = driver();
        let result = driver.process_event(ServerEvent::MessageReceived {
            session_id: 99,
            text: String::new(),
        });
        assert!(matches!(result, Err(DriverError::SessionNotFound(99))));
    }

    #[test]
    fn host_registration_assigns_id_and_transitions() {
        let mut driver = driver();
        accept(&mut driver, 1);

        let actions = message(&mut driver, 1, r#"{"type":"HOST","payload":"Frogger"}"#);
        assert_eq!(
            envelopes(&actions),
            vec![(1, ServerEnvelope::Registered { host_id: 1, host_name: "Frogger".to_owned() })]
        );
        assert_eq!(driver.connection_state(1), Some(ConnectionState::Host { host_id: 1 }));
    }

    #[test]
    fn default_driver_allocates_host_ids_from_one() {
        let mut driver = RelayDriver::default();
        accept(&mut driver, 1);

        let actions = message(&mut driver, 1, r#"{"type":"HOST","payload":"Frogger"}"#);
        assert_eq!(
            envelopes(&actions),
            vec![(1, ServerEnvelope::Registered { host_id: 1, host_name: "Frogger".to_owned() })]
        );
    }

    #[test]
    fn connect_by_name_notifies_both_sides() {
        let mut driver = driver();
        accept(&mut driver, 1);
        accept(&mut driver, 2);
        message(&mut driver, 1, r#"{"type":"HOST","payload":"Frogger"}"#);

        let actions = message(&mut driver, 2, r#"{"type":"CONNECT","hostName":"Frogger"}"#);
        let sent = envelopes(&actions);
        assert_eq!(sent.len(), 2);

        let ServerEnvelope::Connected { host_id, ref host_name, ref request } = sent[0].1 else {
            panic!("expected CONNECTED, got {:?}", sent[0].1);
        };
        assert_eq!(sent[0].0, 2);
        assert_eq!(host_id, 1);
        assert_eq!(host_name, "Frogger");
        assert_eq!(request.get("hostName"), Some(&serde_json::json!("Frogger")));

        let ServerEnvelope::NewClient { client_id, ref request } = sent[1].1 else {
            panic!("expected NEW_CLIENT, got {:?}", sent[1].1);
        };
        assert_eq!(sent[1].0, 1);
        assert_eq!(client_id, 1);
        assert!(!request.contains_key("type"));

        assert_eq!(
            driver.connection_state(2),
            Some(ConnectionState::Client { host_id: 1, client_id: 1 })
        );
    }

    #[test]
    fn connect_to_unknown_host_fails_and_allows_retry() {
        let mut driver = driver();
        accept(&mut driver, 1);

        let actions = message(&mut driver, 1, r#"{"type":"CONNECT","hostID":-1}"#);
        let sent = envelopes(&actions);
        let ServerEnvelope::ConnectFailed { ref request, .. } = sent[0].1 else {
            panic!("expected CONNECT_FAILED, got {:?}", sent[0].1);
        };
        assert_eq!(request.get("hostID"), Some(&serde_json::json!(-1)));
        assert_eq!(driver.connection_state(1), Some(ConnectionState::Unregistered));

        // Retry against a real host succeeds.
        accept(&mut driver, 2);
        message(&mut driver, 2, r#"{"type":"HOST","payload":"Asteroids"}"#);
        let actions = message(&mut driver, 1, r#"{"type":"CONNECT","hostID":1}"#);
        assert!(matches!(envelopes(&actions)[0].1, ServerEnvelope::Connected { .. }));
    }

    #[test]
    fn connect_with_both_targets_is_a_protocol_error() {
        let mut driver = driver();
        accept(&mut driver, 1);

        let actions = message(&mut driver, 1, r#"{"type":"CONNECT","hostName":"a","hostID":1}"#);
        assert!(matches!(envelopes(&actions)[0].1, ServerEnvelope::ProtocolError { .. }));
        assert_eq!(driver.connection_state(1), Some(ConnectionState::Unregistered));
    }

    #[test]
    fn role_reselection_is_rejected_without_state_change() {
        let mut driver = driver();
        accept(&mut driver, 1);
        message(&mut driver, 1, r#"{"type":"HOST","payload":"Frogger"}"#);

        let actions = message(&mut driver, 1, r#"{"type":"HOST","payload":"Again"}"#);
        assert!(matches!(envelopes(&actions)[0].1, ServerEnvelope::ProtocolError { .. }));
        assert_eq!(driver.connection_state(1), Some(ConnectionState::Host { host_id: 1 }));
        // The second name was never registered.
        assert!(driver.registry().host_by_name("Again").is_none());
    }

    #[test]
    fn relay_before_role_selection_is_a_protocol_error() {
        let mut driver = driver();
        accept(&mut driver, 1);

        let actions = message(&mut driver, 1, r#"{"type":"SHOUT","text":"hi"}"#);
        assert!(matches!(envelopes(&actions)[0].1, ServerEnvelope::ProtocolError { .. }));
    }

    #[test]
    fn malformed_text_from_unregistered_is_only_logged() {
        let mut driver = driver();
        accept(&mut driver, 1);

        let actions = message(&mut driver, 1, "not json at all");
        assert!(envelopes(&actions).is_empty());
        assert!(matches!(actions[0], ServerAction::Log { level: LogLevel::Warn, .. }));
    }

    #[test]
    fn list_works_in_every_state() {
        let mut driver = driver();
        for session in [1, 2, 3] {
            accept(&mut driver, session);
        }
        message(&mut driver, 1, r#"{"type":"HOST","payload":"Frogger"}"#);
        message(&mut driver, 2, r#"{"type":"CONNECT","hostName":"Frogger"}"#);

        for session in [1, 2, 3] {
            let actions = message(&mut driver, session, r#"{"type":"LIST"}"#);
            let sent = envelopes(&actions);
            let ServerEnvelope::List { ref payload } = sent[0].1 else {
                panic!("expected LIST, got {:?}", sent[0].1);
            };
            assert_eq!(payload.len(), 1);
            assert_eq!(payload[0].host_name, "Frogger");
        }
    }

    #[test]
    fn client_payload_relays_to_host_verbatim() {
        let mut driver = driver();
        accept(&mut driver, 1);
        accept(&mut driver, 2);
        message(&mut driver, 1, r#"{"type":"HOST","payload":"Frogger"}"#);
        message(&mut driver, 2, r#"{"type":"CONNECT","hostName":"Frogger"}"#);

        let actions = message(&mut driver, 2, "Hello there");
        assert_eq!(
            envelopes(&actions),
            vec![(
                1,
                ServerEnvelope::FromClient { client_id: 1, message: "Hello there".to_owned() }
            )]
        );
    }

    #[test]
    fn host_send_reaches_the_addressed_client() {
        let mut driver = driver();
        accept(&mut driver, 1);
        accept(&mut driver, 2);
        message(&mut driver, 1, r#"{"type":"HOST","payload":"Frogger"}"#);
        message(&mut driver, 2, r#"{"type":"CONNECT","hostName":"Frogger"}"#);

        let actions = message(&mut driver, 1, r#"{"type":"SEND","clientID":1,"message":"welcome"}"#);
        assert!(matches!(
            &actions[0],
            ServerAction::SendText { session_id: 2, text } if text == "welcome"
        ));
    }

    #[test]
    fn host_send_to_departed_client_is_silently_dropped() {
        let mut driver = driver();
        accept(&mut driver, 1);
        accept(&mut driver, 2);
        message(&mut driver, 1, r#"{"type":"HOST","payload":"Frogger"}"#);
        message(&mut driver, 2, r#"{"type":"CONNECT","hostName":"Frogger"}"#);
        close(&mut driver, 2);

        let actions = message(&mut driver, 1, r#"{"type":"SEND","clientID":1,"message":"hi"}"#);
        assert!(envelopes(&actions).is_empty());
        assert!(!actions.iter().any(|a| matches!(a, ServerAction::SendText { .. })));
    }

    #[test]
    fn client_close_notifies_host_exactly_once() {
        let mut driver = driver();
        accept(&mut driver, 1);
        accept(&mut driver, 2);
        message(&mut driver, 1, r#"{"type":"HOST","payload":"Frogger"}"#);
        message(&mut driver, 2, r#"{"type":"CONNECT","hostName":"Frogger"}"#);

        let first = close(&mut driver, 2);
        assert_eq!(
            envelopes(&first),
            vec![(1, ServerEnvelope::LostClient { payload: 1 })]
        );

        // A racing second close of the same session is a no-op.
        let second = close(&mut driver, 2);
        assert!(envelopes(&second).is_empty());
    }

    #[test]
    fn host_close_cascades_to_all_clients_in_order() {
        let mut driver = driver();
        accept(&mut driver, 1);
        message(&mut driver, 1, r#"{"type":"HOST","payload":"Frogger"}"#);
        for session in [2, 3, 4] {
            accept(&mut driver, session);
            message(&mut driver, session, r#"{"type":"CONNECT","hostName":"Frogger"}"#);
        }

        let actions = close(&mut driver, 1);
        let closed: Vec<u64> = actions
            .iter()
            .filter_map(|action| match action {
                ServerAction::CloseSession { session_id, reason, .. } => {
                    assert_eq!(reason, HOST_LEFT_REASON);
                    Some(*session_id)
                },
                _ => None,
            })
            .collect();
        assert_eq!(closed, vec![2, 3, 4]);

        // Registry is clean and the client states are evicted.
        assert_eq!(driver.registry().host_count(), 0);
        for session in [2, 3, 4] {
            assert_eq!(driver.connection_state(session), None);
        }

        // The clients' own transport close events arrive later and do
        // nothing further.
        for session in [2, 3, 4] {
            assert!(close(&mut driver, session).is_empty());
        }
    }

    #[test]
    fn unregistered_close_cleans_nothing_else() {
        let mut driver = driver();
        accept(&mut driver, 1);

        let actions = close(&mut driver, 1);
        assert!(envelopes(&actions).is_empty());
        assert_eq!(driver.connection_count(), 0);
    }
}
