//! Host and client routes.
//!
//! The server-side bookkeeping for participants forms a two-level ownership
//! tree: the registry owns every [`HostRoute`], and each `HostRoute` owns the
//! [`ClientRoute`]s attached to it. Teardown walks the tree top-down, so a
//! client route can never outlive its host.
//!
//! # Invariants
//!
//! - Client ids are allocated per host, monotonically from 1, and never
//!   reused for the life of the host.
//! - Clients are stored in a `BTreeMap`, so iteration order is id order,
//!   which equals registration order. Cascading teardown relies on this.
//! - [`HostRoute::close`] drains clients at most once; re-entrant or racing
//!   invocations observe the done-once flag and get an empty list.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use switchboard_proto::ServerEnvelope;

/// One connected client, attached to exactly one host.
#[derive(Debug, Clone)]
pub struct ClientRoute {
    id: u64,
    session_id: u64,
    host_id: u64,
    request: Map<String, Value>,
}

impl ClientRoute {
    /// Host-scoped client id. Unique only within the owning host.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Transport session this client owns.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Id of the owning host. A back-reference, never ownership.
    pub fn host_id(&self) -> u64 {
        self.host_id
    }

    /// The CONNECT request this client attached with, minus the `type` tag.
    pub fn request(&self) -> &Map<String, Value> {
        &self.request
    }

    /// Wrap an opaque payload from this client for delivery to its host,
    /// tagged with the client id so the host can demultiplex.
    pub fn relay_to_host(&self, text: &str) -> ServerEnvelope {
        ServerEnvelope::FromClient { client_id: self.id, message: text.to_owned() }
    }
}

/// One registered host and the clients attached to it.
#[derive(Debug)]
pub struct HostRoute {
    id: u64,
    name: String,
    session_id: u64,
    clients: BTreeMap<u64, ClientRoute>,
    next_client_id: u64,
    closed: bool,
}

impl HostRoute {
    pub(crate) fn new(id: u64, name: String, session_id: u64) -> Self {
        Self { id, name, session_id, clients: BTreeMap::new(), next_client_id: 1, closed: false }
    }

    /// Globally unique host id. Immutable after creation.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Display name the host registered under. Immutable after creation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Transport session this host owns.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Attach a client and allocate its host-scoped id.
    ///
    /// Bookkeeping only; notifying the host is the router's job.
    pub fn register_client(&mut self, session_id: u64, request: Map<String, Value>) -> u64 {
        let id = self.next_client_id;
        self.next_client_id += 1;
        self.clients.insert(id, ClientRoute { id, session_id, host_id: self.id, request });
        id
    }

    /// Look up an attached client.
    pub fn client(&self, client_id: u64) -> Option<&ClientRoute> {
        self.clients.get(&client_id)
    }

    /// Detach a client. Idempotent: `None` if already absent.
    pub fn remove_client(&mut self, client_id: u64) -> Option<ClientRoute> {
        self.clients.remove(&client_id)
    }

    /// Number of currently attached clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Begin cascading teardown: drain every owned client, in registration
    /// order, exactly once.
    ///
    /// The first call returns the full client list and marks the route
    /// closed; any later call returns an empty list. Closing the drained
    /// clients' sessions is the caller's responsibility.
    pub fn close(&mut self) -> Vec<ClientRoute> {
        if self.closed {
            return Vec::new();
        }
        self.closed = true;
        std::mem::take(&mut self.clients).into_values().collect()
    }

    /// Whether teardown has already run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
