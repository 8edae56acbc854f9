//! JSON envelope types for both directions of the relay protocol.
//!
//! Inbound control envelopes ([`ControlEnvelope`]) are the verbs a
//! participant may address to the server; outbound envelopes
//! ([`ServerEnvelope`]) are everything the server sends. Field names follow
//! the wire contract exactly (`hostID`, `clientID`, `apiVersion`), so every
//! struct field carries a serde rename.
//!
//! # Invariants
//!
//! - Each envelope variant maps to exactly one `"type"` tag (enforced by the
//!   internally-tagged serde representation).
//! - CONNECT requests preserve arbitrary extra fields; echoing a request
//!   back (`CONNECTED`, `NEW_CLIENT`, `CONNECT_FAILED`) reproduces those
//!   fields verbatim, minus the `type` tag.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::EnvelopeError;

/// Resolution target of a CONNECT request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectTarget<'a> {
    /// Lookup by display name.
    Name(&'a str),
    /// Lookup by numeric host id.
    ///
    /// Signed on the wire: clients may probe with ids the server never
    /// allocated (e.g. `-1`), which must fail cleanly and echo back.
    Id(i64),
}

/// A CONNECT request: one target field plus arbitrary pass-through fields.
///
/// The extra fields are opaque to the relay. They travel to the host inside
/// `NEW_CLIENT` and back to the client inside `CONNECTED`, untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// Target host display name, if connecting by name.
    #[serde(rename = "hostName", skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,

    /// Target host id, if connecting by id.
    #[serde(rename = "hostID", skip_serializing_if = "Option::is_none")]
    pub host_id: Option<i64>,

    /// Everything else the client sent, preserved for echo.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConnectRequest {
    /// The target this request names.
    ///
    /// Exactly one of `hostName` / `hostID` must be present; anything else
    /// is a protocol violation.
    pub fn target(&self) -> Result<ConnectTarget<'_>, EnvelopeError> {
        match (&self.host_name, self.host_id) {
            (Some(name), None) => Ok(ConnectTarget::Name(name)),
            (None, Some(id)) => Ok(ConnectTarget::Id(id)),
            _ => Err(EnvelopeError::AmbiguousTarget),
        }
    }

    /// The request as echoed in `CONNECTED`, `NEW_CLIENT` and
    /// `CONNECT_FAILED`: the original CONNECT fields minus the `type` tag.
    pub fn echo_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        if let Some(name) = &self.host_name {
            fields.insert("hostName".to_owned(), Value::String(name.clone()));
        }
        if let Some(id) = self.host_id {
            fields.insert("hostID".to_owned(), Value::from(id));
        }
        for (key, value) in &self.extra {
            fields.insert(key.clone(), value.clone());
        }
        fields
    }
}

/// Control envelopes a participant may send to the server.
///
/// Everything else a registered client sends is an opaque relay payload and
/// never reaches this type; see [`ControlEnvelope::parse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlEnvelope {
    /// Register the sender as a host under a display name.
    #[serde(rename = "HOST")]
    Host {
        /// Desired display name.
        payload: String,
    },

    /// Attach the sender as a client of an existing host.
    #[serde(rename = "CONNECT")]
    Connect(ConnectRequest),

    /// Request the active-host snapshot. Valid in any state.
    #[serde(rename = "LIST")]
    List,

    /// Host-addressed relay down to one of its clients.
    #[serde(rename = "SEND")]
    Send {
        /// Host-scoped id of the target client.
        #[serde(rename = "clientID")]
        client_id: u64,
        /// Opaque payload, delivered to the client verbatim.
        message: Value,
    },
}

impl ControlEnvelope {
    const KNOWN_TYPES: [&'static str; 4] = ["HOST", "CONNECT", "LIST", "SEND"];

    /// Classify one inbound text message.
    ///
    /// Returns the decoded control envelope, or an error describing *why*
    /// the text is not one: the router maps [`EnvelopeError::UnknownType`]
    /// and [`EnvelopeError::Malformed`] to different outcomes depending on
    /// the sender's role.
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        let Some(object) = value.as_object() else {
            return Err(EnvelopeError::Malformed("expected a JSON object".to_owned()));
        };
        let Some(tag) = object.get("type").and_then(Value::as_str) else {
            return Err(EnvelopeError::MissingType);
        };
        if !Self::KNOWN_TYPES.contains(&tag) {
            return Err(EnvelopeError::UnknownType(tag.to_owned()));
        }
        serde_json::from_value(value).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }
}

/// One entry in a `LIST` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    /// Globally unique host id.
    #[serde(rename = "hostID")]
    pub host_id: u64,
    /// Display name the host registered under.
    #[serde(rename = "hostName")]
    pub host_name: String,
}

/// Envelopes the server sends to participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEnvelope {
    /// Greeting sent to every accepted connection before classification.
    #[serde(rename = "SERVER_INFO")]
    ServerInfo {
        /// Protocol version, semver.
        #[serde(rename = "apiVersion")]
        api_version: String,
    },

    /// Host registration succeeded.
    #[serde(rename = "REGISTERED")]
    Registered {
        /// Assigned host id.
        #[serde(rename = "hostID")]
        host_id: u64,
        /// Registered display name.
        #[serde(rename = "hostName")]
        host_name: String,
    },

    /// Client attachment succeeded.
    #[serde(rename = "CONNECTED")]
    Connected {
        /// Id of the host the client is now attached to.
        #[serde(rename = "hostID")]
        host_id: u64,
        /// Display name of that host.
        #[serde(rename = "hostName")]
        host_name: String,
        /// Echo of the CONNECT request, minus the `type` tag.
        request: Map<String, Value>,
    },

    /// CONNECT named a host that does not exist. The sender stays
    /// unregistered and may retry.
    #[serde(rename = "CONNECT_FAILED")]
    ConnectFailed {
        /// Human-readable failure reason.
        error: String,
        /// Echo of the original CONNECT fields.
        #[serde(flatten)]
        request: Map<String, Value>,
    },

    /// Notifies a host that a client attached.
    #[serde(rename = "NEW_CLIENT")]
    NewClient {
        /// Host-scoped id assigned to the client.
        #[serde(rename = "clientID")]
        client_id: u64,
        /// The client's CONNECT request, minus the `type` tag.
        request: Map<String, Value>,
    },

    /// Relay payload from a client up to its host.
    #[serde(rename = "FROM_CLIENT")]
    FromClient {
        /// Host-scoped id of the sending client.
        #[serde(rename = "clientID")]
        client_id: u64,
        /// The client's raw text, forwarded verbatim.
        message: String,
    },

    /// Notifies a host that a client disconnected.
    #[serde(rename = "LOST_CLIENT")]
    LostClient {
        /// Host-scoped id of the departed client.
        payload: u64,
    },

    /// Active-host snapshot, in registration order.
    #[serde(rename = "LIST")]
    List {
        /// Currently registered hosts with open sessions.
        payload: Vec<HostInfo>,
    },

    /// The sender's message violated the protocol for its current role.
    /// The connection stays open in its current state.
    #[serde(rename = "PROTOCOL_ERROR")]
    ProtocolError {
        /// Description of the violation.
        message: String,
    },
}

impl ServerEnvelope {
    /// The greeting for a newly accepted connection.
    pub fn server_info() -> Self {
        Self::ServerInfo { api_version: crate::API_VERSION.to_owned() }
    }

    /// Serialize to the wire representation.
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(|e| EnvelopeError::Encode(e.to_string()))
    }
}

/// Render a host-addressed relay value as the text delivered to the client.
///
/// Delivery down to a client is untagged (the client has exactly one host),
/// so a JSON string is unwrapped to its raw text and any other value is sent
/// as compact JSON.
pub fn relay_text(message: &Value) -> String {
    match message {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
