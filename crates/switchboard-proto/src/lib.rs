//! Switchboard wire protocol.
//!
//! Every message on the wire is a single UTF-8 JSON object ("envelope") with
//! a `"type"` tag, exchanged over a message-oriented duplex transport
//! (WebSocket text frames). This crate defines the envelope types for both
//! directions plus the classification rules that separate control envelopes
//! from opaque relay payloads.
//!
//! The relay itself is payload-agnostic: anything a registered client sends
//! that is not a recognized control envelope is forwarded verbatim, so this
//! crate deliberately exposes [`ControlEnvelope::parse`] as a *classifier*
//! that can fail, rather than a strict decoder.

mod envelope;
mod errors;

pub use envelope::{
    ConnectRequest, ConnectTarget, ControlEnvelope, HostInfo, ServerEnvelope, relay_text,
};
pub use errors::EnvelopeError;

/// Protocol version advertised in `SERVER_INFO` on every accepted connection.
pub const API_VERSION: &str = "1.0.0";

/// Close reason used when a host's teardown cascades to its clients.
///
/// Clients distinguish this from an ordinary close to tell "my host left"
/// apart from "my own connection dropped".
pub const HOST_LEFT_REASON: &str = "host left";
