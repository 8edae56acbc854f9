//! Protocol error types.

/// Errors from envelope classification, decoding, and encoding.
///
/// The distinction between [`EnvelopeError::Malformed`] and
/// [`EnvelopeError::UnknownType`] matters to the router: a well-formed
/// envelope with an unrecognized tag from an unregistered connection is a
/// protocol violation (the sender gets a reply), while unparseable text is
/// only logged.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// Text is not a JSON object, or a known envelope is missing fields.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// JSON object without a string `"type"` field.
    #[error("envelope has no \"type\" field")]
    MissingType,

    /// Well-formed envelope whose `"type"` is not a control verb.
    #[error("unknown envelope type {0:?}")]
    UnknownType(String),

    /// CONNECT must name exactly one of `hostName` or `hostID`.
    #[error("CONNECT must name exactly one of hostName or hostID")]
    AmbiguousTarget,

    /// Failed to serialize an outbound envelope.
    #[error("failed to encode envelope: {0}")]
    Encode(String),
}
