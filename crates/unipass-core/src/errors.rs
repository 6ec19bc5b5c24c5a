//! Error types shared by the controller and the browser bindings

use thiserror::Error;

/// Failure to turn a public key into an address (or to parse one back)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("public key is empty")]
    EmptyPublicKey,

    #[error("public key is not valid hex: {0}")]
    InvalidHex(String),

    #[error("invalid address prefix: {0}")]
    InvalidPrefix(String),

    #[error("bech32 encoding failed: {0}")]
    Bech32Encode(String),

    #[error("bech32 decoding failed: {0}")]
    Bech32Decode(String),

    #[error("invalid address payload: {0}")]
    InvalidPayload(String),
}

/// Errors raised by the window system hosting the popup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("popup window was blocked: {0}")]
    PopupBlocked(String),

    #[error("failed to post message to popup: {0}")]
    PostMessage(String),

    #[error("message listener error: {0}")]
    Listener(String),

    #[error("window is not available: {0}")]
    Unavailable(String),
}

/// Outcome of a handshake that did not resolve successfully
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("popup was closed before the operation completed")]
    PopupClosedByUser,

    #[error("popup did not respond within {0} ms")]
    Timeout(u64),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("identity derivation failed: {0}")]
    EncodingFailure(#[from] EncodingError),

    #[error("host error: {0}")]
    Host(#[from] HostError),

    #[error("provider was closed while the operation was pending")]
    ListenerClosed,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Invalid provider configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid base url {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
}
