//! Error types for the bridge
//!
//! Errors are split by the layer they come from so the monitor loop can tell
//! recoverable failures (fetch, parse, publish) from the ones that require a
//! fresh broker connection.

use thiserror::Error;

/// Result of a feed fetch that produced no usable body
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The feed answered with an empty body (no active alert)
    #[error("feed returned an empty body")]
    Empty,

    /// The feed answered with a non-200 status code
    #[error("feed returned HTTP {0}")]
    Http(u16),

    /// The request never produced a response
    #[error("feed request failed: {0}")]
    Transport(String),
}

/// Reasons a fetched body did not turn into an alert
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Body was empty or whitespace after cleaning
    #[error("alert body is blank")]
    Blank,

    /// Body was not a JSON object
    #[error("failed to parse alert JSON: {reason}, raw data: {prefix}...")]
    Malformed {
        reason: String,
        /// Leading characters of the cleaned text, for diagnostics
        prefix: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("publish failed: {0}")]
    Failed(String),
}

/// Broker level failures, these end the current connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("failed to connect to broker: {0}")]
    ConnectFailed(String),

    #[error("broker connection lost: {0}")]
    ConnectionLost(String),
}
