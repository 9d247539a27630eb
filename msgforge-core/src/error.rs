//! Error types and result handling for msgforge.
//!
//! A single [`Error`] enum covers transport failures (upgrade, read and write),
//! JSON encoding problems and application-level errors raised by handlers or
//! extractors.
//!
//! # Where errors surface
//!
//! - **Upgrade failures** are logged and returned from
//!   [`Router::handle_connection`](crate::router::Router::handle_connection);
//!   no connection is registered and no callback fires.
//! - **Read failures** end the session loop. They are never returned to the host.
//! - **Write failures** are returned to whoever called one of the
//!   [`Connection`](crate::connection::Connection) send methods. The registry's
//!   fire-and-forget [`send`](crate::registry::Registry::send) swallows them.
//! - **Handler errors** are logged by the dispatcher and otherwise ignored.
//!
//! # Examples
//!
//! ```
//! use msgforge_core::prelude::*;
//!
//! fn validate(name: &str) -> Result<()> {
//!     if name.is_empty() {
//!         return Err(Error::handler("name cannot be empty"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(validate("").is_err());
//! ```

use std::fmt;
use thiserror::Error;

/// The main error type for msgforge operations.
#[derive(Debug, Error)]
pub enum Error {
    /// WebSocket protocol or transport error: a failed upgrade handshake,
    /// a failed read, or a failed write.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// I/O error from the listener or an accepted socket.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The listen address could not be parsed.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The message is not in the expected format (e.g. binary where text was needed).
    #[error("Invalid message format")]
    InvalidMessage,

    /// Error raised by handler logic.
    #[error("Handler error: {0}")]
    Handler(String),

    /// A handler argument could not be extracted.
    #[error("Extractor error: {0}")]
    Extractor(String),
}

/// A type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a handler error from any displayable message.
    pub fn handler<T: fmt::Display>(msg: T) -> Self {
        Error::Handler(msg.to_string())
    }

    /// Creates an extractor error from any displayable message.
    pub fn extractor<T: fmt::Display>(msg: T) -> Self {
        Error::Extractor(msg.to_string())
    }

    /// Returns `true` if the error came from the WebSocket transport.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::WebSocket(_) | Error::Io(_))
    }
}
