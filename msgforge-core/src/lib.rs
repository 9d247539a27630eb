//! # msgforge-core
//!
//! Type-routed JSON messaging over WebSocket connections.
//!
//! Every accepted connection is upgraded to a WebSocket, given a random
//! identifier and stored in a [`Registry`]. Each inbound frame is expected to
//! be a JSON object with a `type` field; the value of that field selects the
//! handler that receives the message. Messages with no matching handler get
//! `{"type":"Error","message":"Unknown type"}` back on the same connection.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Application                         │
//! │   handlers (by type)   on_open / on_close   shared state    │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        msgforge-core                        │
//! │   Router ── session loop ── HandlerTable      Registry      │
//! │                 │                                 │         │
//! │             Connection (write lock, context) ─────┘         │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//! ┌─────────────────────────────────────────────────────────────┐
//! │             tokio-tungstenite (handshake, framing)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`connection`]: a single connection, its send/close operations and context slot
//! - [`registry`]: live connections by identifier, lookup and broadcast
//! - [`handler`]: handler trait, function adaptation and the handler table
//! - [`extractor`]: typed handler arguments
//! - [`message`]: frames and the `type` envelope
//! - [`router`]: configuration and the upgrade endpoint
//! - [`state`]: shared application state
//! - [`error`]: error types
//!
//! ## Quick Start
//!
//! ```no_run
//! use msgforge_core::prelude::*;
//!
//! async fn echo(msg: Message, State(registry): State<Registry>, conn: Connection) {
//!     if let Some(text) = msg.as_text() {
//!         registry.send(conn.id(), text).await;
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     Router::new()
//!         .handle("echo", handler(echo))
//!         .listen("127.0.0.1:8080")
//!         .await
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod connection;
pub mod error;
pub mod extractor;
pub mod handler;
pub mod message;
pub mod registry;
pub mod router;
mod session;
pub mod state;

pub use connection::{Connection, ConnectionId, ConnectionInfo};
pub use error::{Error, Result};
pub use extractor::{ConnectInfo, Data, FromMessage, Json, State};
pub use handler::{Handler, HandlerService, HandlerTable, IntoHandler, IntoOutcome, handler};
pub use message::{Message, MessageType};
pub use registry::Registry;
pub use router::Router;
pub use state::AppState;

/// Commonly used types, for glob import.
pub mod prelude {
    pub use crate::connection::{Connection, ConnectionId, ConnectionInfo};
    pub use crate::error::{Error, Result};
    pub use crate::extractor::{ConnectInfo, Data, Json, State};
    pub use crate::handler::{Handler, IntoOutcome, handler};
    pub use crate::message::{Message, MessageType};
    pub use crate::registry::Registry;
    pub use crate::router::Router;
    pub use crate::state::AppState;
}
