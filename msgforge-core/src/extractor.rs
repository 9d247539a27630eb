//! Typed handler arguments.
//!
//! Handlers declare what they need as arguments, and each argument type
//! implements [`FromMessage`] to pull itself out of the incoming message, the
//! connection it arrived on, or the shared state.
//!
//! | Extractor | Yields |
//! |-----------|--------|
//! | [`Message`] | The raw inbound message, every field intact |
//! | [`Json<T>`] | The message deserialized as `T` |
//! | [`Connection`] | The connection the message arrived on |
//! | [`State<T>`] | Shared state registered with `Router::with_state` |
//! | [`ConnectInfo`] | Upgrade request metadata |
//! | [`Data`] | The raw payload bytes |
//!
//! ```no_run
//! use msgforge_core::prelude::*;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Join {
//!     room: String,
//! }
//!
//! async fn join(Json(join): Json<Join>, conn: Connection) -> Result<()> {
//!     conn.send_data("joined", &join.room).await
//! }
//! ```

use crate::connection::{Connection, ConnectionInfo};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::state::AppState;
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;

/// A type that can be extracted for a handler invocation.
#[async_trait]
pub trait FromMessage: Sized {
    /// Performs the extraction. An error aborts the handler call and is
    /// logged by the dispatcher.
    async fn from_message(message: &Message, conn: &Connection, state: &AppState) -> Result<Self>;
}

/// Extracts shared state of type `T`.
pub struct State<T>(pub std::sync::Arc<T>);

#[async_trait]
impl<T: Send + Sync + 'static> FromMessage for State<T> {
    async fn from_message(_message: &Message, _conn: &Connection, state: &AppState) -> Result<Self> {
        state
            .get::<T>()
            .ok_or_else(|| Error::extractor(format!("State not found: {}", std::any::type_name::<T>())))
            .map(State)
    }
}

/// Deserializes the whole message as `T`.
///
/// Since the envelope is a plain JSON object, `T` usually includes only the
/// fields it cares about; `type` and anything else are ignored by serde.
pub struct Json<T>(pub T);

#[async_trait]
impl<T: DeserializeOwned + Send> FromMessage for Json<T> {
    async fn from_message(message: &Message, _conn: &Connection, _state: &AppState) -> Result<Self> {
        let data: T = message.json()?;
        Ok(Json(data))
    }
}

#[async_trait]
impl FromMessage for Connection {
    async fn from_message(_message: &Message, conn: &Connection, _state: &AppState) -> Result<Self> {
        Ok(conn.clone())
    }
}

/// Metadata of the upgrade request the connection was created from.
pub struct ConnectInfo(pub ConnectionInfo);

#[async_trait]
impl FromMessage for ConnectInfo {
    async fn from_message(_message: &Message, conn: &Connection, _state: &AppState) -> Result<Self> {
        Ok(ConnectInfo(conn.info().clone()))
    }
}

#[async_trait]
impl FromMessage for Message {
    async fn from_message(message: &Message, _conn: &Connection, _state: &AppState) -> Result<Self> {
        Ok(message.clone())
    }
}

/// The raw payload bytes.
pub struct Data(pub Bytes);

#[async_trait]
impl FromMessage for Data {
    async fn from_message(message: &Message, _conn: &Connection, _state: &AppState) -> Result<Self> {
        Ok(Data(message.data.clone()))
    }
}
