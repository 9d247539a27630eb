//! A single upgraded connection and the operations available on it.
//!
//! A [`Connection`] is created by the session loop right after the WebSocket
//! upgrade succeeds. It is cheaply cloneable: every clone shares the same
//! write half of the transport, the same request metadata and the same
//! context slot. Handlers usually get hold of one through the
//! [`Connection`] extractor or a [`Registry`](crate::registry::Registry)
//! lookup.
//!
//! # Writes
//!
//! All sends and the close signal go through one async mutex per connection.
//! The lock is held for exactly one frame, so frames written by concurrent
//! callers never interleave on the wire.
//!
//! # Examples
//!
//! ```no_run
//! use msgforge_core::prelude::*;
//!
//! # async fn example(conn: Connection) -> Result<()> {
//! // {"type":"welcome"}
//! conn.send("welcome").await?;
//!
//! // {"type":"score","data":{"points":10}}
//! conn.send_data("score", &serde_json::json!({ "points": 10 })).await?;
//!
//! // One envelope per payload: {"type":"tick","data":1}, {"type":"tick","data":2}
//! conn.send_each("tick", [1, 2]).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::message::Message;
use futures_util::{Sink, SinkExt};
use http::{HeaderMap, Uri};
use serde::Serialize;
use std::any::Any;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::debug;
use tungstenite::Message as TungsteniteMessage;
use tungstenite::handshake::server::Request;
use tungstenite::protocol::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;

/// A unique identifier for a connection: 24 lowercase hex characters.
///
/// Identifiers carry 96 bits of randomness. Collisions are not detected; a
/// colliding registration replaces the older registry entry.
pub type ConnectionId = String;

type FrameSink = Pin<Box<dyn Sink<TungsteniteMessage, Error = tungstenite::Error> + Send>>;
type ContextValue = Arc<dyn Any + Send + Sync>;

/// Generates a fresh random connection identifier.
pub fn generate_connection_id() -> ConnectionId {
    let bytes: [u8; 12] = rand::random();
    hex::encode(bytes)
}

/// Metadata about a connection, captured from the upgrade request.
///
/// Immutable once the connection is created.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Socket address of the connected client
    pub addr: SocketAddr,
    /// Unix timestamp when the connection was established
    pub connected_at: u64,
    /// Request target of the upgrade request
    pub uri: Uri,
    /// Headers of the upgrade request
    pub headers: HeaderMap,
}

impl ConnectionInfo {
    /// Creates connection metadata stamped with the current time.
    pub fn new(id: ConnectionId, addr: SocketAddr, uri: Uri, headers: HeaderMap) -> Self {
        let connected_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();

        Self {
            id,
            addr,
            connected_at,
            uri,
            headers,
        }
    }

    /// Captures the metadata of a handshake request.
    pub fn from_request(id: ConnectionId, addr: SocketAddr, request: &Request) -> Self {
        Self::new(id, addr, request.uri().clone(), request.headers().clone())
    }

    /// Path of the upgrade request, e.g. `/ws`.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Raw query string of the upgrade request, without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Value of a request header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// An upgraded connection to one peer.
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    info: Arc<ConnectionInfo>,
    sink: Arc<Mutex<FrameSink>>,
    context: Arc<RwLock<Option<ContextValue>>>,
}

impl Connection {
    /// Wraps the write half of a transport.
    ///
    /// Called by the session loop after the upgrade. Any sink of tungstenite
    /// frames works, which keeps the type independent of the underlying
    /// stream.
    pub fn new<S>(info: ConnectionInfo, sink: S) -> Self
    where
        S: Sink<TungsteniteMessage, Error = tungstenite::Error> + Send + 'static,
    {
        Self {
            id: info.id.clone(),
            info: Arc::new(info),
            sink: Arc::new(Mutex::new(Box::pin(sink))),
            context: Arc::new(RwLock::new(None)),
        }
    }

    /// Returns the unique identifier for this connection.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Returns the metadata of the original upgrade request.
    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// Sends the payload-less envelope `{"type":"<kind>"}`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WebSocket`](crate::error::Error::WebSocket) if the write fails.
    pub async fn send(&self, kind: &str) -> Result<()> {
        self.send_message(Message::envelope(kind)?).await
    }

    /// Sends `{"type":"<kind>","data":<data>}`.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` cannot be serialized or the write fails.
    pub async fn send_data<T: Serialize + ?Sized>(&self, kind: &str, data: &T) -> Result<()> {
        self.send_message(Message::envelope_with(kind, data)?).await
    }

    /// Sends one `{"type","data"}` envelope per payload, in order.
    ///
    /// Stops at the first failure and returns it; later payloads are not
    /// attempted. An empty `payloads` sends the bare `{"type":"<kind>"}`
    /// envelope, like [`send`](Self::send).
    ///
    /// The write lock is taken per frame, so frames from other callers may
    /// land between two envelopes of the same call.
    pub async fn send_each<I>(&self, kind: &str, payloads: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Serialize,
    {
        let mut sent = false;
        for payload in payloads {
            self.send_data(kind, &payload).await?;
            sent = true;
        }

        if !sent {
            self.send(kind).await?;
        }
        Ok(())
    }

    /// Sends a text frame verbatim.
    pub async fn send_raw(&self, text: impl Into<String>) -> Result<()> {
        self.send_message(Message::text(text)).await
    }

    /// Sends a prepared [`Message`].
    pub async fn send_message(&self, message: Message) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(message.into_tungstenite()).await?;
        Ok(())
    }

    /// Sends a normal-closure (1000) close frame to the peer.
    ///
    /// Local resources are released by the session loop once the peer
    /// acknowledges and the read side ends.
    pub async fn close(&self) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };

        let mut sink = self.sink.lock().await;
        sink.send(TungsteniteMessage::Close(Some(frame))).await?;
        Ok(())
    }

    /// Closes the write half of the transport. Errors are only logged.
    pub(crate) async fn shutdown(&self) {
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            debug!("Transport for {} already closed: {}", self.id, e);
        }
    }

    /// Stores an application value on the connection, replacing any previous one.
    pub fn set_context<T: Send + Sync + 'static>(&self, value: T) {
        let mut slot = self.context.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::new(value));
    }

    /// Returns the stored value if one is set and it has type `T`.
    pub fn context<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let slot = self.context.read().unwrap_or_else(PoisonError::into_inner);
        slot.clone().and_then(|value| value.downcast::<T>().ok())
    }

    /// Removes the stored value. Returns `true` if one was set.
    pub fn clear_context(&self) -> bool {
        let mut slot = self.context.write().unwrap_or_else(PoisonError::into_inner);
        slot.take().is_some()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("addr", &self.info.addr)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_generated_ids_are_hex() {
        let id = generate_connection_id();
        assert_eq!(id.len(), 24);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_generated_ids_differ() {
        let ids: std::collections::HashSet<_> = (0..1000).map(|_| generate_connection_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_request_accessors() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user", "ada".parse().unwrap());
        let info = ConnectionInfo::new(
            "abc".to_string(),
            "10.0.0.1:4000".parse().unwrap(),
            Uri::from_static("/ws?token=t1"),
            headers,
        );

        assert_eq!(info.path(), "/ws");
        assert_eq!(info.query(), Some("token=t1"));
        assert_eq!(info.header("x-user"), Some("ada"));
        assert_eq!(info.header("x-missing"), None);
        assert!(info.connected_at > 0);
    }

    #[tokio::test]
    async fn test_send_without_payload() {
        let (conn, mut rx) = recording_connection("c1");
        conn.send("ping").await.unwrap();
        assert_eq!(text_of(rx.recv().await.unwrap()), r#"{"type":"ping"}"#);
    }

    #[tokio::test]
    async fn test_send_data() {
        let (conn, mut rx) = recording_connection("c1");
        conn.send_data("user", &serde_json::json!({ "name": "ada" }))
            .await
            .unwrap();
        assert_eq!(
            text_of(rx.recv().await.unwrap()),
            r#"{"type":"user","data":{"name":"ada"}}"#
        );
    }

    #[tokio::test]
    async fn test_send_each_in_order() {
        let (conn, mut rx) = recording_connection("c1");
        conn.send_each("n", [1, 2, 3]).await.unwrap();

        for n in 1..=3 {
            let expected = format!(r#"{{"type":"n","data":{}}}"#, n);
            assert_eq!(text_of(rx.recv().await.unwrap()), expected);
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_each_empty_sends_bare_envelope() {
        let (conn, mut rx) = recording_connection("c1");
        conn.send_each("hello", Vec::<u32>::new()).await.unwrap();
        assert_eq!(text_of(rx.recv().await.unwrap()), r#"{"type":"hello"}"#);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_each_stops_at_first_failure() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = futures_util::sink::unfold(0usize, move |written, frame: TungsteniteMessage| {
            let tx = tx.clone();
            async move {
                if written == 1 {
                    return Err(tungstenite::Error::ConnectionClosed);
                }
                let _ = tx.send(frame);
                Ok(written + 1)
            }
        });
        let conn = Connection::new(test_info("c1"), sink);

        let err = conn.send_each("n", [1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, Error::WebSocket(_)));
        assert_eq!(text_of(rx.recv().await.unwrap()), r#"{"type":"n","data":1}"#);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_write_failure_is_returned() {
        let conn = broken_connection("c1");
        assert!(conn.send("x").await.unwrap_err().is_transport());
        assert!(conn.send_data("x", &1).await.unwrap_err().is_transport());
        assert!(conn.close().await.is_err());
        conn.shutdown().await;
    }

    #[tokio::test]
    async fn test_clones_share_failed_transport() {
        let conn = broken_connection("c1");
        let other = conn.clone();

        assert!(conn.send_raw("a").await.is_err());
        assert!(other.send_raw("b").await.is_err());
    }

    #[test]
    fn test_id_matches_request_info() {
        let (conn, _rx) = recording_connection("c1");
        let clone = conn.clone();

        assert_eq!(clone.id(), "c1");
        assert_eq!(clone.id(), &clone.info().id);
        assert!(format!("{:?}", clone).contains("c1"));
    }

    #[tokio::test]
    async fn test_close_sends_normal_closure() {
        let (conn, mut rx) = recording_connection("c1");
        conn.close().await.unwrap();

        match rx.recv().await.unwrap() {
            TungsteniteMessage::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Normal),
            other => panic!("expected close frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrent_sends_are_whole_frames() {
        let (conn, mut rx) = recording_connection("c1");

        let mut tasks = Vec::new();
        for worker in 0..8 {
            let conn = conn.clone();
            tasks.push(tokio::spawn(async move {
                for n in 0..50 {
                    conn.send_data("w", &(worker * 1000 + n)).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut seen = std::collections::HashSet::new();
        for _ in 0..400 {
            let text = text_of(rx.recv().await.unwrap());
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value["type"], "w");
            seen.insert(value["data"].as_u64().unwrap());
        }
        assert_eq!(seen.len(), 400);
    }

    #[test]
    fn test_context_round_trip() {
        #[derive(Debug, PartialEq)]
        struct User {
            name: String,
        }

        let (conn, _rx) = recording_connection("c1");
        assert!(conn.context::<User>().is_none());

        conn.set_context(User {
            name: "ada".to_string(),
        });
        let clone = conn.clone();
        assert_eq!(clone.context::<User>().unwrap().name, "ada");
        assert!(clone.context::<String>().is_none());

        assert!(conn.clear_context());
        assert!(clone.context::<User>().is_none());
        assert!(!conn.clear_context());
    }
}
