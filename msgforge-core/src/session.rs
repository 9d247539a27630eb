//! The per-connection session loop.
//!
//! Each accepted stream goes through:
//!
//! ```text
//! Upgrading ──fail──> (logged, nothing registered, no callbacks)
//!     │
//!     v
//! Registered ──> Active ──read error / close / panic──> Terminating ──> Closed
//!                  │  ^                                      │
//!                  v  │                                      ├─ 1. on_close (id still registered)
//!               dispatch                                     ├─ 2. unregister
//!                                                            └─ 3. close transport
//! ```
//!
//! Reads are strictly sequential: the next frame is read only after the
//! previous one's handler has returned. No read timeout is applied.

use crate::connection::{Connection, ConnectionId, ConnectionInfo, generate_connection_id};
use crate::error::Result;
use crate::handler::HandlerTable;
use crate::message::Message;
use crate::registry::Registry;
use crate::state::AppState;
use futures_util::FutureExt;
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use http::{HeaderMap, Uri};
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async_with_config};
use tracing::{debug, error, info, warn};
use tungstenite::Message as TungsteniteMessage;
use tungstenite::error::ProtocolError;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::protocol::WebSocketConfig;

/// An open or close callback: receives the registry and the connection id.
pub(crate) type LifecycleHook =
    Arc<dyn Fn(Arc<Registry>, ConnectionId) -> BoxFuture<'static, ()> + Send + Sync>;

/// Everything a session needs besides its own stream.
pub(crate) struct SessionContext<'a> {
    pub(crate) registry: &'a Arc<Registry>,
    pub(crate) handlers: &'a HandlerTable,
    pub(crate) state: &'a AppState,
    pub(crate) on_open: Option<&'a LifecycleHook>,
    pub(crate) on_close: Option<&'a LifecycleHook>,
}

/// Performs the WebSocket handshake and assigns the connection its identifier.
pub(crate) async fn upgrade<S>(
    stream: S,
    peer_addr: SocketAddr,
    config: Option<WebSocketConfig>,
) -> Result<(WebSocketStream<S>, ConnectionInfo)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut request_parts: Option<(Uri, HeaderMap)> = None;
    let capture = |request: &Request,
                   response: Response|
     -> std::result::Result<Response, ErrorResponse> {
        request_parts = Some((request.uri().clone(), request.headers().clone()));
        Ok(response)
    };

    let ws_stream = accept_hdr_async_with_config(stream, capture, config).await?;

    let (uri, headers) = request_parts.unwrap_or_default();
    let info = ConnectionInfo::new(generate_connection_id(), peer_addr, uri, headers);
    Ok((ws_stream, info))
}

/// Drives one upgraded connection from registration to teardown.
pub(crate) async fn run<S>(ws_stream: WebSocketStream<S>, info: ConnectionInfo, ctx: SessionContext<'_>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let conn_id = info.id.clone();
    let peer_addr = info.addr;

    let (sink, mut frames) = ws_stream.split();
    let conn = Connection::new(info, sink);

    let count = ctx.registry.register(conn.clone());
    info!(
        "Connection opened: {} from {} (Total: {})",
        conn_id, peer_addr, count
    );

    let active = async {
        if let Some(on_open) = ctx.on_open {
            on_open(ctx.registry.clone(), conn_id.clone()).await;
        }

        while let Some(frame) = frames.next().await {
            match frame {
                Ok(TungsteniteMessage::Close(frame)) => {
                    debug!("Close frame from {}: {:?}", conn_id, frame);
                    break;
                }
                Ok(frame) => {
                    let Some(message) = Message::from_tungstenite(frame) else {
                        continue;
                    };
                    debug!("Received {:?} message from {}", message.message_type(), conn_id);

                    match ctx.handlers.dispatch(&conn, ctx.state, message).await {
                        Ok(()) => {}
                        Err(e) if e.is_transport() => {
                            debug!("Could not reply to {}: {}", conn_id, e);
                        }
                        Err(e) => warn!("Dispatch failed for {}: {}", conn_id, e),
                    }
                }
                Err(
                    e @ (tungstenite::Error::ConnectionClosed
                    | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake)),
                ) => {
                    debug!("Connection {} dropped: {}", conn_id, e);
                    break;
                }
                Err(e) => {
                    warn!("WebSocket error for {}: {}", conn_id, e);
                    break;
                }
            }
        }
    };

    if AssertUnwindSafe(active).catch_unwind().await.is_err() {
        error!("Session for {} panicked, tearing down", conn_id);
    }

    // Teardown order is part of the contract: the close callback still sees
    // the connection registered.
    if let Some(on_close) = ctx.on_close {
        let closing = on_close(ctx.registry.clone(), conn_id.clone());
        if AssertUnwindSafe(closing).catch_unwind().await.is_err() {
            error!("Close callback for {} panicked", conn_id);
        }
    }
    ctx.registry.unregister(&conn_id);
    conn.shutdown().await;
    drop(frames);

    info!(
        "Connection closed: {} (Total: {})",
        conn_id,
        ctx.registry.count()
    );
}
