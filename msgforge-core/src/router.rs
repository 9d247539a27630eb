//! Router configuration and the upgrade endpoint.
//!
//! The [`Router`] collects everything a server needs before it starts:
//! message handlers keyed by type, open/close callbacks, shared state and
//! transport limits. Builder methods consume the router, and serving
//! borrows it immutably, so the handler table cannot change while
//! connections are being served.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  TCP Listener   │  (serve / listen, or any host calling handle_connection)
//! └────────┬────────┘
//!          │ one task per stream
//!          v
//!   WebSocket upgrade ──> Registry.register
//!          │
//!          ├──> on_open
//!          ├──> read ──> HandlerTable.dispatch(type) ──> handler
//!          ├──> on_close
//!          └──> Registry.unregister ──> transport closed
//! ```
//!
//! # Examples
//!
//! ```no_run
//! use msgforge_core::prelude::*;
//!
//! async fn echo(msg: Message, conn: Connection) -> Result<()> {
//!     conn.send_message(msg).await
//! }
//!
//! # async fn example() -> Result<()> {
//! let router = Router::new()
//!     .handle("echo", handler(echo))
//!     .on_open(|registry, id| async move {
//!         registry.send(&id, r#"{"type":"welcome"}"#).await;
//!     })
//!     .on_close(|registry, id| async move {
//!         registry.broadcast_except(&id, r#"{"type":"left"}"#).await;
//!     });
//!
//! router.listen("127.0.0.1:8080").await?;
//! # Ok(())
//! # }
//! ```

use crate::connection::ConnectionId;
use crate::error::{Error, Result};
use crate::handler::{Handler, HandlerTable};
use crate::registry::Registry;
use crate::session::{self, LifecycleHook, SessionContext};
use crate::state::AppState;
use futures_util::FutureExt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tungstenite::protocol::WebSocketConfig;

/// The server configuration and upgrade endpoint.
pub struct Router {
    handlers: HandlerTable,
    state: AppState,
    on_open: Option<LifecycleHook>,
    on_close: Option<LifecycleHook>,
    websocket_config: Option<WebSocketConfig>,
}

impl Router {
    /// Creates a router with no handlers and no callbacks.
    ///
    /// Its [`Registry`] is bound to the shared state, so handlers can
    /// extract it with `State<Registry>`.
    pub fn new() -> Self {
        Self {
            handlers: HandlerTable::new(),
            state: AppState::new(),
            on_open: None,
            on_close: None,
            websocket_config: None,
        }
    }

    /// Registers the handler for messages whose `type` is `kind`.
    ///
    /// Registering the same type again replaces the previous handler.
    pub fn handle(mut self, kind: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    /// Adds shared state, extractable in handlers as `State<T>`.
    pub fn with_state<T: Send + Sync + 'static>(self, data: Arc<T>) -> Self {
        self.state.insert(data);
        self
    }

    /// Sets the callback run once when a connection opens.
    ///
    /// It runs after the connection is registered and before its first
    /// message is read. Setting it again replaces the previous callback.
    pub fn on_open<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<Registry>, ConnectionId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: LifecycleHook = Arc::new(move |registry, id| f(registry, id).boxed());
        self.on_open = Some(hook);
        self
    }

    /// Sets the callback run once when a connection ends.
    ///
    /// The connection is still registered while it runs, so it can be
    /// addressed by id from inside the callback. It is removed right after
    /// the callback returns.
    pub fn on_close<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<Registry>, ConnectionId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: LifecycleHook = Arc::new(move |registry, id| f(registry, id).boxed());
        self.on_close = Some(hook);
        self
    }

    /// Sets transport limits (message and frame sizes, write buffers) used
    /// for every upgraded connection.
    pub fn websocket_config(mut self, config: WebSocketConfig) -> Self {
        self.websocket_config = Some(config);
        self
    }

    /// Returns the live connection registry.
    pub fn registry(&self) -> Arc<Registry> {
        self.state.registry().clone()
    }

    /// Returns the handler table.
    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    /// Upgrades one stream and serves it until the connection ends.
    ///
    /// This is the entry point for hosts that accept connections
    /// themselves. An upgrade failure is logged and returned; nothing is
    /// registered and no callback runs. Once upgraded, the call completes
    /// only after the session's teardown, and always with `Ok`.
    pub async fn handle_connection<S>(&self, stream: S, peer_addr: SocketAddr) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (ws_stream, info) = match session::upgrade(stream, peer_addr, self.websocket_config)
            .await
        {
            Ok(upgraded) => upgraded,
            Err(e) => {
                warn!("Upgrade from {} failed: {}", peer_addr, e);
                return Err(e);
            }
        };

        let ctx = SessionContext {
            registry: self.state.registry(),
            handlers: &self.handlers,
            state: &self.state,
            on_open: self.on_open.as_ref(),
            on_close: self.on_close.as_ref(),
        };
        session::run(ws_stream, info, ctx).await;
        Ok(())
    }

    /// Serves connections accepted from `listener`, one task per connection.
    ///
    /// Runs until accepting fails. Dropping the returned future stops
    /// accepting; sessions already running continue until their peers
    /// disconnect.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("WebSocket server listening on {}", addr);
        }

        let router = Arc::new(self);

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let router = router.clone();

            tokio::spawn(async move {
                if let Err(e) = router.handle_connection(stream, peer_addr).await {
                    debug!("Connection from {} ended before upgrade: {}", peer_addr, e);
                }
            });
        }
    }

    /// Binds `addr` and [`serve`](Self::serve)s it.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed or bound, or if
    /// accepting fails.
    pub async fn listen(self, addr: impl AsRef<str>) -> Result<()> {
        let addr: SocketAddr = addr
            .as_ref()
            .parse()
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr.as_ref(), e)))?;

        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
