//! Message handlers and the table that routes to them by message type.
//!
//! # Overview
//!
//! - [`Handler`]: the object-safe trait every registered handler implements.
//! - [`handler`]: turns an async function taking up to eight
//!   [extractors](crate::extractor) into an `Arc<dyn Handler>`.
//! - [`IntoOutcome`]: what a handler may return, `()` or [`Result<()>`].
//! - [`HandlerTable`]: maps the envelope's `type` to a handler and runs the
//!   dispatch step of the session loop.
//!
//! Handlers produce side effects only. Anything they want the peer to see is
//! sent explicitly through a [`Connection`] or the
//! [`Registry`](crate::registry::Registry); the dispatcher never sends a reply
//! on their behalf.
//!
//! # Examples
//!
//! ```no_run
//! use msgforge_core::prelude::*;
//!
//! // Echo the raw message back to the sender.
//! async fn echo(msg: Message, State(registry): State<Registry>, conn: Connection) {
//!     if let Some(text) = msg.as_text() {
//!         registry.send(conn.id(), text).await;
//!     }
//! }
//!
//! // Fallible handlers return Result<()>; errors are logged.
//! async fn rename(Json(body): Json<serde_json::Value>, conn: Connection) -> Result<()> {
//!     let name = body["name"].as_str().ok_or_else(|| Error::handler("missing name"))?;
//!     conn.set_context(name.to_string());
//!     conn.send("renamed").await
//! }
//!
//! let router = Router::new()
//!     .handle("echo", handler(echo))
//!     .handle("rename", handler(rename));
//! ```

use crate::connection::Connection;
use crate::error::Result;
use crate::extractor::FromMessage;
use crate::message::{Message, UNKNOWN_TYPE_REPLY};
use crate::state::AppState;
use async_trait::async_trait;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// Values a handler may return.
pub trait IntoOutcome: Send {
    /// Converts into the handler's outcome. An `Err` is logged by the
    /// dispatcher and has no other effect.
    fn into_outcome(self) -> Result<()>;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Result<()> {
        Ok(())
    }
}

impl IntoOutcome for Result<()> {
    fn into_outcome(self) -> Result<()> {
        self
    }
}

/// A handler for one message type.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Runs the handler for one inbound message.
    async fn call(&self, message: Message, conn: Connection, state: AppState) -> Result<()>;
}

/// Adapts an async function to [`Handler`]. Built by [`handler`].
pub struct HandlerService<F, T> {
    handler: F,
    _marker: PhantomData<fn() -> T>,
}

impl<F, T> HandlerService<F, T> {
    /// Wraps a handler function.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

macro_rules! impl_handler {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case, unused_variables)]
        #[async_trait]
        impl<F, Fut, Res, $($ty,)*> Handler for HandlerService<F, ($($ty,)*)>
        where
            F: Fn($($ty,)*) -> Fut + Send + Sync + 'static,
            Fut: std::future::Future<Output = Res> + Send + 'static,
            Res: IntoOutcome,
            $( $ty: FromMessage + Send + 'static, )*
        {
            async fn call(
                &self,
                message: Message,
                conn: Connection,
                state: AppState,
            ) -> Result<()> {
                $(
                    let $ty = $ty::from_message(&message, &conn, &state).await?;
                )*

                (self.handler)($($ty,)*).await.into_outcome()
            }
        }

        impl<F, Fut, Res, $($ty,)*> IntoHandler<($($ty,)*)> for F
        where
            F: Fn($($ty,)*) -> Fut + Send + Sync + 'static,
            Fut: std::future::Future<Output = Res> + Send + 'static,
            Res: IntoOutcome,
            $( $ty: FromMessage + Send + 'static, )*
        {
            type Handler = HandlerService<F, ($($ty,)*)>;

            fn into_handler(self) -> Self::Handler {
                HandlerService::new(self)
            }
        }
    };
}

/// Conversion from a function into a [`Handler`].
///
/// `T` is the tuple of extractor types, which keeps the impls for different
/// arities apart.
pub trait IntoHandler<T> {
    /// The handler type produced.
    type Handler: Handler;

    /// Performs the conversion.
    fn into_handler(self) -> Self::Handler;
}

impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);

/// Wraps an async function as a shareable handler.
pub fn handler<F, T>(f: F) -> Arc<dyn Handler>
where
    F: IntoHandler<T>,
{
    Arc::new(f.into_handler())
}

/// Mapping from message type to handler.
///
/// The router fills the table while it is being built and freezes it behind
/// an `Arc` when it starts serving, so lookups during dispatch never race
/// with registration.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the handler for `kind`, returning the one it replaced.
    ///
    /// An empty `kind` is accepted but can never match: messages without a
    /// type, or with an empty one, always count as unrecognized.
    pub fn insert(
        &mut self,
        kind: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Option<Arc<dyn Handler>> {
        let kind = kind.into();
        if kind.is_empty() {
            warn!("Handler registered for the empty message type will never be called");
        }
        self.handlers.insert(kind, handler)
    }

    /// Looks up the handler for `kind`.
    pub fn get(&self, kind: &str) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(kind)
    }

    /// Returns `true` if a handler is installed for `kind`.
    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Number of installed handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handler is installed.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Routes one inbound message.
    ///
    /// With a handler for the message's type, awaits it with the full message
    /// and logs an error outcome. Without one, writes
    /// `{"type":"Error","message":"Unknown type"}` back to `conn`; the only
    /// error returned is a failure of that write.
    pub async fn dispatch(&self, conn: &Connection, state: &AppState, message: Message) -> Result<()> {
        let handler = message
            .kind()
            .and_then(|kind| self.handlers.get(kind.as_ref()).cloned());

        let Some(handler) = handler else {
            debug!("Unknown message type from {}", conn.id());
            return conn.send_raw(UNKNOWN_TYPE_REPLY).await;
        };

        if let Err(e) = handler.call(message, conn.clone(), state.clone()).await {
            warn!("Handler error for {}: {}", conn.id(), e);
        }
        Ok(())
    }
}
