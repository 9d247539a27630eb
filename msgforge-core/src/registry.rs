//! The live connection registry.
//!
//! [`Registry`] maps connection identifiers to [`Connection`]s for as long as
//! their session loop runs. It is backed by a sharded [`DashMap`], so inserts,
//! removals, lookups and iteration can run from any number of tasks without
//! caller-side locking.
//!
//! Iteration is weakly consistent: connections registered or removed while a
//! [`range`](Registry::range) is in flight may or may not be visited.
//!
//! # Examples
//!
//! ```no_run
//! use msgforge_core::prelude::*;
//! use std::ops::ControlFlow;
//! use std::sync::Arc;
//!
//! # async fn example(registry: Arc<Registry>) {
//! // Fire-and-forget: unknown ids and write failures are ignored.
//! registry.send("5f1c0a9e3b7d2e4f6a8c0b1d", r#"{"type":"nudge"}"#).await;
//!
//! let mut ids = Vec::new();
//! registry.range(|id, _conn| {
//!     ids.push(id.clone());
//!     ControlFlow::Continue(())
//! });
//! # }
//! ```

use crate::connection::{Connection, ConnectionId};
use dashmap::DashMap;
use futures_util::future::join_all;
use std::ops::ControlFlow;
use tracing::debug;

/// Concurrency-safe store of live connections keyed by identifier.
#[derive(Default)]
pub struct Registry {
    connections: DashMap<ConnectionId, Connection>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Adds a connection under its identifier.
    ///
    /// An existing entry with the same identifier is replaced without
    /// warning. Returns the number of connections after the insert.
    pub fn register(&self, conn: Connection) -> usize {
        let id = conn.id().clone();
        self.connections.insert(id.clone(), conn);
        let count = self.connections.len();
        debug!("Registered connection: {} (Total: {})", id, count);
        count
    }

    /// Removes a connection. Does nothing if the identifier is unknown.
    pub fn unregister(&self, id: &str) -> Option<Connection> {
        let removed = self.connections.remove(id).map(|(_, conn)| conn);
        if removed.is_some() {
            debug!(
                "Unregistered connection: {} (Total: {})",
                id,
                self.connections.len()
            );
        }
        removed
    }

    /// Looks up a connection by identifier.
    pub fn get(&self, id: &str) -> Option<Connection> {
        self.connections.get(id).map(|entry| entry.value().clone())
    }

    /// Returns `true` if the identifier is currently registered.
    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    /// Writes a raw text frame to the identified connection.
    ///
    /// Fire-and-forget: if the identifier is not registered, or the write
    /// fails, the call is silently dropped.
    pub async fn send(&self, id: &str, text: impl Into<String>) {
        let Some(conn) = self.get(id) else {
            debug!("Dropping send to unknown connection {}", id);
            return;
        };

        if let Err(e) = conn.send_raw(text).await {
            debug!("Dropping failed send to {}: {}", id, e);
        }
    }

    /// Visits every registered connection until `visit` breaks.
    ///
    /// `visit` runs while a shard of the map is read-locked: it must not
    /// register or unregister connections, and should collect what it needs
    /// rather than await inside. See [`broadcast`](Self::broadcast) for the
    /// collect-then-send pattern.
    pub fn range<F>(&self, mut visit: F)
    where
        F: FnMut(&ConnectionId, &Connection) -> ControlFlow<()>,
    {
        for entry in self.connections.iter() {
            if visit(entry.key(), entry.value()).is_break() {
                break;
            }
        }
    }

    /// Sends a raw text frame to every registered connection.
    ///
    /// Targets are collected first and written concurrently afterwards;
    /// individual failures are ignored.
    pub async fn broadcast(&self, text: impl Into<String>) {
        self.broadcast_filtered(text.into(), |_| true).await;
    }

    /// Sends a raw text frame to every registered connection except one.
    pub async fn broadcast_except(&self, except_id: &str, text: impl Into<String>) {
        self.broadcast_filtered(text.into(), |id| id != except_id)
            .await;
    }

    async fn broadcast_filtered(&self, text: String, include: impl Fn(&str) -> bool) {
        let mut targets = Vec::new();
        self.range(|id, conn| {
            if include(id) {
                targets.push(conn.clone());
            }
            ControlFlow::Continue(())
        });

        debug!("Broadcasting to {} connections", targets.len());
        let results = join_all(targets.iter().map(|conn| conn.send_raw(text.clone()))).await;
        let failed = results.iter().filter(|result| result.is_err()).count();
        if failed > 0 {
            debug!("Broadcast skipped {} failed connections", failed);
        }
    }

    /// Returns the number of registered connections.
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Returns `true` if no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Returns the identifiers of all registered connections, in no particular order.
    pub fn all_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }
}
