//! Shared application state handed to every handler.
//!
//! Every [`AppState`] is bound to the [`Registry`] of the router that serves
//! it, so handlers can always reach other connections through
//! `State<Registry>`. Anything else the application needs is added with
//! `Router::with_state` and looked up by its exact type.
//!
//! ```no_run
//! use msgforge_core::prelude::*;
//! use std::sync::Arc;
//!
//! struct Config {
//!     motd: String,
//! }
//!
//! async fn hello(conn: Connection, State(config): State<Config>) -> Result<()> {
//!     conn.send_data("motd", &config.motd).await
//! }
//!
//! let router = Router::new()
//!     .with_state(Arc::new(Config { motd: "hi".to_string() }))
//!     .handle("hello", handler(hello));
//! ```

use crate::registry::Registry;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::sync::Arc;

type SharedValue = Arc<dyn Any + Send + Sync>;

/// The registry plus application values keyed by type.
///
/// Cloning is cheap and clones share the same storage.
#[derive(Clone)]
pub struct AppState {
    registry: Arc<Registry>,
    values: Arc<DashMap<TypeId, SharedValue>>,
}

impl AppState {
    /// Creates state bound to a fresh, empty registry.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Creates state bound to an existing registry.
    pub fn with_registry(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            values: Arc::new(DashMap::new()),
        }
    }

    /// The registry of live connections.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Stores an application value, replacing any previous value of the same
    /// type. A `Registry` stored here is shadowed by the bound one.
    pub fn insert<T: Send + Sync + 'static>(&self, value: Arc<T>) {
        self.values.insert(TypeId::of::<T>(), value);
    }

    /// Looks up a value by type. `T = Registry` yields the bound registry.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let registry: SharedValue = self.registry.clone();
        if let Ok(registry) = registry.downcast::<T>() {
            return Some(registry);
        }

        self.values
            .get(&TypeId::of::<T>())
            .and_then(|value| value.value().clone().downcast::<T>().ok())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::recording_connection;

    #[test]
    fn test_registry_is_always_present() {
        let registry = Arc::new(Registry::new());
        let state = AppState::with_registry(registry.clone());

        let found = state.get::<Registry>().unwrap();
        assert!(Arc::ptr_eq(&found, &registry));
        assert!(Arc::ptr_eq(state.registry(), &registry));
    }

    #[test]
    fn test_stored_registry_does_not_replace_bound_one() {
        let bound = Arc::new(Registry::new());
        let state = AppState::with_registry(bound.clone());
        state.insert(Arc::new(Registry::new()));

        assert!(Arc::ptr_eq(&state.get::<Registry>().unwrap(), &bound));
    }

    #[test]
    fn test_values_by_type() {
        struct Motd(&'static str);

        let state = AppState::new();
        assert!(state.get::<Motd>().is_none());

        state.insert(Arc::new(Motd("first")));
        state.insert(Arc::new(Motd("second")));
        state.insert(Arc::new(3_u16));

        assert_eq!(state.get::<Motd>().unwrap().0, "second");
        assert_eq!(*state.get::<u16>().unwrap(), 3);
        assert!(state.get::<u32>().is_none());
    }

    #[test]
    fn test_clones_see_registered_connections() {
        let state = AppState::new();
        let handed_to_handler = state.clone();

        let (conn, _rx) = recording_connection("c1");
        state.registry().register(conn);

        let registry = handed_to_handler.get::<Registry>().unwrap();
        assert!(registry.contains("c1"));
    }
}
