//! # msgforge
//!
//! Build WebSocket servers that route JSON messages by their `type` field.
//!
//! ```no_run
//! use msgforge::prelude::*;
//!
//! async fn echo(msg: Message, conn: Connection) -> Result<()> {
//!     conn.send_message(msg).await
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let router = Router::new()
//!         .handle("echo", handler(echo))
//!         .on_open(|_registry, id| async move {
//!             println!("{} connected", id);
//!         })
//!         .on_close(|_registry, id| async move {
//!             println!("{} disconnected", id);
//!         });
//!
//!     router.listen("127.0.0.1:8080").await
//! }
//! ```
//!
//! ## Wire format
//!
//! | Direction | Shape |
//! |-----------|-------|
//! | inbound | `{"type":"<name>", ...}` |
//! | outbound, no payload | `{"type":"<name>"}` |
//! | outbound, payload | `{"type":"<name>","data":<payload>}` |
//! | unknown type reply | `{"type":"Error","message":"Unknown type"}` |
//!
//! See [`msgforge_core`] for the full API.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub use msgforge_core::*;

/// Prelude module for convenient imports.
///
/// - **Core**: `Router`, `Registry`, `Connection`, `Message`
/// - **Handlers**: `handler()`, `Handler`, `IntoOutcome`
/// - **Extractors**: `Json`, `State`, `ConnectInfo`, `Data`
/// - **Errors**: `Error`, `Result`
pub mod prelude {
    pub use msgforge_core::prelude::*;
}
