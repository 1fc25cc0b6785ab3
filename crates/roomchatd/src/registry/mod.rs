//! Session registry owned by a single Dispatcher task.
//!
//! The registry is the authoritative set of live sessions and room
//! membership. Exactly one task, the [`Dispatcher`], owns it; everyone else
//! submits [`RegistryEvent`]s through a [`RegistryHandle`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ Session Handler │────▶│   Dispatcher    │────▶│ Outbox (per     │
//! │  (per client)   │     │ (owns Registry) │     │ session)        │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//!         │                       │                       │
//!         │   RegistryEvent       │   offer()             │ writer task
//!         │   (unbounded mpsc)    │   (never blocks)      ▼
//!         ▼                       ▼                  TCP write half
//!    Register/Unregister     sessions, names,
//!    Broadcast/Join/...      room member sets
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;
mod state;

pub use actor::Dispatcher;
pub use commands::{RegistryError, RegistryEvent};
pub use handle::RegistryHandle;
pub use state::{Entry, Registry, RegistrySnapshot};

use crate::config::NoticeScope;

/// Spawn the dispatcher and return a handle for interaction.
///
/// The event channel is unbounded: bursts of joins and disconnects queue up
/// instead of blocking their senders, and the dispatcher never submits to
/// its own queue, so it cannot deadlock on it.
///
/// # Example
///
/// ```no_run
/// use roomchatd::config::NoticeScope;
/// use roomchatd::registry::spawn_dispatcher;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_dispatcher(NoticeScope::Room);
///     let names = handle.list_names().await;
///     assert!(names.is_empty());
/// }
/// ```
pub fn spawn_dispatcher(notice_scope: NoticeScope) -> RegistryHandle {
    let (tx, rx) = mpsc::unbounded_channel();

    let dispatcher = Dispatcher::new(rx, notice_scope);
    tokio::spawn(dispatcher.run());

    RegistryHandle::new(tx)
}
