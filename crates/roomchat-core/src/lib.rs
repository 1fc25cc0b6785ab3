//! roomchat Core - Shared types for the roomchat service
//!
//! This crate provides the domain types shared between the daemon
//! (roomchatd), the protocol crate and the line client.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod credentials;
pub mod error;
pub mod outbox;
pub mod session;

// Re-exports for convenience
pub use credentials::{AuthOutcome, CredentialStore, MemoryCredentialStore};
pub use error::{DomainError, DomainResult};
pub use outbox::{Delivery, Outbox, OutboxReceiver};
pub use session::{ConnectionId, RoomName, Session, SessionView};
