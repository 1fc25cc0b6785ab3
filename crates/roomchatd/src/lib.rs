//! roomchat daemon - session registry and room broadcast server
//!
//! This crate provides the server side of roomchat:
//! - `config` - TOML configuration with environment overrides
//! - `registry` - Dispatcher task owning live sessions and room membership
//! - `server` - TCP listener, per-connection session handlers and writers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      roomchatd daemon                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │   ChatServer    │────▶│        Dispatcher           │    │
//! │  │  (TcpListener)  │     │   (registry state owner)    │    │
//! │  └────────┬────────┘     └──────────────┬──────────────┘    │
//! │           │                             │                   │
//! │           │ connections                 │ offer()           │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │ SessionHandler  │────▶│   Outbox ─▶ writer task     │    │
//! │  │  (per client)   │     │   (per client)              │    │
//! │  └─────────────────┘     └─────────────────────────────┘    │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod registry;
pub mod server;
