//! sysstat Daemon - Sensor registry, poll loop and subscription server
//!
//! This crate provides the core infrastructure for the sysstat daemon:
//! - `registry` - Providers and the sensor tree they populate
//! - `provider` - The contract a data source implements
//! - `daemon` - Actor that owns the registry and drives the poll tick
//! - `session` - Per-client subscriptions and pending deltas
//! - `dispatch` - Turns pending deltas into outbound frames
//! - `server` - Unix socket server for client connections
//! - `providers` - Built-in cpu, memory, disk and network providers
//! - `config` - TOML daemon configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      sysstatd daemon                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  DaemonServer   │────▶│       DaemonActor           │   │
//! │  │ (Unix Socket)   │     │  Registry + ClientSessions  │   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             │  ▲                │
//! │           │ connections       frames    │  │ Tick           │
//! │           ▼                             ▼  │                │
//! │  ┌─────────────────┐     ┌──────────────────┴──────────┐   │
//! │  │ConnectionHandler│◀────│ per-client outbox (mpsc)    │   │
//! │  │  (per client)   │     │ ticker task                 │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
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
pub mod daemon;
pub mod dispatch;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod server;
pub mod session;
