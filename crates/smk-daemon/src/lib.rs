//! smk-daemon library target.
//!
//! Exposes the router, shared context and the background pieces for
//! integration tests. The binary `main.rs` depends on this library target.

pub mod api_types;
pub mod auth;
pub mod bootstrap;
pub mod connections;
pub mod error;
pub mod heartbeat;
pub mod keys;
pub mod notify;
pub mod presence;
pub mod push;
pub mod realtime;
pub mod routes;
pub mod state;
