//! `aionfs` HTTP server.
//!
//! Wires the core lifecycle orchestrator, a state backend and an optional
//! bearer-token resolver into an Axum router serving `/v1/*` and `/healthz`.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
