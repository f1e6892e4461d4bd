//! Patrol integration test harness.
//!
//! Every test spawns its own API server on an ephemeral localhost port and
//! drives it over HTTP. No external services are needed:
//!
//!   cargo test --test integration

mod infra;
mod messaging;
mod orders;

pub use infra::*;
