//! HTTP layer of the resource availability service.
//!
//! Exposes the HTTP layer so integration tests can build the same router the
//! binary serves.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;
pub mod telemetry;
