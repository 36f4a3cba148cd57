//! Resource availability bounded context.
//!
//! Responsible for resource calendars, the reservation priority rule, the
//! persisted document shape and the command/query/intake handlers that
//! drive them.

pub mod application;
pub mod documents;
pub mod domain;
