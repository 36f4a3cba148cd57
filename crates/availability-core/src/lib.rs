//! Availability Core: shared domain abstractions.
//!
//! This crate defines the fundamental traits and types the resource context,
//! the outbox dispatcher and the stores depend on. It contains no
//! infrastructure code.

pub mod aggregate;
pub mod channel;
pub mod clock;
pub mod command;
pub mod context;
pub mod day_code;
pub mod error;
pub mod event;
pub mod outbox;
pub mod repository;
pub mod retry;
