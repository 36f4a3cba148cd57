//! Domain model for the resource context.

pub mod aggregates;
pub mod commands;
pub mod events;
pub mod reservation;
