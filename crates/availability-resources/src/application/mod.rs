//! Application services for the resource context.

pub mod command_handlers;
pub mod event_handlers;
pub mod query_handlers;
pub mod repository;
