//! Outbox publication for the availability service.
//!
//! The [`Dispatcher`] drains committed outbox entries to a
//! [`MessageChannel`](availability_core::channel::MessageChannel) with
//! at-least-once semantics. [`LogChannel`] is the transport used when no
//! broker is configured.

pub mod dispatcher;
pub mod log_channel;

pub use dispatcher::{DispatchReport, Dispatcher, DispatcherConfig};
pub use log_channel::LogChannel;
