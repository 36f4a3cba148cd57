//! Shared test mocks and utilities for the availability service.

mod channel;
mod clock;
mod repository;

pub use channel::{FailingChannel, FlakyChannel, RecordingChannel, StallingChannel};
pub use clock::{FixedClock, ManualClock};
pub use repository::FailingDocumentRepository;
