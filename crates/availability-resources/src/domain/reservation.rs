//! Reservation value object.

use availability_core::day_code::{DayCode, to_day_code};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A claim on one day of a resource's calendar.
///
/// Has no identity of its own; it lives inside the owning `Resource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// The reserved day.
    pub day: DayCode,
    /// Higher priority wins conflicts.
    pub priority: i32,
}

impl Reservation {
    /// Creates a reservation for an already-encoded day.
    #[must_use]
    pub fn new(day: DayCode, priority: i32) -> Self {
        Self { day, priority }
    }

    /// Creates a reservation for the calendar day containing `at`.
    #[must_use]
    pub fn on(at: DateTime<Utc>, priority: i32) -> Self {
        Self::new(to_day_code(at), priority)
    }

    /// Returns `true` if this reservation may evict `other`.
    #[must_use]
    pub fn outranks(&self, other: &Reservation) -> bool {
        self.priority > other.priority
    }
}
