//! Aggregate roots for the resource context.

use std::collections::BTreeMap;

use availability_core::aggregate::AggregateRoot;
use availability_core::clock::Clock;
use availability_core::day_code::DayCode;
use availability_core::error::DomainError;
use availability_core::event::EventMetadata;
use uuid::Uuid;

use super::events::{
    ReservationAdded, ReservationRemoved, ResourceAdded, ResourceEvent, ResourceEventKind,
};
use super::reservation::Reservation;

/// The aggregate root for a schedulable resource and its calendar.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Descriptive tags, fixed at creation.
    tags: Vec<String>,
    /// At most one reservation per day, ordered by day.
    reservations: BTreeMap<DayCode, Reservation>,
    /// Current version (successful mutations applied).
    version: i64,
    /// Version the aggregate was loaded with; `None` until first persisted.
    persisted_version: Option<i64>,
    /// Uncommitted events pending persistence.
    uncommitted_events: Vec<ResourceEvent>,
}

impl Resource {
    /// Creates a new resource, producing a `ResourceAdded` event. The new
    /// resource starts at version 0.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `tags` is empty or contains a
    /// blank tag.
    pub fn create(
        id: Uuid,
        tags: Vec<String>,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        validate_tags(&tags)?;

        let mut resource = Self {
            id,
            tags: tags.clone(),
            reservations: BTreeMap::new(),
            version: 0,
            persisted_version: None,
            uncommitted_events: Vec::new(),
        };
        resource.record(
            ResourceEventKind::ResourceAdded(ResourceAdded {
                resource_id: id,
                tags,
            }),
            correlation_id,
            clock,
        );
        Ok(resource)
    }

    /// Rebuilds a persisted resource.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the persisted state breaks an
    /// invariant: two reservations on one day or a negative version.
    pub fn restore(
        id: Uuid,
        tags: Vec<String>,
        reservations: impl IntoIterator<Item = Reservation>,
        version: i64,
    ) -> Result<Self, DomainError> {
        if version < 0 {
            return Err(DomainError::Infrastructure(format!(
                "resource {id} has negative version {version}"
            )));
        }

        let mut calendar = BTreeMap::new();
        for reservation in reservations {
            if calendar.insert(reservation.day, reservation).is_some() {
                return Err(DomainError::Infrastructure(format!(
                    "resource {id} holds two reservations on day {}",
                    reservation.day
                )));
            }
        }

        Ok(Self {
            id,
            tags,
            reservations: calendar,
            version,
            persisted_version: Some(version),
            uncommitted_events: Vec::new(),
        })
    }

    /// Returns the resource tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns reservations ordered by day.
    pub fn reservations(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.values()
    }

    /// Returns the reservation holding `day`, if any.
    #[must_use]
    pub fn reservation_on(&self, day: DayCode) -> Option<&Reservation> {
        self.reservations.get(&day)
    }

    /// Returns `true` if `day` is reserved.
    #[must_use]
    pub fn has_reservation_on(&self, day: DayCode) -> bool {
        self.reservations.contains_key(&day)
    }

    /// Reserves a day, producing a `ReservationAdded` event.
    ///
    /// A free day is taken directly. A day held by a strictly lower priority
    /// reservation is taken over and the previous holder evicted.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ReservationConflict`, leaving the resource
    /// unchanged, if the day is held with equal or higher priority.
    pub fn add_reservation(
        &mut self,
        reservation: Reservation,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let evicted = match self.reservations.get(&reservation.day) {
            Some(existing) if !reservation.outranks(existing) => {
                return Err(DomainError::ReservationConflict {
                    resource_id: self.id,
                    day: reservation.day,
                    existing_priority: existing.priority,
                    requested_priority: reservation.priority,
                });
            }
            Some(existing) => Some(existing.priority),
            None => None,
        };

        self.reservations.insert(reservation.day, reservation);
        self.record(
            ResourceEventKind::ReservationAdded(ReservationAdded {
                resource_id: self.id,
                day: reservation.day,
                priority: reservation.priority,
                evicted_priority: evicted,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Frees a day, producing a `ReservationRemoved` event. Returns `false`
    /// and changes nothing if the day was not reserved.
    pub fn remove_reservation(
        &mut self,
        day: DayCode,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> bool {
        let Some(removed) = self.reservations.remove(&day) else {
            return false;
        };

        self.record(
            ResourceEventKind::ReservationRemoved(ReservationRemoved {
                resource_id: self.id,
                day,
                priority: removed.priority,
            }),
            correlation_id,
            clock,
        );
        true
    }

    /// Records a mutation: bumps the version and queues the event stamped
    /// with the new version. Creation is recorded at version 0.
    fn record(&mut self, kind: ResourceEventKind, correlation_id: Uuid, clock: &dyn Clock) {
        if self.persisted_version.is_some() || !self.uncommitted_events.is_empty() {
            self.version += 1;
        }

        // TODO: event_id uses Uuid::new_v4(), so replaying a command yields a
        // new message_id. Derive it from (resource id, version) once consumers
        // agree on the scheme.
        let event = ResourceEvent {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                event_type: kind.event_type().to_owned(),
                aggregate_id: self.id,
                sequence_number: self.version,
                correlation_id,
                causation_id: correlation_id,
                occurred_at: clock.now(),
            },
            kind,
        };

        self.uncommitted_events.push(event);
    }
}

fn validate_tags(tags: &[String]) -> Result<(), DomainError> {
    if tags.is_empty() {
        return Err(DomainError::Validation(
            "resource must have at least one tag".into(),
        ));
    }
    if tags.iter().any(|tag| tag.trim().is_empty()) {
        return Err(DomainError::Validation("resource tags must not be blank".into()));
    }
    Ok(())
}

impl AggregateRoot for Resource {
    type Event = ResourceEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn persisted_version(&self) -> Option<i64> {
        self.persisted_version
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn mark_committed(&mut self) {
        self.persisted_version = Some(self.version);
        self.uncommitted_events.clear();
    }
}
