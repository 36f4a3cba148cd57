//! Command handlers for the resource context.
//!
//! Each handler loads the aggregate, executes the command, and saves the new
//! state together with one outbox entry per produced event. A concurrency
//! conflict on save triggers reload-and-retry within the retry budget.

use availability_core::aggregate::AggregateRoot;
use availability_core::clock::Clock;
use availability_core::command::Command;
use availability_core::context::MessageContext;
use availability_core::day_code::to_day_code;
use availability_core::error::DomainError;
use availability_core::outbox::OutboxEntry;
use availability_core::repository::DocumentRepository;
use availability_core::retry::RetryPolicy;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::repository::ResourceRepository;
use crate::domain::aggregates::Resource;
use crate::domain::commands::{AddReservation, AddResource, RemoveReservation};
use crate::domain::reservation::Reservation;

fn to_outbox_entries(resource: &Resource, context: &MessageContext) -> Vec<OutboxEntry> {
    resource
        .uncommitted_events()
        .iter()
        .map(|event| OutboxEntry::from_event(event, context))
        .collect()
}

/// Loads the resource, applies `mutate`, and saves state plus outbox entries
/// in one unit of work. Returns the committed entries; a mutation that
/// produced no event commits nothing and returns an empty list.
async fn mutate_resource<F>(
    resource_id: Uuid,
    context: &MessageContext,
    repo: ResourceRepository<'_>,
    retry: &RetryPolicy,
    mut mutate: F,
) -> Result<Vec<OutboxEntry>, DomainError>
where
    F: FnMut(&mut Resource) -> Result<(), DomainError>,
{
    let mut retries = 0;
    loop {
        let mut resource = repo.load(resource_id).await?;
        mutate(&mut resource)?;

        let entries = to_outbox_entries(&resource, context);
        if entries.is_empty() {
            return Ok(entries);
        }

        match repo.save(&mut resource, &entries).await {
            Ok(()) => return Ok(entries),
            Err(err) if err.is_concurrency_conflict() && retry.allows_retry(retries) => {
                let delay = retry.delay_for_attempt(retries);
                retries += 1;
                warn!(
                    %resource_id,
                    retries,
                    ?delay,
                    "concurrent update detected, reloading resource"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Handles the `AddResource` command: creates the resource and persists it
/// together with its `ResourceAdded` outbox entry.
///
/// # Errors
///
/// Returns `DomainError::Validation` for missing or blank tags,
/// `DomainError::AlreadyExists` if the id is taken (including when a
/// concurrent creator commits first), or `DomainError::Infrastructure` if
/// persistence fails.
pub async fn handle_add_resource(
    command: &AddResource,
    clock: &dyn Clock,
    documents: &dyn DocumentRepository,
) -> Result<Vec<OutboxEntry>, DomainError> {
    let repo = ResourceRepository::new(documents);
    if repo.exists(command.resource_id).await? {
        return Err(DomainError::AlreadyExists(command.resource_id));
    }

    let mut resource = Resource::create(
        command.resource_id,
        command.tags.clone(),
        command.correlation_id,
        clock,
    )?;
    let entries = to_outbox_entries(&resource, &command.message_context());

    match repo.save(&mut resource, &entries).await {
        Ok(()) => {}
        Err(err) if err.is_concurrency_conflict() => {
            return Err(DomainError::AlreadyExists(command.resource_id));
        }
        Err(err) => return Err(err),
    }

    info!(
        resource_id = %command.resource_id,
        correlation_id = %command.correlation_id,
        "resource added"
    );
    Ok(entries)
}

/// Handles the `AddReservation` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown resource,
/// `DomainError::ReservationConflict` if the day is held with equal or higher
/// priority, `DomainError::ConcurrencyConflict` once the retry budget is
/// exhausted, or `DomainError::Infrastructure` if persistence fails.
pub async fn handle_add_reservation(
    command: &AddReservation,
    clock: &dyn Clock,
    documents: &dyn DocumentRepository,
    retry: &RetryPolicy,
) -> Result<Vec<OutboxEntry>, DomainError> {
    let reservation = Reservation::on(command.at, command.priority);

    let entries = mutate_resource(
        command.resource_id,
        &command.message_context(),
        ResourceRepository::new(documents),
        retry,
        |resource| resource.add_reservation(reservation, command.correlation_id, clock),
    )
    .await?;

    info!(
        resource_id = %command.resource_id,
        day = %reservation.day,
        priority = reservation.priority,
        correlation_id = %command.correlation_id,
        "reservation added"
    );
    Ok(entries)
}

/// Handles the `RemoveReservation` command. Removing a reservation that does
/// not exist succeeds without writing anything.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown resource,
/// `DomainError::ConcurrencyConflict` once the retry budget is exhausted, or
/// `DomainError::Infrastructure` if persistence fails.
pub async fn handle_remove_reservation(
    command: &RemoveReservation,
    clock: &dyn Clock,
    documents: &dyn DocumentRepository,
    retry: &RetryPolicy,
) -> Result<Vec<OutboxEntry>, DomainError> {
    let day = to_day_code(command.at);

    let entries = mutate_resource(
        command.resource_id,
        &command.message_context(),
        ResourceRepository::new(documents),
        retry,
        |resource| {
            resource.remove_reservation(day, command.correlation_id, clock);
            Ok(())
        },
    )
    .await?;

    if entries.is_empty() {
        info!(resource_id = %command.resource_id, %day, "no reservation to remove");
    } else {
        info!(
            resource_id = %command.resource_id,
            %day,
            correlation_id = %command.correlation_id,
            "reservation removed"
        );
    }
    Ok(entries)
}
