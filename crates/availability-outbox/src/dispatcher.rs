//! Publication dispatcher.
//!
//! Claims pending outbox entries under a lease, sends each to the message
//! channel with a timeout, and records the outcome. An acknowledged entry is
//! marked dispatched; a failed one is released with a backoff gate and tried
//! again on a later sweep. A crash between send and mark leaves the entry
//! pending, so it is re-sent once its lease expires: delivery is
//! at-least-once and consumers deduplicate on `message_id`.

use std::sync::Arc;
use std::time::Duration;

use availability_core::channel::{DEFAULT_SPAN_CONTEXT_HEADER, MessageChannel, OutboundMessage};
use availability_core::clock::Clock;
use availability_core::context::{AmbientContext, MessageContext};
use availability_core::error::{DeliveryError, DomainError};
use availability_core::outbox::{OutboxEntry, OutboxStore};
use availability_core::retry::RetryPolicy;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Identity stamped on claimed entries.
    pub worker_id: String,
    /// Maximum entries claimed per sweep.
    pub batch_size: usize,
    /// Upper bound on a single channel send.
    pub send_timeout: Duration,
    /// How long a claim hides an entry from other sweeps.
    pub lease: Duration,
    /// How long dispatched entries are kept before purging.
    pub retention: Duration,
    /// Interval between background sweeps.
    pub poll_interval: Duration,
    /// Interval between retention purges.
    pub purge_interval: Duration,
    /// Metadata slot the span context is published under.
    pub span_context_header: String,
    /// Delay before a failed entry may be claimed again, by attempt.
    pub backoff: RetryPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("dispatcher-{}", Uuid::new_v4()),
            batch_size: 100,
            send_timeout: Duration::from_secs(5),
            lease: Duration::from_secs(30),
            retention: Duration::from_secs(7 * 24 * 60 * 60),
            poll_interval: Duration::from_secs(1),
            purge_interval: Duration::from_secs(60 * 60),
            span_context_header: DEFAULT_SPAN_CONTEXT_HEADER.to_owned(),
            backoff: RetryPolicy {
                max_retries: u32::MAX,
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(5 * 60),
                multiplier: 2.0,
            },
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Entries claimed.
    pub claimed: usize,
    /// Entries acknowledged and marked dispatched.
    pub dispatched: usize,
    /// Entries whose send failed or whose acknowledgment could not be recorded.
    pub failed: usize,
    /// Entries left unsent because their lease ran out before their turn.
    pub expired: usize,
}

/// Drains the outbox to a message channel.
pub struct Dispatcher {
    store: Arc<dyn OutboxStore>,
    channel: Arc<dyn MessageChannel>,
    clock: Arc<dyn Clock>,
    config: DispatcherConfig,
}

/// `now + duration`, saturating instead of overflowing.
fn after(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    let delta = TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX);
    now.checked_add_signed(delta)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `now - duration`, saturating instead of underflowing.
fn before(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    let delta = TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX);
    now.checked_sub_signed(delta)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl Dispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(
        store: Arc<dyn OutboxStore>,
        channel: Arc<dyn MessageChannel>,
        clock: Arc<dyn Clock>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            channel,
            clock,
            config,
        }
    }

    /// Claims one batch of pending entries and delivers each of them.
    ///
    /// Entries without a correlation ID or span context of their own take
    /// them from `ambient`. A failing entry never affects its siblings.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the batch cannot be claimed.
    /// Failures recording individual outcomes are logged, not returned.
    pub async fn dispatch_pending(
        &self,
        ambient: &MessageContext,
    ) -> Result<DispatchReport, DomainError> {
        let now = self.clock.now();
        let batch = self
            .store
            .claim_pending(
                &self.config.worker_id,
                now,
                after(now, self.config.lease),
                self.config.batch_size,
            )
            .await?;

        let mut report = DispatchReport {
            claimed: batch.len(),
            ..DispatchReport::default()
        };
        for entry in &batch {
            // Past its lease the entry may already belong to another worker.
            if entry
                .claimed_until
                .is_none_or(|until| until <= self.clock.now())
            {
                debug!(
                    message_id = %entry.message_id,
                    "lease expired before send; leaving entry for the next claim"
                );
                report.expired += 1;
                continue;
            }
            if self.dispatch_one(entry, ambient).await {
                report.dispatched += 1;
            } else {
                report.failed += 1;
            }
        }

        if report.claimed > 0 {
            debug!(
                worker_id = %self.config.worker_id,
                claimed = report.claimed,
                dispatched = report.dispatched,
                failed = report.failed,
                expired = report.expired,
                "outbox batch processed"
            );
        }
        Ok(report)
    }

    async fn dispatch_one(&self, entry: &OutboxEntry, ambient: &MessageContext) -> bool {
        let message =
            OutboundMessage::from_entry(entry, ambient, &self.config.span_context_header);

        match self.send(&message).await {
            Ok(()) => match self
                .store
                .mark_dispatched(entry.message_id, self.clock.now())
                .await
            {
                Ok(_) => true,
                Err(err) => {
                    // The entry stays pending under its lease and is re-sent
                    // after the lease expires.
                    error!(
                        message_id = %entry.message_id,
                        error = %err,
                        "message sent but could not be marked dispatched"
                    );
                    false
                }
            },
            Err(err) => {
                let delay = self
                    .config
                    .backoff
                    .delay_for_attempt(entry.attempts.saturating_sub(1));
                let retry_at = after(self.clock.now(), delay);
                warn!(
                    message_id = %entry.message_id,
                    event_type = %entry.event_type,
                    attempts = entry.attempts,
                    error = %err,
                    %retry_at,
                    "message delivery failed"
                );
                if let Err(release_err) = self
                    .store
                    .release(entry.message_id, &err.to_string(), retry_at)
                    .await
                {
                    error!(
                        message_id = %entry.message_id,
                        error = %release_err,
                        "could not release outbox entry; it is retried after its lease expires"
                    );
                }
                false
            }
        }
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let timeout = self.config.send_timeout;
        tokio::time::timeout(timeout, self.channel.send(message))
            .await
            .unwrap_or(Err(DeliveryError::Timeout(timeout)))
    }

    /// Deletes dispatched entries older than the retention window.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the store fails.
    pub async fn purge_expired(&self) -> Result<u64, DomainError> {
        let cutoff = before(self.clock.now(), self.config.retention);
        let purged = self.store.purge_dispatched(cutoff).await?;
        if purged > 0 {
            info!(purged, %cutoff, "purged dispatched outbox entries");
        }
        Ok(purged)
    }

    /// Sweeps until the outbox yields less than a full batch, or a batch
    /// left any entry undelivered.
    async fn sweep(&self, ambient: &dyn AmbientContext) {
        loop {
            match self.dispatch_pending(&ambient.current()).await {
                Ok(report)
                    if report.claimed == self.config.batch_size
                        && report.dispatched == report.claimed => {}
                Ok(_) => break,
                Err(err) => {
                    error!(error = %err, "outbox sweep failed; retrying next tick");
                    break;
                }
            }
        }
    }

    /// Runs the dispatcher in the background.
    ///
    /// Sweeps every `poll_interval` and whenever `trigger` is notified,
    /// purges every `purge_interval`, and exits once `shutdown` turns `true`
    /// or its sender is dropped.
    #[must_use]
    pub fn spawn(
        self: Arc<Self>,
        trigger: Arc<Notify>,
        mut shutdown: watch::Receiver<bool>,
        ambient: Arc<dyn AmbientContext>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut poll = tokio::time::interval(self.config.poll_interval.max(Duration::from_millis(1)));
            poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut purge =
                tokio::time::interval(self.config.purge_interval.max(Duration::from_millis(1)));
            purge.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(worker_id = %self.config.worker_id, "outbox dispatcher started");
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = poll.tick() => {
                        self.sweep(ambient.as_ref())
                            .instrument(info_span!("outbox_sweep", trigger = "poll"))
                            .await;
                    }
                    () = trigger.notified() => {
                        self.sweep(ambient.as_ref())
                            .instrument(info_span!("outbox_sweep", trigger = "notify"))
                            .await;
                    }
                    _ = purge.tick() => {
                        if let Err(err) = self.purge_expired().await {
                            error!(error = %err, "outbox purge failed; retrying next interval");
                        }
                    }
                }
            }
            info!(worker_id = %self.config.worker_id, "outbox dispatcher stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use availability_core::context::NoAmbientContext;
    use availability_core::outbox::OutboxState;
    use availability_core::repository::{DocumentRepository, StoredDocument};
    use availability_store::InMemoryStore;
    use availability_test_support::{
        FailingChannel, FlakyChannel, ManualClock, RecordingChannel, StallingChannel,
    };
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    fn config() -> DispatcherConfig {
        DispatcherConfig {
            worker_id: "test-worker".to_owned(),
            batch_size: 10,
            send_timeout: Duration::from_secs(1),
            lease: Duration::from_secs(30),
            retention: Duration::from_secs(60 * 60),
            poll_interval: Duration::from_secs(60 * 60),
            purge_interval: Duration::from_secs(60 * 60),
            span_context_header: DEFAULT_SPAN_CONTEXT_HEADER.to_owned(),
            backoff: RetryPolicy {
                max_retries: u32::MAX,
                initial_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(60),
                multiplier: 2.0,
            },
        }
    }

    fn entry(created_at: DateTime<Utc>, correlation_id: Option<Uuid>) -> OutboxEntry {
        OutboxEntry {
            message_id: Uuid::new_v4(),
            aggregate_id: Uuid::new_v4(),
            event_type: "resources.reservation_added".to_owned(),
            payload: serde_json::json!({ "priority": 1 }),
            correlation_id,
            span_context: correlation_id.map(|_| "entry:span:0:1".to_owned()),
            state: OutboxState::Pending,
            attempts: 0,
            last_error: None,
            claimed_by: None,
            claimed_until: None,
            created_at,
            dispatched_at: None,
        }
    }

    /// Commits `count` pending entries, oldest first.
    async fn seed(store: &InMemoryStore, count: usize) -> Vec<OutboxEntry> {
        let entries: Vec<_> = (0..count)
            .map(|i| {
                entry(
                    start() + TimeDelta::seconds(i64::try_from(i).unwrap()),
                    Some(Uuid::new_v4()),
                )
            })
            .collect();
        let id = Uuid::new_v4();
        store
            .save(
                StoredDocument {
                    id,
                    version: 0,
                    body: serde_json::json!({ "id": id }),
                },
                None,
                &entries,
            )
            .await
            .unwrap();
        entries
    }

    fn dispatcher(
        store: &InMemoryStore,
        channel: Arc<dyn MessageChannel>,
        clock: Arc<ManualClock>,
    ) -> Dispatcher {
        Dispatcher::new(Arc::new(store.clone()), channel, clock, config())
    }

    /// Outbox store whose first `failures` acknowledgments are lost.
    struct LosingAcks {
        inner: InMemoryStore,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl OutboxStore for LosingAcks {
        async fn claim_pending(
            &self,
            worker_id: &str,
            now: DateTime<Utc>,
            lease_until: DateTime<Utc>,
            limit: usize,
        ) -> Result<Vec<OutboxEntry>, DomainError> {
            self.inner
                .claim_pending(worker_id, now, lease_until, limit)
                .await
        }

        async fn mark_dispatched(
            &self,
            message_id: Uuid,
            now: DateTime<Utc>,
        ) -> Result<bool, DomainError> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(DomainError::Infrastructure("connection reset".into()));
            }
            self.inner.mark_dispatched(message_id, now).await
        }

        async fn release(
            &self,
            message_id: Uuid,
            error: &str,
            retry_at: DateTime<Utc>,
        ) -> Result<(), DomainError> {
            self.inner.release(message_id, error, retry_at).await
        }

        async fn purge_dispatched(&self, older_than: DateTime<Utc>) -> Result<u64, DomainError> {
            self.inner.purge_dispatched(older_than).await
        }

        async fn get(&self, message_id: Uuid) -> Result<Option<OutboxEntry>, DomainError> {
            self.inner.get(message_id).await
        }
    }

    struct FixedAmbient(MessageContext);

    impl AmbientContext for FixedAmbient {
        fn current(&self) -> MessageContext {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn test_dispatch_pending_delivers_and_marks_every_entry() {
        // Arrange
        let store = InMemoryStore::new();
        let entries = seed(&store, 3).await;
        let channel = Arc::new(RecordingChannel::new());
        let clock = Arc::new(ManualClock::new(start()));
        let dispatcher = dispatcher(&store, channel.clone(), clock);

        // Act
        let report = dispatcher
            .dispatch_pending(&MessageContext::default())
            .await
            .unwrap();

        // Assert
        assert_eq!(
            report,
            DispatchReport {
                claimed: 3,
                dispatched: 3,
                failed: 0,
                expired: 0,
            }
        );
        let sent = channel.sent();
        assert_eq!(
            sent.iter().map(|m| m.message_id).collect::<Vec<_>>(),
            entries.iter().map(|e| e.message_id).collect::<Vec<_>>()
        );
        assert_eq!(sent[0].correlation_id, entries[0].correlation_id);
        assert_eq!(sent[0].span_context, "entry:span:0:1");
        assert_eq!(store.pending_count(), 0);
        let stored = store.outbox_entry(entries[0].message_id).unwrap();
        assert_eq!(stored.state, OutboxState::Dispatched);
        assert_eq!(stored.dispatched_at, Some(start()));
    }

    #[tokio::test]
    async fn test_failed_send_does_not_affect_siblings() {
        // Arrange
        let store = InMemoryStore::new();
        let entries = seed(&store, 3).await;
        let rejected = entries[1].message_id;
        let channel = Arc::new(FlakyChannel::rejecting([rejected]));
        let clock = Arc::new(ManualClock::new(start()));
        let dispatcher = dispatcher(&store, channel.clone(), clock);

        // Act
        let report = dispatcher
            .dispatch_pending(&MessageContext::default())
            .await
            .unwrap();

        // Assert
        assert_eq!(report.dispatched, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(channel.delivered().len(), 2);
        let failed = store.outbox_entry(rejected).unwrap();
        assert!(failed.is_pending());
        assert_eq!(failed.attempts, 1);
        assert!(failed.last_error.unwrap().contains("rejected"));
        assert_eq!(failed.claimed_until, Some(start() + TimeDelta::seconds(2)));
    }

    #[tokio::test]
    async fn test_rejected_entry_is_delivered_once_channel_recovers() {
        // Arrange
        let store = InMemoryStore::new();
        let entries = seed(&store, 2).await;
        let rejected = entries[0].message_id;
        let channel = Arc::new(FlakyChannel::rejecting([rejected]));
        let clock = Arc::new(ManualClock::new(start()));
        let dispatcher = dispatcher(&store, channel.clone(), clock.clone());
        let ambient = MessageContext::default();
        dispatcher.dispatch_pending(&ambient).await.unwrap();

        // Act
        channel.heal(rejected);
        clock.advance(TimeDelta::seconds(2));
        let retry = dispatcher.dispatch_pending(&ambient).await.unwrap();

        // Assert
        assert_eq!(retry.claimed, 1);
        assert_eq!(retry.dispatched, 1);
        assert_eq!(
            channel
                .delivered()
                .iter()
                .map(|m| m.message_id)
                .collect::<Vec<_>>(),
            vec![entries[1].message_id, rejected]
        );
        assert_eq!(store.outbox_entry(rejected).unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn test_stalled_send_times_out_without_blocking_siblings() {
        // Arrange
        let store = InMemoryStore::new();
        let entries = seed(&store, 2).await;
        let stalled = entries[0].message_id;
        let channel = Arc::new(StallingChannel::new([stalled], Duration::from_secs(30)));
        let clock = Arc::new(ManualClock::new(start()));
        let dispatcher = Dispatcher::new(
            Arc::new(store.clone()),
            channel.clone(),
            clock,
            DispatcherConfig {
                send_timeout: Duration::from_millis(50),
                ..config()
            },
        );

        // Act
        let report = dispatcher
            .dispatch_pending(&MessageContext::default())
            .await
            .unwrap();

        // Assert
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(channel.delivered()[0].message_id, entries[1].message_id);
        let timed_out = store.outbox_entry(stalled).unwrap();
        assert!(timed_out.is_pending());
        assert!(timed_out.last_error.unwrap().contains("timed out"));
    }

    /// Channel whose every send takes `step` of clock time. Before sending
    /// anything past the first `rival_after` messages it lets a second
    /// dispatcher sweep.
    struct SlowChannel {
        clock: Arc<ManualClock>,
        step: TimeDelta,
        sent: RecordingChannel,
        rival_after: usize,
        rival: Mutex<Option<Arc<Dispatcher>>>,
        rival_report: Mutex<Option<DispatchReport>>,
    }

    #[async_trait]
    impl MessageChannel for SlowChannel {
        async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
            if self.sent.sent().len() == self.rival_after {
                self.run_rival().await;
            }
            self.sent.send(message).await?;
            self.clock.advance(self.step);
            Ok(())
        }
    }

    impl SlowChannel {
        async fn run_rival(&self) {
            let rival = self.rival.lock().unwrap().take();
            if let Some(rival) = rival {
                let report = rival
                    .dispatch_pending(&MessageContext::default())
                    .await
                    .unwrap();
                *self.rival_report.lock().unwrap() = Some(report);
            }
        }
    }

    #[tokio::test]
    async fn test_entries_past_their_lease_are_left_to_other_workers() {
        // Arrange: four entries, a 150ms lease and 100ms per send, so the
        // lease runs out after the second send.
        let store = InMemoryStore::new();
        let entries = seed(&store, 4).await;
        let clock = Arc::new(ManualClock::new(start()));
        let rival_channel = Arc::new(RecordingChannel::new());
        let rival = Arc::new(Dispatcher::new(
            Arc::new(store.clone()),
            rival_channel.clone(),
            clock.clone(),
            DispatcherConfig {
                worker_id: "worker-b".to_owned(),
                ..config()
            },
        ));
        let channel = Arc::new(SlowChannel {
            clock: clock.clone(),
            step: TimeDelta::milliseconds(100),
            sent: RecordingChannel::new(),
            rival_after: 2,
            rival: Mutex::new(Some(rival)),
            rival_report: Mutex::new(None),
        });
        let dispatcher = Dispatcher::new(
            Arc::new(store.clone()),
            channel.clone(),
            clock.clone(),
            DispatcherConfig {
                worker_id: "worker-a".to_owned(),
                batch_size: 4,
                lease: Duration::from_millis(150),
                ..config()
            },
        );

        // Act: the second worker sweeps once the first has sent two
        // entries, either from inside the batch or right after it.
        let report = dispatcher
            .dispatch_pending(&MessageContext::default())
            .await
            .unwrap();
        channel.run_rival().await;

        // Assert
        assert_eq!(report.claimed, 4);
        assert_eq!(report.dispatched, 2);
        assert_eq!(report.expired, 2);
        let rival_report = (*channel.rival_report.lock().unwrap()).expect("second worker swept");
        assert_eq!(rival_report.claimed, 2);
        assert_eq!(rival_report.dispatched, 2);
        for entry in &entries {
            let sends = channel.sent.send_count(entry.message_id)
                + rival_channel.send_count(entry.message_id);
            assert_eq!(sends, 1, "entry {} sent {sends} times", entry.message_id);
        }
        assert!(store.outbox().iter().all(|e| !e.is_pending()));
    }

    #[tokio::test]
    async fn test_failed_entry_waits_for_backoff_before_retry() {
        // Arrange
        let store = InMemoryStore::new();
        seed(&store, 1).await;
        let clock = Arc::new(ManualClock::new(start()));
        let dispatcher = dispatcher(&store, Arc::new(FailingChannel), clock.clone());
        let ambient = MessageContext::default();
        dispatcher.dispatch_pending(&ambient).await.unwrap();

        // Act
        let too_early = dispatcher.dispatch_pending(&ambient).await.unwrap();
        clock.advance(TimeDelta::seconds(2));
        let second = dispatcher.dispatch_pending(&ambient).await.unwrap();
        clock.advance(TimeDelta::seconds(2));
        let still_backing_off = dispatcher.dispatch_pending(&ambient).await.unwrap();

        // Assert
        assert_eq!(too_early.claimed, 0);
        assert_eq!(second.claimed, 1);
        assert_eq!(second.failed, 1);
        // The second failure doubles the delay to 4s.
        assert_eq!(still_backing_off.claimed, 0);
        assert_eq!(store.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_lost_acknowledgment_is_redelivered_after_lease_expiry() {
        // Arrange
        let inner = InMemoryStore::new();
        let entries = seed(&inner, 1).await;
        let store = Arc::new(LosingAcks {
            inner: inner.clone(),
            failures: AtomicUsize::new(1),
        });
        let channel = Arc::new(RecordingChannel::new());
        let clock = Arc::new(ManualClock::new(start()));
        let dispatcher = Dispatcher::new(store, channel.clone(), clock.clone(), config());
        let ambient = MessageContext::default();

        // Act
        let first = dispatcher.dispatch_pending(&ambient).await.unwrap();
        let under_lease = dispatcher.dispatch_pending(&ambient).await.unwrap();
        clock.advance(TimeDelta::seconds(30));
        let after_lease = dispatcher.dispatch_pending(&ambient).await.unwrap();

        // Assert
        assert_eq!(first.failed, 1);
        assert_eq!(under_lease.claimed, 0);
        assert_eq!(after_lease.dispatched, 1);
        assert_eq!(channel.send_count(entries[0].message_id), 2);
        assert_eq!(inner.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_entry_without_context_uses_ambient_context() {
        // Arrange
        let store = InMemoryStore::new();
        let bare = entry(start(), None);
        let id = Uuid::new_v4();
        store
            .save(
                StoredDocument {
                    id,
                    version: 0,
                    body: serde_json::json!({}),
                },
                None,
                std::slice::from_ref(&bare),
            )
            .await
            .unwrap();
        let channel = Arc::new(RecordingChannel::new());
        let dispatcher = dispatcher(&store, channel.clone(), Arc::new(ManualClock::new(start())));
        let ambient = MessageContext {
            correlation_id: Some(Uuid::from_u128(42)),
            span_context: Some("ambient:span:0:1".to_owned()),
        };

        // Act
        dispatcher.dispatch_pending(&ambient).await.unwrap();

        // Assert
        let sent = channel.sent();
        assert_eq!(sent[0].correlation_id, Some(Uuid::from_u128(42)));
        assert_eq!(sent[0].span_context, "ambient:span:0:1");
        assert_eq!(sent[0].headers["span_context"], "ambient:span:0:1");
    }

    #[tokio::test]
    async fn test_purge_expired_keeps_pending_and_recent_entries() {
        // Arrange
        let store = InMemoryStore::new();
        let entries = seed(&store, 3).await;
        store
            .mark_dispatched(entries[0].message_id, start())
            .await
            .unwrap();
        store
            .mark_dispatched(entries[1].message_id, start() + TimeDelta::minutes(90))
            .await
            .unwrap();
        let clock = Arc::new(ManualClock::new(start() + TimeDelta::hours(2)));
        let dispatcher = dispatcher(&store, Arc::new(RecordingChannel::new()), clock);

        // Act
        let purged = dispatcher.purge_expired().await.unwrap();

        // Assert
        assert_eq!(purged, 1);
        assert!(store.outbox_entry(entries[0].message_id).is_none());
        assert!(store.outbox_entry(entries[1].message_id).is_some());
        assert!(store.outbox_entry(entries[2].message_id).unwrap().is_pending());
    }

    #[tokio::test]
    async fn test_spawned_dispatcher_sweeps_on_trigger_and_stops_on_shutdown() {
        // Arrange
        let store = InMemoryStore::new();
        let channel = Arc::new(RecordingChannel::new());
        let dispatcher = Arc::new(dispatcher(
            &store,
            channel.clone(),
            Arc::new(ManualClock::new(start())),
        ));
        let trigger = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = dispatcher.spawn(
            trigger.clone(),
            shutdown_rx,
            Arc::new(FixedAmbient(MessageContext::default())),
        );

        // Act: entries committed after the initial sweep are picked up on notify.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let entries = seed(&store, 2).await;
        trigger.notify_one();
        for _ in 0..100 {
            if channel.sent().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown_tx.send(true).unwrap();
        let stopped = tokio::time::timeout(Duration::from_secs(1), handle).await;

        // Assert
        assert_eq!(channel.send_count(entries[0].message_id), 1);
        assert_eq!(channel.send_count(entries[1].message_id), 1);
        assert!(stopped.is_ok());
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_dispatcher_stops_when_shutdown_sender_is_dropped() {
        let store = InMemoryStore::new();
        let dispatcher = Arc::new(dispatcher(
            &store,
            Arc::new(RecordingChannel::new()),
            Arc::new(ManualClock::new(start())),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = dispatcher.spawn(
            Arc::new(Notify::new()),
            shutdown_rx,
            Arc::new(NoAmbientContext),
        );

        drop(shutdown_tx);

        assert!(tokio::time::timeout(Duration::from_secs(1), handle).await.is_ok());
    }
}
