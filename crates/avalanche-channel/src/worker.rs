//! Channel worker - one task per channel
//!
//! The worker owns the channel's [`ChannelState`], pending count, retry
//! counter and deadlines. It is the only writer of its channel's events in
//! storage, so appends and purges are serialized and FIFO order holds.
//!
//! ## Flow
//!
//! ```text
//! ChannelHandle ──→ mpsc ──→ ChannelWorker ──append──→ IEventStorage
//!                                 │
//!                          flush trigger ──spawn──→ IIngestion::send
//!                                 │                        │
//!                                 ◀──── JoinHandle result ─┘
//! ```
//!
//! Every suspension point sits in one `tokio::select!` together with the
//! shutdown token, so cancellation never waits on the network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use avalanche_core::config::ChannelSettings;
use avalanche_core::domain::{
    Ack, Batch, ChannelName, ChannelState, ChannelTransition, Event, SendError, SendErrorKind,
};
use avalanche_core::logging::HubLogger;
use avalanche_core::ports::{IEventStorage, IIngestion};

use crate::backoff::BackoffPolicy;

// ============================================================================
// Shared flags
// ============================================================================

/// Flags read by both the handle (on the caller's thread) and the worker
#[derive(Debug)]
pub(crate) struct ChannelFlags {
    pub(crate) name: ChannelName,
    /// Process-wide flag owned by the group
    pub(crate) global: Arc<AtomicBool>,
    /// Per-channel override
    pub(crate) channel: AtomicBool,
    /// Set while the channel is turned off through the group
    pub(crate) user_disabled: AtomicBool,
}

impl ChannelFlags {
    /// Derived enabled state: global AND channel
    pub(crate) fn is_enabled(&self) -> bool {
        self.global.load(Ordering::Acquire) && self.channel.load(Ordering::Acquire)
    }
}

// ============================================================================
// Commands and snapshots
// ============================================================================

pub(crate) enum ChannelCommand {
    Enqueue(Event),
    /// Drain pending events; `done` fires once the drain settles
    Flush(Option<oneshot::Sender<()>>),
    /// Enabled state turned on; resumes a backend-paused channel
    Wake,
    /// Enabled state turned off; clears backoff and optionally aborts the send
    Interrupt { abandon_in_flight: bool },
    Snapshot(oneshot::Sender<ChannelSnapshot>),
}

/// Point-in-time view of a channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSnapshot {
    pub name: ChannelName,
    pub state: ChannelState,
    pub enabled: bool,
    pub pending: u64,
    pub in_flight: usize,
    pub retry_count: u32,
    /// Time left before the next retry, while in backoff
    pub next_retry_in: Option<Duration>,
    pub last_error: Option<String>,
}

struct InFlight {
    batch: Batch,
    handle: JoinHandle<Result<Ack, SendError>>,
}

async fn join_in_flight(
    in_flight: &mut Option<InFlight>,
) -> Result<Result<Ack, SendError>, JoinError> {
    match in_flight {
        Some(flight) => (&mut flight.handle).await,
        None => std::future::pending().await,
    }
}

/// Deadline used when `now + delay` does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

fn deadline_in(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay).unwrap_or(now + FAR_FUTURE)
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// ChannelWorker
// ============================================================================

pub(crate) struct ChannelWorker {
    flags: Arc<ChannelFlags>,
    settings: ChannelSettings,
    backoff: BackoffPolicy,
    storage: Arc<dyn IEventStorage>,
    ingestion: Arc<dyn IIngestion>,
    logger: Arc<HubLogger>,
    commands: mpsc::UnboundedReceiver<ChannelCommand>,
    shutdown: CancellationToken,

    state: ChannelState,
    pending: u64,
    retry_count: u32,
    in_flight: Option<InFlight>,
    backoff_deadline: Option<Instant>,
    /// Next time-based flush attempt (age trigger or storage retry)
    age_deadline: Option<Instant>,
    /// Count trigger is live; cleared when retries run out
    count_armed: bool,
    /// Backoff elapsed; resend regardless of the count
    retry_due: bool,
    /// Manual flush in progress; keep flushing until drained
    drain_requested: bool,
    flush_waiters: Vec<oneshot::Sender<()>>,
    seen_evictions: u64,
    last_error: Option<String>,
}

impl ChannelWorker {
    pub(crate) fn new(
        flags: Arc<ChannelFlags>,
        settings: ChannelSettings,
        storage: Arc<dyn IEventStorage>,
        ingestion: Arc<dyn IIngestion>,
        logger: Arc<HubLogger>,
        commands: mpsc::UnboundedReceiver<ChannelCommand>,
        shutdown: CancellationToken,
    ) -> Self {
        let backoff = BackoffPolicy::from(&settings);
        let seen_evictions = storage.evicted_total();
        Self {
            flags,
            settings,
            backoff,
            storage,
            ingestion,
            logger,
            commands,
            shutdown,
            state: ChannelState::Idle,
            pending: 0,
            retry_count: 0,
            in_flight: None,
            backoff_deadline: None,
            age_deadline: None,
            count_armed: true,
            retry_due: false,
            drain_requested: false,
            flush_waiters: Vec::new(),
            seen_evictions,
            last_error: None,
        }
    }

    fn name(&self) -> &ChannelName {
        &self.flags.name
    }

    /// Main loop; returns on shutdown or when every handle is dropped
    pub(crate) async fn run(mut self) {
        info!(channel = %self.name(), batch_size = self.settings.batch_size, "Channel worker starting");
        self.recover().await;

        loop {
            self.maybe_flush().await;
            self.settle_waiters();

            let age_armed = self.age_deadline.is_some()
                && self.state.can_flush()
                && self.in_flight.is_none()
                && self.flags.is_enabled();
            let age_deadline = if age_armed { self.age_deadline } else { None };
            let backoff_deadline = self.backoff_deadline;

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    if let Some(flight) = self.in_flight.take() {
                        flight.handle.abort();
                        debug!(channel = %self.name(), "Aborted in-flight send on shutdown");
                    }
                    break;
                }

                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle(command).await,
                        None => {
                            debug!(channel = %self.name(), "All handles dropped");
                            break;
                        }
                    }
                }

                joined = join_in_flight(&mut self.in_flight) => {
                    self.on_send_finished(joined).await;
                }

                _ = sleep_until_opt(backoff_deadline), if backoff_deadline.is_some() => {
                    self.on_backoff_elapsed();
                }

                _ = sleep_until_opt(age_deadline), if age_deadline.is_some() => {
                    debug!(channel = %self.name(), "Age trigger fired");
                }
            }
        }

        for waiter in self.flush_waiters.drain(..) {
            let _ = waiter.send(());
        }
        info!(channel = %self.name(), pending = self.pending, "Channel worker stopped");
    }

    // ------------------------------------------------------------------------
    // State helpers
    // ------------------------------------------------------------------------

    fn transition(&mut self, transition: ChannelTransition) {
        match self.state.apply(transition) {
            Ok(next) => {
                if next != self.state {
                    debug!(channel = %self.name(), from = %self.state, to = %next, "Channel transition");
                }
                self.state = next;
            }
            Err(e) => {
                // Stay put; the worker only requests transitions its own state allows
                warn!(channel = %self.name(), error = %e, "Rejected channel transition");
            }
        }
    }

    /// Re-reads the pending count and moves between Idle and Accumulating
    async fn refresh_pending(&mut self) {
        match self.storage.count(self.name()).await {
            Ok(count) => self.pending = count,
            Err(e) => warn!(channel = %self.name(), error = %e, "Failed to count pending events"),
        }
        self.seen_evictions = self.storage.evicted_total();

        if matches!(self.state, ChannelState::Idle | ChannelState::Accumulating) {
            if self.pending > 0 {
                self.transition(ChannelTransition::EventsPending);
            } else {
                self.transition(ChannelTransition::Drained);
                self.age_deadline = None;
                self.drain_requested = false;
            }
        }
    }

    /// Aims the age trigger at the oldest stored event
    async fn arm_age_from_storage(&mut self) {
        let Some(max_age) = self.settings.max_batch_age else {
            self.age_deadline = None;
            return;
        };
        if self.pending == 0 {
            self.age_deadline = None;
            return;
        }

        let oldest: Option<DateTime<Utc>> = match self.storage.oldest_timestamp(self.name()).await {
            Ok(ts) => ts,
            Err(e) => {
                warn!(channel = %self.name(), error = %e, "Failed to read oldest event");
                None
            }
        };
        let age = oldest
            .and_then(|ts| (Utc::now() - ts).to_std().ok())
            .unwrap_or(Duration::ZERO);
        self.age_deadline = Some(deadline_in(max_age.saturating_sub(age)));
    }

    async fn recover(&mut self) {
        self.refresh_pending().await;
        self.arm_age_from_storage().await;
        if self.pending > 0 {
            info!(channel = %self.name(), pending = self.pending, "Recovered pending events");
        }
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    async fn handle(&mut self, command: ChannelCommand) {
        match command {
            ChannelCommand::Enqueue(event) => self.on_enqueue(event).await,
            ChannelCommand::Flush(done) => {
                self.drain_requested = self.pending > 0;
                if let Some(done) = done {
                    self.flush_waiters.push(done);
                }
            }
            ChannelCommand::Wake => self.on_wake().await,
            ChannelCommand::Interrupt { abandon_in_flight } => self.on_interrupt(abandon_in_flight),
            ChannelCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn on_enqueue(&mut self, event: Event) {
        match self.storage.append(self.name(), &event).await {
            Ok(token) => {
                let evictions = self.storage.evicted_total();
                if evictions != self.seen_evictions {
                    self.refresh_pending().await;
                } else {
                    self.pending += 1;
                    self.transition(ChannelTransition::EventsPending);
                }
                self.count_armed = true;

                if self.age_deadline.is_none() && self.state == ChannelState::Accumulating {
                    if let Some(max_age) = self.settings.max_batch_age {
                        self.age_deadline = Some(deadline_in(max_age));
                    }
                }
                tracing::trace!(channel = %self.name(), token = %token, pending = self.pending, "Event stored");
            }
            Err(e) => {
                error!(channel = %self.name(), error = %e, "Failed to store event");
                self.logger.error(&format!(
                    "Dropping event {} on channel {}: {}",
                    event.id(),
                    self.name(),
                    e
                ));
            }
        }
    }

    async fn on_wake(&mut self) {
        if self.state == ChannelState::Paused && !self.flags.user_disabled.load(Ordering::Acquire) {
            self.flags.channel.store(true, Ordering::Release);
            self.transition(ChannelTransition::Resumed);
            self.logger
                .info(&format!("Channel {} resumed", self.name()));
        }
        self.count_armed = true;
        self.refresh_pending().await;
        if self.state == ChannelState::Accumulating {
            self.arm_age_from_storage().await;
        }
    }

    fn on_interrupt(&mut self, abandon_in_flight: bool) {
        if self.state == ChannelState::Backoff {
            self.backoff_deadline = None;
            self.retry_count = 0;
            self.retry_due = false;
            self.transition(ChannelTransition::Interrupted);
            debug!(channel = %self.name(), "Backoff cleared by disable");
        }

        if abandon_in_flight {
            if let Some(flight) = self.in_flight.take() {
                flight.handle.abort();
                self.retry_count = 0;
                self.transition(ChannelTransition::Interrupted);
                info!(channel = %self.name(), batch_id = %flight.batch.id(), "Abandoned in-flight batch");
            }
        }

        self.drain_requested = false;
    }

    fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            name: self.name().clone(),
            state: self.state,
            enabled: self.flags.is_enabled(),
            pending: self.pending,
            in_flight: self.in_flight.as_ref().map_or(0, |f| f.batch.len()),
            retry_count: self.retry_count,
            next_retry_in: self
                .backoff_deadline
                .map(|d| d.saturating_duration_since(Instant::now())),
            last_error: self.last_error.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // Flushing
    // ------------------------------------------------------------------------

    fn flush_due(&self) -> bool {
        if !self.flags.is_enabled()
            || !self.state.can_flush()
            || self.in_flight.is_some()
            || self.pending == 0
        {
            return false;
        }

        let count_due =
            self.count_armed && self.pending >= self.settings.batch_size as u64;
        let age_due = self
            .age_deadline
            .map_or(false, |deadline| deadline <= Instant::now());

        self.retry_due || self.drain_requested || count_due || age_due
    }

    async fn maybe_flush(&mut self) {
        if self.flush_due() {
            self.start_flush().await;
        }
    }

    async fn start_flush(&mut self) {
        let events = match self
            .storage
            .load_pending(self.name(), self.settings.batch_size)
            .await
        {
            Ok(events) => events,
            Err(e) => {
                error!(channel = %self.name(), error = %e, "Failed to load pending events");
                self.logger.error(&format!(
                    "Channel {} could not read pending events: {}",
                    self.name(),
                    e
                ));
                self.stall();
                return;
            }
        };

        if events.is_empty() {
            self.pending = 0;
            self.transition(ChannelTransition::Drained);
            self.age_deadline = None;
            self.drain_requested = false;
            self.retry_due = false;
            return;
        }

        let batch = match Batch::new(self.name().clone(), events) {
            Ok(batch) => batch,
            Err(e) => {
                error!(channel = %self.name(), error = %e, "Storage returned an invalid batch");
                self.stall();
                return;
            }
        };

        self.transition(ChannelTransition::FlushStarted);
        self.retry_due = false;
        self.age_deadline = None;

        debug!(
            channel = %self.name(),
            batch_id = %batch.id(),
            events = batch.len(),
            attempt = self.retry_count + 1,
            "Flushing batch"
        );

        let ingestion = Arc::clone(&self.ingestion);
        let outgoing = batch.clone();
        let handle = tokio::spawn(async move { ingestion.send(&outgoing).await });
        self.in_flight = Some(InFlight { batch, handle });
    }

    /// Pauses time-based flushing after a storage failure
    fn stall(&mut self) {
        self.retry_due = false;
        self.drain_requested = false;
        self.count_armed = false;
        self.age_deadline = Some(deadline_in(self.backoff.base));
        self.release_waiters();
    }

    // ------------------------------------------------------------------------
    // Send results
    // ------------------------------------------------------------------------

    async fn on_send_finished(&mut self, joined: Result<Result<Ack, SendError>, JoinError>) {
        let Some(flight) = self.in_flight.take() else {
            return;
        };

        let result = match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => {
                self.transition(ChannelTransition::Interrupted);
                return;
            }
            Err(e) => Err(SendError::retryable(format!("Send task failed: {e}"))),
        };

        match result {
            Ok(ack) if ack.acknowledges(&flight.batch) => self.on_acknowledged(flight.batch).await,
            Ok(ack) => {
                let error = SendError::retryable(format!(
                    "Acknowledgement for batch {} does not match {}",
                    ack.batch_id,
                    flight.batch.id()
                ));
                self.on_failed(flight.batch, error).await;
            }
            Err(error) => self.on_failed(flight.batch, error).await,
        }
    }

    async fn on_acknowledged(&mut self, batch: Batch) {
        self.purge(&batch).await;
        self.retry_count = 0;
        self.last_error = None;
        self.count_armed = true;
        self.transition(ChannelTransition::SendSucceeded);

        debug!(channel = %self.name(), batch_id = %batch.id(), events = batch.len(), "Batch delivered");

        self.refresh_pending().await;
        self.arm_age_from_storage().await;
    }

    async fn on_failed(&mut self, batch: Batch, error: SendError) {
        self.last_error = Some(error.to_string());
        self.drain_requested = false;
        self.release_waiters();

        if !self.flags.is_enabled() {
            // Disabled while the send was out: no backoff, events stay stored
            self.retry_count = 0;
            self.transition(ChannelTransition::Interrupted);
            self.refresh_pending().await;
            debug!(channel = %self.name(), error = %error, "Send failed while disabled");
            return;
        }

        match error.kind() {
            SendErrorKind::Retryable => self.on_retryable(&batch, &error).await,
            SendErrorKind::Fatal => {
                self.purge(&batch).await;
                self.retry_count = 0;
                self.transition(ChannelTransition::SendFailed(SendErrorKind::Fatal));
                error!(channel = %self.name(), batch_id = %batch.id(), error = %error, "Batch rejected permanently");
                self.logger.error(&format!(
                    "Dropping batch {} of {} events on channel {}: {}",
                    batch.id(),
                    batch.len(),
                    self.name(),
                    error
                ));
                self.refresh_pending().await;
                self.arm_age_from_storage().await;
            }
            SendErrorKind::Disabled => {
                self.retry_count = 0;
                self.flags.channel.store(false, Ordering::Release);
                self.transition(ChannelTransition::SendFailed(SendErrorKind::Disabled));
                warn!(channel = %self.name(), error = %error, "Backend paused channel");
                self.logger.warning(&format!(
                    "Channel {} paused by the backend: {}",
                    self.name(),
                    error
                ));
            }
        }
    }

    async fn on_retryable(&mut self, batch: &Batch, error: &SendError) {
        self.retry_count += 1;

        if self.retry_count > self.settings.max_retries {
            warn!(
                channel = %self.name(),
                batch_id = %batch.id(),
                attempts = self.retry_count,
                "Retries exhausted, keeping events for a later flush"
            );
            self.logger.warning(&format!(
                "Channel {} gave up on batch {} after {} attempts: {}",
                self.name(),
                batch.id(),
                self.retry_count,
                error
            ));
            self.retry_count = 0;
            self.count_armed = false;
            self.transition(ChannelTransition::RetriesExhausted);
            self.age_deadline = self.settings.max_batch_age.map(deadline_in);
            return;
        }

        let delay = self
            .backoff
            .delay_with_hint(self.retry_count, error.retry_after());
        self.backoff_deadline = Some(deadline_in(delay));
        self.transition(ChannelTransition::SendFailed(SendErrorKind::Retryable));

        info!(
            channel = %self.name(),
            attempt = self.retry_count,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Transient send failure, backing off"
        );
    }

    fn on_backoff_elapsed(&mut self) {
        self.backoff_deadline = None;
        if self.state == ChannelState::Backoff {
            self.transition(ChannelTransition::BackoffElapsed);
            self.retry_due = true;
        }
    }

    async fn purge(&mut self, batch: &Batch) {
        match self.storage.mark_purged(&batch.tokens()).await {
            Ok(removed) => {
                tracing::trace!(channel = %self.name(), removed, "Purged batch");
            }
            Err(e) => {
                // The batch stays stored and may be sent again
                error!(channel = %self.name(), batch_id = %batch.id(), error = %e, "Failed to purge batch");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Flush waiters
    // ------------------------------------------------------------------------

    fn release_waiters(&mut self) {
        for waiter in self.flush_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    /// Releases waiters once nothing more will happen without a new trigger
    fn settle_waiters(&mut self) {
        if self.flush_waiters.is_empty() {
            return;
        }
        let settled = self.in_flight.is_none()
            && !(self.drain_requested && self.flags.is_enabled() && self.state.can_flush());
        if settled {
            self.drain_requested = false;
            self.release_waiters();
        }
    }
}
