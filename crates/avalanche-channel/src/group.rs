//! Channel group - registry of channel workers sharing one storage and sender

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use avalanche_core::config::ChannelSettings;
use avalanche_core::domain::{ChannelName, Event, EventId, Priority};
use avalanche_core::logging::HubLogger;
use avalanche_core::ports::{IEventStorage, IIngestion};

use crate::worker::{ChannelCommand, ChannelFlags, ChannelSnapshot, ChannelWorker};

/// Errors returned by the channel layer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {0} is disabled")]
    Disabled(ChannelName),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Channel {0} has shut down")]
    Closed(ChannelName),
}

// ============================================================================
// ChannelHandle
// ============================================================================

/// Cheap, cloneable entry point into one channel worker
#[derive(Clone)]
pub struct ChannelHandle {
    flags: Arc<ChannelFlags>,
    commands: mpsc::UnboundedSender<ChannelCommand>,
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("name", &self.flags.name)
            .field("enabled", &self.flags.is_enabled())
            .finish()
    }
}

impl ChannelHandle {
    pub fn name(&self) -> &ChannelName {
        &self.flags.name
    }

    /// Derived enabled state (global flag AND channel flag)
    pub fn is_enabled(&self) -> bool {
        self.flags.is_enabled()
    }

    /// Queues an event without blocking
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Disabled` when either flag is off; nothing is
    /// stored in that case.
    pub fn enqueue(
        &self,
        payload: serde_json::Value,
        priority: Priority,
    ) -> Result<EventId, ChannelError> {
        if !self.flags.is_enabled() {
            return Err(ChannelError::Disabled(self.name().clone()));
        }

        let event = Event::new(self.name().clone(), payload, priority);
        let id = *event.id();
        self.send(ChannelCommand::Enqueue(event))?;
        Ok(id)
    }

    /// Drains pending events and waits until the drain settles
    ///
    /// Returns once the channel is empty, a send fails, or the channel is
    /// disabled.
    pub async fn flush(&self) -> Result<(), ChannelError> {
        let (done, settled) = oneshot::channel();
        self.send(ChannelCommand::Flush(Some(done)))?;
        settled
            .await
            .map_err(|_| ChannelError::Closed(self.name().clone()))
    }

    /// Requests a drain without waiting for it
    pub fn request_flush(&self) -> Result<(), ChannelError> {
        self.send(ChannelCommand::Flush(None))
    }

    pub async fn snapshot(&self) -> Result<ChannelSnapshot, ChannelError> {
        let (reply, response) = oneshot::channel();
        self.send(ChannelCommand::Snapshot(reply))?;
        response
            .await
            .map_err(|_| ChannelError::Closed(self.name().clone()))
    }

    fn send(&self, command: ChannelCommand) -> Result<(), ChannelError> {
        self.commands
            .send(command)
            .map_err(|_| ChannelError::Closed(self.name().clone()))
    }
}

// ============================================================================
// ChannelGroup
// ============================================================================

/// Owns every channel worker of a hub
///
/// All workers share the storage, the sender and the global enabled flag.
pub struct ChannelGroup {
    channels: DashMap<ChannelName, ChannelHandle>,
    global: Arc<AtomicBool>,
    storage: Arc<dyn IEventStorage>,
    ingestion: Arc<dyn IIngestion>,
    logger: Arc<HubLogger>,
    abandon_in_flight: bool,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ChannelGroup {
    pub fn new(
        storage: Arc<dyn IEventStorage>,
        ingestion: Arc<dyn IIngestion>,
        logger: Arc<HubLogger>,
        enabled: bool,
    ) -> Self {
        Self::with_global_flag(storage, ingestion, logger, Arc::new(AtomicBool::new(enabled)))
    }

    /// Builds a group over a global flag owned by the caller
    ///
    /// Writes to `global` made before any channel exists are seen by every
    /// channel; later writes should go through [`ChannelGroup::set_enabled`]
    /// so running workers are woken or interrupted.
    pub fn with_global_flag(
        storage: Arc<dyn IEventStorage>,
        ingestion: Arc<dyn IIngestion>,
        logger: Arc<HubLogger>,
        global: Arc<AtomicBool>,
    ) -> Self {
        Self {
            channels: DashMap::new(),
            global,
            storage,
            ingestion,
            logger,
            abandon_in_flight: false,
            shutdown: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Aborts in-flight sends when the group is disabled
    pub fn with_abandon_in_flight(mut self, abandon: bool) -> Self {
        self.abandon_in_flight = abandon;
        self
    }

    /// Spawns a worker for `name`, or returns the existing handle
    ///
    /// Must be called from within a tokio runtime.
    pub fn add_channel(
        &self,
        name: ChannelName,
        settings: ChannelSettings,
        enabled: bool,
    ) -> ChannelHandle {
        let entry = self.channels.entry(name.clone());
        let entry = match entry {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                debug!(channel = %name, "Channel already registered");
                return existing.get().clone();
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => vacant,
        };

        let flags = Arc::new(ChannelFlags {
            name: name.clone(),
            global: Arc::clone(&self.global),
            channel: AtomicBool::new(enabled),
            user_disabled: AtomicBool::new(!enabled),
        });
        let (tx, rx) = mpsc::unbounded_channel();

        let worker = ChannelWorker::new(
            Arc::clone(&flags),
            settings,
            Arc::clone(&self.storage),
            Arc::clone(&self.ingestion),
            Arc::clone(&self.logger),
            rx,
            self.shutdown.child_token(),
        );
        let handle = tokio::spawn(worker.run());
        self.push_worker(handle);

        let channel = ChannelHandle {
            flags,
            commands: tx,
        };
        entry.insert(channel.clone());
        info!(channel = %name, enabled, "Channel registered");
        channel
    }

    fn push_worker(&self, handle: JoinHandle<()>) {
        match self.workers.lock() {
            Ok(mut workers) => workers.push(handle),
            Err(poisoned) => poisoned.into_inner().push(handle),
        }
    }

    pub fn channel(&self, name: &str) -> Option<ChannelHandle> {
        let name = ChannelName::new(name).ok()?;
        self.channels.get(&name).map(|entry| entry.value().clone())
    }

    fn require(&self, name: &str) -> Result<ChannelHandle, ChannelError> {
        self.channel(name)
            .ok_or_else(|| ChannelError::UnknownChannel(name.to_string()))
    }

    /// Registered channel names, sorted
    pub fn names(&self) -> Vec<ChannelName> {
        let mut names: Vec<ChannelName> =
            self.channels.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn enqueue(
        &self,
        channel: &str,
        payload: serde_json::Value,
        priority: Priority,
    ) -> Result<EventId, ChannelError> {
        self.require(channel)?.enqueue(payload, priority)
    }

    pub fn is_enabled(&self) -> bool {
        self.global.load(Ordering::Acquire)
    }

    /// Flips the global flag and returns its previous value
    ///
    /// Every channel observes the new value before this returns. Disabling
    /// clears pending backoff. Enabling resumes channels the backend paused,
    /// but not channels turned off individually.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        let previous = self.global.swap(enabled, Ordering::AcqRel);
        if previous == enabled {
            return previous;
        }
        info!(enabled, "Channel group toggled");

        for entry in self.channels.iter() {
            let command = if enabled {
                ChannelCommand::Wake
            } else {
                ChannelCommand::Interrupt {
                    abandon_in_flight: self.abandon_in_flight,
                }
            };
            if entry.value().send(command).is_err() {
                warn!(channel = %entry.key(), "Channel worker is gone");
            }
        }
        previous
    }

    /// Flips one channel's own flag
    pub fn set_channel_enabled(&self, channel: &str, enabled: bool) -> Result<(), ChannelError> {
        let handle = self.require(channel)?;
        handle.flags.user_disabled.store(!enabled, Ordering::Release);
        let previous = handle.flags.channel.swap(enabled, Ordering::AcqRel);
        if enabled {
            // Also resumes a backend-paused channel whose flag was already cleared
            handle.send(ChannelCommand::Wake)?;
        } else if previous {
            handle.send(ChannelCommand::Interrupt {
                abandon_in_flight: self.abandon_in_flight,
            })?;
        }
        debug!(channel, enabled, "Channel toggled");
        Ok(())
    }

    pub async fn flush(&self, channel: &str) -> Result<(), ChannelError> {
        self.require(channel)?.flush().await
    }

    /// Flushes every channel concurrently
    pub async fn flush_all(&self) {
        let handles: Vec<ChannelHandle> =
            self.channels.iter().map(|entry| entry.value().clone()).collect();

        let mut waits = Vec::with_capacity(handles.len());
        for handle in handles {
            waits.push(tokio::spawn(async move {
                if let Err(e) = handle.flush().await {
                    warn!(channel = %handle.name(), error = %e, "Flush failed");
                }
            }));
        }
        for wait in waits {
            let _ = wait.await;
        }
    }

    pub async fn snapshot(&self, channel: &str) -> Result<ChannelSnapshot, ChannelError> {
        self.require(channel)?.snapshot().await
    }

    /// Snapshots of every channel, sorted by name
    pub async fn snapshots(&self) -> Vec<ChannelSnapshot> {
        let mut snapshots = Vec::new();
        for name in self.names() {
            if let Ok(snapshot) = self.snapshot(name.as_str()).await {
                snapshots.push(snapshot);
            }
        }
        snapshots
    }

    /// Cancels every worker and waits for them to stop
    ///
    /// Stored events stay in storage for the next start.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let workers = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Channel worker ended abnormally");
            }
        }
        info!("Channel group stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for ChannelGroup {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
