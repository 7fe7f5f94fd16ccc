//! Leveled log sink exposed through the facade
//!
//! [`HubLogger`] holds the current [`LogLevel`] and an optional, runtime
//! swappable [`LogHandler`]. Every message is mirrored to `tracing`; messages
//! at or above the current level are additionally handed to the handler,
//! synchronously, on the calling thread.

use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc, RwLock,
};

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Log verbosity, from most to least verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Verbose,
    Debug,
    Info,
    Warning,
    Error,
    Assert,
    /// Silences the handler entirely
    None,
}

impl LogLevel {
    /// All levels in ascending order
    pub const ALL: [LogLevel; 7] = [
        LogLevel::Verbose,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Assert,
        LogLevel::None,
    ];

    fn as_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(value: u8) -> Self {
        Self::ALL
            .get(value as usize)
            .copied()
            .unwrap_or(LogLevel::None)
    }

    /// Returns the name of this level
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Verbose => "verbose",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Assert => "assert",
            LogLevel::None => "none",
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Warning
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|level| level.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::ValidationFailed(format!("Unknown log level: {s}")))
    }
}

/// Callback receiving log messages that pass the current level
pub type LogHandler = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Leveled logger owned by the hub context and shared with the pipeline
pub struct HubLogger {
    level: AtomicU8,
    handler: RwLock<Option<LogHandler>>,
}

impl std::fmt::Debug for HubLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubLogger")
            .field("level", &self.level())
            .field("has_handler", &self.has_handler())
            .finish()
    }
}

impl Default for HubLogger {
    fn default() -> Self {
        Self::new(LogLevel::default())
    }
}

impl HubLogger {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level: AtomicU8::new(level.as_u8()),
            handler: RwLock::new(None),
        }
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Acquire))
    }

    pub fn set_level(&self, level: LogLevel) {
        self.level.store(level.as_u8(), Ordering::Release);
    }

    /// Replaces the handler; `None` removes it
    pub fn set_handler(&self, handler: Option<LogHandler>) {
        // A poisoned lock only means a previous handler panicked; keep going.
        let mut slot = self.handler.write().unwrap_or_else(|e| e.into_inner());
        *slot = handler;
    }

    pub fn has_handler(&self) -> bool {
        self.handler
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Returns true if a message at `level` reaches the handler
    pub fn is_enabled_for(&self, level: LogLevel) -> bool {
        let current = self.level();
        level != LogLevel::None && current != LogLevel::None && level >= current
    }

    /// Logs `message` at `level`
    pub fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Verbose => tracing::trace!(target: "avalanche", "{message}"),
            LogLevel::Debug => tracing::debug!(target: "avalanche", "{message}"),
            LogLevel::Info => tracing::info!(target: "avalanche", "{message}"),
            LogLevel::Warning => tracing::warn!(target: "avalanche", "{message}"),
            LogLevel::Error | LogLevel::Assert => {
                tracing::error!(target: "avalanche", "{message}")
            }
            LogLevel::None => return,
        }

        if !self.is_enabled_for(level) {
            return;
        }

        let handler = self
            .handler
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(Arc::clone);
        if let Some(handler) = handler {
            handler(level, message);
        }
    }

    pub fn verbose(&self, message: &str) {
        self.log(LogLevel::Verbose, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warning(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}
