//! Feature module ports
//!
//! A feature (crash reporting, analytics, ...) owns one channel. The hub
//! hands it an [`IEventEmitter`] once it is started and toggles it through
//! [`IFeature::set_enabled`].

use std::sync::Arc;

use crate::config::ChannelOverride;
use crate::domain::{ChannelName, Priority};

/// Port trait implemented by feature modules
pub trait IFeature: Send + Sync {
    /// Unique feature name; the registry key
    fn name(&self) -> &str;

    /// Channel this feature emits into
    fn channel_name(&self) -> ChannelName;

    /// Enabled state the feature's channel starts with
    fn default_enabled(&self) -> bool {
        true
    }

    /// Channel settings the feature prefers over the configured defaults
    ///
    /// Explicit entries under `channels.overrides` in the configuration win.
    fn channel_settings(&self) -> Option<ChannelOverride> {
        None
    }

    /// Called when the hub or the feature itself is toggled
    fn set_enabled(&self, enabled: bool);

    /// Called once, after the feature's channel exists
    fn on_started(&self, emitter: Arc<dyn IEventEmitter>);
}

/// Entry point the hub exposes to features
///
/// Emitting never fails from the feature's point of view: a disabled channel
/// turns the call into a no-op logged at debug level.
pub trait IEventEmitter: Send + Sync {
    fn emit(&self, channel: &ChannelName, payload: serde_json::Value, priority: Priority);
}
