//! Stand-in feature so the CLI can drive a channel by name

use std::sync::Arc;

use avalanche_core::domain::ChannelName;
use avalanche_core::ports::{IEventEmitter, IFeature};

/// Registers a channel under its own name and emits nothing by itself
pub struct ChannelFeature {
    channel: ChannelName,
}

impl ChannelFeature {
    pub fn new(channel: ChannelName) -> Arc<dyn IFeature> {
        Arc::new(Self { channel })
    }
}

impl IFeature for ChannelFeature {
    fn name(&self) -> &str {
        self.channel.as_str()
    }

    fn channel_name(&self) -> ChannelName {
        self.channel.clone()
    }

    fn set_enabled(&self, _enabled: bool) {}

    fn on_started(&self, _emitter: Arc<dyn IEventEmitter>) {}
}
