//! Event emitter handed to feature modules

use std::sync::Arc;

use tracing::{debug, warn};

use avalanche_channel::{ChannelError, ChannelGroup};
use avalanche_core::domain::{ChannelName, Priority};
use avalanche_core::ports::IEventEmitter;

/// Routes feature events to their channel
///
/// Never fails from the feature's side: a disabled or stopped channel drops
/// the event with a debug log.
pub struct HubEmitter {
    group: Arc<ChannelGroup>,
}

impl HubEmitter {
    pub fn new(group: Arc<ChannelGroup>) -> Self {
        Self { group }
    }
}

impl IEventEmitter for HubEmitter {
    fn emit(&self, channel: &ChannelName, payload: serde_json::Value, priority: Priority) {
        match self.group.enqueue(channel.as_str(), payload, priority) {
            Ok(id) => debug!(channel = %channel, event_id = %id, "Event accepted"),
            Err(ChannelError::Disabled(_)) => {
                debug!(channel = %channel, "Channel disabled, event dropped");
            }
            Err(ChannelError::Closed(_)) => {
                debug!(channel = %channel, "Channel stopped, event dropped");
            }
            Err(e @ ChannelError::UnknownChannel(_)) => {
                warn!(error = %e, "Event emitted into an unregistered channel");
            }
        }
    }
}
