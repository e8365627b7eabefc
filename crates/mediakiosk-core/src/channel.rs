//! Device event channel.
//!
//! The only structure shared between the device watcher thread and the UI
//! context. The producer never blocks; the consumer drains without blocking.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{ChannelError, Result};
use crate::media::MediaSet;

/// A USB device arrival or departure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// A device was mounted and its media classified.
    Added {
        /// Kernel partition name, e.g. `sdb1`.
        device: String,
        /// Media found at the top level of the volume.
        media: MediaSet,
    },
    /// A device went away; all cached media is invalid.
    Removed {
        /// Kernel partition name.
        device: String,
    },
}

impl DeviceEvent {
    /// Partition name the event refers to.
    #[must_use]
    pub fn device(&self) -> &str {
        match self {
            Self::Added { device, .. } | Self::Removed { device } => device,
        }
    }
}

/// Create a connected sender/receiver pair.
#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

/// Producer side, owned by the device watcher.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<DeviceEvent>,
}

impl EventSender {
    /// Queue an event without blocking.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Closed` once the receiver has been dropped.
    pub fn put(&self, event: DeviceEvent) -> Result<()> {
        self.tx.send(event).map_err(|_| ChannelError::Closed)?;
        Ok(())
    }

    /// Whether the receiver has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side, owned by the UI context.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<DeviceEvent>,
}

impl EventReceiver {
    /// Take every queued event in arrival order.
    ///
    /// Never blocks. An empty queue yields an empty `Vec`.
    pub fn drain_all(&mut self) -> Vec<DeviceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
