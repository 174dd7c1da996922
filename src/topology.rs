//! Fixed queue topology: the mapping from (channel, priority) to a durable
//! queue name.
//!
//! Both the publish and consume deployments derive names with
//! [`QueueKey::queue_name`]; the naming rule is the coupling contract between
//! them and must change on both sides at once. Names are derived, not
//! generated, so the mapping is stable across restarts.

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::error::Error;
use crate::message::{ChannelType, Priority};
use crate::transport::Transport;

/// One of the nine routing keys.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueKey {
    pub channel: ChannelType,
    pub priority: Priority,
}

impl QueueKey {
    pub fn new(channel: ChannelType, priority: Priority) -> Self {
        Self { channel, priority }
    }

    /// Durable queue name for this key, e.g. `email_high_queue`.
    pub fn queue_name(&self) -> String {
        format!("{}_{}_queue", self.channel, self.priority)
    }

    /// All nine keys, in channel-major order.
    pub fn all() -> Vec<QueueKey> {
        ChannelType::iter()
            .flat_map(|channel| Priority::iter().map(move |priority| QueueKey { channel, priority }))
            .collect()
    }
}

/// The nine queue names the topology consists of.
pub fn all_queue_names() -> Vec<String> {
    QueueKey::all().iter().map(QueueKey::queue_name).collect()
}

/// Declares every queue in the topology as durable.
///
/// Idempotent; both sides call this on startup before any publish or consume.
pub async fn ensure_declared(transport: &dyn Transport) -> Result<(), Error> {
    for name in all_queue_names() {
        transport.declare_queue(&name).await?;
    }
    Ok(())
}
