//! Publish-side dispatcher: classify, route, envelope, submit.
//!
//! The dispatcher retains no state between calls and is safe to invoke from
//! any number of concurrent callers; each publish uses its own pooled
//! transport session. Validation failures never reach the transport, and a
//! failed submit leaves nothing enqueued.

use std::sync::Arc;

use crate::classify::Classifier;
use crate::envelope::{DeliveryProperties, TaskEnvelope};
use crate::error::Error;
use crate::message::{ChannelType, Message, MessageInfo};
use crate::topology::QueueKey;
use crate::transport::Transport;

pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    classifier: Classifier,
}

/// Routing decision returned to the publishing caller.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub queue: String,
    pub channel: ChannelType,
    pub info: MessageInfo,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            classifier: Classifier::new(),
        }
    }

    /// Routes a validated message to its queue and returns the decision.
    pub async fn publish(&self, message: &Message) -> Result<PublishOutcome, Error> {
        let channel = self.classifier.classify(message.content());
        let queue = QueueKey::new(channel, message.priority()).queue_name();

        let envelope = TaskEnvelope::build(channel, message);
        let props = DeliveryProperties::for_message(message);
        let body = envelope.to_bytes()?;

        self.transport.publish(&queue, &body, &props).await?;

        tracing::info!(
            id = %envelope.id,
            %queue,
            channel = %channel,
            priority = %message.priority(),
            "published message"
        );

        Ok(PublishOutcome {
            queue,
            channel,
            info: message.info(channel),
        })
    }
}
