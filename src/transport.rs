//! The durable-queue transport seam.
//!
//! The dispatcher and worker executor never touch storage directly; they
//! speak to a [`Transport`] through six operations: declare, publish,
//! receive, ack, requeue, reject. Delivery is at-least-once: under correct
//! transport behavior no two consumers hold the same envelope in flight at
//! once, but a redelivered envelope may be seen more than once across its
//! lifetime.

use async_trait::async_trait;

use crate::envelope::DeliveryProperties;
use crate::error::Error;

pub mod sqlite;

/// An envelope handed to a consumer, held in flight until a terminal call.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Transport-side delivery tag.
    pub id: i64,
    /// Queue the envelope was received from.
    pub queue: String,
    /// Consumer tag holding the delivery.
    pub consumer: String,
    /// Serialized task envelope.
    pub body: Vec<u8>,
    /// Delivery attempts so far, including this one.
    pub tries: u32,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Declares a durable queue. Idempotent.
    async fn declare_queue(&self, name: &str) -> Result<(), Error>;

    /// Appends an envelope to a declared queue with the given delivery
    /// properties.
    async fn publish(
        &self,
        queue: &str,
        body: &[u8],
        props: &DeliveryProperties,
    ) -> Result<(), Error>;

    /// Hands the next available envelope to `consumer`, or `None` when the
    /// queue is empty. The envelope stays invisible to other consumers until
    /// acked, requeued, rejected, or its lease lapses.
    async fn receive(&self, queue: &str, consumer: &str) -> Result<Option<Delivery>, Error>;

    /// Removes the envelope permanently. Only valid for the holding consumer.
    async fn ack(&self, delivery: &Delivery) -> Result<(), Error>;

    /// Returns the envelope to the queue for redelivery.
    async fn requeue(&self, delivery: &Delivery) -> Result<(), Error>;

    /// Drops the envelope as permanently failed.
    async fn reject(&self, delivery: &Delivery) -> Result<(), Error>;
}
