//! Consumer-side execution: handler registry, processing deadline, and the
//! receive → handle → settle loop.
//!
//! Late acknowledgment throughout: an envelope is only removed after its
//! handler succeeds within budget. Failures and timeouts requeue the envelope
//! until the delivery-attempt cap is reached, after which it is dropped as
//! permanently failed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::envelope::TaskEnvelope;
use crate::error::Error;
use crate::message::ChannelType;
use crate::topology::QueueKey;
use crate::transport::{Delivery, Transport};

/// A type-specific message handler.
///
/// Handlers are not preempted; one that performs long sub-steps must honor
/// cooperative cancellation itself if it wants to stop early.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        content: &str,
        metadata: &HashMap<String, serde_json::Value>,
    ) -> eyre::Result<()>;
}

/// Static channel → handler mapping, resolved before serving so an unbound
/// channel fails at configuration time rather than at dispatch.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ChannelType, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, channel: ChannelType, handler: Arc<dyn Handler>) -> Self {
        self.handlers.insert(channel, handler);
        self
    }

    pub fn resolve(&self, channel: ChannelType) -> Result<Arc<dyn Handler>, Error> {
        self.handlers
            .get(&channel)
            .cloned()
            .ok_or_else(|| Error::handler_not_bound(channel.to_string()))
    }
}

/// Terminal outcome of one handler invocation.
#[derive(Debug)]
pub enum Outcome {
    Completed { elapsed: Duration },
    TimedOut { elapsed: Duration, budget: Duration },
    Failed { error: eyre::Report },
}

/// Runs a handler and evaluates the processing deadline after it returns.
///
/// Detection after the fact, not preemption: the handler is never interrupted
/// mid-execution, and one that "succeeded" past its budget still times out.
pub async fn run_with_deadline(
    handler: &dyn Handler,
    content: &str,
    metadata: &HashMap<String, serde_json::Value>,
    budget: Duration,
) -> Outcome {
    let start = Instant::now();
    let result = handler.handle(content, metadata).await;
    let elapsed = start.elapsed();

    if elapsed > budget {
        return Outcome::TimedOut { elapsed, budget };
    }

    match result {
        Ok(()) => Outcome::Completed { elapsed },
        Err(error) => Outcome::Failed { error },
    }
}

/// Pulls envelopes from a set of queues and drives each to a terminal state.
///
/// Prefetch is one: the executor never holds a second envelope until the one
/// in flight is acked, requeued, or rejected, which keeps per-envelope
/// deadline accounting unambiguous.
#[derive(bon::Builder)]
pub struct WorkerExecutor {
    transport: Arc<dyn Transport>,
    registry: Arc<HandlerRegistry>,
    keys: Vec<QueueKey>,
    consumer: String,
    #[builder(default = 3)]
    max_deliveries: u32,
    #[builder(default = Duration::from_millis(500))]
    poll_interval: Duration,
}

impl WorkerExecutor {
    /// Serves the configured queues until the surrounding task is cancelled.
    pub async fn run(&self) -> Result<(), Error> {
        for key in &self.keys {
            self.registry.resolve(key.channel)?;
        }

        tracing::info!(
            consumer = %self.consumer,
            queues = self.keys.len(),
            "worker executor started"
        );

        loop {
            let mut idle = true;

            for key in &self.keys {
                let queue = key.queue_name();

                match self.transport.receive(&queue, &self.consumer).await {
                    Ok(Some(delivery)) => {
                        idle = false;
                        self.process(*key, delivery).await;
                    }
                    Ok(None) => {}
                    Err(error) => {
                        tracing::error!(%queue, %error, "receive failed");
                    }
                }
            }

            if idle {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }

    /// Drives one delivery to its terminal outcome.
    pub async fn process(&self, key: QueueKey, delivery: Delivery) {
        let handler = match self.registry.resolve(key.channel) {
            Ok(handler) => handler,
            Err(error) => {
                tracing::error!(queue = %delivery.queue, %error, "no handler for queue");
                self.settle_failure(&delivery).await;
                return;
            }
        };

        let envelope = match TaskEnvelope::from_bytes(&delivery.body) {
            Ok(envelope) => envelope,
            Err(error) => {
                tracing::error!(
                    queue = %delivery.queue,
                    body = %String::from_utf8_lossy(&delivery.body),
                    %error,
                    "failed to decode task envelope"
                );
                self.settle_failure(&delivery).await;
                return;
            }
        };

        let budget = Duration::from_secs(u64::from(envelope.timeout));
        let content = envelope.content().unwrap_or_default();

        tracing::info!(
            id = %envelope.id,
            task = %envelope.task,
            queue = %delivery.queue,
            attempt = delivery.tries,
            timeout_secs = envelope.timeout,
            "processing envelope"
        );

        match run_with_deadline(handler.as_ref(), content, &envelope.metadata, budget).await {
            Outcome::Completed { elapsed } => {
                tracing::info!(
                    id = %envelope.id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "envelope processed"
                );
                if let Err(error) = self.transport.ack(&delivery).await {
                    tracing::error!(id = %envelope.id, %error, "ack failed");
                }
            }
            Outcome::TimedOut { elapsed, budget } => {
                tracing::warn!(
                    id = %envelope.id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = budget.as_millis() as u64,
                    body = %String::from_utf8_lossy(&delivery.body),
                    "processing exceeded its deadline"
                );
                self.settle_failure(&delivery).await;
            }
            Outcome::Failed { error } => {
                tracing::error!(
                    id = %envelope.id,
                    %error,
                    body = %String::from_utf8_lossy(&delivery.body),
                    "handler failed"
                );
                self.settle_failure(&delivery).await;
            }
        }
    }

    /// Rejects a failed delivery: back on the queue while attempts remain,
    /// dropped once they are exhausted.
    async fn settle_failure(&self, delivery: &Delivery) {
        let result = if delivery.tries >= self.max_deliveries {
            tracing::warn!(
                queue = %delivery.queue,
                tag = delivery.id,
                tries = delivery.tries,
                "delivery attempts exhausted, dropping envelope"
            );
            self.transport.reject(delivery).await
        } else {
            self.transport.requeue(delivery).await
        };

        if let Err(error) = result {
            tracing::error!(queue = %delivery.queue, tag = delivery.id, %error, "settle failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SleepyHandler {
        sleep: Duration,
    }

    #[async_trait]
    impl Handler for SleepyHandler {
        async fn handle(
            &self,
            _content: &str,
            _metadata: &HashMap<String, serde_json::Value>,
        ) -> eyre::Result<()> {
            tokio::time::sleep(self.sleep).await;
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl Handler for FailingHandler {
        async fn handle(
            &self,
            _content: &str,
            _metadata: &HashMap<String, serde_json::Value>,
        ) -> eyre::Result<()> {
            eyre::bail!("boom")
        }
    }

    #[tokio::test]
    async fn fast_handler_completes() {
        let handler = SleepyHandler {
            sleep: Duration::from_millis(5),
        };
        let outcome = run_with_deadline(
            &handler,
            "ping",
            &HashMap::new(),
            Duration::from_millis(200),
        )
        .await;

        assert!(matches!(outcome, Outcome::Completed { .. }));
    }

    #[tokio::test]
    async fn slow_handler_times_out_even_on_success() {
        let handler = SleepyHandler {
            sleep: Duration::from_millis(60),
        };
        let outcome =
            run_with_deadline(&handler, "ping", &HashMap::new(), Duration::from_millis(10)).await;

        assert!(matches!(outcome, Outcome::TimedOut { .. }));
    }

    #[tokio::test]
    async fn failing_handler_reports_failure() {
        let outcome = run_with_deadline(
            &FailingHandler,
            "ping",
            &HashMap::new(),
            Duration::from_millis(200),
        )
        .await;

        assert!(matches!(outcome, Outcome::Failed { .. }));
    }

    #[test]
    fn registry_resolves_bound_channels_only() {
        let registry = HandlerRegistry::new().bind(
            ChannelType::Sms,
            Arc::new(SleepyHandler {
                sleep: Duration::ZERO,
            }),
        );

        assert!(registry.resolve(ChannelType::Sms).is_ok());
        assert!(registry.resolve(ChannelType::Email).is_err());
    }
}
