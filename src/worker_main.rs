use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use strum::IntoEnumIterator;

use courier::config::Config;
use courier::message::ChannelType;
use courier::topology::{self, QueueKey};
use courier::transport::sqlite::SqliteTransport;
use courier::transport::Transport;
use courier::worker::{Handler, HandlerRegistry, WorkerExecutor};

/// Default handler: logs the message for its channel.
struct LogHandler {
    channel: ChannelType,
}

#[async_trait]
impl Handler for LogHandler {
    async fn handle(
        &self,
        content: &str,
        metadata: &HashMap<String, serde_json::Value>,
    ) -> eyre::Result<()> {
        tracing::info!(channel = %self.channel, %content, ?metadata, "handling message");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    courier::init_tracing()?;

    let config = Config::load()?;

    let transport = Arc::new(SqliteTransport::connect(&config).await?);

    topology::ensure_declared(transport.as_ref()).await?;

    let mut registry = HandlerRegistry::new();
    for channel in ChannelType::iter() {
        registry = registry.bind(channel, Arc::new(LogHandler { channel }));
    }
    let registry = Arc::new(registry);

    // One executor per channel, each serving that channel's three priority
    // queues with a prefetch of one.
    let executors: Vec<_> = ChannelType::iter()
        .map(|channel| {
            let keys: Vec<QueueKey> = QueueKey::all()
                .into_iter()
                .filter(|key| key.channel == channel)
                .collect();

            WorkerExecutor::builder()
                .transport(transport.clone() as Arc<dyn Transport>)
                .registry(registry.clone())
                .keys(keys)
                .consumer(format!("{channel}-worker-{}", std::process::id()))
                .build()
        })
        .collect();

    let tasks = executors.into_iter().map(|executor| {
        tokio::spawn(async move {
            if let Err(error) = executor.run().await {
                tracing::error!(%error, "executor stopped");
            }
        })
    });

    tokio::select! {
        _ = join_all(tasks) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    Ok(())
}
