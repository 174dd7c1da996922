use std::sync::Arc;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::Error;
use crate::topology;
use crate::transport::sqlite::{QueueStatistics, SqliteTransport};
use crate::transport::Transport;

/// Publish-side application state: the durable transport plus the dispatcher
/// layered on it. Topology is declared on connect, so a freshly constructed
/// service can publish immediately.
pub struct Service {
    transport: Arc<SqliteTransport>,
    dispatcher: Dispatcher,
}

impl Service {
    pub async fn connect() -> eyre::Result<Self> {
        Self::connect_with(Config::default()).await
    }

    pub async fn connect_with(config: Config) -> eyre::Result<Self> {
        let transport = Arc::new(SqliteTransport::connect(&config).await?);

        topology::ensure_declared(transport.as_ref()).await?;

        let dispatcher = Dispatcher::new(transport.clone() as Arc<dyn Transport>);

        Ok(Self {
            transport,
            dispatcher,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn transport(&self) -> &Arc<SqliteTransport> {
        &self.transport
    }

    pub async fn statistics(&self) -> Result<Vec<QueueStatistics>, Error> {
        self.transport.statistics().await
    }
}
