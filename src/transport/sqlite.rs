//! SQLite-backed durable transport.
//!
//! Queues are rows; envelopes are rows leased to consumers. A received
//! envelope carries a lease of its processing budget plus a grace period;
//! a consumer that vanishes without acking leaves the lease to lapse, after
//! which the envelope becomes deliverable again with its attempt counter
//! bumped. Envelopes that wait past their wire expiration without being
//! delivered at all are dropped at receive time (the queueing deadline,
//! distinct from the executor's processing deadline).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{
    prelude::FromRow,
    sqlite::{
        SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqliteLockingMode,
        SqlitePoolOptions,
    },
    SqlitePool,
};
use tokio_stream::StreamExt;

use crate::config::Config;
use crate::envelope::DeliveryProperties;
use crate::error::Error;
use crate::transport::{Delivery, Transport};

/// Slack added to an envelope's processing budget before its lease is
/// considered lost.
const DEFAULT_LEASE_GRACE_MS: i64 = 5_000;

/// Lease window for envelopes published without an expiration.
const DEFAULT_LEASE_MS: i64 = 30_000;

#[derive(Clone)]
pub struct SqliteTransport {
    db: SqlitePool,
    lease_grace_ms: i64,
}

/// Per-queue depth, reported by the stats endpoint.
#[derive(Serialize, Deserialize, FromRow, Debug, PartialEq, Eq)]
pub struct QueueStatistics {
    pub queue: String,
    pub pending: i64,
    pub in_flight: i64,
}

#[derive(FromRow)]
struct ReadyRow {
    id: i64,
    body: Vec<u8>,
    expiration_ms: Option<i64>,
    tries: u32,
}

impl SqliteTransport {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let opts = if let Some(path) = config.db_path() {
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
        } else {
            SqliteConnectOptions::new().in_memory(true)
        }
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .locking_mode(SqliteLockingMode::Normal)
        .optimize_on_close(true, None)
        .auto_vacuum(SqliteAutoVacuum::Full);

        let pool_opts = if config.db_path().is_none() {
            // a pooled in-memory database is one database per connection
            SqlitePoolOptions::new().max_connections(1)
        } else {
            SqlitePoolOptions::new()
        };

        let pool = pool_opts.connect_with(opts).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            db: pool,
            lease_grace_ms: DEFAULT_LEASE_GRACE_MS,
        })
    }

    /// Overrides the lease grace period. Mainly for tests that need lapsed
    /// leases without waiting out the default slack.
    pub fn with_lease_grace_ms(mut self, grace_ms: i64) -> Self {
        self.lease_grace_ms = grace_ms;
        self
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    pub async fn statistics(&self) -> Result<Vec<QueueStatistics>, Error> {
        let mut conn = self.db.acquire().await?;

        let mut stream = sqlx::query_as(
            "SELECT q.name AS queue,
                    COALESCE(SUM(CASE WHEN m.status = 'pending' AND m.leased_by IS NULL THEN 1 ELSE 0 END), 0) AS pending,
                    COALESCE(SUM(CASE WHEN m.status = 'pending' AND m.leased_by IS NOT NULL THEN 1 ELSE 0 END), 0) AS in_flight
             FROM queues q
             LEFT JOIN messages m ON m.queue = q.id
             GROUP BY q.id
             ORDER BY q.name",
        )
        .fetch(&mut *conn);

        let mut stats = Vec::new();

        while let Some(res) = stream.next().await.transpose()? {
            stats.push(res);
        }

        Ok(stats)
    }

    async fn queue_id(&self, name: &str) -> Result<i64, Error> {
        sqlx::query_scalar("SELECT id FROM queues WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| Error::queue_not_found(name))
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[async_trait]
impl Transport for SqliteTransport {
    async fn declare_queue(&self, name: &str) -> Result<(), Error> {
        sqlx::query("INSERT INTO queues (name, created_at) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .bind(Self::now_ms())
            .execute(&self.db)
            .await?;

        Ok(())
    }

    async fn publish(
        &self,
        queue: &str,
        body: &[u8],
        props: &DeliveryProperties,
    ) -> Result<(), Error> {
        let queue_id = self.queue_id(queue).await?;

        sqlx::query(
            "INSERT INTO messages (queue, body, priority, enqueued_at, expiration_ms)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(queue_id)
        .bind(body)
        .bind(i64::from(props.priority))
        .bind(Self::now_ms())
        .bind(props.expiration_ms as i64)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn receive(&self, queue: &str, consumer: &str) -> Result<Option<Delivery>, Error> {
        let queue_id = self.queue_id(queue).await?;
        let now = Self::now_ms();

        let mut tx = self.db.begin().await?;

        // Queueing deadline: drop envelopes that were never delivered in time.
        // Applies only before the first delivery; a requeued envelope is past
        // this deadline's jurisdiction.
        sqlx::query(
            "UPDATE messages SET status = 'expired'
             WHERE queue = $1 AND status = 'pending' AND leased_by IS NULL AND tries = 0
               AND expiration_ms IS NOT NULL AND enqueued_at + expiration_ms < $2",
        )
        .bind(queue_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // Worker loss: lapsed leases go back on the queue, never silently away.
        sqlx::query(
            "UPDATE messages SET leased_by = NULL, lease_expires_at = NULL
             WHERE queue = $1 AND status = 'pending'
               AND leased_by IS NOT NULL AND lease_expires_at < $2",
        )
        .bind(queue_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let row: Option<ReadyRow> = sqlx::query_as(
            "SELECT id, body, expiration_ms, tries FROM messages
             WHERE queue = $1 AND status = 'pending' AND leased_by IS NULL
             ORDER BY priority DESC, id ASC
             LIMIT 1",
        )
        .bind(queue_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let lease_ms = row.expiration_ms.unwrap_or(DEFAULT_LEASE_MS) + self.lease_grace_ms;

        sqlx::query(
            "UPDATE messages SET leased_by = $1, lease_expires_at = $2, tries = tries + 1
             WHERE id = $3",
        )
        .bind(consumer)
        .bind(now + lease_ms)
        .bind(row.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(Delivery {
            id: row.id,
            queue: queue.to_owned(),
            consumer: consumer.to_owned(),
            body: row.body,
            tries: row.tries + 1,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), Error> {
        // Guarded by holder so a stale consumer cannot ack a re-leased envelope.
        sqlx::query(
            "UPDATE messages SET status = 'delivered', delivered_at = $1,
                    leased_by = NULL, lease_expires_at = NULL
             WHERE id = $2 AND leased_by = $3 AND status = 'pending'",
        )
        .bind(Self::now_ms())
        .bind(delivery.id)
        .bind(&delivery.consumer)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn requeue(&self, delivery: &Delivery) -> Result<(), Error> {
        sqlx::query(
            "UPDATE messages SET leased_by = NULL, lease_expires_at = NULL
             WHERE id = $1 AND leased_by = $2 AND status = 'pending'",
        )
        .bind(delivery.id)
        .bind(&delivery.consumer)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn reject(&self, delivery: &Delivery) -> Result<(), Error> {
        sqlx::query(
            "UPDATE messages SET status = 'failed', leased_by = NULL, lease_expires_at = NULL
             WHERE id = $1 AND leased_by = $2 AND status = 'pending'",
        )
        .bind(delivery.id)
        .bind(&delivery.consumer)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
