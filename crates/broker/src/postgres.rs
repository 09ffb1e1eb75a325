use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    BrokerError, Checkpoint, Headers, Offset, PartitionPosition, ProducerRecord, Record,
    RecordMetadata, Result,
    broker::{MessageBroker, partition_for_key},
    topic::TopicSpec,
};

/// PostgreSQL-backed partitioned log.
///
/// Offsets are assigned inside the publishing transaction while holding a
/// transaction-scoped advisory lock on `(topic, partition)`, so concurrent
/// producers never race for the same offset.
#[derive(Clone)]
pub struct PostgresBroker {
    pool: PgPool,
    round_robin: Arc<AtomicU32>,
}

impl PostgresBroker {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            round_robin: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("broker migrations applied");
        Ok(())
    }

    /// Provisions a topic. Existing topics keep their partition count.
    pub async fn ensure_topic(&self, topic: TopicSpec) -> Result<()> {
        sqlx::query(
            "INSERT INTO topics (name, partitions) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING",
        )
        .bind(topic.name)
        .bind(topic.partitions as i32)
        .execute(&self.pool)
        .await?;
        tracing::debug!(topic = topic.name, partitions = topic.partitions, "topic provisioned");
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<Record> {
        let headers_json: serde_json::Value = row.try_get("headers")?;
        let headers: Headers = serde_json::from_value(headers_json)?;

        Ok(Record {
            topic: row.try_get("topic")?,
            partition: row.try_get::<i32, _>("partition_id")? as u32,
            offset: Offset::new(row.try_get("record_offset")?),
            key: row.try_get("record_key")?,
            headers,
            timestamp: row.try_get("timestamp")?,
            payload: row.try_get("payload")?,
        })
    }

    async fn check_partition(&self, topic: &str, partition: u32) -> Result<()> {
        let partitions = self.partition_count(topic).await?;
        if partition >= partitions {
            return Err(BrokerError::UnknownPartition {
                topic: topic.to_string(),
                partition,
                partitions,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for PostgresBroker {
    async fn publish(&self, record: ProducerRecord) -> Result<RecordMetadata> {
        let mut tx = self.pool.begin().await?;

        let partitions: Option<i32> =
            sqlx::query_scalar("SELECT partitions FROM topics WHERE name = $1")
                .bind(&record.topic)
                .fetch_optional(&mut *tx)
                .await?;
        let partitions = partitions.ok_or_else(|| BrokerError::UnknownTopic(record.topic.clone()))?
            as u32;

        let partition = match &record.key {
            Some(key) => partition_for_key(key, partitions),
            None => self.round_robin.fetch_add(1, Ordering::Relaxed) % partitions,
        };

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1), $2)")
            .bind(&record.topic)
            .bind(partition as i32)
            .execute(&mut *tx)
            .await?;

        let offset: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(record_offset) + 1, 0) FROM records WHERE topic = $1 AND partition_id = $2",
        )
        .bind(&record.topic)
        .bind(partition as i32)
        .fetch_one(&mut *tx)
        .await?;

        let timestamp = record.timestamp.unwrap_or_else(chrono::Utc::now);
        let headers_json = serde_json::to_value(&record.headers)?;

        sqlx::query(
            r#"
            INSERT INTO records (topic, partition_id, record_offset, record_key, headers, timestamp, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&record.topic)
        .bind(partition as i32)
        .bind(offset)
        .bind(&record.key)
        .bind(headers_json)
        .bind(timestamp)
        .bind(&record.payload)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        metrics::counter!("broker_records_published_total", "topic" => record.topic.clone())
            .increment(1);

        Ok(RecordMetadata {
            topic: record.topic,
            partition,
            offset: Offset::new(offset),
            timestamp,
        })
    }

    async fn partition_count(&self, topic: &str) -> Result<u32> {
        let partitions: Option<i32> =
            sqlx::query_scalar("SELECT partitions FROM topics WHERE name = $1")
                .bind(topic)
                .fetch_optional(&self.pool)
                .await?;
        partitions
            .map(|p| p as u32)
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))
    }

    async fn fetch(
        &self,
        topic: &str,
        partition: u32,
        from: Offset,
        max_records: usize,
    ) -> Result<Vec<Record>> {
        self.check_partition(topic, partition).await?;

        let rows = sqlx::query(
            r#"
            SELECT topic, partition_id, record_offset, record_key, headers, timestamp, payload
            FROM records
            WHERE topic = $1 AND partition_id = $2 AND record_offset >= $3
            ORDER BY record_offset ASC
            LIMIT $4
            "#,
        )
        .bind(topic)
        .bind(partition as i32)
        .bind(from.as_i64())
        .bind(max_records as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn end_offset(&self, topic: &str, partition: u32) -> Result<Offset> {
        self.check_partition(topic, partition).await?;

        let end: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(record_offset) + 1, 0) FROM records WHERE topic = $1 AND partition_id = $2",
        )
        .bind(topic)
        .bind(partition as i32)
        .fetch_one(&self.pool)
        .await?;
        Ok(Offset::new(end))
    }

    async fn committed_offset(&self, group: &str, topic: &str, partition: u32) -> Result<Offset> {
        let next: Option<i64> = sqlx::query_scalar(
            "SELECT next_offset FROM consumer_offsets WHERE group_id = $1 AND topic = $2 AND partition_id = $3",
        )
        .bind(group)
        .bind(topic)
        .bind(partition as i32)
        .fetch_optional(&self.pool)
        .await?;
        Ok(next.map(Offset::new).unwrap_or_default())
    }

    async fn commit(&self, group: &str, topic: &str, partition: u32, next: Offset) -> Result<()> {
        self.check_partition(topic, partition).await?;

        sqlx::query(
            r#"
            INSERT INTO consumer_offsets (group_id, topic, partition_id, next_offset, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (group_id, topic, partition_id)
            DO UPDATE SET next_offset = EXCLUDED.next_offset, updated_at = NOW()
            "#,
        )
        .bind(group)
        .bind(topic)
        .bind(partition as i32)
        .bind(next.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<()> {
        let positions = serde_json::to_value(&checkpoint.positions)?;

        sqlx::query(
            r#"
            INSERT INTO checkpoints (name, positions, timestamp, state)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name)
            DO UPDATE SET positions = EXCLUDED.positions, timestamp = EXCLUDED.timestamp, state = EXCLUDED.state
            "#,
        )
        .bind(&checkpoint.name)
        .bind(positions)
        .bind(checkpoint.timestamp)
        .bind(&checkpoint.state)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_checkpoint(&self, name: &str) -> Result<Option<Checkpoint>> {
        let row = sqlx::query("SELECT name, positions, timestamp, state FROM checkpoints WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let positions: serde_json::Value = row.try_get("positions")?;
                let positions: Vec<PartitionPosition> = serde_json::from_value(positions)?;
                Ok(Some(Checkpoint {
                    name: row.try_get("name")?,
                    positions,
                    timestamp: row.try_get("timestamp")?,
                    state: row.try_get("state")?,
                }))
            }
            None => Ok(None),
        }
    }
}
