//! Postgres message queue (pgmq) gateway
//!
//! Each topic is a pgmq queue. Idempotency keys are recorded in
//! `queue_idempotency_keys` inside the same transaction as the send, so a
//! redelivered produce with the same key never writes a second message.

use async_trait::async_trait;
use serde_json::json;
use sqlx::PgPool;

use super::{JobQueue, ProduceOutcome, QueueError};

#[derive(Debug, Clone)]
pub struct PgmqQueue {
    pool: PgPool,
}

impl PgmqQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the pgmq extension and one queue per topic if missing
    pub async fn ensure_topics(&self, topics: &[&str]) -> Result<(), QueueError> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS pgmq")
            .execute(&self.pool)
            .await?;

        for topic in topics {
            sqlx::query("SELECT pgmq.create($1)")
                .bind(topic)
                .execute(&self.pool)
                .await?;
            tracing::info!("Queue ready: {}", topic);
        }

        Ok(())
    }
}

#[async_trait]
impl JobQueue for PgmqQueue {
    async fn produce(
        &self,
        topic: &str,
        payload: serde_json::Value,
        idempotency_key: &str,
    ) -> Result<ProduceOutcome, QueueError> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            r#"
            INSERT INTO queue_idempotency_keys (topic, idempotency_key, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (topic, idempotency_key) DO NOTHING
            "#,
        )
        .bind(topic)
        .bind(idempotency_key)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            let message_id: Option<i64> = sqlx::query_scalar(
                "SELECT message_id FROM queue_idempotency_keys WHERE topic = $1 AND idempotency_key = $2",
            )
            .bind(topic)
            .bind(idempotency_key)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            tracing::debug!(topic, idempotency_key, "Duplicate produce acknowledged");
            return Ok(ProduceOutcome::Duplicate { message_id });
        }

        let envelope = json!({
            "idempotency_key": idempotency_key,
            "payload": payload,
        });

        let message_id: i64 = sqlx::query_scalar("SELECT * FROM pgmq.send($1, $2)")
            .bind(topic)
            .bind(&envelope)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE queue_idempotency_keys SET message_id = $1 WHERE topic = $2 AND idempotency_key = $3",
        )
        .bind(message_id)
        .bind(topic)
        .bind(idempotency_key)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(topic, idempotency_key, message_id, "Produced message");
        Ok(ProduceOutcome::Enqueued { message_id })
    }
}
