use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create compliance jobs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS compliance_jobs (
            id UUID PRIMARY KEY,
            benchmark_id VARCHAR(255) NOT NULL,
            status VARCHAR(50) NOT NULL,
            is_stack BOOLEAN NOT NULL DEFAULT FALSE,
            failure_message TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create runners table; one row per query execution target
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS compliance_runners (
            id UUID PRIMARY KEY,
            parent_job_id UUID NOT NULL REFERENCES compliance_jobs(id) ON DELETE CASCADE,
            benchmark_id VARCHAR(255) NOT NULL,
            query_id VARCHAR(255) NOT NULL,
            connection_id VARCHAR(255),
            resource_collection_id VARCHAR(255),
            status VARCHAR(50) NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            started_at TIMESTAMPTZ,
            failure_message TEXT,
            total_findings_count BIGINT,
            callers JSONB NOT NULL DEFAULT '[]',
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_compliance_runners_target
        ON compliance_runners (
            parent_job_id,
            query_id,
            COALESCE(connection_id, ''),
            COALESCE(resource_collection_id, '')
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create summarizers table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS compliance_summarizers (
            id UUID PRIMARY KEY,
            benchmark_id VARCHAR(255) NOT NULL,
            parent_job_id UUID REFERENCES compliance_jobs(id) ON DELETE CASCADE,
            status VARCHAR(50) NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            started_at TIMESTAMPTZ,
            failure_message TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create job sequencers table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_sequencers (
            id UUID PRIMARY KEY,
            dependency_kind VARCHAR(50) NOT NULL,
            dependency_ids JSONB NOT NULL DEFAULT '[]',
            next_job_kind VARCHAR(50) NOT NULL,
            next_job_ids JSONB NOT NULL DEFAULT '[]',
            status VARCHAR(50) NOT NULL,
            dispatched_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Idempotency keys of produced queue messages
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queue_idempotency_keys (
            topic VARCHAR(255) NOT NULL,
            idempotency_key VARCHAR(255) NOT NULL,
            message_id BIGINT,
            created_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (topic, idempotency_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for the lifecycle queries
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_compliance_jobs_benchmark ON compliance_jobs(benchmark_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_compliance_jobs_status ON compliance_jobs(status)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_compliance_runners_job ON compliance_runners(parent_job_id, status)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_compliance_runners_status ON compliance_runners(status, updated_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_compliance_summarizers_job ON compliance_summarizers(parent_job_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_job_sequencers_status ON job_sequencers(status)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
