//! Compliance Runner Repository
//!
//! Handles all database operations related to compliance runners.

use chrono::{DateTime, Utc};
use compliance_core::domain::job::ComplianceJobStatus;
use compliance_core::domain::runner::{Caller, ComplianceRunner, RunnerStatus};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::decode_status;

const RUNNER_COLUMNS: &str = "id, parent_job_id, benchmark_id, query_id, connection_id, \
    resource_collection_id, status, retry_count, started_at, failure_message, \
    total_findings_count, callers, created_at, updated_at";

/// Rows per INSERT statement; keeps bind parameters under the Postgres limit
const INSERT_CHUNK: usize = 1000;

/// Bulk insert runners; used inside the job + runners transaction
pub async fn insert_many(
    conn: &mut PgConnection,
    runners: &[ComplianceRunner],
) -> Result<(), sqlx::Error> {
    for chunk in runners.chunks(INSERT_CHUNK) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO compliance_runners ({}) ",
            RUNNER_COLUMNS
        ));

        builder.push_values(chunk, |mut row, runner| {
            row.push_bind(runner.id)
                .push_bind(runner.parent_job_id)
                .push_bind(&runner.benchmark_id)
                .push_bind(&runner.query_id)
                .push_bind(&runner.connection_id)
                .push_bind(&runner.resource_collection_id)
                .push_bind(runner.status.as_str())
                .push_bind(runner.retry_count)
                .push_bind(runner.started_at)
                .push_bind(&runner.failure_message)
                .push_bind(runner.total_findings_count)
                .push_bind(Json(&runner.callers))
                .push_bind(runner.created_at)
                .push_bind(runner.updated_at);
        });

        builder.build().execute(&mut *conn).await?;
    }

    Ok(())
}

/// Delete every runner of a job
pub async fn delete_by_job(pool: &PgPool, job_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM compliance_runners WHERE parent_job_id = $1")
        .bind(job_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Find a runner by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<ComplianceRunner>, sqlx::Error> {
    let row = sqlx::query_as::<_, RunnerRow>(&format!(
        "SELECT {} FROM compliance_runners WHERE id = $1",
        RUNNER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(ComplianceRunner::try_from).transpose()
}

/// Oldest runners in a given status, at most `limit`
pub async fn find_by_status(
    pool: &PgPool,
    status: RunnerStatus,
    limit: i64,
) -> Result<Vec<ComplianceRunner>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RunnerRow>(&format!(
        "SELECT {} FROM compliance_runners WHERE status = $1 ORDER BY created_at ASC LIMIT $2",
        RUNNER_COLUMNS
    ))
    .bind(status.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ComplianceRunner::try_from).collect()
}

/// All runners of a job
pub async fn find_by_job(pool: &PgPool, job_id: Uuid) -> Result<Vec<ComplianceRunner>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RunnerRow>(&format!(
        "SELECT {} FROM compliance_runners WHERE parent_job_id = $1 ORDER BY created_at ASC",
        RUNNER_COLUMNS
    ))
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ComplianceRunner::try_from).collect()
}

/// Update runner status, optionally recording a failure message
pub async fn update_status(
    pool: &PgPool,
    id: Uuid,
    status: RunnerStatus,
    failure_message: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE compliance_runners
        SET status = $1, failure_message = $2, updated_at = $3
        WHERE id = $4
        "#,
    )
    .bind(status.as_str())
    .bind(failure_message)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Record a worker report
///
/// `started_at` is only set the first time a worker reports progress.
pub async fn update_result(
    pool: &PgPool,
    id: Uuid,
    status: RunnerStatus,
    failure_message: Option<&str>,
    total_findings_count: Option<i64>,
) -> Result<bool, sqlx::Error> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        UPDATE compliance_runners
        SET status = $1,
            failure_message = $2,
            total_findings_count = COALESCE($3, total_findings_count),
            started_at = COALESCE(started_at, $4),
            updated_at = $4
        WHERE id = $5
        "#,
    )
    .bind(status.as_str())
    .bind(failure_message)
    .bind(total_findings_count)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Time out queued or running runners not updated since `cutoff`
pub async fn mark_timed_out(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE compliance_runners
        SET status = $1, failure_message = 'runner timed out', updated_at = $2
        WHERE status IN ($3, $4) AND updated_at < $5
        "#,
    )
    .bind(RunnerStatus::TimedOut.as_str())
    .bind(Utc::now())
    .bind(RunnerStatus::Queued.as_str())
    .bind(RunnerStatus::InProgress.as_str())
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Reset failed or timed out runners with retries left back to `Created`
///
/// Only runners of jobs that are still collecting results are retried.
pub async fn reset_failed_for_retry(pool: &PgPool, max_retries: i32) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE compliance_runners r
        SET status = $1, retry_count = r.retry_count + 1,
            failure_message = NULL, started_at = NULL, updated_at = $2
        WHERE r.status IN ($3, $4)
          AND r.retry_count < $5
          AND EXISTS (
            SELECT 1 FROM compliance_jobs j
            WHERE j.id = r.parent_job_id AND j.status = $6
          )
        "#,
    )
    .bind(RunnerStatus::Created.as_str())
    .bind(Utc::now())
    .bind(RunnerStatus::Failed.as_str())
    .bind(RunnerStatus::TimedOut.as_str())
    .bind(max_retries)
    .bind(ComplianceJobStatus::Created.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Expected finding count and most recent runner update of a job
pub async fn job_stats(
    pool: &PgPool,
    job_id: Uuid,
) -> Result<(i64, Option<DateTime<Utc>>), sqlx::Error> {
    let row: (i64, Option<DateTime<Utc>>) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(total_findings_count), 0)::BIGINT, MAX(updated_at)
        FROM compliance_runners
        WHERE parent_job_id = $1
        "#,
    )
    .bind(job_id)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct RunnerRow {
    id: Uuid,
    parent_job_id: Uuid,
    benchmark_id: String,
    query_id: String,
    connection_id: Option<String>,
    resource_collection_id: Option<String>,
    status: String,
    retry_count: i32,
    started_at: Option<DateTime<Utc>>,
    failure_message: Option<String>,
    total_findings_count: Option<i64>,
    callers: Json<Vec<Caller>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RunnerRow> for ComplianceRunner {
    type Error = sqlx::Error;

    fn try_from(row: RunnerRow) -> Result<Self, Self::Error> {
        Ok(ComplianceRunner {
            id: row.id,
            parent_job_id: row.parent_job_id,
            benchmark_id: row.benchmark_id,
            query_id: row.query_id,
            connection_id: row.connection_id,
            resource_collection_id: row.resource_collection_id,
            status: decode_status(&row.status)?,
            retry_count: row.retry_count,
            started_at: row.started_at,
            failure_message: row.failure_message,
            total_findings_count: row.total_findings_count,
            callers: row.callers.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
