//! Compliance Job Repository
//!
//! Handles all database operations related to compliance jobs.

use compliance_core::domain::job::{ComplianceJob, ComplianceJobStatus};
use compliance_core::domain::runner::RunnerStatus;
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use super::decode_status;

const JOB_COLUMNS: &str =
    "id, benchmark_id, status, is_stack, failure_message, created_at, updated_at";

/// Insert a new job; used inside the job + runners transaction
pub async fn insert(conn: &mut PgConnection, job: &ComplianceJob) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO compliance_jobs (id, benchmark_id, status, is_stack, failure_message, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(job.id)
    .bind(&job.benchmark_id)
    .bind(job.status.as_str())
    .bind(job.is_stack)
    .bind(&job.failure_message)
    .bind(job.created_at)
    .bind(job.updated_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Find a job by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<ComplianceJob>, sqlx::Error> {
    let row = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {} FROM compliance_jobs WHERE id = $1",
        JOB_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(ComplianceJob::try_from).transpose()
}

/// Most recently created job of a benchmark
pub async fn find_latest_by_benchmark(
    pool: &PgPool,
    benchmark_id: &str,
) -> Result<Option<ComplianceJob>, sqlx::Error> {
    let row = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {} FROM compliance_jobs WHERE benchmark_id = $1 ORDER BY created_at DESC LIMIT 1",
        JOB_COLUMNS
    ))
    .bind(benchmark_id)
    .fetch_optional(pool)
    .await?;

    row.map(ComplianceJob::try_from).transpose()
}

/// Find jobs by status
pub async fn find_by_status(
    pool: &PgPool,
    status: ComplianceJobStatus,
) -> Result<Vec<ComplianceJob>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {} FROM compliance_jobs WHERE status = $1 ORDER BY created_at ASC",
        JOB_COLUMNS
    ))
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ComplianceJob::try_from).collect()
}

/// Jobs still in `Created` whose runners have all settled
///
/// A failed runner that will still be retried keeps its job out of the list.
pub async fn find_with_runners_completed(
    pool: &PgPool,
    max_runner_retries: i32,
) -> Result<Vec<ComplianceJob>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(&format!(
        r#"
        SELECT {} FROM compliance_jobs j
        WHERE j.status = $1
          AND NOT EXISTS (
            SELECT 1 FROM compliance_runners r
            WHERE r.parent_job_id = j.id
              AND (
                r.status NOT IN ($2, $3, $4)
                OR (r.status IN ($3, $4) AND r.retry_count < $5)
              )
          )
        ORDER BY j.created_at ASC
        "#,
        JOB_COLUMNS
    ))
    .bind(ComplianceJobStatus::Created.as_str())
    .bind(RunnerStatus::Succeeded.as_str())
    .bind(RunnerStatus::Failed.as_str())
    .bind(RunnerStatus::TimedOut.as_str())
    .bind(max_runner_retries)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ComplianceJob::try_from).collect()
}

/// Move a job to `status` if the lifecycle allows it
///
/// Returns false when the job is missing or the transition is not allowed
/// from its current status.
pub async fn update_status<'e>(
    executor: impl PgExecutor<'e>,
    id: Uuid,
    status: ComplianceJobStatus,
    failure_message: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let now = chrono::Utc::now();
    let predecessors: Vec<&str> = ComplianceJobStatus::ALL
        .iter()
        .filter(|from| from.can_transition_to(status))
        .map(|from| from.as_str())
        .collect();

    let result = sqlx::query(
        r#"
        UPDATE compliance_jobs
        SET status = $1, failure_message = COALESCE($2, failure_message), updated_at = $3
        WHERE id = $4 AND status = ANY($5)
        "#,
    )
    .bind(status.as_str())
    .bind(failure_message)
    .bind(now)
    .bind(id)
    .bind(&predecessors)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    benchmark_id: String,
    status: String,
    is_stack: bool,
    failure_message: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<JobRow> for ComplianceJob {
    type Error = sqlx::Error;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(ComplianceJob {
            id: row.id,
            benchmark_id: row.benchmark_id,
            status: decode_status(&row.status)?,
            is_stack: row.is_stack,
            failure_message: row.failure_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
