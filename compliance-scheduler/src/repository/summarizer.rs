//! Compliance Summarizer Repository

use chrono::{DateTime, Utc};
use compliance_core::domain::summarizer::{ComplianceSummarizer, SummarizerStatus};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::decode_status;

const SUMMARIZER_COLUMNS: &str = "id, benchmark_id, parent_job_id, status, retry_count, \
    started_at, failure_message, created_at, updated_at";

/// Insert a new summarizer
pub async fn insert<'e>(
    executor: impl PgExecutor<'e>,
    summarizer: &ComplianceSummarizer,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO compliance_summarizers ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        SUMMARIZER_COLUMNS
    ))
    .bind(summarizer.id)
    .bind(&summarizer.benchmark_id)
    .bind(summarizer.parent_job_id)
    .bind(summarizer.status.as_str())
    .bind(summarizer.retry_count)
    .bind(summarizer.started_at)
    .bind(&summarizer.failure_message)
    .bind(summarizer.created_at)
    .bind(summarizer.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Find a summarizer by ID
pub async fn find_by_id(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<ComplianceSummarizer>, sqlx::Error> {
    let row = sqlx::query_as::<_, SummarizerRow>(&format!(
        "SELECT {} FROM compliance_summarizers WHERE id = $1",
        SUMMARIZER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(ComplianceSummarizer::try_from).transpose()
}

/// Find summarizers by status
pub async fn find_by_status(
    pool: &PgPool,
    status: SummarizerStatus,
) -> Result<Vec<ComplianceSummarizer>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SummarizerRow>(&format!(
        "SELECT {} FROM compliance_summarizers WHERE status = $1 ORDER BY created_at ASC",
        SUMMARIZER_COLUMNS
    ))
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ComplianceSummarizer::try_from).collect()
}

/// All summarizers of a compliance job
pub async fn find_by_job(
    pool: &PgPool,
    job_id: Uuid,
) -> Result<Vec<ComplianceSummarizer>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SummarizerRow>(&format!(
        "SELECT {} FROM compliance_summarizers WHERE parent_job_id = $1 ORDER BY created_at ASC",
        SUMMARIZER_COLUMNS
    ))
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ComplianceSummarizer::try_from).collect()
}

/// Update summarizer status
///
/// Moving to `InProgress` stamps `started_at`.
pub async fn update_status(
    pool: &PgPool,
    id: Uuid,
    status: SummarizerStatus,
    failure_message: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        UPDATE compliance_summarizers
        SET status = $1,
            failure_message = $2,
            started_at = CASE WHEN $1 = $3 THEN $4 ELSE started_at END,
            updated_at = $4
        WHERE id = $5
        "#,
    )
    .bind(status.as_str())
    .bind(failure_message)
    .bind(SummarizerStatus::InProgress.as_str())
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Fail in-progress summarizers not updated since `cutoff`
pub async fn mark_timed_out(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE compliance_summarizers
        SET status = $1, failure_message = 'summarizer timed out', updated_at = $2
        WHERE status = $3 AND updated_at < $4
        "#,
    )
    .bind(SummarizerStatus::Failed.as_str())
    .bind(Utc::now())
    .bind(SummarizerStatus::InProgress.as_str())
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Reset failed summarizers with retries left back to `Created`
pub async fn reset_failed_for_retry(pool: &PgPool, max_retries: i32) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE compliance_summarizers
        SET status = $1, retry_count = retry_count + 1, failure_message = NULL, updated_at = $2
        WHERE status = $3 AND retry_count < $4
        "#,
    )
    .bind(SummarizerStatus::Created.as_str())
    .bind(Utc::now())
    .bind(SummarizerStatus::Failed.as_str())
    .bind(max_retries)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct SummarizerRow {
    id: Uuid,
    benchmark_id: String,
    parent_job_id: Option<Uuid>,
    status: String,
    retry_count: i32,
    started_at: Option<DateTime<Utc>>,
    failure_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SummarizerRow> for ComplianceSummarizer {
    type Error = sqlx::Error;

    fn try_from(row: SummarizerRow) -> Result<Self, Self::Error> {
        Ok(ComplianceSummarizer {
            id: row.id,
            benchmark_id: row.benchmark_id,
            parent_job_id: row.parent_job_id,
            status: decode_status(&row.status)?,
            retry_count: row.retry_count,
            started_at: row.started_at,
            failure_message: row.failure_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
