//! Job Sequencer Repository

use chrono::{DateTime, Utc};
use compliance_core::domain::sequencer::{JobSequencer, SequencerStatus};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use super::decode_status;

const SEQUENCER_COLUMNS: &str = "id, dependency_kind, dependency_ids, next_job_kind, next_job_ids, \
    status, dispatched_at, created_at, updated_at";

/// Insert a new sequencer
pub async fn insert(pool: &PgPool, sequencer: &JobSequencer) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO job_sequencers ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        SEQUENCER_COLUMNS
    ))
    .bind(sequencer.id)
    .bind(sequencer.dependency_kind.as_str())
    .bind(Json(&sequencer.dependency_ids))
    .bind(sequencer.next_job_kind.as_str())
    .bind(Json(&sequencer.next_job_ids))
    .bind(sequencer.status.as_str())
    .bind(sequencer.dispatched_at)
    .bind(sequencer.created_at)
    .bind(sequencer.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Sequencers still waiting for their dependencies
pub async fn find_waiting(pool: &PgPool) -> Result<Vec<JobSequencer>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SequencerRow>(&format!(
        "SELECT {} FROM job_sequencers WHERE status = $1 ORDER BY created_at ASC",
        SEQUENCER_COLUMNS
    ))
    .bind(SequencerStatus::WaitingForDependencies.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(JobSequencer::try_from).collect()
}

/// Finished sequencers whose successors were not handed over yet
pub async fn find_undispatched(pool: &PgPool) -> Result<Vec<JobSequencer>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SequencerRow>(&format!(
        "SELECT {} FROM job_sequencers WHERE status = $1 AND dispatched_at IS NULL ORDER BY updated_at ASC",
        SEQUENCER_COLUMNS
    ))
    .bind(SequencerStatus::Finished.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(JobSequencer::try_from).collect()
}

/// Record that the successors of a finished sequencer were handed over
pub async fn mark_dispatched(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        UPDATE job_sequencers SET dispatched_at = $1, updated_at = $1
        WHERE id = $2 AND status = $3 AND dispatched_at IS NULL
        "#,
    )
    .bind(now)
    .bind(id)
    .bind(SequencerStatus::Finished.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark a waiting sequencer failed
pub async fn update_failed(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE job_sequencers SET status = $1, updated_at = $2
        WHERE id = $3 AND status = $4
        "#,
    )
    .bind(SequencerStatus::Failed.as_str())
    .bind(Utc::now())
    .bind(id)
    .bind(SequencerStatus::WaitingForDependencies.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark a waiting sequencer finished, recording the jobs it unblocked
pub async fn update_finished(
    pool: &PgPool,
    id: Uuid,
    next_job_ids: &[Uuid],
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE job_sequencers SET status = $1, next_job_ids = $2, updated_at = $3
        WHERE id = $4 AND status = $5
        "#,
    )
    .bind(SequencerStatus::Finished.as_str())
    .bind(Json(next_job_ids))
    .bind(Utc::now())
    .bind(id)
    .bind(SequencerStatus::WaitingForDependencies.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct SequencerRow {
    id: Uuid,
    dependency_kind: String,
    dependency_ids: Json<Vec<Uuid>>,
    next_job_kind: String,
    next_job_ids: Json<Vec<Uuid>>,
    status: String,
    dispatched_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SequencerRow> for JobSequencer {
    type Error = sqlx::Error;

    fn try_from(row: SequencerRow) -> Result<Self, Self::Error> {
        Ok(JobSequencer {
            id: row.id,
            dependency_kind: decode_status(&row.dependency_kind)?,
            dependency_ids: row.dependency_ids.0,
            next_job_kind: decode_status(&row.next_job_kind)?,
            next_job_ids: row.next_job_ids.0,
            status: decode_status(&row.status)?,
            dispatched_at: row.dispatched_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
