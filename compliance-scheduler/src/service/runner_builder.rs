//! Runner Builder
//!
//! Walks a benchmark tree and turns every query-backed control into a runner
//! for one execution target. The traversal only collects candidates; runners
//! sharing a query are merged afterwards so a query runs once per target no
//! matter how many paths of the tree reach it.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use compliance_client::ClientError;
use compliance_core::domain::runner::{Caller, ComplianceRunner};
use uuid::Uuid;

use crate::gateway::BenchmarkLookup;

/// Builder error type
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to look up {what}: {source}")]
    Lookup {
        what: String,
        #[source]
        source: ClientError,
    },

    #[error("benchmark {benchmark_id} is its own ancestor")]
    Cycle { benchmark_id: String },
}

pub type Result<T> = std::result::Result<T, BuildError>;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A runner-to-be, before deduplication
#[derive(Debug)]
struct Candidate {
    query_id: String,
    caller: Caller,
}

/// Build the deduplicated runners of `benchmark_id` for one target
///
/// `parent_benchmark_ids` is the path from `root_benchmark_id` down to (but
/// excluding) `benchmark_id`; pass an empty slice when starting at the root.
/// Any lookup failure aborts the whole build.
pub async fn build_runners(
    lookup: &dyn BenchmarkLookup,
    parent_job_id: Uuid,
    connection_id: Option<&str>,
    resource_collection_id: Option<&str>,
    root_benchmark_id: &str,
    parent_benchmark_ids: &[String],
    benchmark_id: &str,
) -> Result<Vec<ComplianceRunner>> {
    let candidates = collect_candidates(
        lookup,
        root_benchmark_id,
        parent_benchmark_ids.to_vec(),
        benchmark_id.to_string(),
    )
    .await?;

    let runners = merge_by_query(candidates, |query_id| {
        ComplianceRunner::new(
            parent_job_id,
            root_benchmark_id,
            query_id,
            connection_id.map(str::to_string),
            resource_collection_id.map(str::to_string),
        )
    });

    tracing::debug!(
        benchmark_id,
        connection_id,
        resource_collection_id,
        runners = runners.len(),
        "Built runners"
    );

    Ok(runners)
}

fn collect_candidates<'a>(
    lookup: &'a dyn BenchmarkLookup,
    root_benchmark_id: &'a str,
    parents: Vec<String>,
    benchmark_id: String,
) -> BoxFuture<'a, Result<Vec<Candidate>>> {
    Box::pin(async move {
        if parents.contains(&benchmark_id) {
            return Err(BuildError::Cycle { benchmark_id });
        }

        let benchmark = lookup
            .get_benchmark(&benchmark_id)
            .await
            .map_err(|source| BuildError::Lookup {
                what: format!("benchmark {}", benchmark_id),
                source,
            })?;

        let mut path = parents;
        path.push(benchmark_id);

        let mut candidates = Vec::new();
        for child in &benchmark.children {
            let nested =
                collect_candidates(lookup, root_benchmark_id, path.clone(), child.clone()).await?;
            candidates.extend(nested);
        }

        for control_id in &benchmark.controls {
            let control = lookup
                .get_control(control_id)
                .await
                .map_err(|source| BuildError::Lookup {
                    what: format!("control {}", control_id),
                    source,
                })?;

            // Policy-only controls have nothing to execute
            let Some(query_id) = control.query_id.filter(|q| !q.is_empty()) else {
                continue;
            };

            candidates.push(Candidate {
                query_id,
                caller: Caller {
                    root_benchmark: root_benchmark_id.to_string(),
                    parent_benchmark_ids: path.clone(),
                    control_id: control_id.clone(),
                    control_severity: control.severity,
                },
            });
        }

        Ok(candidates)
    })
}

/// One runner per query, in discovery order, carrying the union of callers
fn merge_by_query(
    candidates: Vec<Candidate>,
    mut new_runner: impl FnMut(&str) -> ComplianceRunner,
) -> Vec<ComplianceRunner> {
    let mut runners: Vec<ComplianceRunner> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for candidate in candidates {
        let slot = *index.entry(candidate.query_id.clone()).or_insert_with(|| {
            runners.push(new_runner(&candidate.query_id));
            runners.len() - 1
        });
        runners[slot].merge_callers([candidate.caller]);
    }

    runners
}
