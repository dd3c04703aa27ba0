//! Search index client
//!
//! Counts result documents that runner workers wrote for a compliance job.
//! The count uses `track_total_hits` so `hits.total.value` is exact.

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::Result;
use crate::handle_response;

/// Client for the OpenSearch/Elasticsearch result index
#[derive(Debug, Clone)]
pub struct SearchClient {
    base_url: String,
    index: String,
    client: Client,
}

impl SearchClient {
    pub fn new(base_url: impl Into<String>, index: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.into(),
            client: Client::new(),
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Number of result documents tagged with the benchmark and compliance job
    pub async fn count_sunk_documents(&self, benchmark_id: &str, job_id: Uuid) -> Result<i64> {
        let url = format!("{}/{}/_search", self.base_url, self.index);
        let response = self
            .client
            .post(&url)
            .json(&sunk_count_query(benchmark_id, job_id))
            .send()
            .await?;

        let body: CountResponse = handle_response(response, &format!("index {}", self.index)).await?;

        tracing::debug!(
            benchmark_id,
            %job_id,
            count = body.hits.total.value,
            "Counted sunk documents"
        );

        Ok(body.hits.total.value)
    }
}

/// Query body matching the result documents of one compliance job
pub fn sunk_count_query(benchmark_id: &str, job_id: Uuid) -> Value {
    json!({
        "size": 0,
        "track_total_hits": true,
        "query": {
            "bool": {
                "filter": [
                    { "term": { "benchmarkID": benchmark_id } },
                    { "term": { "parentComplianceJobID": job_id.to_string() } }
                ]
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    total: Total,
}

#[derive(Debug, Deserialize)]
struct Total {
    value: i64,
}
