//! Benchmark definitions as served by the benchmark/control lookup API

use serde::{Deserialize, Serialize};

/// A hierarchical policy document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Benchmark {
    pub id: String,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub controls: Vec<String>,
}

/// A compliance rule; controls without a query are policy-only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Control {
    pub id: String,
    pub query_id: Option<String>,
    #[serde(default)]
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

/// Where a benchmark is evaluated
///
/// Explicit connection or resource-collection targets for one benchmark.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchmarkAssignment {
    pub benchmark_id: String,
    #[serde(default)]
    pub connection_ids: Vec<String>,
    #[serde(default)]
    pub resource_collection_ids: Vec<String>,
}

impl BenchmarkAssignment {
    pub fn is_empty(&self) -> bool {
        self.connection_ids.is_empty() && self.resource_collection_ids.is_empty()
    }
}
