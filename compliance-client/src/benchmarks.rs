//! Benchmark, control and assignment lookups

use compliance_core::domain::benchmark::{Benchmark, BenchmarkAssignment, Control};

use crate::error::Result;
use crate::{ComplianceApiClient, handle_response};

impl ComplianceApiClient {
    /// Fetch a benchmark definition (child benchmarks and direct controls)
    pub async fn get_benchmark(&self, benchmark_id: &str) -> Result<Benchmark> {
        let url = format!("{}/api/v1/benchmarks/{}", self.base_url, benchmark_id);
        tracing::debug!("Fetching benchmark {}", benchmark_id);
        let response = self.client.get(&url).send().await?;

        handle_response(response, &format!("benchmark {}", benchmark_id)).await
    }

    /// Fetch a control definition
    pub async fn get_control(&self, control_id: &str) -> Result<Control> {
        let url = format!("{}/api/v1/controls/{}", self.base_url, control_id);
        let response = self.client.get(&url).send().await?;

        handle_response(response, &format!("control {}", control_id)).await
    }

    /// List the assignments of every benchmark that is evaluated on a schedule
    pub async fn list_assignments(&self) -> Result<Vec<BenchmarkAssignment>> {
        let url = format!("{}/api/v1/assignments", self.base_url);
        let response = self.client.get(&url).send().await?;

        handle_response(response, "assignments").await
    }

    /// Fetch the assignment of a single benchmark
    pub async fn get_assignment(&self, benchmark_id: &str) -> Result<BenchmarkAssignment> {
        let url = format!(
            "{}/api/v1/assignments/benchmark/{}",
            self.base_url, benchmark_id
        );
        let response = self.client.get(&url).send().await?;

        handle_response(response, &format!("assignment of {}", benchmark_id)).await
    }
}
