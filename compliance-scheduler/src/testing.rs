//! Test doubles for the gateways and a ready-made service context

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use compliance_client::ClientError;
use compliance_core::domain::benchmark::{Benchmark, BenchmarkAssignment, Control, Severity};
use uuid::Uuid;

use crate::config::Config;
use crate::gateway::{
    AssignmentSource, BenchmarkLookup, JobQueue, ProduceOutcome, QueueError, SinkCounter,
};
use crate::service::ServiceContext;
use crate::store::memory::InMemoryStore;

/// Benchmark tree and assignments served from memory
#[derive(Debug, Default)]
pub struct StaticBenchmarks {
    benchmarks: HashMap<String, Benchmark>,
    controls: HashMap<String, Control>,
    assignments: Vec<BenchmarkAssignment>,
}

impl StaticBenchmarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn benchmark(mut self, id: &str, children: &[&str], controls: &[&str]) -> Self {
        self.benchmarks.insert(
            id.to_string(),
            Benchmark {
                id: id.to_string(),
                children: children.iter().map(|s| s.to_string()).collect(),
                controls: controls.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    pub fn control(mut self, id: &str, query_id: Option<&str>, severity: Severity) -> Self {
        self.controls.insert(
            id.to_string(),
            Control {
                id: id.to_string(),
                query_id: query_id.map(str::to_string),
                severity,
            },
        );
        self
    }

    pub fn assignment(mut self, benchmark_id: &str, connection_ids: &[&str]) -> Self {
        self.assignments.push(BenchmarkAssignment {
            benchmark_id: benchmark_id.to_string(),
            connection_ids: connection_ids.iter().map(|s| s.to_string()).collect(),
            resource_collection_ids: Vec::new(),
        });
        self
    }
}

#[async_trait]
impl BenchmarkLookup for StaticBenchmarks {
    async fn get_benchmark(&self, benchmark_id: &str) -> compliance_client::Result<Benchmark> {
        self.benchmarks
            .get(benchmark_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("benchmark {}", benchmark_id)))
    }

    async fn get_control(&self, control_id: &str) -> compliance_client::Result<Control> {
        self.controls
            .get(control_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("control {}", control_id)))
    }
}

#[async_trait]
impl AssignmentSource for StaticBenchmarks {
    async fn list_assignments(&self) -> compliance_client::Result<Vec<BenchmarkAssignment>> {
        Ok(self.assignments.clone())
    }

    async fn get_assignment(
        &self,
        benchmark_id: &str,
    ) -> compliance_client::Result<BenchmarkAssignment> {
        Ok(self
            .assignments
            .iter()
            .find(|a| a.benchmark_id == benchmark_id)
            .cloned()
            .unwrap_or_else(|| BenchmarkAssignment {
                benchmark_id: benchmark_id.to_string(),
                ..Default::default()
            }))
    }
}

/// Sunk counts set per job by the test
#[derive(Debug, Default)]
pub struct FixedSinkCounter {
    counts: Mutex<HashMap<Uuid, i64>>,
    unavailable: Mutex<bool>,
}

impl FixedSinkCounter {
    pub fn set(&self, job_id: Uuid, count: i64) {
        self.counts.lock().unwrap().insert(job_id, count);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }
}

#[async_trait]
impl SinkCounter for FixedSinkCounter {
    async fn count_sunk_documents(
        &self,
        _benchmark_id: &str,
        job_id: Uuid,
    ) -> compliance_client::Result<i64> {
        if *self.unavailable.lock().unwrap() {
            return Err(ClientError::api_error(503, "index unavailable"));
        }
        Ok(self.counts.lock().unwrap().get(&job_id).copied().unwrap_or(0))
    }
}

#[derive(Debug, Clone)]
pub struct ProducedMessage {
    pub topic: String,
    pub payload: serde_json::Value,
    pub idempotency_key: String,
}

/// Records produced messages and dedupes keys per topic
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    messages: Mutex<Vec<ProducedMessage>>,
    keys: Mutex<HashSet<(String, String)>>,
    fail: Mutex<bool>,
}

impl InMemoryQueue {
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn messages(&self) -> Vec<ProducedMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn messages_on(&self, topic: &str) -> Vec<ProducedMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.topic == topic)
            .collect()
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn produce(
        &self,
        topic: &str,
        payload: serde_json::Value,
        idempotency_key: &str,
    ) -> Result<ProduceOutcome, QueueError> {
        if *self.fail.lock().unwrap() {
            return Err(QueueError::Rejected {
                topic: topic.to_string(),
                message: "broker unavailable".to_string(),
            });
        }

        if !self
            .keys
            .lock()
            .unwrap()
            .insert((topic.to_string(), idempotency_key.to_string()))
        {
            return Ok(ProduceOutcome::Duplicate { message_id: None });
        }

        let mut messages = self.messages.lock().unwrap();
        messages.push(ProducedMessage {
            topic: topic.to_string(),
            payload,
            idempotency_key: idempotency_key.to_string(),
        });
        Ok(ProduceOutcome::Enqueued {
            message_id: messages.len() as i64,
        })
    }
}

/// Doubles behind a [`ServiceContext`], kept typed for assertions
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub benchmarks: Arc<StaticBenchmarks>,
    pub sinks: Arc<FixedSinkCounter>,
    pub queue: Arc<InMemoryQueue>,
    pub ctx: ServiceContext,
}

impl Harness {
    pub fn new(benchmarks: StaticBenchmarks) -> Self {
        Self::with_config(benchmarks, Config::default())
    }

    pub fn with_config(benchmarks: StaticBenchmarks, config: Config) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let benchmarks = Arc::new(benchmarks);
        let sinks = Arc::new(FixedSinkCounter::default());
        let queue = Arc::new(InMemoryQueue::default());

        let ctx = ServiceContext {
            store: store.clone(),
            benchmarks: benchmarks.clone(),
            assignments: benchmarks.clone(),
            sinks: sinks.clone(),
            queue: queue.clone(),
            config: Arc::new(config),
        };

        Self {
            store,
            benchmarks,
            sinks,
            queue,
            ctx,
        }
    }
}
