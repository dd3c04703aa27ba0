use std::sync::Arc;

use anyhow::Context;
use compliance_client::{ComplianceApiClient, SearchClient};
use compliance_core::domain::sequencer::JobKind;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod gateway;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod store;
#[cfg(test)]
mod testing;

use crate::config::Config;
use crate::gateway::PgmqQueue;
use crate::scheduler::{ComplianceScheduler, SchedulerStats};
use crate::service::ServiceContext;
use crate::service::sequencer::{ComplianceJobProbe, QueueSuccessorDispatcher, SequencerHooks};
use crate::store::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "compliance_scheduler=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting compliance scheduler...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    tracing::info!("Connecting to database...");

    // Create database connection pool
    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Database connection pool created");

    // Run migrations
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let queue = Arc::new(PgmqQueue::new(pool.clone()));
    queue
        .ensure_topics(&[
            config.runner_topic.as_str(),
            config.summarizer_topic.as_str(),
            config.sequencer_topic.as_str(),
        ])
        .await
        .context("Failed to create queue topics")?;

    let api_client = Arc::new(ComplianceApiClient::new(&config.compliance_api_url));
    let search = Arc::new(SearchClient::new(
        &config.search_url,
        &config.search_result_index,
    ));
    let store = Arc::new(PgStore::new(pool));

    let bind_addr = config.bind_addr.clone();
    let config = Arc::new(config);

    let ctx = ServiceContext {
        store: store.clone(),
        benchmarks: api_client.clone(),
        assignments: api_client,
        sinks: search,
        queue: queue.clone(),
        config: config.clone(),
    };

    // Successors of finished sequencers are announced for every job kind
    let hooks = [JobKind::Describe, JobKind::Compliance, JobKind::Insight]
        .into_iter()
        .fold(
            SequencerHooks::default().with_probe(Arc::new(ComplianceJobProbe::new(store))),
            |hooks, kind| {
                hooks.with_dispatcher(Arc::new(QueueSuccessorDispatcher::new(
                    queue.clone(),
                    config.sequencer_topic.clone(),
                    kind,
                )))
            },
        );

    let stats = Arc::new(SchedulerStats::default());

    let scheduler = ComplianceScheduler::new(ctx.clone(), hooks, stats.clone());
    tokio::spawn(async move { scheduler.run().await });

    // Build router with all API endpoints
    let app = api::create_router(api::AppState { ctx, stats });

    tracing::info!("Listening on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
