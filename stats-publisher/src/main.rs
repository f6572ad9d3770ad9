//! Stats Publisher - standalone host statistics shipper
//!
//! Reads its configuration, discovers the host identity, then publishes
//! host metrics and counters to Elasticsearch until interrupted.

use anyhow::{Context, Result};
use stats_publisher::config::PublisherConfig;
use stats_publisher::discovery::HostInfo;
use stats_publisher::metrics::HostStatsSource;
use stats_publisher::{logging, CounterRegistry, ElasticPublisher, Scheduler};
use std::sync::Arc;
use tracing::{error, info, warn};

async fn load_config() -> Result<PublisherConfig> {
    let path = PublisherConfig::config_file_path()?;

    let mut config = if path.exists() {
        PublisherConfig::load(&path).await?
    } else {
        eprintln!("[stats-publisher] no config file at {}, using defaults", path.display());
        PublisherConfig::default()
    };
    config.apply_process_env()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = load_config().await.context("Failed to load configuration")?;
    logging::init(&config.logging)?;

    info!("Stats publisher starting...");

    let host = HostInfo::discover().context("Failed to discover host information")?;
    config.validate(&host).context("Invalid configuration")?;

    let context = Arc::new(config.context(&host)?);
    info!(
        "Publishing as {} ({}) in deployment {}, role {}",
        context.node_name(),
        context.node_id(),
        context.deployment_id(),
        context.role()
    );

    let publisher = ElasticPublisher::new(context, config.transport()?, config.index_settings()?)?;
    let source = HostStatsSource::new(CounterRegistry::new())?;

    let scheduler = Scheduler::new(Arc::new(source), Arc::new(publisher), config.schedule()?);
    let report = scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await;

    if report.metrics_failed + report.counters_failed > 0 {
        warn!(
            "{} metrics and {} counter publishes failed during this run",
            report.metrics_failed, report.counters_failed
        );
    }
    info!("Stats publisher stopped");
    Ok(())
}
