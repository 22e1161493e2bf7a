//! Cumulo exporter - polls cloud usage and republishes Prometheus gauges

mod config;
mod metrics;
mod poller;
mod remote;
mod server;

use std::sync::Arc;

use chrono::Utc;
use prometheus::Registry;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cumulo_metering::{AccountantConfig, UsageAccountant, UsageBackend, WeightSource, WeightTable};
use cumulo_simcloud::{FileWeightSource, SimulatedCloud};

use crate::config::ExporterConfig;
use crate::metrics::UsageGauges;
use crate::poller::Poller;
use crate::remote::{HttpWeightSource, RemoteCloud};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ExporterConfig::load()?;
    let process_start = Utc::now().naive_utc();

    let registry = Arc::new(Registry::new());
    let gauges = Arc::new(UsageGauges::new());
    gauges.register(&registry)?;

    // bind before anything else so a bad listen address fails startup
    let listener = server::bind(&config.listen_addr).await?;
    tokio::spawn({
        let registry = registry.clone();
        async move {
            if let Err(e) = server::serve_metrics(registry, listener).await {
                error!(error = %e, "metrics server terminated");
            }
        }
    });

    let weight_source: Option<Box<dyn WeightSource>> = match (&config.weights_file, &config.weights_url) {
        (Some(path), _) => {
            info!(path = %path.display(), "loading weights from file");
            Some(Box::new(FileWeightSource::new(path)))
        }
        (None, Some(url)) => {
            info!(url = %url, "loading weights from endpoint");
            Some(Box::new(HttpWeightSource::new(url)))
        }
        (None, None) => {
            info!("no weight source configured, all weights default to 1.0");
            None
        }
    };

    if let Some(fixture) = &config.fixture_file {
        info!(fixture = %fixture.display(), "using simulated cloud backend");
        let backend = Arc::new(SimulatedCloud::with_process_start(fixture, process_start)?);
        run(backend, gauges, weight_source, &config, process_start).await
    } else if let (Some(url), Some(token)) = (config.api_url.clone(), config.api_token.clone()) {
        info!(url = %url, "using remote control plane backend");
        let backend = Arc::new(RemoteCloud::connect(url, token).await.map_err(|e| {
            error!(error = %e, "could not reach the control plane; consider the simulated backend for testing");
            e
        })?);
        run(backend, gauges, weight_source, &config, process_start).await
    } else {
        anyhow::bail!(
            "no backend configured: set {} for the simulated cloud, or {} and {} for the real one",
            config::DUMMY_FILE_VAR,
            config::API_URL_VAR,
            config::API_TOKEN_VAR,
        );
    }
}

async fn run<B: UsageBackend + 'static>(
    backend: Arc<B>,
    gauges: Arc<UsageGauges>,
    weight_source: Option<Box<dyn WeightSource>>,
    config: &ExporterConfig,
    process_start: chrono::NaiveDateTime,
) -> anyhow::Result<()> {
    let accountant = UsageAccountant::new(
        backend.clone(),
        WeightTable::new(),
        AccountantConfig {
            grouping_projects: config.grouping_projects.clone(),
            grouping_tag: config.grouping_tag.clone(),
        },
    );

    let poller = Poller::new(
        accountant,
        backend,
        gauges,
        weight_source,
        config.domains.clone(),
        config.window_start.unwrap_or(process_start),
        config.update_interval,
        config.weight_refresh_cycles,
    );

    tokio::select! {
        _ = poller.run() => {}
        _ = tokio::signal::ctrl_c() => info!("received ctrl-c, exiting"),
    }
    Ok(())
}
