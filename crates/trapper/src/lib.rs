//! Trapper Service
//!
//! Wires configuration, ingress, the consolidation engine, the optional
//! failover gate, the sweeper and the liveness endpoint together.

pub mod config;
pub mod liveness;
pub mod receiver;

use anyhow::Context;
use consolidation::{ConsolidationEngine, EventClassifier, NotificationSink, Sweeper, TracingSink};
use failover::{FailoverGate, HttpPeerProbe};
use match_group::{GroupConfig, GroupError, MatchGroup};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

pub use config::{AddressError, AppConfig, Endpoint, LogFormat};
pub use liveness::LivenessState;
pub use receiver::Receiver;

/// Initialize logging
pub fn init_logging(format: LogFormat, level: &str) -> anyhow::Result<()> {
    let level: Level = level
        .parse()
        .with_context(|| format!("invalid log level: {}", level))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    match format {
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    }
    .context("failed to set tracing subscriber")
}

/// Build groups for `names` in order. A name without a section gets a
/// default group, which matches every trap.
pub fn build_groups(config: &AppConfig, names: &[String]) -> Result<Vec<MatchGroup>, GroupError> {
    names
        .iter()
        .map(|name| match config.groups.get(name) {
            Some(section) => MatchGroup::from_config(name, section),
            None => {
                warn!("[{}] no configuration section, using defaults", name);
                MatchGroup::from_config(name, &GroupConfig::default())
            }
        })
        .collect()
}

/// Build the engine over the configured accept and ignore groups
pub fn build_engine(
    config: &AppConfig,
    sink: Arc<dyn NotificationSink>,
) -> Result<ConsolidationEngine, GroupError> {
    let accept = build_groups(config, &config.accept)?;
    let ignore = build_groups(config, &config.ignore)?;
    Ok(ConsolidationEngine::new(accept, ignore, sink))
}

/// The classifier fed by ingress: the engine itself, or the engine behind
/// a failover gate when a primary is configured
pub fn build_classifier(
    config: &AppConfig,
    engine: Arc<ConsolidationEngine>,
) -> anyhow::Result<Arc<dyn EventClassifier>> {
    match &config.primary {
        Some(primary) => {
            let probe = HttpPeerProbe::new(primary, config.probe_timeout())
                .with_context(|| format!("bad primary URL: {}", primary))?;
            info!("Running as secondary of {}", primary);
            Ok(Arc::new(FailoverGate::new(engine, probe, config.check_interval())))
        }
        None => Ok(engine),
    }
}

/// Run the service until ingress fails or the process is interrupted
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let endpoint = config.endpoint()?;

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("metrics recorder not installed: {}", e);
            None
        }
    };

    let engine = Arc::new(build_engine(&config, Arc::new(TracingSink))?);
    let classifier = build_classifier(&config, engine.clone())?;
    let receiver = Receiver::new(classifier, config.threads);

    let sweeper = Sweeper::spawn(engine, config.sweep_interval());

    let liveness = tokio::spawn(liveness::serve(
        config.liveness,
        LivenessState { metrics },
    ));

    let ingress = async {
        match &endpoint {
            Endpoint::Udp { host, port } => {
                let socket = UdpSocket::bind((host.as_str(), *port))
                    .await
                    .with_context(|| format!("unable to listen on {}", endpoint))?;
                receiver.serve_udp(socket).await?;
            }
            Endpoint::Tcp { host, port } => {
                let listener = TcpListener::bind((host.as_str(), *port))
                    .await
                    .with_context(|| format!("unable to listen on {}", endpoint))?;
                receiver.serve_tcp(listener).await?;
            }
        }
        anyhow::Ok(())
    };

    let result = tokio::select! {
        result = ingress => result,
        result = liveness => match result {
            Ok(served) => served.context("liveness endpoint failed"),
            Err(e) => Err(e.into()),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Exiting...");
            Ok(())
        }
    };

    sweeper.stop().await;
    result
}
