//! Relay vehicle telemetry from gpsd or a status endpoint to a GeoHub instance.
use envconfig::Envconfig;
use geo_common::metrics::{serve, setup_metrics_router};
use tracing::{error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use geo_relay::config::Config;
use geo_relay::error::RelayError;
use geo_relay::pipeline::Pipeline;

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    tracing_subscriber::registry().with(log_layer).init();
}

fn start_metrics_server(config: &Config) {
    let router = match setup_metrics_router() {
        Ok(router) => router,
        Err(error) => {
            warn!(%error, "failed to set up metrics, continuing without them");
            return;
        }
    };

    let bind = config.bind();
    tokio::task::spawn(async move {
        if let Err(error) = serve(router, &bind).await {
            error!(%error, "failed to serve metrics");
        }
    });
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), RelayError> {
    setup_tracing();

    let config = Config::init_from_env()?;

    if config.export_prometheus {
        start_metrics_server(&config);
    }

    let result = match Pipeline::from_config(&config) {
        Ok(pipeline) => pipeline.run().await,
        Err(error) => Err(error),
    };

    if let Err(error) = &result {
        error!(%error, "relay terminated");
    }
    result
}
