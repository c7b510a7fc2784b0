use axum::{routing::get, Router};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

pub const POINTS_ACQUIRED: &str = "relay_points_acquired_total";
pub const POINTS_DUPLICATE: &str = "relay_points_duplicate_total";
pub const POINTS_RATE_LIMITED: &str = "relay_points_rate_limited_total";
pub const POINTS_EMITTED: &str = "relay_points_emitted_total";
pub const DELIVERIES_FAILED: &str = "relay_deliveries_failed_total";
pub const DELIVERY_DURATION: &str = "relay_delivery_duration_seconds";
pub const SOURCE_ERRORS: &str = "relay_source_errors_total";

/// Bind a `TcpListener` on the provided bind address to serve a `Router` on it.
/// This function is intended to take a Router as returned by `setup_metrics_router`.
pub async fn serve(router: Router, bind: &str) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, router).await?;

    Ok(())
}

/// Build a Router for a metrics endpoint.
pub fn setup_metrics_router() -> Result<Router, BuildError> {
    let recorder_handle = setup_metrics_recorder()?;

    Ok(Router::new().route(
        "/metrics",
        get(move || std::future::ready(recorder_handle.render())),
    ))
}

pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    // Hub round trips, from a vehicle's uplink.
    const DELIVERY_SECONDS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

    PrometheusBuilder::new()
        .set_buckets(DELIVERY_SECONDS)?
        .install_recorder()
}
