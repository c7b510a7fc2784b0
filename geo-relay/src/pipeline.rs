use std::time::Duration;

use geo_common::hub::HubTemplate;
use geo_common::ids::ClientResolver;
use geo_common::metrics::{
    POINTS_ACQUIRED, POINTS_DUPLICATE, POINTS_EMITTED, POINTS_RATE_LIMITED,
};
use geo_common::point::Point;
use geo_common::retry::RetryPolicy;
use geo_common::timestamp::format_epoch_millis;
use tracing::{debug, info};

use crate::config::{Config, SourceKind};
use crate::dedup::{Deduplicator, RateLimit};
use crate::error::RelayError;
use crate::forwarder::Forwarder;
use crate::sink::Sink;
use crate::source::gpsd::GpsdSource;
use crate::source::status::StatusSource;
use crate::source::PointSource;

/// What happened to one acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The source had no usable point.
    NoData,
    /// The point was not novel.
    Duplicate,
    /// The point was novel, but came too soon after the previous emission.
    RateLimited,
    /// The point was forwarded to the hub and persisted.
    Emitted,
}

/// Identity established when the pipeline starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub client: String,
    pub live_map_url: String,
}

/// Acquire, deduplicate, then forward and persist points, one at a time.
pub struct Pipeline {
    source: Box<dyn PointSource>,
    deduplicator: Deduplicator,
    rate_limit: RateLimit,
    forwarder: Forwarder,
    sink: Sink,
    /// Template of the live map URL shown to the operator.
    live_map: HubTemplate,
    /// Upper bound on waiting for a streaming source.
    acquire_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        source: Box<dyn PointSource>,
        deduplicator: Deduplicator,
        rate_limit: RateLimit,
        forwarder: Forwarder,
        sink: Sink,
        live_map: HubTemplate,
        acquire_timeout: Duration,
    ) -> Self {
        Self {
            source,
            deduplicator,
            rate_limit,
            forwarder,
            sink,
            live_map,
            acquire_timeout,
        }
    }

    /// Wire up a pipeline for the configured source. gpsd gets a timestamp deduplicator and an
    /// emission gate; the status endpoint gets a position deduplicator and is polled on the
    /// interval.
    pub fn from_config(config: &Config) -> Result<Self, RelayError> {
        let retry_policy = RetryPolicy::new(
            config.retry_policy.backoff_coefficient,
            config.retry_policy.initial_interval.0,
            Some(config.retry_policy.maximum_interval.0),
        );
        let interval = config.interval.0;

        let source: Box<dyn PointSource> = match config.source {
            SourceKind::Gpsd => Box::new(GpsdSource::new(&config.gpsd_address(), retry_policy)),
            SourceKind::Status => Box::new(StatusSource::new(
                config.status_url.as_str(),
                config.request_timeout.0,
                retry_policy,
            )?),
        };
        let (deduplicator, rate_limit) = match config.source {
            SourceKind::Gpsd => (Deduplicator::seen_timestamps(), RateLimit::gate(interval)),
            SourceKind::Status => (Deduplicator::last_position(), RateLimit::pace(interval)),
        };

        let hub = &config.hub;
        let log = HubTemplate::new(&hub.log_template, &hub.scheme, &hub.host, &config.secret)?;
        let live_map =
            HubTemplate::new(&hub.live_map_template, &hub.scheme, &hub.host, &config.secret)?;
        let identity = ClientResolver::new(&config.client, source.fallback_client())?;
        let forwarder = Forwarder::new(log, identity, config.request_timeout.0)?;
        let sink = Sink::new(config.output_path());

        Ok(Self::new(
            source,
            deduplicator,
            rate_limit,
            forwarder,
            sink,
            live_map,
            config.acquire_timeout.0,
        ))
    }

    /// Perform the source handshake and announce who we are logging as. The output file is only
    /// truncated once the handshake succeeded.
    pub async fn start(&mut self) -> Result<Session, RelayError> {
        let handshake = self.source.start().await?;
        self.sink.open().await?;

        let client = self
            .forwarder
            .identity()
            .resolve(handshake.vehicle.as_deref());
        let live_map_url = self.live_map.live_map_url(&client)?.to_string();

        info!(%client, "logging points");
        info!(url = %live_map_url, "go to live map");

        Ok(Session {
            client,
            live_map_url,
        })
    }

    /// Run one iteration: acquire a point and emit it if it is novel and the rate limit allows.
    pub async fn step(&mut self) -> Result<Outcome, RelayError> {
        let outcome = self.process().await?;

        if let Some(pause) = self.rate_limit.pause() {
            tokio::time::sleep(pause).await;
        }

        Ok(outcome)
    }

    async fn process(&mut self) -> Result<Outcome, RelayError> {
        let Some(point) = self.source.acquire(self.acquire_timeout).await else {
            debug!("no point available");
            return Ok(Outcome::NoData);
        };
        metrics::counter!(POINTS_ACQUIRED).increment(1);

        // Novelty is checked even when the gate is closed, so the seen-set stays current.
        let novel = self.deduplicator.should_emit(&point);
        if !novel {
            info!(
                time = %display_time(&point),
                longitude = point.longitude,
                latitude = point.latitude,
                "skipped duplicate point"
            );
            metrics::counter!(POINTS_DUPLICATE).increment(1);
            return Ok(Outcome::Duplicate);
        }

        if !self.rate_limit.is_open() {
            debug!("skipped point inside the rate limit interval");
            metrics::counter!(POINTS_RATE_LIMITED).increment(1);
            return Ok(Outcome::RateLimited);
        }

        self.emit(&point).await?;
        Ok(Outcome::Emitted)
    }

    async fn emit(&mut self, point: &Point) -> Result<(), RelayError> {
        info!(
            time = %display_time(point),
            longitude = point.longitude,
            latitude = point.latitude,
            "sending point to hub"
        );

        self.forwarder.deliver(point).await;
        self.sink.append(point).await?;
        self.rate_limit.record_emission();
        metrics::counter!(POINTS_EMITTED).increment(1);

        Ok(())
    }

    /// Start, then relay points until a fatal error.
    pub async fn run(mut self) -> Result<(), RelayError> {
        self.start().await?;

        loop {
            self.step().await?;
        }
    }
}

fn display_time(point: &Point) -> String {
    format_epoch_millis(point.timestamp).unwrap_or_else(|_| point.timestamp.to_string())
}
