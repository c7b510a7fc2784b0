//! Stream TPV reports from a gpsd daemon.
//!
//! gpsd speaks newline-delimited JSON. After the watch command is sent it pushes every report it
//! produces, each tagged with a `class`. Only Time-Position-Velocity reports carry fixes.
use std::time::Duration;

use async_trait::async_trait;
use geo_common::metrics::SOURCE_ERRORS;
use geo_common::point::{number_field, Point, Record};
use geo_common::retry::RetryPolicy;
use geo_common::timestamp::{now_millis, parse_rfc3339_millis};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::{Handshake, PointSource};
use crate::error::{RelayError, SourceError};

pub const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true}\n";

/// TPV members sent to the hub as query parameters.
pub const ENCODED_KEYS: &[&str] = &["lat", "lon", "speed", "time", "alt", "epx", "epy"];

pub const TPV_CLASS: &str = "TPV";

/// A `PointSource` reading from gpsd's socket.
pub struct GpsdSource {
    /// host:port of the gpsd daemon.
    address: String,
    /// Paces reconnection attempts while gpsd is unreachable.
    retry_policy: RetryPolicy,
    /// The open report stream, `None` while disconnected.
    reports: Option<Lines<BufReader<TcpStream>>>,
    /// Failed connection attempts since the last successful one.
    failures: u32,
}

impl GpsdSource {
    pub fn new(address: &str, retry_policy: RetryPolicy) -> Self {
        Self {
            address: address.to_owned(),
            retry_policy,
            reports: None,
            failures: 0,
        }
    }

    /// Connect and register a watch, so gpsd starts streaming reports to us.
    async fn connect(&self) -> Result<Lines<BufReader<TcpStream>>, SourceError> {
        let mut stream = TcpStream::connect(&self.address).await?;
        stream.write_all(WATCH_COMMAND).await?;

        Ok(BufReader::new(stream).lines())
    }

    /// Make one connection attempt, after waiting if earlier ones failed.
    async fn reconnect(&mut self) {
        if self.failures > 0 {
            tokio::time::sleep(self.retry_policy.time_until_next_retry(self.failures - 1)).await;
        }

        match self.connect().await {
            Ok(reports) => {
                info!(address = %self.address, "watching gpsd");
                self.reports = Some(reports);
                self.failures = 0;
            }
            Err(error) => {
                warn!(address = %self.address, %error, "failed to connect to gpsd, retrying");
                metrics::counter!(SOURCE_ERRORS, "source" => "gpsd").increment(1);
                self.failures = self.failures.saturating_add(1);
            }
        }
    }

    fn disconnect(&mut self, error: SourceError) {
        warn!(address = %self.address, %error, "lost connection to gpsd");
        metrics::counter!(SOURCE_ERRORS, "source" => "gpsd").increment(1);
        self.reports = None;
        // Wait out the retry delay before the first reconnection attempt.
        self.failures = 1;
    }
}

#[async_trait]
impl PointSource for GpsdSource {
    fn fallback_client(&self) -> &'static str {
        "gpsd"
    }

    async fn start(&mut self) -> Result<Handshake, RelayError> {
        while self.reports.is_none() {
            self.reconnect().await;
        }

        Ok(Handshake { vehicle: None })
    }

    async fn acquire(&mut self, timeout: Duration) -> Option<Point> {
        let Some(reports) = self.reports.as_mut() else {
            self.reconnect().await;
            return None;
        };

        // `next_line` is cancel safe, so a timeout never loses part of a report.
        match tokio::time::timeout(timeout, reports.next_line()).await {
            Err(_) => None,
            Ok(Ok(Some(line))) => parse_report(&line),
            Ok(Ok(None)) => {
                self.disconnect(SourceError::ConnectionClosed);
                None
            }
            Ok(Err(error)) => {
                self.disconnect(SourceError::IoError(error));
                None
            }
        }
    }
}

/// Parse one line of the gpsd protocol, keeping only TPV reports that carry a fix.
pub fn parse_report(line: &str) -> Option<Point> {
    let record = match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(record)) => record,
        Ok(_) => return None,
        Err(error) => {
            debug!(%error, "skipping malformed gpsd report");
            return None;
        }
    };

    if record.get("class").and_then(Value::as_str) != Some(TPV_CLASS) {
        return None;
    }

    tpv_point(record)
}

/// Map a TPV report to a `Point`, if it has a position.
pub fn tpv_point(record: Record) -> Option<Point> {
    let latitude = number_field(&record, "lat")?;
    let longitude = number_field(&record, "lon")?;
    let speed = number_field(&record, "speed").unwrap_or(0.0);
    let timestamp = record
        .get("time")
        .and_then(Value::as_str)
        .and_then(parse_rfc3339_millis)
        .unwrap_or_else(now_millis);
    let elevation = number_field(&record, "alt");
    let accuracy = match (number_field(&record, "epx"), number_field(&record, "epy")) {
        (Some(epx), Some(epy)) => Some(epx.hypot(epy)),
        _ => None,
    };

    Some(
        Point::new(record, latitude, longitude, timestamp)
            .with_speed(speed)
            .with_elevation(elevation)
            .with_accuracy(accuracy)
            .with_encoded_keys(ENCODED_KEYS),
    )
}
