//! Poll a JSON status endpoint, like the one on-board trains expose to passengers.
use std::time::Duration;

use async_trait::async_trait;
use geo_common::metrics::SOURCE_ERRORS;
use geo_common::point::{identity_field, number_field, Point, Record};
use geo_common::retry::RetryPolicy;
use geo_common::timestamp::now_millis;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Handshake, PointSource};
use crate::error::{RelayError, SourceError};

/// Status members sent to the hub as query parameters.
pub const ENCODED_KEYS: &[&str] = &["latitude", "longitude", "speed", "serverTime"];

/// A `PointSource` polling an HTTP status endpoint.
pub struct StatusSource {
    url: String,
    client: reqwest::Client,
    retry_policy: RetryPolicy,
    /// The response fetched during `start`, handed out by the first `acquire`.
    pending: Option<Record>,
}

impl StatusSource {
    pub fn new(
        url: &str,
        request_timeout: Duration,
        retry_policy: RetryPolicy,
    ) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .user_agent("geo-relay")
            .timeout(request_timeout)
            .build()
            .map_err(RelayError::HttpClientError)?;

        Ok(Self {
            url: url.to_owned(),
            client,
            retry_policy,
            pending: None,
        })
    }

    async fn fetch(&self) -> Result<Value, SourceError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?;

        // An empty body is as falsy as `null`.
        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_slice(&body)?)
    }

    /// Fetch the current status, retrying until the endpoint answers.
    async fn fetch_until_success(&self) -> Value {
        let mut attempt = 0;

        loop {
            match self.fetch().await {
                Ok(value) => return value,
                Err(error) => {
                    let delay = self.retry_policy.time_until_next_retry(attempt);
                    warn!(url = %self.url, %error, ?delay, "failed to fetch status, retrying");
                    metrics::counter!(SOURCE_ERRORS, "source" => "status").increment(1);

                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}

#[async_trait]
impl PointSource for StatusSource {
    fn fallback_client(&self) -> &'static str {
        "TRAIN"
    }

    async fn start(&mut self) -> Result<Handshake, RelayError> {
        let record = as_record(self.fetch_until_success().await).ok_or(RelayError::EmptySource)?;
        let vehicle = identity_field(&record, "tzn");

        if let Some(vehicle) = &vehicle {
            info!(%vehicle, "running in train");
        }
        self.pending = Some(record);

        Ok(Handshake { vehicle })
    }

    async fn acquire(&mut self, _timeout: Duration) -> Option<Point> {
        let record = match self.pending.take() {
            Some(record) => Some(record),
            None => as_record(self.fetch_until_success().await),
        };

        let Some(record) = record else {
            info!("skipped point due to no status response");
            return None;
        };

        let point = status_point(record);
        if point.is_none() {
            debug!("skipped status without a position");
        }
        point
    }
}

/// Treat falsy responses (`null`, `false`, `0`, `""`, `[]`, `{}`) and non-objects as no data.
pub fn as_record(value: Value) -> Option<Record> {
    match value {
        Value::Object(record) if !record.is_empty() => Some(record),
        _ => None,
    }
}

/// Map a status response to a `Point`, if it has a position.
pub fn status_point(record: Record) -> Option<Point> {
    let latitude = number_field(&record, "latitude")?;
    let longitude = number_field(&record, "longitude")?;
    let speed = number_field(&record, "speed").unwrap_or(0.0);
    let timestamp = record
        .get("serverTime")
        .and_then(Value::as_i64)
        .unwrap_or_else(now_millis);
    let vehicle = identity_field(&record, "tzn");

    Some(
        Point::new(record, latitude, longitude, timestamp)
            .with_speed(speed)
            .with_vehicle(vehicle)
            .with_encoded_keys(ENCODED_KEYS),
    )
}
