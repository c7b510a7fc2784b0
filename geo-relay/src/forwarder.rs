use std::time;

use geo_common::hub::HubTemplate;
use geo_common::ids::ClientResolver;
use geo_common::metrics::{DELIVERIES_FAILED, DELIVERY_DURATION};
use geo_common::point::Point;
use reqwest::header;
use tracing::warn;

use crate::error::{DeliveryError, RelayError};

/// The hub keeps at most this many bytes of a point's body.
pub const MAX_BODY_BYTES: usize = 4096;

/// Delivers points to the hub, one POST per point.
pub struct Forwarder {
    /// The client used for HTTP requests.
    client: reqwest::Client,
    /// Template of the URL points are logged to.
    hub: HubTemplate,
    /// Decides the client name each point is logged under.
    identity: ClientResolver,
}

impl Forwarder {
    pub fn new(
        hub: HubTemplate,
        identity: ClientResolver,
        request_timeout: time::Duration,
    ) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .user_agent("geo-relay")
            .timeout(request_timeout)
            .build()
            .map_err(RelayError::HttpClientError)?;

        Ok(Self {
            client,
            hub,
            identity,
        })
    }

    pub fn identity(&self) -> &ClientResolver {
        &self.identity
    }

    /// Make an HTTP request to log a point on the hub.
    ///
    /// The position, speed and time travel in the query string; whatever else the source reported
    /// is sent as a JSON body. If nothing else was reported, the body is empty and untyped.
    pub async fn send(&self, point: &Point) -> Result<(), DeliveryError> {
        let client_name = self.identity.resolve(point.vehicle.as_deref());
        let url = self.hub.log_url(&client_name, point)?;

        let mut request = self.client.post(url);
        let residual = point.residual();
        if !residual.is_empty() {
            let body = serde_json::to_vec(&residual)?;
            if body.len() > MAX_BODY_BYTES {
                warn!(
                    bytes = body.len(),
                    limit = MAX_BODY_BYTES,
                    "point body exceeds what the hub keeps"
                );
            }
            request = request
                .header(header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::StatusError(status));
        }

        Ok(())
    }

    /// Send a point, best effort. Failures are logged and otherwise ignored: the next point is
    /// attempted independently.
    pub async fn deliver(&self, point: &Point) {
        let now = tokio::time::Instant::now();
        let result = self.send(point).await;
        metrics::histogram!(DELIVERY_DURATION).record(now.elapsed().as_secs_f64());

        if let Err(error) = result {
            warn!(%error, "failed to deliver point to the hub");
            metrics::counter!(DELIVERIES_FAILED).increment(1);
        }
    }
}
