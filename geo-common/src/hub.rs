use thiserror::Error;
use url::Url;

use crate::ids::identifier_acceptable;
use crate::point::Point;
use crate::timestamp::{format_epoch_millis, TimestampError};

pub const PROTOCOL_PLACEHOLDER: &str = "{PROTOCOL}";
pub const HOST_PLACEHOLDER: &str = "{HOST}";
pub const CLIENT_PLACEHOLDER: &str = "{CLIENT}";
pub const SECRET_PLACEHOLDER: &str = "{SECRET}";

pub const DEFAULT_LOG_TEMPLATE: &str = "{PROTOCOL}://{HOST}/geo/{CLIENT}/log?secret={SECRET}";
pub const DEFAULT_LIVE_MAP_TEMPLATE: &str = "{PROTOCOL}://{HOST}/geo/assets/livemap.html";

/// Enumeration of errors related to building hub URLs.
#[derive(Error, Debug)]
pub enum HubUrlError {
    #[error("{0} is not a supported scheme, expected http or https")]
    InvalidScheme(String),
    #[error("{0:?} is not a valid host")]
    InvalidHost(String),
    #[error("{0:?} is not a valid client name, it must be ASCII alphanumeric")]
    InvalidClient(String),
    #[error("the secret must be ASCII alphanumeric")]
    InvalidSecret,
    #[error("error parsing hub url")]
    ParseUrlError(#[from] url::ParseError),
    #[error("error formatting point timestamp")]
    TimestampError(#[from] TimestampError),
}

/// A URL template for the hub.
///
/// Placeholders are only ever substituted with validated values: the scheme must be http(s), the
/// host may not carry path or query characters, and client and secret must be ASCII alphanumeric.
/// Everything derived from a point is appended as form-encoded query pairs afterwards.
#[derive(Debug, Clone)]
pub struct HubTemplate {
    template: String,
    scheme: String,
    host: String,
    secret: String,
}

impl HubTemplate {
    pub fn new(
        template: &str,
        scheme: &str,
        host: &str,
        secret: &str,
    ) -> Result<Self, HubUrlError> {
        let scheme = scheme.to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(HubUrlError::InvalidScheme(scheme));
        }
        if !host_acceptable(host) {
            return Err(HubUrlError::InvalidHost(host.to_owned()));
        }
        if !identifier_acceptable(secret) {
            return Err(HubUrlError::InvalidSecret);
        }

        let hub = Self {
            template: template.to_owned(),
            scheme,
            host: host.to_owned(),
            secret: secret.to_owned(),
        };
        // Catch malformed templates at startup rather than on the first point.
        hub.expand("client")?;

        Ok(hub)
    }

    /// Substitute every placeholder and parse the result.
    pub fn expand(&self, client: &str) -> Result<Url, HubUrlError> {
        if client.is_empty() || !identifier_acceptable(client) {
            return Err(HubUrlError::InvalidClient(client.to_owned()));
        }

        let expanded = self
            .template
            .replace(PROTOCOL_PLACEHOLDER, &self.scheme)
            .replace(HOST_PLACEHOLDER, &self.host)
            .replace(CLIENT_PLACEHOLDER, client)
            .replace(SECRET_PLACEHOLDER, &self.secret);

        Ok(Url::parse(&expanded)?)
    }

    /// Build the URL a point is logged to.
    ///
    /// Query keys follow the hub's ingest route: `lat`, `longitude`, `s` (speed), `time`, and
    /// `ele`/`accuracy` when the point carries them.
    pub fn log_url(&self, client: &str, point: &Point) -> Result<Url, HubUrlError> {
        let mut url = self.expand(client)?;
        let time = format_epoch_millis(point.timestamp)?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("lat", &point.latitude.to_string())
                .append_pair("longitude", &point.longitude.to_string())
                .append_pair("s", &point.speed.to_string())
                .append_pair("time", &time);
            if let Some(elevation) = point.elevation {
                query.append_pair("ele", &elevation.to_string());
            }
            if let Some(accuracy) = point.accuracy {
                query.append_pair("accuracy", &accuracy.to_string());
            }
        }

        Ok(url)
    }

    /// Build the URL of the live map showing a client's points.
    pub fn live_map_url(&self, client: &str) -> Result<Url, HubUrlError> {
        let mut url = self.expand(client)?;
        url.query_pairs_mut()
            .append_pair("client", client)
            .append_pair("secret", &self.secret);

        Ok(url)
    }
}

fn host_acceptable(host: &str) -> bool {
    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'))
}
