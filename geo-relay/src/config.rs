use std::path::Path;
use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "SOURCE", default = "gpsd")]
    pub source: SourceKind,

    #[envconfig(from = "GPSD_HOST", default = "127.0.0.1")]
    pub gpsd_host: String,

    #[envconfig(from = "GPSD_PORT", default = "2947")]
    pub gpsd_port: u16,

    #[envconfig(from = "STATUS_URL", default = "https://iceportal.de/api1/rs/status")]
    pub status_url: NonEmptyString,

    /// Client name points are logged under. When empty, the vehicle identity reported by the
    /// source is used instead.
    #[envconfig(from = "CLIENT", default = "")]
    pub client: String,

    /// Protects the current location on the hub: to share it, share the secret. When empty, points
    /// are public.
    #[envconfig(from = "SECRET", default = "")]
    pub secret: String,

    /// Minimum time between emissions for gpsd, time between polls for the status endpoint.
    /// 0 emits every point gpsd reports.
    #[envconfig(from = "INTERVAL", default = "5000")]
    pub interval: EnvMsDuration,

    /// Where emitted points are written as JSON lines. Empty to discard them.
    #[envconfig(from = "OUTFILE", default = "data.jsonlines")]
    pub outfile: String,

    #[envconfig(nested = true)]
    pub hub: HubConfig,

    #[envconfig(from = "ACQUIRE_TIMEOUT", default = "5000")]
    pub acquire_timeout: EnvMsDuration,

    #[envconfig(nested = true)]
    pub retry_policy: RetryPolicyConfig,

    #[envconfig(from = "REQUEST_TIMEOUT", default = "10000")]
    pub request_timeout: EnvMsDuration,

    #[envconfig(from = "EXPORT_PROMETHEUS", default = "false")]
    pub export_prometheus: bool,

    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3302")]
    pub port: u16,
}

impl Config {
    /// Produce a host:port address for binding the metrics TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Produce the host:port address gpsd listens on.
    pub fn gpsd_address(&self) -> String {
        format!("{}:{}", self.gpsd_host, self.gpsd_port)
    }

    pub fn output_path(&self) -> Option<&Path> {
        if self.outfile.is_empty() {
            None
        } else {
            Some(Path::new(&self.outfile))
        }
    }
}

#[derive(Envconfig, Clone)]
pub struct HubConfig {
    #[envconfig(from = "GEOHUB_HOST", default = "example.com")]
    pub host: String,

    #[envconfig(from = "GEOHUB_SCHEME", default = "https")]
    pub scheme: String,

    /// {PROTOCOL}, {HOST}, {CLIENT} and {SECRET} are replaced by the scheme, host, client and
    /// secret.
    #[envconfig(from = "GEOHUB_TEMPLATE", default = "{PROTOCOL}://{HOST}/geo/{CLIENT}/log?secret={SECRET}")]
    pub log_template: String,

    #[envconfig(from = "LIVEMAP_TEMPLATE", default = "{PROTOCOL}://{HOST}/geo/assets/livemap.html")]
    pub live_map_template: String,
}

/// Pacing of source reconnects and refetches. The default coefficient of 1 waits the same delay
/// every time.
#[derive(Envconfig, Clone)]
pub struct RetryPolicyConfig {
    #[envconfig(from = "RETRY_BACKOFF_COEFFICIENT", default = "1")]
    pub backoff_coefficient: u32,

    #[envconfig(from = "RETRY_DELAY", default = "5000")]
    pub initial_interval: EnvMsDuration,

    #[envconfig(from = "MAXIMUM_RETRY_DELAY", default = "60000")]
    pub maximum_interval: EnvMsDuration,
}

/// Which kind of source telemetry is acquired from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A local gpsd daemon pushing reports over its socket protocol.
    Gpsd,
    /// An HTTP status endpoint polled on an interval.
    Status,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseSourceKindError(String);

impl FromStr for SourceKind {
    type Err = ParseSourceKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_ref() {
            "gpsd" | "stream" | "streaming" => Ok(SourceKind::Gpsd),
            "status" | "poll" | "polling" => Ok(SourceKind::Status),
            invalid => Err(ParseSourceKindError(invalid.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}
