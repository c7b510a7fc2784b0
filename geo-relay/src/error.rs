use geo_common::hub::HubUrlError;
use thiserror::Error;

/// Enumeration of errors a source may run into while acquiring points. Sources recover from all of
/// these on their own: they never reach the pipeline.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to fetch status: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("failed to decode status: {0}")]
    DecodeError(#[from] serde_json::Error),
    #[error("source connection failed: {0}")]
    IoError(#[from] std::io::Error),
    #[error("source closed the connection")]
    ConnectionClosed,
}

/// Enumeration of errors related to delivering a point to the hub.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("error building hub url: {0}")]
    InvalidUrl(#[from] HubUrlError),
    #[error("error serializing the request body")]
    SerializeError(#[from] serde_json::Error),
    #[error("a point could not be delivered to the hub: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("the hub rejected a point with status {0}")]
    StatusError(reqwest::StatusCode),
}

/// Enumeration of errors that terminate the relay.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("invalid configuration: {0}")]
    EnvError(#[from] envconfig::Error),
    #[error("invalid hub configuration: {0}")]
    HubError(#[from] HubUrlError),
    #[error("failed to construct the http client: {0}")]
    HttpClientError(reqwest::Error),
    #[error("empty info received from the source, no vehicle identity to proceed with")]
    EmptySource,
    #[error("failed to write to the output file: {0}")]
    SinkError(#[from] std::io::Error),
}
