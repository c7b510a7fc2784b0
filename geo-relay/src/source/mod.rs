use std::time::Duration;

use async_trait::async_trait;
use geo_common::point::Point;

use crate::error::RelayError;

pub mod gpsd;
pub mod status;

/// What a source learned while starting up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Identity the source reported for the vehicle, if it reports one.
    pub vehicle: Option<String>,
}

#[async_trait]
pub trait PointSource: Send {
    /// Client name used when neither configuration nor points carry an identity.
    fn fallback_client(&self) -> &'static str;

    /// Perform the one-time handshake with the source. Only an unusable first response is fatal;
    /// an unreachable source is waited for.
    async fn start(&mut self) -> Result<Handshake, RelayError>;

    /// Return the next point, or `None` if there is no usable point yet.
    /// Which of `timeout` and the source's own retry loop bounds the wait depends on the source.
    async fn acquire(&mut self, timeout: Duration) -> Option<Point>;
}
