use serde_json::{Map, Value};

/// A telemetry record exactly as a source reported it.
pub type Record = Map<String, Value>;

/// One telemetry sample.
///
/// A `Point` keeps the verbatim source `Record` next to the fields the relay interprets. Sources
/// only construct a `Point` when both coordinates are available, so a `Point` always has a
/// position.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Degrees.
    pub latitude: f64,
    /// Degrees.
    pub longitude: f64,
    /// Meters per second, 0 when the source did not report it.
    pub speed: f64,
    /// Milliseconds since the epoch, source-reported or read from the local clock.
    pub timestamp: i64,
    /// Meters.
    pub elevation: Option<f64>,
    /// Combined horizontal accuracy in meters.
    pub accuracy: Option<f64>,
    /// Identity the source attached to the sample, like a train number.
    pub vehicle: Option<String>,
    record: Record,
    encoded_keys: &'static [&'static str],
}

impl Point {
    pub fn new(record: Record, latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            speed: 0.0,
            timestamp,
            elevation: None,
            accuracy: None,
            vehicle: None,
            record,
            encoded_keys: &[],
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_elevation(mut self, elevation: Option<f64>) -> Self {
        self.elevation = elevation;
        self
    }

    pub fn with_accuracy(mut self, accuracy: Option<f64>) -> Self {
        self.accuracy = accuracy;
        self
    }

    pub fn with_vehicle(mut self, vehicle: Option<String>) -> Self {
        self.vehicle = vehicle;
        self
    }

    /// Record keys the hub receives as query parameters rather than in the request body.
    pub fn with_encoded_keys(mut self, keys: &'static [&'static str]) -> Self {
        self.encoded_keys = keys;
        self
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// The record without any of the fields already encoded positionally.
    pub fn residual(&self) -> Record {
        self.record
            .iter()
            .filter(|(key, _)| !self.encoded_keys.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Read a numeric field. Missing fields, `null` and sentinels like `"n/a"` all read as `None`.
pub fn number_field(record: &Record, key: &str) -> Option<f64> {
    record
        .get(key)
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
}

/// Read a field that identifies something. Numbers are accepted as well as strings.
pub fn identity_field(record: &Record, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(value) if !value.trim().is_empty() => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}
