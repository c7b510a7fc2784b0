use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;

#[derive(Error, Debug)]
pub enum TimestampError {
    #[error("{0} milliseconds is outside the representable range of timestamps")]
    OutOfRange(i64),
    #[error("failed to format timestamp")]
    FormatError(#[from] time::error::Format),
}

/// Format milliseconds since the Unix epoch the way the hub ingests them:
/// `YYYY-MM-DDTHH:MM:SSZ`, UTC.
/// Sub-second precision is truncated.
pub fn format_epoch_millis(millis: i64) -> Result<String, TimestampError> {
    let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");
    let datetime = OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|_| TimestampError::OutOfRange(millis))?;

    Ok(datetime.format(&format)?)
}

/// Parse an RFC 3339 timestamp, like the ones reported by gpsd, into milliseconds since the epoch.
pub fn parse_rfc3339_millis(value: &str) -> Option<i64> {
    let datetime = OffsetDateTime::parse(value, &Rfc3339).ok()?;
    i64::try_from(datetime.unix_timestamp_nanos() / 1_000_000).ok()
}

/// Milliseconds since the epoch according to the local clock.
pub fn now_millis() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}
