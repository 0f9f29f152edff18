//! RFC 3339 parsing/formatting and interval truncation.

use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

#[derive(Debug, thiserror::Error)]
pub enum TimestampError {
    #[error("invalid RFC 3339 timestamp {input:?}: {source}")]
    Parse {
        input: String,
        #[source]
        source: time::error::Parse,
    },
    #[error("failed to format timestamp: {0}")]
    Format(#[from] time::error::Format),
}

/// Parse an RFC 3339 timestamp, normalized to UTC.
pub fn parse_rfc3339(input: &str) -> Result<OffsetDateTime, TimestampError> {
    OffsetDateTime::parse(input, &Rfc3339)
        .map(|t| t.to_offset(time::UtcOffset::UTC))
        .map_err(|source| TimestampError::Parse {
            input: input.to_string(),
            source,
        })
}

pub fn format_rfc3339(ts: OffsetDateTime) -> Result<String, TimestampError> {
    Ok(ts.format(&Rfc3339)?)
}

/// Round `ts` down to a multiple of `step` since the Unix epoch.
///
/// A non-positive `step` returns `ts` unchanged.
pub fn truncate(ts: OffsetDateTime, step: Duration) -> OffsetDateTime {
    let step_nanos = step.whole_nanoseconds();
    if step_nanos <= 0 {
        return ts;
    }
    let nanos = ts.unix_timestamp_nanos();
    let excess = nanos.rem_euclid(step_nanos);
    ts - Duration::new(
        (excess / 1_000_000_000) as i64,
        (excess % 1_000_000_000) as i32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn truncate_to_interval() {
        let ts = datetime!(2020-01-01 1:07:42.5 UTC);
        assert_eq!(
            truncate(ts, Duration::minutes(5)),
            datetime!(2020-01-01 1:05 UTC)
        );
        assert_eq!(
            truncate(ts, Duration::minutes(1)),
            datetime!(2020-01-01 1:07 UTC)
        );
    }

    #[test]
    fn truncate_before_unix_epoch_rounds_down() {
        let ts = datetime!(1969-12-31 23:59:30 UTC);
        assert_eq!(
            truncate(ts, Duration::minutes(1)),
            datetime!(1969-12-31 23:59 UTC)
        );
    }

    #[test]
    fn parse_and_format_round_trip_to_utc() {
        let ts = parse_rfc3339("2021-01-01T02:00:00+01:00").unwrap();
        assert_eq!(ts, datetime!(2021-01-01 1:00 UTC));
        assert_eq!(format_rfc3339(ts).unwrap(), "2021-01-01T01:00:00Z");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            parse_rfc3339("yesterday"),
            Err(TimestampError::Parse { .. })
        ));
    }
}
