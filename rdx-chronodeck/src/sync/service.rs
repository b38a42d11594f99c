//! The network side of clock synchronisation.

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::time::normalize_weekday;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::Deserialize;

/// Offsets are strictly less than one day in magnitude.
const MAX_OFFSET_SECS: i64 = 86_400;

/// A source of authoritative time.
pub trait TimeService {
    /// Full local-time lookup for an IANA zone.
    fn zone_info(&self, timezone: &str) -> Result<ZoneInfo, SyncError>;

    /// Current UTC time in epoch seconds.
    fn utc_epoch(&self) -> Result<f64, SyncError>;
}

/// The fields of a timezone service answer that the sync engine consumes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ZoneInfo {
    /// Local date and time with its UTC offset, RFC 3339.
    pub datetime: String,
    /// 1 = Monday .. 7 = Sunday.
    pub day_of_week: i64,
    pub dst: bool,
    /// End of the current DST window, RFC 3339 in UTC.
    #[serde(default)]
    pub dst_until: Option<String>,
    pub raw_offset: i64,
    pub dst_offset: i64,
}

/// A validated `ZoneInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneReading {
    pub local: NaiveDateTime,
    /// 0 = Monday .. 6 = Sunday.
    pub weekday: u8,
    /// Total offset in force: raw plus DST.
    pub offset_seconds: i64,
    /// End of the active DST window as UTC epoch seconds.
    pub dst_until: Option<i64>,
}

impl ZoneInfo {
    pub fn reading(&self) -> Result<ZoneReading, SyncError> {
        let local = parse_timestamp(&self.datetime)?.naive_local();
        let dst_until = if self.dst {
            let text = self.dst_until.as_deref().ok_or_else(|| {
                SyncError::MalformedResponse("dst is set but dst_until is missing".to_string())
            })?;
            Some(parse_timestamp(text)?.timestamp())
        } else {
            None
        };
        let offset_seconds = self
            .raw_offset
            .checked_add(self.dst_offset)
            .filter(|offset| offset.abs() < MAX_OFFSET_SECS)
            .ok_or_else(|| {
                SyncError::MalformedResponse(format!(
                    "offset {} + {} is not a valid UTC offset",
                    self.raw_offset, self.dst_offset
                ))
            })?;
        Ok(ZoneReading {
            local,
            weekday: normalize_weekday(self.day_of_week),
            offset_seconds,
            dst_until,
        })
    }
}

fn parse_timestamp(text: &str) -> Result<DateTime<FixedOffset>, SyncError> {
    DateTime::parse_from_rfc3339(text)
        .map_err(|err| SyncError::MalformedResponse(format!("bad timestamp '{text}': {err}")))
}

/// Accepts a bare number, or a JSON object carrying `unixtime`.
pub fn parse_epoch_body(body: &str) -> Result<f64, SyncError> {
    let trimmed = body.trim();
    let value = match trimmed.parse::<f64>() {
        Ok(value) => value,
        Err(_) => serde_json::from_str::<serde_json::Value>(trimmed)
            .ok()
            .and_then(|json| json.get("unixtime").and_then(serde_json::Value::as_f64))
            .ok_or_else(|| {
                SyncError::MalformedResponse(format!("no epoch seconds in '{trimmed}'"))
            })?,
    };
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SyncError::MalformedResponse(format!("epoch '{trimmed}' is not finite")))
    }
}

/// Whole epoch seconds of `epoch`, if chrono can represent that instant.
pub fn whole_epoch_seconds(epoch: f64) -> Result<i64, SyncError> {
    let floored = epoch.floor();
    // i64::MIN and i64::MAX saturate, and both are far outside chrono's range.
    let seconds = floored as i64;
    if floored.is_finite() && DateTime::<Utc>::from_timestamp(seconds, 0).is_some() {
        Ok(seconds)
    } else {
        Err(SyncError::MalformedResponse(format!(
            "epoch {epoch} is outside the calendar range"
        )))
    }
}

/// Blocking HTTP client for the timezone and epoch endpoints.
///
/// Requests block the scheduler thread for at most the configured timeout.
pub struct HttpTimeService {
    client: reqwest::blocking::Client,
    lookup_url: String,
    epoch_url: String,
}

impl HttpTimeService {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            lookup_url: config.lookup_url.trim_end_matches('/').to_string(),
            epoch_url: config.epoch_url.clone(),
        })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, SyncError> {
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

impl TimeService for HttpTimeService {
    fn zone_info(&self, timezone: &str) -> Result<ZoneInfo, SyncError> {
        self.get(&format!("{}/{}", self.lookup_url, timezone))?
            .json()
            .map_err(|err| SyncError::MalformedResponse(err.to_string()))
    }

    fn utc_epoch(&self) -> Result<f64, SyncError> {
        parse_epoch_body(&self.get(&self.epoch_url)?.text()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn chicago_summer() -> ZoneInfo {
        serde_json::from_str(
            r#"{
                "abbreviation": "CDT",
                "datetime": "2025-07-04T09:30:15.123456-05:00",
                "day_of_week": 5,
                "dst": true,
                "dst_from": "2025-03-09T08:00:00+00:00",
                "dst_until": "2025-11-02T07:00:00+00:00",
                "raw_offset": -21600,
                "dst_offset": 3600,
                "timezone": "America/Chicago",
                "unixtime": 1751639415
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn reading_keeps_local_fields_and_total_offset() {
        let reading = chicago_summer().reading().unwrap();
        assert_eq!(
            reading.local,
            NaiveDate::from_ymd_opt(2025, 7, 4)
                .unwrap()
                .and_hms_micro_opt(9, 30, 15, 123_456)
                .unwrap()
        );
        assert_eq!(reading.weekday, 4);
        assert_eq!(reading.offset_seconds, -18_000);
        assert_eq!(reading.dst_until, Some(1_762_066_800));
    }

    #[test]
    fn dst_without_end_is_malformed() {
        let mut info = chicago_summer();
        info.dst_until = None;
        assert!(matches!(info.reading(), Err(SyncError::MalformedResponse(_))));
    }

    #[test]
    fn garbage_datetime_is_malformed() {
        let mut info = chicago_summer();
        info.datetime = "yesterday-ish".to_string();
        assert!(matches!(info.reading(), Err(SyncError::MalformedResponse(_))));
    }

    #[test]
    fn epoch_body_accepts_numbers_and_unixtime_objects() {
        assert_eq!(parse_epoch_body("1751639415.75\n").unwrap(), 1_751_639_415.75);
        assert_eq!(parse_epoch_body(r#"{"unixtime": 1751639415}"#).unwrap(), 1_751_639_415.0);
        assert!(parse_epoch_body("soon").is_err());
        assert!(parse_epoch_body("NaN").is_err());
    }

    #[test]
    fn epoch_seconds_are_floored_and_range_checked() {
        assert_eq!(whole_epoch_seconds(1_751_639_415.75).unwrap(), 1_751_639_415);
        assert_eq!(whole_epoch_seconds(-0.5).unwrap(), -1);
        assert!(matches!(
            whole_epoch_seconds(1e300),
            Err(SyncError::MalformedResponse(_))
        ));
        assert!(whole_epoch_seconds(-1e300).is_err());
        assert!(whole_epoch_seconds(f64::INFINITY).is_err());
    }

    #[test]
    fn overflowing_offsets_are_malformed() {
        let mut info = chicago_summer();
        info.raw_offset = i64::MAX;
        assert!(matches!(info.reading(), Err(SyncError::MalformedResponse(_))));

        let mut info = chicago_summer();
        info.raw_offset = 90_000;
        assert!(matches!(info.reading(), Err(SyncError::MalformedResponse(_))));
    }
}
