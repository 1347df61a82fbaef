use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FieldError;

pub const REGION: &str = "Region";
pub const TITLE: &str = "Title";
pub const CHANNEL: &str = "Channel";
pub const VIEWS: &str = "Views";
pub const LIKES: &str = "Likes";
pub const COMMENTS: &str = "Comments";
pub const PUBLISHED_AT: &str = "Published At";

/// Format used whenever a normalized timestamp is written back out.
pub const NORMALIZED_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const OFFSET_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// One video observation as it arrives, from a CSV row or a JSON mapping.
/// Every field is optional here; [`RawVideoRecord::validate`] decides what is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawVideoRecord {
    #[serde(rename = "Region", default)]
    pub region: Option<String>,
    #[serde(rename = "Title", default)]
    pub title: Option<String>,
    #[serde(rename = "Channel", default)]
    pub channel: Option<String>,
    #[serde(rename = "Views", default)]
    pub views: Option<i64>,
    #[serde(rename = "Likes", default)]
    pub likes: Option<i64>,
    #[serde(rename = "Comments", default)]
    pub comments: Option<i64>,
    #[serde(rename = "Published At", alias = "PublishedAt", default)]
    pub published_at: Option<String>,
}

/// Which fields are mandatory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Every column is required; incomplete rows are rejected from the batch.
    Training,
    /// Region is never a model input and may be absent.
    Inference,
}

/// A record whose fields are present, in range, and whose timestamp is normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedVideo {
    pub region: Option<String>,
    pub title: String,
    pub channel: String,
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
    /// UTC wall time with the offset removed.
    pub published_at: NaiveDateTime,
}

impl ValidatedVideo {
    pub fn published_at_utc(&self) -> DateTime<Utc> {
        self.published_at.and_utc()
    }
}

impl RawVideoRecord {
    /// Checks presence first, then values, so a row that is both incomplete
    /// and out of range reports the missing field.
    pub fn validate(&self, mode: ValidationMode) -> Result<ValidatedVideo, FieldError> {
        let region = match (&self.region, mode) {
            (Some(region), _) => Some(region.clone()),
            (None, ValidationMode::Training) => return Err(FieldError::Missing(REGION)),
            (None, ValidationMode::Inference) => None,
        };
        let title = self.title.as_ref().ok_or(FieldError::Missing(TITLE))?;
        let channel = self.channel.as_ref().ok_or(FieldError::Missing(CHANNEL))?;
        let views = self.views.ok_or(FieldError::Missing(VIEWS))?;
        let likes = self.likes.ok_or(FieldError::Missing(LIKES))?;
        let comments = self.comments.ok_or(FieldError::Missing(COMMENTS))?;
        let published_at = self
            .published_at
            .as_deref()
            .ok_or(FieldError::Missing(PUBLISHED_AT))?;

        if title.is_empty() {
            return Err(FieldError::invalid(TITLE, "must not be empty"));
        }
        if views <= 0 {
            return Err(FieldError::invalid(
                VIEWS,
                format!("must be positive, got {}", views),
            ));
        }

        Ok(ValidatedVideo {
            region,
            title: title.clone(),
            channel: channel.clone(),
            views: views as u64,
            likes: non_negative(LIKES, likes)?,
            comments: non_negative(COMMENTS, comments)?,
            published_at: normalize_published_at(published_at)?,
        })
    }
}

fn non_negative(field: &'static str, value: i64) -> Result<u64, FieldError> {
    u64::try_from(value)
        .map_err(|_| FieldError::invalid(field, format!("must not be negative, got {}", value)))
}

/// Converts a timestamp to UTC and drops the offset.
///
/// Offset-aware inputs (`2025-05-05T12:30:00+05:30`, `...Z`) are converted;
/// offset-naive inputs (`2025-05-05 14:30:00`) are taken to already be UTC.
/// Training and inference both go through here, so the same instant always
/// yields the same hour and weekday.
pub fn normalize_published_at(raw: &str) -> Result<NaiveDateTime, FieldError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(FieldError::invalid(PUBLISHED_AT, "is empty"));
    }

    if let Ok(aware) = DateTime::parse_from_rfc3339(value) {
        return Ok(aware.naive_utc());
    }
    for format in OFFSET_FORMATS {
        if let Ok(aware) = DateTime::parse_from_str(value, format) {
            return Ok(aware.naive_utc());
        }
    }

    let naive = value
        .strip_suffix('Z')
        .or_else(|| value.strip_suffix(" UTC"))
        .unwrap_or(value);
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(naive, format) {
            return Ok(parsed);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(naive, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }

    Err(FieldError::invalid(
        PUBLISHED_AT,
        format!("is not a recognized timestamp: '{}'", value),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn record(published_at: &str) -> RawVideoRecord {
        RawVideoRecord {
            region: Some("US".to_string()),
            title: Some("OFFICIAL: Summer Hits 2025".to_string()),
            channel: Some("Music Channel".to_string()),
            views: Some(150_000),
            likes: Some(7_500),
            comments: Some(1_200),
            published_at: Some(published_at.to_string()),
        }
    }

    #[test]
    fn test_offsets_normalize_to_same_instant() {
        let ist = normalize_published_at("2025-05-05T12:30:00+05:30").unwrap();
        let utc = normalize_published_at("2025-05-05T07:00:00Z").unwrap();

        assert_eq!(ist, utc);
        assert_eq!(ist.hour(), 7);
        assert_eq!(ist.weekday().num_days_from_monday(), 0);
    }

    #[test]
    fn test_naive_timestamp_is_taken_as_utc() {
        let naive = normalize_published_at("2025-05-05 14:30:00").unwrap();
        let aware = normalize_published_at("2025-05-05T14:30:00+00:00").unwrap();

        assert_eq!(naive, aware);
    }

    #[test]
    fn test_pandas_style_offset_and_fraction() {
        let parsed = normalize_published_at("2025-05-05 18:30:00.250+05:30").unwrap();

        assert_eq!(parsed.hour(), 13);
        assert_eq!(parsed.minute(), 0);
    }

    #[test]
    fn test_offset_crossing_midnight_changes_weekday() {
        // Monday 02:00 in India is Sunday evening in UTC.
        let parsed = normalize_published_at("2025-05-05T02:00:00+05:30").unwrap();

        assert_eq!(parsed.hour(), 20);
        assert_eq!(parsed.weekday().num_days_from_monday(), 6);
    }

    #[test]
    fn test_malformed_timestamp_is_rejected() {
        let err = normalize_published_at("yesterday at noon").unwrap_err();
        assert_eq!(err.field(), PUBLISHED_AT);

        assert!(normalize_published_at("   ").is_err());
    }

    #[test]
    fn test_validate_complete_record() {
        let video = record("2025-05-05T08:00:00Z")
            .validate(ValidationMode::Training)
            .unwrap();

        assert_eq!(video.views, 150_000);
        assert_eq!(video.published_at.hour(), 8);
        assert_eq!(video.region.as_deref(), Some("US"));
    }

    #[test]
    fn test_region_is_optional_only_for_inference() {
        let mut raw = record("2025-05-05T08:00:00Z");
        raw.region = None;

        assert_eq!(
            raw.validate(ValidationMode::Training),
            Err(FieldError::Missing(REGION))
        );
        assert!(raw.validate(ValidationMode::Inference).is_ok());
    }

    #[test]
    fn test_missing_title_is_reported() {
        let mut raw = record("2025-05-05T08:00:00Z");
        raw.title = None;

        assert_eq!(
            raw.validate(ValidationMode::Inference),
            Err(FieldError::Missing(TITLE))
        );
    }

    #[test]
    fn test_non_positive_views_is_invalid() {
        let mut raw = record("2025-05-05T08:00:00Z");
        raw.views = Some(0);

        let err = raw.validate(ValidationMode::Inference).unwrap_err();
        assert!(matches!(err, FieldError::Invalid { field: VIEWS, .. }));
    }

    #[test]
    fn test_negative_counters_are_invalid() {
        let mut raw = record("2025-05-05T08:00:00Z");
        raw.comments = Some(-3);

        let err = raw.validate(ValidationMode::Inference).unwrap_err();
        assert_eq!(err.field(), COMMENTS);
    }

    #[test]
    fn test_missing_field_wins_over_invalid_value() {
        let mut raw = record("2025-05-05T08:00:00Z");
        raw.views = Some(0);
        raw.channel = None;

        assert_eq!(
            raw.validate(ValidationMode::Training),
            Err(FieldError::Missing(CHANNEL))
        );
    }

    #[test]
    fn test_deserialize_from_json_mapping() {
        let raw: RawVideoRecord = serde_json::from_str(
            r#"{"Title": "Daily Vlog", "Channel": "Delhi Foodie", "Views": 850000,
                "Likes": 65000, "Comments": 8000, "PublishedAt": "2025-05-05T12:30:00+05:30"}"#,
        )
        .unwrap();

        assert_eq!(raw.region, None);
        assert_eq!(raw.views, Some(850_000));
        assert_eq!(
            raw.published_at.as_deref(),
            Some("2025-05-05T12:30:00+05:30")
        );
    }
}
