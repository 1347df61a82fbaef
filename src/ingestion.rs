//! Client for the video catalog "most popular" chart.
//!
//! Each region is fetched independently with a timeout and exponential
//! backoff. A region that keeps failing is logged and skipped.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::IngestionSettings;
use crate::dataset::{raw_records_to_frame, write_csv_file};
use crate::error::IngestionError;
use crate::record::RawVideoRecord;

#[derive(Debug, Deserialize)]
pub struct ChartResponse {
    #[serde(default)]
    pub items: Vec<ChartItem>,
}

#[derive(Debug, Deserialize)]
pub struct ChartItem {
    pub snippet: Option<Snippet>,
    pub statistics: Option<Statistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub title: Option<String>,
    pub channel_title: Option<String>,
    pub published_at: Option<String>,
}

/// Counters come back as decimal strings and are omitted when hidden.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub view_count: Option<String>,
    pub like_count: Option<String>,
    pub comment_count: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Exponential backoff: `initial * multiplier^attempt`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(settings: &IngestionSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            backoff_multiplier: settings.backoff_multiplier,
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .mul_f64(self.backoff_multiplier.powi(attempt as i32))
    }

    pub fn should_retry(&self, error: &IngestionError, attempt: u32) -> bool {
        error.is_retryable() && attempt < self.max_retries
    }
}

impl IngestionError {
    /// Timeouts, connection failures, throttling and server errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            IngestionError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            IngestionError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub struct CatalogClient {
    client: Client,
    api_key: String,
    settings: IngestionSettings,
    retry_policy: RetryPolicy,
}

impl CatalogClient {
    /// Builds a client, reading the API key from `settings.api_key_env`.
    pub fn new(settings: &IngestionSettings) -> Result<Self, IngestionError> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| IngestionError::MissingApiKey(settings.api_key_env.clone()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_sec))
            .build()?;

        Ok(Self {
            client,
            api_key,
            settings: settings.clone(),
            retry_policy: RetryPolicy::new(settings),
        })
    }

    fn fetch_region_once(&self, region: &str) -> Result<ChartResponse, IngestionError> {
        let max_results = self.settings.max_results.to_string();
        let response = self
            .client
            .get(&self.settings.base_url)
            .query(&[
                ("part", "snippet,statistics"),
                ("chart", "mostPopular"),
                ("regionCode", region),
                ("maxResults", max_results.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(IngestionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json()?)
    }

    /// Fetches one region's chart, retrying transient failures.
    pub fn fetch_region(&self, region: &str) -> Result<Vec<RawVideoRecord>, IngestionError> {
        let mut attempt = 0;
        loop {
            match self.fetch_region_once(region) {
                Ok(response) => {
                    let records = flatten(region, response);
                    debug!("Fetched {} videos for region {}", records.len(), region);
                    return Ok(records);
                }
                Err(e) if self.retry_policy.should_retry(&e, attempt) => {
                    let wait = self.retry_policy.backoff(attempt);
                    warn!(
                        "Region {} attempt {} failed ({}), retrying in {:?}",
                        region,
                        attempt + 1,
                        e,
                        wait
                    );
                    thread::sleep(wait);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetches every configured region. Failing regions are skipped.
    pub fn fetch_all(&self) -> Result<Vec<RawVideoRecord>, IngestionError> {
        let mut records = Vec::new();
        for region in &self.settings.regions {
            match self.fetch_region(region) {
                Ok(mut fetched) => records.append(&mut fetched),
                Err(e) => error!("Skipping region {}: {}", region, e),
            }
        }

        if records.is_empty() {
            return Err(IngestionError::NothingFetched);
        }
        info!(
            "Fetched {} videos from {} regions",
            records.len(),
            self.settings.regions.len()
        );
        Ok(records)
    }
}

fn parse_count(value: Option<&String>) -> i64 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

/// One raw record per chart item. Hidden like and comment counters become
/// 0; a missing view count and missing text fields stay missing so
/// validation rejects the row.
pub fn flatten(region: &str, response: ChartResponse) -> Vec<RawVideoRecord> {
    response
        .items
        .into_iter()
        .map(|item| {
            let statistics = item.statistics;
            let snippet = item.snippet;
            RawVideoRecord {
                region: Some(region.to_string()),
                title: snippet.as_ref().and_then(|s| s.title.clone()),
                channel: snippet.as_ref().and_then(|s| s.channel_title.clone()),
                views: statistics
                    .as_ref()
                    .and_then(|s| s.view_count.as_ref())
                    .and_then(|v| v.trim().parse().ok()),
                likes: Some(parse_count(
                    statistics.as_ref().and_then(|s| s.like_count.as_ref()),
                )),
                comments: Some(parse_count(
                    statistics.as_ref().and_then(|s| s.comment_count.as_ref()),
                )),
                published_at: snippet.and_then(|s| s.published_at),
            }
        })
        .collect()
}

pub fn snapshot_file_name(date: NaiveDate) -> String {
    format!("youtube_trending_{}.csv", date.format("%Y-%m-%d"))
}

/// Writes `records` as `youtube_trending_<date>.csv` under `dir`.
pub fn write_snapshot(
    records: &[RawVideoRecord],
    dir: &Path,
    date: NaiveDate,
) -> Result<PathBuf, IngestionError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(snapshot_file_name(date));
    let mut df = raw_records_to_frame(records)?;
    write_csv_file(&mut df, &path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::load_raw_records;
    use crate::error::FieldError;
    use crate::record::VIEWS;

    const CHART: &str = r#"{
        "kind": "youtube#videoListResponse",
        "items": [
            {
                "id": "a1",
                "snippet": {
                    "title": "OFFICIAL: Summer Hits 2025",
                    "channelTitle": "Music Channel",
                    "publishedAt": "2025-05-05T08:00:00Z"
                },
                "statistics": {
                    "viewCount": "150000",
                    "likeCount": "7500",
                    "commentCount": "1200"
                }
            },
            {
                "id": "b2",
                "snippet": {
                    "title": "Comments off",
                    "channelTitle": "Quiet Channel",
                    "publishedAt": "2025-05-04T21:15:00Z"
                },
                "statistics": { "viewCount": "900" }
            },
            {
                "id": "c3",
                "snippet": { "channelTitle": "No Title" }
            }
        ]
    }"#;

    fn chart() -> ChartResponse {
        serde_json::from_str(CHART).unwrap()
    }

    #[test]
    fn test_flatten_chart_items() {
        let records = flatten("IN", chart());

        assert_eq!(records.len(), 3);
        assert_eq!(
            records[0],
            RawVideoRecord {
                region: Some("IN".to_string()),
                title: Some("OFFICIAL: Summer Hits 2025".to_string()),
                channel: Some("Music Channel".to_string()),
                views: Some(150_000),
                likes: Some(7500),
                comments: Some(1200),
                published_at: Some("2025-05-05T08:00:00Z".to_string()),
            }
        );
    }

    #[test]
    fn test_hidden_counters_become_zero() {
        let records = flatten("US", chart());

        assert_eq!(records[1].views, Some(900));
        assert_eq!(records[1].likes, Some(0));
        assert_eq!(records[1].comments, Some(0));
        assert_eq!(records[2].views, None);
        assert_eq!(records[2].title, None);
        assert_eq!(records[2].published_at, None);
    }

    #[test]
    fn test_item_without_statistics_is_rejected_not_fatal() {
        let response: ChartResponse = serde_json::from_str(
            r#"{"items": [
                {
                    "snippet": {
                        "title": "Counted",
                        "channelTitle": "Music Channel",
                        "publishedAt": "2025-05-05T08:00:00Z"
                    },
                    "statistics": { "viewCount": "1200", "likeCount": "40" }
                },
                {
                    "snippet": {
                        "title": "Private stats",
                        "channelTitle": "Music Channel",
                        "publishedAt": "2025-05-05T09:00:00Z"
                    }
                }
            ]}"#,
        )
        .unwrap();
        let records = flatten("GB", response);
        let now = chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2025, 5, 6, 0, 0, 0).unwrap();

        let batch = crate::features::prepare_batch(&records, now).unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].row, 1);
        assert_eq!(batch.rejected[0].reason, FieldError::Missing(VIEWS));
    }

    #[test]
    fn test_empty_chart() {
        let response: ChartResponse = serde_json::from_str("{}").unwrap();
        assert!(flatten("JP", response).is_empty());
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let policy = RetryPolicy::new(&IngestionSettings::default());

        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2000));
    }

    #[test]
    fn test_retry_only_transient_errors() {
        let policy = RetryPolicy::new(&IngestionSettings::default());
        let throttled = IngestionError::Api {
            status: 429,
            message: "quota".to_string(),
        };
        let forbidden = IngestionError::Api {
            status: 403,
            message: "bad key".to_string(),
        };

        assert!(policy.should_retry(&throttled, 0));
        assert!(!policy.should_retry(&throttled, 3));
        assert!(!policy.should_retry(&forbidden, 0));
    }

    #[test]
    fn test_missing_api_key() {
        let settings = IngestionSettings {
            api_key_env: "TRENDING_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..Default::default()
        };

        assert!(matches!(
            CatalogClient::new(&settings),
            Err(IngestionError::MissingApiKey(_))
        ));
    }

    #[test]
    fn test_write_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 5, 5).unwrap();
        let records = flatten("IN", chart());

        let path = write_snapshot(&records, dir.path(), date).unwrap();

        assert_eq!(path, dir.path().join("youtube_trending_2025-05-05.csv"));
        let loaded = load_raw_records(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0], records[0]);
        assert_eq!(loaded[2].title, None);
    }
}
