use std::collections::HashMap;

use chrono::{DateTime, Datelike, Timelike, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FeatureError, FieldError};
use crate::record::{RawVideoRecord, ValidatedVideo, ValidationMode};
use crate::sentiment;

/// Label column, present only on training batches.
pub const IS_TRENDING: &str = "Is_Trending";

/// Share of the batch above which a video counts as trending.
pub const DEFAULT_TRENDING_QUANTILE: f64 = 0.8;

lazy_static! {
    static ref NON_WORD_CHAR: Regex =
        Regex::new(r"[^\w\s]").expect("Invalid Regex, this should be fixed at compile time.");
}

/// A derived column the model may consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    UploadHour,
    UploadWeekday,
    TitleLength,
    LikeViewRatio,
    CommentViewRatio,
    LikeCommentRatio,
    TitleHasEmoji,
    TitleSentimentScore,
    TitleWordCount,
    TitleCapsRatio,
    HasOfficial,
    ChannelFrequency,
    HoursSinceUpload,
    EngagementScore,
}

impl Feature {
    pub const ALL: [Feature; 14] = [
        Feature::UploadHour,
        Feature::UploadWeekday,
        Feature::TitleLength,
        Feature::LikeViewRatio,
        Feature::CommentViewRatio,
        Feature::LikeCommentRatio,
        Feature::TitleHasEmoji,
        Feature::TitleSentimentScore,
        Feature::TitleWordCount,
        Feature::TitleCapsRatio,
        Feature::HasOfficial,
        Feature::ChannelFrequency,
        Feature::HoursSinceUpload,
        Feature::EngagementScore,
    ];

    pub fn column_name(self) -> &'static str {
        match self {
            Feature::UploadHour => "Upload_Hour",
            Feature::UploadWeekday => "Upload_Weekday",
            Feature::TitleLength => "Title_Length",
            Feature::LikeViewRatio => "Like_View_Ratio",
            Feature::CommentViewRatio => "Comment_View_Ratio",
            Feature::LikeCommentRatio => "Like_Comment_Ratio",
            Feature::TitleHasEmoji => "Title_Has_Emoji",
            Feature::TitleSentimentScore => "Title_Sentiment_Score",
            Feature::TitleWordCount => "Title_Word_Count",
            Feature::TitleCapsRatio => "Title_Caps_Ratio",
            Feature::HasOfficial => "Has_Official",
            Feature::ChannelFrequency => "Channel_Frequency",
            Feature::HoursSinceUpload => "Hours_Since_Upload",
            Feature::EngagementScore => "Engagement_Score",
        }
    }

    pub fn from_column_name(name: &str) -> Option<Feature> {
        Feature::ALL.into_iter().find(|f| f.column_name() == name)
    }

    /// Counts, flags and calendar fields; everything else is a real number.
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            Feature::UploadHour
                | Feature::UploadWeekday
                | Feature::TitleLength
                | Feature::TitleHasEmoji
                | Feature::TitleWordCount
                | Feature::HasOfficial
                | Feature::ChannelFrequency
        )
    }
}

/// Ordered list of model inputs. Bump `version` whenever the list changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSchema {
    pub version: u32,
    pub features: &'static [Feature],
}

pub const CURRENT_SCHEMA: FeatureSchema = FeatureSchema {
    version: 1,
    features: &Feature::ALL,
};

impl FeatureSchema {
    pub fn column_names(&self) -> Vec<&'static str> {
        self.features.iter().map(|f| f.column_name()).collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Engineered values for one video.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub upload_hour: u32,
    pub upload_weekday: u32,
    pub title_length: u32,
    pub like_view_ratio: f64,
    pub comment_view_ratio: f64,
    pub like_comment_ratio: f64,
    pub title_has_emoji: bool,
    pub title_sentiment_score: f64,
    pub title_word_count: u32,
    pub title_caps_ratio: f64,
    pub has_official: bool,
    pub channel_frequency: u32,
    pub hours_since_upload: f64,
    pub engagement_score: f64,
}

impl FeatureVector {
    pub fn value(&self, feature: Feature) -> f64 {
        match feature {
            Feature::UploadHour => self.upload_hour as f64,
            Feature::UploadWeekday => self.upload_weekday as f64,
            Feature::TitleLength => self.title_length as f64,
            Feature::LikeViewRatio => self.like_view_ratio,
            Feature::CommentViewRatio => self.comment_view_ratio,
            Feature::LikeCommentRatio => self.like_comment_ratio,
            Feature::TitleHasEmoji => flag(self.title_has_emoji),
            Feature::TitleSentimentScore => self.title_sentiment_score,
            Feature::TitleWordCount => self.title_word_count as f64,
            Feature::TitleCapsRatio => self.title_caps_ratio,
            Feature::HasOfficial => flag(self.has_official),
            Feature::ChannelFrequency => self.channel_frequency as f64,
            Feature::HoursSinceUpload => self.hours_since_upload,
            Feature::EngagementScore => self.engagement_score,
        }
    }

    /// Values in schema order.
    pub fn to_row(&self, schema: &FeatureSchema) -> Vec<f64> {
        schema.features.iter().map(|&f| self.value(f)).collect()
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// How many rows of a batch each channel has.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelFrequencies(HashMap<String, u32>);

impl ChannelFrequencies {
    pub fn from_videos(videos: &[ValidatedVideo]) -> Self {
        let mut counts = HashMap::new();
        for video in videos {
            *counts.entry(video.channel.clone()).or_insert(0) += 1;
        }
        ChannelFrequencies(counts)
    }

    pub fn get(&self, channel: &str) -> Option<u32> {
        self.0.get(channel).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A row left out of a batch because a required field was absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    pub row: usize,
    pub reason: FieldError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineeredVideoRecord {
    pub video: ValidatedVideo,
    pub features: FeatureVector,
    pub is_trending: Option<bool>,
}

/// Result of preparing a raw table.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineeredBatch {
    pub records: Vec<EngineeredVideoRecord>,
    pub rejected: Vec<RejectedRow>,
    /// Channel counts over the accepted rows of this batch.
    pub channel_frequencies: ChannelFrequencies,
    /// Views cut-off used for labeling; `None` for unlabeled batches.
    pub view_threshold: Option<f64>,
}

impl EngineeredBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn trending_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.is_trending == Some(true))
            .count()
    }
}

/// Derives every model feature of one video.
///
/// `channel_frequency` comes from whatever table the caller treats as the
/// reference (the batch itself while training, the frozen training counts
/// at inference). `now` anchors `Hours_Since_Upload`.
pub fn engineer(
    video: &ValidatedVideo,
    channel_frequency: u32,
    now: DateTime<Utc>,
) -> FeatureVector {
    let published = video.published_at;
    let title = video.title.as_str();
    let title_length = title.chars().count() as u32;

    let views = video.views as f64;
    let likes = video.likes as f64;
    let comments = video.comments as f64;

    let uppercase = title.chars().filter(|c| c.is_uppercase()).count();
    let title_caps_ratio = if title_length == 0 {
        0.0
    } else {
        uppercase as f64 / title_length as f64
    };

    let elapsed = now - video.published_at_utc();

    FeatureVector {
        upload_hour: published.hour(),
        upload_weekday: published.weekday().num_days_from_monday(),
        title_length,
        like_view_ratio: likes / views,
        comment_view_ratio: comments / views,
        like_comment_ratio: likes / (comments + 1.0),
        title_has_emoji: NON_WORD_CHAR.is_match(title),
        title_sentiment_score: sentiment::polarity(title),
        title_word_count: title.split_whitespace().count() as u32,
        title_caps_ratio,
        has_official: title.to_lowercase().contains("official"),
        channel_frequency,
        hours_since_upload: elapsed.num_milliseconds() as f64 / 3_600_000.0,
        engagement_score: (likes * 0.6 + comments * 0.4) / views,
    }
}

/// Validates every row of a raw table.
///
/// Rows missing a required field are collected as [`RejectedRow`]s; a row
/// with a present but unusable value aborts the whole batch.
pub fn validate_batch(
    raws: &[RawVideoRecord],
) -> Result<(Vec<ValidatedVideo>, Vec<RejectedRow>), FeatureError> {
    let mut videos = Vec::with_capacity(raws.len());
    let mut rejected = Vec::new();

    for (row, raw) in raws.iter().enumerate() {
        match raw.validate(ValidationMode::Training) {
            Ok(video) => videos.push(video),
            Err(reason @ FieldError::Missing(_)) => {
                warn!("Rejecting row {}: {}", row, reason);
                rejected.push(RejectedRow { row, reason });
            }
            Err(source) => return Err(FeatureError::InvalidRow { row, source }),
        }
    }

    if videos.is_empty() {
        return Err(FeatureError::EmptyBatch {
            rejected: rejected.len(),
        });
    }
    Ok((videos, rejected))
}

/// Engineers features for a table without labeling it.
/// Channel counts are recomputed over this table.
pub fn prepare_batch(
    raws: &[RawVideoRecord],
    now: DateTime<Utc>,
) -> Result<EngineeredBatch, FeatureError> {
    let (videos, rejected) = validate_batch(raws)?;
    let channel_frequencies = ChannelFrequencies::from_videos(&videos);

    let records = videos
        .into_iter()
        .map(|video| {
            let frequency = channel_frequencies.get(&video.channel).unwrap_or(0);
            let features = engineer(&video, frequency, now);
            EngineeredVideoRecord {
                video,
                features,
                is_trending: None,
            }
        })
        .collect::<Vec<_>>();

    debug!(
        "Prepared {} rows ({} rejected, {} channels)",
        records.len(),
        rejected.len(),
        channel_frequencies.len()
    );

    Ok(EngineeredBatch {
        records,
        rejected,
        channel_frequencies,
        view_threshold: None,
    })
}

/// [`prepare_batch`] plus the `Is_Trending` label: views at or above the
/// `quantile` of this batch.
pub fn prepare_training_batch(
    raws: &[RawVideoRecord],
    now: DateTime<Utc>,
    quantile: f64,
) -> Result<EngineeredBatch, FeatureError> {
    let mut batch = prepare_batch(raws, now)?;

    let views = batch.records.iter().map(|r| r.video.views).collect::<Vec<_>>();
    let threshold = view_threshold(&views, quantile);
    for record in batch.records.iter_mut() {
        record.is_trending = Some(record.video.views as f64 >= threshold);
    }
    batch.view_threshold = Some(threshold);

    debug!(
        "View threshold {:.1}: {} of {} rows trending",
        threshold,
        batch.trending_count(),
        batch.len()
    );
    Ok(batch)
}

/// Quantile of `views` with linear interpolation between closest ranks.
/// Returns 0 for an empty slice.
pub fn view_threshold(views: &[u64], quantile: f64) -> f64 {
    if views.is_empty() {
        return 0.0;
    }
    let mut sorted = views.to_vec();
    sorted.sort_unstable();

    let position = quantile.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let low = sorted[lower] as f64;
    let high = sorted[upper] as f64;
    low + (high - low) * (position - lower as f64)
}
