use polars::prelude::*;

use crate::features::Feature;
use crate::record::{CHANNEL, COMMENTS, LIKES, TITLE, VIEWS};

pub const ENGAGEMENT_RATE: &str = "Engagement_Rate";
pub const MEAN_VIEWS: &str = "Mean_Views";
pub const MEAN_LIKES: &str = "Mean_Likes";
pub const TOTAL_VIEWS: &str = "Total_Views";
pub const STATISTIC: &str = "Statistic";

const SUMMARY_COLUMNS: [&str; 3] = [VIEWS, LIKES, COMMENTS];
const SUMMARY_STATISTICS: [&str; 9] = [
    "count", "null_count", "mean", "std", "min", "25%", "50%", "75%", "max",
];

fn descending() -> SortOptions {
    SortOptions {
        descending: true,
        nulls_last: true,
        maintain_order: true,
        ..Default::default()
    }
}

/// Count, mean, sample std, min, quartiles and max of the counters.
/// Nulls are skipped and counted separately.
pub fn summary(df: &DataFrame) -> PolarsResult<DataFrame> {
    let mut columns = vec![Series::new(STATISTIC, SUMMARY_STATISTICS.to_vec())];

    for name in SUMMARY_COLUMNS {
        let series = df.column(name)?.cast(&DataType::Float64)?;
        let values = series.f64()?;
        let quartile = |q: f64| values.quantile(q, QuantileInterpolOptions::Linear);

        let stats: Vec<Option<f64>> = vec![
            Some((values.len() - values.null_count()) as f64),
            Some(values.null_count() as f64),
            values.mean(),
            values.std(1),
            values.min(),
            quartile(0.25)?,
            quartile(0.5)?,
            quartile(0.75)?,
            values.max(),
        ];
        columns.push(Series::new(name, stats));
    }

    DataFrame::new(columns)
}

/// Nulls per column, as a single row.
pub fn missing_values(df: &DataFrame) -> DataFrame {
    df.null_count()
}

/// Titles ranked by `(Likes + Comments) / Views * 100`, highest first.
pub fn engagement_ranking(df: &DataFrame, limit: usize) -> PolarsResult<DataFrame> {
    let rate = ((col(LIKES) + col(COMMENTS)).cast(DataType::Float64)
        / col(VIEWS).cast(DataType::Float64)
        * lit(100.0))
    .alias(ENGAGEMENT_RATE);

    df.clone()
        .lazy()
        .select([col(TITLE), col(CHANNEL), rate])
        .sort(ENGAGEMENT_RATE, descending())
        .limit(limit as IdxSize)
        .collect()
}

/// Mean views and likes per upload hour, ordered by hour.
/// Needs the engineered table.
pub fn hourly_means(df: &DataFrame) -> PolarsResult<DataFrame> {
    let hour = Feature::UploadHour.column_name();

    df.clone()
        .lazy()
        .group_by([col(hour)])
        .agg([
            col(VIEWS).cast(DataType::Float64).mean().alias(MEAN_VIEWS),
            col(LIKES).cast(DataType::Float64).mean().alias(MEAN_LIKES),
        ])
        .sort(hour, Default::default())
        .collect()
}

/// Channels with the most total views.
pub fn top_channels(df: &DataFrame, n: usize) -> PolarsResult<DataFrame> {
    df.clone()
        .lazy()
        .group_by([col(CHANNEL)])
        .agg([col(VIEWS).cast(DataType::Int64).sum().alias(TOTAL_VIEWS)])
        .sort(TOTAL_VIEWS, descending())
        .limit(n as IdxSize)
        .collect()
}
