use std::fs::File;
use std::path::Path;

use polars::prelude::*;
use tracing::{debug, info};

use crate::error::{FeatureError, TrainingError};
use crate::features::{EngineeredBatch, Feature, FeatureSchema, IS_TRENDING};
use crate::record::{
    RawVideoRecord, CHANNEL, COMMENTS, LIKES, NORMALIZED_TIMESTAMP_FORMAT, PUBLISHED_AT, REGION,
    TITLE, VIEWS,
};

pub fn load_csv_file(file_path: &Path) -> PolarsResult<DataFrame> {
    let df = CsvReader::from_path(file_path)?.has_header(true).finish()?;

    info!(
        "Loaded {} rows and {} columns from {:?}",
        df.height(),
        df.width(),
        file_path
    );
    debug!("{:?}", df.head(Some(5)));

    Ok(df)
}

pub fn write_csv_file(df: &mut DataFrame, file_path: &Path) -> PolarsResult<()> {
    let mut file = File::create(file_path)?;
    CsvWriter::new(&mut file).finish(df)?;

    info!("Saved {} rows to {:?}", df.height(), file_path);
    Ok(())
}

/// Reads a raw table file straight into records.
pub fn load_raw_records(file_path: &Path) -> Result<Vec<RawVideoRecord>, FeatureError> {
    let df = load_csv_file(file_path)?;
    raw_records_from_frame(&df)
}

fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series, FeatureError> {
    df.column(name)
        .map_err(|_| FeatureError::MissingColumn(name.to_string()))
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, FeatureError> {
    let series = column(df, name)?.cast(&DataType::Utf8)?;
    let values = series
        .utf8()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect();
    Ok(values)
}

fn integer_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>, FeatureError> {
    let series = column(df, name)?.cast(&DataType::Int64)?;
    let values = series.i64()?.into_iter().collect();
    Ok(values)
}

/// Turns a raw table into records. Nulls stay `None` so validation can report them.
pub fn raw_records_from_frame(df: &DataFrame) -> Result<Vec<RawVideoRecord>, FeatureError> {
    let regions = string_column(df, REGION)?;
    let titles = string_column(df, TITLE)?;
    let channels = string_column(df, CHANNEL)?;
    let views = integer_column(df, VIEWS)?;
    let likes = integer_column(df, LIKES)?;
    let comments = integer_column(df, COMMENTS)?;
    let published = string_column(df, PUBLISHED_AT)?;

    let records = (0..df.height())
        .map(|i| RawVideoRecord {
            region: regions[i].clone(),
            title: titles[i].clone(),
            channel: channels[i].clone(),
            views: views[i],
            likes: likes[i],
            comments: comments[i],
            published_at: published[i].clone(),
        })
        .collect();
    Ok(records)
}

/// Builds a raw table, in the column layout [`raw_records_from_frame`] reads.
pub fn raw_records_to_frame(records: &[RawVideoRecord]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Series::new(
            REGION,
            records.iter().map(|r| r.region.clone()).collect::<Vec<_>>(),
        ),
        Series::new(
            TITLE,
            records.iter().map(|r| r.title.clone()).collect::<Vec<_>>(),
        ),
        Series::new(
            CHANNEL,
            records.iter().map(|r| r.channel.clone()).collect::<Vec<_>>(),
        ),
        Series::new(VIEWS, records.iter().map(|r| r.views).collect::<Vec<_>>()),
        Series::new(LIKES, records.iter().map(|r| r.likes).collect::<Vec<_>>()),
        Series::new(
            COMMENTS,
            records.iter().map(|r| r.comments).collect::<Vec<_>>(),
        ),
        Series::new(
            PUBLISHED_AT,
            records
                .iter()
                .map(|r| r.published_at.clone())
                .collect::<Vec<_>>(),
        ),
    ])
}

/// The engineered table: raw columns (timestamp normalized), every schema
/// feature in order, and `Is_Trending` when the whole batch is labeled.
pub fn engineered_frame(
    batch: &EngineeredBatch,
    schema: &FeatureSchema,
) -> PolarsResult<DataFrame> {
    let records = &batch.records;

    let mut columns = vec![
        Series::new(
            REGION,
            records
                .iter()
                .map(|r| r.video.region.clone())
                .collect::<Vec<_>>(),
        ),
        Series::new(
            TITLE,
            records
                .iter()
                .map(|r| r.video.title.as_str())
                .collect::<Vec<_>>(),
        ),
        Series::new(
            CHANNEL,
            records
                .iter()
                .map(|r| r.video.channel.as_str())
                .collect::<Vec<_>>(),
        ),
        Series::new(
            VIEWS,
            records
                .iter()
                .map(|r| r.video.views as i64)
                .collect::<Vec<_>>(),
        ),
        Series::new(
            LIKES,
            records
                .iter()
                .map(|r| r.video.likes as i64)
                .collect::<Vec<_>>(),
        ),
        Series::new(
            COMMENTS,
            records
                .iter()
                .map(|r| r.video.comments as i64)
                .collect::<Vec<_>>(),
        ),
        Series::new(
            PUBLISHED_AT,
            records
                .iter()
                .map(|r| {
                    r.video
                        .published_at
                        .format(NORMALIZED_TIMESTAMP_FORMAT)
                        .to_string()
                })
                .collect::<Vec<_>>(),
        ),
    ];

    for &feature in schema.features {
        columns.push(feature_series(batch, feature));
    }

    let labels = records
        .iter()
        .map(|r| r.is_trending.map(i32::from))
        .collect::<Option<Vec<_>>>();
    if let Some(labels) = labels {
        if !labels.is_empty() {
            columns.push(Series::new(IS_TRENDING, labels));
        }
    }

    DataFrame::new(columns)
}

fn feature_series(batch: &EngineeredBatch, feature: Feature) -> Series {
    let values = batch.records.iter().map(|r| r.features.value(feature));
    if feature.is_integral() {
        Series::new(
            feature.column_name(),
            values.map(|v| v as i64).collect::<Vec<_>>(),
        )
    } else {
        Series::new(feature.column_name(), values.collect::<Vec<_>>())
    }
}

/// Splits an engineered table into a row-major feature matrix, in the
/// order of `feature_names`, and the boolean `Is_Trending` target.
pub fn split_features_and_target(
    df: &DataFrame,
    feature_names: &[String],
) -> Result<(Vec<Vec<f32>>, Vec<bool>), TrainingError> {
    let features = df.select(feature_names.iter().map(String::as_str))?;
    let matrix = features.to_ndarray::<Float32Type>(IndexOrder::C)?;
    let rows = matrix
        .outer_iter()
        .map(|row| row.to_vec())
        .collect::<Vec<_>>();

    let target = df.column(IS_TRENDING)?.cast(&DataType::Int32)?;
    let labels = target
        .i32()?
        .into_iter()
        .map(|label| label == Some(1))
        .collect::<Vec<_>>();

    Ok((rows, labels))
}
