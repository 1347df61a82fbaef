use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use polars::prelude::ChunkAgg;
use trending_video_predictor::config::{GridSettings, PredictionSettings, TrainingSettings};
use trending_video_predictor::dataset::{engineered_frame, load_csv_file, write_csv_file};
use trending_video_predictor::features::IS_TRENDING;
use trending_video_predictor::{
    engineer_csv, train_from_csv, FixedClock, RawVideoRecord, TrainedModel, TrendingPredictor,
    CURRENT_SCHEMA,
};

const CHANNELS: [&str; 5] = [
    "Music Channel",
    "Delhi Foodie",
    "Daily News",
    "Tech Reviews",
    "Gaming Live",
];

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap()
}

fn write_raw_table(path: &Path) {
    let mut csv = String::from("Region,Title,Channel,Views,Likes,Comments,Published At\n");
    for i in 0..40u64 {
        let views = 1_000 + i * 5_000;
        let title = if i % 3 == 0 {
            format!("OFFICIAL Video {} is AMAZING!", i)
        } else {
            format!("daily upload number {}", i)
        };
        csv.push_str(&format!(
            "IN,{},{},{},{},{},2025-05-0{}T{:02}:15:00+05:30\n",
            title,
            CHANNELS[(i % 5) as usize],
            views,
            views / (10 + i % 7),
            views / (80 + i % 11),
            1 + i % 7,
            i % 24
        ));
    }
    // No view count: rejected, not fatal
    csv.push_str("US,Hidden views,Daily News,,100,10,2025-05-05T08:00:00Z\n");
    std::fs::write(path, csv).unwrap();
}

fn small_settings() -> TrainingSettings {
    TrainingSettings {
        cv_folds: 3,
        grid: GridSettings {
            max_depth: vec![3],
            learning_rate: vec![0.1],
            n_estimators: vec![10, 20],
            subsample: vec![0.8, 1.0],
        },
        ..Default::default()
    }
}

fn video(channel: &str, views: i64) -> RawVideoRecord {
    RawVideoRecord {
        region: None,
        title: Some("OFFICIAL: Summer Hits 2025".to_string()),
        channel: Some(channel.to_string()),
        views: Some(views),
        likes: Some(views / 20),
        comments: Some(views / 125),
        published_at: Some("2025-05-05T08:00:00Z".to_string()),
    }
}

#[test]
fn test_train_save_load_predict() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("youtube_trending_2025-05-10.csv");
    write_raw_table(&csv_path);

    let (batch, outcome) = train_from_csv(&csv_path, &small_settings(), now()).unwrap();

    assert_eq!(batch.len(), 40);
    assert_eq!(batch.rejected.len(), 1);
    assert_eq!(batch.rejected[0].row, 40);
    assert_eq!(batch.trending_count(), 8);
    assert_eq!(outcome.balanced_rows, 64);
    assert_eq!(outcome.search.scores.len(), 4);
    assert!((0.0..=1.0).contains(&outcome.search.best_score));
    assert_eq!(
        outcome.report.trending.support + outcome.report.not_trending.support,
        13
    );

    let model_dir = dir.path().join("model");
    outcome.model.save(&model_dir).unwrap();
    let model = TrainedModel::load(&model_dir).unwrap();
    assert_eq!(model.metadata(), outcome.model.metadata());
    assert_eq!(model.feature_names().len(), CURRENT_SCHEMA.len());
    assert_eq!(model.metadata().channel_frequencies.get("Daily News"), Some(8));

    let predictor = TrendingPredictor::with_clock(
        model,
        PredictionSettings::default(),
        Arc::new(FixedClock(now())),
    );
    for views in [10, 50_000, 150_000, 5_000_000] {
        let p = predictor
            .predict_probability(&video("Music Channel", views))
            .unwrap();
        assert!((0.0..=1.0).contains(&p), "{} -> {}", views, p);
    }

    let unseen = predictor.predict(&video("Brand New Channel", 150_000)).unwrap();
    assert!(unseen.unseen_channel);
    assert!(unseen.defaulted_features.is_empty());
}

#[test]
fn test_training_is_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("raw.csv");
    write_raw_table(&csv_path);

    let (_, first) = train_from_csv(&csv_path, &small_settings(), now()).unwrap();
    let (_, second) = train_from_csv(&csv_path, &small_settings(), now()).unwrap();

    assert_eq!(first.search.scores, second.search.scores);
    assert_eq!(first.search.best_params, second.search.best_params);
    assert_eq!(first.report, second.report);

    let rows = [
        vec![8.0, 0.0, 26.0, 0.05, 0.008, 6.2, 1.0, 0.6, 4.0, 0.4, 1.0, 8.0, 28.0, 0.03],
        vec![20.0, 4.0, 18.0, 0.01, 0.001, 9.0, 0.0, 0.0, 3.0, 0.0, 0.0, 1.0, 100.0, 0.006],
    ];
    assert_eq!(
        first.model.classifier().predict_proba(&rows),
        second.model.classifier().predict_proba(&rows)
    );
}

#[test]
fn test_subsampled_grid_is_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("raw.csv");
    write_raw_table(&csv_path);
    let mut settings = small_settings();
    settings.grid.subsample = vec![0.8];

    let runs = (0..4)
        .map(|_| train_from_csv(&csv_path, &settings, now()).unwrap().1)
        .map(|outcome| (outcome.search.best_score, outcome.report))
        .collect::<Vec<_>>();

    assert!(runs.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_engineered_table_export() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("raw.csv");
    write_raw_table(&csv_path);

    let (batch, _) = train_from_csv(&csv_path, &small_settings(), now()).unwrap();
    let mut df = engineered_frame(&batch, &CURRENT_SCHEMA).unwrap();
    let out = dir.path().join("engineered.csv");
    write_csv_file(&mut df, &out).unwrap();

    let loaded = load_csv_file(&out).unwrap();
    assert_eq!(loaded.height(), 40);
    for name in CURRENT_SCHEMA.column_names() {
        assert!(loaded.column(name).is_ok(), "missing {}", name);
    }
    let trending = loaded.column(IS_TRENDING).unwrap().i64().unwrap().sum();
    assert_eq!(trending, Some(8));
}

#[test]
fn test_unlabeled_preparation_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("raw.csv");
    write_raw_table(&csv_path);

    let first = engineer_csv(&csv_path, now()).unwrap();
    let second = engineer_csv(&csv_path, now()).unwrap();

    assert_eq!(first, second);
    assert!(first.records.iter().all(|r| r.is_trending.is_none()));
}
