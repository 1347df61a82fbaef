use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use trending_video_predictor::analysis::{
    engagement_ranking, hourly_means, missing_values, summary, top_channels,
};
use trending_video_predictor::config::{AppConfig, FileConfig};
use trending_video_predictor::dataset::{engineered_frame, load_csv_file, write_csv_file};
use trending_video_predictor::ingestion::{write_snapshot, CatalogClient};
use trending_video_predictor::{
    engineer_frame, train_from_csv, RawVideoRecord, TrainedModel, TrendingPredictor,
    CURRENT_SCHEMA,
};

// Commands
// fetch   - pull the regional "most popular" charts into a dated CSV
// train   - engineer features, balance, tune, fit and save a model
// predict - score one video with a saved model
// analyze - print descriptive summaries of a raw table

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file.
    #[clap(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the trending chart of every configured region.
    Fetch {
        #[clap(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Train a model from a raw CSV table.
    Train {
        csv: PathBuf,
        #[clap(long, default_value = "model")]
        model_dir: PathBuf,
        /// Also write the engineered table here.
        #[clap(long)]
        engineered_out: Option<PathBuf>,
    },
    /// Predict the trending probability of a single video.
    Predict {
        #[clap(long, default_value = "model")]
        model_dir: PathBuf,
        /// Video as JSON, e.g. '{"Title": "...", "Views": 1000, ...}'
        #[clap(long, required_unless_present = "video_file", conflicts_with = "video_file")]
        video: Option<String>,
        #[clap(long)]
        video_file: Option<PathBuf>,
    },
    /// Print engagement, upload hour and channel summaries.
    Analyze {
        csv: PathBuf,
        #[clap(long, default_value_t = 10)]
        top: usize,
    },
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let app_config = AppConfig::resolve(file_config)?;

    match cli_args.command {
        Command::Fetch { out_dir } => fetch(&app_config, out_dir),
        Command::Train {
            csv,
            model_dir,
            engineered_out,
        } => train(&app_config, csv, model_dir, engineered_out),
        Command::Predict {
            model_dir,
            video,
            video_file,
        } => predict(&app_config, model_dir, video, video_file),
        Command::Analyze { csv, top } => analyze(csv, top),
    }
}

fn fetch(app_config: &AppConfig, out_dir: PathBuf) -> Result<()> {
    let client = CatalogClient::new(&app_config.ingestion)?;
    let records = client.fetch_all()?;
    let path = write_snapshot(&records, &out_dir, Utc::now().date_naive())?;
    println!("Saved {} videos to {}", records.len(), path.display());
    Ok(())
}

fn train(
    app_config: &AppConfig,
    csv: PathBuf,
    model_dir: PathBuf,
    engineered_out: Option<PathBuf>,
) -> Result<()> {
    info!("Starting training run...");

    // 1. Load, validate, engineer and train
    let (batch, outcome) = train_from_csv(&csv, &app_config.training, Utc::now())?;

    // 2. Optionally export the engineered table
    if let Some(path) = engineered_out {
        let mut df = engineered_frame(&batch, &CURRENT_SCHEMA)?;
        write_csv_file(&mut df, &path)
            .with_context(|| format!("Failed to write engineered table {:?}", path))?;
    }

    // 3. Report
    println!("Best Parameters: {}", outcome.search.best_params);
    println!("Cross-validated F1: {:.4}", outcome.search.best_score);
    println!("{}", outcome.report);

    // 4. Save model artifact
    outcome
        .model
        .save(&model_dir)
        .with_context(|| format!("Failed to save model to {:?}", model_dir))?;
    println!("Model saved to {}", model_dir.display());

    Ok(())
}

fn predict(
    app_config: &AppConfig,
    model_dir: PathBuf,
    video: Option<String>,
    video_file: Option<PathBuf>,
) -> Result<()> {
    let json = match (video, video_file) {
        (Some(json), _) => json,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read video file {:?}", path))?,
        (None, None) => anyhow::bail!("Either --video or --video-file is required"),
    };
    let record: RawVideoRecord = serde_json::from_str(&json).context("Invalid video JSON")?;

    let model = TrainedModel::load(&model_dir)
        .with_context(|| format!("Failed to load model from {:?}", model_dir))?;
    let predictor = TrendingPredictor::new(model, app_config.prediction);
    let prediction = predictor.predict(&record)?;

    println!("Trending Probability: {:.2}%", prediction.probability * 100.0);
    println!("Outlook: {}", prediction.outlook);
    if prediction.unseen_channel {
        println!("Note: channel was not in the training data");
    }
    if !prediction.defaulted_features.is_empty() {
        println!(
            "Note: defaulted to 0: {}",
            prediction.defaulted_features.join(", ")
        );
    }
    Ok(())
}

fn analyze(csv: PathBuf, top: usize) -> Result<()> {
    let raw =
        load_csv_file(&csv).with_context(|| format!("Failed to read raw table {:?}", csv))?;
    println!("Missing values:\n{}", missing_values(&raw));
    println!("Summary statistics:\n{}", summary(&raw)?);

    let batch = engineer_frame(&raw, Utc::now())?;
    let df = engineered_frame(&batch, &CURRENT_SCHEMA)?;

    println!("{} videos, {} rejected", batch.len(), batch.rejected.len());
    println!("Engagement ranking:\n{}", engagement_ranking(&df, top)?);
    println!("Best time to upload:\n{}", hourly_means(&df)?);
    println!("Top channels by views:\n{}", top_channels(&df, top)?);
    Ok(())
}
