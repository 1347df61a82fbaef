use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::features::DEFAULT_TRENDING_QUANTILE;
use crate::model::HyperParams;

pub const DEFAULT_REGIONS: [&str; 7] = ["IN", "US", "GB", "JP", "CA", "DE", "FR"];
pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3/videos";

/// TOML file layout. Every value is optional and falls back to a default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub ingestion: Option<IngestionFileConfig>,
    pub training: Option<TrainingFileConfig>,
    pub prediction: Option<PredictionFileConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestionFileConfig {
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub regions: Option<Vec<String>>,
    pub max_results: Option<u32>,
    pub timeout_sec: Option<u64>,
    pub max_retries: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrainingFileConfig {
    pub trending_quantile: Option<f64>,
    pub test_size: Option<f64>,
    pub cv_folds: Option<usize>,
    pub seed: Option<u64>,
    pub smote_neighbors: Option<usize>,
    pub grid: Option<GridFileConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GridFileConfig {
    pub max_depth: Option<Vec<u32>>,
    pub learning_rate: Option<Vec<f32>>,
    pub n_estimators: Option<Vec<usize>>,
    pub subsample: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionFileConfig {
    pub very_likely_threshold: Option<f64>,
    pub possible_threshold: Option<f64>,
    pub unseen_channel_frequency: Option<u32>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file {:?}", path))
    }
}

/// Settings for the catalog API client
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionSettings {
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub base_url: String,
    pub regions: Vec<String>,
    pub max_results: u32,
    pub timeout_sec: u64,
    /// Retries per region after the first attempt
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            api_key_env: "YOUTUBE_API_KEY".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            regions: DEFAULT_REGIONS.iter().map(|r| r.to_string()).collect(),
            max_results: 50,
            timeout_sec: 30,
            max_retries: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
        }
    }
}

/// Axes of the hyperparameter search
#[derive(Debug, Clone, PartialEq)]
pub struct GridSettings {
    pub max_depth: Vec<u32>,
    pub learning_rate: Vec<f32>,
    pub n_estimators: Vec<usize>,
    pub subsample: Vec<f64>,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            max_depth: vec![3, 5, 7],
            learning_rate: vec![0.01, 0.1, 0.2],
            n_estimators: vec![50, 100, 200],
            subsample: vec![0.8, 1.0],
        }
    }
}

impl GridSettings {
    /// Every combination, varying the last axis fastest.
    pub fn candidates(&self) -> Vec<HyperParams> {
        let mut out = Vec::new();
        for &max_depth in &self.max_depth {
            for &learning_rate in &self.learning_rate {
                for &n_estimators in &self.n_estimators {
                    for &subsample in &self.subsample {
                        out.push(HyperParams {
                            max_depth,
                            learning_rate,
                            n_estimators,
                            subsample,
                        });
                    }
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSettings {
    /// Views quantile at or above which a video is labeled trending
    pub trending_quantile: f64,
    /// Share of the balanced set held out for evaluation
    pub test_size: f64,
    pub cv_folds: usize,
    pub seed: u64,
    pub smote_neighbors: usize,
    pub grid: GridSettings,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            trending_quantile: DEFAULT_TRENDING_QUANTILE,
            test_size: 0.2,
            cv_folds: 5,
            seed: 42,
            smote_neighbors: 5,
            grid: GridSettings::default(),
        }
    }
}

/// Presentation buckets and inference fallbacks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionSettings {
    pub very_likely_threshold: f64,
    pub possible_threshold: f64,
    /// Channel_Frequency used for channels absent from the training batch
    pub unseen_channel_frequency: u32,
}

impl Default for PredictionSettings {
    fn default() -> Self {
        Self {
            very_likely_threshold: 0.7,
            possible_threshold: 0.4,
            unseen_channel_frequency: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    pub ingestion: IngestionSettings,
    pub training: TrainingSettings,
    pub prediction: PredictionSettings,
}

impl AppConfig {
    /// Merge file values over defaults and validate the result.
    pub fn resolve(file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let ing_file = file.ingestion.unwrap_or_default();
        let ing_defaults = IngestionSettings::default();
        let ingestion = IngestionSettings {
            api_key_env: ing_file.api_key_env.unwrap_or(ing_defaults.api_key_env),
            base_url: ing_file.base_url.unwrap_or(ing_defaults.base_url),
            regions: ing_file.regions.unwrap_or(ing_defaults.regions),
            max_results: ing_file.max_results.unwrap_or(ing_defaults.max_results),
            timeout_sec: ing_file.timeout_sec.unwrap_or(ing_defaults.timeout_sec),
            max_retries: ing_file.max_retries.unwrap_or(ing_defaults.max_retries),
            initial_backoff_ms: ing_file
                .initial_backoff_ms
                .unwrap_or(ing_defaults.initial_backoff_ms),
            backoff_multiplier: ing_file
                .backoff_multiplier
                .unwrap_or(ing_defaults.backoff_multiplier),
        };

        let tr_file = file.training.unwrap_or_default();
        let tr_defaults = TrainingSettings::default();
        let grid_file = tr_file.grid.unwrap_or_default();
        let training = TrainingSettings {
            trending_quantile: tr_file
                .trending_quantile
                .unwrap_or(tr_defaults.trending_quantile),
            test_size: tr_file.test_size.unwrap_or(tr_defaults.test_size),
            cv_folds: tr_file.cv_folds.unwrap_or(tr_defaults.cv_folds),
            seed: tr_file.seed.unwrap_or(tr_defaults.seed),
            smote_neighbors: tr_file
                .smote_neighbors
                .unwrap_or(tr_defaults.smote_neighbors),
            grid: GridSettings {
                max_depth: grid_file.max_depth.unwrap_or(tr_defaults.grid.max_depth),
                learning_rate: grid_file
                    .learning_rate
                    .unwrap_or(tr_defaults.grid.learning_rate),
                n_estimators: grid_file
                    .n_estimators
                    .unwrap_or(tr_defaults.grid.n_estimators),
                subsample: grid_file.subsample.unwrap_or(tr_defaults.grid.subsample),
            },
        };

        let pr_file = file.prediction.unwrap_or_default();
        let pr_defaults = PredictionSettings::default();
        let prediction = PredictionSettings {
            very_likely_threshold: pr_file
                .very_likely_threshold
                .unwrap_or(pr_defaults.very_likely_threshold),
            possible_threshold: pr_file
                .possible_threshold
                .unwrap_or(pr_defaults.possible_threshold),
            unseen_channel_frequency: pr_file
                .unseen_channel_frequency
                .unwrap_or(pr_defaults.unseen_channel_frequency),
        };

        let config = AppConfig {
            ingestion,
            training,
            prediction,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let ing = &self.ingestion;
        if ing.regions.is_empty() {
            bail!("ingestion.regions must not be empty");
        }
        if ing.max_results == 0 || ing.max_results > 50 {
            bail!("ingestion.max_results must be in 1..=50, got {}", ing.max_results);
        }
        if ing.backoff_multiplier < 1.0 {
            bail!(
                "ingestion.backoff_multiplier must be >= 1.0, got {}",
                ing.backoff_multiplier
            );
        }

        let tr = &self.training;
        if !(tr.trending_quantile > 0.0 && tr.trending_quantile < 1.0) {
            bail!(
                "training.trending_quantile must be in (0, 1), got {}",
                tr.trending_quantile
            );
        }
        if !(tr.test_size > 0.0 && tr.test_size < 1.0) {
            bail!("training.test_size must be in (0, 1), got {}", tr.test_size);
        }
        if tr.cv_folds < 2 {
            bail!("training.cv_folds must be at least 2, got {}", tr.cv_folds);
        }
        if tr.smote_neighbors == 0 {
            bail!("training.smote_neighbors must be positive");
        }
        let grid = &tr.grid;
        if grid.max_depth.is_empty()
            || grid.learning_rate.is_empty()
            || grid.n_estimators.is_empty()
            || grid.subsample.is_empty()
        {
            bail!("every training.grid axis needs at least one value");
        }
        if grid.n_estimators.contains(&0) || grid.max_depth.contains(&0) {
            bail!("training.grid max_depth and n_estimators must be positive");
        }
        if grid.learning_rate.iter().any(|&lr| lr <= 0.0) {
            bail!("training.grid learning_rate values must be positive");
        }
        if grid.subsample.iter().any(|&s| !(s > 0.0 && s <= 1.0)) {
            bail!("training.grid subsample values must be in (0, 1]");
        }

        let pr = &self.prediction;
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(pr.very_likely_threshold) || !in_unit(pr.possible_threshold) {
            bail!("prediction thresholds must be in [0, 1]");
        }
        if pr.possible_threshold > pr.very_likely_threshold {
            bail!(
                "prediction.possible_threshold ({}) exceeds very_likely_threshold ({})",
                pr.possible_threshold,
                pr.very_likely_threshold
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_resolve() {
        let config = AppConfig::resolve(None).unwrap();

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.ingestion.regions.len(), 7);
        assert_eq!(config.training.grid.candidates().len(), 54);
        assert_eq!(config.training.cv_folds, 5);
    }

    #[test]
    fn test_file_values_override_defaults() {
        let file: FileConfig = toml::from_str(
            r#"
            [ingestion]
            regions = ["US"]
            max_retries = 0

            [training]
            seed = 7
            [training.grid]
            max_depth = [2]
            n_estimators = [10]

            [prediction]
            very_likely_threshold = 0.9
            "#,
        )
        .unwrap();

        let config = AppConfig::resolve(Some(file)).unwrap();

        assert_eq!(config.ingestion.regions, vec!["US".to_string()]);
        assert_eq!(config.ingestion.max_retries, 0);
        assert_eq!(config.ingestion.timeout_sec, 30);
        assert_eq!(config.training.seed, 7);
        assert_eq!(config.training.grid.candidates().len(), 6);
        assert_eq!(config.prediction.very_likely_threshold, 0.9);
        assert_eq!(config.prediction.possible_threshold, 0.4);
    }

    #[test]
    fn test_candidates_vary_last_axis_fastest() {
        let grid = GridSettings {
            max_depth: vec![3],
            learning_rate: vec![0.1],
            n_estimators: vec![10, 20],
            subsample: vec![0.8, 1.0],
        };

        let candidates = grid.candidates();
        assert_eq!(candidates.len(), 4);
        assert_eq!(candidates[0].subsample, 0.8);
        assert_eq!(candidates[1].subsample, 1.0);
        assert_eq!(candidates[2].n_estimators, 20);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let file: FileConfig = toml::from_str("[training]\ncv_folds = 1").unwrap();
        assert!(AppConfig::resolve(Some(file)).is_err());

        let file: FileConfig =
            toml::from_str("[prediction]\npossible_threshold = 0.8\nvery_likely_threshold = 0.5")
                .unwrap();
        assert!(AppConfig::resolve(Some(file)).is_err());

        let file: FileConfig = toml::from_str("[training.grid]\nsubsample = []").unwrap();
        assert!(AppConfig::resolve(Some(file)).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ingestion]\ntimeout_sec = 5\n").unwrap();

        let config = AppConfig::resolve(Some(FileConfig::load(&path).unwrap())).unwrap();
        assert_eq!(config.ingestion.timeout_sec, 5);
    }
}
