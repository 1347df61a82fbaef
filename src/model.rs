use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use gbdt::config::Config;
use gbdt::decision_tree::{Data, DataVec};
use gbdt::gradient_boost::GBDT;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ModelError;
use crate::features::{ChannelFrequencies, CURRENT_SCHEMA};

const CLASSIFIER_FILE: &str = "classifier.json";
const METADATA_FILE: &str = "model.json";

// Labels for the log-likelihood loss are -1 / +1.
const POSITIVE_LABEL: f32 = 1.0;
const NEGATIVE_LABEL: f32 = -1.0;

/// One point of the hyperparameter grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HyperParams {
    pub max_depth: u32,
    pub learning_rate: f32,
    pub n_estimators: usize,
    pub subsample: f64,
}

impl fmt::Display for HyperParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "max_depth={} learning_rate={} n_estimators={} subsample={}",
            self.max_depth, self.learning_rate, self.n_estimators, self.subsample
        )
    }
}

/// Gradient-boosted trees with a binary log-likelihood loss.
pub struct GbdtClassifier {
    model: GBDT,
}

impl fmt::Debug for GbdtClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GbdtClassifier").finish_non_exhaustive()
    }
}

impl GbdtClassifier {
    /// Fits on `rows`. With `subsample < 1`, a share of the rows drawn from
    /// `seed` is kept; the same seed always keeps the same rows.
    pub fn fit(rows: &[Vec<f32>], labels: &[bool], params: &HyperParams, seed: u64) -> Self {
        let mut config = Config::new();
        config.set_feature_size(rows.first().map(Vec::len).unwrap_or(0));
        config.set_max_depth(params.max_depth);
        config.set_iterations(params.n_estimators);
        config.set_shrinkage(params.learning_rate);
        config.set_loss("LogLikelyhood");
        config.set_debug(false);
        // gbdt samples with an unseeded rng; rows are sampled here instead
        config.set_data_sample_ratio(1.0);
        config.set_feature_sample_ratio(1.0);
        config.set_training_optimization_level(2);

        let mut training_data: DataVec = subsample_indices(rows.len(), params.subsample, seed)
            .into_iter()
            .map(|i| {
                let label = if labels[i] { POSITIVE_LABEL } else { NEGATIVE_LABEL };
                Data::new_training_data(rows[i].clone(), 1.0, label, None)
            })
            .collect();

        let mut model = GBDT::new(&config);
        model.fit(&mut training_data);

        GbdtClassifier { model }
    }

    /// Probability of the trending class for each row, clamped to [0, 1].
    pub fn predict_proba(&self, rows: &[Vec<f32>]) -> Vec<f32> {
        let test_data: DataVec = rows
            .iter()
            .map(|row| Data::new_test_data(row.clone(), None))
            .collect();
        self.model
            .predict(&test_data)
            .into_iter()
            .map(|p| p.clamp(0.0, 1.0))
            .collect()
    }

    pub fn predict(&self, rows: &[Vec<f32>]) -> Vec<bool> {
        self.predict_proba(rows)
            .into_iter()
            .map(|p| p >= 0.5)
            .collect()
    }

    fn save(&self, path: &Path) -> Result<(), ModelError> {
        self.model
            .save_model(path_str(path)?)
            .map_err(|e| ModelError::Classifier(e.to_string()))
    }

    fn load(path: &Path) -> Result<Self, ModelError> {
        let model =
            GBDT::load_model(path_str(path)?).map_err(|e| ModelError::Classifier(e.to_string()))?;
        Ok(GbdtClassifier { model })
    }
}

/// Sorted indices of the rows kept for one fit: `ceil(len * ratio)` of them,
/// at least one, chosen by a shuffle seeded with `seed`.
fn subsample_indices(len: usize, ratio: f64, seed: u64) -> Vec<usize> {
    let mut indices = (0..len).collect::<Vec<_>>();
    if ratio >= 1.0 || len == 0 {
        return indices;
    }
    let keep = ((len as f64 * ratio).ceil() as usize).clamp(1, len);

    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    indices.truncate(keep);
    indices.sort_unstable();
    indices
}

fn path_str(path: &Path) -> Result<&str, ModelError> {
    path.to_str()
        .ok_or_else(|| ModelError::Classifier(format!("Non UTF-8 path {:?}", path)))
}

/// Everything besides the trees that inference needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub schema_version: u32,
    /// Column names the classifier was fit on, in input order.
    pub feature_names: Vec<String>,
    /// Channel counts of the training batch, frozen for inference.
    pub channel_frequencies: ChannelFrequencies,
    pub view_threshold: f64,
    pub params: HyperParams,
    /// Mean cross-validated F1 of `params`.
    pub cv_f1: f64,
    pub trained_at: DateTime<Utc>,
}

/// A fitted classifier plus the feature contract it was fit under.
/// Never mutated after training.
#[derive(Debug)]
pub struct TrainedModel {
    classifier: GbdtClassifier,
    metadata: ModelMetadata,
}

impl TrainedModel {
    pub fn new(classifier: GbdtClassifier, metadata: ModelMetadata) -> Self {
        TrainedModel {
            classifier,
            metadata,
        }
    }

    pub fn classifier(&self) -> &GbdtClassifier {
        &self.classifier
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn feature_names(&self) -> &[String] {
        &self.metadata.feature_names
    }

    /// Writes the classifier and its metadata into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<(), ModelError> {
        fs::create_dir_all(dir)?;
        self.classifier.save(&dir.join(CLASSIFIER_FILE))?;
        let metadata = serde_json::to_string_pretty(&self.metadata)?;
        fs::write(dir.join(METADATA_FILE), metadata)?;

        info!("Saved model to {:?}", dir);
        Ok(())
    }

    /// Loads an artifact written by [`TrainedModel::save`].
    /// Artifacts from a newer schema are refused; older ones load with a warning.
    pub fn load(dir: &Path) -> Result<Self, ModelError> {
        let metadata: ModelMetadata =
            serde_json::from_str(&fs::read_to_string(dir.join(METADATA_FILE))?)?;
        if metadata.schema_version > CURRENT_SCHEMA.version {
            return Err(ModelError::SchemaVersion {
                expected: CURRENT_SCHEMA.version,
                found: metadata.schema_version,
            });
        }
        if metadata.schema_version < CURRENT_SCHEMA.version {
            warn!(
                "Model at {:?} uses feature schema v{}, current is v{}",
                dir, metadata.schema_version, CURRENT_SCHEMA.version
            );
        }

        let classifier = GbdtClassifier::load(&dir.join(CLASSIFIER_FILE))?;
        info!(
            "Loaded model from {:?} ({} features)",
            dir,
            metadata.feature_names.len()
        );
        Ok(TrainedModel {
            classifier,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn params() -> HyperParams {
        HyperParams {
            max_depth: 3,
            learning_rate: 0.1,
            n_estimators: 20,
            subsample: 1.0,
        }
    }

    fn separable() -> (Vec<Vec<f32>>, Vec<bool>) {
        let rows = (0..40)
            .map(|i| vec![i as f32, (i % 4) as f32])
            .collect::<Vec<_>>();
        let labels = (0..40).map(|i| i >= 20).collect::<Vec<_>>();
        (rows, labels)
    }

    fn metadata() -> ModelMetadata {
        ModelMetadata {
            schema_version: CURRENT_SCHEMA.version,
            feature_names: vec!["A".to_string(), "B".to_string()],
            channel_frequencies: ChannelFrequencies::default(),
            view_threshold: 1000.0,
            params: params(),
            cv_f1: 0.9,
            trained_at: Utc.with_ymd_and_hms(2025, 5, 5, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_classifier_probabilities_are_bounded() {
        let (rows, labels) = separable();
        let classifier = GbdtClassifier::fit(&rows, &labels, &params(), 7);

        let probabilities = classifier.predict_proba(&rows);
        assert_eq!(probabilities.len(), rows.len());
        assert!(probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_classifier_learns_separable_data() {
        let (rows, labels) = separable();
        let classifier = GbdtClassifier::fit(&rows, &labels, &params(), 7);

        let predicted = classifier.predict(&[vec![2.0, 2.0], vec![37.0, 1.0]]);
        assert_eq!(predicted, vec![false, true]);
    }

    #[test]
    fn test_subsampled_fit_is_seeded() {
        let (rows, labels) = separable();
        let sampled = HyperParams {
            subsample: 0.8,
            ..params()
        };

        let first = GbdtClassifier::fit(&rows, &labels, &sampled, 42).predict_proba(&rows);
        let second = GbdtClassifier::fit(&rows, &labels, &sampled, 42).predict_proba(&rows);
        assert_eq!(first, second);
    }

    #[test]
    fn test_subsample_indices() {
        assert_eq!(subsample_indices(5, 1.0, 1), vec![0, 1, 2, 3, 4]);

        let kept = subsample_indices(40, 0.8, 42);
        assert_eq!(kept.len(), 32);
        assert!(kept.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(kept, subsample_indices(40, 0.8, 42));
        assert_ne!(kept, subsample_indices(40, 0.8, 43));

        assert_eq!(subsample_indices(3, 0.1, 9).len(), 1);
        assert!(subsample_indices(0, 0.5, 9).is_empty());
    }

    #[test]
    fn test_save_and_load_artifact() {
        let (rows, labels) = separable();
        let classifier = GbdtClassifier::fit(&rows, &labels, &params(), 7);
        let model = TrainedModel::new(classifier, metadata());
        let dir = tempfile::tempdir().unwrap();

        model.save(dir.path()).unwrap();
        let loaded = TrainedModel::load(dir.path()).unwrap();

        assert_eq!(loaded.metadata(), model.metadata());
        let before = model.classifier().predict_proba(&rows);
        let after = loaded.classifier().predict_proba(&rows);
        for (b, a) in before.iter().zip(after.iter()) {
            assert!((b - a).abs() < 1e-5);
        }
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let (rows, labels) = separable();
        let mut newer = metadata();
        newer.schema_version = CURRENT_SCHEMA.version + 1;
        let model = TrainedModel::new(GbdtClassifier::fit(&rows, &labels, &params(), 7), newer);
        let dir = tempfile::tempdir().unwrap();
        model.save(dir.path()).unwrap();

        assert!(matches!(
            TrainedModel::load(dir.path()),
            Err(ModelError::SchemaVersion { .. })
        ));
    }
}
