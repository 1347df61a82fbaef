use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::clock::{Clock, SystemClock};
use crate::config::PredictionSettings;
use crate::error::PredictionError;
use crate::features::{engineer, Feature, FeatureVector};
use crate::model::TrainedModel;
use crate::record::{RawVideoRecord, ValidationMode};

/// Presentation bucket for a trending probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendingOutlook {
    VeryLikely,
    Possible,
    Unlikely,
}

impl TrendingOutlook {
    pub fn from_probability(probability: f64, settings: &PredictionSettings) -> Self {
        if probability > settings.very_likely_threshold {
            TrendingOutlook::VeryLikely
        } else if probability > settings.possible_threshold {
            TrendingOutlook::Possible
        } else {
            TrendingOutlook::Unlikely
        }
    }
}

impl fmt::Display for TrendingOutlook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TrendingOutlook::VeryLikely => "Very likely",
            TrendingOutlook::Possible => "Possible",
            TrendingOutlook::Unlikely => "Unlikely",
        };
        f.write_str(label)
    }
}

/// A probability and how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub probability: f64,
    pub outlook: TrendingOutlook,
    /// Model inputs that had no engineered value and were filled with 0.
    pub defaulted_features: Vec<String>,
    /// Whether the channel was missing from the training batch.
    pub unseen_channel: bool,
}

/// Reapplies the training-time feature pipeline to single videos and scores them.
pub struct TrendingPredictor {
    model: TrainedModel,
    settings: PredictionSettings,
    clock: Arc<dyn Clock>,
}

impl TrendingPredictor {
    pub fn new(model: TrainedModel, settings: PredictionSettings) -> Self {
        Self::with_clock(model, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        model: TrainedModel,
        settings: PredictionSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        TrendingPredictor {
            model,
            settings,
            clock,
        }
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }

    /// Probability in [0, 1] that `video` lands in the top views quantile.
    pub fn predict_probability(&self, video: &RawVideoRecord) -> Result<f64, PredictionError> {
        self.predict_at(video, self.clock.now())
            .map(|prediction| prediction.probability)
    }

    pub fn predict(&self, video: &RawVideoRecord) -> Result<Prediction, PredictionError> {
        self.predict_at(video, self.clock.now())
    }

    /// Like [`TrendingPredictor::predict`], with `now` pinned.
    pub fn predict_at(
        &self,
        video: &RawVideoRecord,
        now: DateTime<Utc>,
    ) -> Result<Prediction, PredictionError> {
        let (features, unseen_channel) = self.engineer_features(video, now)?;
        let (row, defaulted_features) = self.model_input(&features)?;

        let probability = self
            .model
            .classifier()
            .predict_proba(&[row])
            .first()
            .copied()
            .ok_or(PredictionError::EmptyOutput)?;
        if !probability.is_finite() {
            return Err(PredictionError::NonFiniteOutput(probability));
        }
        let probability = (probability as f64).clamp(0.0, 1.0);

        Ok(Prediction {
            probability,
            outlook: TrendingOutlook::from_probability(probability, &self.settings),
            defaulted_features,
            unseen_channel,
        })
    }

    fn engineer_features(
        &self,
        video: &RawVideoRecord,
        now: DateTime<Utc>,
    ) -> Result<(FeatureVector, bool), PredictionError> {
        let video = video.validate(ValidationMode::Inference)?;

        let frozen = self
            .model
            .metadata()
            .channel_frequencies
            .get(&video.channel);
        let frequency = frozen.unwrap_or(self.settings.unseen_channel_frequency);

        Ok((engineer(&video, frequency, now), frozen.is_none()))
    }

    /// Orders values the way the model expects. Names the schema does not
    /// know are filled with 0 and reported.
    fn model_input(
        &self,
        features: &FeatureVector,
    ) -> Result<(Vec<f32>, Vec<String>), PredictionError> {
        let mut row = Vec::with_capacity(self.model.feature_names().len());
        let mut defaulted = Vec::new();

        for name in self.model.feature_names() {
            let value = match Feature::from_column_name(name) {
                Some(feature) => features.value(feature),
                None => {
                    warn!("Feature '{}' is not produced by the pipeline, using 0", name);
                    defaulted.push(name.clone());
                    0.0
                }
            };
            if !value.is_finite() {
                return Err(PredictionError::NonFiniteFeature {
                    name: name.clone(),
                    value,
                });
            }
            row.push(value as f32);
        }
        Ok((row, defaulted))
    }
}
