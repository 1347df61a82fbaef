use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::TrainingSettings;
use crate::dataset::{engineered_frame, split_features_and_target};
use crate::error::TrainingError;
use crate::features::{EngineeredBatch, FeatureSchema};
use crate::metrics::{f1_score, ClassificationReport};
use crate::model::{GbdtClassifier, HyperParams, ModelMetadata, TrainedModel};

/// Everything a training run produces.
#[derive(Debug)]
pub struct TrainingOutcome {
    pub model: TrainedModel,
    /// Held-out evaluation of the final model
    pub report: ClassificationReport,
    pub search: GridSearchResult,
    /// Rows after oversampling, before the train/test split
    pub balanced_rows: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridSearchResult {
    pub best_params: HyperParams,
    pub best_score: f64,
    /// Mean F1 of every candidate, in grid order
    pub scores: Vec<(HyperParams, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub x_train: Vec<Vec<f32>>,
    pub y_train: Vec<bool>,
    pub x_test: Vec<Vec<f32>>,
    pub y_test: Vec<bool>,
}

// Oversampling
//
// Synthetic minority rows are interpolated between a minority row and one of
// its nearest minority neighbours until both classes have the same count.
// Synthetic rows are appended after the originals.
pub fn smote(
    rows: &[Vec<f32>],
    labels: &[bool],
    k_neighbors: usize,
    rng: &mut StdRng,
) -> Result<(Vec<Vec<f32>>, Vec<bool>), TrainingError> {
    let positives = labels.iter().filter(|&&l| l).count();
    let negatives = labels.len() - positives;
    if positives == 0 {
        return Err(TrainingError::SingleClass("not trending"));
    }
    if negatives == 0 {
        return Err(TrainingError::SingleClass("trending"));
    }

    let mut out_rows = rows.to_vec();
    let mut out_labels = labels.to_vec();
    if positives == negatives {
        return Ok((out_rows, out_labels));
    }

    let minority_label = positives < negatives;
    let minority = rows
        .iter()
        .zip(labels.iter())
        .filter(|&(_, &label)| label == minority_label)
        .map(|(row, _)| row)
        .collect::<Vec<_>>();
    if minority.len() < 2 {
        return Err(TrainingError::TooFewMinority {
            found: minority.len(),
            needed: 2,
        });
    }

    let k = k_neighbors.min(minority.len() - 1);
    let neighbors = minority
        .iter()
        .enumerate()
        .map(|(i, row)| nearest_neighbors(&minority, i, row, k))
        .collect::<Vec<_>>();

    let needed = positives.max(negatives) - minority.len();
    for _ in 0..needed {
        let i = rng.gen_range(0..minority.len());
        let j = neighbors[i][rng.gen_range(0..k)];
        let gap: f32 = rng.gen();
        let synthetic = minority[i]
            .iter()
            .zip(minority[j].iter())
            .map(|(a, b)| a + gap * (b - a))
            .collect();
        out_rows.push(synthetic);
        out_labels.push(minority_label);
    }

    debug!("Oversampled {} synthetic rows with k={} neighbors", needed, k);
    Ok((out_rows, out_labels))
}

fn nearest_neighbors(points: &[&Vec<f32>], index: usize, point: &[f32], k: usize) -> Vec<usize> {
    let mut distances = points
        .iter()
        .enumerate()
        .filter(|(j, _)| *j != index)
        .map(|(j, other)| {
            let distance: f32 = point
                .iter()
                .zip(other.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            (j, distance)
        })
        .collect::<Vec<_>>();
    distances.sort_by(|a, b| a.1.total_cmp(&b.1));
    distances.into_iter().take(k).map(|(j, _)| j).collect()
}

/// Shuffles with `rng` and holds out `ceil(len * perc_test_size)` rows.
pub fn train_test_split(
    rows: Vec<Vec<f32>>,
    labels: Vec<bool>,
    perc_test_size: f64,
    rng: &mut StdRng,
) -> Split {
    // generate vector from 0 to # of rows
    let mut indices: Vec<usize> = (0..rows.len()).collect();
    indices.shuffle(rng);

    let test_len = ((rows.len() as f64 * perc_test_size).ceil() as usize).min(rows.len());
    let (test_indices, train_indices) = indices.split_at(test_len);

    let take = |idx: &[usize]| -> (Vec<Vec<f32>>, Vec<bool>) {
        idx.iter().map(|&i| (rows[i].clone(), labels[i])).unzip()
    };
    let (x_train, y_train) = take(train_indices);
    let (x_test, y_test) = take(test_indices);

    Split {
        x_train,
        y_train,
        x_test,
        y_test,
    }
}

/// Assigns every row to one of `k` folds, spreading each class evenly.
/// Fails when a fold would miss one of the two classes.
pub fn stratified_folds(labels: &[bool], k: usize) -> Result<Vec<Vec<usize>>, TrainingError> {
    let mut folds = vec![Vec::new(); k];
    for class in [true, false] {
        let members = labels
            .iter()
            .enumerate()
            .filter(|&(_, &label)| label == class)
            .map(|(i, _)| i);
        for (n, index) in members.enumerate() {
            folds[n % k].push(index);
        }
    }

    for (fold, members) in folds.iter_mut().enumerate() {
        members.sort_unstable();
        if !members.iter().any(|&i| labels[i]) {
            return Err(TrainingError::DegenerateFold {
                fold,
                missing: "trending",
            });
        }
        if members.iter().all(|&i| labels[i]) {
            return Err(TrainingError::DegenerateFold {
                fold,
                missing: "not trending",
            });
        }
    }
    Ok(folds)
}

fn cross_validate(
    rows: &[Vec<f32>],
    labels: &[bool],
    folds: &[Vec<usize>],
    params: &HyperParams,
    seed: u64,
) -> f64 {
    let mut fold_of = vec![0; rows.len()];
    for (fold, members) in folds.iter().enumerate() {
        for &i in members {
            fold_of[i] = fold;
        }
    }

    let total: f64 = (0..folds.len())
        .map(|fold| {
            let (train_rows, train_labels): (Vec<_>, Vec<_>) = (0..rows.len())
                .filter(|&i| fold_of[i] != fold)
                .map(|i| (rows[i].clone(), labels[i]))
                .unzip();
            let (valid_rows, valid_labels): (Vec<_>, Vec<_>) = folds[fold]
                .iter()
                .map(|&i| (rows[i].clone(), labels[i]))
                .unzip();

            let fold_seed = seed.wrapping_add(fold as u64);
            let classifier = GbdtClassifier::fit(&train_rows, &train_labels, params, fold_seed);
            f1_score(&valid_labels, &classifier.predict(&valid_rows))
        })
        .sum();
    total / folds.len() as f64
}

/// Scores every candidate by mean F1 over stratified folds.
/// Candidates are evaluated in parallel; ties go to the earliest candidate.
/// Fold `i` of every candidate subsamples with `seed + i`.
pub fn grid_search(
    rows: &[Vec<f32>],
    labels: &[bool],
    candidates: &[HyperParams],
    cv_folds: usize,
    seed: u64,
) -> Result<GridSearchResult, TrainingError> {
    if candidates.is_empty() {
        return Err(TrainingError::EmptyGrid);
    }
    let folds = stratified_folds(labels, cv_folds)?;

    info!(
        "Grid search over {} candidates x {} folds",
        candidates.len(),
        cv_folds
    );
    let scores = candidates
        .par_iter()
        .map(|params| {
            let score = cross_validate(rows, labels, &folds, params, seed);
            debug!("{} -> mean F1 {:.4}", params, score);
            (*params, score)
        })
        .collect::<Vec<_>>();

    let mut best = scores[0];
    for &(params, score) in &scores[1..] {
        if score > best.1 {
            best = (params, score);
        }
    }

    Ok(GridSearchResult {
        best_params: best.0,
        best_score: best.1,
        scores,
    })
}

/// Fits the trending classifier on a labeled engineered batch.
///
/// Steps:
/// 1. Select the schema's feature columns and the label
/// 2. Balance the classes by oversampling
/// 3. Split into train and test partitions
/// 4. Grid search on the train partition
/// 5. Fit the best candidate on the train partition
/// 6. Evaluate on the test partition
pub fn train_trending_model(
    batch: &EngineeredBatch,
    schema: &FeatureSchema,
    settings: &TrainingSettings,
    trained_at: DateTime<Utc>,
) -> Result<TrainingOutcome, TrainingError> {
    let view_threshold = batch.view_threshold.ok_or(TrainingError::Unlabeled)?;
    if batch.len() < settings.cv_folds {
        return Err(TrainingError::NotEnoughRows(batch.len()));
    }

    // 1. Engineered table to feature matrix
    let df = engineered_frame(batch, schema)?;
    let feature_names = schema
        .column_names()
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();
    let (rows, labels) = split_features_and_target(&df, &feature_names)?;

    // 2. Handle class imbalance
    let mut rng = StdRng::seed_from_u64(settings.seed);
    let (rows, labels) = smote(&rows, &labels, settings.smote_neighbors, &mut rng)?;
    let balanced_rows = rows.len();
    info!("Balanced training set has {} rows", balanced_rows);

    // 3. Train/test split
    let split = train_test_split(rows, labels, settings.test_size, &mut rng);

    // 4. Hyperparameter tuning
    let search = grid_search(
        &split.x_train,
        &split.y_train,
        &settings.grid.candidates(),
        settings.cv_folds,
        settings.seed,
    )?;
    info!(
        "Best parameters: {} (mean F1 {:.4})",
        search.best_params, search.best_score
    );

    // 5. Fit best model
    let classifier = GbdtClassifier::fit(
        &split.x_train,
        &split.y_train,
        &search.best_params,
        settings.seed,
    );

    // 6. Evaluate
    let predicted = classifier.predict(&split.x_test);
    let report = ClassificationReport::new(&split.y_test, &predicted);

    let metadata = ModelMetadata {
        schema_version: schema.version,
        feature_names,
        channel_frequencies: batch.channel_frequencies.clone(),
        view_threshold,
        params: search.best_params,
        cv_f1: search.best_score,
        trained_at,
    };

    Ok(TrainingOutcome {
        model: TrainedModel::new(classifier, metadata),
        report,
        search,
        balanced_rows,
    })
}
