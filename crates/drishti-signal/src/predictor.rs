//! Gradient-boosted direction classifier.
//!
//! The artifact is a JSON export of an sklearn `GradientBoostingClassifier`
//! (staged regression trees per class, additive raw scores, softmax over
//! class scores). The artifact's feature list must match the 74-slot schema
//! exactly; the list is the contract between training and inference.

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use drishti_models::{Direction, EngineError, FeatureVector, Prediction, FEATURE_NAMES};

/// One regression-tree node. Leaf nodes have `feature == -1`.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeNode {
    pub feature: i32,
    pub threshold: f64,
    pub left: i32,
    pub right: i32,
    pub value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TreeJson {
    nodes: Vec<TreeNode>,
}

#[derive(Debug, Deserialize)]
struct ModelJson {
    model_type: String,
    feature_names: Vec<String>,
    n_features: usize,
    n_classes: usize,
    n_estimators: usize,
    learning_rate: f64,
    /// Log-odds prior per class, order [down, up].
    init_value: Vec<f64>,
    /// stages[stage][class] = tree.
    stages: Vec<Vec<TreeJson>>,
}

/// Loaded, immutable model artifact.
#[derive(Debug)]
pub struct GradientBoosted {
    learning_rate: f64,
    init_value: [f64; 2],
    stages: Vec<Vec<Vec<TreeNode>>>,
}

impl GradientBoosted {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            EngineError::DataUnavailable(format!(
                "model artifact {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let model: ModelJson = serde_json::from_str(json)
            .map_err(|e| EngineError::FeatureSchemaMismatch(format!("artifact parse: {e}")))?;

        if model.model_type != "gradient_boosted" {
            return Err(EngineError::FeatureSchemaMismatch(format!(
                "expected model_type gradient_boosted, got {}",
                model.model_type
            )));
        }
        if model.n_classes != 2 || model.init_value.len() != 2 {
            return Err(EngineError::FeatureSchemaMismatch(format!(
                "expected 2 classes, got {}",
                model.n_classes
            )));
        }
        if model.n_features != FEATURE_NAMES.len()
            || model.feature_names.len() != FEATURE_NAMES.len()
        {
            return Err(EngineError::FeatureSchemaMismatch(format!(
                "expected {} features, artifact has {}",
                FEATURE_NAMES.len(),
                model.feature_names.len()
            )));
        }
        for (i, (have, want)) in model
            .feature_names
            .iter()
            .zip(FEATURE_NAMES.iter())
            .enumerate()
        {
            if have != want {
                return Err(EngineError::FeatureSchemaMismatch(format!(
                    "feature {i}: artifact has '{have}', schema has '{want}'"
                )));
            }
        }
        if model.stages.len() != model.n_estimators {
            return Err(EngineError::FeatureSchemaMismatch(format!(
                "n_estimators {} but {} stages",
                model.n_estimators,
                model.stages.len()
            )));
        }
        for (i, stage) in model.stages.iter().enumerate() {
            if stage.len() != 2 {
                return Err(EngineError::FeatureSchemaMismatch(format!(
                    "stage {i} has {} trees, expected 2",
                    stage.len()
                )));
            }
        }
        if model.learning_rate <= 0.0 || model.learning_rate > 1.0 {
            return Err(EngineError::FeatureSchemaMismatch(format!(
                "learning_rate {} out of (0, 1]",
                model.learning_rate
            )));
        }

        Ok(Self {
            learning_rate: model.learning_rate,
            init_value: [model.init_value[0], model.init_value[1]],
            stages: model
                .stages
                .into_iter()
                .map(|stage| stage.into_iter().map(|t| t.nodes).collect())
                .collect(),
        })
    }

    fn traverse(nodes: &[TreeNode], features: &[f64]) -> f64 {
        let mut i = 0usize;
        loop {
            let node = &nodes[i];
            if node.feature < 0 {
                return node.value.unwrap_or(0.0);
            }
            let v = features
                .get(node.feature as usize)
                .copied()
                .unwrap_or(f64::NAN);
            // NaN or <= threshold goes left.
            i = if v.is_nan() || v <= node.threshold {
                node.left as usize
            } else {
                node.right as usize
            };
        }
    }

    /// Calibrated class probabilities, order (down, up).
    pub fn predict_proba(&self, fv: &FeatureVector) -> (f64, f64) {
        let features = fv.as_slice();
        let mut scores = self.init_value;
        for stage in &self.stages {
            for (class, tree) in stage.iter().enumerate() {
                scores[class] += self.learning_rate * Self::traverse(tree, features);
            }
        }
        softmax2(scores)
    }
}

fn softmax2(scores: [f64; 2]) -> (f64, f64) {
    let max = scores[0].max(scores[1]);
    let e0 = (scores[0] - max).exp();
    let e1 = (scores[1] - max).exp();
    let sum = e0 + e1;
    (e0 / sum, e1 / sum)
}

/// Predictor facade: holds at most one loaded artifact.
#[derive(Debug, Default)]
pub struct Predictor {
    model: Option<Arc<GradientBoosted>>,
}

impl Predictor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(model: GradientBoosted) -> Self {
        Self {
            model: Some(Arc::new(model)),
        }
    }

    /// Share one loaded artifact across pipelines.
    pub fn with_shared(model: Arc<GradientBoosted>) -> Self {
        Self { model: Some(model) }
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        self.model = Some(Arc::new(GradientBoosted::from_json_file(path)?));
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Direction plus confidence from the loaded artifact.
    pub fn predict(&self, fv: &FeatureVector) -> Result<Prediction, EngineError> {
        let model = self.model.as_ref().ok_or(EngineError::ModelNotLoaded)?;
        let (down, up) = model.predict_proba(fv);
        let direction = if up >= down {
            Direction::Buy
        } else {
            Direction::Sell
        };
        Ok(Prediction {
            direction,
            confidence: 100.0 * up.max(down),
            up_prob: up,
            down_prob: down,
        })
    }
}
