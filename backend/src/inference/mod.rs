//! Model loading and single-row inference.
//!
//! [`ModelInference`] is the production [`Classifier`]; it is built once at
//! startup from a [manifest](artifact::ModelManifest) and is immutable
//! afterwards, so it can be shared across workers behind an `Arc`.

pub mod artifact;
#[cfg(feature = "onnx")]
mod onnx;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ndarray::ArrayView2;
use serde::Serialize;
use thiserror::Error;

use crate::models::FEATURE_NAMES;
use artifact::{Estimator, ModelManifest, TreeNode};

/// A fitted classifier that maps feature rows to class labels.
///
/// Implementations must be safe to call from many threads at once.
pub trait Classifier: Send + Sync {
    /// Predicts one label per row of `input`.
    fn predict(&self, input: ArrayView2<'_, f64>) -> Result<Vec<String>, InferenceError>;

    fn info(&self) -> ModelInfo;
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("expected {expected} feature columns, got {actual}")]
    Shape { expected: usize, actual: usize },

    #[error("feature `{feature}` in row {row} is not finite")]
    NonFinite { row: usize, feature: String },

    #[error("model produced no prediction")]
    EmptyOutput,

    #[error("model runtime error: {0}")]
    Runtime(String),
}

/// Reasons a model artifact cannot be served.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read model artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model artifact {path} is not a valid manifest: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported artifact format version {0}")]
    UnsupportedVersion(u32),

    #[error("feature order mismatch: expected {expected:?}, artifact declares {found:?}")]
    FeatureOrder {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("invalid model artifact: {0}")]
    Invalid(String),

    #[error("estimator kind `{0}` is not supported by this build")]
    Unsupported(&'static str),
}

impl ArtifactError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
    pub kind: String,
    pub feature_names: Vec<String>,
    pub classes: Vec<String>,
    pub loaded_at: String,
}

enum Scorer {
    Tree(Vec<TreeNode>),
    Forest(Vec<Vec<TreeNode>>),
    Linear {
        coefficients: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    },
    #[cfg(feature = "onnx")]
    Onnx(onnx::OnnxScorer),
}

pub struct ModelInference {
    name: String,
    version: String,
    kind: &'static str,
    feature_names: Vec<String>,
    classes: Vec<String>,
    scorer: Scorer,
    loaded_at: DateTime<Utc>,
}

impl std::fmt::Debug for ModelInference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInference")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("kind", &self.kind)
            .field("classes", &self.classes)
            .finish()
    }
}

impl ModelInference {
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self, ArtifactError> {
        let path = model_path.as_ref();
        let raw = std::fs::read(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: ModelManifest =
            serde_json::from_slice(&raw).map_err(|source| ArtifactError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_manifest(manifest, base_dir)
    }

    /// Builds a model from an already decoded manifest. Relative paths inside
    /// the manifest are resolved against `base_dir`.
    pub fn from_manifest(
        manifest: ModelManifest,
        base_dir: &Path,
    ) -> Result<Self, ArtifactError> {
        manifest.validate(&FEATURE_NAMES)?;
        let kind = manifest.estimator.kind();

        let scorer = match manifest.estimator {
            Estimator::DecisionTree { nodes } => Scorer::Tree(nodes),
            Estimator::RandomForest { trees } => Scorer::Forest(trees),
            Estimator::Logistic {
                coefficients,
                intercepts,
            } => Scorer::Linear {
                coefficients,
                intercepts,
            },
            #[cfg(feature = "onnx")]
            Estimator::Onnx { graph, output } => {
                let graph_path = base_dir.join(graph);
                let scorer = onnx::OnnxScorer::load(&graph_path, FEATURE_NAMES.len(), output)
                    .map_err(|e| {
                        ArtifactError::invalid(format!(
                            "failed to load ONNX graph {}: {:#}",
                            graph_path.display(),
                            e
                        ))
                    })?;
                Scorer::Onnx(scorer)
            }
            #[cfg(not(feature = "onnx"))]
            Estimator::Onnx { .. } => {
                let _ = base_dir;
                return Err(ArtifactError::Unsupported("onnx"));
            }
        };

        Ok(ModelInference {
            name: manifest.name,
            version: manifest.version,
            kind,
            feature_names: manifest.feature_names,
            classes: manifest.classes,
            scorer,
            loaded_at: Utc::now(),
        })
    }

    fn class_index(&self, row: ndarray::ArrayView1<'_, f64>) -> Result<usize, InferenceError> {
        let index = match &self.scorer {
            Scorer::Tree(nodes) => artifact::tree_class(nodes, row),
            Scorer::Forest(trees) => artifact::forest_class(trees, row, self.classes.len()),
            Scorer::Linear {
                coefficients,
                intercepts,
            } => artifact::linear_class(coefficients, intercepts, row),
            #[cfg(feature = "onnx")]
            Scorer::Onnx(scorer) => {
                let scores = scorer
                    .scores(row)
                    .map_err(|e| InferenceError::Runtime(format!("{:#}", e)))?;
                if scores.len() != self.classes.len() {
                    return Err(InferenceError::Runtime(format!(
                        "graph produced {} scores for {} classes",
                        scores.len(),
                        self.classes.len()
                    )));
                }
                artifact::argmax(scores.into_iter().map(f64::from))
            }
        };
        Ok(index)
    }
}

impl Classifier for ModelInference {
    fn predict(&self, input: ArrayView2<'_, f64>) -> Result<Vec<String>, InferenceError> {
        if input.ncols() != self.feature_names.len() {
            return Err(InferenceError::Shape {
                expected: self.feature_names.len(),
                actual: input.ncols(),
            });
        }

        input
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                if let Some(col) = row.iter().position(|v| !v.is_finite()) {
                    return Err(InferenceError::NonFinite {
                        row: i,
                        feature: self.feature_names[col].clone(),
                    });
                }
                let class = self.class_index(row)?;
                Ok(self.classes[class].clone())
            })
            .collect()
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: self.name.clone(),
            version: self.version.clone(),
            kind: self.kind.to_string(),
            feature_names: self.feature_names.clone(),
            classes: self.classes.clone(),
            loaded_at: self.loaded_at.to_rfc3339(),
        }
    }
}
