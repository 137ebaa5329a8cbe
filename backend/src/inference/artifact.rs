//! On-disk model manifest.
//!
//! A manifest is a JSON document naming the feature columns, the class labels
//! and the fitted estimator parameters:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "name": "iris-decision-tree",
//!   "feature_names": ["sepal_length", "sepal_width", "petal_length", "petal_width"],
//!   "classes": ["setosa", "versicolor", "virginica"],
//!   "estimator": { "kind": "decision_tree", "nodes": [{ "class": 0 }] }
//! }
//! ```

use std::collections::HashSet;
use std::path::PathBuf;

use ndarray::ArrayView1;
use serde::Deserialize;

use super::ArtifactError;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Deserialize)]
pub struct ModelManifest {
    pub format_version: u32,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub feature_names: Vec<String>,
    pub classes: Vec<String>,
    pub estimator: Estimator,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    DecisionTree {
        nodes: Vec<TreeNode>,
    },
    RandomForest {
        trees: Vec<Vec<TreeNode>>,
    },
    Logistic {
        coefficients: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    },
    /// Graph file is resolved relative to the manifest's directory.
    Onnx {
        graph: PathBuf,
        #[serde(default)]
        output: usize,
    },
}

impl Estimator {
    pub fn kind(&self) -> &'static str {
        match self {
            Estimator::DecisionTree { .. } => "decision_tree",
            Estimator::RandomForest { .. } => "random_forest",
            Estimator::Logistic { .. } => "logistic",
            Estimator::Onnx { .. } => "onnx",
        }
    }
}

/// A node of a binary decision tree. Node 0 is the root.
///
/// Split nodes send `x[feature] <= threshold` to `left`, everything else to
/// `right`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        class: usize,
    },
}

impl ModelManifest {
    /// Checks the manifest against the request schema's column order.
    pub fn validate(&self, expected_features: &[&str]) -> Result<(), ArtifactError> {
        if self.format_version != FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion(self.format_version));
        }

        if self.feature_names.iter().map(String::as_str).ne(expected_features.iter().copied()) {
            return Err(ArtifactError::FeatureOrder {
                expected: expected_features.iter().map(|s| s.to_string()).collect(),
                found: self.feature_names.clone(),
            });
        }

        if self.classes.is_empty() {
            return Err(ArtifactError::invalid("no classes declared"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.classes.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(ArtifactError::invalid(format!("duplicate class label `{}`", dup)));
        }

        let n_features = self.feature_names.len();
        let n_classes = self.classes.len();

        match &self.estimator {
            Estimator::DecisionTree { nodes } => {
                validate_tree(nodes, n_features, n_classes, "tree")
            }
            Estimator::RandomForest { trees } => {
                if trees.is_empty() {
                    return Err(ArtifactError::invalid("random forest has no trees"));
                }
                trees.iter().enumerate().try_for_each(|(i, nodes)| {
                    validate_tree(nodes, n_features, n_classes, &format!("tree {}", i))
                })
            }
            Estimator::Logistic {
                coefficients,
                intercepts,
            } => validate_linear(coefficients, intercepts, n_features, n_classes),
            Estimator::Onnx { .. } => Ok(()),
        }
    }
}

fn validate_tree(
    nodes: &[TreeNode],
    n_features: usize,
    n_classes: usize,
    label: &str,
) -> Result<(), ArtifactError> {
    if nodes.is_empty() {
        return Err(ArtifactError::invalid(format!("{} has no nodes", label)));
    }

    for (i, node) in nodes.iter().enumerate() {
        match *node {
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if feature >= n_features {
                    return Err(ArtifactError::invalid(format!(
                        "{} node {} splits on feature {} (only {} features)",
                        label, i, feature, n_features
                    )));
                }
                if !threshold.is_finite() {
                    return Err(ArtifactError::invalid(format!(
                        "{} node {} has a non-finite threshold",
                        label, i
                    )));
                }
                // Children must point forward so traversal always terminates.
                for child in [left, right] {
                    if child <= i || child >= nodes.len() {
                        return Err(ArtifactError::invalid(format!(
                            "{} node {} has invalid child index {}",
                            label, i, child
                        )));
                    }
                }
            }
            TreeNode::Leaf { class } => {
                if class >= n_classes {
                    return Err(ArtifactError::invalid(format!(
                        "{} leaf {} predicts unknown class index {}",
                        label, i, class
                    )));
                }
            }
        }
    }

    Ok(())
}

fn validate_linear(
    coefficients: &[Vec<f64>],
    intercepts: &[f64],
    n_features: usize,
    n_classes: usize,
) -> Result<(), ArtifactError> {
    if n_classes < 2 {
        return Err(ArtifactError::invalid("linear model needs at least two classes"));
    }
    // A single row scores the second class against the first.
    let binary = n_classes == 2 && coefficients.len() == 1;
    if !binary && coefficients.len() != n_classes {
        return Err(ArtifactError::invalid(format!(
            "expected {} coefficient rows, found {}",
            n_classes,
            coefficients.len()
        )));
    }
    if intercepts.len() != coefficients.len() {
        return Err(ArtifactError::invalid(format!(
            "expected {} intercepts, found {}",
            coefficients.len(),
            intercepts.len()
        )));
    }
    if let Some(row) = coefficients.iter().position(|r| r.len() != n_features) {
        return Err(ArtifactError::invalid(format!(
            "coefficient row {} does not have {} entries",
            row, n_features
        )));
    }
    let all_finite = coefficients.iter().flatten().chain(intercepts).all(|v| v.is_finite());
    if !all_finite {
        return Err(ArtifactError::invalid("linear model contains non-finite parameters"));
    }
    Ok(())
}

/// Walks a validated tree down to a leaf.
pub(crate) fn tree_class(nodes: &[TreeNode], row: ArrayView1<'_, f64>) -> usize {
    let mut index = 0;
    loop {
        match nodes[index] {
            TreeNode::Leaf { class } => return class,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                index = if row[feature] <= threshold { left } else { right };
            }
        }
    }
}

/// Majority vote; ties go to the lowest class index.
pub(crate) fn forest_class(
    trees: &[Vec<TreeNode>],
    row: ArrayView1<'_, f64>,
    n_classes: usize,
) -> usize {
    let mut votes = vec![0usize; n_classes];
    for nodes in trees {
        votes[tree_class(nodes, row)] += 1;
    }
    argmax(votes.iter().map(|&v| v as f64))
}

pub(crate) fn linear_class(
    coefficients: &[Vec<f64>],
    intercepts: &[f64],
    row: ArrayView1<'_, f64>,
) -> usize {
    let scores = coefficients
        .iter()
        .zip(intercepts)
        .map(|(weights, b)| weights.iter().zip(row.iter()).map(|(w, x)| w * x).sum::<f64>() + b);

    if coefficients.len() == 1 {
        let score = scores.into_iter().next().unwrap_or_default();
        return usize::from(score > 0.0);
    }
    argmax(scores)
}

/// Index of the first maximum.
pub(crate) fn argmax<I: IntoIterator<Item = f64>>(values: I) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, v) in values.into_iter().enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}
