use super::{FeatureMatrix, RevenueModel};
use crate::errors::ServiceError;
use serde::{Deserialize, Serialize};

pub const MODEL_FORMAT_VERSION: u32 = 1;

fn default_format_version() -> u32 {
    MODEL_FORMAT_VERSION
}

fn default_true() -> bool {
    true
}

/// Link applied to the summed raw score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Identity link (squared error, huber, quantile)
    #[default]
    #[serde(alias = "regression_l2", alias = "l2", alias = "huber", alias = "quantile")]
    Regression,
    /// Log link, prediction is `exp(raw)`
    #[serde(alias = "gamma", alias = "tweedie")]
    Poisson,
}

impl Objective {
    fn link(self, raw: f64) -> f64 {
        match self {
            Objective::Regression => raw,
            Objective::Poisson => raw.exp(),
        }
    }
}

/// On-disk gradient-boosted ensemble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsembleArtifact {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    #[serde(default)]
    pub objective: Objective,
    pub num_features: usize,
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<TreeSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSpec {
    pub nodes: Vec<NodeSpec>,
}

/// Node 0 is the root. Children must sit after their parent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeSpec {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default = "default_true")]
        default_left: bool,
    },
    Leaf {
        leaf: f64,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<NodeSpec>,
}

impl Tree {
    fn from_spec(spec: TreeSpec, num_features: usize) -> Result<Self, String> {
        let len = spec.nodes.len();
        if len == 0 {
            return Err("tree has no nodes".to_string());
        }

        for (idx, node) in spec.nodes.iter().enumerate() {
            match *node {
                NodeSpec::Leaf { leaf } if !leaf.is_finite() => {
                    return Err(format!("node {} has a non-finite leaf value", idx));
                }
                NodeSpec::Leaf { .. } => {}
                NodeSpec::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    if feature >= num_features {
                        return Err(format!(
                            "node {} splits on feature {} but the model has {}",
                            idx, feature, num_features
                        ));
                    }
                    if threshold.is_nan() {
                        return Err(format!("node {} has a NaN threshold", idx));
                    }
                    for child in [left, right] {
                        if child <= idx || child >= len {
                            return Err(format!(
                                "node {} points to child {} outside {}..{}",
                                idx,
                                child,
                                idx + 1,
                                len
                            ));
                        }
                    }
                }
            }
        }

        Ok(Self { nodes: spec.nodes })
    }

    /// Walks from the root to a leaf. Terminates because every child index
    /// is strictly greater than its parent's.
    fn evaluate(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                NodeSpec::Leaf { leaf } => return leaf,
                NodeSpec::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    let x = row[feature];
                    idx = if x.is_nan() {
                        if default_left {
                            left
                        } else {
                            right
                        }
                    } else if x <= threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

/// Additive ensemble of regression trees
#[derive(Debug, Clone)]
pub struct TreeEnsembleModel {
    objective: Objective,
    num_features: usize,
    base_score: f64,
    trees: Vec<Tree>,
}

impl TreeEnsembleModel {
    pub fn from_artifact(artifact: TreeEnsembleArtifact) -> Result<Self, ServiceError> {
        if artifact.format_version != MODEL_FORMAT_VERSION {
            return Err(invalid(format!(
                "unsupported format_version {}",
                artifact.format_version
            )));
        }
        if artifact.num_features == 0 {
            return Err(invalid("num_features must be positive"));
        }
        if !artifact.base_score.is_finite() {
            return Err(invalid("base_score must be finite"));
        }
        if artifact.trees.is_empty() {
            return Err(invalid("ensemble has no trees"));
        }

        let num_features = artifact.num_features;
        let trees = artifact
            .trees
            .into_iter()
            .enumerate()
            .map(|(idx, spec)| {
                Tree::from_spec(spec, num_features)
                    .map_err(|msg| invalid(format!("tree {}: {}", idx, msg)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            objective: artifact.objective,
            num_features,
            base_score: artifact.base_score,
            trees,
        })
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        let raw = self.base_score + self.trees.iter().map(|t| t.evaluate(row)).sum::<f64>();
        self.objective.link(raw)
    }
}

impl RevenueModel for TreeEnsembleModel {
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ServiceError> {
        if features.n_cols() != self.num_features {
            return Err(ServiceError::TransformError(format!(
                "feature matrix has {} columns but the model expects {}",
                features.n_cols(),
                self.num_features
            )));
        }
        Ok(features.rows().map(|row| self.predict_row(row)).collect())
    }

    fn n_features(&self) -> usize {
        self.num_features
    }

    fn kind(&self) -> &'static str {
        "gradient_boosted_trees"
    }
}

fn invalid(msg: impl std::fmt::Display) -> ServiceError {
    ServiceError::ArtifactNotFound(format!("invalid model: {}", msg))
}
