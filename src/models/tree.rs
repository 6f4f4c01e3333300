//! Gradient-boosted tree ensemble scoring
//!
//! Trees are node arrays as exported from training. Split nodes send a row
//! left when `value < threshold`, the XGBoost convention.

use super::{Classifier, Objective};
use crate::error::{ModelLoadError, RequestError};
use crate::feature_encoder::FeatureVector;
use serde::{Deserialize, Serialize};

/// Tree ensemble section of the artifact manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsembleDocument {
    #[serde(default)]
    pub objective: Objective,
    /// Margin added to every prediction
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<TreeDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeDocument {
    pub nodes: Vec<NodeDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeDocument {
    Split {
        feature: String,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default)]
        cover: f64,
    },
    Leaf {
        leaf: f64,
        #[serde(default)]
        cover: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        cover: f64,
    },
    Leaf {
        value: f64,
        cover: f64,
    },
}

impl Node {
    pub(crate) fn cover(&self) -> f64 {
        match self {
            Node::Split { cover, .. } | Node::Leaf { cover, .. } => *cover,
        }
    }
}

/// One regression tree. Node 0 is the root; children always sit after their
/// parent, so the node array has no cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_document(
        index: usize,
        doc: TreeDocument,
        feature_names: &[String],
    ) -> Result<Self, ModelLoadError> {
        let invalid = |msg: String| ModelLoadError::Invalid(format!("tree {}: {}", index, msg));

        if doc.nodes.is_empty() {
            return Err(invalid("no nodes".to_string()));
        }

        let count = doc.nodes.len();
        let mut nodes = Vec::with_capacity(count);
        for (id, node) in doc.nodes.into_iter().enumerate() {
            let node = match node {
                NodeDocument::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    cover,
                } => {
                    let feature_index = feature_names
                        .iter()
                        .position(|n| *n == feature)
                        .ok_or_else(|| {
                            invalid(format!("node {} splits on unknown feature `{}`", id, feature))
                        })?;
                    if !threshold.is_finite() {
                        return Err(invalid(format!("node {} has a non-finite threshold", id)));
                    }
                    for child in [left, right] {
                        if child <= id || child >= count {
                            return Err(invalid(format!(
                                "node {} has out-of-order child {}",
                                id, child
                            )));
                        }
                    }
                    if left == right {
                        return Err(invalid(format!("node {} has identical children", id)));
                    }
                    Node::Split {
                        feature: feature_index,
                        threshold,
                        left,
                        right,
                        cover,
                    }
                }
                NodeDocument::Leaf { leaf, cover } => {
                    if !leaf.is_finite() {
                        return Err(invalid(format!("leaf {} has a non-finite value", id)));
                    }
                    Node::Leaf { value: leaf, cover }
                }
            };
            if !node.cover().is_finite() || node.cover() < 0.0 {
                return Err(invalid(format!("node {} has an invalid cover", id)));
            }
            nodes.push(node);
        }

        Ok(Self { nodes })
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Leaf value reached by a row.
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value, .. } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    index = if row[*feature] < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// Boosted tree ensemble: raw output is `base_score + Σ tree(row)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeEnsemble {
    feature_names: Vec<String>,
    objective: Objective,
    base_score: f64,
    trees: Vec<Tree>,
}

impl TreeEnsemble {
    /// Resolve a tree ensemble document against the training columns.
    pub fn from_document(
        doc: TreeEnsembleDocument,
        feature_names: &[String],
    ) -> Result<Self, ModelLoadError> {
        if doc.trees.is_empty() {
            return Err(ModelLoadError::Invalid(
                "tree ensemble has no trees".to_string(),
            ));
        }
        if !doc.base_score.is_finite() {
            return Err(ModelLoadError::Invalid(
                "tree ensemble base_score is not finite".to_string(),
            ));
        }

        let trees = doc
            .trees
            .into_iter()
            .enumerate()
            .map(|(i, tree)| Tree::from_document(i, tree, feature_names))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            feature_names: feature_names.to_vec(),
            objective: doc.objective,
            base_score: doc.base_score,
            trees,
        })
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Raw margin for a positional row already in training order.
    pub(crate) fn margin(&self, row: &[f64]) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }
}

impl Classifier for TreeEnsemble {
    fn backend(&self) -> &'static str {
        "tree_ensemble"
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn objective(&self) -> Objective {
        self.objective
    }

    fn raw_output(&self, vector: &FeatureVector) -> Result<f64, RequestError> {
        if vector.len() != self.feature_names.len() {
            return Err(RequestError::schema_mismatch(
                "feature_vector",
                format!(
                    "model expects {} features, vector has {}",
                    self.feature_names.len(),
                    vector.len()
                ),
            ));
        }
        Ok(self.margin(vector.values()))
    }
}
