use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Deserializer};

use super::Classifier;
use crate::error::InferenceError;

const LEAF: i64 = -1;

/// One fitted decision tree in the flat array layout scikit-learn uses
/// internally (`tree_.children_left`, `tree_.value`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct TreeArrays {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    /// Per-node class distribution: counts or fractions, normalized on use.
    /// Accepts `tree_.value` as exported, `[nodes][1][classes]`, or with the
    /// outputs axis already squeezed.
    #[serde(deserialize_with = "node_values")]
    pub value: Vec<Vec<f64>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NodeValue {
    Classes(Vec<f64>),
    Outputs(Vec<Vec<f64>>),
}

fn node_values<'de, D>(deserializer: D) -> Result<Vec<Vec<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    Vec::<NodeValue>::deserialize(deserializer)?
        .into_iter()
        .map(|node| match node {
            NodeValue::Classes(values) => Ok(values),
            NodeValue::Outputs(mut outputs) if outputs.len() == 1 => Ok(outputs.remove(0)),
            NodeValue::Outputs(outputs) => Err(D::Error::custom(format!(
                "multi-output trees are not supported ({} outputs)",
                outputs.len()
            ))),
        })
        .collect()
}

/// Random forest or single decision tree exported as JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeEnsemble {
    pub n_features: usize,
    pub classes: Vec<i64>,
    pub trees: Vec<TreeArrays>,
}

impl TreeArrays {
    fn validate(&self, n_features: usize, n_classes: usize) -> Result<(), String> {
        let nodes = self.children_left.len();
        if nodes == 0 {
            return Err("tree has no nodes".into());
        }
        if [
            self.children_right.len(),
            self.feature.len(),
            self.threshold.len(),
            self.value.len(),
        ]
        .iter()
        .any(|&len| len != nodes)
        {
            return Err("tree arrays differ in length".into());
        }

        for node in 0..nodes {
            let (left, right) = (self.children_left[node], self.children_right[node]);
            if left == LEAF {
                if self.value[node].len() != n_classes {
                    return Err(format!(
                        "leaf {} has {} class values, expected {}",
                        node,
                        self.value[node].len(),
                        n_classes
                    ));
                }
                continue;
            }
            for child in [left, right] {
                // Children always come after their parent, which rules out cycles.
                if child <= node as i64 || child as usize >= nodes {
                    return Err(format!("node {} has invalid child {}", node, child));
                }
            }
            let feature = self.feature[node];
            if feature < 0 || feature as usize >= n_features {
                return Err(format!("node {} splits on unknown feature {}", node, feature));
            }
        }
        Ok(())
    }

    fn leaf_for(&self, row: &[f64]) -> &[f64] {
        let mut node = 0usize;
        while self.children_left[node] != LEAF {
            // Trees compare features at single precision.
            let x = row[self.feature[node] as usize] as f32 as f64;
            node = if x <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
        }
        &self.value[node]
    }
}

impl TreeEnsemble {
    pub fn from_json(json: &str) -> Result<Self, String> {
        let ensemble: TreeEnsemble = serde_json::from_str(json).map_err(|e| e.to_string())?;
        ensemble.validate()?;
        Ok(ensemble)
    }

    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let load_err = |reason: String| InferenceError::Load {
            path: path.display().to_string(),
            reason,
        };
        let json = fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let ensemble = Self::from_json(&json).map_err(load_err)?;
        info!(
            "Loaded tree ensemble from {} ({} trees, {} features, {} classes)",
            path.display(),
            ensemble.trees.len(),
            ensemble.n_features,
            ensemble.classes.len()
        );
        Ok(ensemble)
    }

    fn validate(&self) -> Result<(), String> {
        if self.classes.is_empty() {
            return Err("model has no classes".into());
        }
        if self.trees.is_empty() {
            return Err("model has no trees".into());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features, self.classes.len())
                .map_err(|e| format!("tree {}: {}", i, e))?;
        }
        Ok(())
    }

    /// Averaged class probabilities for one row.
    pub fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>, InferenceError> {
        if row.len() != self.n_features {
            return Err(InferenceError::InvalidInput(format!(
                "X has {} features, but the model is expecting {} features as input",
                row.len(),
                self.n_features
            )));
        }

        let mut proba = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            let leaf = tree.leaf_for(row);
            let total: f64 = leaf.iter().sum();
            if total <= 0.0 {
                continue;
            }
            for (p, v) in proba.iter_mut().zip(leaf) {
                *p += v / total;
            }
        }
        let n = self.trees.len() as f64;
        proba.iter_mut().for_each(|p| *p /= n);
        Ok(proba)
    }
}

impl Classifier for TreeEnsemble {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<i64>, InferenceError> {
        rows.iter()
            .map(|row| {
                let proba = self.predict_proba(row)?;
                // First maximum wins ties.
                let best = proba
                    .iter()
                    .enumerate()
                    .fold(0, |best, (i, p)| if *p > proba[best] { i } else { best });
                Ok(self.classes[best])
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Splits on feature 0 at 10.5: left predicts class 3, right class 7.
    const STUMP: &str = r#"{
        "n_features": 2,
        "classes": [3, 7],
        "trees": [{
            "children_left": [1, -1, -1],
            "children_right": [2, -1, -1],
            "feature": [0, -2, -2],
            "threshold": [10.5, -2.0, -2.0],
            "value": [[5.0, 5.0], [4.0, 1.0], [1.0, 4.0]]
        }]
    }"#;

    #[test]
    fn stump_predicts_by_threshold() {
        let model = TreeEnsemble::from_json(STUMP).unwrap();
        let labels = model
            .predict(&[vec![3.0, 0.0], vec![10.5, 0.0], vec![11.0, 99.0]])
            .unwrap();
        assert_eq!(labels, vec![3, 3, 7]);
    }

    #[test]
    fn forest_averages_normalized_votes() {
        let forest = r#"{
            "n_features": 1,
            "classes": [0, 1, 2],
            "trees": [
                {"children_left": [-1], "children_right": [-1], "feature": [-2],
                 "threshold": [-2.0], "value": [[0.0, 10.0, 0.0]]},
                {"children_left": [-1], "children_right": [-1], "feature": [-2],
                 "threshold": [-2.0], "value": [[0.0, 0.0, 0.4]]},
                {"children_left": [-1], "children_right": [-1], "feature": [-2],
                 "threshold": [-2.0], "value": [[0.0, 0.0, 0.6]]}
            ]
        }"#;
        let model = TreeEnsemble::from_json(forest).unwrap();
        let proba = model.predict_proba(&[1.0]).unwrap();
        assert!((proba[1] - 1.0 / 3.0).abs() < 1e-9);
        assert!((proba[2] - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(model.predict(&[vec![1.0]]).unwrap(), vec![2]);
    }

    #[test]
    fn ties_pick_first_class() {
        let tie = r#"{
            "n_features": 1, "classes": [5, 6],
            "trees": [{"children_left": [-1], "children_right": [-1], "feature": [-2],
                       "threshold": [-2.0], "value": [[2.0, 2.0]]}]
        }"#;
        let model = TreeEnsemble::from_json(tie).unwrap();
        assert_eq!(model.predict(&[vec![0.0]]).unwrap(), vec![5]);
    }

    #[test]
    fn accepts_value_with_outputs_axis() {
        let exported = STUMP.replace(
            "[[5.0, 5.0], [4.0, 1.0], [1.0, 4.0]]",
            "[[[5.0, 5.0]], [[4.0, 1.0]], [[1.0, 4.0]]]",
        );
        let model = TreeEnsemble::from_json(&exported).unwrap();
        assert_eq!(model.trees[0].value[1], vec![4.0, 1.0]);
        assert_eq!(
            model.predict(&[vec![3.0, 0.0], vec![11.0, 0.0]]).unwrap(),
            vec![3, 7]
        );

        let single_leaf = r#"{"n_features": 1, "classes": [4, 9],
            "trees": [{"children_left": [-1], "children_right": [-1], "feature": [-2],
                       "threshold": [-2.0], "value": [[[3.0, 1.0]]]}]}"#;
        let model = TreeEnsemble::from_json(single_leaf).unwrap();
        assert_eq!(model.predict(&[vec![0.0]]).unwrap(), vec![4]);
    }

    #[test]
    fn rejects_multi_output_values() {
        let multi = STUMP.replace(
            "[[5.0, 5.0], [4.0, 1.0], [1.0, 4.0]]",
            "[[[5.0, 5.0], [1.0, 1.0]], [[4.0, 1.0]], [[1.0, 4.0]]]",
        );
        assert!(TreeEnsemble::from_json(&multi).unwrap_err().contains("multi-output"));
    }

    #[test]
    fn wrong_feature_count_is_rejected() {
        let model = TreeEnsemble::from_json(STUMP).unwrap();
        let err = model.predict(&[vec![1.0, 2.0, 3.0]]).unwrap_err();
        assert!(err.to_string().contains("X has 3 features"));
    }

    #[test]
    fn malformed_trees_fail_validation() {
        let bad_child = STUMP.replace("[1, -1, -1]", "[0, -1, -1]");
        assert!(
            TreeEnsemble::from_json(&bad_child)
                .unwrap_err()
                .contains("invalid child")
        );

        let bad_feature = STUMP.replace("[0, -2, -2]", "[4, -2, -2]");
        assert!(
            TreeEnsemble::from_json(&bad_feature)
                .unwrap_err()
                .contains("unknown feature")
        );

        let short_leaf = STUMP.replace("[4.0, 1.0]", "[4.0]");
        assert!(
            TreeEnsemble::from_json(&short_leaf)
                .unwrap_err()
                .contains("class values")
        );

        assert!(TreeEnsemble::from_json("{\"n_features\": 1}").is_err());
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = TreeEnsemble::load(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(matches!(err, InferenceError::Load { .. }));
    }
}
