use serde_json::Value;

use super::literal;
use crate::classify::Classifier;
use crate::error::InferenceError;
use crate::taxonomy::Taxonomy;

pub const FEATURE_NAMES: [&str; 5] = [
    "collection type",
    "max temperature",
    "min temperature",
    "relative humidity",
    "geography",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularPrediction {
    pub pest: Option<String>,
    pub pesticides: Option<Vec<String>>,
}

impl TabularPrediction {
    pub fn to_literal(&self) -> String {
        literal::pair(
            &literal::optional(self.pest.as_deref().map(literal::quote)),
            &literal::optional(self.pesticides.as_deref().map(literal::string_list)),
        )
    }
}

/// Converts one JSON feature value to a number. Numbers pass through,
/// strings must parse as numbers; anything else, including a missing value,
/// is rejected.
pub fn parse_feature(name: &str, value: Option<&Value>) -> Result<f64, InferenceError> {
    let invalid = |shown: String| {
        InferenceError::InvalidInput(format!("could not convert {} value {} to float", name, shown))
    };
    match value {
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| invalid(n.to_string())),
        Some(Value::String(s)) => s.trim().parse::<f64>().map_err(|_| invalid(format!("'{}'", s))),
        Some(Value::Bool(b)) => Ok(if *b { 1.0 } else { 0.0 }),
        Some(other) => Err(invalid(other.to_string())),
        None => Err(invalid("''".to_string())),
    }
}

pub fn parse_features(values: [Option<&Value>; 5]) -> Result<Vec<f64>, InferenceError> {
    FEATURE_NAMES
        .iter()
        .zip(values)
        .map(|(name, value)| parse_feature(name, value))
        .collect()
}

/// Runs the tabular classifier on one feature row. The classifier answers
/// with labels counting from 1; a label with no table entry (0, negative or
/// past the end) yields an empty prediction rather than an error.
pub fn predict_pest(
    features: Vec<f64>,
    classifier: &dyn Classifier,
    taxonomy: &Taxonomy,
) -> Result<TabularPrediction, InferenceError> {
    let labels = classifier.predict(&[features])?;
    let label = labels
        .first()
        .copied()
        .ok_or_else(|| InferenceError::Backend("classifier returned no prediction".into()))?;

    Ok(match taxonomy.get_one_based(label) {
        Some(entry) => TabularPrediction {
            pest: Some(entry.name.clone()),
            pesticides: Some(entry.pesticides.clone()),
        },
        None => {
            log::warn!("Tabular classifier returned unknown label {}", label);
            TabularPrediction {
                pest: None,
                pesticides: None,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedLabel(i64);

    impl Classifier for FixedLabel {
        fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<i64>, InferenceError> {
            Ok(vec![self.0; rows.len()])
        }
    }

    fn predict_with(label: i64) -> TabularPrediction {
        let features = vec![1.0, 30.0, 20.0, 80.0, 2.0];
        predict_pest(features, &FixedLabel(label), &Taxonomy::tabular()).unwrap()
    }

    #[test]
    fn label_one_is_brownplanthopper() {
        let prediction = predict_with(1);
        assert_eq!(prediction.pest.as_deref(), Some("Brownplanthopper"));
        assert_eq!(
            prediction.pesticides.unwrap(),
            vec!["Neonicotinoids", "Pyrethroids", "Carbamates"]
        );
    }

    #[test]
    fn unknown_labels_are_empty() {
        for label in [0, 12, 40, -1] {
            let prediction = predict_with(label);
            assert_eq!(prediction, TabularPrediction { pest: None, pesticides: None });
            assert_eq!(prediction.to_literal(), "(None, None)");
        }
    }

    #[test]
    fn literal_encoding() {
        assert_eq!(
            predict_with(11).to_literal(),
            "('NeckBlast', ['Triazoles', 'Strobilurins'])"
        );
    }

    #[test]
    fn feature_parsing() {
        let f1 = json!("2");
        let f2 = json!(34.5);
        let f3 = json!(" 21 ");
        let f4 = json!(80);
        let f5 = json!("3");
        let parsed =
            parse_features([Some(&f1), Some(&f2), Some(&f3), Some(&f4), Some(&f5)]).unwrap();
        assert_eq!(parsed, vec![2.0, 34.5, 21.0, 80.0, 3.0]);

        let bad = json!("north");
        let err =
            parse_features([Some(&f1), Some(&f2), Some(&f3), Some(&f4), Some(&bad)]).unwrap_err();
        assert!(err.to_string().contains("geography value 'north'"));

        let err = parse_features([Some(&f1), None, Some(&f3), Some(&f4), Some(&f5)]).unwrap_err();
        assert!(err.to_string().contains("max temperature"));
    }
}
