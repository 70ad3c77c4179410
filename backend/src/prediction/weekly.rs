use serde_json::Value;

use super::literal;
use crate::classify::Classifier;
use crate::error::InferenceError;
use crate::taxonomy::Taxonomy;

pub const FIRST_WEEK: i64 = 1;
pub const LAST_WEEK: i64 = 52;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklyPrediction {
    pub pests: Vec<String>,
    pub pesticides: Vec<Vec<String>>,
}

impl WeeklyPrediction {
    pub fn to_literal(&self) -> String {
        literal::pair(
            &literal::string_list(&self.pests),
            &literal::list(&self.pesticides, |p| literal::string_list(p)),
        )
    }
}

/// Reads the `week` field. A missing field counts as week 0; integers,
/// integer strings and booleans are accepted, fractional numbers are
/// truncated. An explicit `null` is not a week.
pub fn parse_week(value: Option<&Value>) -> Result<i64, InferenceError> {
    match value {
        None => Ok(0),
        Some(Value::Bool(b)) => Ok(i64::from(*b)),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .ok_or_else(|| InferenceError::InvalidInput(format!("invalid week number {}", n))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| InferenceError::InvalidInput(format!("invalid week number '{}'", s))),
        Some(other) => Err(InferenceError::InvalidInput(format!(
            "invalid week number {}",
            other
        ))),
    }
}

pub fn is_valid_week(week: i64) -> bool {
    (FIRST_WEEK..=LAST_WEEK).contains(&week)
}

/// Maps every class index the weekly classifier returns (one per input row)
/// to its pest and pesticides. An index outside the table is an error.
pub fn predict_week(
    week: u32,
    classifier: &dyn Classifier,
    taxonomy: &Taxonomy,
) -> Result<WeeklyPrediction, InferenceError> {
    let indices = classifier.predict(&[vec![week as f64]])?;

    let mut pests = Vec::with_capacity(indices.len());
    let mut pesticides = Vec::with_capacity(indices.len());
    for index in indices {
        let index = usize::try_from(index).map_err(|_| {
            InferenceError::Backend(format!("weekly classifier returned negative class {}", index))
        })?;
        pests.push(taxonomy.label_for(index)?.to_string());
        pesticides.push(taxonomy.pesticides_for(index)?.to_vec());
    }

    Ok(WeeklyPrediction { pests, pesticides })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedIndices(Vec<i64>);

    impl Classifier for FixedIndices {
        fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<i64>, InferenceError> {
            assert_eq!(rows.len(), 1);
            Ok(self.0.clone())
        }
    }

    #[test]
    fn week_one_predicts_aphid() {
        let prediction = predict_week(1, &FixedIndices(vec![2]), &Taxonomy::weekly()).unwrap();
        assert_eq!(prediction.pests, vec!["Aphid"]);
        assert_eq!(
            prediction.pesticides,
            vec![vec!["Neonicotinoids", "Pyrethroids", "Insecticidal soaps"]]
        );
        assert_eq!(
            prediction.to_literal(),
            "(['Aphid'], [['Neonicotinoids', 'Pyrethroids', 'Insecticidal soaps']])"
        );
    }

    #[test]
    fn multiple_predictions_are_mapped_independently() {
        let prediction = predict_week(30, &FixedIndices(vec![8, 0]), &Taxonomy::weekly()).unwrap();
        assert_eq!(prediction.pests, vec!["Thrips", "AmericanBollworm"]);
        assert_eq!(prediction.pesticides[1][0], "Pyrethroids");
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let err = predict_week(5, &FixedIndices(vec![10]), &Taxonomy::weekly()).unwrap_err();
        assert!(matches!(err, InferenceError::Taxonomy(_)));
        assert!(predict_week(5, &FixedIndices(vec![-1]), &Taxonomy::weekly()).is_err());
    }

    #[test]
    fn week_bounds() {
        assert!(!is_valid_week(0));
        assert!(!is_valid_week(53));
        assert!(is_valid_week(1));
        assert!(is_valid_week(52));
    }

    #[test]
    fn week_parsing() {
        assert_eq!(parse_week(None).unwrap(), 0);
        assert_eq!(parse_week(Some(&json!(12))).unwrap(), 12);
        assert_eq!(parse_week(Some(&json!("7"))).unwrap(), 7);
        assert_eq!(parse_week(Some(&json!(3.9))).unwrap(), 3);
        assert!(parse_week(Some(&json!("week five"))).is_err());
        assert!(parse_week(Some(&json!([1]))).is_err());
        assert!(parse_week(Some(&Value::Null)).is_err());
        assert_eq!(parse_week(Some(&json!(true))).unwrap(), 1);
        assert_eq!(parse_week(Some(&json!(false))).unwrap(), 0);
    }
}
