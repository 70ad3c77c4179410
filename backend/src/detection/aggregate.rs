use std::fmt::Display;
use std::path::{Path, PathBuf};

use log::warn;

use super::Detection;
use crate::taxonomy::Taxonomy;

pub const NO_PESTS_MESSAGE: &str = "No pests detected in the image.";
pub const HEALTHY_SUGGESTION: &str = "Your crops appear healthy! Continue monitoring regularly.";
pub const RETRY_SUGGESTION: &str = "Please try uploading a different image.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionReport {
    pub summary_message: String,
    pub suggestion_message: String,
    pub annotated_image_path: Option<PathBuf>,
}

impl DetectionReport {
    /// Report returned in place of a result when the detector itself failed.
    pub fn failure(err: impl Display) -> Self {
        Self {
            summary_message: format!("Error during detection: {}", err),
            suggestion_message: RETRY_SUGGESTION.to_string(),
            annotated_image_path: None,
        }
    }
}

/// Turns raw detections into the report shown to the user.
///
/// The first detection whose class exists in `taxonomy` decides the summary
/// and the pesticide suggestion; detections are expected in the detector's
/// order (most confident first). Any further known detections are listed
/// after "Also detected:". Class ids outside the taxonomy are dropped.
///
/// `resolve_output_dir` is asked once for the directory holding the annotated
/// image; the annotated path is that directory joined with the original
/// file name.
pub fn aggregate<F>(
    detections: &[Detection],
    taxonomy: &Taxonomy,
    original_image: &Path,
    resolve_output_dir: F,
) -> DetectionReport
where
    F: FnOnce() -> Option<PathBuf>,
{
    let known: Vec<(usize, &str)> = detections
        .iter()
        .filter_map(|d| match taxonomy.get(d.class_id) {
            Some(entry) => Some((d.class_id, entry.name.as_str())),
            None => {
                warn!(
                    "Dropping detection with class id {} outside the {} taxonomy",
                    d.class_id,
                    taxonomy.kind()
                );
                None
            }
        })
        .collect();

    let (summary_message, suggestion_message) = match known.split_first() {
        Some(((first_id, first_name), rest)) => {
            let mut summary = format!("Given Image has been affected by {}.", first_name);
            if !rest.is_empty() {
                let others: Vec<&str> = rest.iter().map(|(_, name)| *name).collect();
                summary.push_str(&format!(" Also detected: {}", others.join(", ")));
            }
            let recommendation = taxonomy.recommendation_for(*first_id).unwrap_or_default();
            (
                summary,
                format!("Please use the below pesticide: {}", recommendation),
            )
        }
        None => (NO_PESTS_MESSAGE.to_string(), HEALTHY_SUGGESTION.to_string()),
    };

    let annotated_image_path = resolve_output_dir()
        .and_then(|dir| original_image.file_name().map(|name| dir.join(name)));

    DetectionReport {
        summary_message,
        suggestion_message,
        annotated_image_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    fn det(class_id: usize, confidence: f32) -> Detection {
        Detection {
            class_id,
            confidence,
            bbox: BoundingBox { x1: 0.0, y1: 0.0, x2: 10.0, y2: 10.0 },
        }
    }

    fn run_dir() -> Option<PathBuf> {
        Some(PathBuf::from("runs/detect/predict3"))
    }

    #[test]
    fn single_detection() {
        let taxonomy = Taxonomy::detector();
        let upload = Path::new("static/uploads/leaf.jpg");
        let report = aggregate(&[det(4, 0.9)], &taxonomy, upload, run_dir);

        assert_eq!(report.summary_message, "Given Image has been affected by grasshopper.");
        assert_eq!(
            report.suggestion_message,
            "Please use the below pesticide: Carbaryl, Malathion, Pyrethroids"
        );
        assert_eq!(
            report.annotated_image_path,
            Some(PathBuf::from("runs/detect/predict3/leaf.jpg"))
        );
    }

    #[test]
    fn first_detection_wins_and_rest_are_listed_in_order() {
        let taxonomy = Taxonomy::detector();
        // Lower confidence first on purpose: list order decides, not confidence.
        let detections = [det(0, 0.3), det(5, 0.8), det(0, 0.6), det(8, 0.5)];
        let report = aggregate(&detections, &taxonomy, Path::new("x.png"), || None);

        assert_eq!(
            report.summary_message,
            "Given Image has been affected by aphids. Also detected: mites, aphids, stem_borer"
        );
        assert_eq!(
            report.suggestion_message,
            "Please use the below pesticide: Imidacloprid, Acetamiprid, Thiamethoxam"
        );
    }

    #[test]
    fn empty_detections_ignore_resolver_for_messages() {
        let taxonomy = Taxonomy::detector();
        let report = aggregate(&[], &taxonomy, Path::new("x.png"), run_dir);

        assert_eq!(report.summary_message, NO_PESTS_MESSAGE);
        assert_eq!(report.suggestion_message, HEALTHY_SUGGESTION);
        assert_eq!(
            report.annotated_image_path,
            Some(PathBuf::from("runs/detect/predict3/x.png"))
        );
    }

    #[test]
    fn unknown_classes_are_dropped() {
        let taxonomy = Taxonomy::detector();
        let image = Path::new("x.png");
        let all_unknown = aggregate(&[det(9, 0.9), det(120, 0.4)], &taxonomy, image, || None);
        let empty = aggregate(&[], &taxonomy, image, || None);
        assert_eq!(all_unknown, empty);

        let mixed = aggregate(&[det(17, 0.9), det(1, 0.7)], &taxonomy, image, || None);
        assert_eq!(mixed.summary_message, "Given Image has been affected by armyworm.");
    }

    #[test]
    fn absent_resolver_means_no_annotated_path() {
        let taxonomy = Taxonomy::detector();
        let image = Path::new("a/b.jpg");
        let report = aggregate(&[det(2, 0.9), det(3, 0.2)], &taxonomy, image, || None);
        assert!(report.annotated_image_path.is_none());
    }

    #[test]
    fn failure_report() {
        let report = DetectionReport::failure("model is unavailable: no detector");
        assert_eq!(
            report.summary_message,
            "Error during detection: model is unavailable: no detector"
        );
        assert_eq!(report.suggestion_message, RETRY_SUGGESTION);
        assert!(report.annotated_image_path.is_none());
    }
}
