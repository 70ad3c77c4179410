use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use log::{error, info};
use shared::{ModelKind, ModelStatus};
use strum::IntoEnumIterator;

use crate::classify::tree::TreeEnsemble;
use crate::classify::Classifier;
use crate::config::AppConfig;
use crate::detection::{DetectorOutput, PestDetector};
use crate::error::InferenceError;
use crate::taxonomy::Catalog;

/// Stands in for a model that could not be loaded; every call reports why.
#[derive(Debug, Clone)]
pub struct UnavailableModel {
    reason: String,
}

impl UnavailableModel {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl PestDetector for UnavailableModel {
    fn detect(&self, _image_path: &Path) -> Result<DetectorOutput, InferenceError> {
        Err(InferenceError::Unavailable(self.reason.clone()))
    }
}

impl Classifier for UnavailableModel {
    fn predict(&self, _rows: &[Vec<f64>]) -> Result<Vec<i64>, InferenceError> {
        Err(InferenceError::Unavailable(self.reason.clone()))
    }
}

/// The three inference capabilities, loaded once and shared by every request.
#[derive(Clone)]
pub struct Models {
    pub detector: Arc<dyn PestDetector>,
    pub tabular: Arc<dyn Classifier>,
    pub weekly: Arc<dyn Classifier>,
    status: BTreeMap<String, ModelStatus>,
}

impl Models {
    pub fn new(
        detector: Arc<dyn PestDetector>,
        tabular: Arc<dyn Classifier>,
        weekly: Arc<dyn Classifier>,
    ) -> Self {
        let status = ModelKind::iter()
            .map(|kind| (kind.to_string(), ModelStatus { loaded: true, reason: None }))
            .collect();
        Self {
            detector,
            tabular,
            weekly,
            status,
        }
    }

    /// Loads every model named in `config`. A model that fails to load is
    /// replaced by an [`UnavailableModel`] so the server still starts and the
    /// affected endpoint answers with the load error.
    pub fn load(config: &AppConfig, catalog: &Catalog) -> Self {
        let mut status = BTreeMap::new();

        let num_classes = catalog.detector.len();
        let detector: Arc<dyn PestDetector> = match load_detector(config, num_classes) {
            Ok(detector) => {
                record(&mut status, ModelKind::Detector, None);
                detector
            }
            Err(e) => {
                error!("Detector unavailable: {}", e);
                record(&mut status, ModelKind::Detector, Some(e.to_string()));
                Arc::new(UnavailableModel::new(e.to_string()))
            }
        };

        let tabular = load_classifier(&config.models.tabular, ModelKind::Tabular, &mut status);
        let weekly = load_classifier(&config.models.weekly, ModelKind::Weekly, &mut status);

        Self {
            detector,
            tabular,
            weekly,
            status,
        }
    }

    pub fn status(&self) -> &BTreeMap<String, ModelStatus> {
        &self.status
    }

    pub fn all_loaded(&self) -> bool {
        self.status.values().all(|s| s.loaded)
    }
}

fn record(status: &mut BTreeMap<String, ModelStatus>, kind: ModelKind, failure: Option<String>) {
    status.insert(
        kind.to_string(),
        ModelStatus {
            loaded: failure.is_none(),
            reason: failure,
        },
    );
}

fn load_classifier(
    path: &Path,
    kind: ModelKind,
    status: &mut BTreeMap<String, ModelStatus>,
) -> Arc<dyn Classifier> {
    match TreeEnsemble::load(path) {
        Ok(model) => {
            record(status, kind, None);
            Arc::new(model)
        }
        Err(e) => {
            error!("{} model unavailable: {}", kind, e);
            record(status, kind, Some(e.to_string()));
            Arc::new(UnavailableModel::new(e.to_string()))
        }
    }
}

#[cfg(feature = "torch")]
fn load_detector(
    config: &AppConfig,
    num_classes: usize,
) -> Result<Arc<dyn PestDetector>, InferenceError> {
    use crate::detection::runs::RunDirectory;
    use crate::detection::torch::TorchEngine;
    use crate::detection::yolo::YoloDetector;

    let path = config.models.detector.display().to_string();
    let engine = TorchEngine::load(&path)?;
    let runs = RunDirectory::new(&config.runs_dir);
    info!("Detector writes annotated images under {}", runs.root().display());
    Ok(Arc::new(YoloDetector::new(
        engine,
        config.detector.clone(),
        num_classes,
        runs,
    )))
}

#[cfg(not(feature = "torch"))]
fn load_detector(
    config: &AppConfig,
    _num_classes: usize,
) -> Result<Arc<dyn PestDetector>, InferenceError> {
    info!(
        "Skipping detector {}: built without the `torch` feature",
        config.models.detector.display()
    );
    Err(InferenceError::Unavailable(
        "detector support was not compiled in (build with --features torch)".into(),
    ))
}
