pub mod aggregate;
pub mod annotate;
pub mod runs;
#[cfg(feature = "torch")]
pub mod torch;
pub mod yolo;

use std::path::{Path, PathBuf};

use crate::error::InferenceError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let intersection = ix * iy;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Result of one detector call. `detections` are ordered by confidence,
/// highest first.
#[derive(Debug, Clone, Default)]
pub struct DetectorOutput {
    pub detections: Vec<Detection>,
    /// Directory the annotated copy of the image was written to, if any.
    pub output_dir: Option<PathBuf>,
}

pub trait PestDetector: Send + Sync {
    fn detect(&self, image_path: &Path) -> Result<DetectorOutput, InferenceError>;
}
