use std::path::Path;

use image::{imageops, imageops::FilterType, ImageReader, Rgb, RgbImage};
use log::debug;
use ndarray::{s, Array3, ArrayView2, Axis};
use serde::Deserialize;

use super::annotate::save_annotated;
use super::runs::RunDirectory;
use super::{BoundingBox, Detection, DetectorOutput, PestDetector};
use crate::error::InferenceError;

const PAD_VALUE: u8 = 114;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct YoloParams {
    pub input_size: u32,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            conf_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }
}

/// Scale and padding applied when fitting an image into the square input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub gain: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub width: u32,
    pub height: u32,
}

impl Letterbox {
    fn unscale(&self, x: f32, y: f32) -> (f32, f32) {
        let ux = ((x - self.pad_x) / self.gain).clamp(0.0, self.width as f32);
        let uy = ((y - self.pad_y) / self.gain).clamp(0.0, self.height as f32);
        (ux, uy)
    }
}

/// Resizes `image` into a `size`x`size` canvas keeping its aspect ratio and
/// returns the normalized CHW tensor data.
pub fn letterbox(image: &RgbImage, size: u32) -> (Vec<f32>, Letterbox) {
    let (width, height) = image.dimensions();
    let gain = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_w = ((width as f32 * gain).round() as u32).clamp(1, size);
    let new_h = ((height as f32 * gain).round() as u32).clamp(1, size);
    let left = (size - new_w) / 2;
    let top = (size - new_h) / 2;

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    imageops::overlay(&mut canvas, &resized, left as i64, top as i64);

    let side = size as usize;
    let mut input = Array3::<f32>::zeros((3, side, side));
    for (x, y, pixel) in canvas.enumerate_pixels() {
        for c in 0..3 {
            input[[c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    let (data, _) = input.into_raw_vec_and_offset();

    (
        data,
        Letterbox {
            gain,
            pad_x: left as f32,
            pad_y: top as f32,
            width,
            height,
        },
    )
}

/// Decodes a raw `[4 + classes, candidates]` output. Boxes are `cx, cy, w, h`
/// in letterboxed pixels. A transposed `[candidates, 4 + classes]` output is
/// accepted when only its second axis matches the expected row count.
pub fn decode(
    output: &[f32],
    shape: (usize, usize),
    num_classes: usize,
    letterbox: &Letterbox,
    conf_threshold: f32,
) -> Result<Vec<Detection>, InferenceError> {
    let rows = 4 + num_classes;
    let raw = ArrayView2::from_shape(shape, output)?;
    let view = if shape.0 == rows {
        raw
    } else if shape.1 == rows {
        raw.reversed_axes()
    } else {
        return Err(InferenceError::Backend(format!(
            "unexpected detector output shape {:?} for {} classes",
            shape, num_classes
        )));
    };

    let mut detections = Vec::new();
    for candidate in view.axis_iter(Axis(1)) {
        let scores = candidate.slice(s![4..]);
        let Some((class_id, &score)) = scores
            .indexed_iter()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
        else {
            continue;
        };
        if score <= conf_threshold {
            continue;
        }

        let (cx, cy, w, h) = (candidate[0], candidate[1], candidate[2], candidate[3]);
        let (x1, y1) = letterbox.unscale(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.unscale(cx + w / 2.0, cy + h / 2.0);
        detections.push(Detection {
            class_id,
            confidence: score,
            bbox: BoundingBox { x1, y1, x2, y2 },
        });
    }
    Ok(detections)
}

/// Class-aware non-maximum suppression. The result is sorted by confidence,
/// highest first, and holds at most `max_detections` entries.
pub fn non_max_suppression(
    mut detections: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// The network itself: takes a `[1, 3, size, size]` input and returns the raw
/// output together with its two-dimensional shape.
pub trait YoloEngine: Send + Sync {
    fn forward(
        &self,
        input: Vec<f32>,
        size: u32,
    ) -> Result<(Vec<f32>, (usize, usize)), InferenceError>;
}

pub struct YoloDetector<E> {
    engine: E,
    params: YoloParams,
    num_classes: usize,
    runs: RunDirectory,
}

impl<E: YoloEngine> YoloDetector<E> {
    pub fn new(engine: E, params: YoloParams, num_classes: usize, runs: RunDirectory) -> Self {
        Self {
            engine,
            params,
            num_classes,
            runs,
        }
    }
}

impl<E: YoloEngine> PestDetector for YoloDetector<E> {
    fn detect(&self, image_path: &Path) -> Result<DetectorOutput, InferenceError> {
        let image = ImageReader::open(image_path)?
            .with_guessed_format()?
            .decode()?
            .to_rgb8();
        let (input, letterbox) = letterbox(&image, self.params.input_size);

        let (raw, shape) = self.engine.forward(input, self.params.input_size)?;
        let candidates = decode(
            &raw,
            shape,
            self.num_classes,
            &letterbox,
            self.params.conf_threshold,
        )?;
        debug!("{} candidates above confidence threshold", candidates.len());
        let detections = non_max_suppression(
            candidates,
            self.params.iou_threshold,
            self.params.max_detections,
        );

        let output_dir = self.runs.claim_next()?;
        save_annotated(&image, &detections, image_path, &output_dir)?;

        Ok(DetectorOutput {
            detections,
            output_dir: Some(output_dir),
        })
    }
}
