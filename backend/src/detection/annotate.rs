use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use super::Detection;
use crate::error::InferenceError;

const PALETTE: [[u8; 3]; 10] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
];

fn class_color(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}

fn line_width(image: &RgbImage) -> u32 {
    let (w, h) = image.dimensions();
    (((w + h) as f32 / 2.0 * 0.003).round() as u32).max(2)
}

pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
    let thickness = line_width(image);
    for det in detections {
        let color = class_color(det.class_id);
        for t in 0..thickness {
            let x = det.bbox.x1.round() as i32 + t as i32;
            let y = det.bbox.y1.round() as i32 + t as i32;
            let w = (det.bbox.width().round() as i32 - 2 * t as i32).max(1) as u32;
            let h = (det.bbox.height().round() as i32 - 2 * t as i32).max(1) as u32;
            draw_hollow_rect_mut(image, Rect::at(x, y).of_size(w, h), color);
        }
    }
}

/// One `class cx cy w h` line per detection, normalized to the image size.
pub fn label_lines(detections: &[Detection], width: u32, height: u32) -> String {
    let (w, h) = (width as f32, height as f32);
    let mut out = String::new();
    for det in detections {
        let b = &det.bbox;
        let _ = writeln!(
            out,
            "{} {:.6} {:.6} {:.6} {:.6}",
            det.class_id,
            (b.x1 + b.x2) / 2.0 / w,
            (b.y1 + b.y2) / 2.0 / h,
            b.width() / w,
            b.height() / h,
        );
    }
    out
}

/// Writes the annotated copy of `original` into `output_dir` under the same
/// file name, plus `labels/<stem>.txt` when anything was detected.
pub fn save_annotated(
    image: &RgbImage,
    detections: &[Detection],
    original: &Path,
    output_dir: &Path,
) -> Result<PathBuf, InferenceError> {
    let file_name = original.file_name().ok_or_else(|| {
        InferenceError::InvalidInput(format!("{} has no file name", original.display()))
    })?;

    let mut annotated = image.clone();
    draw_detections(&mut annotated, detections);
    let target = output_dir.join(file_name);
    // Sanitized upload names can lose their extension.
    let format = ImageFormat::from_path(&target).unwrap_or(ImageFormat::Png);
    annotated.save_with_format(&target, format)?;

    if !detections.is_empty() {
        let labels_dir = output_dir.join("labels");
        fs::create_dir_all(&labels_dir)?;
        let stem = original.file_stem().unwrap_or(file_name);
        let label_file = labels_dir.join(format!("{}.txt", stem.to_string_lossy()));
        fs::write(label_file, label_lines(detections, image.width(), image.height()))?;
    }

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;
    use tempfile::TempDir;

    fn det(class_id: usize, bbox: BoundingBox) -> Detection {
        Detection { class_id, confidence: 0.9, bbox }
    }

    #[test]
    fn labels_are_normalized() {
        let dets = [det(3, BoundingBox { x1: 10.0, y1: 20.0, x2: 30.0, y2: 60.0 })];
        assert_eq!(
            label_lines(&dets, 100, 200),
            "3 0.200000 0.200000 0.200000 0.200000\n"
        );
    }

    #[test]
    fn boxes_are_drawn_in_class_color() {
        let mut image = RgbImage::from_pixel(50, 50, Rgb([0, 0, 0]));
        let bbox = BoundingBox {
            x1: 5.0,
            y1: 5.0,
            x2: 25.0,
            y2: 25.0,
        };
        draw_detections(&mut image, &[det(0, bbox)]);

        assert_eq!(*image.get_pixel(5, 5), class_color(0));
        assert_eq!(*image.get_pixel(15, 5), class_color(0));
        assert_eq!(*image.get_pixel(15, 15), Rgb([0, 0, 0]));
    }

    #[test]
    fn no_label_file_without_detections() {
        let tmp = TempDir::new().unwrap();
        let image = RgbImage::from_pixel(8, 8, Rgb([10, 10, 10]));
        let written =
            save_annotated(&image, &[], Path::new("uploads/plant.png"), tmp.path()).unwrap();

        assert_eq!(written, tmp.path().join("plant.png"));
        assert!(written.is_file());
        assert!(!tmp.path().join("labels").exists());
    }

    #[test]
    fn extensionless_names_are_written_as_png() {
        let tmp = TempDir::new().unwrap();
        let image = RgbImage::from_pixel(8, 8, Rgb([10, 10, 10]));
        let bbox = BoundingBox {
            x1: 1.0,
            y1: 1.0,
            x2: 4.0,
            y2: 4.0,
        };
        let written =
            save_annotated(&image, &[det(2, bbox)], Path::new("uploads/jpg"), tmp.path()).unwrap();

        assert_eq!(written, tmp.path().join("jpg"));
        let format = image::ImageReader::open(&written)
            .unwrap()
            .with_guessed_format()
            .unwrap()
            .format();
        assert_eq!(format, Some(ImageFormat::Png));
        assert!(tmp.path().join("labels/jpg.txt").is_file());
    }
}
