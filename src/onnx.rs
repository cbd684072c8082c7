/// Pose Landmark Model: BlazePose (full) via ONNX Runtime
///
/// Input:  [1, S, S, 3] float RGB in 0..1, letterboxed to S×S (S = 256).
/// Output: landmarks [1, 195] = 39 × (x, y, z, visibility, presence) in
///         input-pixel units, plus a pose-presence score [1, 1].
/// Only the first 33 landmarks are body keypoints; the rest are auxiliary.

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use tracing::debug;

use crate::config::DetectorConfig;
use crate::detector::PoseBackend;
use crate::error::DetectorError;
use crate::landmarks::{Landmark, POSE_LANDMARK_COUNT};
use crate::video::RasterFrame;

const VALUES_PER_LANDMARK: usize = 5;

pub struct OnnxPoseBackend {
    cfg: DetectorConfig,
    session: Option<Session>,
}

impl OnnxPoseBackend {
    pub fn new(cfg: DetectorConfig) -> Self {
        Self { cfg, session: None }
    }
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// Scale `img` into a `size × size` black canvas, preserving aspect ratio.
/// Returns the canvas, the scale factor and the (x, y) padding.
fn letterbox(img: &RgbImage, size: u32) -> (RgbImage, f32, u32, u32) {
    let (w, h) = (img.width().max(1), img.height().max(1));
    let scale = (size as f32 / w as f32).min(size as f32 / h as f32);
    let nw = ((w as f32 * scale).round() as u32).clamp(1, size);
    let nh = ((h as f32 * scale).round() as u32).clamp(1, size);
    let resized = image::imageops::resize(img, nw, nh, FilterType::Triangle);
    let pad_x = (size - nw) / 2;
    let pad_y = (size - nh) / 2;
    let mut canvas = RgbImage::new(size, size);
    image::imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);
    (canvas, scale, pad_x, pad_y)
}

fn to_nhwc_f32(img: &RgbImage) -> Vec<f32> {
    img.as_raw().iter().map(|&v| v as f32 / 255.0).collect()
}

/// Map raw model output back to coordinates normalised to the source frame.
fn decode_landmarks(
    raw: &[f32],
    scale: f32,
    pad: (u32, u32),
    src: (u32, u32),
) -> Vec<Landmark> {
    let (src_w, src_h) = (src.0.max(1) as f32, src.1.max(1) as f32);
    raw.chunks_exact(VALUES_PER_LANDMARK)
        .take(POSE_LANDMARK_COUNT)
        .map(|v| {
            let x = (v[0] - pad.0 as f32) / scale / src_w;
            let y = (v[1] - pad.1 as f32) / scale / src_h;
            let z = v[2] / scale / src_w;
            Landmark::new(x as f64, y as f64, z as f64, sigmoid(v[3]) as f64)
        })
        .collect()
}

impl PoseBackend for OnnxPoseBackend {
    fn load(&mut self) -> Result<(), DetectorError> {
        let init = |e: ort::Error| DetectorError::Initialization(e.to_string());
        let session = Session::builder()
            .map_err(init)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(init)?
            .with_intra_threads(self.cfg.intra_threads)
            .map_err(init)?
            .commit_from_file(&self.cfg.model_path)
            .map_err(|e| {
                DetectorError::Initialization(format!("{}: {}", self.cfg.model_path, e))
            })?;
        debug!("Loaded pose model {}", self.cfg.model_path);
        self.session = Some(session);
        Ok(())
    }

    fn estimate(&mut self, frame: &RasterFrame) -> Result<Option<Vec<Landmark>>, DetectorError> {
        let session = self.session.as_ref().ok_or(DetectorError::NotInitialized)?;
        let det = |e: ort::Error| DetectorError::Detection(e.to_string());

        let size = self.cfg.input_size;
        let (canvas, scale, pad_x, pad_y) = letterbox(&frame.image, size);
        let array = Array4::from_shape_vec(
            (1, size as usize, size as usize, 3),
            to_nhwc_f32(&canvas),
        )
        .map_err(|e| DetectorError::Detection(e.to_string()))?;

        let outputs = session.run(ort::inputs![array.view()].map_err(det)?).map_err(det)?;
        if outputs.len() < 2 {
            return Err(DetectorError::Detection(format!(
                "expected landmark and presence outputs, got {}",
                outputs.len()
            )));
        }

        let presence = outputs[1]
            .try_extract_tensor::<f32>()
            .map_err(det)?
            .iter()
            .next()
            .copied()
            .unwrap_or(0.0);
        if presence < self.cfg.min_pose_presence {
            return Ok(None);
        }

        let raw: Vec<f32> = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(det)?
            .iter()
            .copied()
            .collect();
        if raw.len() < POSE_LANDMARK_COUNT * VALUES_PER_LANDMARK {
            return Err(DetectorError::Detection(format!(
                "landmark tensor too short: {} values",
                raw.len()
            )));
        }

        Ok(Some(decode_landmarks(
            &raw,
            scale,
            (pad_x, pad_y),
            (frame.width(), frame.height()),
        )))
    }

    fn close(&mut self) {
        self.session = None;
    }

    fn name(&self) -> &'static str {
        "onnx-blazepose"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_wide_frame() {
        let img = RgbImage::from_pixel(512, 256, image::Rgb([255, 255, 255]));
        let (canvas, scale, px, py) = letterbox(&img, 256);
        assert_eq!((canvas.width(), canvas.height()), (256, 256));
        assert_eq!(scale, 0.5);
        assert_eq!((px, py), (0, 64));
        assert_eq!(canvas.get_pixel(10, 10).0, [0, 0, 0]);
        assert_eq!(canvas.get_pixel(10, 128).0, [255, 255, 255]);
    }

    #[test]
    fn test_decode_undoes_letterbox() {
        // centre of a 512x256 frame lands at (128, 128) in a 256 canvas
        let mut raw = vec![0.0f32; 39 * VALUES_PER_LANDMARK];
        raw[0] = 128.0;
        raw[1] = 128.0;
        raw[3] = 0.0;
        let lms = decode_landmarks(&raw, 0.5, (0, 64), (512, 256));
        assert_eq!(lms.len(), POSE_LANDMARK_COUNT);
        assert!((lms[0].x - 0.5).abs() < 1e-6);
        assert!((lms[0].y - 0.5).abs() < 1e-6);
        assert!((lms[0].visibility - 0.5).abs() < 1e-6);
    }
}
