//! ML inference module
//!
//! Provides hand landmark detection using ONNX Runtime.
//! Uses the MediaPipe palm detection and hand landmark models (PINTO Model Zoo
//! conversions), run synchronously on the calling thread.

pub mod anchors;
pub mod onnx;
pub mod roi;

pub use onnx::OnnxHandDetector;

use std::path::PathBuf;

use image::RgbaImage;
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera::CameraFrame;

/// Errors raised while loading or running the hand models.
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Models directory not found. Create a 'models' directory with the ONNX hand models.")]
    ModelDirNotFound,
    #[error("Model not found: {0:?}")]
    ModelNotFound(PathBuf),
    #[error("ONNX Runtime error: {0}")]
    Runtime(String),
    #[error("Unexpected model output: {0}")]
    UnexpectedOutput(String),
}

/// Hand landmark (21 points per hand, normalized coordinates)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HandLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Which hand the detector believes it saw, on the mirrored frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Handedness {
    #[default]
    Left,
    Right,
}

/// Detected hand
#[derive(Clone, Debug)]
pub struct Hand {
    /// 21 landmarks
    pub landmarks: [HandLandmark; 21],
    /// Hand presence score
    pub confidence: f32,
    /// Handedness label
    pub handedness: Handedness,
    /// Probability that this is a right hand
    pub handedness_score: f32,
}

impl Default for Hand {
    fn default() -> Self {
        Self {
            landmarks: [HandLandmark::default(); 21],
            confidence: 0.0,
            handedness: Handedness::Left,
            handedness_score: 0.0,
        }
    }
}

/// Frame in, hands out
pub trait HandDetector {
    /// Detect up to the configured number of hands in a frame
    fn detect(&mut self, frame: &CameraFrame) -> Result<Vec<Hand>, DetectorError>;
}

/// Input tensor memory layout expected by a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TensorLayout {
    /// (1, height, width, 3) - MediaPipe conversions
    #[default]
    Nhwc,
    /// (1, 3, height, width)
    Nchw,
}

/// Logistic function, as applied to raw model scores
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x.clamp(-100.0, 100.0)).exp())
}

/// Convert an RGB(A) image into a float tensor in [0, 1]
pub fn image_to_tensor(image: &RgbaImage, layout: TensorLayout) -> Array4<f32> {
    let width = image.width() as usize;
    let height = image.height() as usize;

    match layout {
        // HWC format: [y][x][channel]
        TensorLayout::Nhwc => Array4::from_shape_fn((1, height, width, 3), |(_, y, x, c)| {
            image.get_pixel(x as u32, y as u32).0[c] as f32 / 255.0
        }),
        // CHW format (channels first)
        TensorLayout::Nchw => Array4::from_shape_fn((1, 3, height, width), |(_, c, y, x)| {
            image.get_pixel(x as u32, y as u32).0[c] as f32 / 255.0
        }),
    }
}

/// Find the models directory
pub fn find_model_dir(configured: Option<&PathBuf>) -> Result<PathBuf, DetectorError> {
    if let Some(dir) = configured {
        if dir.exists() {
            return Ok(dir.clone());
        }
        log::warn!("Configured model directory {:?} does not exist", dir);
    }

    // Try relative to executable first, then its ancestors (cargo run from target/<profile>)
    if let Ok(exe_path) = std::env::current_exe() {
        for ancestor in exe_path.ancestors().skip(1).take(3) {
            let model_dir = ancestor.join("models");
            if model_dir.exists() {
                return Ok(model_dir);
            }
        }
    }

    // Try current directory
    let cwd = std::env::current_dir().map_err(|_| DetectorError::ModelDirNotFound)?;
    let model_dir = cwd.join("models");
    if model_dir.exists() {
        return Ok(model_dir);
    }

    Err(DetectorError::ModelDirNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(10.0) > 0.999);
        assert!(sigmoid(-10.0) < 0.001);
        assert!(sigmoid(-1000.0) >= 0.0);
    }

    #[test]
    fn test_tensor_layouts() {
        let image = RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                image::Rgba([255, 0, 51, 255])
            } else {
                image::Rgba([0, 255, 0, 255])
            }
        });

        let nhwc = image_to_tensor(&image, TensorLayout::Nhwc);
        assert_eq!(nhwc.shape(), &[1, 1, 2, 3]);
        assert_eq!(nhwc[[0, 0, 0, 0]], 1.0);
        assert_eq!(nhwc[[0, 0, 0, 2]], 0.2);
        assert_eq!(nhwc[[0, 0, 1, 1]], 1.0);

        let nchw = image_to_tensor(&image, TensorLayout::Nchw);
        assert_eq!(nchw.shape(), &[1, 3, 1, 2]);
        assert_eq!(nchw[[0, 0, 0, 0]], 1.0);
        assert_eq!(nchw[[0, 1, 0, 1]], 1.0);
        assert_eq!(nchw[[0, 2, 0, 0]], 0.2);
    }

    #[test]
    fn test_missing_configured_dir_falls_through() {
        let bogus = PathBuf::from("/definitely/not/a/model/dir");
        // Either a models dir is found elsewhere or the lookup fails; never the bogus path
        if let Ok(dir) = find_model_dir(Some(&bogus)) {
            assert_ne!(dir, bogus);
        }
    }
}
