//! Camera capture module
//!
//! Provides cross-platform camera capture using the nokhwa crate.
//! Frames are read synchronously on the calling thread; the stream is
//! closed when the [`CameraCapture`] is dropped.

use std::time::Instant;

use image::RgbaImage;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use thiserror::Error;

/// Errors raised while opening or reading the camera.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to open camera {index}: {reason}")]
    Open { index: u32, reason: String },
    #[error("Failed to open camera stream: {0}")]
    Stream(String),
    #[error("Failed to read frame: {0}")]
    Read(String),
    #[error("Failed to decode frame: {0}")]
    Decode(String),
    #[error("Camera stream is closed")]
    Closed,
}

/// Camera frame data
#[derive(Clone)]
pub struct CameraFrame {
    /// RGBA pixel data
    pub image: RgbaImage,
    /// Frame number
    pub frame_number: u64,
    /// Frame timestamp
    pub timestamp: Instant,
}

impl CameraFrame {
    /// Wrap an RGBA image as a frame
    pub fn new(image: RgbaImage, frame_number: u64) -> Self {
        Self {
            image,
            frame_number,
            timestamp: Instant::now(),
        }
    }

    /// Build a frame from raw RGBA bytes, returning `None` if the buffer is too small
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>, frame_number: u64) -> Option<Self> {
        RgbaImage::from_raw(width, height, data).map(|image| Self::new(image, frame_number))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Raw RGBA bytes, row-major
    pub fn data(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Mirror the frame horizontally so the preview behaves like a mirror
    pub fn mirror(&mut self) {
        image::imageops::flip_horizontal_in_place(&mut self.image);
    }
}

/// Information about an available camera
#[derive(Clone, Debug)]
pub struct CameraInfo {
    /// Camera index
    pub index: u32,
    /// Camera name
    pub name: String,
}

/// Anything that yields frames, one blocking read at a time
pub trait FrameSource {
    fn read_frame(&mut self) -> Result<CameraFrame, CaptureError>;
}

/// Camera capture interface
pub struct CameraCapture {
    camera: Option<Camera>,
    index: u32,
    /// Frame counter
    frame_count: u64,
}

impl CameraCapture {
    /// List available cameras
    pub fn list_cameras() -> Vec<CameraInfo> {
        let mut cameras = Vec::new();

        match nokhwa::query(nokhwa::utils::ApiBackend::Auto) {
            Ok(camera_list) => {
                for (idx, info) in camera_list.iter().enumerate() {
                    cameras.push(CameraInfo {
                        index: idx as u32,
                        name: info.human_name().to_string(),
                    });
                }
            }
            Err(e) => {
                log::warn!("Failed to enumerate cameras: {:?}", e);
            }
        }

        cameras
    }

    /// Open a camera and start streaming
    ///
    /// # Arguments
    /// * `camera_index` - The camera index to use (0 for default)
    /// * `width` - Requested frame width
    /// * `height` - Requested frame height
    pub fn open(camera_index: u32, width: u32, height: u32) -> Result<Self, CaptureError> {
        let index = CameraIndex::Index(camera_index);

        // Requested resolution first, then whatever the camera does best
        let attempts = [
            RequestedFormatType::Closest(nokhwa::utils::CameraFormat::new(
                Resolution::new(width, height),
                nokhwa::utils::FrameFormat::MJPEG,
                30,
            )),
            RequestedFormatType::HighestResolution(Resolution::new(width, height)),
            RequestedFormatType::None,
        ];

        let mut last_error = String::new();
        let mut opened = None;
        for format_type in attempts {
            let requested = RequestedFormat::new::<RgbAFormat>(format_type);
            match Camera::new(index.clone(), requested) {
                Ok(camera) => {
                    opened = Some(camera);
                    break;
                }
                Err(e) => {
                    log::warn!("Camera {} rejected format {:?}: {:?}", camera_index, format_type, e);
                    last_error = e.to_string();
                }
            }
        }

        let mut camera = opened.ok_or(CaptureError::Open {
            index: camera_index,
            reason: last_error,
        })?;

        camera
            .open_stream()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

        log::info!(
            "Camera opened: {} ({}x{})",
            camera.info().human_name(),
            camera.resolution().width(),
            camera.resolution().height()
        );

        Ok(Self {
            camera: Some(camera),
            index: camera_index,
            frame_count: 0,
        })
    }

    /// Block until the next frame is available and decode it to RGBA
    pub fn read_frame(&mut self) -> Result<CameraFrame, CaptureError> {
        let camera = self.camera.as_mut().ok_or(CaptureError::Closed)?;

        let buffer = camera
            .frame()
            .map_err(|e| CaptureError::Read(e.to_string()))?;
        let resolution = buffer.resolution();
        let decoded = buffer
            .decode_image::<RgbAFormat>()
            .map_err(|e| CaptureError::Decode(e.to_string()))?;

        let frame_number = self.frame_count;
        self.frame_count += 1;

        CameraFrame::from_rgba(
            resolution.width(),
            resolution.height(),
            decoded.into_raw(),
            frame_number,
        )
        .ok_or_else(|| CaptureError::Decode("frame buffer smaller than its resolution".to_string()))
    }

    /// Get frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Stop streaming and release the device
    pub fn release(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop_stream() {
                log::warn!("Failed to stop camera {} stream: {:?}", self.index, e);
            }
            log::info!("Camera {} released after {} frames", self.index, self.frame_count);
        }
    }
}

impl FrameSource for CameraCapture {
    fn read_frame(&mut self) -> Result<CameraFrame, CaptureError> {
        CameraCapture::read_frame(self)
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(width: u32, height: u32) -> CameraFrame {
        let image = RgbaImage::from_fn(width, height, |x, y| image::Rgba([x as u8, y as u8, 0, 255]));
        CameraFrame::new(image, 0)
    }

    #[test]
    fn test_mirror_flips_columns() {
        let mut frame = gradient_frame(4, 2);
        frame.mirror();
        assert_eq!(frame.image.get_pixel(0, 0).0, [3, 0, 0, 255]);
        assert_eq!(frame.image.get_pixel(3, 1).0, [0, 1, 0, 255]);
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 2);
    }

    #[test]
    fn test_mirror_twice_is_identity() {
        let original = gradient_frame(5, 3);
        let mut frame = original.clone();
        frame.mirror();
        frame.mirror();
        assert_eq!(frame.data(), original.data());
    }

    #[test]
    fn test_from_rgba_rejects_short_buffer() {
        assert!(CameraFrame::from_rgba(2, 2, vec![0; 15], 0).is_none());
        let frame = CameraFrame::from_rgba(2, 2, vec![0; 16], 7).unwrap();
        assert_eq!(frame.frame_number, 7);
    }
}
