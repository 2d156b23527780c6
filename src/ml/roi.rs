//! Regions of interest: letterboxing, palm/landmark to crop rectangle, cropping

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use super::anchors::PalmDetection;
use super::Hand;
use crate::gesture::landmarks;

const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Palm box enlargement to cover the whole hand
const PALM_ROI_SCALE: f32 = 2.6;
/// Shift of the palm ROI towards the fingers, relative to palm size
const PALM_ROI_SHIFT: f32 = 0.5;
/// Landmark bounding box enlargement when tracking
const TRACKING_ROI_SCALE: f32 = 2.0;
const TRACKING_ROI_SHIFT: f32 = 0.1;
/// Largest ROI side as a multiple of the frame's longer side
const MAX_ROI_FRAME_RATIO: u32 = 4;

/// Largest ROI side for a frame whose longer side is `longest`
fn max_roi_size(longest: u32) -> u32 {
    longest.saturating_mul(MAX_ROI_FRAME_RATIO).max(1)
}

/// Square crop region in frame pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    pub x_center: f32,
    pub y_center: f32,
    pub size: f32,
}

impl Roi {
    pub fn left(&self) -> f32 {
        self.x_center - self.size / 2.0
    }

    pub fn top(&self) -> f32 {
        self.y_center - self.size / 2.0
    }

    /// Intersection over union of two square regions
    pub fn iou(&self, other: &Roi) -> f32 {
        let iw = ((self.left() + self.size).min(other.left() + other.size)
            - self.left().max(other.left()))
        .max(0.0);
        let ih = ((self.top() + self.size).min(other.top() + other.size)
            - self.top().max(other.top()))
        .max(0.0);
        let intersection = iw * ih;
        let union = self.size * self.size + other.size * other.size - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Region covering a detected palm and the fingers above it
    pub fn from_palm(palm: &PalmDetection, letterbox: &Letterbox) -> Self {
        let (cx, cy) = letterbox.to_frame(palm.x_center, palm.y_center);
        let palm_size = (palm.width.max(palm.height)) * letterbox.side;

        let wrist = letterbox.to_frame(palm.keypoints[0].0, palm.keypoints[0].1);
        let middle = letterbox.to_frame(palm.keypoints[2].0, palm.keypoints[2].1);
        let (dx, dy) = direction(wrist, middle);

        Self {
            x_center: cx + dx * PALM_ROI_SHIFT * palm_size,
            y_center: cy + dy * PALM_ROI_SHIFT * palm_size,
            size: (palm_size * PALM_ROI_SCALE).min(max_roi_size(letterbox.side as u32) as f32),
        }
    }

    /// Region for the next frame, derived from this frame's landmarks
    pub fn from_landmarks(hand: &Hand, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        let (mut x0, mut y0, mut x1, mut y1) = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
        for lm in &hand.landmarks {
            x0 = x0.min(lm.x * w);
            y0 = y0.min(lm.y * h);
            x1 = x1.max(lm.x * w);
            y1 = y1.max(lm.y * h);
        }

        let wrist = hand.landmarks[landmarks::WRIST];
        let middle = hand.landmarks[landmarks::MIDDLE_FINGER_MCP];
        let (dx, dy) = direction((wrist.x * w, wrist.y * h), (middle.x * w, middle.y * h));
        let box_size = (x1 - x0).max(y1 - y0);

        Self {
            x_center: (x0 + x1) / 2.0 + dx * TRACKING_ROI_SHIFT * box_size,
            y_center: (y0 + y1) / 2.0 + dy * TRACKING_ROI_SHIFT * box_size,
            size: (box_size * TRACKING_ROI_SCALE).min(max_roi_size(width.max(height)) as f32),
        }
    }
}

/// Unit vector from `from` to `to`; straight up for coincident points
fn direction(from: (f32, f32), to: (f32, f32)) -> (f32, f32) {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let len = dx.hypot(dy);
    if len < f32::EPSILON {
        (0.0, -1.0)
    } else {
        (dx / len, dy / len)
    }
}

/// Mapping between a frame and its centred square letterbox
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Square side in frame pixels
    pub side: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    pub fn for_frame(width: u32, height: u32) -> Self {
        let side = width.max(height);
        Self {
            side: side as f32,
            pad_x: ((side - width) / 2) as f32,
            pad_y: ((side - height) / 2) as f32,
        }
    }

    /// Normalized letterbox coordinates to frame pixels
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.side - self.pad_x, y * self.side - self.pad_y)
    }

    /// Pad a frame to a square and resize it to the model input size
    pub fn apply(&self, image: &RgbaImage, input_size: u32) -> RgbaImage {
        let side = self.side as u32;
        let mut square = RgbaImage::from_pixel(side, side, BLACK);
        imageops::overlay(&mut square, image, self.pad_x as i64, self.pad_y as i64);
        imageops::resize(&square, input_size, input_size, FilterType::Triangle)
    }
}

/// Crop a square region (zero padded outside the frame) and resize it
pub fn crop_square(image: &RgbaImage, roi: &Roi, output_size: u32) -> RgbaImage {
    let limit = max_roi_size(image.width().max(image.height()));
    let side = (roi.size.ceil() as u32).clamp(1, limit);
    let mut canvas = RgbaImage::from_pixel(side, side, BLACK);
    imageops::overlay(
        &mut canvas,
        image,
        -(roi.left().round() as i64),
        -(roi.top().round() as i64),
    );
    imageops::resize(&canvas, output_size, output_size, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::anchors::PALM_KEYPOINTS;
    use crate::ml::HandLandmark;

    #[test]
    fn test_letterbox_landscape() {
        let lb = Letterbox::for_frame(640, 480);
        assert_eq!(lb.side, 640.0);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 80.0);
        assert_eq!(lb.to_frame(0.5, 0.5), (320.0, 240.0));
        assert_eq!(lb.to_frame(0.0, 0.125), (0.0, 0.0));
    }

    #[test]
    fn test_letterbox_apply_pads_with_black() {
        let frame = RgbaImage::from_pixel(4, 2, Rgba([255, 255, 255, 255]));
        let lb = Letterbox::for_frame(4, 2);
        let square = lb.apply(&frame, 4);
        assert_eq!(square.dimensions(), (4, 4));
        assert_eq!(square.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(square.get_pixel(1, 1).0, [255, 255, 255, 255]);
        assert_eq!(square.get_pixel(3, 3).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_palm_roi_shifts_towards_fingers() {
        let palm = PalmDetection {
            score: 0.9,
            x_center: 0.5,
            y_center: 0.5,
            width: 0.1,
            height: 0.1,
            keypoints: {
                let mut k = [(0.5, 0.5); PALM_KEYPOINTS];
                k[0] = (0.5, 0.55); // wrist below
                k[2] = (0.5, 0.45); // middle MCP above
                k
            },
        };
        let lb = Letterbox::for_frame(200, 200);
        let roi = Roi::from_palm(&palm, &lb);
        assert!((roi.x_center - 100.0).abs() < 1e-3);
        assert!((roi.y_center - 90.0).abs() < 1e-3);
        assert!((roi.size - 52.0).abs() < 1e-3);
    }

    #[test]
    fn test_landmark_roi_covers_hand() {
        let mut hand = Hand::default();
        for (i, lm) in hand.landmarks.iter_mut().enumerate() {
            *lm = HandLandmark { x: 0.4 + 0.01 * i as f32, y: 0.5, z: 0.0 };
        }
        hand.landmarks[landmarks::WRIST].y = 0.6;
        let roi = Roi::from_landmarks(&hand, 100, 100);
        assert!(roi.size >= 20.0);
        assert!(roi.left() <= 40.0 && roi.left() + roi.size >= 60.0);
    }

    #[test]
    fn test_roi_size_is_bounded_by_frame() {
        let mut hand = Hand::default();
        for (i, lm) in hand.landmarks.iter_mut().enumerate() {
            *lm = HandLandmark { x: -10.0 + i as f32, y: 0.5, z: 0.0 };
        }
        let roi = Roi::from_landmarks(&hand, 100, 50);
        assert_eq!(roi.size, 400.0);

        let palm = PalmDetection {
            score: 0.9,
            x_center: 0.5,
            y_center: 0.5,
            width: 50.0,
            height: 50.0,
            keypoints: [(0.5, 0.5); PALM_KEYPOINTS],
        };
        let roi = Roi::from_palm(&palm, &Letterbox::for_frame(200, 100));
        assert_eq!(roi.size, 800.0);

        // A crop at the bound keeps the side that landmarks are projected back with
        let frame = RgbaImage::from_pixel(200, 100, Rgba([200, 100, 50, 255]));
        let roi = Roi { x_center: 100.0, y_center: 50.0, size: roi.size };
        let crop = crop_square(&frame, &roi, 8);
        assert_eq!(crop.dimensions(), (8, 8));
        assert!(crop.get_pixel(4, 4).0[0] > 0);
        assert_eq!(crop.get_pixel(0, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_roi_iou() {
        let a = Roi { x_center: 10.0, y_center: 10.0, size: 10.0 };
        let b = Roi { x_center: 15.0, y_center: 10.0, size: 10.0 };
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_crop_outside_frame_is_black() {
        let frame = RgbaImage::from_pixel(10, 10, Rgba([200, 100, 50, 255]));
        let roi = Roi { x_center: 0.0, y_center: 0.0, size: 10.0 };
        let crop = crop_square(&frame, &roi, 10);
        assert_eq!(crop.dimensions(), (10, 10));
        assert_eq!(crop.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(crop.get_pixel(9, 9).0, [200, 100, 50, 255]);
    }
}
