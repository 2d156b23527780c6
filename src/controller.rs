//! Per-frame gesture pipeline: detect, assign, measure, map, apply

use thiserror::Error;

use crate::camera::CameraFrame;
use crate::control::{map_brightness, map_volume, ControlError, ControlLevels, Controls};
use crate::gesture::{assign_hands, extract_fingertips, pinch_distance, Point};
use crate::ml::{DetectorError, Hand, HandDetector};
use crate::overlay;
use crate::settings::MappingSettings;

/// Errors that end the session when a frame cannot be processed.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Hand detection failed: {0}")]
    Detector(#[from] DetectorError),
    #[error("Control update failed: {0}")]
    Control(#[from] ControlError),
}

/// What happened on one processed frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub hands_detected: usize,
    /// Pinch distance of the brightness hand, if it was measured
    pub left_distance: Option<f32>,
    /// Pinch distance of the volume hand, if it was measured
    pub right_distance: Option<f32>,
}

/// Turns camera frames into brightness and volume updates
pub struct HandController {
    detector: Box<dyn HandDetector>,
    controls: Controls,
    mapping: MappingSettings,
    levels: ControlLevels,
}

impl HandController {
    pub fn new(detector: Box<dyn HandDetector>, controls: Controls, mapping: MappingSettings) -> Self {
        let levels = ControlLevels {
            brightness: mapping.initial_brightness,
            volume: mapping.initial_volume,
        };
        Self {
            detector,
            controls,
            mapping,
            levels,
        }
    }

    /// Last applied levels, as shown in the overlay
    pub fn levels(&self) -> ControlLevels {
        self.levels
    }

    /// Process one mirrored frame; landmarks are drawn into it when enabled
    pub fn process_frame(&mut self, frame: &mut CameraFrame) -> Result<FrameReport, ControllerError> {
        let hands = self.detector.detect(frame)?;
        let (width, height) = (frame.width(), frame.height());
        let assigned = assign_hands(&hands, self.mapping.hand_assignment);

        let mut report = FrameReport {
            hands_detected: hands.len(),
            ..Default::default()
        };

        if let Some(hand) = assigned.left {
            if let Some(distance) = self.measure(hand, width, height) {
                self.apply_brightness(distance)?;
                report.left_distance = Some(distance);
            }
        }
        if let Some(hand) = assigned.right {
            if let Some(distance) = self.measure(hand, width, height) {
                self.apply_volume(distance)?;
                report.right_distance = Some(distance);
            }
        }

        if self.mapping.draw_landmarks {
            for hand in &hands {
                overlay::draw_hand(&mut frame.image, hand);
            }
        }

        Ok(report)
    }

    /// Pinch distance of a hand, or `None` if both fingertips were not found
    fn measure(&self, hand: &Hand, width: u32, height: u32) -> Option<f32> {
        let points: Vec<Point> = extract_fingertips(hand, width, height, self.mapping.fingertips);
        if points.len() < 2 {
            log::debug!("Only {} fingertip(s) found, skipping update", points.len());
            return None;
        }
        Some(pinch_distance(&points))
    }

    fn apply_brightness(&mut self, distance: f32) -> Result<(), ControlError> {
        let percent = map_brightness(distance, self.mapping.distance_range, self.mapping.brightness_range);
        self.controls.brightness.set_brightness(percent)?;
        log::debug!("Brightness {}% (distance {:.1})", percent, distance);
        self.levels.brightness = percent;
        Ok(())
    }

    fn apply_volume(&mut self, distance: f32) -> Result<(), ControlError> {
        let range = self.controls.volume.volume_range()?;
        let level = map_volume(distance, self.mapping.distance_range, range);
        self.controls.volume.set_volume(level)?;
        log::debug!("Volume {:.2} (distance {:.1})", level, distance);
        self.levels.volume = level;
        Ok(())
    }
}
