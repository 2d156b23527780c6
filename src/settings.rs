//! Settings management for Hand Control
//!
//! Settings are read once at startup from a JSON file and never written.
//! Every field has a default, so the file may be partial or absent.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::control::{ControlRange, BRIGHTNESS_RANGE, DISTANCE_RANGE};
use crate::gesture::{landmarks, FingertipPair, HandAssignment};
use crate::ml::TensorLayout;

/// Environment variable overriding the settings file location
pub const SETTINGS_ENV: &str = "HAND_CONTROL_SETTINGS";

/// Errors raised while loading settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse settings file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Camera selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Device index (0 = default camera)
    pub index: u32,
    /// Requested frame width
    pub width: u32,
    /// Requested frame height
    pub height: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            index: 0,
            width: 1280,
            height: 720,
        }
    }
}

/// Hand model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Directory holding the ONNX models; searched for when unset
    pub model_dir: Option<PathBuf>,
    pub palm_model: String,
    pub landmark_model: String,
    pub input_layout: TensorLayout,
    /// Maximum hands detected per frame
    pub max_hands: usize,
    /// Minimum palm score for a new hand
    pub min_detection_confidence: f32,
    /// Minimum presence score to keep (and keep tracking) a hand
    pub min_tracking_confidence: f32,
    /// ONNX Runtime intra-op threads
    pub intra_threads: usize,
    /// Landmark presence and handedness outputs are raw logits
    pub landmark_scores_are_logits: bool,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            model_dir: None,
            palm_model: "palm_detection_full.onnx".to_string(),
            landmark_model: "hand_landmark_full.onnx".to_string(),
            input_layout: TensorLayout::Nhwc,
            max_hands: 2,
            min_detection_confidence: 0.75,
            min_tracking_confidence: 0.75,
            intra_threads: 2,
            landmark_scores_are_logits: false,
        }
    }
}

/// Gesture to control mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingSettings {
    /// Pinch distance interval in pixels
    pub distance_range: ControlRange,
    /// Brightness percentage interval
    pub brightness_range: ControlRange,
    pub fingertips: FingertipPair,
    pub hand_assignment: HandAssignment,
    /// Brightness shown before the first left-hand gesture
    pub initial_brightness: u32,
    /// Volume shown before the first right-hand gesture
    pub initial_volume: f32,
    /// Draw the hand skeleton on the preview
    pub draw_landmarks: bool,
}

impl Default for MappingSettings {
    fn default() -> Self {
        Self {
            distance_range: DISTANCE_RANGE,
            brightness_range: BRIGHTNESS_RANGE,
            fingertips: FingertipPair::default(),
            hand_assignment: HandAssignment::DetectionOrder,
            initial_brightness: 50,
            initial_volume: 0.0,
            draw_landmarks: true,
        }
    }
}

/// OS control backends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    /// Log changes instead of applying them
    pub dry_run: bool,
    /// Backlight device under /sys/class/backlight (Linux); first found when unset
    pub backlight_device: Option<String>,
    /// Volume range reported in dry-run mode
    pub dry_run_volume_range: ControlRange,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            dry_run: false,
            backlight_device: None,
            dry_run_volume_range: ControlRange::new(-65.25, 0.0),
        }
    }
}

/// Preview window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Key that ends the session
    pub quit_key: char,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            title: "Hand Control".to_string(),
            width: 1280,
            height: 720,
            quit_key: 'q',
        }
    }
}

/// All application settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub camera: CameraSettings,
    pub detector: DetectorSettings,
    pub mapping: MappingSettings,
    pub controls: ControlSettings,
    pub window: WindowSettings,
}

impl Settings {
    /// Settings file location: `$HAND_CONTROL_SETTINGS`, else the user config directory
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(SETTINGS_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("hand-control").join("settings.json"))
    }

    /// Load and validate settings from a file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_json(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        log::info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Load from the default location; a missing file yields defaults
    pub fn load_or_default() -> Result<Self, SettingsError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            Some(path) => {
                log::info!("No settings file at {:?}, using defaults", path);
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), SettingsError> {
        let mapping = &self.mapping;
        check_range("mapping.distance_range", mapping.distance_range)?;
        check_range("mapping.brightness_range", mapping.brightness_range)?;
        check_range("controls.dry_run_volume_range", self.controls.dry_run_volume_range)?;

        if mapping.brightness_range.min < 0.0 || mapping.brightness_range.max > 100.0 {
            return Err(SettingsError::Invalid {
                field: "mapping.brightness_range",
                reason: "must lie within 0..100".to_string(),
            });
        }
        if let Some(&index) = mapping.fingertips.0.iter().find(|&&i| i >= landmarks::COUNT) {
            return Err(SettingsError::Invalid {
                field: "mapping.fingertips",
                reason: format!("landmark index {} out of 0..{}", index, landmarks::COUNT),
            });
        }
        if mapping.fingertips.0[0] == mapping.fingertips.0[1] {
            return Err(SettingsError::Invalid {
                field: "mapping.fingertips",
                reason: "indices must differ".to_string(),
            });
        }

        let detector = &self.detector;
        if detector.max_hands == 0 {
            return Err(SettingsError::Invalid {
                field: "detector.max_hands",
                reason: "must be at least 1".to_string(),
            });
        }
        for (field, value) in [
            ("detector.min_detection_confidence", detector.min_detection_confidence),
            ("detector.min_tracking_confidence", detector.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SettingsError::Invalid {
                    field,
                    reason: format!("{} is not a probability", value),
                });
            }
        }

        Ok(())
    }
}

fn check_range(field: &'static str, range: ControlRange) -> Result<(), SettingsError> {
    if range.is_valid() {
        Ok(())
    } else {
        Err(SettingsError::Invalid {
            field,
            reason: format!("[{}, {}] is not an ascending range", range.min, range.max),
        })
    }
}
