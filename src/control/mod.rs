//! OS control module
//!
//! Maps pinch distances onto control ranges and applies them through the
//! platform brightness and volume services.

mod dry_run;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "windows")]
mod windows;

pub use dry_run::{LoggingBrightness, LoggingVolume};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::settings::ControlSettings;

/// Errors raised by the OS control backends.
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("{0} control is not supported on this platform")]
    Unsupported(&'static str),
    #[error("No backlight device found under {0}")]
    NoBacklight(String),
    #[error("Backlight I/O failed: {0}")]
    Backlight(#[from] std::io::Error),
    #[error("Audio endpoint unavailable: {0}")]
    NoAudioEndpoint(String),
    #[error("Brightness service failed: {0}")]
    Brightness(String),
    #[error("Volume service failed: {0}")]
    Volume(String),
}

/// Closed interval of control values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlRange {
    pub min: f32,
    pub max: f32,
}

impl ControlRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

/// Pinch distance interval (pixels) mapped onto a control range
pub const DISTANCE_RANGE: ControlRange = ControlRange::new(50.0, 220.0);

/// Screen brightness percentage
pub const BRIGHTNESS_RANGE: ControlRange = ControlRange::new(0.0, 100.0);

/// Linear interpolation clamped to the source range
pub fn interpolate(value: f32, from: ControlRange, to: ControlRange) -> f32 {
    if value <= from.min {
        return to.min;
    }
    if value >= from.max {
        return to.max;
    }
    let t = (value - from.min) / (from.max - from.min);
    to.min + t * (to.max - to.min)
}

/// Brightness percentage for a pinch distance, truncated to a whole percent
pub fn map_brightness(distance: f32, from: ControlRange, to: ControlRange) -> u32 {
    interpolate(distance, from, to).max(0.0) as u32
}

/// Volume level in device units for a pinch distance
pub fn map_volume(distance: f32, from: ControlRange, device: ControlRange) -> f32 {
    interpolate(distance, from, device)
}

/// Last applied control values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlLevels {
    /// Brightness percentage
    pub brightness: u32,
    /// Volume in device units
    pub volume: f32,
}

impl Default for ControlLevels {
    fn default() -> Self {
        Self {
            brightness: 50,
            volume: 0.0,
        }
    }
}

/// Screen brightness service
pub trait BrightnessControl {
    fn set_brightness(&mut self, percent: u32) -> Result<(), ControlError>;
}

/// Audio output volume service
pub trait VolumeControl {
    /// Device-reported volume range
    fn volume_range(&mut self) -> Result<ControlRange, ControlError>;
    fn set_volume(&mut self, level: f32) -> Result<(), ControlError>;
}

/// Brightness and volume backends selected for this run
pub struct Controls {
    pub brightness: Box<dyn BrightnessControl>,
    pub volume: Box<dyn VolumeControl>,
}

impl Controls {
    /// Logging backends that never touch the OS
    pub fn dry_run(volume_range: ControlRange) -> Self {
        Self {
            brightness: Box::new(LoggingBrightness::default()),
            volume: Box::new(LoggingVolume::new(volume_range)),
        }
    }

    /// Backends for the current platform, or logging backends in dry-run mode
    pub fn from_settings(settings: &ControlSettings) -> Result<Self, ControlError> {
        if settings.dry_run {
            log::info!("Dry-run controls: brightness and volume changes are only logged");
            return Ok(Self::dry_run(settings.dry_run_volume_range));
        }
        Self::platform(settings)
    }

    #[cfg(target_os = "linux")]
    fn platform(settings: &ControlSettings) -> Result<Self, ControlError> {
        let brightness = linux::SysfsBacklight::open(settings.backlight_device.as_deref())?;
        let volume = linux::PulseVolume::open()?;
        Ok(Self {
            brightness: Box::new(brightness),
            volume: Box::new(volume),
        })
    }

    #[cfg(target_os = "windows")]
    fn platform(_settings: &ControlSettings) -> Result<Self, ControlError> {
        let brightness = windows::MonitorBrightness::open()?;
        let volume = windows::EndpointVolume::open()?;
        Ok(Self {
            brightness: Box::new(brightness),
            volume: Box::new(volume),
        })
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    fn platform(_settings: &ControlSettings) -> Result<Self, ControlError> {
        Err(ControlError::Unsupported("Brightness"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOWS_DB: ControlRange = ControlRange::new(-65.25, 0.0);

    #[test]
    fn test_below_range_maps_to_minimum() {
        for d in [0.0, 10.0, 49.9, 50.0] {
            assert_eq!(map_brightness(d, DISTANCE_RANGE, BRIGHTNESS_RANGE), 0);
            assert_eq!(map_volume(d, DISTANCE_RANGE, WINDOWS_DB), -65.25);
        }
    }

    #[test]
    fn test_above_range_maps_to_maximum() {
        for d in [220.0, 220.1, 500.0, f32::MAX] {
            assert_eq!(map_brightness(d, DISTANCE_RANGE, BRIGHTNESS_RANGE), 100);
            assert_eq!(map_volume(d, DISTANCE_RANGE, WINDOWS_DB), 0.0);
        }
    }

    #[test]
    fn test_brightness_scenarios() {
        // 50/170 * 100 = 29.41 -> 29
        assert_eq!(map_brightness(100.0, DISTANCE_RANGE, BRIGHTNESS_RANGE), 29);
        assert_eq!(map_brightness(135.0, DISTANCE_RANGE, BRIGHTNESS_RANGE), 50);
    }

    #[test]
    fn test_monotonic_within_range() {
        let mut previous_b = 0;
        let mut previous_v = f32::MIN;
        let mut d = 50.0;
        while d <= 220.0 {
            let b = map_brightness(d, DISTANCE_RANGE, BRIGHTNESS_RANGE);
            let v = map_volume(d, DISTANCE_RANGE, WINDOWS_DB);
            assert!(b >= previous_b, "brightness decreased at {}", d);
            assert!(v >= previous_v, "volume decreased at {}", d);
            assert!(WINDOWS_DB.contains(v));
            previous_b = b;
            previous_v = v;
            d += 0.5;
        }
    }

    #[test]
    fn test_degenerate_source_range() {
        let point = ControlRange::new(100.0, 100.0);
        assert_eq!(interpolate(99.0, point, BRIGHTNESS_RANGE), 0.0);
        assert_eq!(interpolate(100.0, point, BRIGHTNESS_RANGE), 0.0);
        assert_eq!(interpolate(101.0, point, BRIGHTNESS_RANGE), 100.0);
    }

    #[test]
    fn test_range_validity() {
        assert!(DISTANCE_RANGE.is_valid());
        assert!(!ControlRange::new(10.0, 5.0).is_valid());
        assert!(!ControlRange::new(f32::NAN, 5.0).is_valid());
    }

    #[test]
    fn test_default_levels() {
        let levels = ControlLevels::default();
        assert_eq!(levels.brightness, 50);
        assert_eq!(levels.volume, 0.0);
    }
}
