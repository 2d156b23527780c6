//! Logging backends used when OS controls are disabled

use super::{BrightnessControl, ControlError, ControlRange, VolumeControl};

/// Records and logs brightness changes without applying them
#[derive(Debug, Default)]
pub struct LoggingBrightness {
    last: Option<u32>,
}

impl LoggingBrightness {
    pub fn last(&self) -> Option<u32> {
        self.last
    }
}

impl BrightnessControl for LoggingBrightness {
    fn set_brightness(&mut self, percent: u32) -> Result<(), ControlError> {
        if self.last != Some(percent) {
            log::info!("[dry-run] brightness -> {}%", percent);
        }
        self.last = Some(percent);
        Ok(())
    }
}

/// Records and logs volume changes against a fixed range
#[derive(Debug)]
pub struct LoggingVolume {
    range: ControlRange,
    last: Option<f32>,
}

impl LoggingVolume {
    pub fn new(range: ControlRange) -> Self {
        Self { range, last: None }
    }

    pub fn last(&self) -> Option<f32> {
        self.last
    }
}

impl VolumeControl for LoggingVolume {
    fn volume_range(&mut self) -> Result<ControlRange, ControlError> {
        Ok(self.range)
    }

    fn set_volume(&mut self, level: f32) -> Result<(), ControlError> {
        if self.last != Some(level) {
            log::info!("[dry-run] volume -> {:.2}", level);
        }
        self.last = Some(level);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_backends_record_last_value() {
        let mut brightness = LoggingBrightness::default();
        assert_eq!(brightness.last(), None);
        brightness.set_brightness(42).unwrap();
        assert_eq!(brightness.last(), Some(42));

        let mut volume = LoggingVolume::new(ControlRange::new(-10.0, 0.0));
        assert_eq!(volume.volume_range().unwrap(), ControlRange::new(-10.0, 0.0));
        volume.set_volume(-3.5).unwrap();
        assert_eq!(volume.last(), Some(-3.5));
    }
}
