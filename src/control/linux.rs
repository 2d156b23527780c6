//! Linux backends: sysfs backlight and PulseAudio/PipeWire via `pactl`

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::{BrightnessControl, ControlError, ControlRange, VolumeControl};

const BACKLIGHT_ROOT: &str = "/sys/class/backlight";

/// Backlight exposed under `/sys/class/backlight/<device>`
pub struct SysfsBacklight {
    device: PathBuf,
    max_brightness: u32,
}

impl SysfsBacklight {
    /// Open a named backlight device, or the first one present
    pub fn open(device: Option<&str>) -> Result<Self, ControlError> {
        Self::open_in(Path::new(BACKLIGHT_ROOT), device)
    }

    fn open_in(root: &Path, device: Option<&str>) -> Result<Self, ControlError> {
        let device = match device {
            Some(name) => root.join(name),
            None => {
                let mut entries: Vec<PathBuf> = fs::read_dir(root)
                    .map_err(|_| ControlError::NoBacklight(root.display().to_string()))?
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .collect();
                entries.sort();
                entries
                    .into_iter()
                    .next()
                    .ok_or_else(|| ControlError::NoBacklight(root.display().to_string()))?
            }
        };

        let max_brightness = read_u32(&device.join("max_brightness"))?;
        log::info!(
            "Using backlight {} (max_brightness {})",
            device.display(),
            max_brightness
        );

        Ok(Self {
            device,
            max_brightness,
        })
    }

    /// Raw device value for a percentage
    fn raw_value(&self, percent: u32) -> u32 {
        let percent = percent.min(100) as u64;
        (percent * self.max_brightness as u64 / 100) as u32
    }
}

impl BrightnessControl for SysfsBacklight {
    fn set_brightness(&mut self, percent: u32) -> Result<(), ControlError> {
        let raw = self.raw_value(percent);
        fs::write(self.device.join("brightness"), raw.to_string())?;
        log::debug!("Backlight set to {}% (raw {})", percent, raw);
        Ok(())
    }
}

fn read_u32(path: &Path) -> Result<u32, ControlError> {
    let text = fs::read_to_string(path)?;
    text.trim()
        .parse()
        .map_err(|e| ControlError::Brightness(format!("{}: {}", path.display(), e)))
}

/// Default sink volume through `pactl`, as a percentage
pub struct PulseVolume {
    pactl: PathBuf,
}

impl PulseVolume {
    pub fn open() -> Result<Self, ControlError> {
        let pactl = which::which("pactl")
            .map_err(|e| ControlError::NoAudioEndpoint(format!("pactl not found: {}", e)))?;

        // Fails when no sound server or default sink is reachable
        let output = Command::new(&pactl)
            .args(["get-sink-volume", "@DEFAULT_SINK@"])
            .output()
            .map_err(|e| ControlError::NoAudioEndpoint(e.to_string()))?;
        if !output.status.success() {
            return Err(ControlError::NoAudioEndpoint(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        log::info!("Using default sink volume via {}", pactl.display());
        Ok(Self { pactl })
    }
}

impl VolumeControl for PulseVolume {
    fn volume_range(&mut self) -> Result<ControlRange, ControlError> {
        Ok(ControlRange::new(0.0, 100.0))
    }

    fn set_volume(&mut self, level: f32) -> Result<(), ControlError> {
        let percent = format!("{}%", level.clamp(0.0, 100.0).round() as u32);
        let status = Command::new(&self.pactl)
            .args(["set-sink-volume", "@DEFAULT_SINK@", &percent])
            .status()
            .map_err(|e| ControlError::Volume(e.to_string()))?;
        if !status.success() {
            return Err(ControlError::Volume(format!("pactl exited with {}", status)));
        }
        Ok(())
    }
}
