//! Windows backends: DDC/CI monitor brightness and the default audio endpoint

use windows::Win32::Devices::Display::{
    DestroyPhysicalMonitors, GetNumberOfPhysicalMonitorsFromHMONITOR,
    GetPhysicalMonitorsFromHMONITOR, SetMonitorBrightness, PHYSICAL_MONITOR,
};
use windows::core::HRESULT;
use windows::Win32::Foundation::{BOOL, LPARAM, RECT, RPC_E_CHANGED_MODE, TRUE};
use windows::Win32::Graphics::Gdi::{EnumDisplayMonitors, HDC, HMONITOR};
use windows::Win32::Media::Audio::Endpoints::IAudioEndpointVolume;
use windows::Win32::Media::Audio::{eConsole, eRender, IMMDeviceEnumerator, MMDeviceEnumerator};
use windows::Win32::System::Com::{CoCreateInstance, CoInitializeEx, CLSCTX_ALL, COINIT_APARTMENTTHREADED};

use super::{BrightnessControl, ControlError, ControlRange, VolumeControl};

/// Physical monitors that accept DDC/CI brightness commands
pub struct MonitorBrightness {
    monitors: Vec<PHYSICAL_MONITOR>,
}

unsafe extern "system" fn collect_monitor(
    hmonitor: HMONITOR,
    _hdc: HDC,
    _rect: *mut RECT,
    data: LPARAM,
) -> BOOL {
    let handles = &mut *(data.0 as *mut Vec<HMONITOR>);
    handles.push(hmonitor);
    TRUE
}

impl MonitorBrightness {
    pub fn open() -> Result<Self, ControlError> {
        let mut handles: Vec<HMONITOR> = Vec::new();
        let enumerated = unsafe {
            EnumDisplayMonitors(
                HDC::default(),
                None,
                Some(collect_monitor),
                LPARAM(&mut handles as *mut Vec<HMONITOR> as isize),
            )
        };
        if !enumerated.as_bool() {
            return Err(ControlError::Brightness("EnumDisplayMonitors failed".to_string()));
        }

        let mut monitors = Vec::new();
        for handle in handles {
            let mut count = 0u32;
            if unsafe { GetNumberOfPhysicalMonitorsFromHMONITOR(handle, &mut count) }.is_err() {
                continue;
            }
            let mut physical = vec![PHYSICAL_MONITOR::default(); count as usize];
            if unsafe { GetPhysicalMonitorsFromHMONITOR(handle, &mut physical) }.is_ok() {
                monitors.extend(physical);
            }
        }

        if monitors.is_empty() {
            return Err(ControlError::Brightness(
                "no DDC/CI capable monitor found".to_string(),
            ));
        }

        log::info!("Controlling brightness of {} monitor(s)", monitors.len());
        Ok(Self { monitors })
    }
}

impl BrightnessControl for MonitorBrightness {
    fn set_brightness(&mut self, percent: u32) -> Result<(), ControlError> {
        let percent = percent.min(100);
        for monitor in &self.monitors {
            let ok = unsafe { SetMonitorBrightness(monitor.hPhysicalMonitor, percent) };
            if ok == 0 {
                return Err(ControlError::Brightness(format!(
                    "SetMonitorBrightness({}) failed",
                    percent
                )));
            }
        }
        Ok(())
    }
}

impl Drop for MonitorBrightness {
    fn drop(&mut self) {
        if let Err(e) = unsafe { DestroyPhysicalMonitors(&self.monitors) } {
            log::warn!("Failed to release monitor handles: {}", e);
        }
    }
}

/// Master volume of the default render endpoint, in decibels
pub struct EndpointVolume {
    endpoint: IAudioEndpointVolume,
}

/// Result of `CoInitializeEx` on the UI thread
///
/// The window later calls `OleInitialize`, which needs a single-threaded
/// apartment, so only STA is requested. `S_FALSE` and `RPC_E_CHANGED_MODE`
/// mean COM is already usable on this thread.
fn com_initialized(hr: HRESULT) -> Result<(), ControlError> {
    if hr.is_ok() {
        return Ok(());
    }
    if hr == RPC_E_CHANGED_MODE {
        log::debug!("COM already initialized with another apartment model");
        return Ok(());
    }
    Err(ControlError::NoAudioEndpoint(hr.message()))
}

impl EndpointVolume {
    /// COM stays initialized for the rest of the process
    pub fn open() -> Result<Self, ControlError> {
        let endpoint = unsafe {
            com_initialized(CoInitializeEx(None, COINIT_APARTMENTTHREADED))?;

            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                    .map_err(|e| ControlError::NoAudioEndpoint(e.to_string()))?;
            let device = enumerator
                .GetDefaultAudioEndpoint(eRender, eConsole)
                .map_err(|e| ControlError::NoAudioEndpoint(e.to_string()))?;
            device
                .Activate::<IAudioEndpointVolume>(CLSCTX_ALL, None)
                .map_err(|e| ControlError::NoAudioEndpoint(e.to_string()))?
        };

        log::info!("Controlling volume of the default audio endpoint");
        Ok(Self { endpoint })
    }
}

impl VolumeControl for EndpointVolume {
    fn volume_range(&mut self) -> Result<ControlRange, ControlError> {
        let (mut min, mut max, mut step) = (0.0f32, 0.0f32, 0.0f32);
        unsafe { self.endpoint.GetVolumeRange(&mut min, &mut max, &mut step) }
            .map_err(|e| ControlError::Volume(e.to_string()))?;
        Ok(ControlRange::new(min, max))
    }

    fn set_volume(&mut self, level: f32) -> Result<(), ControlError> {
        unsafe { self.endpoint.SetMasterVolumeLevel(level, std::ptr::null()) }
            .map_err(|e| ControlError::Volume(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use windows::Win32::Foundation::{E_FAIL, S_FALSE, S_OK};

    #[test]
    fn test_com_already_initialized_is_accepted() {
        assert!(com_initialized(S_OK).is_ok());
        assert!(com_initialized(S_FALSE).is_ok());
        assert!(com_initialized(RPC_E_CHANGED_MODE).is_ok());
    }

    #[test]
    fn test_com_failure_is_reported() {
        assert!(matches!(
            com_initialized(E_FAIL),
            Err(ControlError::NoAudioEndpoint(_))
        ));
    }

    #[test]
    fn test_apartment_threaded_init_on_fresh_thread() {
        std::thread::spawn(|| {
            assert!(com_initialized(unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) }).is_ok());
            // A second call on the same thread reports S_FALSE
            assert!(com_initialized(unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) }).is_ok());
        })
        .join()
        .unwrap();
    }
}
