//! Capture loop state: read, mirror, process, until capture fails or the user quits

use crate::camera::{CameraFrame, FrameSource};
use crate::control::ControlLevels;
use crate::controller::{ControllerError, HandController};

/// Main loop state; `Exiting` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Exiting,
}

/// True when a typed key is exactly the configured quit character
pub fn is_quit_key(text: &str, quit_key: char) -> bool {
    text.chars().eq(std::iter::once(quit_key))
}

/// Frame source and gesture controller driven one frame per step
pub struct Session {
    /// `None` once released
    source: Option<Box<dyn FrameSource>>,
    controller: HandController,
    state: LoopState,
    frames_processed: u64,
}

impl Session {
    pub fn new(source: Box<dyn FrameSource>, controller: HandController) -> Self {
        Self {
            source: Some(source),
            controller,
            state: LoopState::Running,
            frames_processed: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn levels(&self) -> ControlLevels {
        self.controller.levels()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Whether the frame source is still held
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Enter `Exiting` and release the frame source
    pub fn exit(&mut self) {
        self.state = LoopState::Exiting;
        if self.source.take().is_some() {
            log::debug!("Frame source released after {} frames", self.frames_processed);
        }
    }

    /// One iteration; returns the annotated frame, or `None` once exiting
    ///
    /// A failed capture ends the loop cleanly. Detector and control errors are returned.
    pub fn step(&mut self) -> Result<Option<CameraFrame>, ControllerError> {
        let Some(source) = self.source.as_mut() else {
            self.state = LoopState::Exiting;
            return Ok(None);
        };
        if self.state == LoopState::Exiting {
            return Ok(None);
        }

        let mut frame = match source.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("Failed to capture video frame: {}", e);
                self.exit();
                return Ok(None);
            }
        };

        frame.mirror();
        let report = self.controller.process_frame(&mut frame)?;
        log::trace!("Frame {}: {:?}", frame.frame_number, report);
        self.frames_processed += 1;

        Ok(Some(frame))
    }
}
