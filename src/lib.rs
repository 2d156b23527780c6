//! Hand Control - webcam gestures driving screen brightness and system volume
//!
//! Captures camera frames, detects hand landmarks with ONNX Runtime, and maps
//! the thumb-to-index pinch distance of each hand onto an OS control:
//! the left hand sets screen brightness, the right hand sets audio volume.

pub mod app;
pub mod camera;
pub mod control;
pub mod controller;
pub mod gesture;
pub mod ml;
pub mod overlay;
pub mod session;
pub mod settings;

pub use app::App;
pub use controller::HandController;
pub use session::{LoopState, Session};
pub use settings::Settings;
