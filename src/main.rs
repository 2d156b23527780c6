//! Hand Control - Main Entry Point
//!
//! Webcam gesture utility: the first hand's thumb-index pinch sets screen
//! brightness, the second hand's pinch sets the system volume.

use std::sync::Arc;

use anyhow::Context;
use hand_control::camera::CameraCapture;
use hand_control::control::Controls;
use hand_control::ml::OnnxHandDetector;
use hand_control::session::is_quit_key;
use hand_control::{App, HandController, LoopState, Session, Settings};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::Key;
use winit::window::{Window, WindowAttributes, WindowId};

/// Application state machine
enum AppState {
    /// Capture session is ready, window not created yet
    Uninitialized { session: Session },
    /// Window and graphics context are ready
    Running { window: Arc<Window>, app: App },
    /// Loop ended; the camera has been released
    Exited,
}

/// Main application handler implementing winit's ApplicationHandler trait
struct HandControlApp {
    settings: Settings,
    state: AppState,
    /// First fatal error, reported once the event loop returns
    error: Option<anyhow::Error>,
}

impl HandControlApp {
    fn new(settings: Settings, session: Session) -> Self {
        Self {
            settings,
            state: AppState::Uninitialized { session },
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        if self.error.is_none() {
            self.error = Some(error);
        }
        self.shutdown(event_loop);
    }

    /// Drop the app (releasing the camera and closing the window) and stop the loop
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.state = AppState::Exited;
        event_loop.exit();
    }

    fn create_app(
        &self,
        event_loop: &ActiveEventLoop,
        session: Session,
    ) -> anyhow::Result<(Arc<Window>, App)> {
        let window_settings = &self.settings.window;
        let window_attributes = WindowAttributes::default()
            .with_title(window_settings.title.clone())
            .with_inner_size(LogicalSize::new(window_settings.width, window_settings.height));

        let window = Arc::new(
            event_loop
                .create_window(window_attributes)
                .context("Failed to create window")?,
        );

        log::info!(
            "Window created: {}x{}",
            window.inner_size().width,
            window.inner_size().height
        );

        let app = pollster::block_on(App::new(window.clone(), session))
            .context("Failed to initialize graphics")?;
        Ok((window, app))
    }
}

impl ApplicationHandler for HandControlApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        // Only initialize if we haven't already
        if !matches!(self.state, AppState::Uninitialized { .. }) {
            return;
        }
        let AppState::Uninitialized { session } =
            std::mem::replace(&mut self.state, AppState::Exited)
        else {
            return;
        };

        match self.create_app(event_loop, session) {
            Ok((window, app)) => {
                log::info!("Hand Control ready! Press '{}' to quit", self.settings.window.quit_key);
                window.request_redraw();
                self.state = AppState::Running { window, app };
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        // Only handle events if we're running
        let AppState::Running { window, app } = &mut self.state else {
            return;
        };

        // Let egui handle the event first
        let egui_consumed = app.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting...");
                app.request_exit();
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Character(ref text),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } if !egui_consumed => {
                if is_quit_key(text, self.settings.window.quit_key) {
                    log::info!("Quit key pressed, exiting...");
                    app.request_exit();
                }
            }

            WindowEvent::Resized(physical_size) => {
                app.resize(physical_size);
            }

            WindowEvent::RedrawRequested => {
                let step = app.step();
                match step {
                    Ok(LoopState::Running) => {}
                    Ok(LoopState::Exiting) => {}
                    Err(e) => {
                        let error = anyhow::Error::new(e).context("Frame processing failed");
                        self.fail(event_loop, error);
                        return;
                    }
                }

                match app.render() {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) | Err(wgpu::SurfaceError::Outdated) => {
                        log::warn!("Surface lost, reconfiguring...");
                        app.resize(app.size());
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        self.fail(event_loop, anyhow::anyhow!("Out of GPU memory"));
                        return;
                    }
                    Err(e) => {
                        log::warn!("Surface error: {:?}", e);
                    }
                }
                window.request_redraw();
            }

            _ => {}
        }

        if let AppState::Running { app, .. } = &self.state {
            if app.state() == LoopState::Exiting {
                self.shutdown(event_loop);
            }
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        // Capture blocks inside each redraw, so the camera paces the loop
        event_loop.set_control_flow(ControlFlow::Wait);
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.state = AppState::Exited;
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Hand Control v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load_or_default().context("Failed to load settings")?;

    for info in CameraCapture::list_cameras() {
        log::debug!("Camera {}: {}", info.index, info.name);
    }

    let camera = CameraCapture::open(
        settings.camera.index,
        settings.camera.width,
        settings.camera.height,
    )
    .context("Failed to open camera")?;

    let detector = OnnxHandDetector::new(&settings.detector).context("Failed to initialize hand detector")?;
    let controls = Controls::from_settings(&settings.controls).context("Failed to initialize OS controls")?;
    let controller = HandController::new(Box::new(detector), controls, settings.mapping.clone());

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let session = Session::new(Box::new(camera), controller);
    let mut app = HandControlApp::new(settings, session);
    event_loop.run_app(&mut app).context("Event loop error")?;

    match app.error.take() {
        Some(error) => Err(error),
        None => {
            log::info!("Hand Control exited");
            Ok(())
        }
    }
}
