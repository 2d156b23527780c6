//! Application state and rendering
//!
//! Owns the wgpu surface, the egui integration and the capture session.
//! Each redraw runs one blocking session step, then presents the annotated
//! frame with the level feedback.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::camera::CameraFrame;
use crate::controller::ControllerError;
use crate::overlay;
use crate::session::{LoopState, Session};

/// Errors raised while setting up the graphics context.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("No suitable GPU adapter found")]
    NoAdapter,
    #[error("Failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}

/// Font height of the feedback text at frame scale
const FEEDBACK_FONT_SIZE: f32 = 26.0;

/// Main application state
pub struct App {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,

    session: Session,

    // Last annotated frame
    preview: Option<egui::TextureHandle>,
    preview_size: [usize; 2],

    // egui integration
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,

    // Frame timing
    fps: f64,
    last_fps_update: Instant,
    frames_since_update: u64,
}

impl App {
    /// Create the graphics context around a ready capture session
    pub async fn new(window: Arc<Window>, session: Session) -> Result<Self, AppError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(AppError::NoAdapter)?;

        log::info!("Using GPU: {}", adapter.get_info().name);
        log::info!("Backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Hand Control Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::MemoryUsage,
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or(surface_caps.formats.first())
            .copied()
            .unwrap_or(wgpu::TextureFormat::Bgra8UnormSrgb);

        log::info!("Surface format: {:?}", surface_format);

        let present_mode = if surface_caps.present_modes.contains(&wgpu::PresentMode::Mailbox) {
            wgpu::PresentMode::Mailbox
        } else {
            wgpu::PresentMode::Fifo
        };

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 1,
        };
        surface.configure(&device, &config);

        let egui_ctx = egui::Context::default();
        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            session,
            preview: None,
            preview_size: [0, 0],
            egui_ctx,
            egui_state,
            egui_renderer,
            fps: 0.0,
            last_fps_update: Instant::now(),
            frames_since_update: 0,
        })
    }

    /// Handle window events for egui
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(&self.window, event);
        response.consumed
    }

    /// Resize the surface
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Get current size
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn state(&self) -> LoopState {
        self.session.state()
    }

    /// Enter the terminal state and release the camera
    pub fn request_exit(&mut self) {
        self.session.exit();
    }

    /// Run one session step and upload the resulting frame
    pub fn step(&mut self) -> Result<LoopState, ControllerError> {
        if let Some(frame) = self.session.step()? {
            self.upload_preview(&frame);
            self.update_fps();
        }
        Ok(self.session.state())
    }

    fn upload_preview(&mut self, frame: &CameraFrame) {
        let size = [frame.width() as usize, frame.height() as usize];
        let image = egui::ColorImage::from_rgba_unmultiplied(size, frame.data());

        match &mut self.preview {
            Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
            None => {
                self.preview = Some(self.egui_ctx.load_texture(
                    "camera-preview",
                    image,
                    egui::TextureOptions::LINEAR,
                ));
            }
        }
        self.preview_size = size;
    }

    /// Render the preview and feedback text
    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        self.render_ui(&mut encoder, &view);

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }

    fn render_ui(&mut self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let raw_input = self.egui_state.take_egui_input(&self.window);

        let preview = self.preview.as_ref().map(|t| t.id());
        let [frame_w, frame_h] = self.preview_size;
        let lines = overlay::feedback_lines(&self.session.levels());
        let text_color = egui::Color32::from_rgb(
            overlay::TEXT_COLOR[0],
            overlay::TEXT_COLOR[1],
            overlay::TEXT_COLOR[2],
        );

        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            egui::CentralPanel::default()
                .frame(egui::Frame::default().fill(egui::Color32::BLACK))
                .show(ctx, |ui| {
                    let available = ui.available_rect_before_wrap();
                    let Some(texture_id) = preview else {
                        return;
                    };
                    if frame_w == 0 || frame_h == 0 {
                        return;
                    }

                    // Fit the frame into the window, preserving aspect ratio
                    let scale = (available.width() / frame_w as f32).min(available.height() / frame_h as f32);
                    let rect = egui::Rect::from_center_size(
                        available.center(),
                        egui::vec2(frame_w as f32 * scale, frame_h as f32 * scale),
                    );

                    let painter = ui.painter_at(rect);
                    painter.image(
                        texture_id,
                        rect,
                        egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                        egui::Color32::WHITE,
                    );

                    for (text, (x, y)) in lines
                        .iter()
                        .zip([overlay::BRIGHTNESS_TEXT_POS, overlay::VOLUME_TEXT_POS])
                    {
                        painter.text(
                            rect.min + egui::vec2(x * scale, y * scale),
                            egui::Align2::LEFT_BOTTOM,
                            text,
                            egui::FontId::proportional(FEEDBACK_FONT_SIZE * scale),
                            text_color,
                        );
                    }
                });
        });

        self.egui_state.handle_platform_output(&self.window, full_output.platform_output);

        let paint_jobs = self.egui_ctx.tessellate(full_output.shapes, full_output.pixels_per_point);

        for (id, image_delta) in &full_output.textures_delta.set {
            self.egui_renderer.update_texture(&self.device, &self.queue, *id, image_delta);
        }

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: self.window.scale_factor() as f32,
        };

        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            encoder,
            &paint_jobs,
            &screen_descriptor,
        );

        {
            let render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let mut render_pass = render_pass.forget_lifetime();
            self.egui_renderer.render(&mut render_pass, &paint_jobs, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }
    }

    fn update_fps(&mut self) {
        self.frames_since_update += 1;

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f64();
        if elapsed >= 1.0 {
            self.fps = self.frames_since_update as f64 / elapsed;
            self.frames_since_update = 0;
            self.last_fps_update = now;
            log::debug!(
                "{:.1} fps, {} frames processed",
                self.fps,
                self.session.frames_processed()
            );
        }
    }
}
