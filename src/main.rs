//! Demo: a static blob of particles rendered as liquid under an orbiting camera.
//!
//! Run with `RUST_LOG=fluid_surface=debug cargo run` to watch target
//! reallocation while resizing the window.

use std::sync::Arc;
use std::time::Instant;

use glam::Vec3;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use fluid_surface::{
    Camera, GpuContext, Particle, ParticleBatch, SurfaceConfig, SurfaceError,
    SurfaceReconstruction, WindowSurface, create_particle_buffer,
};

const BACKGROUND: wgpu::Color = wgpu::Color {
    r: 0.06,
    g: 0.06,
    b: 0.09,
    a: 1.0,
};

/// Window settings for the demo.
struct AppConfig {
    title: String,
    width: u32,
    height: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Fluid Surface".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

impl AppConfig {
    fn new() -> Self {
        Self::default()
    }

    fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

/// A droplet of particles on a jittered lattice inside a unit sphere.
///
/// Deterministic so every run shows the same shape.
fn particle_blob(spacing: f32) -> Vec<Particle> {
    let steps = (1.0 / spacing).ceil() as i32;
    let mut seed: u32 = 0x9e37_79b9;
    let mut jitter = move || {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        (seed as f32 / u32::MAX as f32 - 0.5) * spacing * 0.5
    };

    let mut particles = Vec::new();
    for x in -steps..=steps {
        for y in -steps..=steps {
            for z in -steps..=steps {
                let p = Vec3::new(x as f32, y as f32, z as f32) * spacing;
                // Flatten the bottom so it reads as a puddle-shaped drop.
                if p.length() > 1.0 || p.y < -0.6 {
                    continue;
                }
                particles.push(Particle::new(p.x + jitter(), p.y + jitter(), p.z + jitter()));
            }
        }
    }
    particles
}

struct DemoState {
    window: Arc<Window>,
    gpu: GpuContext,
    surface: WindowSurface,
    fluid: SurfaceReconstruction,
    particles: wgpu::Buffer,
    particle_count: u32,
}

impl DemoState {
    fn new(window: Arc<Window>) -> Result<Self, SurfaceError> {
        let (gpu, surface) = WindowSurface::new(window.clone())?;

        let config = SurfaceConfig::new()
            .target_format(surface.config.format)
            .particle_radius(0.06)
            .depth_blur_spread(1.5);
        let fluid = SurfaceReconstruction::new(&gpu, config)?;

        let blob = particle_blob(0.07);
        let particles = create_particle_buffer(&gpu, "Demo Particles", &blob);
        log::info!("demo blob has {} particles", blob.len());

        Ok(Self {
            window,
            gpu,
            surface,
            fluid,
            particles,
            particle_count: blob.len() as u32,
        })
    }

    fn redraw(&mut self, time: f32) -> Result<(), SurfaceError> {
        let frame = match self.surface.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let (width, height) = (self.surface.width(), self.surface.height());
                self.surface.resize(&self.gpu, width, height);
                return Ok(());
            }
            Err(err) => {
                log::warn!("skipping frame: {err}");
                return Ok(());
            }
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let camera = Camera::new()
            .with_fov(50.0)
            .orbiting(Vec3::ZERO, 3.2, time * 0.3, 0.35);
        self.fluid
            .set_camera(&self.gpu, &camera, self.surface.aspect())?;

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Demo Frame"),
            });

        // Clear only; the fluid composite blends over it.
        drop(encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Background"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(BACKGROUND),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        }));

        self.fluid.render(
            &self.gpu,
            &mut encoder,
            &view,
            &ParticleBatch::new(&self.particles, self.particle_count),
            self.surface.width(),
            self.surface.height(),
        )?;

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }
}

struct App {
    config: AppConfig,
    state: Option<DemoState>,
    start_time: Instant,
}

impl App {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            state: None,
            start_time: Instant::now(),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("failed to create window: {err}");
                event_loop.exit();
                return;
            }
        };

        match DemoState::new(window) {
            Ok(state) => self.state = Some(state),
            Err(err) => {
                log::error!("failed to initialize renderer: {err}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(state) = &mut self.state else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                state.surface.resize(&state.gpu, size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                let time = self.start_time.elapsed().as_secs_f32();
                if let Err(err) = state.redraw(time) {
                    log::error!("frame failed: {err}");
                }
                state.window.request_redraw();
            }
            _ => (),
        }
    }
}

fn main() -> Result<(), winit::error::EventLoopError> {
    env_logger::init();

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(AppConfig::new().title("Fluid Surface").size(1280, 720));
    event_loop.run_app(&mut app)
}
