//! Core GPU context and device management.
//!
//! This module provides [`GpuContext`], the device/queue pair every pass in the
//! crate records against, and [`WindowSurface`], the presentable surface used by
//! the demo binary. The reconstruction pipeline itself never touches a surface:
//! it renders into whatever texture view the caller hands it, so it runs the same
//! way headless (tests, offline capture) and on screen.
//!
//! # Example
//!
//! ```no_run
//! use fluid_surface::GpuContext;
//!
//! let gpu = GpuContext::headless()?;
//! let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
//!     label: Some("My Buffer"),
//!     size: 1024,
//!     usage: wgpu::BufferUsages::UNIFORM,
//!     mapped_at_creation: false,
//! });
//! gpu.queue.write_buffer(&buffer, 0, &[0u8; 1024]);
//! # Ok::<(), fluid_surface::SurfaceError>(())
//! ```

use std::sync::Arc;
use winit::window::Window;

use crate::error::SurfaceError;

/// Core GPU context holding the logical device and its queue.
///
/// All fields are public to allow direct access to wgpu APIs when needed.
/// The context is created once at startup and passed by reference to every
/// pass and resource constructor.
pub struct GpuContext {
    /// The logical GPU device for creating resources and pipelines.
    pub device: wgpu::Device,
    /// The command queue for submitting work to the GPU.
    pub queue: wgpu::Queue,
    /// The adapter the device was created from.
    pub adapter: wgpu::Adapter,
}

impl GpuContext {
    /// Create a context with no presentation surface.
    ///
    /// Used by tests and offline rendering. Fails with [`SurfaceError::Adapter`]
    /// when the machine has no usable adapter.
    pub fn headless() -> Result<Self, SurfaceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        pollster::block_on(Self::request(&instance, None))
    }

    /// Request an adapter and device, optionally compatible with `surface`.
    pub async fn request(
        instance: &wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<Self, SurfaceError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await?;

        let adapter_info = adapter.get_info();
        log::info!(
            "using adapter '{}' ({:?})",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Fluid Surface Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: Default::default(),
                experimental_features: Default::default(),
            })
            .await?;

        Ok(Self {
            device,
            queue,
            adapter,
        })
    }

    /// Run `f` inside validation and out-of-memory error scopes.
    ///
    /// wgpu reports creation failures asynchronously through error scopes rather
    /// than return values. This turns them back into a `Result` so construction
    /// and resize failures propagate to the caller instead of hitting the
    /// device's uncaptured-error handler.
    pub(crate) fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let value = f(&self.device);

        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());

        match validation.or(out_of_memory) {
            Some(error) => Err(error.to_string()),
            None => Ok(value),
        }
    }
}

/// A window surface configured for presentation.
pub struct WindowSurface {
    /// The surface for presenting rendered frames to the window.
    pub surface: wgpu::Surface<'static>,
    /// Current surface configuration (format, size, present mode).
    pub config: wgpu::SurfaceConfiguration,
}

impl WindowSurface {
    /// Create a GPU context and a configured surface for `window`.
    ///
    /// Picks an sRGB format when the surface offers one and uses Fifo
    /// presentation.
    pub fn new(window: Arc<Window>) -> Result<(GpuContext, Self), SurfaceError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window)?;
        let gpu = pollster::block_on(GpuContext::request(&instance, Some(&surface)))?;

        let surface_caps = surface.get_capabilities(&gpu.adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(wgpu::TextureFormat::Bgra8UnormSrgb);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &config);

        Ok((gpu, Self { surface, config }))
    }

    /// Resize the surface to new dimensions.
    ///
    /// Ignores zero-sized dimensions, which occur while the window is minimized.
    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&gpu.device, &self.config);
        } else {
            log::warn!("ignoring zero-sized surface resize to {width}x{height}");
        }
    }

    /// Returns the current surface width in pixels.
    pub fn width(&self) -> u32 {
        self.config.width
    }

    /// Returns the current surface height in pixels.
    pub fn height(&self) -> u32 {
        self.config.height
    }

    /// Returns the current aspect ratio (width / height).
    pub fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height as f32
    }
}
