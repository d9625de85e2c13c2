//! Error type shared by every fallible operation in the crate.

/// Errors raised while building or running the surface reconstruction pipeline.
///
/// Nothing here is recoverable inside the pipeline itself: a failed frame
/// leaves intermediate targets stale and the caller decides whether to skip
/// rendering or abort.
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    /// A WGSL module or its render pipeline failed validation.
    #[error("shader program '{label}' failed to compile: {message}")]
    ShaderCompilation { label: String, message: String },

    /// A texture, buffer or view could not be created.
    #[error("failed to allocate '{label}': {message}")]
    ResourceAllocation { label: String, message: String },

    /// Render dimensions were zero or larger than the device allows.
    #[error("invalid render dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// The particle buffer cannot hold the requested number of records.
    #[error("particle buffer holds {available} bytes but {required} are required")]
    ParticleBufferTooSmall { required: u64, available: u64 },

    /// The first particle record does not start on a vertex-aligned byte.
    #[error("particle buffer offset {offset} is not a multiple of {alignment}")]
    ParticleBufferOffset { offset: u64, alignment: u64 },

    /// The particle buffer was not created with `VERTEX` usage.
    #[error("particle buffer must be created with VERTEX usage")]
    ParticleBufferUsage,

    /// A uniform name that the program does not declare.
    #[error("program '{program}' has no uniform named '{name}'")]
    UnknownUniform { program: String, name: String },

    /// A uniform was written with a value of the wrong type.
    #[error("uniform '{name}' expects {expected:?}, got {actual:?}")]
    UniformKindMismatch {
        name: String,
        expected: crate::program::UniformKind,
        actual: crate::program::UniformKind,
    },

    /// No adapter matched the request.
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    /// The adapter refused to create a device.
    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    /// The window surface could not be created.
    #[error("failed to create window surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
}
