//! Rendering error types.

use thiserror::Error;

/// Errors that can occur during rendering operations.
#[derive(Error, Debug)]
pub enum RenderError {
    /// No compatible graphics adapter.
    #[error("failed to create graphics adapter")]
    AdapterCreationFailed,

    /// Failed to create wgpu device.
    #[error("failed to create graphics device: {0}")]
    DeviceCreationFailed(#[from] wgpu::RequestDeviceError),

    /// Failed to create surface.
    #[error("failed to create surface: {0}")]
    SurfaceCreationFailed(#[from] wgpu::CreateSurfaceError),

    /// The surface reported no usable configuration.
    #[error("surface configuration failed")]
    SurfaceConfigurationFailed,

    /// Pipeline creation failed.
    #[error("pipeline creation failed for {kind}: {message}")]
    PipelineCreationFailed { kind: String, message: String },

    /// Buffer creation or write failed.
    #[error("buffer creation failed: {0}")]
    BufferCreationFailed(String),

    /// Surface lost.
    #[error("surface lost")]
    SurfaceLost,

    /// Surface outdated.
    #[error("surface outdated")]
    SurfaceOutdated,

    /// Out of memory.
    #[error("out of memory")]
    OutOfMemory,

    /// Timeout waiting for GPU.
    #[error("timeout waiting for GPU")]
    Timeout,

    /// The device was lost and must be recreated.
    #[error("graphics device lost")]
    DeviceLost,

    /// Readback buffer mapping failed.
    #[error("GPU buffer mapping failed")]
    BufferMapFailed,

    /// Operation needs the offscreen target of a headless engine.
    #[error("no offscreen target; engine is windowed")]
    NoOffscreenTarget,
}

impl From<wgpu::SurfaceError> for RenderError {
    fn from(err: wgpu::SurfaceError) -> Self {
        match err {
            wgpu::SurfaceError::Timeout => RenderError::Timeout,
            wgpu::SurfaceError::Outdated => RenderError::SurfaceOutdated,
            wgpu::SurfaceError::OutOfMemory => RenderError::OutOfMemory,
            _ => RenderError::SurfaceLost,
        }
    }
}

/// A specialized Result type for rendering operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;
