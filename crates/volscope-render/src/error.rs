//! Rendering error types.

use thiserror::Error;

/// Errors that can occur during rendering operations.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Failed to create wgpu adapter.
    #[error("failed to create graphics adapter")]
    AdapterCreationFailed,

    /// Failed to create wgpu device.
    #[error("failed to create graphics device: {0}")]
    DeviceCreationFailed(#[from] wgpu::RequestDeviceError),

    /// Failed to create surface.
    #[error("failed to create surface: {0}")]
    SurfaceCreationFailed(#[from] wgpu::CreateSurfaceError),

    /// No surface format is compatible with the adapter.
    #[error("surface configuration failed")]
    SurfaceConfigurationFailed,

    /// Acquiring the next surface image failed.
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    /// Shader compilation failed.
    #[error("shader compilation failed: {0}")]
    ShaderCompilationFailed(String),

    /// The device was lost; every GPU resource created from it is invalid.
    #[error("graphics device lost: {0}")]
    DeviceLost(String),

    /// A texture upload row stride is not a multiple of the copy alignment.
    #[error("row stride of {bytes_per_row} bytes is not a multiple of {alignment}")]
    UnalignedRowStride { bytes_per_row: u32, alignment: u32 },

    /// The camera projection cannot be used to generate volume rays.
    #[error("unsupported camera: {0}")]
    UnsupportedCamera(String),

    /// Waiting on the device did not complete.
    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),

    /// Mapping a read-back buffer failed.
    #[error("buffer map failed")]
    BufferMapFailed,

    /// A surface target was drawn to before a frame was acquired.
    #[error("no surface frame acquired")]
    NoFrame,

    /// Saving a captured image failed.
    #[error(transparent)]
    Screenshot(#[from] crate::screenshot::ScreenshotError),

    /// A render call needs a volume but none is bound.
    #[error("no volume bound to renderer")]
    NoVolume,

    /// Error from the core crate.
    #[error(transparent)]
    Core(#[from] volscope_core::VolscopeError),
}

/// A specialized Result type for rendering operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_error_converts() {
        let err = RenderError::from(wgpu::PollError::Timeout);
        assert!(matches!(err, RenderError::Poll(_)));
        assert!(err.to_string().starts_with("device poll failed"));
    }
}
