//! WGSL sources and module assembly.
//!
//! Every primitive shader is the shared frame chunk (uniform block, shading,
//! pick color encoding) followed by the kind's own vertex/fragment stages.

use scene3d_core::PrimitiveKind;

use crate::error::{RenderError, RenderResult};

/// Uniform block, lighting and pick color helpers shared by every kind.
pub const COMMON_WGSL: &str = include_str!("shaders/common.wgsl");

/// Returns the kind-specific WGSL chunk.
#[must_use]
pub fn kind_source(kind: PrimitiveKind) -> &'static str {
    match kind {
        PrimitiveKind::PointCloud => include_str!("shaders/point_cloud.wgsl"),
        PrimitiveKind::Ellipsoid => include_str!("shaders/ellipsoid.wgsl"),
        PrimitiveKind::EllipsoidAxes => include_str!("shaders/ellipsoid_axes.wgsl"),
        PrimitiveKind::Cuboid => include_str!("shaders/cuboid.wgsl"),
    }
}

/// Builder that concatenates WGSL chunks into one shader module.
#[derive(Debug, Default, Clone)]
pub struct ShaderBuilder {
    chunks: Vec<&'static str>,
    label: Option<String>,
}

impl ShaderBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a builder with the common chunk followed by the kind chunk.
    #[must_use]
    pub fn for_kind(kind: PrimitiveKind) -> Self {
        Self::new()
            .with_chunk(COMMON_WGSL)
            .with_chunk(kind_source(kind))
            .with_label(format!("{kind} shader"))
    }

    /// Appends a WGSL chunk.
    #[must_use]
    pub fn with_chunk(mut self, source: &'static str) -> Self {
        self.chunks.push(source);
        self
    }

    /// Sets the shader label for debugging.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Joins the chunks in order.
    pub fn combined_source(&self) -> RenderResult<String> {
        if self.chunks.is_empty() {
            return Err(RenderError::PipelineCreationFailed {
                kind: self.label.clone().unwrap_or_default(),
                message: "no shader source".into(),
            });
        }
        Ok(self.chunks.join("\n\n"))
    }

    /// Builds the shader module.
    pub fn build_module(&self, device: &wgpu::Device) -> RenderResult<wgpu::ShaderModule> {
        let source = self.combined_source()?;
        Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: self.label.as_deref(),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        }))
    }
}
