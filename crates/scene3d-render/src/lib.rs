//! Rendering backend for scene3d-rs.
//!
//! This crate provides the wgpu engine that draws primitive collections as
//! instanced meshes and resolves pointer picks, including:
//! - the static geometry library and the per-kind [`PrimitiveSpec`] registry
//! - the pipeline cache and the growable instance buffers
//! - the visual pass with back-to-front translucency, the offscreen picking
//!   pass and frame capture

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Viewport sizes and instance counts fit comfortably in f32/u32
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::must_use_candidate)]

pub mod buffer;
pub mod dynamic_buffer;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod pipeline_cache;
pub mod primitive;
pub mod render_object;
pub mod screenshot;
pub mod shader;
pub mod transparency;

pub use dynamic_buffer::{required_capacity, DynamicBuffers};
pub use engine::{
    pixel_in_viewport, FrameUniforms, PickPoll, PickRequest, PickResolution, RenderEngine,
    OFFSCREEN_FORMAT,
};
pub use error::{RenderError, RenderResult};
pub use geometry::{GeometryKind, MeshData, Vertex};
pub use pipeline_cache::{DeviceId, PassKind, PipelineCache};
pub use primitive::{spec_for, PrimitiveSpec, RenderConfig};
pub use render_object::RenderObject;
pub use screenshot::{encode_png, save_image, ScreenshotError};
pub use shader::ShaderBuilder;
