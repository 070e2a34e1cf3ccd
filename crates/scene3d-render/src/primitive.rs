//! The primitive registry: one stateless [`PrimitiveSpec`] per kind.
//!
//! A [`PrimitiveSpec`] knows a kind's record layouts, how it is drawn (mesh,
//! culling, topology), how to compile its two pipelines and how to assemble a
//! [`RenderObject`]. Dispatch goes through [`spec_for`], which matches on the
//! closed [`PrimitiveKind`] enum.

use scene3d_core::layout::RecordLayout;
use scene3d_core::{PrimitiveCollection, PrimitiveKind};

use crate::dynamic_buffer::Allocation;
use crate::error::{RenderError, RenderResult};
use crate::geometry::{GeometryKind, GpuMesh, Vertex};
use crate::pipeline_cache::{DeviceId, PassKind, PipelineCache};
use crate::render_object::{BufferSlice, RenderObject};
use crate::shader::ShaderBuilder;

/// Format of the offscreen picking color target.
pub const PICK_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Format of both depth targets.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

/// Shader locations of the instance fields. Geometry uses 0 and 1.
pub mod location {
    pub const POSITION: u32 = 2;
    pub const SIZE: u32 = 3;
    pub const COLOR: u32 = 4;
    pub const ALPHA: u32 = 5;
    pub const PICK_ID: u32 = 6;
}

/// How a kind is rasterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderConfig {
    pub cull_mode: Option<wgpu::Face>,
    pub topology: wgpu::PrimitiveTopology,
    pub geometry: GeometryKind,
}

/// Device state a pipeline factory needs.
pub struct PipelineContext<'a> {
    pub device: &'a wgpu::Device,
    pub device_id: DeviceId,
    /// Layout binding the frame uniform block at group 0.
    pub layout: &'a wgpu::PipelineLayout,
    /// Format of the visual color target.
    pub color_format: wgpu::TextureFormat,
}

/// Per-kind contract used by the render-object builder and the picking pass.
pub trait PrimitiveSpec: Sync {
    /// The primitive kind handled here.
    fn kind(&self) -> PrimitiveKind;

    /// Rasterization settings.
    fn render_config(&self) -> RenderConfig;

    /// Logical instances in `collection`; malformed collections count as 0.
    fn count(&self, collection: &PrimitiveCollection) -> usize {
        collection.validate().unwrap_or(0)
    }

    /// Visual record layout.
    fn render_layout(&self) -> &'static RecordLayout {
        self.kind().render_layout()
    }

    /// Picking record layout.
    fn picking_layout(&self) -> &'static RecordLayout {
        self.kind().picking_layout()
    }

    /// Packed visual records, or `None` if there is nothing to draw.
    fn build_render_data(&self, collection: &PrimitiveCollection) -> Option<Vec<f32>> {
        collection.build_render_data()
    }

    /// Packed picking records numbered from `base_id`.
    fn build_picking_data(&self, collection: &PrimitiveCollection, base_id: u32) -> Option<Vec<f32>> {
        collection.build_picking_data(base_id)
    }

    /// Cached pipeline for `pass`, compiled on first use per device.
    fn get_pipeline(
        &self,
        ctx: &PipelineContext<'_>,
        cache: &mut PipelineCache<wgpu::RenderPipeline>,
        pass: PassKind,
    ) -> RenderResult<wgpu::RenderPipeline> {
        cache.get_or_try_insert_with((self.kind(), pass), ctx.device_id, || {
            create_pipeline(self, ctx, pass)
        })
    }

    /// Fragment entry point of the picking pass.
    fn pick_fragment_entry(&self) -> &'static str {
        "fs_pick"
    }

    /// Assembles the draw record for a collection whose visual records
    /// were written to `instances`.
    fn create_render_object(
        &self,
        component_index: usize,
        mesh: &GpuMesh,
        pipeline: Option<wgpu::RenderPipeline>,
        instances: &Allocation,
        count: usize,
        base_id: Option<u32>,
    ) -> RenderObject {
        RenderObject {
            kind: self.kind(),
            component_index,
            pipeline,
            vertex_buffers: vec![
                BufferSlice::geometry(mesh),
                BufferSlice::instances(instances, self.render_layout().stride_bytes()),
            ],
            index_buffer: Some(mesh.index_buffer.clone()),
            index_count: mesh.index_count,
            vertex_count: 0,
            instance_count: (count * self.kind().records_per_instance()) as u32,
            picking_pipeline: None,
            picking_vertex_buffers: Vec::new(),
            picking_data_stale: true,
            base_id,
            translucent: None,
        }
    }
}

/// Billboard points.
#[derive(Debug)]
pub struct PointCloudSpec;

/// Shaded ellipsoids.
#[derive(Debug)]
pub struct EllipsoidSpec;

/// Axis rings, three records per ellipsoid.
#[derive(Debug)]
pub struct EllipsoidAxesSpec;

/// Boxes.
#[derive(Debug)]
pub struct CuboidSpec;

impl PrimitiveSpec for PointCloudSpec {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::PointCloud
    }

    // Clips the quad to the disc drawn by the visual pass
    fn pick_fragment_entry(&self) -> &'static str {
        "fs_pick_point"
    }

    fn render_config(&self) -> RenderConfig {
        RenderConfig {
            cull_mode: None,
            topology: wgpu::PrimitiveTopology::TriangleList,
            geometry: GeometryKind::Quad,
        }
    }
}

impl PrimitiveSpec for EllipsoidSpec {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Ellipsoid
    }

    fn render_config(&self) -> RenderConfig {
        RenderConfig {
            cull_mode: Some(wgpu::Face::Back),
            topology: wgpu::PrimitiveTopology::TriangleList,
            geometry: GeometryKind::Sphere,
        }
    }
}

impl PrimitiveSpec for EllipsoidAxesSpec {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::EllipsoidAxes
    }

    fn render_config(&self) -> RenderConfig {
        RenderConfig {
            cull_mode: None,
            topology: wgpu::PrimitiveTopology::TriangleList,
            geometry: GeometryKind::Torus,
        }
    }
}

impl PrimitiveSpec for CuboidSpec {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Cuboid
    }

    fn render_config(&self) -> RenderConfig {
        RenderConfig {
            cull_mode: None,
            topology: wgpu::PrimitiveTopology::TriangleList,
            geometry: GeometryKind::Cube,
        }
    }
}

/// Returns the registered [`PrimitiveSpec`] for `kind`.
#[must_use]
pub fn spec_for(kind: PrimitiveKind) -> &'static dyn PrimitiveSpec {
    match kind {
        PrimitiveKind::PointCloud => &PointCloudSpec,
        PrimitiveKind::Ellipsoid => &EllipsoidSpec,
        PrimitiveKind::EllipsoidAxes => &EllipsoidAxesSpec,
        PrimitiveKind::Cuboid => &CuboidSpec,
    }
}

/// Vertex attributes of the instance buffer (slot 1) for `layout`.
#[must_use]
pub fn instance_attributes(layout: &RecordLayout) -> Vec<wgpu::VertexAttribute> {
    const F32: u64 = std::mem::size_of::<f32>() as u64;

    let mut attributes = vec![wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: 0,
        shader_location: location::POSITION,
    }];
    if let Some((offset, components)) = layout.size {
        attributes.push(wgpu::VertexAttribute {
            format: if components == 1 {
                wgpu::VertexFormat::Float32
            } else {
                wgpu::VertexFormat::Float32x3
            },
            offset: offset as u64 * F32,
            shader_location: location::SIZE,
        });
    }
    if let Some(offset) = layout.color {
        attributes.push(wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x3,
            offset: offset as u64 * F32,
            shader_location: location::COLOR,
        });
    }
    if let Some(offset) = layout.alpha {
        attributes.push(wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32,
            offset: offset as u64 * F32,
            shader_location: location::ALPHA,
        });
    }
    if let Some(offset) = layout.pick_id {
        attributes.push(wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32,
            offset: offset as u64 * F32,
            shader_location: location::PICK_ID,
        });
    }
    attributes
}

/// Compiles one pipeline inside a validation error scope.
fn create_pipeline<S: PrimitiveSpec + ?Sized>(
    spec: &S,
    ctx: &PipelineContext<'_>,
    pass: PassKind,
) -> RenderResult<wgpu::RenderPipeline> {
    let kind = spec.kind();
    let config = spec.render_config();
    let (layout, vs_entry, fs_entry, target) = match pass {
        PassKind::Render | PassKind::Translucent => (
            spec.render_layout(),
            "vs_main",
            "fs_main",
            wgpu::ColorTargetState {
                format: ctx.color_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            },
        ),
        PassKind::Picking => (
            spec.picking_layout(),
            "vs_pick",
            spec.pick_fragment_entry(),
            wgpu::ColorTargetState {
                format: PICK_FORMAT,
                blend: None, // IDs must be written exactly
                write_mask: wgpu::ColorWrites::ALL,
            },
        ),
    };
    let attributes = instance_attributes(layout);
    let buffers = [
        Vertex::layout(),
        wgpu::VertexBufferLayout {
            array_stride: layout.stride_bytes(),
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &attributes,
        },
    ];
    let label = format!("{kind} {pass:?} pipeline");

    ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = ShaderBuilder::for_kind(kind)
        .build_module(ctx.device)
        .map(|module| {
            ctx.device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(&label),
                    layout: Some(ctx.layout),
                    vertex: wgpu::VertexState {
                        module: &module,
                        entry_point: Some(vs_entry),
                        buffers: &buffers,
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &module,
                        entry_point: Some(fs_entry),
                        targets: &[Some(target)],
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: config.topology,
                        cull_mode: config.cull_mode,
                        ..wgpu::PrimitiveState::default()
                    },
                    depth_stencil: Some(wgpu::DepthStencilState {
                        format: DEPTH_FORMAT,
                        depth_write_enabled: pass != PassKind::Translucent,
                        depth_compare: wgpu::CompareFunction::Less,
                        stencil: wgpu::StencilState::default(),
                        bias: wgpu::DepthBiasState::default(),
                    }),
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                    cache: None,
                })
        });
    let scope_error = pollster::block_on(ctx.device.pop_error_scope());

    let pipeline = pipeline?;
    if let Some(error) = scope_error {
        return Err(RenderError::PipelineCreationFailed {
            kind: kind.to_string(),
            message: error.to_string(),
        });
    }
    log::debug!("compiled {label}");
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene3d_core::{Cuboid, PointCloud};

    fn locations(attributes: &[wgpu::VertexAttribute]) -> Vec<(u32, u64)> {
        attributes
            .iter()
            .map(|a| (a.shader_location, a.offset))
            .collect()
    }

    #[test]
    fn test_spec_for_matches_kind() {
        for kind in PrimitiveKind::ALL {
            assert_eq!(spec_for(kind).kind(), kind);
        }
    }

    #[test]
    fn test_render_configs() {
        assert_eq!(spec_for(PrimitiveKind::PointCloud).render_config().cull_mode, None);
        assert_eq!(
            spec_for(PrimitiveKind::Ellipsoid).render_config().cull_mode,
            Some(wgpu::Face::Back)
        );
        assert_eq!(
            spec_for(PrimitiveKind::EllipsoidAxes).render_config().geometry,
            GeometryKind::Torus
        );
        assert_eq!(
            spec_for(PrimitiveKind::Cuboid).render_config().geometry,
            GeometryKind::Cube
        );
    }

    #[test]
    fn test_point_attributes() {
        let spec = spec_for(PrimitiveKind::PointCloud);
        assert_eq!(
            locations(&instance_attributes(spec.render_layout())),
            vec![(2, 0), (3, 28), (4, 12), (5, 24)]
        );
        assert_eq!(
            locations(&instance_attributes(spec.picking_layout())),
            vec![(2, 0), (3, 16), (6, 12)]
        );
    }

    #[test]
    fn test_solid_attributes() {
        let spec = spec_for(PrimitiveKind::Cuboid);
        let render = instance_attributes(spec.render_layout());
        assert_eq!(locations(&render), vec![(2, 0), (3, 12), (4, 24), (5, 36)]);
        assert_eq!(render[1].format, wgpu::VertexFormat::Float32x3);

        let picking = instance_attributes(spec.picking_layout());
        assert_eq!(locations(&picking), vec![(2, 0), (3, 12), (6, 24)]);
    }

    #[test]
    fn test_attributes_fit_inside_stride() {
        for kind in PrimitiveKind::ALL {
            let spec = spec_for(kind);
            for layout in [spec.render_layout(), spec.picking_layout()] {
                for attribute in instance_attributes(layout) {
                    assert!(attribute.offset + attribute.format.size() <= layout.stride_bytes());
                }
            }
        }
    }

    #[test]
    fn test_pick_fragment_entries_exist() {
        assert_eq!(spec_for(PrimitiveKind::PointCloud).pick_fragment_entry(), "fs_pick_point");
        for kind in PrimitiveKind::ALL {
            let entry = spec_for(kind).pick_fragment_entry();
            let source = ShaderBuilder::for_kind(kind).combined_source().unwrap();
            assert!(source.contains(&format!("fn {entry}(")), "{kind} missing {entry}");
        }
    }

    #[test]
    fn test_count_and_builders_delegate() {
        let spec = spec_for(PrimitiveKind::Cuboid);
        let boxes: PrimitiveCollection = Cuboid::new(vec![0.0; 6]).into();
        assert_eq!(spec.count(&boxes), 2);
        assert_eq!(spec.build_render_data(&boxes).map(|d| d.len()), Some(20));

        let bad: PrimitiveCollection = PointCloud::new(vec![0.0; 4]).into();
        assert_eq!(spec_for(PrimitiveKind::PointCloud).count(&bad), 0);
    }
}
