//! Per-collection draw records.

use scene3d_core::PrimitiveKind;

use crate::dynamic_buffer::Allocation;
use crate::geometry::{GpuMesh, Vertex};
use crate::transparency::TranslucentRecords;

/// A vertex buffer binding: a byte range of a buffer plus its record stride.
#[derive(Debug, Clone)]
pub struct BufferSlice {
    pub buffer: wgpu::Buffer,
    pub offset: u64,
    /// Length in bytes, or `None` for "to the end of the buffer".
    pub size: Option<u64>,
    pub stride: u64,
}

impl BufferSlice {
    /// Binds the whole geometry vertex buffer.
    #[must_use]
    pub fn geometry(mesh: &GpuMesh) -> Self {
        Self {
            buffer: mesh.vertex_buffer.clone(),
            offset: 0,
            size: None,
            stride: Vertex::STRIDE,
        }
    }

    /// Binds a collection's instance records.
    #[must_use]
    pub fn instances(allocation: &Allocation, stride: u64) -> Self {
        Self {
            buffer: allocation.buffer.clone(),
            offset: allocation.offset,
            size: Some(allocation.size),
            stride,
        }
    }

    /// The wgpu slice to bind.
    #[must_use]
    pub fn slice(&self) -> wgpu::BufferSlice<'_> {
        match self.size {
            Some(size) => self.buffer.slice(self.offset..self.offset + size),
            None => self.buffer.slice(self.offset..),
        }
    }
}

/// Everything needed to draw one collection in either pass.
#[derive(Debug, Clone)]
pub struct RenderObject {
    pub kind: PrimitiveKind,
    /// Index of the source collection in the caller's list.
    pub component_index: usize,
    pub pipeline: Option<wgpu::RenderPipeline>,
    /// Geometry at slot 0, instance records at slot 1.
    pub vertex_buffers: Vec<BufferSlice>,
    pub index_buffer: Option<wgpu::Buffer>,
    pub index_count: u32,
    pub vertex_count: u32,
    /// Drawn instances; three per ellipsoid for axis rings.
    pub instance_count: u32,
    pub picking_pipeline: Option<wgpu::RenderPipeline>,
    pub picking_vertex_buffers: Vec<BufferSlice>,
    /// Picking records must be rebuilt before the next picking pass.
    pub picking_data_stale: bool,
    /// First pick ID of the collection, `None` if it is unpickable.
    pub base_id: Option<u32>,
    /// Sortable records of a collection drawn after the opaque ones.
    pub translucent: Option<TranslucentRecords>,
}

impl RenderObject {
    /// Returns true if the visual pass can draw this object.
    #[must_use]
    pub fn is_drawable(&self) -> bool {
        draw_is_valid(
            self.pipeline.is_some(),
            self.vertex_buffers.len(),
            self.instance_count,
            self.index_buffer.as_ref().map(|_| self.index_count),
            self.vertex_count,
        )
    }

    /// Returns true if the picking pass can draw this object.
    #[must_use]
    pub fn is_pickable(&self) -> bool {
        !self.picking_data_stale
            && draw_is_valid(
                self.picking_pipeline.is_some(),
                self.picking_vertex_buffers.len(),
                self.instance_count,
                self.index_buffer.as_ref().map(|_| self.index_count),
                self.vertex_count,
            )
    }

    /// Records the draw on `pass` using either the visual or picking bindings.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, picking: bool) {
        let (pipeline, buffers) = if picking {
            (self.picking_pipeline.as_ref(), &self.picking_vertex_buffers)
        } else {
            (self.pipeline.as_ref(), &self.vertex_buffers)
        };
        let Some(pipeline) = pipeline else {
            return;
        };
        pass.set_pipeline(pipeline);
        for (slot, binding) in buffers.iter().enumerate() {
            pass.set_vertex_buffer(slot as u32, binding.slice());
        }
        match &self.index_buffer {
            Some(index_buffer) => {
                pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..self.index_count, 0, 0..self.instance_count);
            }
            None => pass.draw(0..self.vertex_count, 0..self.instance_count),
        }
    }
}

/// Draw validity: a pipeline, exactly two vertex bindings, at least one
/// instance, and something to draw per instance.
#[must_use]
pub fn draw_is_valid(
    has_pipeline: bool,
    vertex_buffer_count: usize,
    instance_count: u32,
    index_count: Option<u32>,
    vertex_count: u32,
) -> bool {
    let per_instance = match index_count {
        Some(count) => count > 0,
        None => vertex_count > 0,
    };
    has_pipeline && vertex_buffer_count == 2 && instance_count > 0 && per_instance
}
