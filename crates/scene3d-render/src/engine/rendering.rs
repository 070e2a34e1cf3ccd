use std::num::NonZeroU64;

use scene3d_core::{CameraState, LightingConfig};

use super::RenderEngine;
use crate::buffer::create_uniform_buffer;
use crate::error::{RenderError, RenderResult};
use crate::render_object::RenderObject;
use crate::transparency::TranslucentRecords;

/// Per-frame uniform block, bound at group 0 binding 0 by every pipeline.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub mvp: [[f32; 4]; 4],
    pub camera_right: [f32; 4],
    pub camera_up: [f32; 4],
    /// World-space direction towards the key light.
    pub light_dir: [f32; 4],
    pub camera_pos: [f32; 4],
    /// Ambient, diffuse, specular, shininess.
    pub lighting: [f32; 4],
}

impl FrameUniforms {
    /// Size of the block in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Builds the block for `camera` at `aspect_ratio`.
    #[must_use]
    pub fn new(camera: &CameraState, aspect_ratio: f32, lighting: &LightingConfig) -> Self {
        let right = camera.right();
        let up = camera.camera_up();
        let backward = -camera.forward();
        let [kr, ku, kb] = lighting.key_light;
        let light_dir = (right * kr + up * ku + backward * kb).normalize_or_zero();

        Self {
            mvp: camera.view_projection_matrix(aspect_ratio).to_cols_array_2d(),
            camera_right: right.extend(0.0).to_array(),
            camera_up: up.extend(0.0).to_array(),
            light_dir: light_dir.extend(0.0).to_array(),
            camera_pos: camera.position.extend(1.0).to_array(),
            lighting: [
                lighting.ambient,
                lighting.diffuse,
                lighting.specular,
                lighting.shininess,
            ],
        }
    }
}

impl RenderEngine {
    pub(crate) fn create_frame_bindings(
        device: &wgpu::Device,
        initial: &FrameUniforms,
    ) -> (wgpu::Buffer, wgpu::BindGroup, wgpu::PipelineLayout) {
        let buffer = create_uniform_buffer(device, initial, "frame uniforms");

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame bind group layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(FrameUniforms::SIZE),
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame bind group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("primitive pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        (buffer, bind_group, pipeline_layout)
    }

    /// Sets the camera used by the next visual and picking passes.
    pub fn set_camera(&mut self, camera: CameraState) {
        if self.camera != camera {
            self.camera = camera;
            self.update_frame_uniforms();
        }
    }

    /// Current camera.
    #[must_use]
    pub fn camera(&self) -> &CameraState {
        &self.camera
    }

    pub(crate) fn update_frame_uniforms(&self) {
        if self.is_destroyed() {
            return;
        }
        let uniforms = FrameUniforms::new(&self.camera, self.aspect_ratio(), &self.options.lighting);
        self.queue
            .write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&uniforms));
    }

    fn clear_color(&self) -> wgpu::Color {
        let [r, g, b, a] = self.options.background_color.map(f64::from);
        wgpu::Color { r, g, b, a }
    }

    /// Draws one frame: clears to the background color, then draws every
    /// valid render object.
    ///
    /// Windowed engines present to the surface; a lost or outdated surface is
    /// reconfigured and the frame skipped.
    pub fn render_frame(&mut self) -> RenderResult<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        if self.is_device_lost() {
            return Err(RenderError::DeviceLost);
        }

        self.sort_translucent();
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });

        if let Some(surface) = &self.surface {
            let frame = match surface.get_current_texture() {
                Ok(frame) => frame,
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    log::debug!("surface lost or outdated, reconfiguring");
                    surface.configure(&self.device, &self.surface_config);
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };
            let view = frame
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            self.encode_visual_pass(&mut encoder, &view);
            self.queue.submit(std::iter::once(encoder.finish()));
            frame.present();
        } else {
            let offscreen = self.offscreen.as_ref().ok_or(RenderError::NoOffscreenTarget)?;
            self.encode_visual_pass(&mut encoder, &offscreen.view);
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        Ok(())
    }

    fn encode_visual_pass(&self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("visual pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(self.clear_color()),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_bind_group(0, &self.frame_bind_group, &[]);
        for object in draw_order(&self.render_objects) {
            if object.is_drawable() {
                object.draw(&mut pass, false);
            }
        }
    }

    /// Re-sorts translucent instance records for the current eye position.
    fn sort_translucent(&mut self) {
        let eye = self.camera.position;
        for object in &mut self.render_objects {
            if let Some(records) = object.translucent.as_mut() {
                records.sort_for(&self.queue, eye);
            }
        }
    }

    /// Reads back the last frame of a headless engine as tightly packed RGBA.
    pub fn capture_frame(&self) -> RenderResult<Vec<u8>> {
        let offscreen = self.offscreen.as_ref().ok_or(RenderError::NoOffscreenTarget)?;
        let (width, height) = (self.width, self.height);
        let bytes_per_row = aligned_bytes_per_row(width);

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("capture buffer"),
            size: u64::from(bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("capture encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &offscreen.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());
        rx.recv()
            .map_err(|_| RenderError::BufferMapFailed)?
            .map_err(|_| RenderError::BufferMapFailed)?;

        let data = slice.get_mapped_range();
        let pixels = strip_row_padding(&data, width, height, bytes_per_row);
        drop(data);
        buffer.unmap();
        buffer.destroy();
        Ok(pixels)
    }
}

/// Opaque objects in list order, then translucent ones farthest first.
///
/// Distances are those of the last [`TranslucentRecords::sort_for`].
///
/// [`TranslucentRecords::sort_for`]: crate::transparency::TranslucentRecords::sort_for
#[must_use]
pub fn draw_order(objects: &[RenderObject]) -> Vec<&RenderObject> {
    let (mut translucent, mut ordered): (Vec<&RenderObject>, Vec<&RenderObject>) =
        objects.iter().partition(|object| object.translucent.is_some());
    translucent.sort_by(|a, b| distance(b).total_cmp(&distance(a)));
    ordered.extend(translucent);
    ordered
}

fn distance(object: &RenderObject) -> f32 {
    object
        .translucent
        .as_ref()
        .map_or(0.0, TranslucentRecords::distance)
}

/// Bytes per row of a `width`-pixel RGBA8 copy, padded to the copy alignment.
#[must_use]
pub fn aligned_bytes_per_row(width: u32) -> u32 {
    (width * 4).div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

fn strip_row_padding(data: &[u8], width: u32, height: u32, bytes_per_row: u32) -> Vec<u8> {
    let row_bytes = (width * 4) as usize;
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in data.chunks(bytes_per_row as usize).take(height as usize) {
        pixels.extend_from_slice(&row[..row_bytes]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_uniform_block_size() {
        assert_eq!(FrameUniforms::SIZE, 144);
    }

    #[test]
    fn test_uniforms_follow_camera() {
        let camera = CameraState::looking_at(Vec3::new(0.0, -10.0, 0.0), Vec3::ZERO);
        let uniforms = FrameUniforms::new(&camera, 1.0, &LightingConfig::default());

        assert_eq!(uniforms.camera_pos, [0.0, -10.0, 0.0, 1.0]);
        let right = Vec3::from_slice(&uniforms.camera_right[..3]);
        let up = Vec3::from_slice(&uniforms.camera_up[..3]);
        assert!((right - Vec3::X).length() < 1e-5);
        assert!((up - Vec3::Z).length() < 1e-5);
        assert_eq!(uniforms.lighting, [0.4, 0.6, 0.2, 20.0]);
    }

    #[test]
    fn test_key_light_faces_viewer() {
        let camera = CameraState::default();
        let uniforms = FrameUniforms::new(&camera, 1.0, &LightingConfig::default());
        let light = Vec3::from_slice(&uniforms.light_dir[..3]);
        assert!((light.length() - 1.0).abs() < 1e-5);
        // Towards the camera side of the scene
        assert!(light.dot(-camera.forward()) > 0.0);
    }

    #[test]
    fn test_aligned_bytes_per_row() {
        assert_eq!(aligned_bytes_per_row(1), 256);
        assert_eq!(aligned_bytes_per_row(64), 256);
        assert_eq!(aligned_bytes_per_row(65), 512);
    }

    #[test]
    fn test_strip_row_padding() {
        let mut data = vec![0u8; 512];
        data[..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        data[256..264].copy_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16]);
        let pixels = strip_row_padding(&data, 2, 2, 256);
        assert_eq!(pixels, (1..=16).collect::<Vec<u8>>());
    }
}
