use super::RenderEngine;
use crate::buffer::create_readback_buffer;
use crate::primitive::{DEPTH_FORMAT, PICK_FORMAT};

/// Headless color target.
pub(crate) struct OffscreenTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// Offscreen ID target, its depth buffer and the one-pixel readback buffer.
pub(crate) struct PickTargets {
    pub color: wgpu::Texture,
    pub color_view: wgpu::TextureView,
    pub depth: wgpu::Texture,
    pub depth_view: wgpu::TextureView,
    pub readback: wgpu::Buffer,
    pub size: (u32, u32),
}

impl PickTargets {
    pub fn destroy(&self) {
        self.color.destroy();
        self.depth.destroy();
        self.readback.destroy();
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn create_target(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: extent(width, height),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

impl RenderEngine {
    pub(crate) fn create_depth_texture(
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> (wgpu::Texture, wgpu::TextureView) {
        create_target(
            device,
            "depth texture",
            width,
            height,
            DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        )
    }

    pub(crate) fn create_offscreen_target(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> OffscreenTarget {
        let (texture, view) = create_target(
            device,
            "offscreen color texture",
            width,
            height,
            format,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        );
        OffscreenTarget { texture, view }
    }

    pub(crate) fn create_pick_targets(device: &wgpu::Device, width: u32, height: u32) -> PickTargets {
        // Rgba8Unorm so IDs survive without color conversion
        let (color, color_view) = create_target(
            device,
            "pick texture",
            width,
            height,
            PICK_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        );
        let (depth, depth_view) = create_target(
            device,
            "pick depth texture",
            width,
            height,
            DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        );
        PickTargets {
            color,
            color_view,
            depth,
            depth_view,
            readback: create_readback_buffer(device),
            size: (width, height),
        }
    }

    /// Recreates every size-dependent target at the current dimensions.
    pub(crate) fn recreate_targets(&mut self) {
        let (width, height) = (self.width, self.height);

        self.depth_texture.destroy();
        let (depth_texture, depth_view) = Self::create_depth_texture(&self.device, width, height);
        self.depth_texture = depth_texture;
        self.depth_view = depth_view;

        if let Some(old) = self.offscreen.take() {
            old.texture.destroy();
            self.offscreen = Some(Self::create_offscreen_target(
                &self.device,
                width,
                height,
                self.surface_config.format,
            ));
        }

        // The readback buffer may still be mapped by a superseded pick, so it
        // is dropped rather than destroyed.
        if let Some(old) = self.pick_targets.take() {
            old.color.destroy();
            old.depth.destroy();
        }
        self.pick_targets = Some(Self::create_pick_targets(&self.device, width, height));
    }

    /// Size of the current pick targets.
    #[must_use]
    pub fn pick_target_size(&self) -> Option<(u32, u32)> {
        self.pick_targets.as_ref().map(|targets| targets.size)
    }
}
