//! The instanced rendering and picking engine.

mod pick;
mod rendering;
mod scene;
mod textures;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use scene3d_core::{
    CameraState, EngineOptions, HoverTracker, IdMapping, PickGate, PowerMode, PrimitiveCollection,
};

use crate::dynamic_buffer::DynamicBuffers;
use crate::error::{RenderError, RenderResult};
use crate::geometry::GeometryCache;
use crate::pipeline_cache::{DeviceId, PipelineCache};
use crate::render_object::RenderObject;

pub use pick::{pixel_in_viewport, PickPoll, PickRequest, PickResolution};
pub use rendering::FrameUniforms;

use pick::PendingPick;
use textures::{OffscreenTarget, PickTargets};

/// Color format of the headless render target.
pub const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// GPU engine drawing instanced primitive collections and resolving picks.
///
/// The engine owns every GPU resource. Callers hand it the full collection
/// list whenever data changes ([`set_collections`](Self::set_collections)),
/// the camera every frame, and pointer coordinates for picking.
pub struct RenderEngine {
    /// The wgpu instance.
    pub instance: wgpu::Instance,
    /// The wgpu adapter.
    pub adapter: wgpu::Adapter,
    /// The wgpu device.
    pub device: wgpu::Device,
    /// The wgpu queue.
    pub queue: wgpu::Queue,
    /// The render surface (None for headless).
    pub surface: Option<wgpu::Surface<'static>>,
    /// Surface configuration; also describes the headless target.
    pub surface_config: wgpu::SurfaceConfiguration,
    /// Current viewport width.
    pub width: u32,
    /// Current viewport height.
    pub height: u32,
    pub(crate) options: EngineOptions,
    pub(crate) device_id: DeviceId,
    pub(crate) device_lost: Arc<AtomicBool>,
    pub(crate) depth_texture: wgpu::Texture,
    pub(crate) depth_view: wgpu::TextureView,
    pub(crate) offscreen: Option<OffscreenTarget>,
    pub(crate) pick_targets: Option<PickTargets>,
    pub(crate) frame_buffer: wgpu::Buffer,
    pub(crate) frame_bind_group: wgpu::BindGroup,
    pub(crate) pipeline_layout: wgpu::PipelineLayout,
    pub(crate) pipelines: PipelineCache<wgpu::RenderPipeline>,
    pub(crate) geometry: GeometryCache,
    pub(crate) buffers: DynamicBuffers,
    pub(crate) collections: Vec<PrimitiveCollection>,
    pub(crate) render_objects: Vec<RenderObject>,
    pub(crate) id_mapping: IdMapping,
    pub(crate) pick_gate: PickGate,
    pub(crate) hover: HoverTracker,
    pub(crate) pending_pick: Option<PendingPick>,
    pub(crate) camera: CameraState,
    destroyed: bool,
}

impl RenderEngine {
    /// Creates an engine presenting to `window`.
    pub async fn new_windowed(
        window: Arc<winit::window::Window>,
        options: EngineOptions,
    ) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..wgpu::InstanceDescriptor::default()
        });

        let surface = instance.create_surface(window.clone())?;
        let adapter = request_adapter(&instance, Some(&surface), &options).await?;
        let (device, queue) = request_device(&adapter, "scene3d device").await?;

        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or(RenderError::SurfaceConfigurationFailed)?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        Ok(Self::from_parts(
            instance,
            adapter,
            device,
            queue,
            Some(surface),
            surface_config,
            options,
        ))
    }

    /// Creates an engine rendering into an offscreen `width` x `height` target.
    pub async fn new_headless(width: u32, height: u32, options: EngineOptions) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..wgpu::InstanceDescriptor::default()
        });

        let adapter = request_adapter(&instance, None, &options).await?;
        let (device, queue) = request_device(&adapter, "scene3d device (headless)").await?;

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            format: OFFSCREEN_FORMAT,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        Ok(Self::from_parts(
            instance,
            adapter,
            device,
            queue,
            None,
            surface_config,
            options,
        ))
    }

    fn from_parts(
        instance: wgpu::Instance,
        adapter: wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface: Option<wgpu::Surface<'static>>,
        surface_config: wgpu::SurfaceConfiguration,
        options: EngineOptions,
    ) -> Self {
        let device_lost = watch_device(&device);
        let width = surface_config.width;
        let height = surface_config.height;

        let (depth_texture, depth_view) = Self::create_depth_texture(&device, width, height);
        let offscreen = surface
            .is_none()
            .then(|| Self::create_offscreen_target(&device, width, height, surface_config.format));
        let pick_targets = Some(Self::create_pick_targets(&device, width, height));

        let camera = CameraState::default();
        let (frame_buffer, frame_bind_group, pipeline_layout) = Self::create_frame_bindings(
            &device,
            &FrameUniforms::new(&camera, width as f32 / height as f32, &options.lighting),
        );

        let adapter_info = adapter.get_info();
        log::info!(
            "scene3d engine on {} ({:?}), {width}x{height}{}",
            adapter_info.name,
            adapter_info.backend,
            if surface.is_some() { "" } else { ", headless" }
        );

        Self {
            instance,
            adapter,
            device,
            queue,
            surface,
            surface_config,
            width,
            height,
            options,
            device_id: DeviceId::next(),
            device_lost,
            depth_texture,
            depth_view,
            offscreen,
            pick_targets,
            frame_buffer,
            frame_bind_group,
            pipeline_layout,
            pipelines: PipelineCache::new(),
            geometry: GeometryCache::default(),
            buffers: DynamicBuffers::new(),
            collections: Vec::new(),
            render_objects: Vec::new(),
            id_mapping: IdMapping::default(),
            pick_gate: PickGate::new(),
            hover: HoverTracker::default(),
            pending_pick: None,
            camera,
            destroyed: false,
        }
    }

    /// Returns true once the device-lost callback has fired.
    #[must_use]
    pub fn is_device_lost(&self) -> bool {
        self.device_lost.load(Ordering::Acquire)
    }

    /// Replaces a lost device with a fresh one and rebuilds every GPU resource
    /// from the retained collections.
    ///
    /// Pipelines and meshes are keyed by device identity, so nothing compiled
    /// on the old device is reused.
    pub async fn recover_device(&mut self) -> RenderResult<()> {
        log::warn!("recreating graphics device");
        self.pick_gate.invalidate();
        self.pick_gate.abandon();
        self.pending_pick = None;
        self.hover.reset();
        self.render_objects.clear();
        self.buffers = DynamicBuffers::new();
        self.geometry = GeometryCache::default();

        let adapter = request_adapter(&self.instance, self.surface.as_ref(), &self.options).await?;
        let (device, queue) = request_device(&adapter, "scene3d device (recovered)").await?;
        self.device_lost = watch_device(&device);
        self.device_id = DeviceId::next();
        self.adapter = adapter;
        self.device = device;
        self.queue = queue;

        if let Some(surface) = &self.surface {
            surface.configure(&self.device, &self.surface_config);
        }
        let (frame_buffer, frame_bind_group, pipeline_layout) = Self::create_frame_bindings(
            &self.device,
            &FrameUniforms::new(&self.camera, self.aspect_ratio(), &self.options.lighting),
        );
        self.frame_buffer = frame_buffer;
        self.frame_bind_group = frame_bind_group;
        self.pipeline_layout = pipeline_layout;
        self.recreate_targets();
        self.build_render_objects();
        Ok(())
    }

    /// Resizes every size-dependent target. Zero sizes are ignored.
    ///
    /// In-flight picks are invalidated since their pixel no longer maps to
    /// the same instance.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || (width, height) == (self.width, self.height) {
            return;
        }

        self.pick_gate.invalidate();
        self.width = width;
        self.height = height;
        self.surface_config.width = width;
        self.surface_config.height = height;

        if let Some(ref surface) = self.surface {
            surface.configure(&self.device, &self.surface_config);
        }
        self.recreate_targets();
        self.update_frame_uniforms();
        log::debug!("resized to {width}x{height}");
    }

    /// Waits for submitted work, then releases every GPU resource.
    ///
    /// Safe to call more than once; later calls do nothing.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.pick_gate.invalidate();
        self.pick_gate.abandon();
        self.pending_pick = None;
        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());

        self.render_objects.clear();
        self.collections.clear();
        self.hover.reset();
        self.buffers.destroy();
        self.geometry.destroy();
        self.pipelines.clear();
        if let Some(targets) = self.pick_targets.take() {
            targets.destroy();
        }
        if let Some(offscreen) = self.offscreen.take() {
            offscreen.texture.destroy();
        }
        self.depth_texture.destroy();
        self.frame_buffer.destroy();
        log::debug!("engine resources released");
    }

    /// Returns true once [`destroy`](Self::destroy) has run.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Returns the viewport dimensions.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Options the engine was created with.
    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Identity of the active device.
    #[must_use]
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub(crate) fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn power_preference(mode: PowerMode) -> wgpu::PowerPreference {
    match mode {
        PowerMode::HighPerformance => wgpu::PowerPreference::HighPerformance,
        PowerMode::LowPower => wgpu::PowerPreference::LowPower,
    }
}

async fn request_adapter(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'static>>,
    options: &EngineOptions,
) -> RenderResult<wgpu::Adapter> {
    instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: power_preference(options.power_preference),
            compatible_surface: surface,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|err| {
            log::error!("no compatible graphics adapter: {err}");
            RenderError::AdapterCreationFailed
        })
}

async fn request_device(
    adapter: &wgpu::Adapter,
    label: &str,
) -> RenderResult<(wgpu::Device, wgpu::Queue)> {
    Ok(adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
        })
        .await?)
}

/// Returns a flag raised when `device` is lost for any reason but teardown.
fn watch_device(device: &wgpu::Device) -> Arc<AtomicBool> {
    let lost = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&lost);
    device.set_device_lost_callback(move |reason, message| {
        if matches!(reason, wgpu::DeviceLostReason::Destroyed) {
            return;
        }
        log::error!("graphics device lost ({reason:?}): {message}");
        flag.store(true, Ordering::Release);
    });
    lost
}
