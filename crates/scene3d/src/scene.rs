use std::sync::Arc;
use std::time::Instant;

use pollster::FutureExt;
use scene3d_core::{
    CameraState, EngineOptions, PickMode, PickTarget, PrimitiveCollection, Result, Throttle,
};
use scene3d_render::{PickPoll, PickRequest, PickResolution, RenderEngine};

use crate::render_error;

/// Host-facing wrapper around [`RenderEngine`] for event-loop hosts.
///
/// Adds change detection on the collection list, a hover throttle, queued
/// pointer events while a pick is in flight, and device-loss recovery.
pub struct Scene3d {
    engine: RenderEngine,
    hover_throttle: Throttle,
    queued_hover: Option<(f64, f64)>,
    queued_click: Option<(f64, f64)>,
}

impl Scene3d {
    /// Creates a scene presenting to `window`.
    pub async fn windowed(
        window: Arc<winit::window::Window>,
        options: EngineOptions,
    ) -> Result<Self> {
        let engine = RenderEngine::new_windowed(window, options)
            .await
            .map_err(|e| render_error("failed to create render engine", e))?;
        Ok(Self::from_engine(engine))
    }

    /// Creates a scene rendering offscreen.
    pub async fn headless(width: u32, height: u32, options: EngineOptions) -> Result<Self> {
        let engine = RenderEngine::new_headless(width, height, options)
            .await
            .map_err(|e| render_error("failed to create headless engine", e))?;
        Ok(Self::from_engine(engine))
    }

    /// Wraps an existing engine.
    pub fn from_engine(engine: RenderEngine) -> Self {
        let hover_throttle = Throttle::new(engine.options().hover_throttle());
        Self {
            engine,
            hover_throttle,
            queued_hover: None,
            queued_click: None,
        }
    }

    /// The underlying engine.
    pub fn engine(&self) -> &RenderEngine {
        &self.engine
    }

    /// Mutable access to the underlying engine.
    pub fn engine_mut(&mut self) -> &mut RenderEngine {
        &mut self.engine
    }

    /// Draws one frame.
    ///
    /// Render objects are rebuilt only when `collections` differs from the
    /// previous call. A lost device is recreated first.
    pub fn render(
        &mut self,
        collections: &[PrimitiveCollection],
        camera: &CameraState,
        (width, height): (u32, u32),
    ) -> Result<()> {
        if self.engine.is_destroyed() {
            return Ok(());
        }
        self.recover_if_lost()?;
        self.resize(width, height);
        if self.engine.collections() != collections {
            self.engine.set_collections(collections.to_vec());
        }
        self.engine.set_camera(*camera);
        self.engine
            .render_frame()
            .map_err(|e| render_error("frame failed", e))
    }

    /// Resizes the viewport; in-flight picks are discarded.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.engine.resize(width, height);
    }

    /// Picks at `(x, y)` and applies the result.
    pub async fn pick(&mut self, x: f64, y: f64, mode: PickMode) -> Option<PickTarget> {
        self.engine.pick(x, y, mode).await
    }

    /// Pointer moved to `(x, y)`. Starts a hover pick unless throttled or
    /// busy, in which case the latest position is kept for [`tick`](Self::tick).
    pub fn pointer_moved(&mut self, x: f64, y: f64) {
        self.queued_hover = Some((x, y));
        self.flush_hover();
    }

    /// Pointer clicked at `(x, y)`. Clicks are never throttled; one arriving
    /// while a pick is in flight is issued by the next [`tick`](Self::tick).
    pub fn pointer_clicked(&mut self, x: f64, y: f64) {
        self.queued_click = Some((x, y));
        self.flush_click();
    }

    /// Pointer left the viewport: clears hover and forgets queued hovers.
    pub fn pointer_left(&mut self) {
        self.queued_hover = None;
        self.hover_throttle.reset();
        self.engine.clear_hover();
    }

    /// Drives picking from the host loop: completes a finished pass, then
    /// issues queued pointer events.
    pub fn tick(&mut self) -> Option<PickResolution> {
        let resolution = match self.engine.poll_pick() {
            PickPoll::Complete(resolution) => resolution,
            PickPoll::Idle | PickPoll::Pending => None,
        };
        self.flush_click();
        self.flush_hover();
        resolution
    }

    /// Blocks until every queued pointer event has been resolved.
    pub fn finish_picks(&mut self) -> Option<PickResolution> {
        let mut last = self.engine.finish_pick();
        while self.queued_click.is_some() || self.queued_hover.is_some() {
            self.hover_throttle.reset();
            let before = self.engine.pick_passes_started();
            self.flush_click();
            self.flush_hover();
            if self.engine.pick_passes_started() == before {
                break;
            }
            last = self.engine.finish_pick().or(last);
        }
        last
    }

    /// Reads back the last headless frame as RGBA.
    pub fn capture(&self) -> Result<Vec<u8>> {
        self.engine
            .capture_frame()
            .map_err(|e| render_error("capture failed", e))
    }

    /// Releases every GPU resource. Further calls do nothing.
    pub fn destroy(&mut self) {
        self.queued_hover = None;
        self.queued_click = None;
        self.engine.destroy();
    }

    fn recover_if_lost(&mut self) -> Result<()> {
        if self.engine.is_device_lost() {
            self.queued_hover = None;
            self.queued_click = None;
            self.engine
                .recover_device()
                .block_on()
                .map_err(|e| render_error("device recovery failed", e))?;
        }
        Ok(())
    }

    fn flush_click(&mut self) {
        let Some((x, y)) = self.queued_click else {
            return;
        };
        match self.engine.begin_pick(x, y, PickMode::Click) {
            PickRequest::Busy => {}
            _ => self.queued_click = None,
        }
    }

    fn flush_hover(&mut self) {
        let Some((x, y)) = self.queued_hover else {
            return;
        };
        if self.queued_click.is_some() || self.engine.is_pick_in_flight() {
            return;
        }
        if !self.hover_throttle.ready(Instant::now()) {
            return;
        }
        self.queued_hover = None;
        self.engine.begin_pick(x, y, PickMode::Hover);
    }
}
