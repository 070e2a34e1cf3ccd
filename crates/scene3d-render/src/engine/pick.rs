use std::sync::mpsc::{self, TryRecvError};
use std::task::Poll;

use scene3d_core::{
    decode_pick_color, Callbacks, HoverChange, IdMapping, PickMode, PickTarget, PickTicket,
};

use super::scene::pipeline_or_skip;
use super::RenderEngine;
use crate::buffer::READBACK_ROW_BYTES;
use crate::pipeline_cache::PassKind;
use crate::primitive::{spec_for, PipelineContext};
use crate::render_object::BufferSlice;

/// Outcome of [`RenderEngine::begin_pick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickRequest {
    /// A picking pass was submitted.
    Started(PickTicket),
    /// Another pass is in flight; the request was dropped.
    Busy,
    /// The coordinate lies outside the viewport; nothing is hovered.
    OutOfBounds,
    /// The engine is destroyed or its device is lost.
    Unavailable,
}

/// A completed pick that was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickResolution {
    pub mode: PickMode,
    pub target: Option<PickTarget>,
}

/// Outcome of [`RenderEngine::poll_pick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickPoll {
    /// No pass is in flight.
    Idle,
    /// The readback has not landed yet.
    Pending,
    /// The pass finished; `None` if its result was superseded or unreadable.
    Complete(Option<PickResolution>),
}

pub(crate) struct PendingPick {
    ticket: PickTicket,
    readback: wgpu::Buffer,
    receiver: mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
}

/// Maps a pointer coordinate to a pixel, or `None` outside the viewport.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn pixel_in_viewport(x: f64, y: f64, width: u32, height: u32) -> Option<(u32, u32)> {
    let inside = x >= 0.0 && y >= 0.0 && x < f64::from(width) && y < f64::from(height);
    inside.then(|| (x.floor() as u32, y.floor() as u32))
}

/// Decodes a pick texel and resolves it against `mapping`.
#[must_use]
pub fn resolve_pixel(pixel: [u8; 4], mapping: &IdMapping) -> Option<PickTarget> {
    mapping.resolve(decode_pick_color(pixel[0], pixel[1], pixel[2]))
}

/// Hover callbacks to fire for `change`, as `(collection, argument)` pairs.
///
/// The previously hovered instance is always told it was left before the new
/// one is reported, even when both belong to the same collection.
fn hover_notifications(change: HoverChange) -> Vec<(usize, Option<usize>)> {
    let mut calls = Vec::with_capacity(2);
    if let Some(left) = change.left {
        calls.push((left.collection_index, None));
    }
    if let Some(entered) = change.entered {
        calls.push((entered.collection_index, Some(entered.instance_index)));
    }
    calls
}

impl RenderEngine {
    /// Starts a picking pass at pointer coordinate `(x, y)` without blocking.
    ///
    /// Hover requests outside the viewport clear the hover state immediately.
    pub fn begin_pick(&mut self, x: f64, y: f64, mode: PickMode) -> PickRequest {
        if self.is_destroyed() || self.is_device_lost() {
            return PickRequest::Unavailable;
        }
        let Some((px, py)) = pixel_in_viewport(x, y, self.width, self.height) else {
            if mode == PickMode::Hover {
                self.clear_hover();
            }
            return PickRequest::OutOfBounds;
        };
        let Some(ticket) = self.pick_gate.try_begin(mode) else {
            return PickRequest::Busy;
        };

        self.prepare_picking_data();
        let Some(targets) = self.pick_targets.as_ref() else {
            self.pick_gate.abandon();
            return PickRequest::Unavailable;
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("pick encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("pick pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &targets.color_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        // ID 0 everywhere nothing is drawn
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &targets.depth_view,
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
            for object in &self.render_objects {
                if object.is_pickable() {
                    object.draw(&mut pass, true);
                }
            }
        }

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &targets.color,
                mip_level: 0,
                origin: wgpu::Origin3d { x: px, y: py, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &targets.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(READBACK_ROW_BYTES as u32),
                    rows_per_image: Some(1),
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let readback = targets.readback.clone();
        let (tx, rx) = mpsc::channel();
        readback.slice(..4).map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.pending_pick = Some(PendingPick {
            ticket,
            readback,
            receiver: rx,
        });
        PickRequest::Started(ticket)
    }

    /// Checks the in-flight pass without blocking, applying its result if the
    /// readback has landed.
    pub fn poll_pick(&mut self) -> PickPoll {
        let Some(pending) = self.pending_pick.as_ref() else {
            return PickPoll::Idle;
        };
        let _ = self.device.poll(wgpu::PollType::Poll);
        let mapped = match pending.receiver.try_recv() {
            Ok(result) => result.is_ok(),
            Err(TryRecvError::Empty) => return PickPoll::Pending,
            Err(TryRecvError::Disconnected) => false,
        };
        PickPoll::Complete(self.complete_pick(mapped))
    }

    /// Blocks until the in-flight pass completes and applies its result.
    ///
    /// Returns `None` if nothing was in flight or the result was discarded.
    pub fn finish_pick(&mut self) -> Option<PickResolution> {
        let pending = self.pending_pick.as_ref()?;
        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());
        let mapped = matches!(pending.receiver.try_recv(), Ok(Ok(())));
        self.complete_pick(mapped)
    }

    /// Picks at `(x, y)` and resolves to the instance under the pointer.
    ///
    /// Resolves to `None` for empty pixels and also when the request was
    /// dropped (busy) or superseded. The future drives the device itself, so
    /// it completes under any executor.
    pub async fn pick(&mut self, x: f64, y: f64, mode: PickMode) -> Option<PickTarget> {
        if !matches!(self.begin_pick(x, y, mode), PickRequest::Started(_)) {
            return None;
        }
        std::future::poll_fn(|cx| match self.poll_pick() {
            PickPoll::Pending => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            PickPoll::Complete(resolution) => Poll::Ready(resolution.and_then(|r| r.target)),
            PickPoll::Idle => Poll::Ready(None),
        })
        .await
    }

    /// Forgets the hovered instance, firing `on_hover(None)` if there was one.
    ///
    /// An in-flight hover pass is discarded; an in-flight click still
    /// delivers its result.
    pub fn clear_hover(&mut self) {
        self.pick_gate.invalidate_hover();
        if let Some(change) = self.hover.update(None) {
            self.fire_hover_change(change);
        }
    }

    /// Currently hovered instance.
    #[must_use]
    pub fn hovered(&self) -> Option<PickTarget> {
        self.hover.current()
    }

    /// Returns true while a picking pass is in flight.
    #[must_use]
    pub fn is_pick_in_flight(&self) -> bool {
        self.pick_gate.is_busy()
    }

    /// Number of picking passes submitted so far.
    #[must_use]
    pub fn pick_passes_started(&self) -> u64 {
        self.pick_gate.passes_started()
    }

    /// Writes picking records and resolves picking pipelines for every stale
    /// object. Objects without IDs or whose pipeline fails stay unpickable.
    fn prepare_picking_data(&mut self) {
        let ctx = PipelineContext {
            device: &self.device,
            device_id: self.device_id,
            layout: &self.pipeline_layout,
            color_format: self.surface_config.format,
        };

        for object in &mut self.render_objects {
            if !object.picking_data_stale {
                continue;
            }
            let (Some(base_id), Some(collection)) =
                (object.base_id, self.collections.get(object.component_index))
            else {
                continue;
            };
            let spec = spec_for(object.kind);
            let Some(pipeline) = pipeline_or_skip(object.component_index, PassKind::Picking, || {
                spec.get_pipeline(&ctx, &mut self.pipelines, PassKind::Picking)
            }) else {
                continue;
            };
            let Some(data) = spec.build_picking_data(collection, base_id) else {
                continue;
            };
            let Some(allocation) = self.buffers.write_picking(&self.queue, &data) else {
                log::warn!(
                    "collection {} is not pickable: instance buffer exhausted",
                    object.component_index
                );
                continue;
            };
            let Some(geometry) = object.vertex_buffers.first().cloned() else {
                continue;
            };
            object.picking_vertex_buffers = vec![
                geometry,
                BufferSlice::instances(&allocation, spec.picking_layout().stride_bytes()),
            ];
            object.picking_pipeline = Some(pipeline);
            object.picking_data_stale = false;
        }
    }

    fn complete_pick(&mut self, mapped: bool) -> Option<PickResolution> {
        let pending = self.pending_pick.take()?;
        let pixel = if mapped {
            let mut pixel = [0u8; 4];
            {
                let data = pending.readback.slice(..4).get_mapped_range();
                pixel.copy_from_slice(&data[..4]);
            }
            pending.readback.unmap();
            Some(pixel)
        } else {
            log::warn!("pick readback could not be mapped");
            None
        };

        if !self.pick_gate.complete(&pending.ticket) {
            log::trace!("discarding superseded pick result");
            return None;
        }
        let resolution = PickResolution {
            mode: pending.ticket.mode,
            target: resolve_pixel(pixel?, &self.id_mapping),
        };
        self.dispatch(resolution);
        Some(resolution)
    }

    fn callbacks(&self, collection_index: usize) -> Option<&Callbacks> {
        self.collections
            .get(collection_index)
            .and_then(|collection| collection.callbacks())
    }

    fn dispatch(&mut self, resolution: PickResolution) {
        match resolution.mode {
            PickMode::Hover => {
                if let Some(change) = self.hover.update(resolution.target) {
                    self.fire_hover_change(change);
                }
            }
            PickMode::Click => {
                if let Some(target) = resolution.target {
                    if let Some(callbacks) = self.callbacks(target.collection_index) {
                        callbacks.click(target.instance_index);
                    }
                }
            }
        }
    }

    fn fire_hover_change(&self, change: HoverChange) {
        for (collection_index, instance) in hover_notifications(change) {
            if let Some(callbacks) = self.callbacks(collection_index) {
                callbacks.hover(instance);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(collection_index: usize, instance_index: usize) -> PickTarget {
        PickTarget {
            collection_index,
            instance_index,
        }
    }

    #[test]
    fn test_pixel_in_viewport() {
        assert_eq!(pixel_in_viewport(0.0, 0.0, 10, 10), Some((0, 0)));
        assert_eq!(pixel_in_viewport(9.7, 3.2, 10, 10), Some((9, 3)));
        assert_eq!(pixel_in_viewport(10.0, 3.0, 10, 10), None);
        assert_eq!(pixel_in_viewport(-0.5, 3.0, 10, 10), None);
        assert_eq!(pixel_in_viewport(f64::NAN, 3.0, 10, 10), None);
    }

    #[test]
    fn test_resolve_pixel() {
        let mapping = IdMapping::build(&[3, 2]);
        assert_eq!(resolve_pixel([5, 0, 0, 255], &mapping), Some(target(1, 1)));
        assert_eq!(resolve_pixel([1, 0, 0, 255], &mapping), Some(target(0, 0)));
        assert_eq!(resolve_pixel([0, 0, 0, 0], &mapping), None);
        assert_eq!(resolve_pixel([6, 0, 0, 255], &mapping), None);
    }

    #[test]
    fn test_hover_enter_and_leave() {
        let enter = HoverChange {
            left: None,
            entered: Some(target(0, 2)),
        };
        assert_eq!(hover_notifications(enter), vec![(0, Some(2))]);

        let leave = HoverChange {
            left: Some(target(0, 2)),
            entered: None,
        };
        assert_eq!(hover_notifications(leave), vec![(0, None)]);
    }

    #[test]
    fn test_hover_across_collections() {
        let change = HoverChange {
            left: Some(target(0, 2)),
            entered: Some(target(1, 0)),
        };
        assert_eq!(hover_notifications(change), vec![(0, None), (1, Some(0))]);
    }

    #[test]
    fn test_hover_within_collection() {
        let change = HoverChange {
            left: Some(target(1, 0)),
            entered: Some(target(1, 1)),
        };
        assert_eq!(hover_notifications(change), vec![(1, None), (1, Some(1))]);
    }
}
