use scene3d_core::{IdMapping, PickTarget, PrimitiveCollection};

use super::RenderEngine;
use crate::dynamic_buffer::required_capacity;
use crate::error::RenderResult;
use crate::pipeline_cache::PassKind;
use crate::primitive::{spec_for, PipelineContext};
use crate::render_object::RenderObject;
use crate::transparency::{has_translucency, TranslucentRecords};

/// Runs a pipeline lookup for collection `index`. A failure is logged and
/// yields `None`, leaving that collection out of `pass` while the others draw.
pub(crate) fn pipeline_or_skip<P>(
    index: usize,
    pass: PassKind,
    lookup: impl FnOnce() -> RenderResult<P>,
) -> Option<P> {
    match lookup() {
        Ok(pipeline) => Some(pipeline),
        Err(err) => {
            log::warn!("collection {index} skipped in the {pass:?} pass: {err}");
            None
        }
    }
}

impl RenderEngine {
    /// Replaces the drawn collections and rebuilds every render object.
    ///
    /// If the hovered instance no longer exists, its collection's previous
    /// `on_hover` callback receives `None`.
    pub fn set_collections(&mut self, collections: Vec<PrimitiveCollection>) {
        let previous = std::mem::replace(&mut self.collections, collections);
        if let Some(left) = self.build_render_objects() {
            if let Some(callbacks) = previous
                .get(left.collection_index)
                .and_then(PrimitiveCollection::callbacks)
            {
                callbacks.hover(None);
            }
        }
    }

    /// Collections currently drawn.
    #[must_use]
    pub fn collections(&self) -> &[PrimitiveCollection] {
        &self.collections
    }

    /// Render objects built by the last rebuild.
    #[must_use]
    pub fn render_objects(&self) -> &[RenderObject] {
        &self.render_objects
    }

    /// ID ranges assigned by the last rebuild.
    #[must_use]
    pub fn id_mapping(&self) -> &IdMapping {
        &self.id_mapping
    }

    /// Capacity of each instance buffer in bytes.
    #[must_use]
    pub fn buffer_capacity(&self) -> u64 {
        self.buffers.capacity()
    }

    /// Number of times the instance buffers were recreated.
    #[must_use]
    pub fn buffer_reallocations(&self) -> u64 {
        self.buffers.reallocations()
    }

    /// Number of pipelines compiled so far.
    #[must_use]
    pub fn pipeline_compilations(&self) -> u64 {
        self.pipelines.compilations()
    }

    /// Instance counts per collection; skipped collections count as zero.
    fn drawable_counts(&self) -> Vec<usize> {
        self.collections
            .iter()
            .enumerate()
            .map(|(index, collection)| {
                let Some(kind) = collection.kind() else {
                    log::warn!("skipping collection {index}: unknown primitive type");
                    return 0;
                };
                match spec_for(kind).count(collection) {
                    0 => {
                        match collection.validate() {
                            Err(err) => log::warn!("skipping {kind} collection {index}: {err}"),
                            Ok(_) => log::debug!("skipping empty {kind} collection {index}"),
                        }
                        0
                    }
                    count => count,
                }
            })
            .collect()
    }

    /// Rebuilds the ID mapping, instance buffers and render objects from the
    /// retained collections. Picking data is left stale until the next pick.
    ///
    /// Returns the hovered instance if the rebuild removed it; the hover
    /// state is already cleared.
    pub(crate) fn build_render_objects(&mut self) -> Option<PickTarget> {
        self.pick_gate.invalidate();
        self.render_objects.clear();
        if self.is_destroyed() {
            return None;
        }

        let counts = self.drawable_counts();
        self.id_mapping = IdMapping::build(&counts);

        let removed_hover = self.hover.current().filter(|target| {
            !counts
                .get(target.collection_index)
                .is_some_and(|&count| target.instance_index < count)
        });
        if removed_hover.is_some() {
            self.hover.reset();
        }

        let required = required_capacity(
            self.collections
                .iter()
                .zip(&counts)
                .filter(|(_, &count)| count > 0)
                .filter_map(|(collection, &count)| {
                    collection.kind().map(|kind| kind.instance_bytes() * count as u64)
                }),
            self.options.effective_slack(),
        );
        self.buffers.ensure_capacity(&self.device, required);
        self.buffers.reset_cursors();

        let ctx = PipelineContext {
            device: &self.device,
            device_id: self.device_id,
            layout: &self.pipeline_layout,
            color_format: self.surface_config.format,
        };

        for (index, (collection, &count)) in self.collections.iter().zip(&counts).enumerate() {
            let Some(kind) = collection.kind().filter(|_| count > 0) else {
                continue;
            };
            let spec = spec_for(kind);
            let Some(data) = spec.build_render_data(collection) else {
                continue;
            };
            let Some(allocation) = self.buffers.write_render(&self.queue, &data) else {
                log::warn!("skipping {kind} collection {index}: instance buffer exhausted");
                continue;
            };
            let mesh = self
                .geometry
                .get(&self.device, self.device_id, spec.render_config().geometry);
            let translucent = has_translucency(&data, spec.render_layout());
            let pass = if translucent {
                PassKind::Translucent
            } else {
                PassKind::Render
            };
            let pipeline = pipeline_or_skip(index, pass, || {
                spec.get_pipeline(&ctx, &mut self.pipelines, pass)
            });

            let mut object = spec.create_render_object(
                index,
                &mesh,
                pipeline,
                &allocation,
                count,
                self.id_mapping.base_id(index),
            );
            if translucent {
                let group_floats = spec.render_layout().floats * kind.records_per_instance();
                object.translucent = Some(TranslucentRecords::new(data, group_floats, &allocation));
            }
            self.render_objects.push(object);
        }

        log::debug!(
            "rebuilt {} render objects from {} collections, {} pick ids, {} byte buffers",
            self.render_objects.len(),
            self.collections.len(),
            self.id_mapping.total_ids(),
            self.buffers.capacity()
        );
        removed_hover
    }
}
