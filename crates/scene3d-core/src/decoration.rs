//! Sparse per-instance overrides layered onto built instance data.

use serde::{Deserialize, Serialize};

use crate::layout::RecordLayout;

/// Overrides applied to a subset of a collection's instances.
///
/// Decorations are applied in list order after the base data is filled. For
/// each decoration the fields are applied as color, alpha, `scale`, then
/// `min_size`, so a later decoration overwrites color/alpha and compounds on
/// whatever size the earlier ones produced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decoration {
    /// Instance indexes this decoration applies to.
    pub indexes: Vec<usize>,
    /// Replacement color.
    pub color: Option<[f32; 3]>,
    /// Replacement opacity.
    pub alpha: Option<f32>,
    /// Multiplier on size/radius.
    pub scale: Option<f32>,
    /// Lower bound on size/radius.
    pub min_size: Option<f32>,
}

impl Decoration {
    /// Creates an empty decoration for the given instances.
    #[must_use]
    pub fn new(indexes: impl IntoIterator<Item = usize>) -> Self {
        Self {
            indexes: indexes.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Sets the replacement color.
    #[must_use]
    pub fn with_color(mut self, color: [f32; 3]) -> Self {
        self.color = Some(color);
        self
    }

    /// Sets the replacement opacity.
    #[must_use]
    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = Some(alpha);
        self
    }

    /// Sets the size multiplier.
    #[must_use]
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Sets the minimum size.
    #[must_use]
    pub fn with_min_size(mut self, min_size: f32) -> Self {
        self.min_size = Some(min_size);
        self
    }

    fn apply_to_record(&self, record: &mut [f32], layout: &RecordLayout) {
        if let (Some(color), Some(offset)) = (self.color, layout.color) {
            record[offset..offset + 3].copy_from_slice(&color);
        }
        if let (Some(alpha), Some(offset)) = (self.alpha, layout.alpha) {
            record[offset] = alpha;
        }
        let Some((offset, components)) = layout.size else {
            return;
        };
        let size = &mut record[offset..offset + components];
        if let Some(scale) = self.scale {
            size.iter_mut().for_each(|s| *s *= scale);
        }
        if let Some(min_size) = self.min_size {
            size.iter_mut().for_each(|s| *s = s.max(min_size));
        }
    }
}

/// Applies decorations to packed instance records.
///
/// `data` holds `records_per_instance` consecutive records per instance, each
/// `layout.floats` long. Fields the layout does not carry are skipped, and
/// indexes past the last instance are ignored.
pub fn apply_decorations(
    data: &mut [f32],
    layout: &RecordLayout,
    records_per_instance: usize,
    decorations: &[Decoration],
) {
    let instance_floats = layout.floats * records_per_instance;
    if instance_floats == 0 {
        return;
    }
    let count = data.len() / instance_floats;

    for decoration in decorations {
        for &index in &decoration.indexes {
            if index >= count {
                continue;
            }
            let instance = &mut data[index * instance_floats..(index + 1) * instance_floats];
            for record in instance.chunks_exact_mut(layout.floats) {
                decoration.apply_to_record(record, layout);
            }
        }
    }
}
