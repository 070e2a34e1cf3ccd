//! Per-kind instance record layouts and the builders that fill them.
//!
//! Every kind packs its instances into flat `f32` records. The position or
//! center always occupies the first three floats; the remaining fields depend
//! on the kind and on the pass:
//!
//! | kind | visual record | picking record |
//! |---|---|---|
//! | `PointCloud` | `x y z r g b alpha size` | `x y z pick_id size` |
//! | `Ellipsoid`, `EllipsoidAxes` | `cx cy cz rx ry rz r g b alpha` | `cx cy cz rx ry rz pick_id` |
//! | `Cuboid` | `cx cy cz sx sy sz r g b alpha` | `cx cy cz sx sy sz pick_id` |
//!
//! `EllipsoidAxes` writes three records per ellipsoid (one per ring) that share
//! a single pick ID. Pick IDs are stored as `f32`, which is exact for the
//! 24-bit ID space.

use crate::collection::{PrimitiveCollection, PrimitiveKind};
use crate::decoration::{apply_decorations, Decoration};

/// Field positions inside one packed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    /// Record length in floats.
    pub floats: usize,
    /// Offset of the rgb color.
    pub color: Option<usize>,
    /// Offset of the opacity.
    pub alpha: Option<usize>,
    /// Offset and component count of the size/radius.
    pub size: Option<(usize, usize)>,
    /// Offset of the pick ID.
    pub pick_id: Option<usize>,
}

impl RecordLayout {
    /// Record length in bytes.
    #[must_use]
    pub const fn stride_bytes(&self) -> u64 {
        (self.floats * std::mem::size_of::<f32>()) as u64
    }
}

/// Visual point record.
pub const POINT_CLOUD_RENDER: RecordLayout = RecordLayout {
    floats: 8,
    color: Some(3),
    alpha: Some(6),
    size: Some((7, 1)),
    pick_id: None,
};

/// Picking point record.
pub const POINT_CLOUD_PICKING: RecordLayout = RecordLayout {
    floats: 5,
    color: None,
    alpha: None,
    size: Some((4, 1)),
    pick_id: Some(3),
};

/// Visual record shared by ellipsoids, axis rings and cuboids.
pub const SOLID_RENDER: RecordLayout = RecordLayout {
    floats: 10,
    color: Some(6),
    alpha: Some(9),
    size: Some((3, 3)),
    pick_id: None,
};

/// Picking record shared by ellipsoids, axis rings and cuboids.
pub const SOLID_PICKING: RecordLayout = RecordLayout {
    floats: 7,
    color: None,
    alpha: None,
    size: Some((3, 3)),
    pick_id: Some(6),
};

impl PrimitiveKind {
    /// Layout of the visual-pass records.
    #[must_use]
    pub fn render_layout(self) -> &'static RecordLayout {
        match self {
            PrimitiveKind::PointCloud => &POINT_CLOUD_RENDER,
            PrimitiveKind::Ellipsoid | PrimitiveKind::EllipsoidAxes | PrimitiveKind::Cuboid => {
                &SOLID_RENDER
            }
        }
    }

    /// Layout of the picking-pass records.
    #[must_use]
    pub fn picking_layout(self) -> &'static RecordLayout {
        match self {
            PrimitiveKind::PointCloud => &POINT_CLOUD_PICKING,
            PrimitiveKind::Ellipsoid | PrimitiveKind::EllipsoidAxes | PrimitiveKind::Cuboid => {
                &SOLID_PICKING
            }
        }
    }

    /// Number of drawn records per logical instance.
    #[must_use]
    pub fn records_per_instance(self) -> usize {
        match self {
            PrimitiveKind::EllipsoidAxes => 3,
            PrimitiveKind::PointCloud | PrimitiveKind::Ellipsoid | PrimitiveKind::Cuboid => 1,
        }
    }

    /// Bytes one logical instance needs in the larger of its two layouts.
    #[must_use]
    pub fn instance_bytes(self) -> u64 {
        let stride = self
            .render_layout()
            .stride_bytes()
            .max(self.picking_layout().stride_bytes());
        stride * self.records_per_instance() as u64
    }
}

/// Read-only view over the attributes shared by every kind.
struct InstanceAttributes<'a> {
    kind: PrimitiveKind,
    positions: &'a [f32],
    colors: Option<&'a [f32]>,
    color: [f32; 3],
    alphas: Option<&'a [f32]>,
    alpha: f32,
    sizes: Option<&'a [f32]>,
    size: [f32; 3],
    size_components: usize,
    decorations: &'a [Decoration],
}

impl InstanceAttributes<'_> {
    fn count(&self) -> usize {
        self.positions.len() / 3
    }

    fn color(&self, i: usize) -> [f32; 3] {
        self.colors
            .map_or(self.color, |c| [c[i * 3], c[i * 3 + 1], c[i * 3 + 2]])
    }

    fn alpha(&self, i: usize) -> f32 {
        self.alphas.map_or(self.alpha, |a| a[i])
    }

    fn size(&self, i: usize) -> [f32; 3] {
        match (self.sizes, self.size_components) {
            (Some(s), 1) => [s[i], s[i], s[i]],
            (Some(s), _) => [s[i * 3], s[i * 3 + 1], s[i * 3 + 2]],
            (None, _) => self.size,
        }
    }

    fn fill(&self, layout: &RecordLayout, base_id: Option<u32>) -> Vec<f32> {
        let per_instance = self.kind.records_per_instance();
        let mut data = vec![0.0_f32; self.count() * per_instance * layout.floats];

        for (i, instance) in data
            .chunks_exact_mut(per_instance * layout.floats)
            .enumerate()
        {
            let size = self.size(i);
            let color = self.color(i);
            let alpha = self.alpha(i);
            for record in instance.chunks_exact_mut(layout.floats) {
                record[..3].copy_from_slice(&self.positions[i * 3..i * 3 + 3]);
                if let Some((offset, n)) = layout.size {
                    record[offset..offset + n].copy_from_slice(&size[..n]);
                }
                if let Some(offset) = layout.color {
                    record[offset..offset + 3].copy_from_slice(&color);
                }
                if let Some(offset) = layout.alpha {
                    record[offset] = alpha;
                }
                if let (Some(offset), Some(base)) = (layout.pick_id, base_id) {
                    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
                    {
                        record[offset] = (base + i as u32) as f32;
                    }
                }
            }
        }

        apply_decorations(&mut data, layout, per_instance, self.decorations);
        data
    }
}

impl PrimitiveCollection {
    fn attributes(&self) -> Option<InstanceAttributes<'_>> {
        let attrs = match self {
            PrimitiveCollection::PointCloud(pc) => InstanceAttributes {
                kind: PrimitiveKind::PointCloud,
                positions: &pc.positions,
                colors: pc.colors.as_deref(),
                color: pc.color,
                alphas: pc.alphas.as_deref(),
                alpha: pc.alpha,
                sizes: pc.sizes.as_deref(),
                size: [pc.size; 3],
                size_components: 1,
                decorations: &pc.decorations,
            },
            PrimitiveCollection::Ellipsoid(e) | PrimitiveCollection::EllipsoidAxes(e) => {
                InstanceAttributes {
                    kind: self.kind()?,
                    positions: &e.centers,
                    colors: e.colors.as_deref(),
                    color: e.color,
                    alphas: e.alphas.as_deref(),
                    alpha: e.alpha,
                    sizes: e.radii.as_deref(),
                    size: e.radius,
                    size_components: 3,
                    decorations: &e.decorations,
                }
            }
            PrimitiveCollection::Cuboid(c) => InstanceAttributes {
                kind: PrimitiveKind::Cuboid,
                positions: &c.centers,
                colors: c.colors.as_deref(),
                color: c.color,
                alphas: c.alphas.as_deref(),
                alpha: c.alpha,
                sizes: c.sizes.as_deref(),
                size: c.size,
                size_components: 3,
                decorations: &c.decorations,
            },
            PrimitiveCollection::Unknown => return None,
        };
        Some(attrs)
    }

    /// Builds the packed visual records, decorations applied.
    ///
    /// Returns `None` for empty, malformed or unknown collections.
    #[must_use]
    pub fn build_render_data(&self) -> Option<Vec<f32>> {
        if self.validate().ok()? == 0 {
            return None;
        }
        let attrs = self.attributes()?;
        Some(attrs.fill(attrs.kind.render_layout(), None))
    }

    /// Builds the packed picking records, numbering instances from `base_id`.
    ///
    /// Size decorations are applied so the pickable footprint follows the
    /// visual one.
    #[must_use]
    pub fn build_picking_data(&self, base_id: u32) -> Option<Vec<f32>> {
        if self.validate().ok()? == 0 {
            return None;
        }
        let attrs = self.attributes()?;
        Some(attrs.fill(attrs.kind.picking_layout(), Some(base_id)))
    }
}
