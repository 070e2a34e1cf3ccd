//! Primitive collections: typed batches of drawable instances.
//!
//! A collection carries flat per-instance arrays (3 floats per position, color,
//! radius, ...) plus shared defaults used when an array is absent. Collections
//! are supplied fresh by the caller whenever its data changes, either built in
//! Rust or deserialized from a JSON descriptor of the form
//! `{"type": "PointCloud", "positions": [...], ...}`.

use std::fmt;
use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Deserializer};

use crate::decoration::Decoration;
use crate::error::{Result, Scene3dError};

/// Callback invoked when the hovered instance of a collection changes.
///
/// Receives `Some(instance_index)` when an instance becomes hovered and `None`
/// when the pointer leaves the collection.
pub type HoverCallback = Arc<dyn Fn(Option<usize>) + Send + Sync>;

/// Callback invoked when an instance of a collection is clicked.
pub type ClickCallback = Arc<dyn Fn(usize) + Send + Sync>;

/// Per-collection interaction hooks.
#[derive(Clone, Default)]
pub struct Callbacks {
    /// Hover hook.
    pub on_hover: Option<HoverCallback>,
    /// Click hook.
    pub on_click: Option<ClickCallback>,
}

impl Callbacks {
    /// Invokes the hover hook, if any.
    pub fn hover(&self, instance_index: Option<usize>) {
        if let Some(on_hover) = &self.on_hover {
            on_hover(instance_index);
        }
    }

    /// Invokes the click hook, if any.
    pub fn click(&self, instance_index: usize) {
        if let Some(on_click) = &self.on_click {
            on_click(instance_index);
        }
    }

    /// Returns true if neither hook is set.
    pub fn is_empty(&self) -> bool {
        self.on_hover.is_none() && self.on_click.is_none()
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_hover", &self.on_hover.is_some())
            .field("on_click", &self.on_click.is_some())
            .finish()
    }
}

// Hooks compare by identity so that re-supplying the same closures does not
// count as a data change.
impl PartialEq for Callbacks {
    fn eq(&self, other: &Self) -> bool {
        same_hook(self.on_hover.as_ref(), other.on_hover.as_ref())
            && same_hook(self.on_click.as_ref(), other.on_click.as_ref())
    }
}

fn same_hook<T: ?Sized>(a: Option<&Arc<T>>, b: Option<&Arc<T>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

/// The closed set of drawable primitive kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveKind {
    /// Camera-facing billboards, one per point.
    PointCloud,
    /// Shaded ellipsoids.
    Ellipsoid,
    /// Three axis rings per ellipsoid.
    EllipsoidAxes,
    /// Axis-aligned boxes.
    Cuboid,
}

impl PrimitiveKind {
    /// Every kind, in declaration order.
    pub const ALL: [PrimitiveKind; 4] = [
        PrimitiveKind::PointCloud,
        PrimitiveKind::Ellipsoid,
        PrimitiveKind::EllipsoidAxes,
        PrimitiveKind::Cuboid,
    ];

    /// Returns the descriptor type name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::PointCloud => "PointCloud",
            PrimitiveKind::Ellipsoid => "Ellipsoid",
            PrimitiveKind::EllipsoidAxes => "EllipsoidAxes",
            PrimitiveKind::Cuboid => "Cuboid",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn default_color() -> [f32; 3] {
    [0.5, 0.5, 0.5]
}

fn default_alpha() -> f32 {
    1.0
}

fn default_point_size() -> f32 {
    0.02
}

fn default_radius() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn default_cuboid_size() -> [f32; 3] {
    [0.1, 0.1, 0.1]
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScalarOrVec3 {
    Scalar(f32),
    Vec3([f32; 3]),
}

/// Accepts either `0.5` or `[0.5, 0.5, 1.0]`.
fn scalar_or_vec3<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<[f32; 3], D::Error> {
    Ok(match ScalarOrVec3::deserialize(deserializer)? {
        ScalarOrVec3::Scalar(s) => [s, s, s],
        ScalarOrVec3::Vec3(v) => v,
    })
}

fn flatten(points: &[Vec3]) -> Vec<f32> {
    points.iter().flat_map(|p| p.to_array()).collect()
}

/// A point cloud rendered as camera-facing billboards.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointCloud {
    /// Flat xyz positions.
    pub positions: Vec<f32>,
    /// Optional flat rgb colors.
    pub colors: Option<Vec<f32>>,
    /// Optional per-point opacity.
    pub alphas: Option<Vec<f32>>,
    /// Optional per-point billboard size.
    pub sizes: Option<Vec<f32>>,
    /// Shared color.
    #[serde(default = "default_color")]
    pub color: [f32; 3],
    /// Shared opacity.
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    /// Shared billboard size.
    #[serde(default = "default_point_size")]
    pub size: f32,
    /// Sparse overrides.
    #[serde(default)]
    pub decorations: Vec<Decoration>,
    /// Interaction hooks.
    #[serde(skip)]
    pub callbacks: Callbacks,
}

impl PointCloud {
    /// Creates a point cloud from flat xyz positions.
    #[must_use]
    pub fn new(positions: Vec<f32>) -> Self {
        Self {
            positions,
            colors: None,
            alphas: None,
            sizes: None,
            color: default_color(),
            alpha: default_alpha(),
            size: default_point_size(),
            decorations: Vec::new(),
            callbacks: Callbacks::default(),
        }
    }

    /// Creates a point cloud from points.
    #[must_use]
    pub fn from_points(points: &[Vec3]) -> Self {
        Self::new(flatten(points))
    }

    /// Sets per-point colors.
    #[must_use]
    pub fn with_colors(mut self, colors: Vec<f32>) -> Self {
        self.colors = Some(colors);
        self
    }

    /// Sets per-point sizes.
    #[must_use]
    pub fn with_sizes(mut self, sizes: Vec<f32>) -> Self {
        self.sizes = Some(sizes);
        self
    }

    /// Sets the shared size.
    #[must_use]
    pub fn with_size(mut self, size: f32) -> Self {
        self.size = size;
        self
    }

    /// Sets the shared color.
    #[must_use]
    pub fn with_color(mut self, color: [f32; 3]) -> Self {
        self.color = color;
        self
    }
}

/// Ellipsoids, drawn either as shaded solids or as three axis rings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ellipsoid {
    /// Flat xyz centers.
    pub centers: Vec<f32>,
    /// Optional flat per-instance radii (3 per instance).
    pub radii: Option<Vec<f32>>,
    /// Optional flat rgb colors.
    pub colors: Option<Vec<f32>>,
    /// Optional per-instance opacity.
    pub alphas: Option<Vec<f32>>,
    /// Shared radius.
    #[serde(default = "default_radius", deserialize_with = "scalar_or_vec3")]
    pub radius: [f32; 3],
    /// Shared color.
    #[serde(default = "default_color")]
    pub color: [f32; 3],
    /// Shared opacity.
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    /// Sparse overrides.
    #[serde(default)]
    pub decorations: Vec<Decoration>,
    /// Interaction hooks.
    #[serde(skip)]
    pub callbacks: Callbacks,
}

impl Ellipsoid {
    /// Creates ellipsoids from flat xyz centers.
    #[must_use]
    pub fn new(centers: Vec<f32>) -> Self {
        Self {
            centers,
            radii: None,
            colors: None,
            alphas: None,
            radius: default_radius(),
            color: default_color(),
            alpha: default_alpha(),
            decorations: Vec::new(),
            callbacks: Callbacks::default(),
        }
    }

    /// Creates ellipsoids centered on the given points.
    #[must_use]
    pub fn from_centers(centers: &[Vec3]) -> Self {
        Self::new(flatten(centers))
    }

    /// Sets the shared radius.
    #[must_use]
    pub fn with_radius(mut self, radius: [f32; 3]) -> Self {
        self.radius = radius;
        self
    }

    /// Sets per-instance radii.
    #[must_use]
    pub fn with_radii(mut self, radii: Vec<f32>) -> Self {
        self.radii = Some(radii);
        self
    }

    /// Sets per-instance colors.
    #[must_use]
    pub fn with_colors(mut self, colors: Vec<f32>) -> Self {
        self.colors = Some(colors);
        self
    }

    /// Sets the shared opacity.
    #[must_use]
    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }
}

/// Axis-aligned cuboids.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cuboid {
    /// Flat xyz centers.
    pub centers: Vec<f32>,
    /// Optional flat per-instance extents (3 per instance).
    pub sizes: Option<Vec<f32>>,
    /// Optional flat rgb colors.
    pub colors: Option<Vec<f32>>,
    /// Optional per-instance opacity.
    pub alphas: Option<Vec<f32>>,
    /// Shared extents.
    #[serde(default = "default_cuboid_size", deserialize_with = "scalar_or_vec3")]
    pub size: [f32; 3],
    /// Shared color.
    #[serde(default = "default_color")]
    pub color: [f32; 3],
    /// Shared opacity.
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    /// Sparse overrides.
    #[serde(default)]
    pub decorations: Vec<Decoration>,
    /// Interaction hooks.
    #[serde(skip)]
    pub callbacks: Callbacks,
}

impl Cuboid {
    /// Creates cuboids from flat xyz centers.
    #[must_use]
    pub fn new(centers: Vec<f32>) -> Self {
        Self {
            centers,
            sizes: None,
            colors: None,
            alphas: None,
            size: default_cuboid_size(),
            color: default_color(),
            alpha: default_alpha(),
            decorations: Vec::new(),
            callbacks: Callbacks::default(),
        }
    }

    /// Creates cuboids centered on the given points.
    #[must_use]
    pub fn from_centers(centers: &[Vec3]) -> Self {
        Self::new(flatten(centers))
    }

    /// Sets the shared extents.
    #[must_use]
    pub fn with_size(mut self, size: [f32; 3]) -> Self {
        self.size = size;
        self
    }

    /// Sets per-instance colors.
    #[must_use]
    pub fn with_colors(mut self, colors: Vec<f32>) -> Self {
        self.colors = Some(colors);
        self
    }

    /// Sets per-instance opacity.
    #[must_use]
    pub fn with_alphas(mut self, alphas: Vec<f32>) -> Self {
        self.alphas = Some(alphas);
        self
    }
}

/// One typed batch of drawable instances.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum PrimitiveCollection {
    /// Billboard points.
    PointCloud(PointCloud),
    /// Shaded ellipsoids.
    Ellipsoid(Ellipsoid),
    /// Ellipsoid axis rings.
    EllipsoidAxes(Ellipsoid),
    /// Boxes.
    Cuboid(Cuboid),
    /// A descriptor whose `type` is not recognized. Never drawn, never pickable.
    #[serde(other)]
    Unknown,
}

impl PrimitiveCollection {
    /// Parses a single JSON descriptor.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Parses a JSON array of descriptors.
    pub fn list_from_json_str(json: &str) -> Result<Vec<Self>> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns the primitive kind, or `None` for unknown descriptors.
    #[must_use]
    pub fn kind(&self) -> Option<PrimitiveKind> {
        match self {
            PrimitiveCollection::PointCloud(_) => Some(PrimitiveKind::PointCloud),
            PrimitiveCollection::Ellipsoid(_) => Some(PrimitiveKind::Ellipsoid),
            PrimitiveCollection::EllipsoidAxes(_) => Some(PrimitiveKind::EllipsoidAxes),
            PrimitiveCollection::Cuboid(_) => Some(PrimitiveKind::Cuboid),
            PrimitiveCollection::Unknown => None,
        }
    }

    /// Number of logical instances (points, ellipsoids, boxes).
    #[must_use]
    pub fn count(&self) -> usize {
        self.positions().map_or(0, |p| p.len() / 3)
    }

    /// Flat xyz positions or centers.
    #[must_use]
    pub fn positions(&self) -> Option<&[f32]> {
        match self {
            PrimitiveCollection::PointCloud(pc) => Some(&pc.positions),
            PrimitiveCollection::Ellipsoid(e) | PrimitiveCollection::EllipsoidAxes(e) => {
                Some(&e.centers)
            }
            PrimitiveCollection::Cuboid(c) => Some(&c.centers),
            PrimitiveCollection::Unknown => None,
        }
    }

    /// Interaction hooks, if the collection has any.
    #[must_use]
    pub fn callbacks(&self) -> Option<&Callbacks> {
        match self {
            PrimitiveCollection::PointCloud(pc) => Some(&pc.callbacks),
            PrimitiveCollection::Ellipsoid(e) | PrimitiveCollection::EllipsoidAxes(e) => {
                Some(&e.callbacks)
            }
            PrimitiveCollection::Cuboid(c) => Some(&c.callbacks),
            PrimitiveCollection::Unknown => None,
        }
    }

    /// Mutable access to the interaction hooks.
    pub fn callbacks_mut(&mut self) -> Option<&mut Callbacks> {
        match self {
            PrimitiveCollection::PointCloud(pc) => Some(&mut pc.callbacks),
            PrimitiveCollection::Ellipsoid(e) | PrimitiveCollection::EllipsoidAxes(e) => {
                Some(&mut e.callbacks)
            }
            PrimitiveCollection::Cuboid(c) => Some(&mut c.callbacks),
            PrimitiveCollection::Unknown => None,
        }
    }

    /// Sets the hover hook.
    #[must_use]
    pub fn on_hover(mut self, f: impl Fn(Option<usize>) + Send + Sync + 'static) -> Self {
        if let Some(callbacks) = self.callbacks_mut() {
            callbacks.on_hover = Some(Arc::new(f));
        }
        self
    }

    /// Sets the click hook.
    #[must_use]
    pub fn on_click(mut self, f: impl Fn(usize) + Send + Sync + 'static) -> Self {
        if let Some(callbacks) = self.callbacks_mut() {
            callbacks.on_click = Some(Arc::new(f));
        }
        self
    }

    /// Decorations in application order.
    #[must_use]
    pub fn decorations(&self) -> &[Decoration] {
        match self {
            PrimitiveCollection::PointCloud(pc) => &pc.decorations,
            PrimitiveCollection::Ellipsoid(e) | PrimitiveCollection::EllipsoidAxes(e) => {
                &e.decorations
            }
            PrimitiveCollection::Cuboid(c) => &c.decorations,
            PrimitiveCollection::Unknown => &[],
        }
    }

    /// Appends a decoration.
    #[must_use]
    pub fn with_decoration(mut self, decoration: Decoration) -> Self {
        match &mut self {
            PrimitiveCollection::PointCloud(pc) => pc.decorations.push(decoration),
            PrimitiveCollection::Ellipsoid(e) | PrimitiveCollection::EllipsoidAxes(e) => {
                e.decorations.push(decoration);
            }
            PrimitiveCollection::Cuboid(c) => c.decorations.push(decoration),
            PrimitiveCollection::Unknown => {}
        }
        self
    }

    /// Checks array lengths and returns the instance count.
    pub fn validate(&self) -> Result<usize> {
        let (attribute, positions) = match self {
            PrimitiveCollection::PointCloud(pc) => ("positions", &pc.positions),
            PrimitiveCollection::Ellipsoid(e) | PrimitiveCollection::EllipsoidAxes(e) => {
                ("centers", &e.centers)
            }
            PrimitiveCollection::Cuboid(c) => ("centers", &c.centers),
            PrimitiveCollection::Unknown => return Err(Scene3dError::UnknownPrimitiveKind),
        };
        if positions.len() % 3 != 0 {
            return Err(Scene3dError::RaggedPositions {
                attribute,
                len: positions.len(),
            });
        }
        let count = positions.len() / 3;

        match self {
            PrimitiveCollection::PointCloud(pc) => {
                check_len("colors", pc.colors.as_deref(), count * 3)?;
                check_len("alphas", pc.alphas.as_deref(), count)?;
                check_len("sizes", pc.sizes.as_deref(), count)?;
            }
            PrimitiveCollection::Ellipsoid(e) | PrimitiveCollection::EllipsoidAxes(e) => {
                check_len("colors", e.colors.as_deref(), count * 3)?;
                check_len("alphas", e.alphas.as_deref(), count)?;
                check_len("radii", e.radii.as_deref(), count * 3)?;
            }
            PrimitiveCollection::Cuboid(c) => {
                check_len("colors", c.colors.as_deref(), count * 3)?;
                check_len("alphas", c.alphas.as_deref(), count)?;
                check_len("sizes", c.sizes.as_deref(), count * 3)?;
            }
            PrimitiveCollection::Unknown => {}
        }
        Ok(count)
    }
}

fn check_len(attribute: &'static str, values: Option<&[f32]>, expected: usize) -> Result<()> {
    match values {
        Some(values) if values.len() != expected => Err(Scene3dError::SizeMismatch {
            attribute,
            expected,
            actual: values.len(),
        }),
        _ => Ok(()),
    }
}

impl From<PointCloud> for PrimitiveCollection {
    fn from(pc: PointCloud) -> Self {
        PrimitiveCollection::PointCloud(pc)
    }
}

impl From<Cuboid> for PrimitiveCollection {
    fn from(c: Cuboid) -> Self {
        PrimitiveCollection::Cuboid(c)
    }
}

impl From<Ellipsoid> for PrimitiveCollection {
    fn from(e: Ellipsoid) -> Self {
        PrimitiveCollection::Ellipsoid(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_count_and_kind() {
        let pc: PrimitiveCollection = PointCloud::new(vec![0.0; 9]).into();
        assert_eq!(pc.count(), 3);
        assert_eq!(pc.kind(), Some(PrimitiveKind::PointCloud));

        let axes = PrimitiveCollection::EllipsoidAxes(Ellipsoid::new(vec![0.0; 6]));
        assert_eq!(axes.count(), 2);
        assert_eq!(axes.kind(), Some(PrimitiveKind::EllipsoidAxes));
    }

    #[test]
    fn test_validate_rejects_short_colors() {
        let pc: PrimitiveCollection = PointCloud::new(vec![0.0; 9])
            .with_colors(vec![1.0; 6])
            .into();
        match pc.validate() {
            Err(Scene3dError::SizeMismatch {
                attribute,
                expected,
                actual,
            }) => {
                assert_eq!(attribute, "colors");
                assert_eq!(expected, 9);
                assert_eq!(actual, 6);
            }
            other => panic!("expected size mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_ragged_positions() {
        let c: PrimitiveCollection = Cuboid::new(vec![0.0; 4]).into();
        assert!(matches!(
            c.validate(),
            Err(Scene3dError::RaggedPositions { len: 4, .. })
        ));
    }

    #[test]
    fn test_validate_zero_instances_is_ok() {
        let pc: PrimitiveCollection = PointCloud::new(Vec::new()).into();
        assert_eq!(pc.validate().unwrap(), 0);
    }

    #[test]
    fn test_from_json_descriptor() {
        let json = r#"[
            {"type": "PointCloud", "positions": [0, 0, 0, 1, 1, 1], "size": 0.5},
            {"type": "Ellipsoid", "centers": [0, 0, 0], "radius": 0.25, "alpha": 0.7},
            {"type": "Cuboid", "centers": [1, 2, 3], "size": [1, 2, 3],
             "decorations": [{"indexes": [0], "color": [1, 0, 0], "minSize": 2}]},
            {"type": "LineBeams", "positions": [0, 0, 0, 0]}
        ]"#;
        let list = PrimitiveCollection::list_from_json_str(json).unwrap();
        assert_eq!(list.len(), 4);

        let PrimitiveCollection::PointCloud(pc) = &list[0] else {
            panic!("expected point cloud");
        };
        assert_eq!(pc.size, 0.5);
        assert_eq!(pc.color, [0.5, 0.5, 0.5]);

        let PrimitiveCollection::Ellipsoid(e) = &list[1] else {
            panic!("expected ellipsoid");
        };
        assert_eq!(e.radius, [0.25, 0.25, 0.25]);
        assert_eq!(e.alpha, 0.7);

        let PrimitiveCollection::Cuboid(c) = &list[2] else {
            panic!("expected cuboid");
        };
        assert_eq!(c.size, [1.0, 2.0, 3.0]);
        assert_eq!(c.decorations[0].min_size, Some(2.0));

        assert_eq!(list[3], PrimitiveCollection::Unknown);
        assert_eq!(list[3].count(), 0);
    }

    #[test]
    fn test_callbacks_compare_by_identity() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let a: PrimitiveCollection = PointCloud::new(vec![0.0; 3]).into();
        let a = a.on_click(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let b = a.clone();
        assert_eq!(a, b);

        let c = b.clone().on_click(|_| {});
        assert_ne!(a, c);

        a.callbacks().unwrap().click(0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
