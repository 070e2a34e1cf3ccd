//! Core data model for scene3d-rs.
//!
//! This crate holds everything that does not touch the GPU:
//! - [`PrimitiveCollection`] and its per-kind payloads, loadable from JSON
//! - [`Decoration`] overrides and the packed instance record layouts
//! - [`IdMapping`] from global pick IDs to `(collection, instance)` pairs
//! - the pick color codec and the [`PickGate`] / [`HoverTracker`] state
//! - [`CameraState`] and [`EngineOptions`]

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]
// Instance counts stay far below f32/u32 precision limits
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::float_cmp)]

pub mod camera;
pub mod collection;
pub mod decoration;
pub mod error;
pub mod id_map;
pub mod layout;
pub mod options;
pub mod pick;

pub use camera::CameraState;
pub use collection::{
    Callbacks, ClickCallback, Cuboid, Ellipsoid, HoverCallback, PointCloud, PrimitiveCollection,
    PrimitiveKind,
};
pub use decoration::{apply_decorations, Decoration};
pub use error::{Result, Scene3dError};
pub use id_map::{IdMapping, IdRange, PickTarget, MAX_PICK_ID};
pub use layout::RecordLayout;
pub use options::{EngineOptions, LightingConfig, PowerMode};
pub use pick::{
    decode_pick_color, encode_pick_id, HoverChange, HoverTracker, PickGate, PickMode, PickTicket,
    Throttle,
};

// Re-export glam types for convenience
pub use glam::{Mat4, Vec3, Vec4};
