//! scene3d-rs: instanced 3D primitives with GPU picking.
//!
//! Hand a list of primitive collections and a camera to [`Scene3d::render`]
//! every frame; the scene only rebuilds GPU data when the collections
//! change. Pointer events resolve to `(collection, instance)` pairs through
//! an offscreen ID pass and fire the collections' `on_hover`/`on_click` hooks.
//!
//! # Quick Start
//!
//! ```no_run
//! use pollster::FutureExt;
//! use scene3d::*;
//!
//! fn main() -> Result<()> {
//!     init_logging();
//!
//!     let points = PrimitiveCollection::from(
//!         PointCloud::from_points(&[Vec3::ZERO, Vec3::X, Vec3::Y]).with_size(0.2),
//!     )
//!     .on_click(|i| println!("clicked point {i}"));
//!
//!     let mut scene = Scene3d::headless(640, 480, EngineOptions::default()).block_on()?;
//!     scene.render(&[points], &CameraState::default(), (640, 480))?;
//!     scene.pointer_clicked(320.0, 240.0);
//!     scene.finish_picks();
//!     Ok(())
//! }
//! ```
//!
//! # Primitives
//!
//! - [`PointCloud`] - camera-facing discs
//! - [`Ellipsoid`] - shaded ellipsoids, or their three axis rings
//! - [`Cuboid`] - axis-aligned boxes
//!
//! Collections can also be loaded from JSON descriptors with
//! [`PrimitiveCollection::list_from_json_str`].

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

mod headless;
mod scene;

pub use headless::{render_to_file, render_to_image};
pub use scene::Scene3d;

// Re-export core types
pub use scene3d_core::{
    CameraState, Callbacks, Cuboid, Decoration, Ellipsoid, EngineOptions, IdMapping,
    LightingConfig, PickMode, PickTarget, PointCloud, PowerMode, PrimitiveCollection,
    PrimitiveKind, Result, Scene3dError, Mat4, Vec3, Vec4,
};

// Re-export render types
pub use scene3d_render::{
    PickPoll, PickRequest, PickResolution, RenderEngine, RenderError, ScreenshotError,
};

/// Initializes `env_logger` once; later calls are ignored.
///
/// Verbosity follows `RUST_LOG`, e.g. `RUST_LOG=scene3d_render=debug`.
pub fn init_logging() {
    let _ = env_logger::try_init();
}

pub(crate) fn render_error(context: &str, err: impl std::fmt::Display) -> Scene3dError {
    Scene3dError::RenderError(format!("{context}: {err}"))
}
