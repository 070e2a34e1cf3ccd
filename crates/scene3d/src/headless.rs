//! One-shot offscreen rendering.
//!
//! Useful for tests, batch jobs and thumbnails where no window exists.

use std::path::Path;

use pollster::FutureExt;
use scene3d_core::{CameraState, EngineOptions, PrimitiveCollection, Result};

use crate::{render_error, Scene3d};

/// Renders `collections` into a `width` x `height` RGBA buffer.
///
/// Pixels are row-major from the top-left, 4 bytes each.
///
/// # Example
/// ```no_run
/// use scene3d::*;
///
/// let boxes = Cuboid::from_centers(&[Vec3::ZERO]).with_size([1.0, 2.0, 0.5]);
/// let pixels = render_to_image(&[boxes.into()], &CameraState::default(), 320, 240).unwrap();
/// assert_eq!(pixels.len(), 320 * 240 * 4);
/// ```
pub fn render_to_image(
    collections: &[PrimitiveCollection],
    camera: &CameraState,
    width: u32,
    height: u32,
) -> Result<Vec<u8>> {
    let mut scene = Scene3d::headless(width, height, EngineOptions::default()).block_on()?;
    scene.render(collections, camera, (width, height))?;
    let pixels = scene.capture();
    scene.destroy();
    pixels
}

/// Renders `collections` and saves the frame as PNG or JPEG.
pub fn render_to_file(
    path: impl AsRef<Path>,
    collections: &[PrimitiveCollection],
    camera: &CameraState,
    width: u32,
    height: u32,
) -> Result<()> {
    let pixels = render_to_image(collections, camera, width, height)?;
    scene3d_render::save_image(path, &pixels, width, height)
        .map_err(|e| render_error("failed to save image", e))
}
