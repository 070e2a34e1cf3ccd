//! Saving captured frames.

use std::path::Path;

use image::{ImageBuffer, Rgba};

/// Error type for screenshot operations.
#[derive(Debug, thiserror::Error)]
pub enum ScreenshotError {
    #[error("failed to save image: {0}")]
    IoError(#[from] std::io::Error),

    #[error("image encoding error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("pixel data does not match {width}x{height}")]
    InvalidImageData { width: u32, height: u32 },
}

fn to_image(
    rgba: &[u8],
    width: u32,
    height: u32,
) -> Result<ImageBuffer<Rgba<u8>, Vec<u8>>, ScreenshotError> {
    ImageBuffer::from_raw(width, height, rgba.to_vec())
        .ok_or(ScreenshotError::InvalidImageData { width, height })
}

/// Saves tightly packed RGBA pixels as PNG or JPEG, chosen by extension.
pub fn save_image(
    path: impl AsRef<Path>,
    rgba: &[u8],
    width: u32,
    height: u32,
) -> Result<(), ScreenshotError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let img = to_image(rgba, width, height)?;
    match extension.as_str() {
        "png" => img.save_with_format(path, image::ImageFormat::Png)?,
        "jpg" | "jpeg" => {
            // JPEG has no alpha
            let rgb = image::DynamicImage::ImageRgba8(img).to_rgb8();
            rgb.save_with_format(path, image::ImageFormat::Jpeg)?;
        }
        _ => return Err(ScreenshotError::UnsupportedFormat(extension)),
    }
    Ok(())
}

/// Encodes tightly packed RGBA pixels as PNG in memory.
pub fn encode_png(rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ScreenshotError> {
    let img = to_image(rgba, width, height)?;
    let mut buffer = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buffer, image::ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_round_trip() {
        let pixels: Vec<u8> = (0..16).collect();
        let png = encode_png(&pixels, 2, 2).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (2, 2));
        assert_eq!(decoded.into_raw(), pixels);
    }

    #[test]
    fn test_size_mismatch() {
        assert!(matches!(
            encode_png(&[0; 12], 2, 2),
            Err(ScreenshotError::InvalidImageData {
                width: 2,
                height: 2
            })
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = save_image("frame.bmpx", &[0; 4], 1, 1).unwrap_err();
        assert!(matches!(err, ScreenshotError::UnsupportedFormat(ext) if ext == "bmpx"));
    }
}
