use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};
use tracing::debug;

/// Probe pixel dimensions without decoding the whole image.
pub fn image_dimensions(path: &Path) -> Result<(u32, u32)> {
    image::image_dimensions(path).with_context(|| format!("Failed to read image: {:?}", path))
}

/// Thumbnail files are content-addressed: named by the original's checksum
/// and the requested bounding box.
pub fn thumbnail_path(folder: &Path, checksum: &str, size: (u32, u32)) -> PathBuf {
    folder.join(format!("{}-{}x{}.jpg", checksum, size.0, size.1))
}

/// Render a JPEG thumbnail fitting `max_size`, preserving aspect ratio.
/// JPEG rejects source color modes with alpha or palette data; on that
/// error the image is converted to RGB and the save retried once.
pub fn render_thumbnail(src: &Path, dst: &Path, max_size: (u32, u32)) -> Result<()> {
    let img = image::open(src).with_context(|| format!("Failed to open image: {:?}", src))?;
    let thumb = img.thumbnail(max_size.0, max_size.1);
    if let Err(err) = thumb.save_with_format(dst, ImageFormat::Jpeg) {
        debug!(%err, ?dst, "converting color mode for jpeg thumbnail");
        DynamicImage::ImageRgb8(thumb.to_rgb8())
            .save_with_format(dst, ImageFormat::Jpeg)
            .with_context(|| format!("Failed to write thumbnail: {:?}", dst))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn test_thumbnail_path_layout() {
        let p = thumbnail_path(Path::new("/tmp/thumbs"), "abcd", (150, 150));
        assert_eq!(p, PathBuf::from("/tmp/thumbs/abcd-150x150.jpg"));
    }

    #[test]
    fn test_render_thumbnail_bounds() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let src = dir.path().join("src.png");
        let dst = dir.path().join("out.jpg");
        let img = RgbImage::from_pixel(300, 200, Rgb([0, 128, 255]));
        img.save(&src)?;
        render_thumbnail(&src, &dst, (150, 150))?;
        let (w, h) = image_dimensions(&dst)?;
        assert!(w <= 150 && h <= 150);
        Ok(())
    }

    #[test]
    fn test_rgba_source_converts_to_jpeg() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let src = dir.path().join("src.png");
        let dst = dir.path().join("out.jpg");
        let img = RgbaImage::from_pixel(100, 100, Rgba([255, 0, 0, 128]));
        img.save(&src)?;
        render_thumbnail(&src, &dst, (150, 150))?;
        // must be decodable as a real jpeg
        let decoded = image::open(&dst)?;
        assert!(decoded.width() <= 150 && decoded.height() <= 150);
        Ok(())
    }
}
