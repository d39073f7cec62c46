//! Image encoding: composed grid → base64 JPEG wrapped in `ImageData`.
//!
//! A batch grid is 1200 × 2400 px at the default layout. As PNG that is
//! several megabytes of mostly-white scan; JPEG at quality 85 keeps headings
//! legible at a fraction of the payload, which matters when ten batches are
//! in flight at once.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use tracing::debug;

/// Encode a composed grid as a base64 JPEG ready for the vision API.
pub fn encode_grid(grid: &RgbImage, quality: u8) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(grid)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} grid → {} bytes JPEG, {} bytes base64",
        grid.width(),
        grid.height(),
        buf.len(),
        b64.len()
    );

    Ok(ImageData::new(b64, "image/jpeg").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn encode_small_grid() {
        let img = RgbImage::from_pixel(20, 10, Rgb([255, 255, 255]));
        let data = encode_grid(&img, 85).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/jpeg");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        // JPEG SOI marker
        assert_eq!(&decoded[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn lower_quality_is_not_larger() {
        let img = RgbImage::from_fn(64, 64, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 128]));
        let hi = encode_grid(&img, 95).unwrap();
        let lo = encode_grid(&img, 10).unwrap();
        assert!(lo.data.len() <= hi.data.len());
    }
}
