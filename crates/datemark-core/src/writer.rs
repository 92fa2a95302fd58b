use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

use crate::media::SupportedFormat;

/// JPEG quality used for watermarked output.
pub const JPEG_QUALITY: u8 = 95;

/// Encode `image` to `dest` in `format`, creating parent directories.
pub fn write_image(image: &DynamicImage, dest: &Path, format: SupportedFormat) -> anyhow::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut out = BufWriter::new(File::create(dest)?);
    match format {
        SupportedFormat::Jpeg => {
            // JPEG has no alpha channel
            let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
            if image.color().has_alpha() {
                DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder)?;
            } else {
                image.write_with_encoder(encoder)?;
            }
        }
        other => image.write_to(&mut out, other.image_format())?,
    }

    out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(())
}
