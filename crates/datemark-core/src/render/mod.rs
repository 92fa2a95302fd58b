//! Date watermark rendering.
//!
//! [`WatermarkRenderer`] rasterizes the date text into a coverage mask, places
//! it according to the style's [`Position`](crate::style::Position) and blends
//! it into a copy of the source image. The source is never modified and the
//! result keeps the source's dimensions and color type.

pub mod composite;
pub mod font;
pub mod position;

use image::{ColorType, DynamicImage, GenericImageView, GrayImage};
use thiserror::Error;

use crate::style::StyleConfig;

pub use font::{FontSource, TextFont};
pub use position::MARGIN;

/// Unrecoverable drawing failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("nothing to draw: watermark text is empty")]
    EmptyText,

    #[error("no available font can draw '{0}'")]
    MissingGlyph(char),

    #[error("text '{0}' rasterized to no visible pixels")]
    NothingDrawn(String),

    #[error("text at font size {0} is too large to rasterize")]
    TextTooLarge(u32),
}

/// Renders date text with one style and one font, shared across files.
#[derive(Debug)]
pub struct WatermarkRenderer {
    style: StyleConfig,
    font: TextFont,
    margin: u32,
}

impl WatermarkRenderer {
    /// Load the style's font through the fallback chain.
    pub fn new(style: &StyleConfig) -> Self {
        Self::with_font(style, TextFont::load(style.font_path()))
    }

    pub fn with_font(style: &StyleConfig, font: TextFont) -> Self {
        Self {
            style: style.clone(),
            font,
            margin: MARGIN,
        }
    }

    pub fn font_source(&self) -> &FontSource {
        self.font.source()
    }

    /// Where `text` lands on `image`: origin and size of the text box.
    pub fn text_box(
        &self,
        image: &DynamicImage,
        text: &str,
    ) -> Result<((i64, i64), (u32, u32)), RenderError> {
        let (mask, origin) = self.place(image, text)?;
        Ok((origin, mask.dimensions()))
    }

    fn place(&self, image: &DynamicImage, text: &str) -> Result<(GrayImage, (i64, i64)), RenderError> {
        let mask = self.font.rasterize(text, self.style.font_size())?;
        let origin = position::text_origin(
            self.style.position(),
            image.dimensions(),
            mask.dimensions(),
            self.margin,
        );
        Ok((mask, origin))
    }

    /// Composite `text` onto a copy of `image`.
    pub fn render(&self, image: &DynamicImage, text: &str) -> Result<DynamicImage, RenderError> {
        let (mask, origin) = self.place(image, text)?;
        let color = self.style.color();
        let opacity = self.style.opacity();

        let color_type = image.color();
        let blended = match color_type {
            ColorType::Rgb32F | ColorType::Rgba32F => {
                let mut buf = image.to_rgba32f();
                composite::blend_mask(&mut buf, &mask, origin, color, opacity);
                DynamicImage::ImageRgba32F(buf)
            }
            ColorType::L16 | ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16 => {
                let mut buf = image.to_rgba16();
                composite::blend_mask(&mut buf, &mask, origin, color, opacity);
                DynamicImage::ImageRgba16(buf)
            }
            _ => {
                let mut buf = image.to_rgba8();
                composite::blend_mask(&mut buf, &mask, origin, color, opacity);
                DynamicImage::ImageRgba8(buf)
            }
        };

        Ok(restore_color_type(blended, color_type))
    }
}

/// One-shot render: load the style's font and composite `text` onto `image`.
pub fn render(
    image: &DynamicImage,
    text: &str,
    style: &StyleConfig,
) -> Result<DynamicImage, RenderError> {
    WatermarkRenderer::new(style).render(image, text)
}

/// Convert the blended RGBA buffer back to the source's color type so the
/// source encoder can write it.
fn restore_color_type(image: DynamicImage, color_type: ColorType) -> DynamicImage {
    match color_type {
        ColorType::L8 => DynamicImage::ImageLuma8(image.to_luma8()),
        ColorType::La8 => DynamicImage::ImageLumaA8(image.to_luma_alpha8()),
        ColorType::Rgb8 => DynamicImage::ImageRgb8(image.to_rgb8()),
        ColorType::L16 => DynamicImage::ImageLuma16(image.to_luma16()),
        ColorType::La16 => DynamicImage::ImageLumaA16(image.to_luma_alpha16()),
        ColorType::Rgb16 => DynamicImage::ImageRgb16(image.to_rgb16()),
        ColorType::Rgb32F => DynamicImage::ImageRgb32F(image.to_rgb32f()),
        ColorType::Rgba32F => DynamicImage::ImageRgba32F(image.to_rgba32f()),
        _ => image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{Color, Position};
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn style(position: Position, opacity: f32) -> StyleConfig {
        StyleConfig::new(36, Color::new(255, 0, 0), position, opacity, None).unwrap()
    }

    fn builtin(style: &StyleConfig) -> WatermarkRenderer {
        WatermarkRenderer::with_font(style, TextFont::builtin())
    }

    fn gradient(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            Rgb([(x % 251) as u8, (y % 241) as u8, ((x + y) % 199) as u8])
        }))
    }

    /// Bounding box of pixels that differ between two same-sized images.
    fn changed_box(a: &DynamicImage, b: &DynamicImage) -> Option<(u32, u32, u32, u32)> {
        let (a, b) = (a.to_rgba8(), b.to_rgba8());
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, p) in a.enumerate_pixels() {
            if p == b.get_pixel(x, y) {
                continue;
            }
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
        bounds
    }

    #[test]
    fn test_render_keeps_dimensions_and_color_type() {
        let src = gradient(320, 200);
        let out = builtin(&style(Position::BottomRight, 0.9)).render(&src, "2023-06-01").unwrap();
        assert_eq!(out.dimensions(), (320, 200));
        assert_eq!(out.color(), ColorType::Rgb8);
        assert_ne!(out, src);
    }

    #[test]
    fn test_zero_opacity_round_trip() {
        let src = gradient(300, 120);
        for position in Position::ALL {
            let out = builtin(&style(position, 0.0)).render(&src, "2023-06-01").unwrap();
            assert_eq!(out, src, "{position}");
        }
    }

    #[test]
    fn test_full_opacity_paints_color() {
        let src = DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 120, Rgb([0, 0, 255])));
        let out = builtin(&style(Position::TopLeft, 1.0)).render(&src, "2023-06-01").unwrap();

        let rgb = out.to_rgb8();
        let red = rgb.pixels().filter(|p| **p == Rgb([255, 0, 0])).count();
        let other = rgb
            .pixels()
            .filter(|p| **p != Rgb([255, 0, 0]) && **p != Rgb([0, 0, 255]))
            .count();
        assert!(red > 0);
        // The builtin face has no antialiasing: pixels are either painted or untouched
        assert_eq!(other, 0);
    }

    #[test]
    fn test_text_stays_inside_for_every_position() {
        let probe = builtin(&style(Position::Center, 1.0));
        let (_, (tw, th)) = probe.text_box(&gradient(1000, 1000), "2023-06-01").unwrap();
        let src = gradient(2 * MARGIN + tw, 2 * MARGIN + th);

        for position in Position::ALL {
            let renderer = builtin(&style(position, 1.0));
            let ((x, y), (w, h)) = renderer.text_box(&src, "2023-06-01").unwrap();
            assert!(x >= 0 && y >= 0);
            assert!(x as u32 + w <= src.width() && y as u32 + h <= src.height());

            let out = renderer.render(&src, "2023-06-01").unwrap();
            let (x0, y0, x1, y1) = changed_box(&src, &out).unwrap();
            assert!(x0 >= x as u32 && y0 >= y as u32, "{position}");
            assert!(x1 < x as u32 + w && y1 < y as u32 + h, "{position}");
        }
    }

    #[test]
    fn test_bottom_right_near_corner() {
        let src = gradient(640, 480);
        let renderer = builtin(&style(Position::BottomRight, 0.9));
        let ((x, y), (w, h)) = renderer.text_box(&src, "2023-06-01").unwrap();
        assert_eq!(x + w as i64, 640 - MARGIN as i64);
        assert_eq!(y + h as i64, 480 - MARGIN as i64);
    }

    #[test]
    fn test_alpha_channel_preserved() {
        let src = DynamicImage::ImageRgba8(RgbaImage::from_pixel(300, 100, Rgba([0, 0, 0, 77])));
        let out = builtin(&style(Position::Center, 1.0)).render(&src, "2024-02-29").unwrap();
        assert_eq!(out.color(), ColorType::Rgba8);
        assert!(out.to_rgba8().pixels().all(|p| p[3] == 77));
    }

    #[test]
    fn test_sixteen_bit_source_stays_sixteen_bit() {
        let src = DynamicImage::ImageRgb16(image::ImageBuffer::from_pixel(
            300,
            100,
            Rgb([1000u16, 2000, 3000]),
        ));
        let out = builtin(&style(Position::Center, 0.0)).render(&src, "2024-02-29").unwrap();
        assert_eq!(out.color(), ColorType::Rgb16);
        assert_eq!(out, src);
    }

    #[test]
    fn test_float_source_round_trips_exactly() {
        let src = DynamicImage::ImageRgb32F(image::ImageBuffer::from_fn(300, 100, |x, y| {
            Rgb([0.123456 + x as f32 * 1e-4, 0.5, 0.987654 - y as f32 * 1e-4])
        }));
        let out = builtin(&style(Position::Center, 0.0)).render(&src, "2024-02-29").unwrap();
        assert_eq!(out.color(), ColorType::Rgb32F);
        assert_eq!(out, src);

        let painted = builtin(&style(Position::Center, 1.0)).render(&src, "2024-02-29").unwrap();
        let (x0, y0, _, _) = changed_box(&src, &painted).unwrap();
        // Untouched pixels keep their exact float values
        assert_eq!(painted.as_rgb32f().unwrap().get_pixel(0, 0), src.as_rgb32f().unwrap().get_pixel(0, 0));
        assert!(x0 > 0 && y0 > 0);
    }

    #[test]
    fn test_empty_text_is_render_error() {
        let src = gradient(100, 100);
        let result = builtin(&style(Position::Center, 1.0)).render(&src, "");
        assert_eq!(result, Err(RenderError::EmptyText));
    }

    #[test]
    fn test_render_with_loaded_font() {
        // Whatever font the chain lands on must draw a date
        let src = gradient(400, 200);
        let out = render(&src, "2023-07-15", &style(Position::BottomLeft, 1.0)).unwrap();
        assert!(changed_box(&src, &out).is_some());
    }
}
