use image::{GrayImage, ImageBuffer, Pixel, Rgba};

use crate::style::Color;

/// Channel types the blender works in.
pub(crate) trait Channel: Copy {
    fn to_unit(self) -> f32;
    fn from_unit(v: f32) -> Self;
}

impl Channel for u8 {
    fn to_unit(self) -> f32 {
        self as f32 / u8::MAX as f32
    }

    fn from_unit(v: f32) -> Self {
        (v * u8::MAX as f32).round().clamp(0.0, u8::MAX as f32) as u8
    }
}

impl Channel for u16 {
    fn to_unit(self) -> f32 {
        self as f32 / u16::MAX as f32
    }

    fn from_unit(v: f32) -> Self {
        (v * u16::MAX as f32).round().clamp(0.0, u16::MAX as f32) as u16
    }
}

impl Channel for f32 {
    fn to_unit(self) -> f32 {
        self
    }

    fn from_unit(v: f32) -> Self {
        v.clamp(0.0, 1.0)
    }
}

/// Blend `color` into `target` through a coverage `mask` placed at `origin`.
///
/// Per pixel, `a = opacity * coverage` and `out = in * (1 - a) + color * a`.
/// Pixels with zero coverage and mask pixels outside the canvas are left
/// alone; the alpha channel is never modified.
pub(crate) fn blend_mask<S>(
    target: &mut ImageBuffer<Rgba<S>, Vec<S>>,
    mask: &GrayImage,
    origin: (i64, i64),
    color: Color,
    opacity: f32,
) where
    S: Channel,
    Rgba<S>: Pixel<Subpixel = S>,
{
    let opacity = opacity.clamp(0.0, 1.0);
    let (width, height) = (target.width() as i64, target.height() as i64);
    let color = color.to_array().map(|c| c as f32 / 255.0);

    for (mx, my, coverage) in mask.enumerate_pixels() {
        let x = origin.0 + mx as i64;
        let y = origin.1 + my as i64;
        if x < 0 || y < 0 || x >= width || y >= height {
            continue;
        }

        let alpha = opacity * (coverage[0] as f32 / 255.0);
        if alpha <= 0.0 {
            continue;
        }

        let pixel = target.get_pixel_mut(x as u32, y as u32);
        for (channel, c) in pixel.0.iter_mut().take(3).zip(color) {
            let blended = channel.to_unit() * (1.0 - alpha) + c * alpha;
            *channel = S::from_unit(blended);
        }
    }
}
