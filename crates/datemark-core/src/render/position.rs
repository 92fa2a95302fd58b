//! Text placement.
//!
//! Origins are signed: text larger than the image yields negative coordinates
//! and the compositor clips whatever falls outside the canvas.

use crate::style::Position;

/// Gap between the text and the image edges for non-center positions.
pub const MARGIN: u32 = 20;

/// Top-left corner of a `text`-sized box placed on an `image`-sized canvas.
pub fn text_origin(
    position: Position,
    image: (u32, u32),
    text: (u32, u32),
    margin: u32,
) -> (i64, i64) {
    let (img_w, img_h) = (image.0 as i64, image.1 as i64);
    let (txt_w, txt_h) = (text.0 as i64, text.1 as i64);
    let m = margin as i64;

    match position {
        Position::TopLeft => (m, m),
        Position::TopRight => (img_w - txt_w - m, m),
        Position::BottomLeft => (m, img_h - txt_h - m),
        Position::BottomRight => (img_w - txt_w - m, img_h - txt_h - m),
        Position::Center => ((img_w - txt_w) / 2, (img_h - txt_h) / 2),
    }
}
