use image::RgbaImage;

use super::raster::{hex, Canvas, GLYPH_H};

const CARD_BACKGROUND: u32 = 0xf4f4f4;
const CARD_INK: u32 = 0x2d3b4f;

/// Card height for a given width (portrait, 1:1.3).
pub fn card_height(width: u32) -> u32 {
    (width as f32 * 1.3).round() as u32
}

/// Placeholder cover for documents that are not rasterized: a light card
/// with a centered label.
pub fn render_card(label: &str, width: u32) -> RgbaImage {
    let height = card_height(width);
    let mut canvas = Canvas::new(width, height, hex(CARD_BACKGROUND));

    // Cap height of a font sized at a fifth of the card width.
    let cap_height = width as f32 * 0.2 * 0.7;
    let cell = (cap_height / GLYPH_H as f32).max(1.0);
    canvas.draw_text(
        label,
        width as f32 / 2.0,
        height as f32 / 2.0,
        cell,
        hex(CARD_INK),
    );

    canvas.into_image()
}
