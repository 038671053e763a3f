use image::{Rgba, RgbaImage};

/// `#rrggbb` → opaque RGBA. Only used with literal colors.
pub const fn hex(rgb: u32) -> Rgba<u8> {
    Rgba([(rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8, 255])
}

/// A small software canvas over an RGBA buffer. Shapes are anti-aliased by
/// pixel coverage so thumbnails stay readable at grid size.
pub struct Canvas {
    img: RgbaImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32, background: Rgba<u8>) -> Self {
        Self {
            img: RgbaImage::from_pixel(width.max(1), height.max(1), background),
        }
    }

    pub fn into_image(self) -> RgbaImage {
        self.img
    }

    fn blend(&mut self, x: i64, y: i64, color: Rgba<u8>, coverage: f32) {
        if coverage <= 0.0 || x < 0 || y < 0 {
            return;
        }
        let (x, y) = (x as u32, y as u32);
        if x >= self.img.width() || y >= self.img.height() {
            return;
        }
        let a = coverage.min(1.0) * (color[3] as f32 / 255.0);
        let dst = self.img.get_pixel_mut(x, y);
        for c in 0..3 {
            dst[c] = (color[c] as f32 * a + dst[c] as f32 * (1.0 - a)).round() as u8;
        }
        dst[3] = dst[3].max((a * 255.0).round() as u8);
    }

    /// Axis-aligned rectangle with fractional edges.
    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba<u8>) {
        let (x1, y1) = (x + w, y + h);
        for py in y.floor() as i64..y1.ceil() as i64 {
            let cy = overlap(py as f32, y, y1);
            for px in x.floor() as i64..x1.ceil() as i64 {
                let cx = overlap(px as f32, x, x1);
                self.blend(px, py, color, cx * cy);
            }
        }
    }

    pub fn hline(&mut self, x0: f32, x1: f32, y: f32, thickness: f32, color: Rgba<u8>) {
        self.fill_rect(x0, y - thickness / 2.0, x1 - x0, thickness, color);
    }

    pub fn vline(&mut self, x: f32, y0: f32, y1: f32, thickness: f32, color: Rgba<u8>) {
        self.fill_rect(x - thickness / 2.0, y0, thickness, y1 - y0, color);
    }

    pub fn fill_circle(&mut self, cx: f32, cy: f32, r: f32, color: Rgba<u8>) {
        self.for_each_in_disc(cx, cy, r + 1.0, |d| (r + 0.5 - d).clamp(0.0, 1.0), color);
    }

    pub fn stroke_circle(&mut self, cx: f32, cy: f32, r: f32, width: f32, color: Rgba<u8>) {
        let (inner, outer) = (r - width / 2.0, r + width / 2.0);
        self.for_each_in_disc(
            cx,
            cy,
            outer + 1.0,
            |d| (outer + 0.5 - d).min(d - inner + 0.5).clamp(0.0, 1.0),
            color,
        );
    }

    fn for_each_in_disc<F>(&mut self, cx: f32, cy: f32, reach: f32, coverage: F, color: Rgba<u8>)
    where
        F: Fn(f32) -> f32,
    {
        let (x0, x1) = ((cx - reach).floor() as i64, (cx + reach).ceil() as i64);
        let (y0, y1) = ((cy - reach).floor() as i64, (cy + reach).ceil() as i64);
        for py in y0..=y1 {
            for px in x0..=x1 {
                let dx = px as f32 + 0.5 - cx;
                let dy = py as f32 + 0.5 - cy;
                let d = (dx * dx + dy * dy).sqrt();
                self.blend(px, py, color, coverage(d));
            }
        }
    }

    /// Draw `text` centered on `(cx, cy)` with the built-in block font.
    /// `cell` is the size of one font pixel. Unknown characters are skipped
    /// but keep their advance.
    pub fn draw_text(&mut self, text: &str, cx: f32, cy: f32, cell: f32, color: Rgba<u8>) {
        let advance = (GLYPH_W + 1) as f32 * cell;
        let count = text.chars().count() as f32;
        let total_w = advance * count - cell;
        let mut x = cx - total_w / 2.0;
        let y = cy - GLYPH_H as f32 * cell / 2.0;
        for ch in text.chars() {
            if let Some(rows) = glyph(ch) {
                for (row, bits) in rows.iter().enumerate() {
                    for col in 0..GLYPH_W {
                        if bits & (1 << (GLYPH_W - 1 - col)) != 0 {
                            self.fill_rect(
                                x + col as f32 * cell,
                                y + row as f32 * cell,
                                cell,
                                cell,
                                color,
                            );
                        }
                    }
                }
            }
            x += advance;
        }
    }
}

/// Fraction of the unit span starting at `p` covered by `[lo, hi)`.
fn overlap(p: f32, lo: f32, hi: f32) -> f32 {
    ((p + 1.0).min(hi) - p.max(lo)).clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Block font
// ---------------------------------------------------------------------------

pub const GLYPH_W: usize = 5;
pub const GLYPH_H: usize = 7;

/// 5x7 glyphs for the labels drawn on placeholder cards.
fn glyph(ch: char) -> Option<[u8; GLYPH_H]> {
    let rows = match ch.to_ascii_uppercase() {
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        _ => return None,
    };
    Some(rows)
}
