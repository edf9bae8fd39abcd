// ============================================================
// Layer 6 — Image Rendering
// ============================================================
// Pixel-level drawing for the two visual artifacts:
//
//   ConfusionMatrix::render → heat map, rows = predicted,
//                             columns = true, counts overlaid
//   overlay_heatmap         → Grad-CAM saliency blended over
//                             the input image with a jet map
//
// Text uses a built-in 3×5 bitmap font (digits, A–Z and a few
// symbols) so no font files are needed. Lowercase is drawn as
// uppercase.

use anyhow::{anyhow, Context, Result};
use image::{imageops, imageops::FilterType, ImageBuffer, Luma, Rgb, RgbImage};
use std::path::Path;

use crate::domain::confusion::ConfusionMatrix;

const CELL:        u32 = 64;
const FONT_SCALE:  u32 = 2;
const MARGIN:      u32 = 12;
const MAX_LABEL:   usize = 16;
const WHITE:       Rgb<u8> = Rgb([255, 255, 255]);
const BLACK:       Rgb<u8> = Rgb([0, 0, 0]);
const LOW_COLOUR:  [f32; 3] = [247.0, 251.0, 255.0];
const HIGH_COLOUR: [f32; 3] = [8.0, 48.0, 107.0];

// ─── Bitmap font ──────────────────────────────────────────────────────────────
/// Rows of a 3×5 glyph, three low bits per row, MSB on the left.
fn glyph(c: char) -> [u8; 5] {
    match c.to_ascii_uppercase() {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b001, 0b001],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        'A' => [0b010, 0b101, 0b111, 0b101, 0b101],
        'B' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'C' => [0b011, 0b100, 0b100, 0b100, 0b011],
        'D' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'E' => [0b111, 0b100, 0b110, 0b100, 0b111],
        'F' => [0b111, 0b100, 0b110, 0b100, 0b100],
        'G' => [0b011, 0b100, 0b101, 0b101, 0b011],
        'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'J' => [0b001, 0b001, 0b001, 0b101, 0b010],
        'K' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'M' => [0b101, 0b111, 0b111, 0b101, 0b101],
        'N' => [0b110, 0b101, 0b101, 0b101, 0b101],
        'O' => [0b010, 0b101, 0b101, 0b101, 0b010],
        'P' => [0b110, 0b101, 0b110, 0b100, 0b100],
        'Q' => [0b010, 0b101, 0b101, 0b110, 0b011],
        'R' => [0b110, 0b101, 0b110, 0b101, 0b101],
        'S' => [0b011, 0b100, 0b010, 0b001, 0b110],
        'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'U' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'V' => [0b101, 0b101, 0b101, 0b101, 0b010],
        'W' => [0b101, 0b101, 0b111, 0b111, 0b101],
        'X' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'Y' => [0b101, 0b101, 0b010, 0b010, 0b010],
        'Z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '_' => [0b000, 0b000, 0b000, 0b000, 0b111],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        '/' => [0b001, 0b001, 0b010, 0b100, 0b100],
        ' ' => [0b000; 5],
        _   => [0b111, 0b001, 0b010, 0b000, 0b010],
    }
}

/// Pixel width of `text` at `scale`.
pub fn text_width(text: &str, scale: u32) -> u32 {
    let n = text.chars().count() as u32;
    if n == 0 { 0 } else { n * 4 * scale - scale }
}

/// Draw `text` with its top-left corner at (x, y). Clipped to the image.
pub fn draw_text(img: &mut RgbImage, x: u32, y: u32, text: &str, scale: u32, colour: Rgb<u8>) {
    let (w, h) = img.dimensions();
    for (i, c) in text.chars().enumerate() {
        let gx = x + i as u32 * 4 * scale;
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..3u32 {
                if bits & (0b100 >> col) == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let px = gx + col * scale + dx;
                        let py = y + row as u32 * scale + dy;
                        if px < w && py < h {
                            img.put_pixel(px, py, colour);
                        }
                    }
                }
            }
        }
    }
}

fn truncate(label: &str, max_chars: usize) -> String {
    label.chars().take(max_chars).collect()
}

fn fill_rect(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, colour: Rgb<u8>) {
    for py in y..y + h {
        for px in x..x + w {
            img.put_pixel(px, py, colour);
        }
    }
}

/// White → dark blue as `t` goes 0 → 1.
fn blues(t: f32) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    let mut out = [0u8; 3];
    for c in 0..3 {
        out[c] = (LOW_COLOUR[c] + (HIGH_COLOUR[c] - LOW_COLOUR[c]) * t).round() as u8;
    }
    Rgb(out)
}

// ─── Confusion matrix heat map ────────────────────────────────────────────────
impl ConfusionMatrix {
    /// Heat map with class labels on both axes.
    ///
    /// Layout: "PREDICTED" above the row labels, "TRUE" above the
    /// grid, column labels under the grid. Cell text is white when
    /// the count exceeds half the largest count, black otherwise.
    pub fn render(&self) -> RgbImage {
        let n       = self.num_classes() as u32;
        let advance = 4 * FONT_SCALE;
        let glyph_h = 5 * FONT_SCALE;

        let row_labels: Vec<String> = self.labels().iter().map(|l| truncate(l, MAX_LABEL)).collect();
        let col_chars  = ((CELL - 4) / advance) as usize;
        let widest     = row_labels
            .iter()
            .map(|l| text_width(l, FONT_SCALE))
            .max()
            .unwrap_or(0)
            .max(text_width("PREDICTED", FONT_SCALE));

        let left   = MARGIN + widest + MARGIN;
        let top    = MARGIN + glyph_h + MARGIN;
        let width  = left + n * CELL + MARGIN;
        let height = top + n * CELL + MARGIN + glyph_h + MARGIN;

        let mut img = RgbImage::from_pixel(width, height, WHITE);
        draw_text(&mut img, MARGIN, MARGIN, "PREDICTED", FONT_SCALE, BLACK);
        draw_text(&mut img, left, MARGIN, "TRUE", FONT_SCALE, BLACK);

        let max       = self.max_count();
        let threshold = max as f64 / 2.0;

        for p in 0..n {
            let y = top + p * CELL;
            let label_y = y + (CELL - glyph_h) / 2;
            draw_text(&mut img, MARGIN, label_y, &row_labels[p as usize], FONT_SCALE, BLACK);

            for t in 0..n {
                let x     = left + t * CELL;
                let count = self.count(p as usize, t as usize);
                let shade = if max == 0 { 0.0 } else { count as f32 / max as f32 };
                fill_rect(&mut img, x, y, CELL, CELL, blues(shade));

                let text   = count.to_string();
                let colour = if count as f64 > threshold { WHITE } else { BLACK };
                let tx     = x + CELL.saturating_sub(text_width(&text, FONT_SCALE)) / 2;
                draw_text(&mut img, tx, label_y, &text, FONT_SCALE, colour);
            }
        }

        let label_y = top + n * CELL + MARGIN;
        for t in 0..n {
            let text = truncate(&self.labels()[t as usize], col_chars);
            let x    = left + t * CELL + CELL.saturating_sub(text_width(&text, FONT_SCALE)) / 2;
            draw_text(&mut img, x, label_y, &text, FONT_SCALE, BLACK);
        }

        img
    }
}

// ─── Grad-CAM overlay ─────────────────────────────────────────────────────────
/// Jet colour map: 0 → dark blue, 0.5 → green, 1 → dark red.
pub fn jet(v: f32) -> Rgb<u8> {
    let v = v.clamp(0.0, 1.0);
    let channel = |centre: f32| ((1.5 - (4.0 * v - centre).abs()).clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

/// Upscale a `grid × grid` map in [0, 1] to `base`'s size (bilinear),
/// colour it with `jet`, and alpha-blend it over `base`.
pub fn overlay_heatmap(base: &RgbImage, map: &[f32], grid: u32, alpha: f32) -> Result<RgbImage> {
    let small: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::from_raw(grid, grid, map.to_vec())
        .ok_or_else(|| anyhow!("saliency map has {} values, expected {}", map.len(), grid * grid))?;

    let (w, h) = base.dimensions();
    let large  = imageops::resize(&small, w, h, FilterType::Triangle);
    let alpha  = alpha.clamp(0.0, 1.0);

    let mut out = base.clone();
    for (x, y, px) in out.enumerate_pixels_mut() {
        let heat = jet(large.get_pixel(x, y).0[0]);
        for c in 0..3 {
            let blended = (1.0 - alpha) * px.0[c] as f32 + alpha * heat.0[c] as f32;
            px.0[c] = blended.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(out)
}

/// Save an RGB image as PNG, creating parent directories.
pub fn save_png(img: &RgbImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    img.save(path)
        .with_context(|| format!("Cannot write image '{}'", path.display()))?;
    tracing::info!("Saved '{}'", path.display());
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> ConfusionMatrix {
        let mut cm = ConfusionMatrix::new(vec!["cat".into(), "dog".into()]);
        // m[0][0] = 4, m[1][1] = 1, m[0][1] = 0, m[1][0] = 0
        cm.update(&[0, 0, 0, 0, 1], &[0, 0, 0, 0, 1]).unwrap();
        cm
    }

    /// Colours present inside one cell, sampled on its interior.
    fn cell_colours(img: &RgbImage, cm: &ConfusionMatrix, p: u32, t: u32) -> Vec<Rgb<u8>> {
        let n       = cm.num_classes() as u32;
        let left    = img.width() - MARGIN - n * CELL;
        let top     = MARGIN + 5 * FONT_SCALE + MARGIN;
        let (x0, y0) = (left + t * CELL, top + p * CELL);
        let mut seen = Vec::new();
        for y in y0 + 1..y0 + CELL - 1 {
            for x in x0 + 1..x0 + CELL - 1 {
                let px = *img.get_pixel(x, y);
                if !seen.contains(&px) {
                    seen.push(px);
                }
            }
        }
        seen
    }

    #[test]
    fn test_render_dimensions_grow_with_classes() {
        let small = ConfusionMatrix::with_classes(2).render();
        let large = ConfusionMatrix::with_classes(5).render();
        assert!(large.width() > small.width());
        assert!(large.height() > small.height());
    }

    #[test]
    fn test_text_contrast_follows_threshold() {
        let cm  = matrix();
        let img = cm.render();

        // count 4 > 4/2 → dark cell with white text
        let hot = cell_colours(&img, &cm, 0, 0);
        assert!(hot.contains(&blues(1.0)));
        assert!(hot.contains(&WHITE));
        assert!(!hot.contains(&BLACK));

        // count 1 <= 2 → pale cell with black text
        let cool = cell_colours(&img, &cm, 1, 1);
        assert!(cool.contains(&BLACK));
        assert!(!cool.contains(&WHITE));

        // count 0 → background colour
        assert!(cell_colours(&img, &cm, 0, 1).contains(&blues(0.0)));
    }

    #[test]
    fn test_empty_matrix_renders() {
        let img = ConfusionMatrix::with_classes(3).render();
        assert!(img.width() > 3 * CELL);
    }

    #[test]
    fn test_jet_endpoints() {
        let cold = jet(0.0);
        let hot  = jet(1.0);
        assert!(cold.0[2] > cold.0[0]);
        assert!(hot.0[0] > hot.0[2]);
        assert_eq!(jet(0.5).0[1], 255);
    }

    #[test]
    fn test_overlay_shapes_and_alpha() {
        let base = RgbImage::from_pixel(8, 8, Rgb([10, 20, 30]));
        let map  = vec![0.0, 1.0, 0.5, 0.25];

        let same = overlay_heatmap(&base, &map, 2, 0.0).unwrap();
        assert_eq!(same, base);

        let blended = overlay_heatmap(&base, &map, 2, 0.5).unwrap();
        assert_eq!(blended.dimensions(), (8, 8));
        assert_ne!(blended, base);

        assert!(overlay_heatmap(&base, &map, 3, 0.5).is_err());
    }

    #[test]
    fn test_text_width() {
        assert_eq!(text_width("", 2), 0);
        assert_eq!(text_width("12", 2), 14);
    }
}
