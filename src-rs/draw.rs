//! Software raster helpers shared by the composite, preview and watermark
//! renderers. Everything draws into an `RgbaImage` with straight alpha.

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

pub const GLYPH_PX: u32 = 8;

pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const MARKER_FILL: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const MARKER_STROKE: Rgba<u8> = Rgba([255, 0, 0, 255]);

fn clamp_i32(value: i32, min_value: i32, max_value: i32) -> i32 {
    value.max(min_value).min(max_value)
}

pub fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let a = f64::from(src[3]) / 255.0;
    if a <= 0.0 {
        return dst;
    }
    let inv = 1.0 - a;
    let r = (f64::from(dst[0]) * inv + f64::from(src[0]) * a)
        .round()
        .clamp(0.0, 255.0) as u8;
    let g = (f64::from(dst[1]) * inv + f64::from(src[1]) * a)
        .round()
        .clamp(0.0, 255.0) as u8;
    let b = (f64::from(dst[2]) * inv + f64::from(src[2]) * a)
        .round()
        .clamp(0.0, 255.0) as u8;
    let out_a = (f64::from(dst[3]) + f64::from(src[3]) * inv)
        .round()
        .clamp(0.0, 255.0) as u8;
    Rgba([r, g, b, out_a])
}

fn blend_at(img: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && x < img.width() as i32 && y < img.height() as i32 {
        let dst = *img.get_pixel(x as u32, y as u32);
        img.put_pixel(x as u32, y as u32, blend_pixel(dst, color));
    }
}

pub fn with_opacity(color: Rgba<u8>, opacity: f64) -> Rgba<u8> {
    let a = (f64::from(color[3]) * opacity.clamp(0.0, 1.0)).round() as u8;
    Rgba([color[0], color[1], color[2], a])
}

pub fn draw_disc(img: &mut RgbaImage, cx: f64, cy: f64, radius: f64, color: Rgba<u8>) {
    if img.width() == 0 || img.height() == 0 {
        return;
    }
    if radius <= 0.1 {
        blend_at(img, cx.round() as i32, cy.round() as i32, color);
        return;
    }
    let min_x = clamp_i32((cx - radius).floor() as i32, 0, img.width() as i32 - 1);
    let max_x = clamp_i32((cx + radius).ceil() as i32, 0, img.width() as i32 - 1);
    let min_y = clamp_i32((cy - radius).floor() as i32, 0, img.height() as i32 - 1);
    let max_y = clamp_i32((cy + radius).ceil() as i32, 0, img.height() as i32 - 1);
    let r2 = radius * radius;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let dx = f64::from(x) - cx;
            let dy = f64::from(y) - cy;
            if dx * dx + dy * dy <= r2 {
                blend_at(img, x, y, color);
            }
        }
    }
}

pub fn draw_thick_line(
    img: &mut RgbaImage,
    from: (f64, f64),
    to: (f64, f64),
    color: Rgba<u8>,
    width: f64,
) {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let distance = (dx * dx + dy * dy).sqrt();
    let steps = distance.max(1.0).ceil() as i32;
    let radius = (width.max(1.0) / 2.0).max(0.6);
    for step in 0..=steps {
        let t = f64::from(step) / f64::from(steps.max(1));
        draw_disc(img, from.0 + dx * t, from.1 + dy * t, radius, color);
    }
}

/// Bitmap glyph text. `bold` widens every stroke by one glyph cell.
/// Coordinates saturate, and glyph cells outside `img` cost nothing.
pub fn draw_bitmap_text(
    img: &mut RgbaImage,
    x: i32,
    y: i32,
    text: &str,
    color: Rgba<u8>,
    scale: u32,
    bold: bool,
) {
    let scale_i = i32::try_from(scale.max(1)).unwrap_or(i32::MAX);
    let glyph_w = (GLYPH_PX as i32).saturating_mul(scale_i);
    let (img_w, img_h) = (img.width() as i32, img.height() as i32);
    let mut cursor_x = x;
    let mut cursor_y = y;
    for ch in text.chars() {
        if ch == '\n' {
            cursor_x = x;
            cursor_y = cursor_y.saturating_add(glyph_w);
            continue;
        }
        if cursor_x >= img_w || cursor_y >= img_h {
            cursor_x = cursor_x.saturating_add(glyph_w);
            continue;
        }
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            cursor_x = cursor_x.saturating_add(glyph_w);
            continue;
        };
        for (row_idx, row) in glyph.iter().enumerate() {
            let row_bits = *row;
            for col_idx in 0..8i32 {
                let lit = (row_bits >> col_idx) & 1 == 1;
                let left_lit = bold && col_idx > 0 && (row_bits >> (col_idx - 1)) & 1 == 1;
                if !lit && !left_lit {
                    continue;
                }
                let px = cursor_x.saturating_add(col_idx.saturating_mul(scale_i));
                let py = cursor_y.saturating_add((row_idx as i32).saturating_mul(scale_i));
                let (cx0, cx1) = (px.max(0), px.saturating_add(scale_i).min(img_w));
                let (cy0, cy1) = (py.max(0), py.saturating_add(scale_i).min(img_h));
                for cy in cy0..cy1 {
                    for cx in cx0..cx1 {
                        blend_at(img, cx, cy, color);
                    }
                }
            }
        }
        cursor_x = cursor_x.saturating_add(glyph_w);
    }
}

/// (x0, y0, x1, y1) covered by `draw_bitmap_text` with the same arguments.
pub fn text_bbox(x: i32, y: i32, text: &str, scale: u32) -> (i32, i32, i32, i32) {
    let scale_i = i32::try_from(scale.max(1)).unwrap_or(i32::MAX);
    let glyph_w = (GLYPH_PX as i32).saturating_mul(scale_i);
    let lines: Vec<&str> = text.split('\n').collect();
    let width_chars = lines
        .iter()
        .map(|line| i32::try_from(line.chars().count()).unwrap_or(i32::MAX))
        .max()
        .unwrap_or(0);
    let line_count = i32::try_from(lines.len().max(1)).unwrap_or(i32::MAX);
    (
        x,
        y,
        x.saturating_add(width_chars.saturating_mul(glyph_w)),
        y.saturating_add(line_count.saturating_mul(glyph_w)),
    )
}

/// Filled text with a stroke ring around it, like canvas strokeText + fillText.
#[allow(clippy::too_many_arguments)]
pub fn draw_outlined_text(
    img: &mut RgbaImage,
    x: i32,
    y: i32,
    text: &str,
    fill: Rgba<u8>,
    stroke: Rgba<u8>,
    scale: u32,
    stroke_width: i32,
) {
    for dx in -stroke_width..=stroke_width {
        for dy in -stroke_width..=stroke_width {
            if dx == 0 && dy == 0 {
                continue;
            }
            if dx * dx + dy * dy > stroke_width * stroke_width {
                continue;
            }
            draw_bitmap_text(img, x + dx, y + dy, text, stroke, scale, true);
        }
    }
    draw_bitmap_text(img, x, y, text, fill, scale, true);
}

pub fn scale_to_height(src: &RgbaImage, target_h: u32) -> RgbaImage {
    let (w, h) = src.dimensions();
    if h == 0 || w == 0 || target_h == 0 {
        return RgbaImage::new(0, 0);
    }
    let target_w = ((f64::from(w) * f64::from(target_h) / f64::from(h)).round() as u32).max(1);
    imageops::resize(src, target_w, target_h, FilterType::Triangle)
}

/// Blends `src` onto `dst` at (x, y) with an extra opacity factor. Pixels
/// outside `dst` are clipped.
pub fn overlay(dst: &mut RgbaImage, src: &RgbaImage, x: i64, y: i64, opacity: f64) {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 {
        return;
    }
    for (sx, sy, px) in src.enumerate_pixels() {
        let tx = x + i64::from(sx);
        let ty = y + i64::from(sy);
        if tx < 0 || ty < 0 || tx >= i64::from(dst.width()) || ty >= i64::from(dst.height()) {
            continue;
        }
        blend_at(dst, tx as i32, ty as i32, with_opacity(*px, opacity));
    }
}

/// Draws `src` stretched into a `w` x `h` box centered on (cx, cy) and
/// rotated clockwise by `rotation_deg`, sampling by inverse mapping.
#[allow(clippy::too_many_arguments)]
pub fn draw_rotated(
    dst: &mut RgbaImage,
    src: &RgbaImage,
    cx: f64,
    cy: f64,
    w: f64,
    h: f64,
    rotation_deg: f64,
    opacity: f64,
) {
    if w < 1.0 || h < 1.0 || src.width() == 0 || src.height() == 0 {
        return;
    }
    let theta = rotation_deg.to_radians();
    let (sin, cos) = theta.sin_cos();
    let half_diag = (w * w + h * h).sqrt() / 2.0;
    let min_x = ((cx - half_diag).floor() as i64).max(0);
    let max_x = ((cx + half_diag).ceil() as i64).min(i64::from(dst.width()) - 1);
    let min_y = ((cy - half_diag).floor() as i64).max(0);
    let max_y = ((cy + half_diag).ceil() as i64).min(i64::from(dst.height()) - 1);
    let sx_scale = f64::from(src.width()) / w;
    let sy_scale = f64::from(src.height()) / h;

    for py in min_y..=max_y {
        for px in min_x..=max_x {
            let dx = px as f64 + 0.5 - cx;
            let dy = py as f64 + 0.5 - cy;
            // undo the clockwise rotation
            let lx = dx * cos + dy * sin;
            let ly = -dx * sin + dy * cos;
            let u = lx + w / 2.0;
            let v = ly + h / 2.0;
            if u < 0.0 || v < 0.0 || u >= w || v >= h {
                continue;
            }
            let sx = ((u * sx_scale) as u32).min(src.width() - 1);
            let sy = ((v * sy_scale) as u32).min(src.height() - 1);
            let color = with_opacity(*src.get_pixel(sx, sy), opacity);
            blend_at(dst, px as i32, py as i32, color);
        }
    }
}

/// Rotates a point around a center, clockwise in screen space.
pub fn rotate_point(point: (f64, f64), center: (f64, f64), rotation_deg: f64) -> (f64, f64) {
    let (sin, cos) = rotation_deg.to_radians().sin_cos();
    let dx = point.0 - center.0;
    let dy = point.1 - center.1;
    (
        center.0 + dx * cos - dy * sin,
        center.1 + dx * sin + dy * cos,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_respects_source_alpha() {
        let dst = Rgba([0, 0, 0, 255]);
        assert_eq!(blend_pixel(dst, Rgba([255, 255, 255, 0])), dst);
        assert_eq!(blend_pixel(dst, Rgba([255, 255, 255, 255])), Rgba([255, 255, 255, 255]));
        let half = blend_pixel(dst, Rgba([255, 255, 255, 128]));
        assert!(half[0] > 120 && half[0] < 135);
    }

    #[test]
    fn digit_text_lands_inside_its_bbox() {
        let mut img = RgbaImage::from_pixel(80, 40, Rgba([0, 0, 0, 255]));
        draw_bitmap_text(&mut img, 4, 4, "12", WHITE, 2, false);
        let (x0, y0, x1, y1) = text_bbox(4, 4, "12", 2);
        assert_eq!((x1 - x0, y1 - y0), (32, 16));
        let mut lit = 0;
        for (x, y, px) in img.enumerate_pixels() {
            if px[0] == 255 {
                lit += 1;
                assert!((x as i32) >= x0 && (x as i32) < x1);
                assert!((y as i32) >= y0 && (y as i32) < y1);
            }
        }
        assert!(lit > 0);
    }

    #[test]
    fn huge_text_scale_saturates_instead_of_overflowing() {
        let (x0, _, x1, y1) = text_bbox(10, 10, "Your Watermark", u32::MAX);
        assert_eq!((x0, x1, y1), (10, i32::MAX, i32::MAX));
        let mut img = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]));
        // the top-left cell of 'W' alone covers the whole image
        draw_bitmap_text(&mut img, -5, -5, "W", WHITE, 1 << 20, true);
        assert!(img.pixels().all(|px| px[0] == 255));
    }

    #[test]
    fn scaling_preserves_aspect_ratio() {
        let src = RgbaImage::new(300, 150);
        let scaled = scale_to_height(&src, 200);
        assert_eq!(scaled.dimensions(), (400, 200));
    }

    #[test]
    fn overlay_clips_outside_destination() {
        let mut dst = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        let src = RgbaImage::from_pixel(6, 6, Rgba([255, 0, 0, 255]));
        overlay(&mut dst, &src, 7, -3, 1.0);
        assert_eq!(*dst.get_pixel(9, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*dst.get_pixel(6, 0), Rgba([0, 0, 0, 255]));
        assert_eq!(*dst.get_pixel(9, 3), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn quarter_turn_rotation_swaps_the_box_extent() {
        let mut dst = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
        let src = RgbaImage::from_pixel(4, 4, Rgba([0, 255, 0, 255]));
        draw_rotated(&mut dst, &src, 50.0, 50.0, 60.0, 10.0, 90.0, 1.0);
        // a 60x10 box turned 90 degrees covers a tall strip
        assert_eq!(dst.get_pixel(50, 25)[1], 255);
        assert_eq!(dst.get_pixel(25, 50)[1], 0);
        let p = rotate_point((60.0, 50.0), (50.0, 50.0), 90.0);
        assert!((p.0 - 50.0).abs() < 1e-9 && (p.1 - 60.0).abs() < 1e-9);
    }
}
