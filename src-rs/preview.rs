//! Static rendering of the placement canvas, as the editor would show it.

use crate::canvas::{Placement, PlacementCanvas};
use crate::composite::check_canvas_size;
use crate::coords::to_pixels;
use crate::draw::{
    draw_bitmap_text, draw_disc, draw_rotated, draw_thick_line, rotate_point, text_bbox, WHITE,
};
use crate::error::{StudioError, StudioResult};
use crate::media::{PortraitThumbnail, SourceImage};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use std::collections::HashMap;

const PORTRAIT_OPACITY: f64 = 0.8;
const BADGE_RADIUS: f64 = 11.0;
const BADGE_GAP: f64 = 6.0;
const HANDLE_RADIUS: f64 = 6.0;
const ROTATE_STEM: f64 = 24.0;

const SELECTION: Rgba<u8> = Rgba([59, 130, 246, 255]);
const BADGE_FILL: Rgba<u8> = Rgba([220, 38, 38, 255]);

pub fn render_preview(
    source: &SourceImage,
    portraits: &[PortraitThumbnail],
    canvas: &PlacementCanvas,
) -> StudioResult<RgbaImage> {
    let rect = canvas.container();
    let view_w = rect.width.round();
    let view_h = rect.height.round();
    if view_w.is_nan() || view_h.is_nan() || view_w < 1.0 || view_h < 1.0 {
        return Err(StudioError::render_unavailable("preview container has no area"));
    }
    check_canvas_size(view_w as u64, view_h as u64, "preview")?;
    let base = source.decode()?.to_rgba8();
    let mut out = imageops::resize(&base, view_w as u32, view_h as u32, FilterType::Triangle);

    let mut decoded = HashMap::new();
    for portrait in portraits {
        decoded.insert(portrait.id.as_str(), portrait.decode()?.to_rgba8());
    }

    for (index, placement) in canvas.placements().iter().enumerate() {
        let bx = PixelBox::of(placement, view_w, view_h);
        if let Some(src) = decoded.get(placement.portrait_id.as_str()) {
            draw_rotated(
                &mut out,
                src,
                bx.cx,
                bx.cy,
                bx.w,
                bx.h,
                placement.rotation,
                PORTRAIT_OPACITY,
            );
        }
        draw_badge(&mut out, &bx, index + 1);
        if canvas.selected_id() == Some(placement.id.as_str()) {
            draw_selection(&mut out, &bx, placement.rotation);
        }
    }
    Ok(out)
}

struct PixelBox {
    cx: f64,
    cy: f64,
    w: f64,
    h: f64,
}

impl PixelBox {
    fn of(placement: &Placement, view_w: f64, view_h: f64) -> Self {
        Self {
            cx: to_pixels(placement.x, view_w),
            cy: to_pixels(placement.y, view_h),
            w: to_pixels(placement.width, view_w),
            h: to_pixels(placement.height, view_h),
        }
    }

    fn corners(&self, rotation: f64) -> [(f64, f64); 4] {
        let (hw, hh) = (self.w / 2.0, self.h / 2.0);
        let c = (self.cx, self.cy);
        [
            rotate_point((self.cx - hw, self.cy - hh), c, rotation),
            rotate_point((self.cx + hw, self.cy - hh), c, rotation),
            rotate_point((self.cx + hw, self.cy + hh), c, rotation),
            rotate_point((self.cx - hw, self.cy + hh), c, rotation),
        ]
    }
}

/// Numbered badge centered below the (unrotated) box.
fn draw_badge(out: &mut RgbaImage, bx: &PixelBox, number: usize) {
    let label = number.to_string();
    let cx = bx.cx;
    let cy = bx.cy + bx.h / 2.0 + BADGE_GAP + BADGE_RADIUS;
    draw_disc(out, cx, cy, BADGE_RADIUS, BADGE_FILL);
    let (x0, y0, x1, y1) = text_bbox(0, 0, &label, 1);
    draw_bitmap_text(
        out,
        (cx - f64::from(x1 - x0) / 2.0).round() as i32,
        (cy - f64::from(y1 - y0) / 2.0).round() as i32,
        &label,
        WHITE,
        1,
        true,
    );
}

fn draw_selection(out: &mut RgbaImage, bx: &PixelBox, rotation: f64) {
    let corners = bx.corners(rotation);
    for i in 0..4 {
        draw_thick_line(out, corners[i], corners[(i + 1) % 4], SELECTION, 2.0);
    }
    // resize handle: bottom-right corner
    let (rx, ry) = corners[2];
    draw_disc(out, rx, ry, HANDLE_RADIUS, WHITE);
    draw_disc(out, rx, ry, HANDLE_RADIUS - 2.0, SELECTION);
    // rotate handle: above the top edge
    let top_mid = (bx.cx, bx.cy - bx.h / 2.0);
    let knob = rotate_point(
        (bx.cx, bx.cy - bx.h / 2.0 - ROTATE_STEM),
        (bx.cx, bx.cy),
        rotation,
    );
    let stem_base = rotate_point(top_mid, (bx.cx, bx.cy), rotation);
    draw_thick_line(out, stem_base, knob, SELECTION, 2.0);
    draw_disc(out, knob.0, knob.1, HANDLE_RADIUS, WHITE);
    draw_disc(out, knob.0, knob.1, HANDLE_RADIUS - 2.0, SELECTION);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{CanvasCommand, PlacementRef};
    use crate::coords::ContainerRect;
    use crate::media::fixtures::{portrait, source};

    fn canvas_with_drop() -> PlacementCanvas {
        let mut canvas = PlacementCanvas::new(ContainerRect::sized(200.0, 100.0), ["a"]);
        canvas.apply(&CanvasCommand::Drop {
            portrait_id: "a".into(),
            x: 100.0,
            y: 40.0,
        });
        canvas
    }

    #[test]
    fn preview_matches_container_size_and_shows_portrait() {
        let src = source("base.png", 400, 200);
        let faces = vec![portrait("a", 20, 20)];
        let canvas = canvas_with_drop();
        let img = render_preview(&src, &faces, &canvas).unwrap();
        assert_eq!(img.dimensions(), (200, 100));
        // portrait color blended at 80% over the gray base
        let px = img.get_pixel(100, 40);
        assert!(px[2] > px[0], "expected bluish pixel, got {px:?}");
    }

    #[test]
    fn selected_placement_gets_outline() {
        let src = source("base.png", 400, 200);
        let faces = vec![portrait("a", 20, 20)];
        let mut canvas = canvas_with_drop();
        let plain = render_preview(&src, &faces, &canvas).unwrap();
        canvas.apply(&CanvasCommand::Select {
            placement: PlacementRef::Marker(1),
        });
        let selected = render_preview(&src, &faces, &canvas).unwrap();
        assert_ne!(plain, selected);
    }

    #[test]
    fn empty_container_is_unavailable() {
        let src = source("base.png", 10, 10);
        let canvas = PlacementCanvas::new(ContainerRect::sized(0.0, 0.0), Vec::<String>::new());
        assert!(matches!(
            render_preview(&src, &[], &canvas),
            Err(StudioError::RenderUnavailable(_))
        ));
    }

    #[test]
    fn huge_container_is_refused_before_resizing() {
        let src = source("base.png", 10, 10);
        let canvas =
            PlacementCanvas::new(ContainerRect::sized(1e6, 1e6), Vec::<String>::new());
        let err = render_preview(&src, &[], &canvas).unwrap_err();
        assert!(matches!(err, StudioError::RenderUnavailable(_)));
        assert!(err.to_string().contains("preview"), "{err}");
    }
}
