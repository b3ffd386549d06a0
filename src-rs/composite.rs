//! Flattens a base photo, its portraits and numbered markers into the single
//! image sent with a face-swap request.
//!
//! Layout, top to bottom: half a margin of white, the portrait strip, the rest
//! of the margin, then the photo at full resolution, then one more margin.
//! Every placement gets the marker `index + 1` on the photo; thumbnails are
//! laid out left to right in placement order and carry the same number.

use crate::canvas::Placement;
use crate::coords::to_pixels;
use crate::draw::{
    draw_outlined_text, overlay, scale_to_height, text_bbox, MARKER_FILL, MARKER_STROKE, WHITE,
};
use crate::error::{StudioError, StudioResult};
use crate::media::{encode_image, PortraitThumbnail, SourceImage};
use image::{DynamicImage, ImageFormat, RgbaImage};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

pub const FACE_SWAP_INSTRUCTION: &str = "CRITICAL INSTRUCTION: You must perform face replacements as indicated by the numbered markers. The small, numbered portrait images are provided in the top margin of the input image. For each numbered marker on a face in the main photo area, you must replace that face with the face from the corresponding numbered portrait in the margin. The replacement must be seamless. Match the lighting, skin tone, grain, and overall vintage style of the original photograph. It is very important that you also intelligently adjust the apparent age of the person in the new face to match the context of the old photograph. Do not add any text or numbers to the final output image.";

pub const COMPOSITE_MIME: &str = "image/jpeg";

/// Larger surfaces are refused rather than allocated.
pub const MAX_CANVAS_SIDE: u32 = 32_767;
pub const MAX_CANVAS_AREA: u64 = 268_435_456;

/// Refuses a `width` x `height` raster that could not be allocated safely.
pub fn check_canvas_size(width: u64, height: u64, what: &str) -> StudioResult<()> {
    let side = u64::from(MAX_CANVAS_SIDE);
    if width > side || height > side {
        return Err(StudioError::render_unavailable(format!(
            "{what} of {width}x{height} exceeds {MAX_CANVAS_SIDE}px"
        )));
    }
    if width.saturating_mul(height) > MAX_CANVAS_AREA {
        return Err(StudioError::render_unavailable(format!(
            "{what} of {width}x{height} exceeds {MAX_CANVAS_AREA} pixels"
        )));
    }
    Ok(())
}

/// Bitmap glyphs are 8px, so scale 4 gives the 32px marker height.
const MARKER_SCALE: u32 = 4;
const MARKER_STROKE_WIDTH: i32 = 3;
const THUMB_MARKER_INSET: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompositeLayout {
    pub margin: u32,
    pub strip_height: u32,
}

impl Default for CompositeLayout {
    fn default() -> Self {
        Self {
            margin: 50,
            strip_height: 200,
        }
    }
}

impl CompositeLayout {
    pub fn canvas_size(&self, photo_w: u32, photo_h: u32) -> (u64, u64) {
        (
            u64::from(photo_w),
            u64::from(photo_h) + u64::from(self.strip_height) + 2 * u64::from(self.margin),
        )
    }

    pub fn photo_top(&self) -> u32 {
        self.strip_height + self.margin
    }

    pub fn strip_top(&self) -> u32 {
        self.margin / 2
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StripSlot {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerRecord {
    pub number: usize,
    pub placement_id: String,
    pub portrait_id: String,
    /// Thumbnail box in the strip; `None` when it did not fit or the
    /// portrait is missing.
    pub strip: Option<StripSlot>,
    /// Marker center on the composite, inside the photo rectangle.
    pub target: (u32, u32),
}

#[derive(Debug, Clone)]
pub struct CompositePayload {
    pub image: RgbaImage,
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub markers: Vec<MarkerRecord>,
    pub prompt: String,
}

impl CompositePayload {
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "width": self.image.width(),
            "height": self.image.height(),
            "mime": self.mime,
            "markers": self.markers,
            "prompt": self.prompt,
        })
    }
}

/// `"{tool prompt}. {FACE_SWAP_INSTRUCTION}"`.
pub fn face_swap_prompt(tool_prompt: &str) -> String {
    let head = tool_prompt.trim().trim_end_matches('.');
    format!("{head}. {FACE_SWAP_INSTRUCTION}")
}

pub fn render_composite(
    source: &SourceImage,
    portraits: &[PortraitThumbnail],
    placements: &[Placement],
    tool_prompt: &str,
    layout: CompositeLayout,
) -> StudioResult<CompositePayload> {
    let (photo_w, photo_h) = source.dimensions()?;
    let (canvas_w, canvas_h) = layout.canvas_size(photo_w, photo_h);
    if canvas_w == 0 || photo_h == 0 {
        return Err(StudioError::render_unavailable(format!(
            "{}: zero-sized photo",
            source.name
        )));
    }
    check_canvas_size(canvas_w, canvas_h, "composite")?;

    let (photo, decoded) = decode_inputs(source, portraits, placements)?;
    let mut canvas = RgbaImage::from_pixel(canvas_w as u32, canvas_h as u32, WHITE);
    overlay(&mut canvas, &photo, 0, i64::from(layout.photo_top()), 1.0);

    let margin = i64::from(layout.margin);
    let mut current_x = margin;
    let mut markers = Vec::with_capacity(placements.len());

    for (index, placement) in placements.iter().enumerate() {
        let number = index + 1;
        let label = number.to_string();
        let mut strip = None;

        match decoded.get(placement.portrait_id.as_str()) {
            Some(thumb_src) => {
                let thumb = scale_to_height(thumb_src, layout.strip_height);
                let w = i64::from(thumb.width());
                if current_x + w > canvas_w as i64 - margin {
                    debug!(number, "portrait strip full; thumbnail skipped");
                } else {
                    let y = i64::from(layout.strip_top());
                    overlay(&mut canvas, &thumb, current_x, y, 1.0);
                    draw_marker(
                        &mut canvas,
                        current_x as i32 + THUMB_MARKER_INSET,
                        y as i32 + THUMB_MARKER_INSET,
                        &label,
                    );
                    strip = Some(StripSlot {
                        x: current_x as u32,
                        y: y as u32,
                        width: thumb.width(),
                        height: thumb.height(),
                    });
                    current_x += w + margin;
                }
            }
            None => warn!(
                placement = %placement.id,
                portrait = %placement.portrait_id,
                "placement references an unknown portrait"
            ),
        }

        let target = marker_target(placement, photo_w, photo_h, layout.photo_top());
        let (x0, y0, x1, y1) = text_bbox(0, 0, &label, MARKER_SCALE);
        draw_marker(
            &mut canvas,
            target.0 as i32 - (x1 - x0) / 2,
            target.1 as i32 - (y1 - y0) / 2,
            &label,
        );
        markers.push(MarkerRecord {
            number,
            placement_id: placement.id.clone(),
            portrait_id: placement.portrait_id.clone(),
            strip,
            target,
        });
    }

    let bytes = encode_image(&DynamicImage::ImageRgba8(canvas.clone()), ImageFormat::Jpeg)
        .map_err(|err| StudioError::render_unavailable(format!("jpeg encode failed: {err}")))?;
    Ok(CompositePayload {
        image: canvas,
        bytes,
        mime: COMPOSITE_MIME,
        markers,
        prompt: face_swap_prompt(tool_prompt),
    })
}

/// Decodes the photo and every referenced portrait in parallel.
fn decode_inputs<'a>(
    source: &SourceImage,
    portraits: &'a [PortraitThumbnail],
    placements: &[Placement],
) -> StudioResult<(RgbaImage, HashMap<&'a str, RgbaImage>)> {
    let wanted: Vec<&PortraitThumbnail> = portraits
        .iter()
        .filter(|p| placements.iter().any(|pl| pl.portrait_id == p.id))
        .collect();
    let (photo, thumbs) = rayon::join(
        || source.decode().map(|img| img.to_rgba8()),
        || {
            wanted
                .par_iter()
                .map(|p| p.decode().map(|img| (p.id.as_str(), img.to_rgba8())))
                .collect::<StudioResult<Vec<_>>>()
        },
    );
    Ok((photo?, thumbs?.into_iter().collect()))
}

fn marker_target(placement: &Placement, photo_w: u32, photo_h: u32, photo_top: u32) -> (u32, u32) {
    let x = to_pixels(placement.x, f64::from(photo_w))
        .round()
        .clamp(0.0, f64::from(photo_w.saturating_sub(1)));
    let y = to_pixels(placement.y, f64::from(photo_h))
        .round()
        .clamp(0.0, f64::from(photo_h.saturating_sub(1)));
    (x as u32, y as u32 + photo_top)
}

fn draw_marker(canvas: &mut RgbaImage, x: i32, y: i32, label: &str) {
    draw_outlined_text(
        canvas,
        x,
        y,
        label,
        MARKER_FILL,
        MARKER_STROKE,
        MARKER_SCALE,
        MARKER_STROKE_WIDTH,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::fixtures::{portrait, source};

    fn placement(id: &str, portrait_id: &str, x: f64, y: f64) -> Placement {
        Placement {
            id: id.to_string(),
            portrait_id: portrait_id.to_string(),
            x,
            y,
            width: 15.0,
            height: 15.0,
            rotation: 0.0,
        }
    }

    #[test]
    fn canvas_adds_strip_and_two_margins() {
        let src = source("base.png", 640, 400);
        let faces = vec![portrait("a", 100, 100)];
        let out = render_composite(
            &src,
            &faces,
            &[placement("p1", "a", 50.0, 50.0)],
            "Restore this old, damaged photograph.",
            CompositeLayout::default(),
        )
        .unwrap();
        assert_eq!(out.image.dimensions(), (640, 400 + 2 * 50 + 200));
        assert_eq!(out.mime, "image/jpeg");
        assert_eq!(image::guess_format(&out.bytes).unwrap(), ImageFormat::Jpeg);
        // bottom-left corner is plain white margin
        assert_eq!(*out.image.get_pixel(0, out.image.height() - 1), WHITE);
    }

    #[test]
    fn markers_are_numbered_in_placement_order() {
        let src = source("base.png", 1200, 600);
        let faces = vec![portrait("a", 100, 200), portrait("b", 150, 200)];
        let placements = vec![
            placement("p1", "b", 20.0, 30.0),
            placement("p2", "a", 60.0, 40.0),
            placement("p3", "b", 80.0, 70.0),
        ];
        let out = render_composite(&src, &faces, &placements, "x", CompositeLayout::default())
            .unwrap();
        let numbers: Vec<usize> = out.markers.iter().map(|m| m.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        let slots: Vec<u32> = out.markers.iter().map(|m| m.strip.as_ref().unwrap().x).collect();
        assert_eq!(slots, vec![50, 50 + 150 + 50, 50 + 150 + 50 + 100 + 50]);
        assert_eq!(out.markers[1].target, (720, 250 + 240));
    }

    #[test]
    fn overflowing_thumbnail_is_skipped_but_marker_kept() {
        // 800px strip with 50px margins: two 300px thumbnails fit, the third
        // would end at 1050 > 750
        let src = source("base.png", 800, 400);
        let faces = vec![portrait("wide", 300, 200)];
        let placements = vec![
            placement("p1", "wide", 20.0, 50.0),
            placement("p2", "wide", 50.0, 50.0),
            placement("p3", "wide", 80.0, 50.0),
        ];
        let layout = CompositeLayout {
            margin: 50,
            strip_height: 200,
        };
        let out = render_composite(&src, &faces, &placements, "x", layout).unwrap();
        let slots: Vec<Option<u32>> = out
            .markers
            .iter()
            .map(|m| m.strip.as_ref().map(|slot| slot.x))
            .collect();
        assert_eq!(slots, vec![Some(50), Some(400), None]);

        // nothing was drawn on the strip past the second thumbnail
        let strip_top = layout.strip_top();
        for y in strip_top..strip_top + layout.strip_height {
            for x in 700..800 {
                assert_eq!(*out.image.get_pixel(x, y), WHITE, "strip pixel at {x},{y}");
            }
        }

        // the third main-image marker is still painted with the red stroke
        let (tx, ty) = out.markers[2].target;
        let painted = (ty.saturating_sub(20)..ty + 20)
            .flat_map(|y| (tx.saturating_sub(20)..tx + 20).map(move |x| (x, y)))
            .any(|(x, y)| {
                let px = out.image.get_pixel(x, y);
                px[0] > 200 && px[1] < 60 && px[2] < 60
            });
        assert!(painted);
    }

    #[test]
    fn rendering_is_idempotent() {
        let src = source("base.png", 320, 240);
        let faces = vec![portrait("a", 80, 100)];
        let placements = vec![placement("p1", "a", 10.0, 90.0)];
        let first = render_composite(&src, &faces, &placements, "x", CompositeLayout::default())
            .unwrap();
        let second = render_composite(&src, &faces, &placements, "x", CompositeLayout::default())
            .unwrap();
        assert_eq!(first.image, second.image);
        assert_eq!(first.markers, second.markers);
        assert_eq!(placements[0].x, 10.0);
    }

    #[test]
    fn out_of_range_centers_are_clamped_into_the_photo() {
        let src = source("base.png", 200, 100);
        let faces = vec![portrait("a", 10, 10)];
        let out = render_composite(
            &src,
            &faces,
            &[placement("p1", "a", -40.0, 140.0)],
            "x",
            CompositeLayout::default(),
        )
        .unwrap();
        assert_eq!(out.markers[0].target, (0, 250 + 99));
    }

    #[test]
    fn prompt_joins_tool_text_and_face_swap_instruction() {
        let prompt = face_swap_prompt("Restore this old, damaged photograph.");
        assert!(prompt.starts_with("Restore this old, damaged photograph. CRITICAL INSTRUCTION"));
        assert!(prompt.ends_with("Do not add any text or numbers to the final output image."));
    }

    #[test]
    fn oversized_canvas_is_refused() {
        let src = source("tall.png", 4, MAX_CANVAS_SIDE);
        let err = render_composite(&src, &[], &[], "x", CompositeLayout::default()).unwrap_err();
        assert!(matches!(err, StudioError::RenderUnavailable(_)));
    }

    #[test]
    fn canvas_area_is_bounded_as_well_as_sides() {
        assert!(check_canvas_size(32_767, 8_000, "composite").is_ok());
        let err = check_canvas_size(32_767, 32_767, "composite").unwrap_err();
        assert!(err.to_string().contains("pixels"), "{err}");
        assert!(check_canvas_size(40_000, 10, "composite").is_err());
    }
}
