//! Post-processing applied to the latest single-image result.

use crate::draw::{draw_bitmap_text, text_bbox, GLYPH_PX};
use crate::error::{StudioError, StudioResult};
use crate::media::{encode_image, ImagePayload, DEFAULT_RESULT_MIME};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Largest watermark glyph height, in percent of the image width.
pub const MAX_FONT_SIZE: f64 = 20.0;

pub const ANIMATE_PROMPT: &str =
    "Create a short, smooth 3D parallax animation of the person in this photo.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "4K")]
    K4,
    #[serde(rename = "8K")]
    K8,
    #[serde(rename = "16K")]
    K16,
}

impl Resolution {
    pub fn label(self) -> &'static str {
        match self {
            Resolution::K4 => "4K",
            Resolution::K8 => "8K",
            Resolution::K16 => "16K",
        }
    }

    pub fn upscale_prompt(self) -> String {
        format!(
            "Upscale this image to a very high resolution, equivalent to {}.",
            self.label()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkColor {
    #[default]
    White,
    Black,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkSettings {
    pub text: String,
    pub position: WatermarkPosition,
    /// 0..=100
    pub opacity: u8,
    /// Glyph height as a percentage of the image width, up to
    /// `MAX_FONT_SIZE`.
    pub font_size: f64,
    pub color: WatermarkColor,
}

impl Default for WatermarkSettings {
    fn default() -> Self {
        Self {
            text: "Your Watermark".to_string(),
            position: WatermarkPosition::BottomRight,
            opacity: 50,
            font_size: 5.0,
            color: WatermarkColor::White,
        }
    }
}

impl WatermarkSettings {
    fn rgba(&self) -> Rgba<u8> {
        let alpha = (f64::from(self.opacity.min(100)) / 100.0 * 255.0).round() as u8;
        match self.color {
            WatermarkColor::White => Rgba([255, 255, 255, alpha]),
            WatermarkColor::Black => Rgba([0, 0, 0, alpha]),
        }
    }
}

/// Burns the watermark text into a copy of `img`.
pub fn apply_watermark(img: &DynamicImage, settings: &WatermarkSettings) -> RgbaImage {
    let mut out = img.to_rgba8();
    let text = settings.text.trim();
    if text.is_empty() || settings.opacity == 0 {
        return out;
    }
    let (w, h) = (out.width() as i32, out.height() as i32);
    let font_px = f64::from(w) * settings.font_size.clamp(0.0, MAX_FONT_SIZE) / 100.0;
    let scale = ((font_px / f64::from(GLYPH_PX)).round() as u32).max(1);
    let margin = (f64::from(w) * 0.02).round() as i32;
    let (x0, y0, x1, y1) = text_bbox(0, 0, text, scale);
    let (tw, th) = (x1 - x0, y1 - y0);

    let (x, y) = match settings.position {
        WatermarkPosition::TopLeft => (margin, margin),
        WatermarkPosition::TopRight => (w - margin - tw, margin),
        WatermarkPosition::BottomLeft => (margin, h - margin - th),
        WatermarkPosition::BottomRight => (w - margin - tw, h - margin - th),
        WatermarkPosition::Center => ((w - tw) / 2, (h - th) / 2),
    };
    draw_bitmap_text(&mut out, x, y, text, settings.rgba(), scale, true);
    out
}

/// Watermarks an encoded result; the output is always PNG.
pub fn watermark_payload(
    payload: &ImagePayload,
    settings: &WatermarkSettings,
) -> StudioResult<ImagePayload> {
    let img = payload.decode()?;
    let marked = apply_watermark(&img, settings);
    let bytes = encode_image(&DynamicImage::ImageRgba8(marked), ImageFormat::Png)
        .map_err(|err| StudioError::render_unavailable(format!("png encode failed: {err}")))?;
    Ok(ImagePayload::new(DEFAULT_RESULT_MIME, bytes))
}
