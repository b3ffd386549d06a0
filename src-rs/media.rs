use crate::error::{StudioError, StudioResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

pub const DEFAULT_RESULT_MIME: &str = "image/png";

/// One uploaded image. The payload never changes after creation; pixel
/// dimensions are read from the header on first request.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub id: String,
    pub name: String,
    pub mime: String,
    bytes: Vec<u8>,
    dimensions: OnceLock<(u32, u32)>,
}

impl SourceImage {
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> StudioResult<Self> {
        let name = name.into();
        if bytes.is_empty() {
            return Err(StudioError::upload(format!("{name}: file is empty")));
        }
        let format = image::guess_format(&bytes)
            .map_err(|err| StudioError::upload(format!("{name}: unrecognized image data ({err})")))?;
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            mime: format.to_mime_type().to_string(),
            bytes,
            dimensions: OnceLock::new(),
        })
    }

    pub fn load(path: &Path) -> StudioResult<Self> {
        let bytes = fs::read(path)
            .map_err(|err| StudioError::upload(format!("{}: {err}", path.display())))?;
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("image.png")
            .to_string();
        Self::from_bytes(name, bytes)
    }

    /// Accepts either a bare base64 body or a `data:<mime>;base64,<body>` URL.
    pub fn from_data_url(name: impl Into<String>, raw: &str) -> StudioResult<Self> {
        let name = name.into();
        let (_, data) = split_data_url(raw);
        let bytes = STANDARD
            .decode(data.trim())
            .map_err(|err| StudioError::upload(format!("{name}: invalid base64 payload ({err})")))?;
        Self::from_bytes(name, bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn dimensions(&self) -> StudioResult<(u32, u32)> {
        if let Some(dims) = self.dimensions.get() {
            return Ok(*dims);
        }
        let dims = read_dimensions(&self.bytes)
            .map_err(|err| StudioError::upload(format!("{}: {err}", self.name)))?;
        Ok(*self.dimensions.get_or_init(|| dims))
    }

    pub fn decode(&self) -> StudioResult<DynamicImage> {
        decode_image(&self.bytes).map_err(|err| StudioError::upload(format!("{}: {err}", self.name)))
    }
}

/// A reference portrait for face swapping. It only gains a position through
/// a placement.
#[derive(Debug, Clone)]
pub struct PortraitThumbnail {
    pub id: String,
    pub mime: String,
    bytes: Vec<u8>,
}

impl PortraitThumbnail {
    pub fn from_bytes(id: impl Into<String>, bytes: Vec<u8>) -> StudioResult<Self> {
        let id = id.into();
        let format = image::guess_format(&bytes)
            .map_err(|err| StudioError::upload(format!("portrait {id}: {err}")))?;
        Ok(Self {
            id,
            mime: format.to_mime_type().to_string(),
            bytes,
        })
    }

    pub fn load(id: impl Into<String>, path: &Path) -> StudioResult<Self> {
        let bytes = fs::read(path)
            .map_err(|err| StudioError::upload(format!("{}: {err}", path.display())))?;
        Self::from_bytes(id, bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn decode(&self) -> StudioResult<DynamicImage> {
        decode_image(&self.bytes)
            .map_err(|err| StudioError::upload(format!("portrait {}: {err}", self.id)))
    }
}

/// Binary image returned by the gateway or produced locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    pub fn from_base64(mime: Option<&str>, data: &str) -> Result<Self, base64::DecodeError> {
        let bytes = STANDARD.decode(data.trim())?;
        Ok(Self::new(mime.unwrap_or(DEFAULT_RESULT_MIME), bytes))
    }

    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime)
    }

    pub fn decode(&self) -> StudioResult<DynamicImage> {
        decode_image(&self.bytes).map_err(|err| StudioError::upload(format!("result image: {err}")))
    }
}

fn decode_image(bytes: &[u8]) -> Result<DynamicImage, image::ImageError> {
    image::load_from_memory(bytes)
}

fn read_dimensions(bytes: &[u8]) -> Result<(u32, u32), image::ImageError> {
    image::ImageReader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
}

pub fn encode_image(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, image::ImageError> {
    let mut out = std::io::Cursor::new(Vec::new());
    match format {
        // the jpeg encoder rejects alpha channels
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()).write_to(&mut out, format)?,
        _ => img.write_to(&mut out, format)?,
    }
    Ok(out.into_inner())
}

pub fn split_data_url(raw: &str) -> (String, String) {
    let t = raw.trim();
    if let Some(body) = t.strip_prefix("data:") {
        let mut parts = body.splitn(2, ',');
        let meta = parts.next().unwrap_or("image/png;base64");
        let data = parts.next().unwrap_or("").to_string();
        let mime = meta
            .split(';')
            .next()
            .unwrap_or(DEFAULT_RESULT_MIME)
            .trim()
            .to_string();
        return (mime, data);
    }
    (DEFAULT_RESULT_MIME.to_string(), t.to_string())
}

pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        _ => "png",
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use image::{Rgba, RgbaImage};

    pub fn png_bytes(w: u32, h: u32, color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(w, h, Rgba(color));
        encode_image(&DynamicImage::ImageRgba8(img), ImageFormat::Png).unwrap()
    }

    pub fn source(name: &str, w: u32, h: u32) -> SourceImage {
        SourceImage::from_bytes(name, png_bytes(w, h, [90, 90, 90, 255])).unwrap()
    }

    pub fn portrait(id: &str, w: u32, h: u32) -> PortraitThumbnail {
        PortraitThumbnail::from_bytes(id, png_bytes(w, h, [30, 140, 200, 255])).unwrap()
    }
}
