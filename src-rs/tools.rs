//! Tool catalog and per-tool prompt generation.
//!
//! Each tool owns one settings value object with a default; turning settings
//! into an instruction string is a pure function with no other dependencies.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tool {
    Restore,
    Enhance,
    Upscale,
    IdPhoto,
    DocumentRestore,
    WeddingPhoto,
    TrendPhoto,
    ChangeBackground,
    CleanBackground,
    CleanImage,
    SkinSmooth,
    StraightenFace,
    BwPhoto,
    PresetColor,
    AutoColor,
    PromptEdit,
    ImageFilter,
}

impl Tool {
    pub const ALL: [Tool; 17] = [
        Tool::IdPhoto,
        Tool::Restore,
        Tool::DocumentRestore,
        Tool::WeddingPhoto,
        Tool::TrendPhoto,
        Tool::ChangeBackground,
        Tool::CleanBackground,
        Tool::Enhance,
        Tool::Upscale,
        Tool::CleanImage,
        Tool::SkinSmooth,
        Tool::StraightenFace,
        Tool::BwPhoto,
        Tool::PresetColor,
        Tool::AutoColor,
        Tool::PromptEdit,
        Tool::ImageFilter,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Tool::Restore => "restore",
            Tool::Enhance => "enhance",
            Tool::Upscale => "upscale",
            Tool::IdPhoto => "id-photo",
            Tool::DocumentRestore => "document-restore",
            Tool::WeddingPhoto => "wedding-photo",
            Tool::TrendPhoto => "trend-photo",
            Tool::ChangeBackground => "change-background",
            Tool::CleanBackground => "clean-background",
            Tool::CleanImage => "clean-image",
            Tool::SkinSmooth => "skin-smooth",
            Tool::StraightenFace => "straighten-face",
            Tool::BwPhoto => "bw-photo",
            Tool::PresetColor => "preset-color",
            Tool::AutoColor => "auto-color",
            Tool::PromptEdit => "prompt-edit",
            Tool::ImageFilter => "image-filter",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Tool::Restore => "Restore old photo (+ face swap)",
            Tool::Enhance => "Sharpen / enhance",
            Tool::Upscale => "Super enhancement & upscale",
            Tool::IdPhoto => "ID photo",
            Tool::DocumentRestore => "Document restoration",
            Tool::WeddingPhoto => "AI wedding photo",
            Tool::TrendPhoto => "Trend photo",
            Tool::ChangeBackground => "Change background",
            Tool::CleanBackground => "Clean background",
            Tool::CleanImage => "Clean image noise",
            Tool::SkinSmooth => "Skin smoothing",
            Tool::StraightenFace => "Straighten face",
            Tool::BwPhoto => "Black & white photo",
            Tool::PresetColor => "Preset color grade",
            Tool::AutoColor => "Auto color",
            Tool::PromptEdit => "Edit by prompt",
            Tool::ImageFilter => "Image filter",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let key = raw.trim().to_ascii_lowercase().replace('_', "-");
        if key == "sharpen" {
            return Ok(Tool::Enhance);
        }
        Tool::ALL
            .iter()
            .copied()
            .find(|tool| tool.id() == key)
            .with_context(|| format!("unknown tool: {raw} (see `photofix tools`)"))
    }

    /// Only the restore tool can turn placements into a face-swap composite.
    pub fn supports_face_swap(self) -> bool {
        self == Tool::Restore
    }

    pub fn default_settings(self) -> ToolSettings {
        match self {
            Tool::Restore => ToolSettings::Restore(RestorationSettings::default()),
            Tool::Enhance => ToolSettings::Enhance(EnhancementSettings::default()),
            Tool::Upscale => ToolSettings::Upscale(UpscaleSettings::default()),
            Tool::IdPhoto => ToolSettings::IdPhoto(IdPhotoSettings::default()),
            Tool::DocumentRestore => {
                ToolSettings::DocumentRestore(DocumentRestorationSettings::default())
            }
            Tool::WeddingPhoto => ToolSettings::WeddingPhoto(WeddingPhotoSettings::default()),
            Tool::TrendPhoto => ToolSettings::TrendPhoto(TrendPhotoSettings::default()),
            Tool::ChangeBackground => {
                ToolSettings::ChangeBackground(ChangeBackgroundSettings::default())
            }
            Tool::CleanBackground => ToolSettings::CleanBackground(LevelSettings::default()),
            Tool::CleanImage => ToolSettings::CleanImage(LevelSettings::default()),
            Tool::SkinSmooth => ToolSettings::SkinSmooth(LevelSettings::default()),
            Tool::StraightenFace => ToolSettings::StraightenFace,
            Tool::BwPhoto => ToolSettings::BwPhoto(BwPhotoSettings::default()),
            Tool::PresetColor => ToolSettings::PresetColor(PresetColorSettings::default()),
            Tool::AutoColor => ToolSettings::AutoColor(AutoColorSettings::default()),
            Tool::PromptEdit => ToolSettings::PromptEdit(PromptEditSettings::default()),
            Tool::ImageFilter => ToolSettings::ImageFilter(ImageFilterSettings::default()),
        }
    }

    /// Reads settings JSON for this tool; missing fields keep their defaults.
    pub fn settings_from_json(self, value: Value) -> Result<ToolSettings> {
        let settings = match self {
            Tool::Restore => ToolSettings::Restore(from_partial(value)?),
            Tool::Enhance => ToolSettings::Enhance(from_partial(value)?),
            Tool::Upscale => {
                let settings: UpscaleSettings = from_partial(value)?;
                if !UpscaleSettings::SCALES.contains(&settings.scale) {
                    bail!("upscale factor must be one of 2, 4, 8, 16 (got {})", settings.scale);
                }
                ToolSettings::Upscale(settings)
            }
            Tool::IdPhoto => ToolSettings::IdPhoto(from_partial(value)?),
            Tool::DocumentRestore => ToolSettings::DocumentRestore(from_partial(value)?),
            Tool::WeddingPhoto => ToolSettings::WeddingPhoto(from_partial(value)?),
            Tool::TrendPhoto => ToolSettings::TrendPhoto(from_partial(value)?),
            Tool::ChangeBackground => ToolSettings::ChangeBackground(from_partial(value)?),
            Tool::CleanBackground => ToolSettings::CleanBackground(from_partial(value)?),
            Tool::CleanImage => ToolSettings::CleanImage(from_partial(value)?),
            Tool::SkinSmooth => ToolSettings::SkinSmooth(from_partial(value)?),
            Tool::StraightenFace => ToolSettings::StraightenFace,
            Tool::BwPhoto => ToolSettings::BwPhoto(from_partial(value)?),
            Tool::PresetColor => ToolSettings::PresetColor(from_partial(value)?),
            Tool::AutoColor => ToolSettings::AutoColor(from_partial(value)?),
            Tool::PromptEdit => ToolSettings::PromptEdit(from_partial(value)?),
            Tool::ImageFilter => ToolSettings::ImageFilter(from_partial(value)?),
        };
        Ok(settings)
    }
}

fn from_partial<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T> {
    let value = if value.is_null() { json!({}) } else { value };
    serde_json::from_value(value).context("invalid tool settings")
}

pub fn tool_catalog() -> Value {
    let rows: Vec<Value> = Tool::ALL
        .iter()
        .map(|tool| {
            json!({
                "id": tool.id(),
                "name": tool.name(),
                "face_swap": tool.supports_face_swap(),
                "defaults": tool.default_settings().to_json(),
            })
        })
        .collect();
    json!({ "tools": rows })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolSettings {
    Restore(RestorationSettings),
    Enhance(EnhancementSettings),
    Upscale(UpscaleSettings),
    IdPhoto(IdPhotoSettings),
    DocumentRestore(DocumentRestorationSettings),
    WeddingPhoto(WeddingPhotoSettings),
    TrendPhoto(TrendPhotoSettings),
    ChangeBackground(ChangeBackgroundSettings),
    CleanBackground(LevelSettings),
    CleanImage(LevelSettings),
    SkinSmooth(LevelSettings),
    StraightenFace,
    BwPhoto(BwPhotoSettings),
    PresetColor(PresetColorSettings),
    AutoColor(AutoColorSettings),
    PromptEdit(PromptEditSettings),
    ImageFilter(ImageFilterSettings),
}

impl ToolSettings {
    pub fn tool(&self) -> Tool {
        match self {
            ToolSettings::Restore(_) => Tool::Restore,
            ToolSettings::Enhance(_) => Tool::Enhance,
            ToolSettings::Upscale(_) => Tool::Upscale,
            ToolSettings::IdPhoto(_) => Tool::IdPhoto,
            ToolSettings::DocumentRestore(_) => Tool::DocumentRestore,
            ToolSettings::WeddingPhoto(_) => Tool::WeddingPhoto,
            ToolSettings::TrendPhoto(_) => Tool::TrendPhoto,
            ToolSettings::ChangeBackground(_) => Tool::ChangeBackground,
            ToolSettings::CleanBackground(_) => Tool::CleanBackground,
            ToolSettings::CleanImage(_) => Tool::CleanImage,
            ToolSettings::SkinSmooth(_) => Tool::SkinSmooth,
            ToolSettings::StraightenFace => Tool::StraightenFace,
            ToolSettings::BwPhoto(_) => Tool::BwPhoto,
            ToolSettings::PresetColor(_) => Tool::PresetColor,
            ToolSettings::AutoColor(_) => Tool::AutoColor,
            ToolSettings::PromptEdit(_) => Tool::PromptEdit,
            ToolSettings::ImageFilter(_) => Tool::ImageFilter,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ToolSettings::StraightenFace => json!({}),
            other => serde_json::to_value(other).unwrap_or(Value::Null),
        }
    }
}

/// Instruction text sent to the gateway for one tool run.
pub fn generate_edit_prompt(settings: &ToolSettings) -> String {
    match settings {
        ToolSettings::Restore(s) => restoration_prompt(s),
        ToolSettings::Enhance(s) => join_sentences(&[
            format!("Enhance this image with level {}.", s.level),
            if s.remove_watermark {
                "Remove any watermarks, logos, or overlaid text.".to_string()
            } else {
                String::new()
            },
        ]),
        ToolSettings::Upscale(s) => {
            format!("Upscale this image, increasing its resolution by {}x.", s.scale)
        }
        ToolSettings::IdPhoto(s) => join_sentences(&[
            format!(
                "Edit this portrait to be a standard ID photo. Change the background to a solid {} color.",
                s.background.label()
            ),
            if s.standardize_clothing {
                "If the clothing is very casual, subtly change it to a more formal collared shirt or blouse."
                    .to_string()
            } else {
                String::new()
            },
        ]),
        ToolSettings::DocumentRestore(s) => join_sentences(&[
            "Restore this document.".to_string(),
            flag(s.enhance_text, "Enhance text clarity."),
            flag(s.remove_stains, "Remove creases and stains."),
            flag(s.straighten, "Correct perspective."),
        ]),
        ToolSettings::WeddingPhoto(s) => format!(
            "Transform this photo of a couple into a beautiful \"{}\" themed wedding photo.",
            s.style.label()
        ),
        ToolSettings::TrendPhoto(s) => format!(
            "Recreate this photo in the style of the \"{}\" AI trend.",
            s.trend.label()
        ),
        ToolSettings::ChangeBackground(s) => format!(
            "Place the main subject(s) of this image on a new background described as: \"{}\".",
            s.prompt.trim()
        ),
        ToolSettings::CleanBackground(s) => format!(
            "Clean the background of this image. Remove distracting elements with a {} level of cleaning.",
            level_word(s.level)
        ),
        ToolSettings::CleanImage(s) => format!(
            "Clean this image. Remove digital noise and grain with a {} level.",
            level_word(s.level)
        ),
        ToolSettings::SkinSmooth(s) => format!(
            "Retouch the skin in this photo. Apply a {} level of smoothing.",
            level_word(s.level)
        ),
        ToolSettings::StraightenFace => {
            "Rotate the image slightly so that the face is perfectly upright.".to_string()
        }
        ToolSettings::BwPhoto(s) => format!(
            "Convert this image to a high-quality black and white photograph in a \"{}\" style.",
            s.style.label()
        ),
        ToolSettings::PresetColor(s) => format!(
            "Apply a \"{}\" color grade to this image.",
            s.preset.label()
        ),
        ToolSettings::AutoColor(s) => join_sentences(&[
            "Automatically correct the colors in this image.".to_string(),
            s.fine_tune_prompt.trim().to_string(),
        ]),
        ToolSettings::PromptEdit(s) => s.prompt.trim().to_string(),
        ToolSettings::ImageFilter(s) => {
            format!("Apply a \"{}\" filter to this image.", s.filter.label())
        }
    }
}

fn restoration_prompt(s: &RestorationSettings) -> String {
    let level = match s.level {
        RestorationLevel::Light => "Apply a light restoration that keeps the original character.",
        RestorationLevel::Medium => "Apply a moderate restoration.",
        RestorationLevel::Strong => "Apply a strong, thorough restoration.",
    };
    let subject = match s.gender {
        Gender::Auto => format!("The main subject is about {} years old.", s.age),
        other => format!(
            "The main subject is a {} person, about {} years old.",
            other.label(),
            s.age
        ),
    };
    let o = &s.options;
    join_sentences(&[
        "Restore this old, damaged photograph.".to_string(),
        level.to_string(),
        "Keep the original background.".to_string(),
        subject,
        flag(o.restore_color, "Restore natural, realistic colors."),
        flag(o.redraw_hair, "Redraw the hair in fine detail."),
        flag(o.is_asian, "The people are Asian with black hair."),
        flag(o.redraw_clothing, "Redraw the clothing with clean, sharp detail."),
        flag(o.sharpen_background, "Sharpen the background."),
        flag(o.adhere_to_face, "Stay faithful to the original facial features."),
        flag(o.redraw_details, "Repair damage and redraw missing details."),
        flag(o.remove_yellowing, "Remove yellowing and fading."),
        s.fine_tune_prompt.trim().to_string(),
    ])
}

fn flag(enabled: bool, sentence: &str) -> String {
    if enabled {
        sentence.to_string()
    } else {
        String::new()
    }
}

fn join_sentences(parts: &[String]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Slider value → wording used by the cleaning and smoothing tools.
pub fn level_word(level: u8) -> &'static str {
    if level > 66 {
        "strong"
    } else if level < 33 {
        "light"
    } else {
        "medium"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestorationLevel {
    Light,
    Medium,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
    Auto,
}

impl Gender {
    fn label(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "non-binary",
            Gender::Auto => "auto",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestorationOptions {
    pub restore_color: bool,
    pub redraw_hair: bool,
    pub is_asian: bool,
    pub redraw_clothing: bool,
    pub sharpen_background: bool,
    pub adhere_to_face: bool,
    pub redraw_details: bool,
    pub remove_yellowing: bool,
}

impl Default for RestorationOptions {
    fn default() -> Self {
        Self {
            restore_color: true,
            redraw_hair: true,
            is_asian: true,
            redraw_clothing: true,
            sharpen_background: true,
            adhere_to_face: true,
            redraw_details: true,
            remove_yellowing: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestorationSettings {
    pub level: RestorationLevel,
    pub gender: Gender,
    pub age: u32,
    pub fine_tune_prompt: String,
    pub options: RestorationOptions,
}

impl Default for RestorationSettings {
    fn default() -> Self {
        Self {
            level: RestorationLevel::Strong,
            gender: Gender::Auto,
            age: 40,
            fine_tune_prompt: String::new(),
            options: RestorationOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementSettings {
    pub level: u8,
    pub remove_watermark: bool,
}

impl Default for EnhancementSettings {
    fn default() -> Self {
        Self {
            level: 50,
            remove_watermark: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpscaleSettings {
    pub scale: u8,
}

impl UpscaleSettings {
    pub const SCALES: [u8; 4] = [2, 4, 8, 16];
}

impl Default for UpscaleSettings {
    fn default() -> Self {
        Self { scale: 2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdBackground {
    Blue,
    White,
}

impl IdBackground {
    fn label(self) -> &'static str {
        match self {
            IdBackground::Blue => "blue",
            IdBackground::White => "white",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdPhotoSettings {
    pub background: IdBackground,
    pub standardize_clothing: bool,
}

impl Default for IdPhotoSettings {
    fn default() -> Self {
        Self {
            background: IdBackground::Blue,
            standardize_clothing: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentRestorationSettings {
    pub enhance_text: bool,
    pub remove_stains: bool,
    pub straighten: bool,
}

impl Default for DocumentRestorationSettings {
    fn default() -> Self {
        Self {
            enhance_text: true,
            remove_stains: true,
            straighten: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeddingStyle {
    #[default]
    Classic,
    Beach,
    Forest,
}

impl WeddingStyle {
    fn label(self) -> &'static str {
        match self {
            WeddingStyle::Classic => "Classic",
            WeddingStyle::Beach => "Beach",
            WeddingStyle::Forest => "Forest",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeddingPhotoSettings {
    pub style: WeddingStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trend {
    #[default]
    #[serde(rename = "90s-yearbook")]
    NinetiesYearbook,
    Cyberpunk,
    FantasyAvatar,
}

impl Trend {
    fn label(self) -> &'static str {
        match self {
            Trend::NinetiesYearbook => "90s Yearbook",
            Trend::Cyberpunk => "Cyberpunk",
            Trend::FantasyAvatar => "Fantasy Avatar",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendPhotoSettings {
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeBackgroundSettings {
    pub prompt: String,
}

impl Default for ChangeBackgroundSettings {
    fn default() -> Self {
        Self {
            prompt: "a beautiful beach at sunset".to_string(),
        }
    }
}

/// Shared by the clean-background, clean-image and skin-smoothing tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelSettings {
    pub level: u8,
}

impl Default for LevelSettings {
    fn default() -> Self {
        Self { level: 50 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BwStyle {
    #[default]
    Classic,
    HighContrast,
    SepiaTone,
}

impl BwStyle {
    fn label(self) -> &'static str {
        match self {
            BwStyle::Classic => "Classic",
            BwStyle::HighContrast => "High Contrast",
            BwStyle::SepiaTone => "Sepia Tone",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BwPhotoSettings {
    pub style: BwStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorPreset {
    #[default]
    VibrantSummer,
    MoodyAutumn,
    VintageFilm,
    CyberpunkNeon,
}

impl ColorPreset {
    fn label(self) -> &'static str {
        match self {
            ColorPreset::VibrantSummer => "Vibrant Summer",
            ColorPreset::MoodyAutumn => "Moody Autumn",
            ColorPreset::VintageFilm => "Vintage Film",
            ColorPreset::CyberpunkNeon => "Cyberpunk Neon",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetColorSettings {
    pub preset: ColorPreset,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoColorSettings {
    pub fine_tune_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptEditSettings {
    pub prompt: String,
}

impl Default for PromptEditSettings {
    fn default() -> Self {
        Self {
            prompt: "make the sky look like a starry night".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    #[default]
    Sepia,
    Grayscale,
    Invert,
    Posterize,
}

impl FilterKind {
    fn label(self) -> &'static str {
        match self {
            FilterKind::Sepia => "Sepia",
            FilterKind::Grayscale => "Grayscale",
            FilterKind::Invert => "Invert",
            FilterKind::Posterize => "Posterize",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageFilterSettings {
    pub filter: FilterKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tool_round_trips_through_its_id() {
        for tool in Tool::ALL {
            assert_eq!(Tool::parse(tool.id()).unwrap(), tool);
            assert_eq!(tool.default_settings().tool(), tool);
        }
        assert_eq!(Tool::parse("SHARPEN").unwrap(), Tool::Enhance);
        assert!(Tool::parse("teleport").is_err());
    }

    #[test]
    fn every_default_prompt_is_non_empty() {
        for tool in Tool::ALL {
            let prompt = generate_edit_prompt(&tool.default_settings());
            assert!(!prompt.trim().is_empty(), "{} has empty prompt", tool.id());
            assert!(!prompt.contains("  "), "{} has doubled spaces", tool.id());
        }
    }

    #[test]
    fn partial_settings_keep_defaults() {
        let settings = Tool::DocumentRestore
            .settings_from_json(json!({"remove_stains": false}))
            .unwrap();
        let prompt = generate_edit_prompt(&settings);
        assert_eq!(
            prompt,
            "Restore this document. Enhance text clarity. Correct perspective."
        );
    }

    #[test]
    fn restoration_prompt_leads_with_restore_instruction() {
        let prompt = generate_edit_prompt(&Tool::Restore.default_settings());
        assert!(prompt.starts_with("Restore this old, damaged photograph."));
        assert!(prompt.contains("Remove yellowing and fading."));
    }

    #[test]
    fn level_words_follow_thresholds() {
        assert_eq!(level_word(10), "light");
        assert_eq!(level_word(33), "medium");
        assert_eq!(level_word(66), "medium");
        assert_eq!(level_word(67), "strong");
    }

    #[test]
    fn upscale_rejects_unsupported_factor() {
        assert!(Tool::Upscale.settings_from_json(json!({"scale": 3})).is_err());
        let ok = Tool::Upscale.settings_from_json(json!({"scale": 16})).unwrap();
        assert_eq!(
            generate_edit_prompt(&ok),
            "Upscale this image, increasing its resolution by 16x."
        );
    }

    #[test]
    fn enum_settings_accept_kebab_values() {
        let settings = Tool::TrendPhoto
            .settings_from_json(json!({"trend": "fantasy-avatar"}))
            .unwrap();
        assert!(generate_edit_prompt(&settings).contains("\"Fantasy Avatar\""));
        let settings = Tool::TrendPhoto
            .settings_from_json(json!({"trend": "90s-yearbook"}))
            .unwrap();
        assert!(generate_edit_prompt(&settings).contains("90s Yearbook"));
    }
}
