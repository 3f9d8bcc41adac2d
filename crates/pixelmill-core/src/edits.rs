//! Canonical edit model
//!
//! An `EditMap` is the normalized form of an image-transformation request:
//! an ordered set of typed edits with unique keys. Insertion order governs
//! application order. Re-inserting an existing key overwrites the value in
//! place (the original position is kept, matching JSON object semantics),
//! with one exception: the `resize` entry is cumulative — filters merge
//! fields into it incrementally instead of replacing it.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Output formats the edit vocabulary can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
    Tiff,
    Heif,
}

impl OutputFormat {
    /// Parse a format name; `jpg` is an alias for `jpeg`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Some(OutputFormat::Jpeg),
            "png" => Some(OutputFormat::Png),
            "webp" => Some(OutputFormat::WebP),
            "tiff" => Some(OutputFormat::Tiff),
            "heif" => Some(OutputFormat::Heif),
            _ => None,
        }
    }

    /// Format derived from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::parse(ext)
    }

    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
            OutputFormat::Tiff => "tiff",
            OutputFormat::Heif => "heif",
        }
    }

    pub fn to_mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
            OutputFormat::Tiff => "image/tiff",
            OutputFormat::Heif => "image/heif",
        }
    }
}

impl Serialize for OutputFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for OutputFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        OutputFormat::parse(&raw)
            .ok_or_else(|| de::Error::custom(format!("unsupported output format: {}", raw)))
    }
}

/// An 8-bit RGB color, used for flatten and resize backgrounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    /// Parse a hex color string.
    ///
    /// 6-digit values map directly. 3- and 4-digit short forms expand by
    /// doubling each digit (`fff` and `ffff` are both white); other short
    /// forms are right-padded with `0`. A leading `#` is tolerated.
    pub fn from_hex(raw: &str) -> Option<Self> {
        let hex = raw.trim().trim_start_matches('#');
        if hex.is_empty() || hex.len() > 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let expanded: String = match hex.len() {
            6 => hex.to_string(),
            3 | 4 => hex.chars().flat_map(|c| [c, c]).take(6).collect(),
            _ => format!("{:0<6}", hex),
        };
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&expanded[range], 16).ok();
        Some(RgbColor {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }
}

/// A tint color with fractional channels (the `rgb()` filter scales each
/// 0-100 argument by 2.55).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TintColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

/// How a resize maps the source onto the target box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFit {
    Cover,
    Contain,
    Fill,
    Inside,
    Outside,
}

/// Cumulative resize parameters. Filters merge into this entry one field at
/// a time, so every field is optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResizeEdit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit: Option<ResizeFit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<RgbColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub without_enlargement: Option<bool>,
}

/// Convolution kernel; `kernel.len() == width * height`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvolveEdit {
    pub width: u32,
    pub height: u32,
    pub kernel: Vec<f32>,
}

/// Flatten onto a solid background, dropping the alpha channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenEdit {
    pub background: RgbColor,
}

/// Face-aware crop parameters. `face_index` selects among detected faces;
/// a request that omits it fails at execution time rather than defaulting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SmartCropEdit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_index: Option<usize>,
    pub padding: u32,
}

/// A relative-coordinate rectangle describing a detected face.
/// All fields are fractions of the image dimensions in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

/// An absolute pixel rectangle. Invariant: `left + width <= image width`
/// and `top + height <= image height` of the canvas it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// One axis of an overlay position: an absolute pixel offset (negative
/// values measure from the far edge) or a percentage of the base canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionToken {
    Pixels(i64),
    Percent(u32),
}

impl PositionToken {
    /// Accepts `^-?\d+$` (pixels) or `^\d+p$` (percent); anything else is
    /// rejected and the axis falls back to centered placement.
    pub fn parse(raw: &str) -> Option<Self> {
        if let Some(percent) = raw.strip_suffix('p') {
            if !percent.is_empty() && percent.chars().all(|c| c.is_ascii_digit()) {
                return percent.parse().ok().map(PositionToken::Percent);
            }
            return None;
        }
        let digits = raw.strip_prefix('-').unwrap_or(raw);
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            return raw.parse().ok().map(PositionToken::Pixels);
        }
        None
    }
}

impl fmt::Display for PositionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionToken::Pixels(px) => write!(f, "{}", px),
            PositionToken::Percent(p) => write!(f, "{}p", p),
        }
    }
}

impl Serialize for PositionToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PositionToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        PositionToken::parse(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid position token: {}", raw)))
    }
}

/// Overlay placement; an absent axis means centered on that axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayPosition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<PositionToken>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<PositionToken>,
}

/// Overlay (watermark) specification.
///
/// `alpha` follows the thumbor convention: 0 is opaque, 100 fully
/// transparent. Ratios are percentages of the base image dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlaySpec {
    pub bucket: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<u32>,
    #[serde(default, rename = "wRatio", skip_serializing_if = "Option::is_none")]
    pub width_ratio: Option<f32>,
    #[serde(default, rename = "hRatio", skip_serializing_if = "Option::is_none")]
    pub height_ratio: Option<f32>,
    #[serde(default, rename = "options")]
    pub position: OverlayPosition,
}

/// Identity of an edit inside the map. Per-format quality entries are
/// distinct keys, so `jpeg.quality` and `webp.quality` can coexist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditKey {
    Resize,
    Rotate,
    Blur,
    Sharpen,
    Convolve,
    Tint,
    Flatten,
    Normalize,
    Grayscale,
    Flip,
    Flop,
    ToFormat,
    FormatOptions(OutputFormat),
    OverlayWith,
    SmartCrop,
}

/// One normalized edit operation. The vocabulary is closed: new operations
/// are added as variants, not as stringly-typed passthroughs.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    Resize(ResizeEdit),
    Rotate(i32),
    Blur(f32),
    Sharpen(f32),
    Convolve(ConvolveEdit),
    Tint(TintColor),
    Flatten(FlattenEdit),
    Normalize,
    Grayscale(bool),
    Flip(bool),
    Flop(bool),
    ToFormat(OutputFormat),
    FormatOptions { format: OutputFormat, quality: u32 },
    OverlayWith(OverlaySpec),
    SmartCrop(SmartCropEdit),
}

impl Edit {
    pub fn key(&self) -> EditKey {
        match self {
            Edit::Resize(_) => EditKey::Resize,
            Edit::Rotate(_) => EditKey::Rotate,
            Edit::Blur(_) => EditKey::Blur,
            Edit::Sharpen(_) => EditKey::Sharpen,
            Edit::Convolve(_) => EditKey::Convolve,
            Edit::Tint(_) => EditKey::Tint,
            Edit::Flatten(_) => EditKey::Flatten,
            Edit::Normalize => EditKey::Normalize,
            Edit::Grayscale(_) => EditKey::Grayscale,
            Edit::Flip(_) => EditKey::Flip,
            Edit::Flop(_) => EditKey::Flop,
            Edit::ToFormat(_) => EditKey::ToFormat,
            Edit::FormatOptions { format, .. } => EditKey::FormatOptions(*format),
            Edit::OverlayWith(_) => EditKey::OverlayWith,
            Edit::SmartCrop(_) => EditKey::SmartCrop,
        }
    }

    /// Key name used for serialization and error annotation.
    pub fn key_name(&self) -> &'static str {
        match self {
            Edit::Resize(_) => "resize",
            Edit::Rotate(_) => "rotate",
            Edit::Blur(_) => "blur",
            Edit::Sharpen(_) => "sharpen",
            Edit::Convolve(_) => "convolve",
            Edit::Tint(_) => "tint",
            Edit::Flatten(_) => "flatten",
            Edit::Normalize => "normalize",
            Edit::Grayscale(_) => "grayscale",
            Edit::Flip(_) => "flip",
            Edit::Flop(_) => "flop",
            Edit::ToFormat(_) => "toFormat",
            Edit::FormatOptions { format, .. } => format.name(),
            Edit::OverlayWith(_) => "overlayWith",
            Edit::SmartCrop(_) => "smartCrop",
        }
    }
}

/// Ordered set of edits with unique keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditMap {
    entries: Vec<Edit>,
}

impl EditMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: EditKey) -> Option<&Edit> {
        self.entries.iter().find(|e| e.key() == key)
    }

    /// Insert an edit. If the key already exists the value is overwritten
    /// in place, keeping its original position in the application order.
    pub fn insert(&mut self, edit: Edit) {
        let key = edit.key();
        match self.entries.iter().position(|e| e.key() == key) {
            Some(pos) => self.entries[pos] = edit,
            None => self.entries.push(edit),
        }
    }

    /// Mutable access to the cumulative resize entry, inserting an empty
    /// one at the current tail position if absent.
    pub fn resize_mut(&mut self) -> &mut ResizeEdit {
        let pos = match self
            .entries
            .iter()
            .position(|e| matches!(e, Edit::Resize(_)))
        {
            Some(pos) => pos,
            None => {
                self.entries.push(Edit::Resize(ResizeEdit::default()));
                self.entries.len() - 1
            }
        };
        match &mut self.entries[pos] {
            Edit::Resize(resize) => resize,
            _ => unreachable!(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Edit> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a EditMap {
    type Item = &'a Edit;
    type IntoIter = std::slice::Iter<'a, Edit>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<Edit> for EditMap {
    fn from_iter<I: IntoIterator<Item = Edit>>(iter: I) -> Self {
        let mut map = EditMap::new();
        for edit in iter {
            map.insert(edit);
        }
        map
    }
}

#[derive(Serialize)]
struct QualityValue {
    quality: u32,
}

impl Serialize for EditMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for edit in &self.entries {
            let key = edit.key_name();
            match edit {
                Edit::Resize(v) => map.serialize_entry(key, v)?,
                Edit::Rotate(v) => map.serialize_entry(key, v)?,
                Edit::Blur(v) => map.serialize_entry(key, v)?,
                Edit::Sharpen(v) => map.serialize_entry(key, v)?,
                Edit::Convolve(v) => map.serialize_entry(key, v)?,
                Edit::Tint(v) => map.serialize_entry(key, v)?,
                Edit::Flatten(v) => map.serialize_entry(key, v)?,
                Edit::Normalize => map.serialize_entry(key, &true)?,
                Edit::Grayscale(v) => map.serialize_entry(key, v)?,
                Edit::Flip(v) => map.serialize_entry(key, v)?,
                Edit::Flop(v) => map.serialize_entry(key, v)?,
                Edit::ToFormat(v) => map.serialize_entry(key, v)?,
                Edit::FormatOptions { quality, .. } => {
                    map.serialize_entry(key, &QualityValue { quality: *quality })?
                }
                Edit::OverlayWith(v) => map.serialize_entry(key, v)?,
                Edit::SmartCrop(v) => map.serialize_entry(key, v)?,
            }
        }
        map.end()
    }
}

/// Convert one `(key, value)` pair of a structured request into an edit.
/// Unknown keys yield `None` and are skipped, mirroring the tolerance of
/// the path grammar toward unrecognized filter tokens.
fn edit_from_json(key: &str, value: serde_json::Value) -> Option<Edit> {
    let edit = match key {
        "resize" => Edit::Resize(serde_json::from_value(value).ok()?),
        "rotate" => Edit::Rotate(value.as_i64()? as i32),
        "blur" => Edit::Blur(value.as_f64()? as f32),
        "sharpen" => Edit::Sharpen(value.as_f64()? as f32),
        "convolve" => Edit::Convolve(serde_json::from_value(value).ok()?),
        "tint" => Edit::Tint(serde_json::from_value(value).ok()?),
        "flatten" => Edit::Flatten(serde_json::from_value(value).ok()?),
        "normalize" => match value {
            serde_json::Value::Bool(true) => Edit::Normalize,
            serde_json::Value::String(s) if s == "true" => Edit::Normalize,
            _ => return None,
        },
        "grayscale" | "greyscale" => Edit::Grayscale(value.as_bool()?),
        "flip" => Edit::Flip(value.as_bool()?),
        "flop" => Edit::Flop(value.as_bool()?),
        "toFormat" => Edit::ToFormat(serde_json::from_value(value).ok()?),
        "jpeg" | "png" | "webp" | "tiff" | "heif" => {
            let format = OutputFormat::parse(key)?;
            let quality = value.get("quality")?.as_u64()? as u32;
            Edit::FormatOptions { format, quality }
        }
        "overlayWith" => Edit::OverlayWith(serde_json::from_value(value).ok()?),
        "smartCrop" => match value {
            serde_json::Value::Bool(true) => Edit::SmartCrop(SmartCropEdit::default()),
            other => Edit::SmartCrop(serde_json::from_value(other).ok()?),
        },
        _ => return None,
    };
    Some(edit)
}

impl<'de> Deserialize<'de> for EditMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EditMapVisitor;

        impl<'de> Visitor<'de> for EditMapVisitor {
            type Value = EditMap;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of edit operations")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut edits = EditMap::new();
                while let Some((key, value)) =
                    access.next_entry::<String, serde_json::Value>()?
                {
                    if let Some(edit) = edit_from_json(&key, value) {
                        edits.insert(edit);
                    }
                }
                Ok(edits)
            }
        }

        deserializer.deserialize_map(EditMapVisitor)
    }
}
