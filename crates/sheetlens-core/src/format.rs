use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

/// Interned style id. `0` means "no style" (absence, not the empty style).
pub type StyleId = u32;

/// RGBA color representation, serialized as a CSS hex string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Color { r, g, b, a }
    }

    /// Convert to CSS hex color string
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    /// Parse from CSS hex color string (`#rrggbb` or `#rrggbbaa`)
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            6 => Some(Color::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Some(Color::rgba(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }

    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Color::from_hex(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid hex color `{}`", raw)))
    }
}

/// Horizontal text alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HorizontalAlign {
    General,
    Left,
    Center,
    Right,
    Fill,
    Justify,
}

/// Vertical text alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalAlign {
    Top,
    Middle,
    Bottom,
}

/// One of the properties the resolver and the range writer understand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatProperty {
    Bold,
    Italic,
    FontSize,
    FontColor,
    BackgroundColor,
    NumberFormat,
    HorizontalAlign,
}

impl FormatProperty {
    pub const ALL: [FormatProperty; 7] = [
        FormatProperty::Bold,
        FormatProperty::Italic,
        FormatProperty::FontSize,
        FormatProperty::FontColor,
        FormatProperty::BackgroundColor,
        FormatProperty::NumberFormat,
        FormatProperty::HorizontalAlign,
    ];
}

/// Sparse format over the supported property set
///
/// A `None` field is "unset at this layer", never "explicitly cleared".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CellFormat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal_align: Option<HorizontalAlign>,
}

impl CellFormat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bold(mut self, bold: bool) -> Self {
        self.bold = Some(bold);
        self
    }

    pub fn with_italic(mut self, italic: bool) -> Self {
        self.italic = Some(italic);
        self
    }

    pub fn with_font_size(mut self, size: u16) -> Self {
        self.font_size = Some(size);
        self
    }

    pub fn with_font_color(mut self, color: Color) -> Self {
        self.font_color = Some(color);
        self
    }

    pub fn with_background_color(mut self, color: Color) -> Self {
        self.background_color = Some(color);
        self
    }

    pub fn with_number_format(mut self, format: impl Into<String>) -> Self {
        self.number_format = Some(format.into());
        self
    }

    pub fn with_horizontal_align(mut self, align: HorizontalAlign) -> Self {
        self.horizontal_align = Some(align);
        self
    }

    /// True when no property is set
    pub fn is_empty(&self) -> bool {
        FormatProperty::ALL.iter().all(|p| !self.is_set(*p))
    }

    pub fn is_set(&self, prop: FormatProperty) -> bool {
        match prop {
            FormatProperty::Bold => self.bold.is_some(),
            FormatProperty::Italic => self.italic.is_some(),
            FormatProperty::FontSize => self.font_size.is_some(),
            FormatProperty::FontColor => self.font_color.is_some(),
            FormatProperty::BackgroundColor => self.background_color.is_some(),
            FormatProperty::NumberFormat => self.number_format.is_some(),
            FormatProperty::HorizontalAlign => self.horizontal_align.is_some(),
        }
    }

    /// Compare a single property (both unset counts as equal)
    pub fn property_eq(&self, other: &CellFormat, prop: FormatProperty) -> bool {
        match prop {
            FormatProperty::Bold => self.bold == other.bold,
            FormatProperty::Italic => self.italic == other.italic,
            FormatProperty::FontSize => self.font_size == other.font_size,
            FormatProperty::FontColor => self.font_color == other.font_color,
            FormatProperty::BackgroundColor => self.background_color == other.background_color,
            FormatProperty::NumberFormat => self.number_format == other.number_format,
            FormatProperty::HorizontalAlign => self.horizontal_align == other.horizontal_align,
        }
    }

    /// Copy one property (set or unset) from `other`
    pub fn copy_property(&mut self, other: &CellFormat, prop: FormatProperty) {
        match prop {
            FormatProperty::Bold => self.bold = other.bold,
            FormatProperty::Italic => self.italic = other.italic,
            FormatProperty::FontSize => self.font_size = other.font_size,
            FormatProperty::FontColor => self.font_color = other.font_color,
            FormatProperty::BackgroundColor => self.background_color = other.background_color,
            FormatProperty::NumberFormat => self.number_format.clone_from(&other.number_format),
            FormatProperty::HorizontalAlign => self.horizontal_align = other.horizontal_align,
        }
    }

    pub fn clear_property(&mut self, prop: FormatProperty) {
        match prop {
            FormatProperty::Bold => self.bold = None,
            FormatProperty::Italic => self.italic = None,
            FormatProperty::FontSize => self.font_size = None,
            FormatProperty::FontColor => self.font_color = None,
            FormatProperty::BackgroundColor => self.background_color = None,
            FormatProperty::NumberFormat => self.number_format = None,
            FormatProperty::HorizontalAlign => self.horizontal_align = None,
        }
    }

    /// Shallow merge: every property set on `upper` replaces ours, unset ones leave ours alone
    pub fn merge_over(&mut self, upper: &CellFormat) {
        for prop in FormatProperty::ALL {
            if upper.is_set(prop) {
                self.copy_property(upper, prop);
            }
        }
    }
}

/// A style object as kept by the store
///
/// Carries the supported `CellFormat` properties plus properties the engine does not
/// interpret. Unknown keys are rejected when deserializing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Style {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal_align: Option<HorizontalAlign>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strikethrough: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrap_text: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical_align: Option<VerticalAlign>,
}

impl Style {
    /// The supported-property view of this style
    pub fn format(&self) -> CellFormat {
        CellFormat {
            bold: self.bold,
            italic: self.italic,
            font_size: self.font_size,
            font_color: self.font_color,
            background_color: self.background_color,
            number_format: self.number_format.clone(),
            horizontal_align: self.horizontal_align,
        }
    }

    /// Replace every supported property, keeping the others untouched
    pub fn set_format(&mut self, format: CellFormat) {
        self.bold = format.bold;
        self.italic = format.italic;
        self.font_size = format.font_size;
        self.font_color = format.font_color;
        self.background_color = format.background_color;
        self.number_format = format.number_format;
        self.horizontal_align = format.horizontal_align;
    }

    /// Overlay the properties set in `patch`
    pub fn apply_patch(&mut self, patch: &CellFormat) {
        let mut format = self.format();
        format.merge_over(patch);
        self.set_format(format);
    }

    pub fn is_empty(&self) -> bool {
        *self == Style::default()
    }
}

impl From<CellFormat> for Style {
    fn from(format: CellFormat) -> Self {
        let mut style = Style::default();
        style.set_format(format);
        style
    }
}

/// Deduplicating style table: identical styles share one id
#[derive(Debug, Clone)]
pub struct StyleTable {
    /// Index 0 is the reserved "no style" slot
    styles: Vec<Style>,
    ids: HashMap<Style, StyleId>,
}

impl Default for StyleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleTable {
    pub fn new() -> Self {
        Self {
            styles: vec![Style::default()],
            ids: HashMap::new(),
        }
    }

    /// Intern a style, returning its id. The empty style interns to `0`.
    pub fn intern(&mut self, style: Style) -> StyleId {
        if style.is_empty() {
            return 0;
        }
        if let Some(id) = self.ids.get(&style) {
            return *id;
        }
        let id = self.styles.len() as StyleId;
        self.styles.push(style.clone());
        self.ids.insert(style, id);
        id
    }

    pub fn get(&self, id: StyleId) -> Option<&Style> {
        if id == 0 {
            return None;
        }
        self.styles.get(id as usize)
    }

    /// Number of interned (non-empty) styles
    pub fn len(&self) -> usize {
        self.styles.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
