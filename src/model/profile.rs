use std::collections::BTreeMap;

use crate::foundation::{
    error::{OverlayError, OverlayResult},
    hash::{Fingerprint, StableHasher},
};

/// One renderable attribute type. Declaration order breaks priority ties in layout.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OverlayCategory {
    AudioLanguage,
    SubtitleLanguage,
    ChannelLayout,
    AudioCodec,
    VideoCodec,
    Resolution,
    VideoFormat,
    AspectRatio,
    ParentalRating,
    Tag,
    Rating,
}

impl OverlayCategory {
    pub const ALL: [OverlayCategory; 11] = [
        Self::AudioLanguage,
        Self::SubtitleLanguage,
        Self::ChannelLayout,
        Self::AudioCodec,
        Self::VideoCodec,
        Self::Resolution,
        Self::VideoFormat,
        Self::AspectRatio,
        Self::ParentalRating,
        Self::Tag,
        Self::Rating,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::AudioLanguage => "audio_language",
            Self::SubtitleLanguage => "subtitle_language",
            Self::ChannelLayout => "channel_layout",
            Self::AudioCodec => "audio_codec",
            Self::VideoCodec => "video_codec",
            Self::Resolution => "resolution",
            Self::VideoFormat => "video_format",
            Self::AspectRatio => "aspect_ratio",
            Self::ParentalRating => "parental_rating",
            Self::Tag => "tag",
            Self::Rating => "rating",
        }
    }

    /// Categories read from media streams; these are the ones aggregated across children.
    pub fn is_stream_derived(self) -> bool {
        matches!(
            self,
            Self::AudioLanguage
                | Self::SubtitleLanguage
                | Self::ChannelLayout
                | Self::AudioCodec
                | Self::VideoCodec
                | Self::Resolution
                | Self::VideoFormat
                | Self::AspectRatio
        )
    }

    /// Icon lookups in this category match names exactly.
    pub fn is_case_sensitive(self) -> bool {
        matches!(self, Self::Tag)
    }
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    #[default]
    Disabled,
}

impl Alignment {
    pub const CORNERS: [Alignment; 4] = [
        Self::TopLeft,
        Self::TopRight,
        Self::BottomLeft,
        Self::BottomRight,
    ];

    pub fn is_enabled(self) -> bool {
        self != Self::Disabled
    }

    pub fn is_right(self) -> bool {
        matches!(self, Self::TopRight | Self::BottomRight)
    }

    pub fn is_bottom(self) -> bool {
        matches!(self, Self::BottomLeft | Self::BottomRight)
    }

    fn tag(self) -> u8 {
        match self {
            Self::TopLeft => 0,
            Self::TopRight => 1,
            Self::BottomLeft => 2,
            Self::BottomRight => 3,
            Self::Disabled => 4,
        }
    }
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Horizontal,
    Vertical,
}

/// Display rule for one category.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CategorySettings {
    pub alignment: Alignment,
    /// Lower values sit nearer the corner.
    pub priority: u32,
    pub orientation: Orientation,
    /// Icon height as a percentage of the poster's shorter side.
    pub icon_size_pct: f32,
}

impl Default for CategorySettings {
    fn default() -> Self {
        Self {
            alignment: Alignment::Disabled,
            priority: 1,
            orientation: Orientation::Horizontal,
            icon_size_pct: 8.0,
        }
    }
}

impl CategorySettings {
    pub fn at(alignment: Alignment, priority: u32, orientation: Orientation) -> Self {
        Self {
            alignment,
            priority,
            orientation,
            ..Self::default()
        }
    }

    pub fn with_icon_size_pct(mut self, pct: f32) -> Self {
        self.icon_size_pct = pct;
        self
    }
}

/// Straight-alpha RGBA8 colour. Deserializes from `#RRGGBB`, `#RRGGBBAA` or `[r, g, b, a]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const WHITE: Rgba8 = Rgba8::new(255, 255, 255, 255);
    pub const BLACK: Rgba8 = Rgba8::new(0, 0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl<'de> serde::Deserialize<'de> for Rgba8 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Hex(String),
            Arr(Vec<u8>),
            Obj { r: u8, g: u8, b: u8, a: u8 },
        }

        match <Repr as serde::Deserialize>::deserialize(deserializer)? {
            Repr::Hex(s) => parse_hex(&s).map_err(serde::de::Error::custom),
            Repr::Arr(v) => match v.as_slice() {
                [r, g, b] => Ok(Self::new(*r, *g, *b, 255)),
                [r, g, b, a] => Ok(Self::new(*r, *g, *b, *a)),
                _ => Err(serde::de::Error::custom(
                    "colour array must have len 3 or 4",
                )),
            },
            Repr::Obj { r, g, b, a } => Ok(Self::new(r, g, b, a)),
        }
    }
}

fn parse_hex(s: &str) -> Result<Rgba8, String> {
    let s = s.trim();
    let s = s.strip_prefix('#').unwrap_or(s);

    fn byte(s: &str, at: usize) -> Result<u8, String> {
        let pair = s.get(at..at + 2).ok_or("truncated hex colour")?;
        u8::from_str_radix(pair, 16).map_err(|_| format!("invalid hex byte \"{pair}\""))
    }

    match s.len() {
        6 => Ok(Rgba8::new(byte(s, 0)?, byte(s, 2)?, byte(s, 4)?, 255)),
        8 => Ok(Rgba8::new(
            byte(s, 0)?,
            byte(s, 2)?,
            byte(s, 4)?,
            byte(s, 6)?,
        )),
        _ => Err("hex colour must be #RRGGBB or #RRGGBBAA".to_owned()),
    }
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundShape {
    #[default]
    None,
    Circle,
    RoundedRect,
}

/// Background alpha at or above which the rating text is drawn without an outline.
pub const OPAQUE_BACKGROUND_ALPHA: u8 = 200;

/// Look of the numeric rating badge.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RatingAppearance {
    /// Text size as a percentage of the poster's shorter side.
    pub font_size_pct: f32,
    pub text_color: Rgba8,
    pub outline_color: Rgba8,
    /// Outline stroke width as a percentage of the text size.
    pub outline_width_pct: f32,
    pub background: BackgroundShape,
    pub background_color: Rgba8,
    /// Icon drawn left of the score, looked up in the rating category.
    pub badge_icon: Option<String>,
    pub decimals: u8,
}

impl Default for RatingAppearance {
    fn default() -> Self {
        Self {
            font_size_pct: 5.0,
            text_color: Rgba8::WHITE,
            outline_color: Rgba8::BLACK,
            outline_width_pct: 8.0,
            background: BackgroundShape::None,
            background_color: Rgba8::new(0, 0, 0, 160),
            badge_icon: None,
            decimals: 1,
        }
    }
}

impl RatingAppearance {
    pub fn has_background(&self) -> bool {
        self.background != BackgroundShape::None && self.background_color.a > 0
    }

    /// Whether the text gets an outline stroke before its fill.
    pub fn needs_outline(&self) -> bool {
        !(self.has_background() && self.background_color.a >= OPAQUE_BACKGROUND_ALPHA)
    }

    pub fn format_score(&self, score: f32) -> String {
        format!("{:.*}", usize::from(self.decimals.min(3)), score)
    }
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// One representative child.
    Lite,
    /// Every child, folded pairwise.
    #[default]
    Full,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AggregationSettings {
    pub enabled: bool,
    pub mode: AggregationMode,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: AggregationMode::Full,
        }
    }
}

/// Spacing, as percentages of the poster's shorter side.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LayoutSettings {
    /// Gap between the poster edge and the first group.
    pub margin_pct: f32,
    /// Gap between icons and between groups.
    pub padding_pct: f32,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            margin_pct: 2.0,
            padding_pct: 1.0,
        }
    }
}

/// Named bundle of display rules assigned to one or more libraries.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: String,
    /// Missing categories are disabled.
    pub categories: BTreeMap<OverlayCategory, CategorySettings>,
    pub rating: RatingAppearance,
    pub aggregation: AggregationSettings,
    pub layout: LayoutSettings,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: OverlayCategory, settings: CategorySettings) -> Self {
        self.categories.insert(category, settings);
        self
    }

    pub fn settings(&self, category: OverlayCategory) -> CategorySettings {
        self.categories.get(&category).copied().unwrap_or_default()
    }

    pub fn is_enabled(&self, category: OverlayCategory) -> bool {
        self.settings(category).alignment.is_enabled()
    }

    pub fn enabled_categories(&self) -> impl Iterator<Item = OverlayCategory> + '_ {
        self.categories
            .iter()
            .filter(|(_, s)| s.alignment.is_enabled())
            .map(|(c, _)| *c)
    }

    pub fn validate(&self) -> OverlayResult<()> {
        if self.name.trim().is_empty() {
            return Err(OverlayError::validation("profile name must be non-empty"));
        }
        for (cat, s) in &self.categories {
            if !s.icon_size_pct.is_finite() || s.icon_size_pct <= 0.0 || s.icon_size_pct > 100.0
            {
                return Err(OverlayError::validation(format!(
                    "profile '{}': {} icon_size_pct must be in (0, 100]",
                    self.name,
                    cat.label()
                )));
            }
        }
        let pcts = [
            ("rating.font_size_pct", self.rating.font_size_pct),
            ("rating.outline_width_pct", self.rating.outline_width_pct),
            ("layout.margin_pct", self.layout.margin_pct),
            ("layout.padding_pct", self.layout.padding_pct),
        ];
        for (field, v) in pcts {
            if !v.is_finite() || !(0.0..=100.0).contains(&v) {
                return Err(OverlayError::validation(format!(
                    "profile '{}': {field} must be in [0, 100]",
                    self.name
                )));
            }
        }
        if self.is_enabled(OverlayCategory::Rating) && self.rating.font_size_pct <= 0.0 {
            return Err(OverlayError::validation(format!(
                "profile '{}': rating.font_size_pct must be > 0",
                self.name
            )));
        }
        Ok(())
    }

    /// Digest of every setting that changes pixels.
    pub fn content_hash(&self) -> Fingerprint {
        let mut h = StableHasher::new();
        h.write_str(&self.name);
        h.write_u64(self.categories.len() as u64);
        for (cat, s) in &self.categories {
            h.write_str(cat.label());
            h.write_u8(s.alignment.tag());
            h.write_u32(s.priority);
            h.write_bool(s.orientation == Orientation::Vertical);
            h.write_f32(s.icon_size_pct);
        }

        let r = &self.rating;
        h.write_f32(r.font_size_pct);
        h.write_bytes(&r.text_color.to_array());
        h.write_bytes(&r.outline_color.to_array());
        h.write_f32(r.outline_width_pct);
        h.write_u8(r.background as u8);
        h.write_bytes(&r.background_color.to_array());
        h.write_opt_str(r.badge_icon.as_deref());
        h.write_u8(r.decimals);

        h.write_bool(self.aggregation.enabled);
        h.write_bool(self.aggregation.mode == AggregationMode::Lite);
        h.write_f32(self.layout.margin_pct);
        h.write_f32(self.layout.padding_pct);
        h.finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/model/profile.rs"]
mod tests;
