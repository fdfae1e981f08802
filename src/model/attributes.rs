use std::collections::BTreeSet;

use crate::foundation::hash::{Fingerprint, StableHasher};

/// HDR flavour of a video stream.
///
/// Variant order is display precedence: the greatest element of a set is the label drawn.
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
pub enum HdrFormat {
    Hdr,
    Hdr10Plus,
    DolbyVision,
}

impl HdrFormat {
    pub const ALL: [HdrFormat; 3] = [Self::DolbyVision, Self::Hdr10Plus, Self::Hdr];

    /// Icon stem for this format.
    pub fn label(self) -> &'static str {
        match self {
            Self::DolbyVision => "dv",
            Self::Hdr10Plus => "hdr10plus",
            Self::Hdr => "hdr",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.label().eq_ignore_ascii_case(s))
    }
}

/// Resolved descriptive attributes of one item.
///
/// Multi-valued fields are sets so that equality and hashing are independent of stream order.
/// Languages and codecs are lower-case; tags keep their case.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AttributeSet {
    pub audio_languages: BTreeSet<String>,
    pub subtitle_languages: BTreeSet<String>,
    pub audio_codecs: BTreeSet<String>,
    pub video_codecs: BTreeSet<String>,
    pub channel_layout: Option<String>,
    pub resolution: Option<String>,
    pub aspect_ratio: Option<String>,
    pub video_formats: BTreeSet<HdrFormat>,
    pub parental_rating: Option<String>,
    pub tags: BTreeSet<String>,
}

impl AttributeSet {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The single HDR label drawn for this set, by precedence.
    pub fn video_format(&self) -> Option<HdrFormat> {
        self.video_formats.iter().next_back().copied()
    }

    /// Stable digest of every field.
    pub fn content_hash(&self) -> Fingerprint {
        let mut h = StableHasher::new();
        h.write_strs(self.audio_languages.iter().map(String::as_str));
        h.write_strs(self.subtitle_languages.iter().map(String::as_str));
        h.write_strs(self.audio_codecs.iter().map(String::as_str));
        h.write_strs(self.video_codecs.iter().map(String::as_str));
        h.write_opt_str(self.channel_layout.as_deref());
        h.write_opt_str(self.resolution.as_deref());
        h.write_opt_str(self.aspect_ratio.as_deref());
        h.write_strs(self.video_formats.iter().map(|f| f.label()));
        h.write_opt_str(self.parental_rating.as_deref());
        h.write_strs(self.tags.iter().map(String::as_str));
        h.finish()
    }

    /// Fill every field that is empty here from `other`.
    pub(crate) fn merge_missing(mut self, other: &AttributeSet) -> Self {
        fn fill<T: Clone + Ord>(dst: &mut BTreeSet<T>, src: &BTreeSet<T>) {
            if dst.is_empty() {
                dst.clone_from(src);
            }
        }
        fn fill_opt(dst: &mut Option<String>, src: &Option<String>) {
            if dst.is_none() {
                dst.clone_from(src);
            }
        }

        fill(&mut self.audio_languages, &other.audio_languages);
        fill(&mut self.subtitle_languages, &other.subtitle_languages);
        fill(&mut self.audio_codecs, &other.audio_codecs);
        fill(&mut self.video_codecs, &other.video_codecs);
        fill_opt(&mut self.channel_layout, &other.channel_layout);
        fill_opt(&mut self.resolution, &other.resolution);
        fill_opt(&mut self.aspect_ratio, &other.aspect_ratio);
        fill(&mut self.video_formats, &other.video_formats);
        fill_opt(&mut self.parental_rating, &other.parental_rating);
        fill(&mut self.tags, &other.tags);
        self
    }

    pub fn with_audio_languages<I, S>(mut self, langs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.audio_languages = lower_set(langs);
        self
    }

    pub fn with_subtitle_languages<I, S>(mut self, langs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.subtitle_languages = lower_set(langs);
        self
    }

    pub fn with_audio_codecs<I, S>(mut self, codecs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.audio_codecs = lower_set(codecs);
        self
    }

    pub fn with_video_codecs<I, S>(mut self, codecs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.video_codecs = lower_set(codecs);
        self
    }

    pub fn with_channel_layout(mut self, layout: Option<&str>) -> Self {
        self.channel_layout = layout.map(str::to_ascii_lowercase);
        self
    }

    pub fn with_resolution(mut self, resolution: Option<&str>) -> Self {
        self.resolution = resolution.map(str::to_ascii_lowercase);
        self
    }

    pub fn with_aspect_ratio(mut self, ratio: Option<&str>) -> Self {
        self.aspect_ratio = ratio.map(str::to_string);
        self
    }

    pub fn with_video_formats(mut self, formats: impl IntoIterator<Item = HdrFormat>) -> Self {
        self.video_formats = formats.into_iter().collect();
        self
    }

    pub fn with_parental_rating(mut self, rating: Option<&str>) -> Self {
        self.parental_rating = rating.map(str::to_string);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

fn lower_set<I, S>(items: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/model/attributes.rs"]
mod tests;
