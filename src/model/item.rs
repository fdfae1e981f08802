use crate::foundation::core::{ItemId, LibraryId, Ticks};

/// Kind of library item, split into renderable leaves and aggregating parents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Movie,
    Episode,
    Video,
    MusicVideo,
    Series,
    Season,
    BoxSet,
    Other,
}

impl ItemKind {
    /// Items whose attributes come from their own media streams.
    pub fn is_leaf(self) -> bool {
        matches!(
            self,
            Self::Movie | Self::Episode | Self::Video | Self::MusicVideo
        )
    }

    /// Items whose stream attributes are aggregated from their children.
    pub fn is_parent(self) -> bool {
        matches!(self, Self::Series | Self::Season | Self::BoxSet)
    }
}

/// Image slot the host asks the engine to enhance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    Primary,
    Backdrop,
    Thumb,
    Logo,
    Banner,
}

/// A library item as handed over by the host.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LibraryItem {
    pub id: ItemId,
    pub kind: ItemKind,
    #[serde(default)]
    pub library_id: Option<LibraryId>,
    #[serde(default)]
    pub name: String,
    /// `(parent index, index)`, e.g. season and episode numbers.
    #[serde(default)]
    pub sort_index: (Option<i32>, Option<i32>),
    #[serde(default)]
    pub date_modified: Ticks,
    /// Parental rating label such as `PG-13`.
    #[serde(default)]
    pub official_rating: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub community_rating: Option<f32>,
    /// Lightweight reference that must be resolved through the library before its id can
    /// be used as a cache key.
    #[serde(default)]
    pub placeholder: bool,
}

impl LibraryItem {
    pub fn new(id: ItemId, kind: ItemKind) -> Self {
        Self {
            id,
            kind,
            library_id: None,
            name: String::new(),
            sort_index: (None, None),
            date_modified: Ticks::default(),
            official_rating: None,
            tags: Vec::new(),
            community_rating: None,
            placeholder: false,
        }
    }

    pub fn with_library(mut self, library: LibraryId) -> Self {
        self.library_id = Some(library);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_sort_index(mut self, parent: Option<i32>, index: Option<i32>) -> Self {
        self.sort_index = (parent, index);
        self
    }

    pub fn with_date_modified(mut self, ticks: Ticks) -> Self {
        self.date_modified = ticks;
        self
    }

    pub fn with_official_rating(mut self, rating: impl Into<String>) -> Self {
        self.official_rating = Some(rating.into());
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

    pub fn with_community_rating(mut self, rating: f32) -> Self {
        self.community_rating = Some(rating);
        self
    }

    pub fn as_placeholder(mut self) -> Self {
        self.placeholder = true;
        self
    }

    /// Stable ordering used to pick a lite-mode representative.
    pub(crate) fn stable_order_key(&self) -> (i32, i32, ItemId) {
        (
            self.sort_index.0.unwrap_or(i32::MAX),
            self.sort_index.1.unwrap_or(i32::MAX),
            self.id,
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Audio,
    Subtitle,
    Video,
}

/// One media stream of a leaf item, as reported by the host's probe.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MediaStream {
    pub kind: StreamKind,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub channels: Option<u32>,
    #[serde(default)]
    pub channel_layout: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    /// `SDR`, `HDR10`, `HDR10+`, `HLG`, `DOVI` and combinations such as `DOVIWithHDR10`.
    #[serde(default)]
    pub video_range: Option<String>,
    #[serde(default)]
    pub is_dolby_vision: bool,
}

impl MediaStream {
    fn bare(kind: StreamKind) -> Self {
        Self {
            kind,
            language: None,
            codec: None,
            profile: None,
            channels: None,
            channel_layout: None,
            width: None,
            height: None,
            aspect_ratio: None,
            video_range: None,
            is_dolby_vision: false,
        }
    }

    pub fn audio(language: &str, codec: &str, channels: u32) -> Self {
        Self {
            language: Some(language.to_string()),
            codec: Some(codec.to_string()),
            channels: Some(channels),
            ..Self::bare(StreamKind::Audio)
        }
    }

    pub fn subtitle(language: &str) -> Self {
        Self {
            language: Some(language.to_string()),
            ..Self::bare(StreamKind::Subtitle)
        }
    }

    pub fn video(codec: &str, width: u32, height: u32) -> Self {
        Self {
            codec: Some(codec.to_string()),
            width: Some(width),
            height: Some(height),
            ..Self::bare(StreamKind::Video)
        }
    }

    pub fn with_video_range(mut self, range: &str) -> Self {
        self.video_range = Some(range.to_string());
        self
    }

    pub fn with_dolby_vision(mut self) -> Self {
        self.is_dolby_vision = true;
        self
    }

    pub fn with_channel_layout(mut self, layout: &str) -> Self {
        self.channel_layout = Some(layout.to_string());
        self
    }

    pub fn with_aspect_ratio(mut self, ratio: &str) -> Self {
        self.aspect_ratio = Some(ratio.to_string());
        self
    }

    pub fn with_profile(mut self, profile: &str) -> Self {
        self.profile = Some(profile.to_string());
        self
    }
}
