use std::collections::BTreeSet;

use crate::model::{
    attributes::{AttributeSet, HdrFormat},
    profile::{OverlayCategory, Profile},
};

/// Running agreement on a single-valued field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
enum Agree {
    #[default]
    Unseen,
    Same(String),
    /// Children disagree, or one of them has no value.
    Mixed,
}

impl Agree {
    fn fold(&mut self, v: Option<&str>) {
        *self = match (std::mem::take(self), v) {
            (Agree::Mixed, _) | (_, None) => Agree::Mixed,
            (Agree::Unseen, Some(v)) => Agree::Same(v.to_string()),
            (Agree::Same(cur), Some(v)) if cur == v => Agree::Same(cur),
            (Agree::Same(_), Some(_)) => Agree::Mixed,
        };
    }

    fn settled(&self) -> bool {
        *self == Agree::Mixed
    }

    fn into_value(self) -> Option<String> {
        match self {
            Agree::Same(v) => Some(v),
            _ => None,
        }
    }
}

/// Running intersection on a multi-valued field. `None` until the first child.
#[derive(Clone, Debug, Default)]
struct Intersect(Option<BTreeSet<String>>);

impl Intersect {
    fn fold(&mut self, v: &BTreeSet<String>) {
        match &mut self.0 {
            None => self.0 = Some(v.clone()),
            Some(acc) if acc.is_empty() => {}
            Some(acc) => acc.retain(|x| v.contains(x)),
        }
    }

    fn settled(&self) -> bool {
        self.0.as_ref().is_some_and(BTreeSet::is_empty)
    }

    fn into_value(self) -> BTreeSet<String> {
        self.0.unwrap_or_default()
    }
}

/// Folds children's stream attributes into what is true for all of them.
///
/// Sets intersect, single values survive only if every child agrees, and HDR keeps three
/// AND-ed flags resolved by precedence at the end. Disabled categories stay empty.
#[derive(Clone, Debug)]
pub struct Reduction {
    enabled: BTreeSet<OverlayCategory>,
    audio_languages: Intersect,
    subtitle_languages: Intersect,
    audio_codecs: Intersect,
    video_codecs: Intersect,
    channel_layout: Agree,
    resolution: Agree,
    aspect_ratio: Agree,
    all_dolby_vision: bool,
    all_hdr10plus: bool,
    all_hdr: bool,
    hdr_enabled: bool,
    children: usize,
}

impl Reduction {
    pub fn new(profile: &Profile) -> Self {
        let hdr_enabled = profile.is_enabled(OverlayCategory::VideoFormat);
        Self {
            enabled: profile
                .enabled_categories()
                .filter(|c| c.is_stream_derived())
                .collect(),
            audio_languages: Intersect::default(),
            subtitle_languages: Intersect::default(),
            audio_codecs: Intersect::default(),
            video_codecs: Intersect::default(),
            channel_layout: Agree::default(),
            resolution: Agree::default(),
            aspect_ratio: Agree::default(),
            all_dolby_vision: true,
            all_hdr10plus: true,
            all_hdr: true,
            hdr_enabled,
            children: 0,
        }
    }

    fn on(&self, c: OverlayCategory) -> bool {
        self.enabled.contains(&c)
    }

    pub fn fold(&mut self, child: &AttributeSet) {
        self.children += 1;
        if self.on(OverlayCategory::AudioLanguage) {
            self.audio_languages.fold(&child.audio_languages);
        }
        if self.on(OverlayCategory::SubtitleLanguage) {
            self.subtitle_languages.fold(&child.subtitle_languages);
        }
        if self.on(OverlayCategory::AudioCodec) {
            self.audio_codecs.fold(&child.audio_codecs);
        }
        if self.on(OverlayCategory::VideoCodec) {
            self.video_codecs.fold(&child.video_codecs);
        }
        if self.on(OverlayCategory::ChannelLayout) {
            self.channel_layout.fold(child.channel_layout.as_deref());
        }
        if self.on(OverlayCategory::Resolution) {
            self.resolution.fold(child.resolution.as_deref());
        }
        if self.on(OverlayCategory::AspectRatio) {
            self.aspect_ratio.fold(child.aspect_ratio.as_deref());
        }
        if self.on(OverlayCategory::VideoFormat) {
            let f = &child.video_formats;
            self.all_dolby_vision &= f.contains(&HdrFormat::DolbyVision);
            self.all_hdr10plus &= f.contains(&HdrFormat::Hdr10Plus);
            self.all_hdr &= f.contains(&HdrFormat::Hdr);
        }
        let settled: Vec<OverlayCategory> = self
            .enabled
            .iter()
            .copied()
            .filter(|c| self.category_settled(*c))
            .collect();
        for c in settled {
            self.enabled.remove(&c);
        }
    }

    fn category_settled(&self, c: OverlayCategory) -> bool {
        match c {
            OverlayCategory::AudioLanguage => self.audio_languages.settled(),
            OverlayCategory::SubtitleLanguage => self.subtitle_languages.settled(),
            OverlayCategory::AudioCodec => self.audio_codecs.settled(),
            OverlayCategory::VideoCodec => self.video_codecs.settled(),
            OverlayCategory::ChannelLayout => self.channel_layout.settled(),
            OverlayCategory::Resolution => self.resolution.settled(),
            OverlayCategory::AspectRatio => self.aspect_ratio.settled(),
            OverlayCategory::VideoFormat => {
                !(self.all_dolby_vision || self.all_hdr10plus || self.all_hdr)
            }
            _ => true,
        }
    }

    /// Every category has reached an empty or disagreeing state; further children change nothing.
    pub fn is_settled(&self) -> bool {
        self.enabled.is_empty()
    }

    pub fn children(&self) -> usize {
        self.children
    }

    pub fn finish(self) -> AttributeSet {
        if self.children == 0 {
            return AttributeSet::default();
        }
        let hdr = if !self.hdr_enabled {
            None
        } else if self.all_dolby_vision {
            Some(HdrFormat::DolbyVision)
        } else if self.all_hdr10plus {
            Some(HdrFormat::Hdr10Plus)
        } else if self.all_hdr {
            Some(HdrFormat::Hdr)
        } else {
            None
        };
        AttributeSet {
            audio_languages: self.audio_languages.into_value(),
            subtitle_languages: self.subtitle_languages.into_value(),
            audio_codecs: self.audio_codecs.into_value(),
            video_codecs: self.video_codecs.into_value(),
            channel_layout: self.channel_layout.into_value(),
            resolution: self.resolution.into_value(),
            aspect_ratio: self.aspect_ratio.into_value(),
            video_formats: hdr.into_iter().collect(),
            parental_rating: None,
            tags: BTreeSet::new(),
        }
    }
}

/// Reduce a whole slice at once.
pub fn reduce_all<'a>(
    profile: &Profile,
    children: impl IntoIterator<Item = &'a AttributeSet>,
) -> AttributeSet {
    let mut r = Reduction::new(profile);
    for child in children {
        r.fold(child);
    }
    r.finish()
}

#[cfg(test)]
#[path = "../../tests/unit/aggregate/reduce.rs"]
mod tests;
