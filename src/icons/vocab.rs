use std::path::Path;

use crate::model::{attributes::HdrFormat, profile::OverlayCategory};

/// File extensions considered icons.
pub const ICON_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "webp", "gif", "bmp", "svg"];

/// Prefix marking a subtitle-language icon: `srt.<lang>.<ext>`.
pub const SUBTITLE_PREFIX: &str = "srt.";

pub const CHANNEL_LAYOUTS: &[&str] = &[
    "mono", "stereo", "1.0", "2.0", "2.1", "3.0", "3.1", "4.0", "4.1", "5.0", "5.1", "5.1.2",
    "5.1.4", "6.1", "7.1", "7.1.2", "7.1.4",
];

pub const RESOLUTIONS: &[&str] = &[
    "480p", "576p", "720p", "1080p", "1440p", "2160p", "4k", "8k", "sd", "hd", "fhd", "uhd",
];

pub const AUDIO_CODECS: &[&str] = &[
    "aac", "ac3", "eac3", "dts", "dtshd", "dtsx", "truehd", "atmos", "flac", "alac", "mp3",
    "opus", "vorbis", "pcm",
];

pub const VIDEO_CODECS: &[&str] = &[
    "h264", "h265", "hevc", "avc", "av1", "vp8", "vp9", "mpeg2", "mpeg4", "vc1", "xvid", "divx",
];

pub const ASPECT_RATIOS: &[&str] = &[
    "4x3", "16x9", "21x9", "1.33", "1.37", "1.66", "1.78", "1.85", "2.00", "2.20", "2.35", "2.39",
    "2.40",
];

pub const PARENTAL_RATINGS: &[&str] = &[
    "g", "pg", "pg-13", "r", "nc-17", "nr", "unrated", "tv-y", "tv-y7", "tv-g", "tv-pg", "tv-14",
    "tv-ma", "fsk-0", "fsk-6", "fsk-12", "fsk-16", "fsk-18",
];

/// What a file name in the icon folder stands for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IconClass {
    /// `srt.<lang>`: lower-cased language.
    Subtitle(String),
    /// A name from one of the closed vocabularies, lower-cased.
    Fixed(OverlayCategory, String),
    /// Anything else: an audio-language candidate (lower-cased) and a tag (case kept).
    LanguageOrTag { lower: String, exact: String },
}

pub fn is_icon_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| ICON_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Classify an icon file by its name. `None` for unsupported or hidden files.
pub fn classify(path: &Path) -> Option<IconClass> {
    if !is_icon_extension(path) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?.trim();
    if stem.is_empty() || stem.starts_with('.') {
        return None;
    }
    let lower = stem.to_ascii_lowercase();

    if let Some(lang) = lower.strip_prefix(SUBTITLE_PREFIX) {
        return (!lang.is_empty()).then(|| IconClass::Subtitle(lang.to_string()));
    }
    if let Some(category) = fixed_category(&lower) {
        return Some(IconClass::Fixed(category, lower));
    }
    Some(IconClass::LanguageOrTag {
        lower,
        exact: stem.to_string(),
    })
}

fn fixed_category(lower: &str) -> Option<OverlayCategory> {
    let vocabularies: [(OverlayCategory, &[&str]); 6] = [
        (OverlayCategory::ChannelLayout, CHANNEL_LAYOUTS),
        (OverlayCategory::Resolution, RESOLUTIONS),
        (OverlayCategory::AudioCodec, AUDIO_CODECS),
        (OverlayCategory::VideoCodec, VIDEO_CODECS),
        (OverlayCategory::AspectRatio, ASPECT_RATIOS),
        (OverlayCategory::ParentalRating, PARENTAL_RATINGS),
    ];
    if HdrFormat::from_label(lower).is_some() {
        return Some(OverlayCategory::VideoFormat);
    }
    vocabularies
        .into_iter()
        .find(|(_, words)| words.contains(&lower))
        .map(|(c, _)| c)
}
