use crate::model::{
    attributes::{AttributeSet, HdrFormat},
    item::{LibraryItem, MediaStream, StreamKind},
    profile::{OverlayCategory, Profile},
};

/// Stream-derived attributes of a leaf, computing only the categories `profile` enables.
pub fn extract_streams(streams: &[MediaStream], profile: &Profile) -> AttributeSet {
    let on = |c: OverlayCategory| profile.is_enabled(c);
    let audio = || streams.iter().filter(|s| s.kind == StreamKind::Audio);
    let video = streams.iter().find(|s| s.kind == StreamKind::Video);

    let mut out = AttributeSet::default();
    if on(OverlayCategory::AudioLanguage) {
        out.audio_languages = audio().filter_map(language).collect();
    }
    if on(OverlayCategory::SubtitleLanguage) {
        out.subtitle_languages = streams
            .iter()
            .filter(|s| s.kind == StreamKind::Subtitle)
            .filter_map(language)
            .collect();
    }
    if on(OverlayCategory::AudioCodec) {
        out.audio_codecs = audio().filter_map(audio_codec).collect();
    }
    if on(OverlayCategory::ChannelLayout) {
        out.channel_layout = audio()
            .filter_map(|s| channel_layout(s).map(|l| (s.channels.unwrap_or(0), l)))
            .max_by_key(|(channels, _)| *channels)
            .map(|(_, l)| l);
    }
    if let Some(v) = video {
        if on(OverlayCategory::VideoCodec) {
            out.video_codecs = streams
                .iter()
                .filter(|s| s.kind == StreamKind::Video)
                .filter_map(video_codec)
                .collect();
        }
        if on(OverlayCategory::Resolution) {
            out.resolution = resolution(v);
        }
        if on(OverlayCategory::AspectRatio) {
            out.aspect_ratio = aspect_ratio(v);
        }
        if on(OverlayCategory::VideoFormat) {
            out.video_formats = hdr_formats(v).into_iter().collect();
        }
    }
    out
}

/// Metadata-derived attributes (parental rating, tags). No stream scan involved.
pub fn extract_metadata(item: &LibraryItem, profile: &Profile) -> AttributeSet {
    let mut out = AttributeSet::default();
    if profile.is_enabled(OverlayCategory::ParentalRating) {
        out.parental_rating = item
            .official_rating
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
    }
    if profile.is_enabled(OverlayCategory::Tag) {
        out.tags = item
            .tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
    }
    out
}

fn language(s: &MediaStream) -> Option<String> {
    let lang = s.language.as_deref()?.trim().to_ascii_lowercase();
    (!lang.is_empty() && lang != "und").then_some(lang)
}

fn audio_codec(s: &MediaStream) -> Option<String> {
    let codec = s.codec.as_deref()?.trim().to_ascii_lowercase();
    let profile = s.profile.as_deref().unwrap_or("").to_ascii_lowercase();
    let name = match codec.as_str() {
        "" => return None,
        "dca" | "dts" if profile.contains("dts:x") => "dtsx",
        "dca" | "dts" if profile.contains("ma") || profile.contains("hd") => "dtshd",
        "dca" | "dts" => "dts",
        "truehd" | "mlp" => "truehd",
        "e-ac-3" | "eac3" => "eac3",
        "a_ac3" | "ac-3" | "ac3" => "ac3",
        c if c.starts_with("pcm") => "pcm",
        c => c,
    };
    Some(name.to_string())
}

fn video_codec(s: &MediaStream) -> Option<String> {
    let codec = s.codec.as_deref()?.trim().to_ascii_lowercase();
    let name = match codec.as_str() {
        "" => return None,
        "avc" | "h264" | "x264" => "h264",
        "hevc" | "h265" | "x265" => "hevc",
        "mpeg2video" | "mpeg2" => "mpeg2",
        c => c,
    };
    Some(name.to_string())
}

fn channel_layout(s: &MediaStream) -> Option<String> {
    if let Some(layout) = s.channel_layout.as_deref() {
        // "5.1(side)" -> "5.1"
        let base = layout
            .split('(')
            .next()
            .unwrap_or(layout)
            .trim()
            .to_ascii_lowercase();
        if !base.is_empty() {
            return Some(base);
        }
    }
    let name = match s.channels? {
        0 => return None,
        1 => "mono",
        2 => "stereo",
        3 => "2.1",
        4 => "4.0",
        5 => "5.0",
        6 => "5.1",
        7 => "6.1",
        _ => "7.1",
    };
    Some(name.to_string())
}

fn resolution(s: &MediaStream) -> Option<String> {
    let w = s.width.unwrap_or(0);
    let h = s.height.unwrap_or(0);
    if w == 0 && h == 0 {
        return None;
    }
    // Width first so letterboxed encodes land in their nominal class.
    let name = if w >= 7000 || h >= 4000 {
        "8k"
    } else if w >= 3200 || h >= 2000 {
        "4k"
    } else if w >= 1800 || h >= 1000 {
        "1080p"
    } else if w >= 1200 || h >= 700 {
        "720p"
    } else if h >= 560 {
        "576p"
    } else {
        "480p"
    };
    Some(name.to_string())
}

fn aspect_ratio(s: &MediaStream) -> Option<String> {
    if let Some(ratio) = s.aspect_ratio.as_deref().map(str::trim)
        && !ratio.is_empty()
    {
        // "2.40:1" -> "2.40", "16:9" -> "16x9"
        let ratio = ratio.strip_suffix(":1").unwrap_or(ratio);
        return Some(ratio.replace(':', "x").to_ascii_lowercase());
    }
    let (w, h) = (s.width?, s.height?);
    if h == 0 {
        return None;
    }
    Some(format!("{:.2}", f64::from(w) / f64::from(h)))
}

/// Every HDR flag a stream carries. Dolby Vision and HDR10+ streams also count as HDR.
pub(crate) fn hdr_formats(s: &MediaStream) -> Vec<HdrFormat> {
    let range = s.video_range.as_deref().unwrap_or("").to_ascii_lowercase();
    let dv = s.is_dolby_vision || range.contains("dovi") || range.contains("dolby");
    let hdr10plus = range.contains("hdr10+") || range.contains("hdr10plus");
    let hdr = dv || hdr10plus || range.contains("hdr") || range.contains("hlg");

    let mut out = Vec::new();
    if hdr {
        out.push(HdrFormat::Hdr);
    }
    if hdr10plus {
        out.push(HdrFormat::Hdr10Plus);
    }
    if dv {
        out.push(HdrFormat::DolbyVision);
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/attributes/extract.rs"]
mod tests;
