//! Pixel/sample format names and codec capability lookup.

use std::ffi::CString;

use ffmpeg_next::{
    Codec, Rational, ffi,
    format::{Pixel, Sample},
    media,
};

use crate::error::{MediaError, MediaKind, Result};

pub fn media_type(kind: MediaKind) -> media::Type {
    match kind {
        MediaKind::Video => media::Type::Video,
        MediaKind::Audio => media::Type::Audio,
    }
}

pub fn pixel_format(name: &str) -> Result<Pixel> {
    match name.parse::<Pixel>() {
        Ok(Pixel::None) | Err(_) => Err(MediaError::UnsupportedFormat(format!(
            "unknown pixel format {}",
            name
        ))),
        Ok(format) => Ok(format),
    }
}

/// Engine name of `format`; `None` for the invalid-format sentinel.
pub fn pixel_format_name(format: Pixel) -> Option<&'static str> {
    if format == Pixel::None {
        return None;
    }
    format.descriptor().map(|d| d.name())
}

pub fn sample_format(name: &str) -> Result<Sample> {
    let unknown = || MediaError::UnsupportedFormat(format!("unknown sample format {}", name));
    let c_name = CString::new(name).map_err(|_| unknown())?;
    match Sample::from(unsafe { ffi::av_get_sample_fmt(c_name.as_ptr()) }) {
        Sample::None => Err(unknown()),
        format => Ok(format),
    }
}

pub fn sample_format_name(format: Sample) -> Option<&'static str> {
    if format == Sample::None {
        return None;
    }
    Some(format.name())
}

/// Looks up an encoder by name and checks it produces `kind`.
pub fn find_encoder(name: &str, kind: MediaKind) -> Result<Codec> {
    let codec = ffmpeg_next::encoder::find_by_name(name)
        .ok_or_else(|| MediaError::UnsupportedFormat(format!("unknown encoder {}", name)))?;
    if codec.medium() != media_type(kind) {
        return Err(MediaError::UnsupportedFormat(format!(
            "{} is not a {} encoder",
            name, kind
        )));
    }
    Ok(codec)
}

pub fn codec_pixel_formats(codec: &Codec) -> Vec<Pixel> {
    codec
        .video()
        .ok()
        .and_then(|video| video.formats().map(|formats| formats.collect()))
        .unwrap_or_default()
}

pub fn codec_sample_formats(codec: &Codec) -> Vec<Sample> {
    codec
        .audio()
        .ok()
        .and_then(|audio| audio.formats().map(|formats| formats.collect()))
        .unwrap_or_default()
}

/// Encoder and decoder of `name` that handle `kind`.
fn codecs_named(name: &str, kind: MediaKind) -> Option<Vec<Codec>> {
    let codecs: Vec<Codec> = [
        ffmpeg_next::encoder::find_by_name(name),
        ffmpeg_next::decoder::find_by_name(name),
    ]
    .into_iter()
    .flatten()
    .filter(|codec| codec.medium() == media_type(kind))
    .collect();
    if codecs.is_empty() { None } else { Some(codecs) }
}

fn push_unique(names: &mut Vec<&'static str>, name: Option<&'static str>) {
    if let Some(name) = name {
        if !names.contains(&name) {
            names.push(name);
        }
    }
}

/// Pixel formats the encoder and decoder called `codec_name` support.
///
/// `None` when neither is a video codec.
pub fn video_pixel_formats(codec_name: &str) -> Option<Vec<&'static str>> {
    let mut names = Vec::new();
    for codec in codecs_named(codec_name, MediaKind::Video)? {
        for format in codec_pixel_formats(&codec) {
            push_unique(&mut names, pixel_format_name(format));
        }
    }
    Some(names)
}

/// Sample formats the encoder and decoder called `codec_name` support.
pub fn audio_sample_formats(codec_name: &str) -> Option<Vec<&'static str>> {
    let mut names = Vec::new();
    for codec in codecs_named(codec_name, MediaKind::Audio)? {
        for format in codec_sample_formats(&codec) {
            push_unique(&mut names, sample_format_name(format));
        }
    }
    Some(names)
}

/// Frame rates the video encoder accepts; empty when any rate is allowed.
pub fn video_frame_rates(codec_name: &str) -> Option<Vec<Rational>> {
    let codec = find_encoder(codec_name, MediaKind::Video).ok()?;
    let video = codec.video().ok()?;
    Some(video.rates().map(|rates| rates.collect()).unwrap_or_default())
}

/// Sample rates the audio encoder accepts; empty when any rate is allowed.
pub fn audio_sample_rates(codec_name: &str) -> Option<Vec<i32>> {
    let codec = find_encoder(codec_name, MediaKind::Audio).ok()?;
    let audio = codec.audio().ok()?;
    Some(audio.rates().map(|rates| rates.collect()).unwrap_or_default())
}

/// libavcodec version as "major.minor.micro".
pub fn engine_version() -> String {
    let v = ffmpeg_next::codec::version();
    format!("{}.{}.{}", v >> 16, (v >> 8) & 0xff, v & 0xff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_resolve_both_ways() {
        let yuv = pixel_format("yuv420p").unwrap();
        assert_eq!(yuv, Pixel::YUV420P);
        assert_eq!(pixel_format_name(yuv), Some("yuv420p"));
        assert_eq!(pixel_format_name(Pixel::None), None);

        let s16 = sample_format("s16").unwrap();
        assert_eq!(sample_format_name(s16), Some("s16"));
        assert_eq!(sample_format_name(Sample::None), None);
    }

    #[test]
    fn unknown_names_are_unsupported() {
        assert!(matches!(
            pixel_format("not-a-format"),
            Err(MediaError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            sample_format("not-a-format"),
            Err(MediaError::UnsupportedFormat(_))
        ));
        assert!(find_encoder("no-such-encoder", MediaKind::Video).is_err());
    }

    #[test]
    fn encoder_kind_is_checked() {
        assert!(find_encoder("pcm_s16le", MediaKind::Audio).is_ok());
        assert!(matches!(
            find_encoder("pcm_s16le", MediaKind::Video),
            Err(MediaError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn capability_queries_follow_media_type() {
        let ffv1 = video_pixel_formats("ffv1").unwrap();
        assert!(ffv1.contains(&"yuv420p"));
        assert!(video_pixel_formats("pcm_s16le").is_none());

        assert_eq!(audio_sample_formats("pcm_s16le").unwrap(), vec!["s16"]);
        assert!(audio_sample_formats("ffv1").is_none());
        assert!(video_frame_rates("ffv1").is_some());
    }
}
