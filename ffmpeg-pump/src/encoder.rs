use ffmpeg_next::{
    Codec, Packet, Rational, codec, encoder, ffi,
    format::{Pixel, Sample},
    frame,
};

use crate::error::{MediaError, Result};
use crate::format::{
    codec_pixel_formats, codec_sample_formats, pixel_format, pixel_format_name, sample_format,
    sample_format_name,
};
use crate::pump::{CodecSession, EngineResult, Outcome};

impl CodecSession for encoder::Video {
    type Input = frame::Video;
    type Output = Packet;

    fn send(&mut self, input: Option<&frame::Video>) -> EngineResult<Outcome> {
        match input {
            Some(frame) => Outcome::from_result(self.send_frame(frame)),
            None => Outcome::from_result(self.send_eof()),
        }
    }

    fn receive(&mut self, output: &mut Packet) -> EngineResult<Outcome> {
        Outcome::from_result(self.receive_packet(output))
    }
}

impl CodecSession for encoder::Audio {
    type Input = frame::Audio;
    type Output = Packet;

    fn send(&mut self, input: Option<&frame::Audio>) -> EngineResult<Outcome> {
        match input {
            Some(frame) => Outcome::from_result(self.send_frame(frame)),
            None => Outcome::from_result(self.send_eof()),
        }
    }

    fn receive(&mut self, output: &mut Packet) -> EngineResult<Outcome> {
        Outcome::from_result(self.receive_packet(output))
    }
}

/// Requested video stream parameters. Unset fields fall back to encoder defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub bit_rate: Option<usize>,
    pub gop_size: Option<u32>,
    /// Seconds added to every presentation timestamp.
    pub start_time: f64,
    pub codec: Option<String>,
    pub pixel_format: Option<String>,
}

impl VideoSettings {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            fps,
            bit_rate: None,
            gop_size: None,
            start_time: 0.0,
            codec: None,
            pixel_format: None,
        }
    }

    pub fn bit_rate(mut self, bit_rate: usize) -> Self {
        self.bit_rate = Some(bit_rate);
        self
    }

    pub fn gop_size(mut self, gop_size: u32) -> Self {
        self.gop_size = Some(gop_size);
        self
    }

    pub fn start_time(mut self, seconds: f64) -> Self {
        self.start_time = seconds;
        self
    }

    pub fn codec(mut self, name: impl Into<String>) -> Self {
        self.codec = Some(name.into());
        self
    }

    pub fn pixel_format(mut self, name: impl Into<String>) -> Self {
        self.pixel_format = Some(name.into());
        self
    }

    /// Keyframe interval: one second of frames unless set, never below 1.
    pub fn effective_gop(&self) -> u32 {
        match self.gop_size {
            Some(gop) => gop.max(1),
            None => (self.fps.floor() as u32).max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioSettings {
    pub channels: u16,
    pub sample_rate: u32,
    pub bit_rate: Option<usize>,
    pub start_time: f64,
    pub codec: Option<String>,
    pub sample_format: Option<String>,
}

impl AudioSettings {
    pub fn new(channels: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
            bit_rate: None,
            start_time: 0.0,
            codec: None,
            sample_format: None,
        }
    }

    pub fn bit_rate(mut self, bit_rate: usize) -> Self {
        self.bit_rate = Some(bit_rate);
        self
    }

    pub fn start_time(mut self, seconds: f64) -> Self {
        self.start_time = seconds;
        self
    }

    pub fn codec(mut self, name: impl Into<String>) -> Self {
        self.codec = Some(name.into());
        self
    }

    pub fn sample_format(mut self, name: impl Into<String>) -> Self {
        self.sample_format = Some(name.into());
        self
    }
}

/// Parameters an opened video encoder settled on.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoConfig {
    pub codec_name: String,
    pub width: u32,
    pub height: u32,
    pub pixel_format: Pixel,
    pub fps: f64,
    pub time_base: Rational,
    pub gop_size: u32,
    pub bit_rate: usize,
    pub start_time: f64,
    /// `start_time` in codec time base ticks.
    pub pts_offset: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioConfig {
    pub codec_name: String,
    pub channels: u16,
    pub sample_rate: u32,
    pub sample_format: Sample,
    /// Samples per channel the encoder expects per unit; 0 when any length is accepted.
    pub frame_size: usize,
    pub time_base: Rational,
    pub bit_rate: usize,
    pub start_time: f64,
    pub pts_offset: i64,
}

fn pts_offset(start_time: f64, time_base: Rational) -> i64 {
    (start_time / f64::from(time_base)).round() as i64
}

fn resolve_pixel_format(codec: &Codec, requested: Option<&str>) -> Result<Pixel> {
    let supported = codec_pixel_formats(codec);
    match requested {
        Some(name) => {
            let format = pixel_format(name)?;
            if !supported.is_empty() && !supported.contains(&format) {
                return Err(MediaError::UnsupportedFormat(format!(
                    "{} does not support pixel format {}",
                    codec.name(),
                    name
                )));
            }
            Ok(format)
        }
        None => supported.first().copied().ok_or_else(|| {
            MediaError::UnsupportedFormat(format!("{} lists no pixel formats", codec.name()))
        }),
    }
}

fn resolve_sample_format(codec: &Codec, requested: Option<&str>) -> Result<Sample> {
    let supported = codec_sample_formats(codec);
    match requested {
        Some(name) => {
            let format = sample_format(name)?;
            if !supported.is_empty() && !supported.contains(&format) {
                return Err(MediaError::UnsupportedFormat(format!(
                    "{} does not support sample format {}",
                    codec.name(),
                    name
                )));
            }
            Ok(format)
        }
        None => supported.first().copied().ok_or_else(|| {
            MediaError::UnsupportedFormat(format!("{} lists no sample formats", codec.name()))
        }),
    }
}

fn opened_time_base(ctx: &codec::Context) -> Rational {
    unsafe { Rational::from((*ctx.as_ptr()).time_base) }
}

fn opened_bit_rate(ctx: &codec::Context) -> usize {
    unsafe { (*ctx.as_ptr()).bit_rate.max(0) as usize }
}

/// Opens `codec` as a video encoder; the codec time base is one frame duration.
pub fn open_video(
    codec: Codec,
    settings: &VideoSettings,
    global_header: bool,
) -> Result<(encoder::Video, VideoConfig)> {
    if settings.width == 0 || settings.height == 0 || !(settings.fps > 0.0) {
        return Err(MediaError::UnsupportedFormat(format!(
            "video geometry {}x{} at {} fps",
            settings.width, settings.height, settings.fps
        )));
    }
    let format = resolve_pixel_format(&codec, settings.pixel_format.as_deref())?;
    let time_base = Rational::from(settings.fps).invert();
    let gop_size = settings.effective_gop();

    let ctx = codec::Context::new_with_codec(codec);
    let mut video = ctx
        .encoder()
        .video()
        .map_err(|e| MediaError::engine_open(format!("{} encoder", codec.name()), e))?;
    video.set_width(settings.width);
    video.set_height(settings.height);
    video.set_format(format);
    video.set_time_base(time_base);
    video.set_frame_rate(Some(time_base.invert()));
    video.set_gop(gop_size);
    if let Some(bit_rate) = settings.bit_rate {
        video.set_bit_rate(bit_rate);
    }
    if global_header {
        video.set_flags(codec::Flags::GLOBAL_HEADER);
    }
    let opened = video
        .open()
        .map_err(|e| MediaError::engine_open(format!("{} encoder", codec.name()), e))?;

    let time_base = opened_time_base(&opened);
    let config = VideoConfig {
        codec_name: codec.name().to_string(),
        width: settings.width,
        height: settings.height,
        pixel_format: format,
        fps: settings.fps,
        time_base,
        gop_size,
        bit_rate: opened_bit_rate(&opened),
        start_time: settings.start_time,
        pts_offset: pts_offset(settings.start_time, time_base),
    };
    log::info!(
        "opened {} encoder: {}x{} {} @ {} fps, gop {}",
        config.codec_name,
        config.width,
        config.height,
        pixel_format_name(format).unwrap_or("?"),
        config.fps,
        gop_size
    );
    Ok((opened, config))
}

/// Opens `codec` as an audio encoder ticking once per sample, or in `time_base` when given.
pub fn open_audio(
    codec: Codec,
    settings: &AudioSettings,
    global_header: bool,
    time_base: Option<Rational>,
) -> Result<(encoder::Audio, AudioConfig)> {
    if settings.channels == 0 || settings.sample_rate == 0 {
        return Err(MediaError::UnsupportedFormat(format!(
            "{} channels at {} Hz",
            settings.channels, settings.sample_rate
        )));
    }
    let format = resolve_sample_format(&codec, settings.sample_format.as_deref())?;
    if let Some(rates) = codec.audio().ok().and_then(|a| a.rates()) {
        let rates: Vec<i32> = rates.collect();
        if !rates.is_empty() && !rates.contains(&(settings.sample_rate as i32)) {
            return Err(MediaError::UnsupportedFormat(format!(
                "{} does not support {} Hz",
                codec.name(),
                settings.sample_rate
            )));
        }
    }
    let time_base = time_base.unwrap_or(Rational::new(1, settings.sample_rate as i32));

    let ctx = codec::Context::new_with_codec(codec);
    let mut audio = ctx
        .encoder()
        .audio()
        .map_err(|e| MediaError::engine_open(format!("{} encoder", codec.name()), e))?;
    audio.set_rate(settings.sample_rate as i32);
    audio.set_format(format);
    audio.set_time_base(time_base);
    unsafe {
        ffi::av_channel_layout_default(
            &mut (*audio.as_mut_ptr()).ch_layout,
            settings.channels as i32,
        );
    }
    if let Some(bit_rate) = settings.bit_rate {
        audio.set_bit_rate(bit_rate);
    }
    if global_header {
        audio.set_flags(codec::Flags::GLOBAL_HEADER);
    }
    let opened = audio
        .open()
        .map_err(|e| MediaError::engine_open(format!("{} encoder", codec.name()), e))?;

    let frame_size = unsafe { (*opened.as_ptr()).frame_size.max(0) as usize };
    let time_base = opened_time_base(&opened);
    let config = AudioConfig {
        codec_name: codec.name().to_string(),
        channels: settings.channels,
        sample_rate: settings.sample_rate,
        sample_format: format,
        frame_size,
        time_base,
        bit_rate: opened_bit_rate(&opened),
        start_time: settings.start_time,
        pts_offset: pts_offset(settings.start_time, time_base),
    };
    log::info!(
        "opened {} encoder: {} channels {} Hz {}, frame size {}",
        config.codec_name,
        config.channels,
        config.sample_rate,
        sample_format_name(format).unwrap_or("?"),
        frame_size
    );
    Ok((opened, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaKind;
    use crate::format::find_encoder;

    #[test]
    fn gop_defaults_to_one_second_of_frames() {
        assert_eq!(VideoSettings::new(64, 64, 25.0).effective_gop(), 25);
        assert_eq!(VideoSettings::new(64, 64, 29.97).effective_gop(), 29);
        assert_eq!(VideoSettings::new(64, 64, 0.5).effective_gop(), 1);
        assert_eq!(VideoSettings::new(64, 64, 25.0).gop_size(0).effective_gop(), 1);
        assert_eq!(VideoSettings::new(64, 64, 25.0).gop_size(12).effective_gop(), 12);
    }

    #[test]
    fn video_encoder_takes_first_supported_format() -> anyhow::Result<()> {
        ffmpeg_next::init()?;
        let codec = find_encoder("ffv1", MediaKind::Video)?;
        let (_, config) = open_video(codec, &VideoSettings::new(64, 48, 25.0).start_time(2.0), false)?;
        assert_eq!(Some(config.pixel_format), codec_pixel_formats(&codec).first().copied());
        assert_eq!(config.time_base, Rational::new(1, 25));
        assert_eq!(config.gop_size, 25);
        assert_eq!(config.pts_offset, 50);
        Ok(())
    }

    #[test]
    fn unsupported_pixel_format_is_rejected() -> anyhow::Result<()> {
        ffmpeg_next::init()?;
        let codec = find_encoder("mpeg4", MediaKind::Video)?;
        let settings = VideoSettings::new(64, 64, 25.0).pixel_format("rgb24");
        let err = open_video(codec, &settings, false).unwrap_err();
        assert!(matches!(err, MediaError::UnsupportedFormat(_)));
        Ok(())
    }

    #[test]
    fn pcm_encoder_accepts_any_unit_length() -> anyhow::Result<()> {
        ffmpeg_next::init()?;
        let codec = find_encoder("pcm_s16le", MediaKind::Audio)?;
        let (_, config) = open_audio(codec, &AudioSettings::new(2, 48000), false, None)?;
        assert_eq!(config.frame_size, 0);
        assert_eq!(config.time_base, Rational::new(1, 48000));
        assert_eq!(sample_format_name(config.sample_format), Some("s16"));
        Ok(())
    }
}
