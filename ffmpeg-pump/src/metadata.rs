//! Stream and container descriptions (similar to ffprobe).

use std::fmt;
use std::path::Path;

use ffmpeg_next::{Rational, decoder, ffi, format::stream::Stream};

use crate::encoder::{AudioConfig, VideoConfig};
use crate::error::Result;
use crate::format::{pixel_format_name, sample_format_name};
use crate::input::MediaReader;

#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub index: usize,
    pub codec_name: String,
    pub width: u32,
    pub height: u32,
    pub pixel_format: &'static str,
    pub frame_rate: Rational,
    pub time_base: Rational,
    /// Bits per second; 0 if unknown.
    pub bit_rate: usize,
    pub gop_size: u32,
    /// Seconds.
    pub start_time: f64,
    /// Frame count reported by the container; 0 if unknown.
    pub frames: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioInfo {
    pub index: usize,
    pub codec_name: String,
    pub channels: u16,
    /// Samples per channel in one unit; 0 when units vary in length.
    pub samples_per_unit: usize,
    pub sample_format: &'static str,
    pub sample_rate: u32,
    pub time_base: Rational,
    pub bit_rate: usize,
    pub start_time: f64,
    pub frames: i64,
}

/// Container-level description plus the selected streams.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub format_name: String,
    /// Seconds; None if unknown (e.g. raw elementary streams).
    pub duration: Option<f64>,
    pub bit_rate: i64,
    pub nb_streams: u32,
    pub tags: Vec<(String, String)>,
    pub video: Option<VideoInfo>,
    pub audio: Option<AudioInfo>,
}

fn start_seconds(stream: &Stream) -> f64 {
    let start = stream.start_time();
    if start == ffi::AV_NOPTS_VALUE {
        0.0
    } else {
        start as f64 * f64::from(stream.time_base())
    }
}

impl VideoInfo {
    pub(crate) fn from_decoder(stream: &Stream, decoder: &decoder::Video) -> Self {
        let mut frame_rate = stream.avg_frame_rate();
        if frame_rate.numerator() == 0 {
            frame_rate = stream.rate();
        }
        Self {
            index: stream.index(),
            codec_name: decoder.id().name().to_string(),
            width: decoder.width(),
            height: decoder.height(),
            pixel_format: pixel_format_name(decoder.format()).unwrap_or("none"),
            frame_rate,
            time_base: stream.time_base(),
            bit_rate: decoder.bit_rate(),
            gop_size: unsafe { (*decoder.as_ptr()).gop_size.max(0) as u32 },
            start_time: start_seconds(stream),
            frames: stream.frames(),
        }
    }

    pub(crate) fn from_config(index: usize, config: &VideoConfig) -> Self {
        Self {
            index,
            codec_name: config.codec_name.clone(),
            width: config.width,
            height: config.height,
            pixel_format: pixel_format_name(config.pixel_format).unwrap_or("none"),
            frame_rate: config.time_base.invert(),
            time_base: config.time_base,
            bit_rate: config.bit_rate,
            gop_size: config.gop_size,
            start_time: config.start_time,
            frames: 0,
        }
    }

    pub fn fps(&self) -> f64 {
        if self.frame_rate.denominator() == 0 {
            0.0
        } else {
            f64::from(self.frame_rate)
        }
    }
}

impl AudioInfo {
    pub(crate) fn from_decoder(stream: &Stream, decoder: &decoder::Audio) -> Self {
        let (channels, frame_size) = unsafe {
            let ptr = decoder.as_ptr();
            (
                (*ptr).ch_layout.nb_channels.max(0) as u16,
                (*ptr).frame_size.max(0) as usize,
            )
        };
        Self {
            index: stream.index(),
            codec_name: decoder.id().name().to_string(),
            channels,
            samples_per_unit: frame_size,
            sample_format: sample_format_name(decoder.format()).unwrap_or("none"),
            sample_rate: decoder.rate(),
            time_base: stream.time_base(),
            bit_rate: decoder.bit_rate(),
            start_time: start_seconds(stream),
            frames: stream.frames(),
        }
    }

    pub(crate) fn from_config(index: usize, config: &AudioConfig) -> Self {
        Self {
            index,
            codec_name: config.codec_name.clone(),
            channels: config.channels,
            samples_per_unit: config.frame_size,
            sample_format: sample_format_name(config.sample_format).unwrap_or("none"),
            sample_rate: config.sample_rate,
            time_base: config.time_base,
            bit_rate: config.bit_rate,
            start_time: config.start_time,
            frames: 0,
        }
    }
}

fn rational(r: Rational) -> String {
    format!("{}/{}", r.numerator(), r.denominator())
}

impl fmt::Display for VideoInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[STREAM]")?;
        writeln!(f, "index={}", self.index)?;
        writeln!(f, "codec_type=video")?;
        writeln!(f, "codec_name={}", self.codec_name)?;
        writeln!(f, "width={}", self.width)?;
        writeln!(f, "height={}", self.height)?;
        writeln!(f, "pix_fmt={}", self.pixel_format)?;
        writeln!(f, "avg_frame_rate={}", rational(self.frame_rate))?;
        writeln!(f, "time_base={}", rational(self.time_base))?;
        writeln!(f, "bit_rate={}", self.bit_rate)?;
        writeln!(f, "gop_size={}", self.gop_size)?;
        writeln!(f, "start_time={:.6}", self.start_time)?;
        writeln!(f, "nb_frames={}", self.frames)?;
        writeln!(f, "[/STREAM]")
    }
}

impl fmt::Display for AudioInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[STREAM]")?;
        writeln!(f, "index={}", self.index)?;
        writeln!(f, "codec_type=audio")?;
        writeln!(f, "codec_name={}", self.codec_name)?;
        writeln!(f, "sample_fmt={}", self.sample_format)?;
        writeln!(f, "sample_rate={}", self.sample_rate)?;
        writeln!(f, "channels={}", self.channels)?;
        writeln!(f, "frame_size={}", self.samples_per_unit)?;
        writeln!(f, "time_base={}", rational(self.time_base))?;
        writeln!(f, "bit_rate={}", self.bit_rate)?;
        writeln!(f, "start_time={:.6}", self.start_time)?;
        writeln!(f, "nb_frames={}", self.frames)?;
        writeln!(f, "[/STREAM]")
    }
}

impl fmt::Display for MediaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[FORMAT]")?;
        writeln!(f, "format_name={}", self.format_name)?;
        match self.duration {
            Some(d) => writeln!(f, "duration={:.6}", d)?,
            None => writeln!(f, "duration=N/A")?,
        }
        writeln!(f, "bit_rate={}", self.bit_rate)?;
        writeln!(f, "nb_streams={}", self.nb_streams)?;
        for (key, value) in &self.tags {
            writeln!(f, "TAG:{}={}", key, value)?;
        }
        writeln!(f, "[/FORMAT]")?;
        if let Some(video) = &self.video {
            write!(f, "{}", video)?;
        }
        if let Some(audio) = &self.audio {
            write!(f, "{}", audio)?;
        }
        Ok(())
    }
}

/// Opens `path` for reading and describes it without decoding anything.
pub fn probe<P: AsRef<Path>>(path: P) -> Result<MediaInfo> {
    let mut reader = MediaReader::new();
    reader.open(path)?;
    let info = reader.info();
    reader.close();
    info
}
