//! One-shot conversion and single-frame encoding.

use bytes::Bytes;
use ffmpeg_next::{Packet, Rational, frame, software::scaling};

use crate::buffer::GrowableBuffer;
use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::encoder::{AudioSettings, VideoSettings, open_audio, open_video};
use crate::error::{MediaError, MediaKind, Phase, Result, Stage};
use crate::format::{find_encoder, pixel_format, pixel_format_name, sample_format, sample_format_name};
use crate::frame::{
    AudioUnit, Payload, VideoUnit, alloc_audio_frame, copy_buffer_to_pixels, copy_buffer_to_samples,
    samples_size,
};
use crate::packet::packet_bytes;
use crate::pump::{CodecSession, Pull, StreamPump, Timestamped};
use crate::resampler::{ResampleKey, Resampler, SampleShape};
use crate::scaler::{PictureShape, ScaleKey, Scaler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConverterConfig {
    pub scaler_capacity: usize,
    pub resampler_capacity: usize,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            scaler_capacity: DEFAULT_CACHE_CAPACITY,
            resampler_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl PictureShape {
    /// Shape with the pixel format given by its engine name.
    pub fn named(format: &str, width: u32, height: u32) -> Result<Self> {
        Ok(Self::new(pixel_format(format)?, width, height))
    }
}

impl SampleShape {
    pub fn named(format: &str, channels: u16, rate: u32) -> Result<Self> {
        Ok(Self::new(sample_format(format)?, channels, rate))
    }
}

/// Owns the conversion caches and the scratch buffers converted data lands in.
///
/// One converter is meant to serve a whole pipeline; contexts it builds live
/// until `dispose_all` (or drop).
pub struct Converter {
    scaler: Scaler,
    resampler: Resampler,
    video_buffer: GrowableBuffer,
    audio_buffer: GrowableBuffer,
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(ConverterConfig::default())
    }
}

impl Converter {
    pub fn new(config: ConverterConfig) -> Self {
        Self {
            scaler: Scaler::new(config.scaler_capacity),
            resampler: Resampler::new(config.resampler_capacity),
            video_buffer: GrowableBuffer::new(),
            audio_buffer: GrowableBuffer::new(),
        }
    }

    /// Scales and converts a packed image. The result is valid until the next conversion.
    pub fn convert_pixels(
        &mut self,
        src: PictureShape,
        pixels: &[u8],
        dst: PictureShape,
    ) -> Result<&[u8]> {
        let key = ScaleKey {
            src,
            dst,
            flags: scaling::Flags::BILINEAR,
        };
        let out = self.video_buffer.ensure(dst.size()?);
        let written = self.scaler.scale(key, pixels, out)?;
        Ok(&out[..written])
    }

    /// Converts packed samples between formats and channel counts at an unchanged rate.
    pub fn convert_samples(
        &mut self,
        src: SampleShape,
        src_samples: usize,
        samples: &[u8],
        dst: SampleShape,
        dst_samples: usize,
    ) -> Result<&[u8]> {
        let key = ResampleKey { src, dst };
        let out = self
            .audio_buffer
            .ensure(samples_size(dst.format, dst.channels, dst_samples)?);
        let converted = self
            .resampler
            .resample(key, samples, src_samples, out, dst_samples)?;
        let size = samples_size(dst.format, dst.channels, converted)?;
        Ok(&out[..size])
    }

    /// Encodes one image with a fresh `codec` session and returns the first packet.
    pub fn encode_pixels(&self, shape: PictureShape, pixels: &[u8], codec: &str) -> Result<Bytes> {
        let format_name = pixel_format_name(shape.format).unwrap_or("none");
        let codec = find_encoder(codec, MediaKind::Video)?;
        let settings = VideoSettings::new(shape.width, shape.height, 1.0).pixel_format(format_name);
        let (encoder, _) = open_video(codec, &settings, false)?;

        let mut frame = frame::Video::new(shape.format, shape.width, shape.height);
        copy_buffer_to_pixels(pixels, &mut frame)?;
        encode_one(StreamPump::new(MediaKind::Video, 0, encoder), frame)
    }

    /// Encodes one block of samples with a fresh `codec` session and returns the first packet.
    pub fn encode_samples(
        &self,
        shape: SampleShape,
        samples: usize,
        data: &[u8],
        codec: &str,
    ) -> Result<Bytes> {
        let format_name = sample_format_name(shape.format).unwrap_or("none");
        let codec = find_encoder(codec, MediaKind::Audio)?;
        let settings = AudioSettings::new(shape.channels, shape.rate).sample_format(format_name);
        let (encoder, config) = open_audio(codec, &settings, false, Some(Rational::new(1, 1)))?;
        if config.frame_size != 0 && config.frame_size != samples {
            return Err(MediaError::FormatMismatch {
                kind: MediaKind::Audio,
                expected: format!("{} samples", config.frame_size),
                actual: format!("{} samples", samples),
            });
        }

        let mut frame = alloc_audio_frame(shape.format, shape.channels, shape.rate, samples)?;
        copy_buffer_to_samples(data, &mut frame)?;
        encode_one(StreamPump::new(MediaKind::Audio, 0, encoder), frame)
    }

    pub fn scaler_contexts(&self) -> usize {
        self.scaler.len()
    }

    pub fn resampler_contexts(&self) -> usize {
        self.resampler.len()
    }

    /// Frees every cached context and both scratch buffers.
    pub fn dispose_all(&mut self) {
        self.scaler.dispose_all();
        self.resampler.dispose_all();
        self.video_buffer.release();
        self.audio_buffer.release();
    }
}

impl VideoUnit<'_> {
    /// Copy of this unit scaled to `width`x`height` in `pixel_format`. Timing is kept.
    pub fn converted(
        &self,
        converter: &mut Converter,
        width: u32,
        height: u32,
        pixel_format: &str,
    ) -> Result<VideoUnit<'static>> {
        let src = PictureShape::named(self.pixel_format, self.width, self.height)?;
        let dst = PictureShape::named(pixel_format, width, height)?;
        let pixel_format = pixel_format_name(dst.format)
            .ok_or_else(|| MediaError::UnsupportedFormat(pixel_format.to_string()))?;
        let pixels = converter.convert_pixels(src, &self.payload, dst)?;
        Ok(VideoUnit {
            pts: self.pts,
            width,
            height,
            pixel_format,
            payload: Payload::Owned(Bytes::copy_from_slice(pixels)),
            key_frame: self.key_frame,
        })
    }
}

impl AudioUnit<'_> {
    /// Copy of this unit with `channels` channels of `samples` samples in
    /// `sample_format`. `sample_rate` is the unit's rate and is kept.
    ///
    /// The result holds the samples the converter actually produced, which can
    /// be fewer than `samples`.
    pub fn converted(
        &self,
        converter: &mut Converter,
        sample_rate: u32,
        channels: u16,
        samples: usize,
        sample_format: &str,
    ) -> Result<AudioUnit<'static>> {
        let src = SampleShape::named(self.sample_format, self.channels, sample_rate)?;
        let dst = SampleShape::named(sample_format, channels, sample_rate)?;
        let sample_format = sample_format_name(dst.format)
            .ok_or_else(|| MediaError::UnsupportedFormat(sample_format.to_string()))?;
        let data = converter.convert_samples(src, self.samples, &self.payload, dst, samples)?;
        Ok(AudioUnit {
            pts: self.pts,
            channels,
            samples: data.len() / samples_size(dst.format, channels, 1)?.max(1),
            sample_format,
            payload: Payload::Owned(Bytes::copy_from_slice(data)),
        })
    }
}

/// Thins `units` from `src_rate` down to `dst_rate` frames per second.
///
/// Time is cut into `1 / dst_rate` slots counted from the first unit's
/// timestamp; the first unit of each slot is kept. Raising the rate is not supported.
pub fn resample_video_units<'a>(
    units: Vec<VideoUnit<'a>>,
    src_rate: f64,
    dst_rate: f64,
) -> Result<Vec<VideoUnit<'a>>> {
    if units.is_empty() || src_rate == dst_rate {
        return Ok(units);
    }
    if src_rate < dst_rate {
        return Err(MediaError::UnsupportedFormat(format!(
            "frame rate increase from {} to {} fps",
            src_rate, dst_rate
        )));
    }

    let first = units[0].pts;
    let mut last_slot = None;
    Ok(units
        .into_iter()
        .filter(|unit| {
            let slot = ((unit.pts - first) * dst_rate) as i64;
            if last_slot == Some(slot) {
                return false;
            }
            last_slot = Some(slot);
            true
        })
        .collect())
}

/// Bytes per pixel of the packed 24-bit layouts `blit_pixels` moves (`rgb24`, `bgr24`).
const BLIT_PIXEL_BYTES: usize = 3;

/// Pixel rectangle: top-left corner and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// Copies `rect` of a packed 24-bit image into `dst` with its top-left corner at `pos`.
///
/// Strides count pixels per row.
pub fn blit_pixels(
    src: &[u8],
    src_stride: usize,
    rect: PixelRect,
    dst: &mut [u8],
    dst_stride: usize,
    pos: (usize, usize),
) -> Result<()> {
    if rect.width == 0 || rect.height == 0 {
        return Ok(());
    }
    let row = rect.width * BLIT_PIXEL_BYTES;
    let offset = |x: usize, y: usize, stride: usize| (y * stride + x) * BLIT_PIXEL_BYTES;

    let src_end = offset(rect.x, rect.y + rect.height - 1, src_stride) + row;
    if src.len() < src_end {
        return Err(MediaError::BufferTooSmall {
            need: src_end,
            have: src.len(),
        });
    }
    let dst_end = offset(pos.0, pos.1 + rect.height - 1, dst_stride) + row;
    if dst.len() < dst_end {
        return Err(MediaError::BufferTooSmall {
            need: dst_end,
            have: dst.len(),
        });
    }

    for y in 0..rect.height {
        let from = offset(rect.x, rect.y + y, src_stride);
        let to = offset(pos.0, pos.1 + y, dst_stride);
        dst[to..to + row].copy_from_slice(&src[from..from + row]);
    }
    Ok(())
}

fn encode_one<S>(mut pump: StreamPump<S>, mut input: S::Input) -> Result<Bytes>
where
    S: CodecSession<Output = Packet>,
    S::Input: Timestamped,
{
    input.stamp(0);
    pump.feed(Some(&input))?;
    pump.feed(None)?;
    let mut packet = Packet::empty();
    match pump.pull(&mut packet)? {
        Pull::Unit => Ok(packet_bytes(&packet)),
        // input is closed, so the encoder has nothing more to give
        Pull::Again | Pull::Exhausted => Err(MediaError::stage(
            Stage::stream(pump.kind(), Phase::Receive),
            ffmpeg_next::Error::Eof,
        )),
    }
}

#[cfg(test)]
#[path = "convert_test.rs"]
mod convert_test;
