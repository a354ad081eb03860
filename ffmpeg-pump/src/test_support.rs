//! Synthetic media for the FFmpeg-backed tests.

use std::path::Path;

use crate::encoder::{AudioSettings, VideoSettings};
use crate::format::{pixel_format, sample_format};
use crate::frame::{AudioUnit, Payload, Unit, VideoUnit, image_size, samples_size};
use crate::input::{Decoded, MediaReader};
use crate::output::MediaWriter;
use crate::pump::EncodeStep;

/// A solid image: every byte of every plane set to `shade`.
pub fn solid_pixels(format: &str, width: u32, height: u32, shade: u8) -> anyhow::Result<Vec<u8>> {
    Ok(vec![shade; image_size(pixel_format(format)?, width, height)?])
}

pub fn video_unit<'a>(format: &'static str, width: u32, height: u32, data: &'a [u8]) -> VideoUnit<'a> {
    VideoUnit {
        pts: 0.0,
        width,
        height,
        pixel_format: format,
        payload: Payload::Shared(data),
        key_frame: false,
    }
}

/// Interleaved s16 ramp, `samples` per channel.
pub fn s16_block(channels: u16, samples: usize, start: usize) -> Vec<u8> {
    (0..samples * channels as usize)
        .flat_map(|i| (((start + i) % 2000) as i16 - 1000).to_le_bytes())
        .collect()
}

pub fn audio_unit<'a>(format: &'static str, channels: u16, samples: usize, data: &'a [u8]) -> AudioUnit<'a> {
    AudioUnit {
        pts: 0.0,
        channels,
        samples,
        sample_format: format,
        payload: Payload::Shared(data),
    }
}

pub fn encode_video(writer: &mut MediaWriter, unit: &VideoUnit<'_>) -> anyhow::Result<usize> {
    loop {
        match writer.encode_video(unit)? {
            EncodeStep::Encoded { packets } => return Ok(packets),
            EncodeStep::Retry => continue,
            EncodeStep::EndOfStream => anyhow::bail!("video encoder already ended"),
        }
    }
}

pub fn encode_audio(writer: &mut MediaWriter, unit: &AudioUnit<'_>) -> anyhow::Result<usize> {
    loop {
        match writer.encode_audio(unit)? {
            EncodeStep::Encoded { packets } => return Ok(packets),
            EncodeStep::Retry => continue,
            EncodeStep::EndOfStream => anyhow::bail!("audio encoder already ended"),
        }
    }
}

/// Writes `frames` solid frames (shade = 16 × index) and flushes. Returns the pixel format used.
pub fn write_video(path: &Path, settings: &VideoSettings, frames: usize) -> anyhow::Result<&'static str> {
    crate::init()?;
    let mut writer = MediaWriter::new();
    writer.open(path)?;
    anyhow::ensure!(writer.add_video_stream(settings)?, "no video codec");
    let format = writer.video()?.map(|v| v.pixel_format).unwrap_or("none");
    for i in 0..frames {
        let data = solid_pixels(format, settings.width, settings.height, (i * 16) as u8)?;
        encode_video(&mut writer, &video_unit(format, settings.width, settings.height, &data))?;
    }
    writer.flush()?;
    writer.close();
    Ok(format)
}

/// Writes `frames` video frames interleaved with one s16 audio block each.
pub fn write_video_audio(
    path: &Path,
    video: &VideoSettings,
    audio: &AudioSettings,
    frames: usize,
    samples: usize,
) -> anyhow::Result<()> {
    crate::init()?;
    let mut writer = MediaWriter::new();
    writer.open(path)?;
    anyhow::ensure!(writer.add_video_stream(video)?, "no video codec");
    anyhow::ensure!(writer.add_audio_stream(audio)?, "no audio codec");
    let format = writer.video()?.map(|v| v.pixel_format).unwrap_or("none");
    let block_size = samples_size(sample_format("s16")?, audio.channels, samples)?;
    for i in 0..frames {
        let pixels = solid_pixels(format, video.width, video.height, (i * 16) as u8)?;
        encode_video(&mut writer, &video_unit(format, video.width, video.height, &pixels))?;
        let block = s16_block(audio.channels, samples, i * samples);
        assert_eq!(block.len(), block_size);
        encode_audio(&mut writer, &audio_unit("s16", audio.channels, samples, &block))?;
    }
    writer.flush()?;
    writer.close();
    Ok(())
}

/// Decodes every unit of `path` with copied payloads.
pub fn decode_all(path: &Path) -> anyhow::Result<Vec<Unit<'static>>> {
    let mut reader = MediaReader::new();
    reader.open(path)?;
    let mut units = Vec::new();
    loop {
        match reader.advance(false, false)? {
            Decoded::Unit(unit) => units.push(unit.into_owned()),
            Decoded::NoUnitYet => continue,
            Decoded::EndOfStream => break,
        }
    }
    reader.close();
    Ok(units)
}
