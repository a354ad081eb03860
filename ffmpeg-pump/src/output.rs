use std::path::Path;

use ffmpeg_next::{Codec, Packet, codec, encoder, format, frame};

use crate::encoder::{AudioConfig, AudioSettings, VideoConfig, VideoSettings, open_audio, open_video};
use crate::error::{MediaError, MediaKind, Result};
use crate::format::{find_encoder, pixel_format_name, sample_format_name};
use crate::frame::{
    AudioUnit, VideoUnit, alloc_audio_frame, copy_buffer_to_pixels, copy_buffer_to_samples,
};
use crate::metadata::{AudioInfo, VideoInfo};
use crate::packet::ContainerSink;
use crate::pump::{EncodeCore, EncodeLane, EncodeStep, PtsClock};

const NOT_OPEN: MediaError = MediaError::InvalidState("writer not opened or already closed");

type Core = EncodeCore<ContainerSink, encoder::Video, encoder::Audio>;

struct VideoSlot {
    config: VideoConfig,
    info: VideoInfo,
    frame: frame::Video,
}

struct AudioSlot {
    config: AudioConfig,
    info: AudioInfo,
    /// Reallocated whenever the unit length changes.
    frame: Option<frame::Audio>,
}

struct Opened {
    path: String,
    core: Core,
    video: Option<VideoSlot>,
    audio: Option<AudioSlot>,
}

/// Encode pump into a container: up to one video and one audio stream.
///
/// The header is written with the first packet (or by `flush`), so streams
/// and metadata must be set up before the first unit is encoded.
#[derive(Default)]
pub struct MediaWriter {
    opened: Option<Opened>,
    closed: bool,
}

/// Encoder the container format uses for `kind` when none is named.
fn default_codec(output: &format::context::Output, kind: MediaKind) -> Result<Option<Codec>> {
    let id = unsafe {
        let format = output.format().as_ptr();
        match kind {
            MediaKind::Video => codec::Id::from((*format).video_codec),
            MediaKind::Audio => codec::Id::from((*format).audio_codec),
        }
    };
    if id == codec::Id::None {
        return Ok(None);
    }
    encoder::find(id).map(Some).ok_or_else(|| {
        MediaError::UnsupportedFormat(format!("no {} encoder for {:?}", kind, id))
    })
}

fn mismatch(kind: MediaKind, expected: String, actual: String) -> MediaError {
    MediaError::FormatMismatch {
        kind,
        expected,
        actual,
    }
}

impl MediaWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the output file; the container format follows the file name.
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        if self.opened.is_some() || self.closed {
            return Err(MediaError::InvalidState("writer already opened"));
        }
        let path = path.as_ref();
        let output = format::output(&path)
            .map_err(|e| MediaError::engine_open(format!("output {}", path.display()), e))?;
        log::info!(
            "opened {} for writing ({})",
            path.display(),
            output.format().name()
        );
        self.opened = Some(Opened {
            path: path.display().to_string(),
            core: EncodeCore::new(ContainerSink::new(output), Packet::empty()),
            video: None,
            audio: None,
        });
        Ok(())
    }

    fn opened(&self) -> Result<&Opened> {
        self.opened.as_ref().ok_or(NOT_OPEN)
    }

    /// Opened writer that has not written its header yet.
    fn configurable(&mut self) -> Result<&mut Opened> {
        let opened = self.opened.as_mut().ok_or(NOT_OPEN)?;
        if opened.core.header_written() {
            return Err(MediaError::InvalidState(
                "container header already written",
            ));
        }
        Ok(opened)
    }

    /// Sets a container tag. Only possible before the first packet.
    pub fn put_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        let output = self.configurable()?.core.sink_mut().output_mut();
        let mut tags = output.metadata().to_owned();
        tags.set(key, value);
        output.set_metadata(tags);
        Ok(())
    }

    /// Adds the video stream. Returns `false` when no codec was named and the
    /// container has no default video codec.
    pub fn add_video_stream(&mut self, settings: &VideoSettings) -> Result<bool> {
        let opened = self.configurable()?;
        if opened.video.is_some() {
            return Err(MediaError::InvalidState("video stream already added"));
        }
        let output = opened.core.sink().output();
        let codec = match settings.codec.as_deref() {
            Some(name) => find_encoder(name, MediaKind::Video)?,
            None => match default_codec(output, MediaKind::Video)? {
                Some(codec) => codec,
                None => return Ok(false),
            },
        };
        let global_header = output
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER);
        let (encoder, config) = open_video(codec, settings, global_header)?;

        let sink = opened.core.sink_mut();
        let index = {
            let mut stream = sink
                .output_mut()
                .add_stream(codec)
                .map_err(|e| MediaError::engine_open("video stream", e))?;
            stream.set_parameters(&encoder);
            stream.set_time_base(config.time_base);
            stream.index()
        };
        sink.register_stream(index, config.time_base);

        let clock = PtsClock::new(config.time_base, config.time_base, config.pts_offset);
        opened
            .core
            .set_video(EncodeLane::new(MediaKind::Video, index, encoder, clock));
        opened.video = Some(VideoSlot {
            info: VideoInfo::from_config(index, &config),
            frame: frame::Video::new(config.pixel_format, config.width, config.height),
            config,
        });
        Ok(true)
    }

    /// Adds the audio stream. Returns `false` when no codec was named and the
    /// container has no default audio codec.
    pub fn add_audio_stream(&mut self, settings: &AudioSettings) -> Result<bool> {
        let opened = self.configurable()?;
        if opened.audio.is_some() {
            return Err(MediaError::InvalidState("audio stream already added"));
        }
        let output = opened.core.sink().output();
        let codec = match settings.codec.as_deref() {
            Some(name) => find_encoder(name, MediaKind::Audio)?,
            None => match default_codec(output, MediaKind::Audio)? {
                Some(codec) => codec,
                None => return Ok(false),
            },
        };
        let global_header = output
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER);
        let (encoder, config) = open_audio(codec, settings, global_header, None)?;

        let sink = opened.core.sink_mut();
        let index = {
            let mut stream = sink
                .output_mut()
                .add_stream(codec)
                .map_err(|e| MediaError::engine_open("audio stream", e))?;
            stream.set_parameters(&encoder);
            stream.set_time_base(config.time_base);
            stream.index()
        };
        sink.register_stream(index, config.time_base);

        // one clock tick per sample, rescaled into the codec time base
        let sample_base = ffmpeg_next::Rational::new(1, config.sample_rate as i32);
        let clock = PtsClock::new(sample_base, config.time_base, config.pts_offset);
        opened
            .core
            .set_audio(EncodeLane::new(MediaKind::Audio, index, encoder, clock));
        opened.audio = Some(AudioSlot {
            info: AudioInfo::from_config(index, &config),
            frame: None,
            config,
        });
        Ok(true)
    }

    /// Encodes one frame; its geometry and pixel format must match the stream exactly.
    pub fn encode_video(&mut self, unit: &VideoUnit<'_>) -> Result<EncodeStep> {
        let opened = self.opened.as_mut().ok_or(NOT_OPEN)?;
        let slot = opened
            .video
            .as_mut()
            .ok_or(MediaError::InvalidState("no video stream"))?;
        let config = &slot.config;
        let expected_format = pixel_format_name(config.pixel_format).unwrap_or("none");
        if unit.width != config.width
            || unit.height != config.height
            || unit.pixel_format != expected_format
        {
            return Err(mismatch(
                MediaKind::Video,
                format!("{}x{} {}", config.width, config.height, expected_format),
                format!("{}x{} {}", unit.width, unit.height, unit.pixel_format),
            ));
        }
        copy_buffer_to_pixels(&unit.payload, &mut slot.frame)?;
        opened.core.advance_video(&mut slot.frame, 1)
    }

    /// Encodes one block of samples; channel count and sample format must match
    /// the stream, and so must the length when the encoder has a fixed frame size.
    pub fn encode_audio(&mut self, unit: &AudioUnit<'_>) -> Result<EncodeStep> {
        let opened = self.opened.as_mut().ok_or(NOT_OPEN)?;
        let slot = opened
            .audio
            .as_mut()
            .ok_or(MediaError::InvalidState("no audio stream"))?;
        let config = &slot.config;
        let expected_format = sample_format_name(config.sample_format).unwrap_or("none");
        let fixed = config.frame_size != 0;
        if unit.channels != config.channels
            || unit.sample_format != expected_format
            || (fixed && unit.samples != config.frame_size)
            || unit.samples == 0
        {
            let expected_samples = if fixed {
                config.frame_size.to_string()
            } else {
                "any".to_string()
            };
            return Err(mismatch(
                MediaKind::Audio,
                format!(
                    "{} channels {} x {} samples",
                    config.channels, expected_format, expected_samples
                ),
                format!(
                    "{} channels {} x {} samples",
                    unit.channels, unit.sample_format, unit.samples
                ),
            ));
        }

        let frame = match slot.frame.take() {
            Some(frame) if frame.samples() == unit.samples => frame,
            _ => alloc_audio_frame(
                config.sample_format,
                config.channels,
                config.sample_rate,
                unit.samples,
            )?,
        };
        let frame = slot.frame.insert(frame);
        copy_buffer_to_samples(&unit.payload, frame)?;
        opened.core.advance_audio(frame, unit.samples as i64)
    }

    /// Drains every encoder and writes the trailer. Calling it again does nothing.
    pub fn flush(&mut self) -> Result<()> {
        let opened = self.opened.as_mut().ok_or(NOT_OPEN)?;
        opened.core.flush()
    }

    pub fn is_open(&self) -> bool {
        self.opened.is_some()
    }

    pub fn is_flushed(&self) -> Result<bool> {
        Ok(self.opened()?.core.is_flushed())
    }

    pub fn video(&self) -> Result<Option<&VideoInfo>> {
        Ok(self.opened()?.video.as_ref().map(|slot| &slot.info))
    }

    pub fn audio(&self) -> Result<Option<&AudioInfo>> {
        Ok(self.opened()?.audio.as_ref().map(|slot| &slot.info))
    }

    /// Video frames the encoder accepted.
    pub fn encoded_video_frames(&self) -> Result<u64> {
        Ok(self
            .opened()?
            .core
            .video()
            .map_or(0, |lane| lane.pump().consumed()))
    }

    pub fn encoded_audio_frames(&self) -> Result<u64> {
        Ok(self
            .opened()?
            .core
            .audio()
            .map_or(0, |lane| lane.pump().consumed()))
    }

    pub fn packets_written(&self) -> Result<u64> {
        Ok(self.opened()?.core.packets_written())
    }

    /// Releases the container without flushing. Closing twice is harmless.
    pub fn close(&mut self) {
        if let Some(opened) = self.opened.take() {
            let has_streams = opened.video.is_some() || opened.audio.is_some();
            if has_streams && !opened.core.is_flushed() {
                log::warn!(
                    "closing {} without flush, pending packets and the trailer are lost",
                    opened.path
                );
            }
        }
        self.closed = true;
    }
}

#[cfg(test)]
#[path = "output_test.rs"]
mod output_test;
