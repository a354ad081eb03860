use std::path::Path;

use ffmpeg_next::{Packet, Rational, decoder, format, frame, media};

use crate::buffer::GrowableBuffer;
use crate::decoder::{open_audio, open_video};
use crate::error::{MediaError, MediaKind, Result};
use crate::frame::{AudioUnit, Unit, VideoUnit};
use crate::metadata::{AudioInfo, MediaInfo, VideoInfo};
use crate::pump::{DecodeCore, DecodeLane, DecodeStep};

const NOT_OPEN: MediaError = MediaError::InvalidState("reader not opened or already closed");

/// Result of one decode step.
#[derive(Debug)]
pub enum Decoded<'a> {
    Unit(Unit<'a>),
    /// Nothing observable happened yet; call `advance` again.
    NoUnitYet,
    EndOfStream,
}

type Core = DecodeCore<format::context::Input, decoder::Video, decoder::Audio>;

struct Opened {
    core: Core,
    video_time_base: Rational,
    audio_time_base: Rational,
    video_buffer: GrowableBuffer,
    audio_buffer: GrowableBuffer,
    video_info: Option<VideoInfo>,
    audio_info: Option<AudioInfo>,
}

/// A frame without a valid format is logged and reported as no unit.
fn unit_or_skip(unit: Option<Unit<'_>>, kind: MediaKind, produced: u64) -> Decoded<'_> {
    match unit {
        Some(unit) => Decoded::Unit(unit),
        None => {
            log::warn!("dropping {} unit {}: invalid format", kind, produced);
            Decoded::NoUnitYet
        }
    }
}

/// Decode pump over a container: best video and best audio stream, one packet slot.
#[derive(Default)]
pub struct MediaReader {
    opened: Option<Opened>,
    closed: bool,
}

impl MediaReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        if self.opened.is_some() || self.closed {
            return Err(MediaError::InvalidState("reader already opened"));
        }
        let path = path.as_ref();
        let input = format::input(&path)
            .map_err(|e| MediaError::engine_open(format!("input {}", path.display()), e))?;

        let mut video_time_base = Rational::new(0, 1);
        let mut video_info = None;
        let video = match input.streams().best(media::Type::Video) {
            Some(stream) => {
                let decoder = open_video(&stream)?;
                video_time_base = stream.time_base();
                video_info = Some(VideoInfo::from_decoder(&stream, &decoder));
                Some(DecodeLane::new(
                    MediaKind::Video,
                    stream.index(),
                    decoder,
                    frame::Video::empty(),
                ))
            }
            None => None,
        };

        let mut audio_time_base = Rational::new(0, 1);
        let mut audio_info = None;
        let audio = match input.streams().best(media::Type::Audio) {
            Some(stream) => {
                let decoder = open_audio(&stream)?;
                audio_time_base = stream.time_base();
                audio_info = Some(AudioInfo::from_decoder(&stream, &decoder));
                Some(DecodeLane::new(
                    MediaKind::Audio,
                    stream.index(),
                    decoder,
                    frame::Audio::empty(),
                ))
            }
            None => None,
        };

        log::info!(
            "opened {} for reading ({}): video {}, audio {}",
            path.display(),
            input.format().name(),
            video_info.as_ref().map_or("none".to_string(), |v| v.index.to_string()),
            audio_info.as_ref().map_or("none".to_string(), |a| a.index.to_string()),
        );

        self.opened = Some(Opened {
            core: DecodeCore::new(input, Packet::empty(), video, audio),
            video_time_base,
            audio_time_base,
            video_buffer: GrowableBuffer::new(),
            audio_buffer: GrowableBuffer::new(),
            video_info,
            audio_info,
        });
        Ok(())
    }

    fn opened(&self) -> Result<&Opened> {
        self.opened.as_ref().ok_or(NOT_OPEN)
    }

    /// Advances the decode pump by one step.
    ///
    /// `share_video`/`share_audio` pick, per kind, whether the unit's payload
    /// borrows the reader's scratch buffer or is copied out.
    pub fn advance(&mut self, share_video: bool, share_audio: bool) -> Result<Decoded<'_>> {
        let opened = self.opened.as_mut().ok_or(NOT_OPEN)?;
        let kind = match opened.core.advance()? {
            DecodeStep::Unit(kind) => kind,
            DecodeStep::Pending => return Ok(Decoded::NoUnitYet),
            DecodeStep::End => return Ok(Decoded::EndOfStream),
        };

        let (unit, produced) = match kind {
            MediaKind::Video => {
                let lane = opened.core.video().ok_or(NOT_OPEN)?;
                let unit = VideoUnit::from_frame(
                    lane.frame(),
                    opened.video_time_base,
                    &mut opened.video_buffer,
                    share_video,
                )?;
                (unit.map(Unit::Video), lane.pump().produced())
            }
            MediaKind::Audio => {
                let lane = opened.core.audio().ok_or(NOT_OPEN)?;
                let unit = AudioUnit::from_frame(
                    lane.frame(),
                    opened.audio_time_base,
                    &mut opened.audio_buffer,
                    share_audio,
                )?;
                (unit.map(Unit::Audio), lane.pump().produced())
            }
        };

        Ok(unit_or_skip(unit, kind, produced))
    }

    pub fn is_open(&self) -> bool {
        self.opened.is_some()
    }

    pub fn video(&self) -> Result<Option<&VideoInfo>> {
        Ok(self.opened()?.video_info.as_ref())
    }

    pub fn audio(&self) -> Result<Option<&AudioInfo>> {
        Ok(self.opened()?.audio_info.as_ref())
    }

    /// Container tag value for `key`.
    pub fn metadata(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .opened()?
            .core
            .source()
            .metadata()
            .get(key)
            .map(str::to_owned))
    }

    /// Container duration in seconds, if known.
    pub fn duration(&self) -> Result<Option<f64>> {
        let duration = self.opened()?.core.source().duration();
        if duration == ffmpeg_next::ffi::AV_NOPTS_VALUE || duration < 0 {
            return Ok(None);
        }
        Ok(Some(duration as f64 / f64::from(ffmpeg_next::ffi::AV_TIME_BASE)))
    }

    pub fn bit_rate(&self) -> Result<i64> {
        Ok(self.opened()?.core.source().bit_rate())
    }

    pub fn info(&self) -> Result<MediaInfo> {
        let opened = self.opened()?;
        let input = opened.core.source();
        Ok(MediaInfo {
            format_name: input.format().name().to_string(),
            duration: self.duration()?,
            bit_rate: input.bit_rate(),
            nb_streams: input.nb_streams(),
            tags: input
                .metadata()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            video: opened.video_info.clone(),
            audio: opened.audio_info.clone(),
        })
    }

    /// Frames the video decoder produced so far, dropped ones included.
    pub fn decoded_video_frames(&self) -> Result<u64> {
        Ok(self
            .opened()?
            .core
            .video()
            .map_or(0, |lane| lane.pump().produced()))
    }

    pub fn decoded_audio_frames(&self) -> Result<u64> {
        Ok(self
            .opened()?
            .core
            .audio()
            .map_or(0, |lane| lane.pump().produced()))
    }

    /// Releases the container and codec sessions. Closing twice is harmless.
    pub fn close(&mut self) {
        if let Some(opened) = self.opened.take() {
            log::debug!(
                "closing reader after {} video and {} audio units",
                opened.core.video().map_or(0, |l| l.pump().produced()),
                opened.core.audio().map_or(0, |l| l.pump().produced())
            );
        }
        self.closed = true;
    }
}

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;
