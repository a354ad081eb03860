use ffmpeg_next::{Packet, codec, decoder, format::Pixel, format::stream::Stream, frame};

use crate::error::{MediaError, MediaKind, Result};
use crate::pump::{CodecSession, EngineResult, Outcome};

impl CodecSession for decoder::Video {
    type Input = Packet;
    type Output = frame::Video;

    fn send(&mut self, input: Option<&Packet>) -> EngineResult<Outcome> {
        match input {
            Some(packet) => Outcome::from_result(self.send_packet(packet)),
            None => Outcome::from_result(self.send_eof()),
        }
    }

    fn receive(&mut self, output: &mut frame::Video) -> EngineResult<Outcome> {
        Outcome::from_result(self.receive_frame(output))
    }
}

impl CodecSession for decoder::Audio {
    type Input = Packet;
    type Output = frame::Audio;

    fn send(&mut self, input: Option<&Packet>) -> EngineResult<Outcome> {
        match input {
            Some(packet) => Outcome::from_result(self.send_packet(packet)),
            None => Outcome::from_result(self.send_eof()),
        }
    }

    fn receive(&mut self, output: &mut frame::Audio) -> EngineResult<Outcome> {
        Outcome::from_result(self.receive_frame(output))
    }
}

/// Codec context for `stream`, with timestamps kept in the stream's time base.
fn context_for(stream: &Stream, kind: MediaKind) -> Result<codec::Context> {
    let mut ctx = codec::Context::from_parameters(stream.parameters()).map_err(|e| {
        MediaError::engine_open(format!("{} decoder for stream {}", kind, stream.index()), e)
    })?;
    unsafe {
        let ptr = ctx.as_mut_ptr();
        (*ptr).time_base = stream.time_base().into();
        (*ptr).pkt_timebase = stream.time_base().into();
    }
    Ok(ctx)
}

pub fn open_video(stream: &Stream) -> Result<decoder::Video> {
    let ctx = context_for(stream, MediaKind::Video)?;
    let decoder = ctx.decoder().video().map_err(|e| {
        MediaError::engine_open(format!("video decoder for stream {}", stream.index()), e)
    })?;
    if decoder.format() == Pixel::None || decoder.width() == 0 || decoder.height() == 0 {
        return Err(MediaError::UnsupportedFormat(format!(
            "video stream {} is missing codec parameters",
            stream.index()
        )));
    }
    log::info!(
        "opened video decoder {:?} for stream {}: {}x{} {:?}",
        decoder.id(),
        stream.index(),
        decoder.width(),
        decoder.height(),
        decoder.format()
    );
    Ok(decoder)
}

pub fn open_audio(stream: &Stream) -> Result<decoder::Audio> {
    let ctx = context_for(stream, MediaKind::Audio)?;
    let decoder = ctx.decoder().audio().map_err(|e| {
        MediaError::engine_open(format!("audio decoder for stream {}", stream.index()), e)
    })?;
    log::info!(
        "opened audio decoder {:?} for stream {}: {} Hz {:?}",
        decoder.id(),
        stream.index(),
        decoder.rate(),
        decoder.format()
    );
    Ok(decoder)
}
