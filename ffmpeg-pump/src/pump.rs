//! Engine-independent send/receive machinery shared by the reader and writer.
//!
//! Every codec call reports one of three outcomes. `StreamPump` turns those
//! outcomes into per-stream state transitions, `DecodeCore` drives one video
//! and one audio decoder over a single packet slot, and `EncodeCore` drives
//! the encoders into one interleaving packet sink.

use ffmpeg_next::{Rational, Rescale};

use crate::error::{MediaError, MediaKind, Phase, Result, Stage};

pub type EngineResult<T> = std::result::Result<T, ffmpeg_next::Error>;

/// Result of one engine send or receive call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    /// Try later: nothing was consumed or produced.
    Again,
    End,
}

impl Outcome {
    /// Splits an engine result into the three expected outcomes; anything else stays an error.
    pub fn from_result(result: EngineResult<()>) -> EngineResult<Self> {
        match result {
            Ok(()) => Ok(Outcome::Ok),
            Err(ffmpeg_next::Error::Eof) => Ok(Outcome::End),
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                Ok(Outcome::Again)
            }
            Err(err) => Err(err),
        }
    }
}

/// A two-phase codec: inputs go in through `send`, outputs come out of `receive`.
pub trait CodecSession {
    type Input;
    type Output;

    /// Sends one input, or signals end of input with `None`.
    fn send(&mut self, input: Option<&Self::Input>) -> EngineResult<Outcome>;

    fn receive(&mut self, output: &mut Self::Output) -> EngineResult<Outcome>;
}

/// Demuxer side of the decode pump.
pub trait PacketSource {
    type Packet;

    /// Reads the next packet into `packet` and returns its stream index, or `None` at end of input.
    fn read(&mut self, packet: &mut Self::Packet) -> EngineResult<Option<usize>>;
}

/// Muxer side of the encode pump.
pub trait PacketSink {
    type Packet;

    fn write_header(&mut self) -> EngineResult<()>;

    /// Writes one encoded packet of `stream`, rescaling its timestamps as the container requires.
    fn write(&mut self, stream: usize, packet: &mut Self::Packet) -> EngineResult<()>;

    fn write_trailer(&mut self) -> EngineResult<()>;
}

/// Raw units the encode pump stamps with a presentation timestamp.
pub trait Timestamped {
    fn stamp(&mut self, pts: i64);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    AwaitingInput,
    InputSent,
    OutputReady,
    Draining,
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Feed {
    Accepted,
    /// The codec must be drained before it takes this input; the caller keeps it.
    Busy,
    /// The codec already reached end of input.
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pull {
    Unit,
    Again,
    Exhausted,
}

/// One elementary stream's codec session and its progress.
pub struct StreamPump<S> {
    kind: MediaKind,
    index: usize,
    session: S,
    state: StreamState,
    input_closed: bool,
    consumed: u64,
    produced: u64,
}

impl<S: CodecSession> StreamPump<S> {
    pub fn new(kind: MediaKind, index: usize, session: S) -> Self {
        Self {
            kind,
            index,
            session,
            state: StreamState::AwaitingInput,
            input_closed: false,
            consumed: 0,
            produced: 0,
        }
    }

    pub fn feed(&mut self, input: Option<&S::Input>) -> Result<Feed> {
        let closing = input.is_none();
        let outcome = self
            .session
            .send(input)
            .map_err(|e| MediaError::stage(Stage::stream(self.kind, Phase::Send), e))?;
        Ok(match outcome {
            Outcome::Ok if closing => {
                self.input_closed = true;
                self.state = StreamState::Draining;
                Feed::Accepted
            }
            Outcome::Ok => {
                self.consumed += 1;
                self.state = StreamState::InputSent;
                Feed::Accepted
            }
            Outcome::Again => {
                self.state = StreamState::InputSent;
                Feed::Busy
            }
            Outcome::End => {
                self.input_closed = true;
                self.state = StreamState::Draining;
                Feed::Closed
            }
        })
    }

    pub fn pull(&mut self, output: &mut S::Output) -> Result<Pull> {
        let outcome = self
            .session
            .receive(output)
            .map_err(|e| MediaError::stage(Stage::stream(self.kind, Phase::Receive), e))?;
        Ok(match outcome {
            Outcome::Ok => {
                self.produced += 1;
                self.state = StreamState::OutputReady;
                Pull::Unit
            }
            Outcome::Again => {
                self.state = if self.input_closed {
                    StreamState::Draining
                } else {
                    StreamState::AwaitingInput
                };
                Pull::Again
            }
            Outcome::End => {
                self.state = StreamState::Done;
                Pull::Exhausted
            }
        })
    }

    /// Marks the stream finished without consulting the codec.
    pub fn finish(&mut self) {
        self.input_closed = true;
        self.state = StreamState::Done;
    }

    /// True when a `pull` may yield output without new input.
    pub fn wants_pull(&self) -> bool {
        matches!(
            self.state,
            StreamState::InputSent | StreamState::OutputReady | StreamState::Draining
        )
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn input_closed(&self) -> bool {
        self.input_closed
    }

    pub fn is_done(&self) -> bool {
        self.state == StreamState::Done
    }

    /// Inputs the codec accepted, end-of-input excluded.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Outputs received from the codec.
    pub fn produced(&self) -> u64 {
        self.produced
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeStep {
    /// The lane of this kind holds a freshly decoded frame.
    Unit(MediaKind),
    Pending,
    End,
}

/// A decoder and its reusable frame slot.
pub struct DecodeLane<S: CodecSession> {
    pump: StreamPump<S>,
    frame: S::Output,
}

impl<S: CodecSession> DecodeLane<S> {
    pub fn new(kind: MediaKind, index: usize, session: S, frame: S::Output) -> Self {
        Self {
            pump: StreamPump::new(kind, index, session),
            frame,
        }
    }

    pub fn pump(&self) -> &StreamPump<S> {
        &self.pump
    }

    pub fn frame(&self) -> &S::Output {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut S::Output {
        &mut self.frame
    }

    fn pull_unit(&mut self) -> Result<bool> {
        Ok(self.pump.pull(&mut self.frame)? == Pull::Unit)
    }

    fn deliver(&mut self, packet: &S::Input, pending: &mut Option<usize>) -> Result<DecodeStep> {
        if self.pump.state() != StreamState::AwaitingInput {
            log::debug!(
                "{} stream {} no longer takes input, dropping packet",
                self.pump.kind(),
                self.pump.index()
            );
            *pending = None;
            return Ok(DecodeStep::Pending);
        }
        match self.pump.feed(Some(packet))? {
            Feed::Accepted => {
                *pending = None;
                if self.pull_unit()? {
                    Ok(DecodeStep::Unit(self.pump.kind()))
                } else {
                    Ok(DecodeStep::Pending)
                }
            }
            Feed::Busy => Ok(DecodeStep::Pending),
            Feed::Closed => {
                *pending = None;
                Ok(DecodeStep::Pending)
            }
        }
    }

    fn close_input(&mut self) -> Result<()> {
        if self.pump.state() == StreamState::AwaitingInput {
            self.pump.feed(None)?;
        }
        Ok(())
    }
}

/// Read → send → receive over one packet slot for up to one video and one audio stream.
pub struct DecodeCore<R: PacketSource, V: CodecSession, A: CodecSession> {
    source: R,
    packet: R::Packet,
    pending: Option<usize>,
    read_ended: bool,
    video: Option<DecodeLane<V>>,
    audio: Option<DecodeLane<A>>,
}

impl<R, V, A> DecodeCore<R, V, A>
where
    R: PacketSource,
    V: CodecSession<Input = R::Packet>,
    A: CodecSession<Input = R::Packet>,
{
    pub fn new(
        source: R,
        packet: R::Packet,
        video: Option<DecodeLane<V>>,
        audio: Option<DecodeLane<A>>,
    ) -> Self {
        Self {
            source,
            packet,
            pending: None,
            read_ended: false,
            video,
            audio,
        }
    }

    /// Advances decoding by one observable step.
    pub fn advance(&mut self) -> Result<DecodeStep> {
        if let Some(kind) = self.pull_ready()? {
            return Ok(DecodeStep::Unit(kind));
        }

        if self.pending.is_none() && !self.read_ended {
            match self.source.read(&mut self.packet) {
                Ok(Some(index)) => self.pending = Some(index),
                Ok(None) => {
                    log::debug!("end of container input");
                    self.read_ended = true;
                }
                Err(e) => return Err(MediaError::stage(Stage::container(Phase::Read), e)),
            }
        }

        if let Some(index) = self.pending {
            return self.route(index);
        }

        if let Some(lane) = self.video.as_mut() {
            lane.close_input()?;
        }
        if let Some(lane) = self.audio.as_mut() {
            lane.close_input()?;
        }
        if let Some(kind) = self.pull_ready()? {
            return Ok(DecodeStep::Unit(kind));
        }

        if self.is_exhausted() {
            Ok(DecodeStep::End)
        } else {
            Ok(DecodeStep::Pending)
        }
    }

    fn pull_ready(&mut self) -> Result<Option<MediaKind>> {
        if let Some(lane) = self.video.as_mut() {
            if lane.pump.wants_pull() && lane.pull_unit()? {
                return Ok(Some(MediaKind::Video));
            }
        }
        if let Some(lane) = self.audio.as_mut() {
            if lane.pump.wants_pull() && lane.pull_unit()? {
                return Ok(Some(MediaKind::Audio));
            }
        }
        Ok(None)
    }

    fn route(&mut self, index: usize) -> Result<DecodeStep> {
        if let Some(lane) = self.video.as_mut().filter(|l| l.pump.index() == index) {
            return lane.deliver(&self.packet, &mut self.pending);
        }
        if let Some(lane) = self.audio.as_mut().filter(|l| l.pump.index() == index) {
            return lane.deliver(&self.packet, &mut self.pending);
        }
        log::debug!("discarding packet of unselected stream {}", index);
        self.pending = None;
        Ok(DecodeStep::Pending)
    }

    /// Input has ended and every present decoder reported end of stream.
    pub fn is_exhausted(&self) -> bool {
        self.read_ended
            && self.pending.is_none()
            && self.video.as_ref().is_none_or(|l| l.pump.is_done())
            && self.audio.as_ref().is_none_or(|l| l.pump.is_done())
    }

    pub fn video(&self) -> Option<&DecodeLane<V>> {
        self.video.as_ref()
    }

    pub fn audio(&self) -> Option<&DecodeLane<A>> {
        self.audio.as_ref()
    }

    pub fn source(&self) -> &R {
        &self.source
    }
}

/// Presentation timestamps from a running unit count.
///
/// `units` are counted in `unit_base` (one frame for video, one sample for
/// audio) and rescaled into the codec time base before the start offset is added.
#[derive(Clone, Copy, Debug)]
pub struct PtsClock {
    unit_base: Rational,
    codec_base: Rational,
    offset: i64,
    elapsed: i64,
}

impl PtsClock {
    pub fn new(unit_base: Rational, codec_base: Rational, offset: i64) -> Self {
        Self {
            unit_base,
            codec_base,
            offset,
            elapsed: 0,
        }
    }

    pub fn current(&self) -> i64 {
        self.elapsed.rescale(self.unit_base, self.codec_base) + self.offset
    }

    pub fn advance(&mut self, units: i64) {
        self.elapsed += units;
    }

    pub fn elapsed(&self) -> i64 {
        self.elapsed
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncodeStep {
    /// The unit was consumed; `packets` were written to the container in this step.
    Encoded { packets: usize },
    /// The encoder must be drained first; resubmit the same unit.
    Retry,
    EndOfStream,
}

/// An encoder and its timestamp counter.
pub struct EncodeLane<S: CodecSession> {
    pump: StreamPump<S>,
    clock: PtsClock,
}

impl<S: CodecSession> EncodeLane<S> {
    pub fn new(kind: MediaKind, index: usize, session: S, clock: PtsClock) -> Self {
        Self {
            pump: StreamPump::new(kind, index, session),
            clock,
        }
    }

    pub fn pump(&self) -> &StreamPump<S> {
        &self.pump
    }

    pub fn clock(&self) -> &PtsClock {
        &self.clock
    }
}

struct Muxer<K: PacketSink> {
    sink: K,
    packet: K::Packet,
    header_written: bool,
    trailer_written: bool,
    trailer_failed: bool,
    packets: u64,
}

impl<K: PacketSink> Muxer<K> {
    fn ensure_header(&mut self) -> Result<()> {
        if !self.header_written {
            self.sink
                .write_header()
                .map_err(|e| MediaError::stage(Stage::container(Phase::Header), e))?;
            self.header_written = true;
            log::debug!("container header written");
        }
        Ok(())
    }

    fn emit(&mut self, kind: MediaKind, index: usize) -> Result<()> {
        self.ensure_header()?;
        self.sink
            .write(index, &mut self.packet)
            .map_err(|e| MediaError::stage(Stage::stream(kind, Phase::Write), e))?;
        self.packets += 1;
        Ok(())
    }

    fn drain<S>(&mut self, lane: &mut EncodeLane<S>) -> Result<usize>
    where
        S: CodecSession<Output = K::Packet>,
    {
        let mut written = 0;
        while lane.pump.pull(&mut self.packet)? == Pull::Unit {
            self.emit(lane.pump.kind(), lane.pump.index())?;
            written += 1;
        }
        Ok(written)
    }

    fn encode<S>(&mut self, lane: &mut EncodeLane<S>, input: &mut S::Input, units: i64) -> Result<EncodeStep>
    where
        S: CodecSession<Output = K::Packet>,
        S::Input: Timestamped,
    {
        if lane.pump.input_closed() {
            return Ok(EncodeStep::EndOfStream);
        }
        input.stamp(lane.clock.current());
        match lane.pump.feed(Some(&*input))? {
            Feed::Accepted => {
                lane.clock.advance(units);
                let packets = self.drain(lane)?;
                Ok(EncodeStep::Encoded { packets })
            }
            Feed::Busy => {
                self.drain(lane)?;
                Ok(EncodeStep::Retry)
            }
            Feed::Closed => Ok(EncodeStep::EndOfStream),
        }
    }

    /// Best-effort drain after end of input; failures are logged and end the stream.
    fn flush_lane<S>(&mut self, lane: &mut EncodeLane<S>)
    where
        S: CodecSession<Output = K::Packet>,
    {
        let kind = lane.pump.kind();
        while !lane.pump.is_done() {
            if !lane.pump.input_closed() {
                if let Err(e) = lane.pump.feed(None) {
                    log::warn!("flushing {} encoder: {}", kind, e);
                    lane.pump.finish();
                    break;
                }
            }
            match self.drain(lane) {
                Ok(_) if lane.pump.input_closed() && !lane.pump.is_done() => {
                    log::warn!("{} encoder did not reach end of stream while flushing", kind);
                    lane.pump.finish();
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("flushing {} encoder: {}", kind, e);
                    lane.pump.finish();
                }
            }
        }
    }
}

/// Send → receive → interleaved write for up to one video and one audio encoder.
pub struct EncodeCore<K: PacketSink, V: CodecSession, A: CodecSession> {
    mux: Muxer<K>,
    video: Option<EncodeLane<V>>,
    audio: Option<EncodeLane<A>>,
}

impl<K, V, A> EncodeCore<K, V, A>
where
    K: PacketSink,
    V: CodecSession<Output = K::Packet>,
    A: CodecSession<Output = K::Packet>,
    V::Input: Timestamped,
    A::Input: Timestamped,
{
    pub fn new(sink: K, packet: K::Packet) -> Self {
        Self {
            mux: Muxer {
                sink,
                packet,
                header_written: false,
                trailer_written: false,
                trailer_failed: false,
                packets: 0,
            },
            video: None,
            audio: None,
        }
    }

    pub fn set_video(&mut self, lane: EncodeLane<V>) {
        self.video = Some(lane);
    }

    pub fn set_audio(&mut self, lane: EncodeLane<A>) {
        self.audio = Some(lane);
    }

    /// Encodes one video unit covering `units` frame durations.
    pub fn advance_video(&mut self, input: &mut V::Input, units: i64) -> Result<EncodeStep> {
        let lane = self
            .video
            .as_mut()
            .ok_or(MediaError::InvalidState("no video stream"))?;
        self.mux.encode(lane, input, units)
    }

    /// Encodes one audio unit of `units` samples per channel.
    pub fn advance_audio(&mut self, input: &mut A::Input, units: i64) -> Result<EncodeStep> {
        let lane = self
            .audio
            .as_mut()
            .ok_or(MediaError::InvalidState("no audio stream"))?;
        self.mux.encode(lane, input, units)
    }

    /// Drains every encoder, then writes the trailer (and the header, if nothing was written yet).
    ///
    /// A second call after the trailer was written does nothing; a second call
    /// after the trailer write failed reports that failure again.
    pub fn flush(&mut self) -> Result<()> {
        if self.mux.trailer_written {
            return Ok(());
        }
        if self.mux.trailer_failed {
            return Err(MediaError::InvalidState("container trailer write failed"));
        }
        if let Some(lane) = self.video.as_mut() {
            self.mux.flush_lane(lane);
        }
        if let Some(lane) = self.audio.as_mut() {
            self.mux.flush_lane(lane);
        }
        self.mux.ensure_header()?;
        if let Err(e) = self.mux.sink.write_trailer() {
            self.mux.trailer_failed = true;
            return Err(MediaError::stage(Stage::container(Phase::Trailer), e));
        }
        self.mux.trailer_written = true;
        log::debug!("container trailer written after {} packets", self.mux.packets);
        Ok(())
    }

    pub fn header_written(&self) -> bool {
        self.mux.header_written
    }

    pub fn is_flushed(&self) -> bool {
        self.mux.trailer_written
    }

    pub fn packets_written(&self) -> u64 {
        self.mux.packets
    }

    pub fn video(&self) -> Option<&EncodeLane<V>> {
        self.video.as_ref()
    }

    pub fn audio(&self) -> Option<&EncodeLane<A>> {
        self.audio.as_ref()
    }

    pub fn sink(&self) -> &K {
        &self.mux.sink
    }

    pub fn sink_mut(&mut self) -> &mut K {
        &mut self.mux.sink
    }
}

#[cfg(test)]
#[path = "pump_test.rs"]
mod pump_test;
