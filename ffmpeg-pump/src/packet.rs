use bytes::Bytes;
use ffmpeg_next::{Packet, Rational, ffi, format};

use crate::pump::{EngineResult, PacketSink, PacketSource};

impl PacketSource for format::context::Input {
    type Packet = Packet;

    fn read(&mut self, packet: &mut Packet) -> EngineResult<Option<usize>> {
        // the slot is reused: drop the previous payload before the demuxer refills it
        unsafe { ffi::av_packet_unref(packet.as_mut_ptr()) };
        match packet.read(self) {
            Ok(()) => Ok(Some(packet.stream())),
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Output container paired with the codec time base of each of its streams.
pub struct ContainerSink {
    output: format::context::Output,
    codec_time_bases: Vec<Rational>,
}

impl ContainerSink {
    pub fn new(output: format::context::Output) -> Self {
        Self {
            output,
            codec_time_bases: Vec::new(),
        }
    }

    /// Records the codec time base packets of stream `index` are stamped in.
    pub fn register_stream(&mut self, index: usize, codec_time_base: Rational) {
        if self.codec_time_bases.len() <= index {
            self.codec_time_bases.resize(index + 1, Rational::new(0, 1));
        }
        self.codec_time_bases[index] = codec_time_base;
    }

    pub fn output(&self) -> &format::context::Output {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut format::context::Output {
        &mut self.output
    }
}

impl PacketSink for ContainerSink {
    type Packet = Packet;

    fn write_header(&mut self) -> EngineResult<()> {
        self.output.write_header()
    }

    fn write(&mut self, stream: usize, packet: &mut Packet) -> EngineResult<()> {
        let codec_tb = self
            .codec_time_bases
            .get(stream)
            .copied()
            .ok_or(ffmpeg_next::Error::StreamNotFound)?;
        // muxers may change the stream time base while writing the header
        let stream_tb = self
            .output
            .stream(stream)
            .ok_or(ffmpeg_next::Error::StreamNotFound)?
            .time_base();
        packet.set_stream(stream);
        packet.set_position(-1);
        packet.rescale_ts(codec_tb, stream_tb);
        packet.write_interleaved(&mut self.output)
    }

    fn write_trailer(&mut self) -> EngineResult<()> {
        self.output.write_trailer()
    }
}

/// Copies the payload of `packet`; empty when the packet carries no data.
pub fn packet_bytes(packet: &Packet) -> Bytes {
    packet.data().map(Bytes::copy_from_slice).unwrap_or_default()
}
