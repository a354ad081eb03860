/// Registers FFmpeg components. Call once at startup before opening any container.
pub fn init() -> Result<(), MediaError> {
    ffmpeg_next::init().map_err(|e| MediaError::engine_open("ffmpeg", e))
}

pub mod buffer;
pub mod cache;
pub mod convert;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod format;
pub mod frame;
pub mod input;
pub mod metadata;
pub mod output;
pub mod packet;
pub mod pump;
pub mod resampler;
pub mod scaler;

#[cfg(test)]
mod test_support;

pub use convert::{Converter, ConverterConfig, PixelRect, blit_pixels, resample_video_units};
pub use encoder::{AudioSettings, VideoSettings};
pub use error::{MediaError, MediaKind, Result};
pub use frame::{AudioUnit, Payload, Unit, VideoUnit};
pub use input::{Decoded, MediaReader};
pub use metadata::{AudioInfo, MediaInfo, VideoInfo, probe};
pub use output::MediaWriter;
pub use pump::EncodeStep;
pub use resampler::SampleShape;
pub use scaler::PictureShape;
