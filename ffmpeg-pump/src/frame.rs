use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::ptr;

use bytes::Bytes;
use ffmpeg_next::{
    Rational, ffi,
    format::{Pixel, Sample},
    frame,
};

use crate::buffer::GrowableBuffer;
use crate::error::{MediaError, MediaKind, Result};
use crate::format::{pixel_format_name, sample_format_name};
use crate::pump::Timestamped;

/// Bytes of a decoded unit.
///
/// `Shared` borrows the reader's scratch buffer and is only reachable until
/// the next `advance`; `Owned` is an independent copy.
#[derive(Debug, Clone)]
pub enum Payload<'a> {
    Shared(&'a [u8]),
    Owned(Bytes),
}

impl<'a> Payload<'a> {
    fn new(data: &'a [u8], share: bool) -> Self {
        if share {
            Payload::Shared(data)
        } else {
            Payload::Owned(Bytes::copy_from_slice(data))
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, Payload::Shared(_))
    }

    pub fn into_owned(self) -> Bytes {
        match self {
            Payload::Shared(data) => Bytes::copy_from_slice(data),
            Payload::Owned(data) => data,
        }
    }
}

impl Deref for Payload<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Payload::Shared(data) => data,
            Payload::Owned(data) => data,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VideoUnit<'a> {
    /// Presentation time in seconds.
    pub pts: f64,
    pub width: u32,
    pub height: u32,
    pub pixel_format: &'static str,
    pub payload: Payload<'a>,
    pub key_frame: bool,
}

#[derive(Debug, Clone)]
pub struct AudioUnit<'a> {
    pub pts: f64,
    pub channels: u16,
    /// Samples per channel.
    pub samples: usize,
    pub sample_format: &'static str,
    pub payload: Payload<'a>,
}

#[derive(Debug, Clone)]
pub enum Unit<'a> {
    Video(VideoUnit<'a>),
    Audio(AudioUnit<'a>),
}

impl<'a> Unit<'a> {
    pub fn kind(&self) -> MediaKind {
        match self {
            Unit::Video(_) => MediaKind::Video,
            Unit::Audio(_) => MediaKind::Audio,
        }
    }

    /// "V" or "A".
    pub fn tag(&self) -> &'static str {
        match self {
            Unit::Video(_) => "V",
            Unit::Audio(_) => "A",
        }
    }

    pub fn pts(&self) -> f64 {
        match self {
            Unit::Video(v) => v.pts,
            Unit::Audio(a) => a.pts,
        }
    }

    pub fn payload(&self) -> &Payload<'a> {
        match self {
            Unit::Video(v) => &v.payload,
            Unit::Audio(a) => &a.payload,
        }
    }

    /// Detaches the unit from the reader, copying a shared payload.
    pub fn into_owned(self) -> Unit<'static> {
        match self {
            Unit::Video(v) => Unit::Video(VideoUnit {
                pts: v.pts,
                width: v.width,
                height: v.height,
                pixel_format: v.pixel_format,
                payload: Payload::Owned(v.payload.into_owned()),
                key_frame: v.key_frame,
            }),
            Unit::Audio(a) => Unit::Audio(AudioUnit {
                pts: a.pts,
                channels: a.channels,
                samples: a.samples,
                sample_format: a.sample_format,
                payload: Payload::Owned(a.payload.into_owned()),
            }),
        }
    }
}

impl Display for Unit<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Unit::Video(v) => write!(
                f,
                "V pts: {:.3}, {}x{}, format: {}, bytes: {}, key: {}",
                v.pts,
                v.width,
                v.height,
                v.pixel_format,
                v.payload.len(),
                v.key_frame
            ),
            Unit::Audio(a) => write!(
                f,
                "A pts: {:.3}, channels: {}, samples: {}, format: {}, bytes: {}",
                a.pts,
                a.channels,
                a.samples,
                a.sample_format,
                a.payload.len()
            ),
        }
    }
}

fn seconds(frame: &frame::Frame, time_base: Rational) -> f64 {
    match frame.timestamp().or(frame.pts()) {
        Some(ts) => ts as f64 * f64::from(time_base),
        None => f64::NAN,
    }
}

impl<'a> VideoUnit<'a> {
    /// Copies a decoded frame into `buffer`. Returns `None` for a frame without a valid format.
    pub fn from_frame(
        frame: &frame::Video,
        time_base: Rational,
        buffer: &'a mut GrowableBuffer,
        share: bool,
    ) -> Result<Option<Self>> {
        let Some(pixel_format) = pixel_format_name(frame.format()) else {
            return Ok(None);
        };
        let size = image_size(frame.format(), frame.width(), frame.height())?;
        let dst = buffer.ensure(size);
        copy_pixels_to_buffer(frame, dst)?;
        Ok(Some(Self {
            pts: seconds(frame, time_base),
            width: frame.width(),
            height: frame.height(),
            pixel_format,
            payload: Payload::new(dst, share),
            key_frame: frame.is_key(),
        }))
    }
}

impl<'a> AudioUnit<'a> {
    pub fn from_frame(
        frame: &frame::Audio,
        time_base: Rational,
        buffer: &'a mut GrowableBuffer,
        share: bool,
    ) -> Result<Option<Self>> {
        let Some(sample_format) = sample_format_name(frame.format()) else {
            return Ok(None);
        };
        let channels = audio_channels(frame);
        let size = samples_size(frame.format(), channels, frame.samples())?;
        let dst = buffer.ensure(size);
        copy_samples_to_buffer(frame, dst)?;
        Ok(Some(Self {
            pts: seconds(frame, time_base),
            channels,
            samples: frame.samples(),
            sample_format,
            payload: Payload::new(dst, share),
        }))
    }
}

impl Timestamped for frame::Video {
    fn stamp(&mut self, pts: i64) {
        self.set_pts(Some(pts));
    }
}

impl Timestamped for frame::Audio {
    fn stamp(&mut self, pts: i64) {
        self.set_pts(Some(pts));
    }
}

/// Bytes of a tightly packed (align 1) image.
pub fn image_size(format: Pixel, width: u32, height: u32) -> Result<usize> {
    let size =
        unsafe { ffi::av_image_get_buffer_size(format.into(), width as i32, height as i32, 1) };
    if size < 0 {
        return Err(MediaError::UnsupportedFormat(format!(
            "{:?} image of {}x{}",
            format, width, height
        )));
    }
    Ok(size as usize)
}

/// Bytes of tightly packed (align 1) samples.
pub fn samples_size(format: Sample, channels: u16, samples: usize) -> Result<usize> {
    let size = unsafe {
        ffi::av_samples_get_buffer_size(
            ptr::null_mut(),
            channels as i32,
            samples as i32,
            format.into(),
            1,
        )
    };
    if size < 0 {
        return Err(MediaError::UnsupportedFormat(format!(
            "{:?} samples for {} channels",
            format, channels
        )));
    }
    Ok(size as usize)
}

pub fn audio_channels(frame: &frame::Audio) -> u16 {
    unsafe { (*frame.as_ptr()).ch_layout.nb_channels.max(0) as u16 }
}

/// Packs every plane of `frame` into `dst`, returning the bytes written.
pub fn copy_pixels_to_buffer(frame: &frame::Video, dst: &mut [u8]) -> Result<usize> {
    let size = image_size(frame.format(), frame.width(), frame.height())?;
    if dst.len() < size {
        return Err(MediaError::BufferTooSmall {
            need: size,
            have: dst.len(),
        });
    }
    let written = unsafe {
        let ptr = frame.as_ptr();
        ffi::av_image_copy_to_buffer(
            dst.as_mut_ptr(),
            size as i32,
            (*ptr).data.as_ptr() as _,
            (*ptr).linesize.as_ptr() as _,
            frame.format().into(),
            frame.width() as i32,
            frame.height() as i32,
            1,
        )
    };
    if written < 0 {
        return Err(MediaError::UnsupportedFormat(format!(
            "cannot pack {:?} pixels",
            frame.format()
        )));
    }
    Ok(written as usize)
}

/// Fills the planes of `frame` from a packed image in `src`; the frame's geometry and format describe `src`.
pub fn copy_buffer_to_pixels(src: &[u8], frame: &mut frame::Video) -> Result<()> {
    let (format, width, height) = (frame.format(), frame.width(), frame.height());
    let size = image_size(format, width, height)?;
    if src.len() < size {
        return Err(MediaError::BufferTooSmall {
            need: size,
            have: src.len(),
        });
    }
    unsafe {
        let mut src_data = [ptr::null_mut::<u8>(); 4];
        let mut src_linesize = [0i32; 4];
        let filled = ffi::av_image_fill_arrays(
            src_data.as_mut_ptr(),
            src_linesize.as_mut_ptr(),
            src.as_ptr(),
            format.into(),
            width as i32,
            height as i32,
            1,
        );
        if filled < 0 {
            return Err(MediaError::UnsupportedFormat(format!(
                "cannot unpack {:?} pixels",
                format
            )));
        }
        let ptr = frame.as_mut_ptr();
        let ret = ffi::av_frame_make_writable(ptr);
        if ret < 0 {
            return Err(MediaError::engine_open("writable frame", ffmpeg_next::Error::from(ret)));
        }
        ffi::av_image_copy(
            (*ptr).data.as_mut_ptr() as _,
            (*ptr).linesize.as_ptr() as _,
            src_data.as_ptr() as _,
            src_linesize.as_ptr() as _,
            format.into(),
            width as i32,
            height as i32,
        );
    }
    Ok(())
}

fn plane_pointers(format: Sample, channels: u16) -> Vec<*mut u8> {
    let planes = if format.is_planar() { channels as usize } else { 1 };
    vec![ptr::null_mut(); planes.max(1)]
}

/// Packs the samples of `frame` into `dst`, returning the bytes written.
pub fn copy_samples_to_buffer(frame: &frame::Audio, dst: &mut [u8]) -> Result<usize> {
    let (format, channels, samples) = (frame.format(), audio_channels(frame), frame.samples());
    let size = samples_size(format, channels, samples)?;
    if dst.len() < size {
        return Err(MediaError::BufferTooSmall {
            need: size,
            have: dst.len(),
        });
    }
    let mut dst_data = plane_pointers(format, channels);
    unsafe {
        let mut linesize = 0;
        let filled = ffi::av_samples_fill_arrays(
            dst_data.as_mut_ptr(),
            &mut linesize,
            dst.as_ptr(),
            channels as i32,
            samples as i32,
            format.into(),
            1,
        );
        if filled < 0 {
            return Err(MediaError::UnsupportedFormat(format!(
                "cannot pack {:?} samples",
                format
            )));
        }
        ffi::av_samples_copy(
            dst_data.as_mut_ptr() as _,
            (*frame.as_ptr()).extended_data as _,
            0,
            0,
            samples as i32,
            channels as i32,
            format.into(),
        );
    }
    Ok(size)
}

/// Fills `frame` from packed samples in `src`; the frame's layout, format and length describe `src`.
pub fn copy_buffer_to_samples(src: &[u8], frame: &mut frame::Audio) -> Result<()> {
    let (format, channels, samples) = (frame.format(), audio_channels(frame), frame.samples());
    let size = samples_size(format, channels, samples)?;
    if src.len() < size {
        return Err(MediaError::BufferTooSmall {
            need: size,
            have: src.len(),
        });
    }
    let mut src_data = plane_pointers(format, channels);
    unsafe {
        let mut linesize = 0;
        let filled = ffi::av_samples_fill_arrays(
            src_data.as_mut_ptr(),
            &mut linesize,
            src.as_ptr(),
            channels as i32,
            samples as i32,
            format.into(),
            1,
        );
        if filled < 0 {
            return Err(MediaError::UnsupportedFormat(format!(
                "cannot unpack {:?} samples",
                format
            )));
        }
        let ptr = frame.as_mut_ptr();
        let ret = ffi::av_frame_make_writable(ptr);
        if ret < 0 {
            return Err(MediaError::engine_open("writable frame", ffmpeg_next::Error::from(ret)));
        }
        ffi::av_samples_copy(
            (*ptr).extended_data as _,
            src_data.as_ptr() as _,
            0,
            0,
            samples as i32,
            channels as i32,
            format.into(),
        );
    }
    Ok(())
}

/// Allocates an audio frame with the default layout for `channels`.
pub fn alloc_audio_frame(
    format: Sample,
    channels: u16,
    rate: u32,
    samples: usize,
) -> Result<frame::Audio> {
    let mut frame = frame::Audio::empty();
    unsafe {
        let ptr = frame.as_mut_ptr();
        (*ptr).format = ffi::AVSampleFormat::from(format) as i32;
        (*ptr).nb_samples = samples as i32;
        (*ptr).sample_rate = rate as i32;
        ffi::av_channel_layout_default(&mut (*ptr).ch_layout, channels as i32);
        let ret = ffi::av_frame_get_buffer(ptr, 0);
        if ret < 0 {
            return Err(MediaError::engine_open(
                "audio frame",
                ffmpeg_next::Error::from(ret),
            ));
        }
    }
    Ok(frame)
}
