use std::ptr;

use ffmpeg_next::{ffi, format::Sample};

use crate::cache::ContextCache;
use crate::error::{MediaError, Result};
use crate::frame::samples_size;

/// Format, channel count and rate of packed samples. Channels use the default layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleShape {
    pub format: Sample,
    pub channels: u16,
    pub rate: u32,
}

impl SampleShape {
    pub fn new(format: Sample, channels: u16, rate: u32) -> Self {
        Self {
            format,
            channels,
            rate,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResampleKey {
    pub src: SampleShape,
    pub dst: SampleShape,
}

/// Owned libswresample context.
pub struct SwrContext(*mut ffi::SwrContext);

impl SwrContext {
    fn new(key: &ResampleKey) -> Result<Self> {
        let mut raw = ptr::null_mut();
        let ret = unsafe {
            let mut src_layout: ffi::AVChannelLayout = std::mem::zeroed();
            let mut dst_layout: ffi::AVChannelLayout = std::mem::zeroed();
            ffi::av_channel_layout_default(&mut src_layout, key.src.channels as i32);
            ffi::av_channel_layout_default(&mut dst_layout, key.dst.channels as i32);
            let ret = ffi::swr_alloc_set_opts2(
                &mut raw,
                &dst_layout,
                key.dst.format.into(),
                key.dst.rate as i32,
                &src_layout,
                key.src.format.into(),
                key.src.rate as i32,
                0,
                ptr::null_mut(),
            );
            ffi::av_channel_layout_uninit(&mut src_layout);
            ffi::av_channel_layout_uninit(&mut dst_layout);
            if ret < 0 { ret } else { ffi::swr_init(raw) }
        };
        // wrap before checking so a half-built context is still freed
        let context = SwrContext(raw);
        if ret < 0 {
            return Err(MediaError::engine_open(
                "resampling context",
                ffmpeg_next::Error::from(ret),
            ));
        }
        Ok(context)
    }
}

impl Drop for SwrContext {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { ffi::swr_free(&mut self.0) };
        }
    }
}

fn plane_pointers(base: *const u8, shape: &SampleShape, samples: usize) -> Result<Vec<*mut u8>> {
    let planes = if shape.format.is_planar() {
        shape.channels as usize
    } else {
        1
    };
    let mut data = vec![ptr::null_mut(); planes.max(1)];
    let mut linesize = 0;
    let ret = unsafe {
        ffi::av_samples_fill_arrays(
            data.as_mut_ptr(),
            &mut linesize,
            base,
            shape.channels as i32,
            samples as i32,
            shape.format.into(),
            1,
        )
    };
    if ret < 0 {
        return Err(MediaError::UnsupportedFormat(format!(
            "cannot lay out {:?} x {} channels",
            shape.format, shape.channels
        )));
    }
    Ok(data)
}

/// Resampling contexts by conversion shape.
pub struct Resampler {
    contexts: ContextCache<ResampleKey, SwrContext>,
}

impl Resampler {
    pub fn new(capacity: usize) -> Self {
        Self {
            contexts: ContextCache::new("resampler", capacity),
        }
    }

    /// Converts `src_samples` samples per channel from `src` into `dst`, which
    /// holds room for `dst_samples`. Returns the samples per channel written.
    pub fn resample(
        &mut self,
        key: ResampleKey,
        src: &[u8],
        src_samples: usize,
        dst: &mut [u8],
        dst_samples: usize,
    ) -> Result<usize> {
        let src_size = samples_size(key.src.format, key.src.channels, src_samples)?;
        let dst_size = samples_size(key.dst.format, key.dst.channels, dst_samples)?;
        if src.len() < src_size {
            return Err(MediaError::BufferTooSmall {
                need: src_size,
                have: src.len(),
            });
        }
        if dst.len() < dst_size {
            return Err(MediaError::BufferTooSmall {
                need: dst_size,
                have: dst.len(),
            });
        }

        let context = self.contexts.get_or_try_insert(key, SwrContext::new)?;
        let src_planes = plane_pointers(src.as_ptr(), &key.src, src_samples)?;
        let dst_planes = plane_pointers(dst.as_mut_ptr(), &key.dst, dst_samples)?;
        let converted = unsafe {
            ffi::swr_convert(
                context.0,
                dst_planes.as_ptr() as _,
                dst_samples as i32,
                src_planes.as_ptr() as _,
                src_samples as i32,
            )
        };
        if converted < 0 {
            return Err(MediaError::engine_open(
                "resampled samples",
                ffmpeg_next::Error::from(converted),
            ));
        }
        Ok(converted as usize)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn dispose_all(&mut self) {
        self.contexts.dispose_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffmpeg_next::format::sample::Type;

    const RATE: u32 = 48000;

    #[test]
    fn packed_s16_to_planar_float() -> anyhow::Result<()> {
        let mut resampler = Resampler::new(4);
        let key = ResampleKey {
            src: SampleShape::new(Sample::I16(Type::Packed), 2, RATE),
            dst: SampleShape::new(Sample::F32(Type::Planar), 2, RATE),
        };
        // left at half scale, right silent
        let src: Vec<u8> = (0..64)
            .flat_map(|_| [16384i16, 0i16])
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let mut dst = vec![0u8; 64 * 2 * 4];

        let written = resampler.resample(key, &src, 64, &mut dst, 64)?;
        assert_eq!(written, 64);
        let floats: Vec<f32> = dst
            .chunks(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert!(floats[..64].iter().all(|&v| (v - 0.5).abs() < 1e-3));
        assert!(floats[64..].iter().all(|&v| v.abs() < 1e-3));
        Ok(())
    }

    #[test]
    fn identical_keys_reuse_the_context() -> anyhow::Result<()> {
        let mut resampler = Resampler::new(2);
        let key = ResampleKey {
            src: SampleShape::new(Sample::I16(Type::Packed), 1, RATE),
            dst: SampleShape::new(Sample::I16(Type::Packed), 2, RATE),
        };
        let src = vec![0u8; 32];
        let mut dst = vec![0u8; 64];
        resampler.resample(key, &src, 16, &mut dst, 16)?;
        resampler.resample(key, &src, 16, &mut dst, 16)?;
        assert_eq!(resampler.len(), 1);
        Ok(())
    }
}
