use std::ptr;

use ffmpeg_next::{ffi, format::Pixel, software::scaling};

use crate::buffer::GrowableBuffer;
use crate::cache::ContextCache;
use crate::error::{MediaError, Result};
use crate::frame::image_size;

/// Format and geometry of a packed image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PictureShape {
    pub format: Pixel,
    pub width: u32,
    pub height: u32,
}

impl PictureShape {
    pub fn new(format: Pixel, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
        }
    }

    /// Packed (align 1) size in bytes.
    pub fn size(&self) -> Result<usize> {
        image_size(self.format, self.width, self.height)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScaleKey {
    pub src: PictureShape,
    pub dst: PictureShape,
    pub flags: scaling::Flags,
}

/// Scaling contexts by conversion shape, plus the guard extent sources are staged in.
pub struct Scaler {
    contexts: ContextCache<ScaleKey, scaling::Context>,
    guard: GrowableBuffer,
}

struct Planes {
    data: [*mut u8; 4],
    linesize: [i32; 4],
}

impl Planes {
    /// Plane pointers into a packed image starting at `base`.
    unsafe fn fill(base: *const u8, shape: &PictureShape) -> Result<Self> {
        let mut planes = Planes {
            data: [ptr::null_mut(); 4],
            linesize: [0; 4],
        };
        let ret = unsafe {
            ffi::av_image_fill_arrays(
                planes.data.as_mut_ptr(),
                planes.linesize.as_mut_ptr(),
                base,
                shape.format.into(),
                shape.width as i32,
                shape.height as i32,
                1,
            )
        };
        if ret < 0 {
            return Err(MediaError::UnsupportedFormat(format!(
                "cannot lay out {:?} {}x{}",
                shape.format, shape.width, shape.height
            )));
        }
        Ok(planes)
    }
}

impl Scaler {
    pub fn new(capacity: usize) -> Self {
        Self {
            contexts: ContextCache::new("scaler", capacity),
            guard: GrowableBuffer::new(),
        }
    }

    /// Converts the packed image in `src` into `dst`, returning the bytes written.
    ///
    /// `src` is first copied into the padded guard extent: some swscale paths
    /// read past the end of the last line.
    pub fn scale(&mut self, key: ScaleKey, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        let src_size = key.src.size()?;
        let dst_size = key.dst.size()?;
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

        let context = self.contexts.get_or_try_insert(key, |k| {
            scaling::Context::get(
                k.src.format,
                k.src.width,
                k.src.height,
                k.dst.format,
                k.dst.width,
                k.dst.height,
                k.flags,
            )
            .map_err(|e| MediaError::engine_open("scaling context", e))
        })?;

        let guarded = self.guard.ensure(src_size);
        guarded.copy_from_slice(&src[..src_size]);

        let ret = unsafe {
            let src_planes = Planes::fill(guarded.as_ptr(), &key.src)?;
            let dst_planes = Planes::fill(dst.as_mut_ptr(), &key.dst)?;
            ffi::sws_scale(
                context.as_mut_ptr(),
                src_planes.data.as_ptr() as _,
                src_planes.linesize.as_ptr(),
                0,
                key.src.height as i32,
                dst_planes.data.as_ptr() as _,
                dst_planes.linesize.as_ptr(),
            )
        };
        if ret < 0 {
            return Err(MediaError::engine_open(
                "scaled image",
                ffmpeg_next::Error::from(ret),
            ));
        }
        Ok(dst_size)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn dispose_all(&mut self) {
        self.contexts.dispose_all();
        self.guard.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(src: PictureShape, dst: PictureShape) -> ScaleKey {
        ScaleKey {
            src,
            dst,
            flags: scaling::Flags::BILINEAR,
        }
    }

    #[test]
    fn solid_color_survives_a_downscale() -> anyhow::Result<()> {
        let mut scaler = Scaler::new(4);
        let src_shape = PictureShape::new(Pixel::RGB24, 16, 8);
        let dst_shape = PictureShape::new(Pixel::RGB24, 8, 4);
        let src: Vec<u8> = [200u8, 100, 50].repeat(16 * 8);
        let mut dst = vec![0u8; dst_shape.size()?];

        let written = scaler.scale(key(src_shape, dst_shape), &src, &mut dst)?;
        assert_eq!(written, 8 * 4 * 3);
        for px in dst.chunks(3) {
            assert!(px[0].abs_diff(200) <= 2 && px[1].abs_diff(100) <= 2 && px[2].abs_diff(50) <= 2);
        }
        Ok(())
    }

    #[test]
    fn repeated_shapes_share_one_context() -> anyhow::Result<()> {
        let mut scaler = Scaler::new(1);
        let shape = PictureShape::new(Pixel::RGB24, 8, 8);
        let small = PictureShape::new(Pixel::RGB24, 4, 4);
        let src = vec![10u8; shape.size()?];
        let mut dst = vec![0u8; small.size()?];

        scaler.scale(key(shape, small), &src, &mut dst)?;
        scaler.scale(key(shape, small), &src, &mut dst)?;
        assert_eq!(scaler.len(), 1);

        let other = PictureShape::new(Pixel::GRAY8, 4, 4);
        let err = scaler.scale(key(shape, other), &src, &mut dst).unwrap_err();
        assert!(matches!(err, MediaError::CacheFull { capacity: 1 }));

        scaler.dispose_all();
        assert!(scaler.is_empty());
        Ok(())
    }

    #[test]
    fn short_destination_is_rejected() {
        let mut scaler = Scaler::new(4);
        let shape = PictureShape::new(Pixel::RGB24, 4, 4);
        let err = scaler
            .scale(key(shape, shape), &[0u8; 48], &mut [0u8; 47])
            .unwrap_err();
        assert!(matches!(err, MediaError::BufferTooSmall { need: 48, have: 47 }));
        assert!(scaler.is_empty());
    }
}
