use super::*;

fn converter() -> anyhow::Result<Converter> {
    crate::init()?;
    Ok(Converter::default())
}

#[test]
fn pixels_survive_a_trip_through_yuv() -> anyhow::Result<()> {
    let mut converter = converter()?;
    let rgb = PictureShape::named("rgb24", 8, 8)?;
    let yuv = PictureShape::named("yuv420p", 8, 8)?;
    let src = [90u8, 160, 40].repeat(64);

    let planar = converter.convert_pixels(rgb, &src, yuv)?.to_vec();
    assert_eq!(planar.len(), 8 * 8 * 3 / 2);
    let back = converter.convert_pixels(yuv, &planar, rgb)?;
    assert_eq!(back.len(), src.len());
    for (got, want) in back.iter().zip(src.iter()) {
        assert!(got.abs_diff(*want) <= 6, "{got} vs {want}");
    }
    assert_eq!(converter.scaler_contexts(), 2);

    // same shapes again: no new context
    converter.convert_pixels(rgb, &src, yuv)?;
    assert_eq!(converter.scaler_contexts(), 2);
    Ok(())
}

#[test]
fn short_pixel_input_is_rejected() -> anyhow::Result<()> {
    let mut converter = converter()?;
    let shape = PictureShape::named("rgb24", 4, 4)?;
    let err = converter
        .convert_pixels(shape, &[0u8; 10], shape)
        .unwrap_err();
    assert!(matches!(err, MediaError::BufferTooSmall { need: 48, have: 10 }));
    Ok(())
}

#[test]
fn scaler_cache_has_a_ceiling() -> anyhow::Result<()> {
    crate::init()?;
    let mut converter = Converter::new(ConverterConfig {
        scaler_capacity: 1,
        resampler_capacity: 1,
    });
    let src = PictureShape::named("rgb24", 4, 4)?;
    let pixels = vec![0u8; 48];
    converter.convert_pixels(src, &pixels, PictureShape::named("gray", 4, 4)?)?;
    let err = converter
        .convert_pixels(src, &pixels, PictureShape::named("yuv420p", 4, 4)?)
        .unwrap_err();
    assert!(matches!(err, MediaError::CacheFull { capacity: 1 }));

    converter.dispose_all();
    assert_eq!(converter.scaler_contexts(), 0);
    converter.convert_pixels(src, &pixels, PictureShape::named("yuv420p", 4, 4)?)?;
    Ok(())
}

#[test]
fn samples_are_deinterleaved() -> anyhow::Result<()> {
    let mut converter = converter()?;
    let packed = SampleShape::named("s16", 2, 44100)?;
    let planar = SampleShape::named("s16p", 2, 44100)?;
    let src: Vec<u8> = (0..32)
        .flat_map(|i| [i as i16, -(i as i16)])
        .flat_map(|s| s.to_le_bytes())
        .collect();

    let out = converter.convert_samples(packed, 32, &src, planar, 32)?;
    assert_eq!(out.len(), src.len());
    let values: Vec<i16> = out
        .chunks(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    let left: Vec<i16> = (0..32).collect();
    let right: Vec<i16> = (0..32).map(|i: i16| -i).collect();
    assert_eq!(&values[..32], left.as_slice());
    assert_eq!(&values[32..], right.as_slice());
    assert_eq!(converter.resampler_contexts(), 1);
    Ok(())
}

#[test]
fn single_image_encodes_to_bmp() -> anyhow::Result<()> {
    let converter = converter()?;
    let shape = PictureShape::named("bgr24", 4, 4)?;
    let pixels = [255u8, 0, 0].repeat(16);

    let encoded = converter.encode_pixels(shape, &pixels, "bmp")?;
    assert!(encoded.starts_with(b"BM"));
    // 54-byte header, rows of 12 bytes
    assert_eq!(encoded.len(), 54 + 4 * 12);
    Ok(())
}

#[test]
fn single_block_encodes_to_pcm() -> anyhow::Result<()> {
    let converter = converter()?;
    let shape = SampleShape::named("s16", 2, 8000)?;
    let data: Vec<u8> = (0..160i16).flat_map(|s| (s * 100).to_le_bytes()).collect();

    let encoded = converter.encode_samples(shape, 80, &data, "pcm_s16le")?;
    assert_eq!(&encoded[..], data.as_slice());
    Ok(())
}

#[test]
fn encoders_reject_what_they_cannot_take() -> anyhow::Result<()> {
    let converter = converter()?;
    let rgb = PictureShape::named("rgb24", 16, 16)?;
    let pixels = vec![0u8; 16 * 16 * 3];
    assert!(matches!(
        converter.encode_pixels(rgb, &pixels, "mpeg4"),
        Err(MediaError::UnsupportedFormat(_))
    ));
    assert!(matches!(
        converter.encode_pixels(rgb, &pixels, "no-such-codec"),
        Err(MediaError::UnsupportedFormat(_))
    ));
    let shape = SampleShape::named("s16", 1, 8000)?;
    assert!(matches!(
        converter.encode_samples(shape, 4, &[0u8; 8], "bmp"),
        Err(MediaError::UnsupportedFormat(_))
    ));
    Ok(())
}

fn gray_unit(pts: f64) -> VideoUnit<'static> {
    VideoUnit {
        pts,
        width: 2,
        height: 2,
        pixel_format: "gray",
        payload: Payload::Owned(Bytes::from_static(&[0, 64, 128, 255])),
        key_frame: false,
    }
}

#[test]
fn video_unit_converts_to_a_new_shape() -> anyhow::Result<()> {
    let mut converter = converter()?;
    let mut unit = gray_unit(1.5);
    unit.key_frame = true;

    let rgb = unit.converted(&mut converter, 4, 4, "rgb24")?;
    assert_eq!((rgb.width, rgb.height), (4, 4));
    assert_eq!(rgb.pixel_format, "rgb24");
    assert_eq!(rgb.payload.len(), 4 * 4 * 3);
    assert!(!rgb.payload.is_shared());
    assert_eq!(rgb.pts, 1.5);
    assert!(rgb.key_frame);

    assert!(matches!(
        unit.converted(&mut converter, 4, 4, "no-such-format"),
        Err(MediaError::UnsupportedFormat(_))
    ));
    Ok(())
}

#[test]
fn audio_unit_converts_to_planar_stereo() -> anyhow::Result<()> {
    let mut converter = converter()?;
    let data: Vec<u8> = (0..16i16).flat_map(|s| (s * 10).to_le_bytes()).collect();
    let unit = AudioUnit {
        pts: 0.25,
        channels: 2,
        samples: 8,
        sample_format: "s16",
        payload: Payload::Shared(&data),
    };

    let planar = unit.converted(&mut converter, 8000, 2, 8, "s16p")?;
    assert_eq!(planar.sample_format, "s16p");
    assert_eq!((planar.channels, planar.samples), (2, 8));
    assert_eq!(planar.pts, 0.25);
    let values: Vec<i16> = planar
        .payload
        .chunks(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    let left: Vec<i16> = (0..8).map(|i| i * 20).collect();
    let right: Vec<i16> = (0..8).map(|i| i * 20 + 10).collect();
    assert_eq!(&values[..8], left.as_slice());
    assert_eq!(&values[8..], right.as_slice());
    Ok(())
}

#[test]
fn video_units_are_thinned_by_timestamp() -> anyhow::Result<()> {
    let units: Vec<_> = (0..10).map(|i| gray_unit(2.0 + i as f64 / 8.0)).collect();

    let kept = resample_video_units(units.clone(), 8.0, 4.0)?;
    let pts: Vec<f64> = kept.iter().map(|u| u.pts).collect();
    assert_eq!(pts.len(), 5);
    for (got, want) in pts.iter().zip([2.0, 2.25, 2.5, 2.75, 3.0]) {
        assert!((got - want).abs() < 1e-9, "{got} vs {want}");
    }

    assert_eq!(resample_video_units(units.clone(), 8.0, 8.0)?.len(), 10);
    assert!(resample_video_units(Vec::new(), 8.0, 4.0)?.is_empty());
    assert!(matches!(
        resample_video_units(units, 8.0, 30.0),
        Err(MediaError::UnsupportedFormat(_))
    ));
    Ok(())
}

#[test]
fn rectangle_is_copied_between_images() -> anyhow::Result<()> {
    // 4x3 source, pixel (x, y) = [x, y, 7]
    let src: Vec<u8> = (0..3u8)
        .flat_map(|y| (0..4u8).flat_map(move |x| [x, y, 7]))
        .collect();
    let mut dst = vec![0u8; 5 * 4 * 3];
    let rect = PixelRect {
        x: 1,
        y: 1,
        width: 2,
        height: 2,
    };

    blit_pixels(&src, 4, rect, &mut dst, 5, (3, 2))?;
    let pixel = |x: usize, y: usize| &dst[(y * 5 + x) * 3..(y * 5 + x) * 3 + 3];
    assert_eq!(pixel(3, 2), &[1, 1, 7]);
    assert_eq!(pixel(4, 2), &[2, 1, 7]);
    assert_eq!(pixel(3, 3), &[1, 2, 7]);
    assert_eq!(pixel(4, 3), &[2, 2, 7]);
    assert_eq!(pixel(2, 2), &[0, 0, 0]);
    assert_eq!(dst.iter().filter(|b| **b == 7).count(), 4);

    let mut small = vec![0u8; 10];
    assert!(matches!(
        blit_pixels(&src, 4, rect, &mut small, 5, (3, 2)),
        Err(MediaError::BufferTooSmall { .. })
    ));
    Ok(())
}
