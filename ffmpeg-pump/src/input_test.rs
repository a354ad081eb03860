use super::*;
use crate::encoder::{AudioSettings, VideoSettings};
use crate::test_support::{decode_all, write_video, write_video_audio};

fn lossless(width: u32, height: u32) -> VideoSettings {
    VideoSettings::new(width, height, 25.0)
        .codec("ffv1")
        .pixel_format("yuv420p")
}

#[test]
fn ten_frames_then_end_of_stream() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ten.mkv");
    write_video(&path, &lossless(64, 48), 10)?;

    let mut reader = MediaReader::new();
    reader.open(&path)?;
    assert!(reader.audio()?.is_none());
    let start = reader.video()?.map(|v| v.start_time).unwrap_or(-1.0);

    let mut pts = Vec::new();
    let mut calls = 0;
    loop {
        calls += 1;
        match reader.advance(false, false)? {
            Decoded::Unit(unit) => {
                assert_eq!(unit.kind(), MediaKind::Video);
                pts.push(unit.pts());
            }
            Decoded::NoUnitYet => panic!("call {calls} produced no unit"),
            Decoded::EndOfStream => break,
        }
        assert!(calls < 100, "reader never ended");
    }

    // one unit per call, then the end on call 11
    assert_eq!(calls, 11);
    assert_eq!(pts.len(), 10);
    assert!((pts[0] - start).abs() < 1e-3);
    assert!(pts.windows(2).all(|w| w[1] > w[0]));
    assert_eq!(reader.decoded_video_frames()?, 10);

    // the end is sticky
    assert!(matches!(reader.advance(false, false)?, Decoded::EndOfStream));
    reader.close();
    Ok(())
}

#[test]
fn lossless_pixels_come_back_unchanged() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("exact.mkv");
    write_video(&path, &lossless(32, 32), 4)?;

    let units = decode_all(&path)?;
    assert_eq!(units.len(), 4);
    for (i, unit) in units.iter().enumerate() {
        let Unit::Video(video) = unit else {
            anyhow::bail!("unexpected audio unit");
        };
        assert_eq!((video.width, video.height), (32, 32));
        assert_eq!(video.pixel_format, "yuv420p");
        assert_eq!(video.payload.len(), 32 * 32 * 3 / 2);
        assert!(video.payload.iter().all(|&b| b == (i * 16) as u8));
    }
    Ok(())
}

#[test]
fn shared_payload_borrows_and_owned_payload_copies() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("share.mkv");
    write_video(&path, &lossless(16, 16), 2)?;

    let mut reader = MediaReader::new();
    reader.open(&path)?;
    let mut seen = Vec::new();
    loop {
        let share = seen.is_empty();
        match reader.advance(share, share)? {
            Decoded::Unit(unit) => seen.push(unit.payload().is_shared()),
            Decoded::NoUnitYet => {}
            Decoded::EndOfStream => break,
        }
    }
    assert_eq!(seen, vec![true, false]);
    Ok(())
}

#[test]
fn audio_units_match_the_decoder_count() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("av.mkv");
    let audio = AudioSettings::new(2, 44100)
        .codec("pcm_s16le")
        .sample_format("s16");
    write_video_audio(&path, &lossless(32, 32), &audio, 5, 1024)?;

    let mut reader = MediaReader::new();
    reader.open(&path)?;
    let info = reader.audio()?.cloned();
    assert_eq!(info.as_ref().map(|a| a.channels), Some(2));
    assert_eq!(info.as_ref().map(|a| a.sample_rate), Some(44100));

    let (mut video, mut audio_units, mut samples) = (0, 0u64, 0);
    loop {
        match reader.advance(true, true)? {
            Decoded::Unit(Unit::Video(_)) => video += 1,
            Decoded::Unit(Unit::Audio(a)) => {
                assert_eq!(a.sample_format, "s16");
                assert_eq!(a.payload.len(), a.samples * 2 * 2);
                audio_units += 1;
                samples += a.samples;
            }
            Decoded::NoUnitYet => {}
            Decoded::EndOfStream => break,
        }
    }
    assert_eq!(video, 5);
    assert_eq!(audio_units, reader.decoded_audio_frames()?);
    assert_eq!(samples, 5 * 1024);
    Ok(())
}

#[test]
fn state_errors_before_open_and_after_close() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("state.mkv");
    write_video(&path, &lossless(16, 16), 1)?;

    let mut reader = MediaReader::new();
    assert!(matches!(
        reader.advance(false, false),
        Err(MediaError::InvalidState(_))
    ));
    assert!(matches!(reader.video(), Err(MediaError::InvalidState(_))));

    reader.open(&path)?;
    assert!(matches!(reader.open(&path), Err(MediaError::InvalidState(_))));

    reader.close();
    reader.close();
    assert!(!reader.is_open());
    assert!(matches!(
        reader.advance(false, false),
        Err(MediaError::InvalidState(_))
    ));
    assert!(matches!(reader.open(&path), Err(MediaError::InvalidState(_))));
    Ok(())
}

#[test]
fn missing_file_fails_to_open() -> anyhow::Result<()> {
    crate::init()?;
    let dir = tempfile::tempdir()?;
    let mut reader = MediaReader::new();
    let err = reader.open(dir.path().join("absent.mkv")).unwrap_err();
    assert!(matches!(err, MediaError::EngineOpen { .. }));
    assert!(!reader.is_open());
    Ok(())
}

#[test]
fn container_description_is_available() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("info.mkv");
    write_video(&path, &lossless(48, 32), 25)?;

    let mut reader = MediaReader::new();
    reader.open(&path)?;
    let duration = reader.duration()?.unwrap_or(0.0);
    assert!((duration - 1.0).abs() < 0.1, "duration {duration}");

    let info = reader.info()?;
    assert_eq!(info.nb_streams, 1);
    assert!(info.format_name.contains("matroska"));
    let video = info.video.as_ref().map(|v| (v.width, v.height, v.codec_name.as_str()));
    assert_eq!(video, Some((48, 32, "ffv1")));
    assert!(info.to_string().contains("[STREAM]"));
    Ok(())
}

#[test]
fn unit_without_format_becomes_no_unit_yet() {
    assert!(matches!(
        unit_or_skip(None, MediaKind::Video, 3),
        Decoded::NoUnitYet
    ));
    assert!(matches!(
        unit_or_skip(None, MediaKind::Audio, 1),
        Decoded::NoUnitYet
    ));
}

#[test]
fn unit_with_format_is_surfaced() -> anyhow::Result<()> {
    let mut buffer = GrowableBuffer::new();
    let mut frame = frame::Video::new(ffmpeg_next::format::Pixel::GRAY8, 4, 2);
    frame.set_pts(Some(5));
    let unit = VideoUnit::from_frame(&frame, Rational::new(1, 25), &mut buffer, false)?;
    match unit_or_skip(unit.map(Unit::Video), MediaKind::Video, 1) {
        Decoded::Unit(Unit::Video(v)) => {
            assert_eq!((v.width, v.height), (4, 2));
            assert!((v.pts - 0.2).abs() < 1e-9);
        }
        other => panic!("expected a video unit, got {other:?}"),
    }
    Ok(())
}
