use std::path::Path;

use ffmpeg_pump::{
    Converter, Decoded, EncodeStep, MediaReader, MediaWriter, Payload, PictureShape, Unit,
    VideoSettings, VideoUnit,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::config;

#[derive(Serialize)]
struct UnitLine<'a> {
    kind: &'static str,
    pts: f64,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channels: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    samples: Option<usize>,
    bytes: usize,
    shared: bool,
}

impl<'a> UnitLine<'a> {
    fn new(unit: &'a Unit<'_>) -> Self {
        let payload = unit.payload();
        let mut line = UnitLine {
            kind: unit.tag(),
            pts: unit.pts(),
            format: "",
            width: None,
            height: None,
            channels: None,
            samples: None,
            bytes: payload.len(),
            shared: payload.is_shared(),
        };
        match unit {
            Unit::Video(v) => {
                line.format = v.pixel_format;
                line.width = Some(v.width);
                line.height = Some(v.height);
            }
            Unit::Audio(a) => {
                line.format = a.sample_format;
                line.channels = Some(a.channels);
                line.samples = Some(a.samples);
            }
        }
        line
    }
}

pub fn probe(path: &Path) -> anyhow::Result<()> {
    let info = ffmpeg_pump::probe(path)?;
    print!("{}", info);
    Ok(())
}

pub fn decode(path: &Path, share: bool, json: bool, cancel: &CancellationToken) -> anyhow::Result<()> {
    let mut reader = MediaReader::new();
    reader.open(path)?;
    let result = decode_units(&mut reader, share, json, cancel);
    if result.is_ok() {
        log::info!(
            "decoded {} video and {} audio frames from {}",
            reader.decoded_video_frames()?,
            reader.decoded_audio_frames()?,
            path.display()
        );
    }
    reader.close();
    result
}

fn decode_units(
    reader: &mut MediaReader,
    share: bool,
    json: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    while !cancel.is_cancelled() {
        match reader.advance(share, share)? {
            Decoded::Unit(unit) => {
                let line = UnitLine::new(&unit);
                if json {
                    println!("{}", serde_json::to_string(&line)?);
                } else {
                    println!(
                        "{} pts={:.3} {} {} bytes",
                        line.kind, line.pts, line.format, line.bytes
                    );
                }
            }
            Decoded::NoUnitYet => {}
            Decoded::EndOfStream => return Ok(()),
        }
    }
    log::warn!("decode cancelled");
    Ok(())
}

pub struct SynthOptions {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frames: usize,
    pub codec: Option<String>,
    pub pixel_format: Option<String>,
}

/// Moving RGB gradient; `index` shifts it one pixel per frame.
fn test_pattern(width: u32, height: u32, index: usize) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let r = ((x + index) * 255 / width.max(1) as usize) as u8;
            let g = (y * 255 / height.max(1) as usize) as u8;
            let b = (index * 8 % 256) as u8;
            rgb.extend_from_slice(&[r, g, b]);
        }
    }
    rgb
}

pub fn synth(out: &Path, options: SynthOptions, cancel: &CancellationToken) -> anyhow::Result<()> {
    let mut settings = VideoSettings::new(options.width, options.height, options.fps);
    if let Some(codec) = options.codec {
        settings = settings.codec(codec);
    }
    if let Some(format) = options.pixel_format {
        settings = settings.pixel_format(format);
    }

    let mut writer = MediaWriter::new();
    writer.open(out)?;
    let result = synth_frames(&mut writer, &settings, options.frames, cancel);
    writer.close();
    result
}

fn synth_frames(
    writer: &mut MediaWriter,
    settings: &VideoSettings,
    frames: usize,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    if !writer.add_video_stream(settings)? {
        anyhow::bail!("container has no default video codec, pass --codec");
    }
    let format = match writer.video()? {
        Some(info) => info.pixel_format,
        None => anyhow::bail!("video stream missing after setup"),
    };
    let (width, height) = (settings.width, settings.height);
    let src = PictureShape::named("rgb24", width, height)?;
    let dst = PictureShape::named(format, width, height)?;
    let mut converter = Converter::new(config().converter_config());

    for index in 0..frames {
        if cancel.is_cancelled() {
            log::warn!("synth cancelled after {} frames", index);
            break;
        }
        let rgb = test_pattern(width, height, index);
        let pixels = converter.convert_pixels(src, &rgb, dst)?;
        let unit = VideoUnit {
            pts: 0.0,
            width,
            height,
            pixel_format: format,
            payload: Payload::Shared(pixels),
            key_frame: false,
        };
        loop {
            match writer.encode_video(&unit)? {
                EncodeStep::Retry => continue,
                EncodeStep::Encoded { .. } => break,
                EncodeStep::EndOfStream => anyhow::bail!("encoder ended early"),
            }
        }
    }
    writer.flush()?;
    log::info!(
        "wrote {} frames in {} packets",
        writer.encoded_video_frames()?,
        writer.packets_written()?
    );
    Ok(())
}
