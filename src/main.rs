use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

mod command;
mod config;

#[derive(Parser)]
#[command(name = "media-pump", about = "Decode and encode media through FFmpeg pumps")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print container and stream descriptions
    Probe { path: PathBuf },
    /// Decode every unit and print one line per unit
    Decode {
        path: PathBuf,
        /// Borrow payloads from the reader instead of copying them
        #[arg(long)]
        share: bool,
        #[arg(long)]
        json: bool,
    },
    /// Encode a synthetic test pattern
    Synth {
        out: PathBuf,
        #[arg(long, default_value_t = 320)]
        width: u32,
        #[arg(long, default_value_t = 240)]
        height: u32,
        #[arg(long, default_value_t = 25.0)]
        fps: f64,
        #[arg(long, default_value_t = 50)]
        frames: usize,
        #[arg(long)]
        codec: Option<String>,
        #[arg(long)]
        pixel_format: Option<String>,
    },
}

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("ffmpeg_pump", log::LevelFilter::Info)
        .filter_module("media_pump", log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

fn run(cmd: Command, cancel: &CancellationToken) -> anyhow::Result<()> {
    match cmd {
        Command::Probe { path } => command::probe(&path),
        Command::Decode { path, share, json } => command::decode(&path, share, json, cancel),
        Command::Synth {
            out,
            width,
            height,
            fps,
            frames,
            codec,
            pixel_format,
        } => command::synth(
            &out,
            command::SynthOptions {
                width,
                height,
                fps,
                frames,
                codec,
                pixel_format,
            },
            cancel,
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    ffmpeg_pump::init()?;
    log::debug!("conversion cache capacity {}", config::config().cache_capacity());

    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();
    let mut job = tokio::task::spawn_blocking(move || run(cli.command, &task_cancel));

    tokio::select! {
        result = &mut job => result?,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            job.await?
        },
    }
}
