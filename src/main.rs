//! dyno_logger: logs a dynamometer to CSV while showing the latest readings.
//!
//! Usage:
//!   dyno_logger [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>       Config file path (falls back to config/dyno_logger.toml)
//!   -o, --output <FILE>       Log file (overrides the generated name)
//!   --max-items <N>           Samples kept in memory before eviction
//!   --error-budget <N>        Tolerated read failures
//!   --headless                Log only, no terminal view
//!   --duration <SECS>         Stop after this many seconds

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use dyno_logger::config::{LoggerConfig, DEFAULT_CONFIG_PATH, NUM_CHANNELS};
use dyno_logger::display::{spawn_stdin_scanner, Command, LiveView};
use dyno_logger::sink_module::generated_log_path;
use dyno_logger::{Acquisition, MockSampler, Sampler};

/// CLI arguments for dyno_logger.
#[derive(Parser, Debug)]
#[command(name = "dyno_logger")]
#[command(about = "Logs instrument samples to CSV with a live terminal view")]
#[command(version)]
struct Args {
    /// Config file path (must exist when given)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log file path (overrides config file)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Samples kept in memory before the oldest is written out
    #[arg(long)]
    max_items: Option<usize>,

    /// Read failures tolerated before acquisition aborts
    #[arg(long)]
    error_budget: Option<u32>,

    /// Run without the terminal view
    #[arg(long)]
    headless: bool,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Read from the default audio input device instead of the simulator
    #[cfg(feature = "audio-input")]
    #[arg(long)]
    audio: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, defaulted) =
        LoggerConfig::load(args.config.as_deref(), Path::new(DEFAULT_CONFIG_PATH))?;
    config.apply_overrides(args.output.clone(), args.max_items, args.error_budget);

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if defaulted {
        warn!("Config file not found at {}, using defaults", DEFAULT_CONFIG_PATH);
    }
    config.validate()?;

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", config.output_dir))?;
    let log_path = match config.output_file {
        Some(ref path) => path.clone(),
        None => generated_log_path(&config.output_dir, Local::now()),
    };

    let sampler = build_sampler(&args, &config)?;
    let mut acquisition = Acquisition::<NUM_CHANNELS>::start(
        sampler,
        &log_path,
        config.channel_names.as_slice(),
        config.acquisition(),
    )?;

    let stdin_receiver = spawn_stdin_scanner();
    let deadline = args.duration.map(|secs| Instant::now() + Duration::from_secs_f64(secs));

    if args.headless {
        wait_headless(&acquisition, &stdin_receiver, deadline);
    } else {
        let view = LiveView::new(
            acquisition.reader(),
            acquisition.stats(),
            acquisition.stop_handle(),
            config.channel_names.clone(),
            config.refresh_interval,
        );
        view.run(&stdin_receiver, || {
            acquisition.is_running() && deadline.map_or(true, |d| Instant::now() < d)
        })?;
    }

    let stats = acquisition.stats();
    let result = acquisition.shutdown();
    stats.log_stats();

    match result {
        Ok(()) => {
            info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Acquisition ended abnormally: {}", e);
            Err(e.into())
        }
    }
}

fn build_sampler(args: &Args, config: &LoggerConfig) -> Result<Box<dyn Sampler<NUM_CHANNELS>>> {
    #[cfg(feature = "audio-input")]
    if args.audio {
        let sampler = dyno_logger::audio_sampler::AudioSampler::<NUM_CHANNELS>::open_default(
            Duration::from_millis(500),
        )?;
        return Ok(Box::new(sampler));
    }
    #[cfg(not(feature = "audio-input"))]
    let _ = args;

    info!(
        "Using simulated dynamometer at {} Hz",
        config.sampler.data_rate_hz
    );
    Ok(Box::new(MockSampler::new(
        config.amplitudes()?,
        config.sampler.data_rate_hz,
    )?))
}

fn wait_headless(
    acquisition: &Acquisition<NUM_CHANNELS>,
    stdin_receiver: &mpsc::Receiver<String>,
    deadline: Option<Instant>,
) {
    info!("Running headless. Enter q to stop.");
    loop {
        if !acquisition.is_running() {
            warn!("Acquisition worker exited");
            break;
        }
        if deadline.map_or(false, |d| Instant::now() >= d) {
            info!("Duration elapsed");
            break;
        }
        if let Ok(line) = stdin_receiver.try_recv() {
            if Command::parse(&line) == Command::Quit {
                break;
            }
        }
        thread::sleep(Duration::from_millis(100));
    }
}
