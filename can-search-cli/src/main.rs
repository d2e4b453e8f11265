//! CAN Search CLI Application
//!
//! Command-line front-end for the can-search-core library:
//! - Offline noise filtering of recorded candump logs
//! - Live capture to candump logs
//! - The interactive noise/sample collection workflow
//! - The interactive bisecting search with terminal prompts

use anyhow::{Context, Result};
use can_search_core::formats::{format_line, read_log, write_log};
use can_search_core::{
    BisectingSearch, CaptureSession, Frame, FrameSource, MatchMode, MemorySource, NoiseFilter,
    SampleCollector, SearchObserver, SearchState,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

mod config;
mod prompt;

use config::{AppConfig, InterfaceConfig};
use prompt::Console;

/// CAN Search - Find the CAN frames behind a physical effect
#[derive(Parser, Debug)]
#[command(name = "can-search")]
#[command(about = "Filter CAN captures and bisect frame sets on a live bus", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Use an in-memory loopback bus instead of SocketCAN (dry run)
    #[arg(long, global = true)]
    loopback: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Filter recorded samples against recorded noise (offline)
    Filter {
        /// candump log of idle bus traffic
        #[arg(long, value_name = "FILE")]
        noise: Option<PathBuf>,

        /// candump log of one sample (repeat for every sample)
        #[arg(long = "sample", value_name = "FILE", required = true)]
        samples: Vec<PathBuf>,

        /// Treat every frame with a noise ID as noise, whatever its payload
        #[arg(long)]
        id_only: bool,

        /// Output candump log (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Record bus traffic for a fixed time
    Capture {
        /// CAN interface (default from config, else can0)
        #[arg(short, long)]
        interface: Option<String>,

        /// Capture duration in seconds
        #[arg(long, default_value_t = 10)]
        seconds: u64,

        /// Output candump log (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Record noise and samples interactively, then filter them
    Collect {
        /// CAN interface (default from config, else can0)
        #[arg(short, long)]
        interface: Option<String>,

        /// Seconds of idle traffic to record first (0 skips noise)
        #[arg(long)]
        noise_seconds: Option<u64>,

        /// Number of samples to record
        #[arg(long)]
        samples: Option<usize>,

        /// Treat every frame with a noise ID as noise, whatever its payload
        #[arg(long)]
        id_only: bool,

        /// Output candump log (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Bisect a frame set on the bus until the responsible frames remain
    Search {
        /// CAN interface (default from config, else can0)
        #[arg(short, long)]
        interface: Option<String>,

        /// candump log with the candidate frames
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        /// Delay after each replayed frame in milliseconds
        #[arg(long, value_name = "MS")]
        gap_ms: Option<f64>,

        /// Fixed seed for the retry shuffle
        #[arg(long)]
        seed: Option<u64>,

        /// Do not ring the terminal bell before each question
        #[arg(long)]
        no_bell: bool,

        /// Output candump log for the result (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("CAN Search CLI v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using search library v{}", can_search_core::VERSION);

    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    if args.loopback {
        config.interface.loopback = true;
    }

    match args.command {
        Command::Filter {
            noise,
            samples,
            id_only,
            output,
        } => filter_mode(&config, noise.as_deref(), &samples, id_only, output.as_deref()),
        Command::Capture {
            interface,
            seconds,
            output,
        } => {
            override_interface(&mut config, interface);
            capture_mode(&config, seconds, output.as_deref())
        }
        Command::Collect {
            interface,
            noise_seconds,
            samples,
            id_only,
            output,
        } => {
            override_interface(&mut config, interface);
            if let Some(seconds) = noise_seconds {
                config.filter.noise_seconds = seconds;
            }
            if let Some(samples) = samples {
                config.filter.samples = samples;
            }
            if id_only {
                config.filter.match_mode = MatchMode::IdOnly;
            }
            collect_mode(&config, output.as_deref())
        }
        Command::Search {
            interface,
            input,
            gap_ms,
            seed,
            no_bell,
            output,
        } => {
            override_interface(&mut config, interface);
            if let Some(gap) = gap_ms {
                override_gap(&mut config, gap)?;
            }
            if seed.is_some() {
                config.search.shuffle_seed = seed;
            }
            search_mode(&config, &input, !no_bell, output.as_deref())
        }
    }
}

fn override_gap(config: &mut AppConfig, gap_ms: f64) -> Result<()> {
    config.replay.frame_gap_ms = gap_ms;
    config.replay.validate().context("Invalid --gap-ms")
}

fn override_interface(config: &mut AppConfig, interface: Option<String>) {
    if let Some(name) = interface {
        config.interface.name = name;
    }
}

/// Offline filter mode - read logs, filter, print the remaining frames
fn filter_mode(
    config: &AppConfig,
    noise: Option<&Path>,
    samples: &[PathBuf],
    id_only: bool,
    output: Option<&Path>,
) -> Result<()> {
    let mode = if id_only {
        MatchMode::IdOnly
    } else {
        config.filter.match_mode
    };

    let noise = match noise {
        Some(path) => load_frames(path)?,
        None => Vec::new(),
    };
    let samples = samples
        .iter()
        .map(|path| load_frames(path))
        .collect::<Result<Vec<_>>>()?;

    let report = NoiseFilter::new(mode).apply(&noise, &samples);
    log::info!(
        "{} frame(s) in all samples, {} of {} sample(s) compared ({})",
        report.frames.len(),
        report.samples_compared,
        samples.len(),
        mode
    );

    emit(&report.frames, output)
}

/// Capture mode - record the bus for a fixed time
fn capture_mode(config: &AppConfig, seconds: u64, output: Option<&Path>) -> Result<()> {
    let source = open_source(&config.interface)?;
    let observer = Arc::new(|frame: &Frame| log::trace!("{}", format_line(frame)));

    let session = CaptureSession::start("capture", source, &config.capture, observer)?;
    eprintln!("Capturing on {} for {}s ...", config.interface.name, seconds);
    thread::sleep(Duration::from_secs(seconds));
    let capture = session.stop()?;

    emit(&capture.frames, output)
}

/// Collect mode - noise, samples, filter, with the operator at the terminal
fn collect_mode(config: &AppConfig, output: Option<&Path>) -> Result<()> {
    if config.filter.samples == 0 {
        anyhow::bail!("At least one sample is needed");
    }
    let source = open_source(&config.interface)?;

    print_banner("CAN Search - Collect");
    let collector = SampleCollector::new(
        source,
        config.capture.clone(),
        NoiseFilter::new(config.filter.match_mode),
    );
    let mut console = Console::stdio();

    let report = collector.run_filter(
        Duration::from_secs(config.filter.noise_seconds),
        config.filter.samples,
        &mut console,
    )?;

    match report {
        Some(report) => {
            eprintln!(
                "{} frame(s) appeared in every sample ({} noise frame(s) removed)",
                report.frames.len(),
                report.noise_removed.iter().sum::<usize>()
            );
            emit(&report.frames, output)
        }
        None => {
            eprintln!("Noise collection cancelled");
            Ok(())
        }
    }
}

/// Search mode - bisect the candidate set with the operator at the terminal
fn search_mode(config: &AppConfig, input: &Path, bell: bool, output: Option<&Path>) -> Result<()> {
    let frames = load_frames(input)?;
    if frames.is_empty() {
        anyhow::bail!("No frames to search in {:?}", input);
    }
    let source = open_source(&config.interface)?;

    print_banner("CAN Search - Bisecting Search");
    eprintln!("{} candidate frame(s) on {}", frames.len(), source.name());

    let mut search = BisectingSearch::new(
        source.as_ref(),
        Console::stdio().with_bell(bell),
        frames,
        config.search_config(),
    )
    .with_observer(ProgressLog);

    let outcome = match search.run() {
        Ok(outcome) => outcome,
        Err(e) => {
            let last = search.last_working_chunk().to_vec();
            eprintln!("Bus error, last working chunk has {} frame(s)", last.len());
            emit(&last, output)?;
            return Err(e).context("Search stopped by a bus error");
        }
    };

    eprintln!(
        "Search {} after {} round(s), {} frame(s) replayed",
        outcome.phase, outcome.rounds, outcome.frames_replayed
    );
    eprintln!("{} frame(s) remaining", outcome.frames.len());
    emit(&outcome.frames, output)
}

/// Logs every state change of the search
struct ProgressLog;

impl SearchObserver for ProgressLog {
    fn on_search_state_changed(&mut self, state: &SearchState) {
        log::debug!(
            "[{}, {:?}] working set: {}, last working chunk: {}, round {}",
            state.phase,
            state.direction(),
            state.working_set.len(),
            state.last_working_chunk.len(),
            state.rounds
        );
    }
}

fn open_source(interface: &InterfaceConfig) -> Result<Arc<dyn FrameSource>> {
    if interface.loopback {
        log::warn!("Using in-memory loopback bus, nothing reaches a real interface");
        return Ok(Arc::new(
            MemorySource::new(interface.name.clone()).with_loopback(true),
        ));
    }
    open_socketcan(&interface.name)
}

#[cfg(feature = "socketcan")]
fn open_socketcan(name: &str) -> Result<Arc<dyn FrameSource>> {
    let source = can_search_core::SocketCanSource::open(name)
        .with_context(|| format!("Failed to open CAN interface {}", name))?;
    source.clear()?;
    Ok(Arc::new(source))
}

#[cfg(not(feature = "socketcan"))]
fn open_socketcan(name: &str) -> Result<Arc<dyn FrameSource>> {
    anyhow::bail!(
        "Interface {} requested, but this build has no SocketCAN support \
         (rebuild with --features socketcan or pass --loopback)",
        name
    )
}

fn load_frames(path: &Path) -> Result<Vec<Frame>> {
    let parsed = read_log(path).with_context(|| format!("Failed to read log file: {:?}", path))?;
    if parsed.invalid_lines > 0 {
        log::warn!("{:?}: skipped {} invalid line(s)", path, parsed.invalid_lines);
    }
    Ok(parsed.frames)
}

/// Write frames as candump lines to `output`, or to stdout
fn emit(frames: &[Frame], output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            write_log(path, frames).with_context(|| format!("Failed to write {:?}", path))?;
            eprintln!("Wrote {} frame(s) to {:?}", frames.len(), path);
        }
        None => {
            for frame in frames {
                println!("{}", format_line(frame));
            }
        }
    }
    Ok(())
}

fn print_banner(title: &str) {
    eprintln!("═══════════════════════════════════════════════");
    eprintln!("  {}", title);
    eprintln!("═══════════════════════════════════════════════\n");
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_flags() {
        let args = Args::try_parse_from([
            "can-search", "search", "--input", "set.log", "--gap-ms", "2.5", "--no-bell",
        ])
        .unwrap();
        match args.command {
            Command::Search { gap_ms, no_bell, .. } => {
                assert_eq!(gap_ms, Some(2.5));
                assert!(no_bell);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let args = Args::try_parse_from(["can-search", "search", "--input", "set.log"]).unwrap();
        assert!(matches!(args.command, Command::Search { no_bell: false, .. }));
    }

    #[test]
    fn test_gap_override_bounded() {
        let mut config = AppConfig::default();
        override_gap(&mut config, 500.0).unwrap();
        assert_eq!(config.search_config().replay.frame_gap(), Duration::from_millis(500));

        assert!(override_gap(&mut config, 1e300).is_err());
        assert!(override_gap(&mut config, f64::INFINITY).is_err());
        assert!(override_gap(&mut config, -1.0).is_err());
    }
}
