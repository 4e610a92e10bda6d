use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use putt_detector::analysis::spectral::ProfileKind;
use putt_detector::{
    BackendKind, BeatSource, ConfigPatch, DetectorConfig, DetectorStats, EngineHandle,
    GridMetronome, ProfileLibrary, ProfileRecorder, ProfileStore, StrikeDetector, StrikeEvent,
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "putt_cli",
    about = "Offline and live harness for the putter strike detector"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the detector over a WAV file and print strikes as JSON lines
    Detect {
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        detector: DetectorArgs,
    },
    /// Build a sound profile from one or more WAV recordings
    RecordProfile {
        #[arg(long)]
        name: String,
        #[arg(long, value_enum, default_value_t = KindArg::Target)]
        kind: KindArg,
        /// Profile library to update (created when missing)
        #[arg(long)]
        library: PathBuf,
        #[arg(long)]
        threshold: Option<f32>,
        #[arg(long, default_value_t = putt_detector::profiles::DEFAULT_MIN_RECORDINGS)]
        min_recordings: usize,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Capture from an input device and print strikes as they are accepted
    Listen {
        #[arg(long, default_value_t = 10)]
        seconds: u64,
        /// Input device name (defaults to the system default input)
        #[arg(long)]
        device: Option<String>,
        #[command(flatten)]
        detector: DetectorArgs,
    },
}

#[derive(clap::Args, Debug)]
struct DetectorArgs {
    /// Detector configuration JSON
    #[arg(long)]
    config: Option<PathBuf>,
    /// Profile library JSON for spectral matching
    #[arg(long)]
    profiles: Option<PathBuf>,
    /// Metronome tempo; enables tick rejection and the beat gate
    #[arg(long)]
    bpm: Option<u32>,
    /// Time of the first metronome tick on the stream clock
    #[arg(long, default_value_t = 0.0)]
    origin_ms: f64,
    /// Sensitivity in 0..1; overrides both band multipliers
    #[arg(long)]
    sensitivity: Option<f32>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Target,
    Ignore,
}

impl From<KindArg> for ProfileKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Target => ProfileKind::Target,
            KindArg::Ignore => ProfileKind::Ignore,
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Detect { input, detector } => run_detect(&input, &detector),
        Commands::RecordProfile {
            name,
            kind,
            library,
            threshold,
            min_recordings,
            inputs,
        } => run_record_profile(&name, kind, &library, threshold, min_recordings, &inputs),
        Commands::Listen {
            seconds,
            device,
            detector,
        } => run_listen(seconds, device, &detector),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

impl DetectorArgs {
    /// Config from file (or defaults) with CLI overrides applied
    fn detector_config(&self, sample_rate: Option<u32>) -> DetectorConfig {
        let mut config = match &self.config {
            Some(path) => DetectorConfig::load_from_file(path),
            None => DetectorConfig::default(),
        };

        let mut patch = ConfigPatch {
            sensitivity: self.sensitivity,
            ..ConfigPatch::default()
        };
        if let Some(rate) = sample_rate.filter(|&rate| rate != config.sample_rate) {
            let frame_ms = config.frame_ms();
            patch.sample_rate = Some(rate);
            patch.frame_length = Some(((rate as f64 * frame_ms / 1000.0).round() as usize).max(1));
        }
        // Clamped values are logged by the config layer.
        config.apply_patch(&patch);
        config
    }

    fn beat_source(&self) -> Option<Arc<dyn BeatSource>> {
        self.bpm
            .map(|bpm| Arc::new(GridMetronome::new(bpm, self.origin_ms)) as Arc<dyn BeatSource>)
    }

    fn profile_store(&self) -> Result<Option<Arc<dyn ProfileStore>>> {
        match &self.profiles {
            Some(path) => {
                let library = ProfileLibrary::load(path)
                    .with_context(|| format!("loading profiles from {}", path.display()))?;
                Ok(Some(Arc::new(library) as Arc<dyn ProfileStore>))
            }
            None => Ok(None),
        }
    }
}

fn run_detect(input: &Path, args: &DetectorArgs) -> Result<ExitCode> {
    let (samples, sample_rate) = read_wav(input)?;
    let config = args.detector_config(Some(sample_rate));

    let mut detector = StrikeDetector::new(config);
    detector.set_beat_source(args.beat_source());
    detector.set_profile_store(args.profile_store()?);

    let strikes = detector.process_samples(&samples);
    for strike in &strikes {
        println!("{}", serde_json::to_string(strike)?);
    }

    let summary = DetectSummary {
        input: input.display().to_string(),
        sample_rate,
        strike_count: strikes.len(),
        stats: detector.stats(),
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(ExitCode::from(0))
}

fn run_record_profile(
    name: &str,
    kind: KindArg,
    library_path: &Path,
    threshold: Option<f32>,
    min_recordings: usize,
    inputs: &[PathBuf],
) -> Result<ExitCode> {
    let mut recorder: Option<ProfileRecorder> = None;

    for input in inputs {
        let (samples, sample_rate) = read_wav(input)?;
        let recorder = recorder.get_or_insert_with(|| {
            let recorder = ProfileRecorder::new(name, kind.into(), sample_rate)
                .with_min_recordings(min_recordings);
            match threshold {
                Some(threshold) => recorder.with_threshold(threshold),
                None => recorder,
            }
        });
        let collected = recorder
            .add_recording(&samples)
            .with_context(|| format!("fingerprinting {}", input.display()))?;
        tracing::info!("[putt_cli] {} -> recording {}", input.display(), collected);
    }

    let recorder = recorder.ok_or_else(|| anyhow!("no recordings given"))?;
    let profile = recorder.finish()?;

    let library = ProfileLibrary::load_or_default(library_path)
        .with_context(|| format!("loading {}", library_path.display()))?;
    library.upsert(profile.clone());
    library
        .save(library_path)
        .with_context(|| format!("writing {}", library_path.display()))?;

    println!(
        "{}",
        serde_json::to_string(&ProfileSummary {
            name: &profile.name,
            kind: profile.kind,
            similarity_threshold: profile.similarity_threshold,
            library: library_path.display().to_string(),
            library_size: library.len(),
        })?
    );
    Ok(ExitCode::from(0))
}

fn run_listen(seconds: u64, device: Option<String>, args: &DetectorArgs) -> Result<ExitCode> {
    let config = args.detector_config(None);
    let kind = match device {
        Some(name) => BackendKind::CpalDevice(name),
        None => BackendKind::Cpal,
    };

    let engine = EngineHandle::new(config, &kind);
    engine.set_beat_source(args.beat_source())?;
    engine.set_profile_store(args.profile_store()?)?;
    engine.subscribe(|strike: &StrikeEvent| match serde_json::to_string(strike) {
        Ok(line) => println!("{line}"),
        Err(err) => tracing::error!("[putt_cli] Failed to encode strike: {}", err),
    })?;

    engine.start().context("starting capture")?;
    eprintln!("Listening for {seconds}s...");
    thread::sleep(Duration::from_secs(seconds));
    engine.stop()?;

    println!("{}", serde_json::to_string(&engine.stats()?)?);
    Ok(ExitCode::from(0))
}

/// Read a WAV file as mono f32 in [-1, 1]; multi-channel input is averaged
fn read_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(anyhow!("{} has zero channels", path.display()));
    }

    let interleaved = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|sample| sample.map_err(|err| anyhow!(err)))
            .collect::<Result<Vec<f32>>>()?,
        hound::SampleFormat::Int => {
            if !(8..=32).contains(&spec.bits_per_sample) {
                return Err(anyhow!(
                    "Unsupported bits per sample {} in {}",
                    spec.bits_per_sample,
                    path.display()
                ));
            }
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| {
                    sample
                        .map(|value| value as f32 / scale)
                        .map_err(|err| anyhow!(err))
                })
                .collect::<Result<Vec<f32>>>()?
        }
    };

    let channels = spec.channels as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };
    Ok((samples, spec.sample_rate))
}

#[derive(Serialize)]
struct DetectSummary {
    input: String,
    sample_rate: u32,
    strike_count: usize,
    stats: DetectorStats,
}

#[derive(Serialize)]
struct ProfileSummary<'a> {
    name: &'a str,
    kind: ProfileKind,
    similarity_threshold: f32,
    library: String,
    library_size: usize,
}
