use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

use plate_recorder::config::DetectionStrategy;
use plate_recorder::config::PlateFormat;
use plate_recorder::pacing::FrameTimer;
use plate_recorder::plate_detection::ocr::TextExtractor;
use plate_recorder::plate_detection::video_reader::CameraInput;
use plate_recorder::plate_detection::video_reader::CameraSource;
use plate_recorder::plate_detection::DetectionResult;
use plate_recorder::Config;
use plate_recorder::PipelineCoordinator;
use plate_recorder::ResultStore;

#[derive(Parser, Debug)]
#[command(name = "plate_recorder", version, about = "Read and log vehicle plates from a camera")]
struct Args {
    /// TOML configuration file.
    #[arg(long, short, global = true, env = "PLATE_RECORDER_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for saved images and the plate log.
    #[arg(long, short, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture frames and record every plate read
    Run {
        /// Camera index or path to a video file.
        #[arg(long, short)]
        source: Option<String>,
        /// Plate format to accept.
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
        /// Custom plate regex, wins over --format.
        #[arg(long)]
        pattern: Option<String>,
        /// Skip contour detection and OCR the whole frame.
        #[arg(long)]
        whole_frame: bool,
        /// Stop after this many seconds instead of waiting for Ctrl-C.
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Print the results directory and the plates logged so far
    Results,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Generic,
    Structured,
}

impl From<FormatArg> for PlateFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Generic => PlateFormat::Generic,
            FormatArg::Structured => PlateFormat::Structured,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = Config::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(output) = args.output {
        cfg.output.dir = output;
    }

    match args.command {
        Command::Run {
            source,
            format,
            pattern,
            whole_frame,
            duration,
        } => {
            if let Some(source) = source {
                cfg.capture.source = source;
            }
            if let Some(format) = format {
                cfg.plate.format = format.into();
                cfg.plate.pattern = None;
            }
            if pattern.is_some() {
                cfg.plate.pattern = pattern;
            }
            if whole_frame {
                cfg.detection.strategy = DetectionStrategy::WholeFrame;
            }
            cfg.validate().context("invalid options")?;
            run(&cfg, duration.map(Duration::from_secs))
        }
        Command::Results => results(&cfg),
    }
}

fn run(cfg: &Config, duration: Option<Duration>) -> Result<()> {
    let mut source = CameraSource::new(CameraInput::parse(&cfg.capture.source))
        .with_loop(cfg.capture.loop_file);
    if let Some((width, height)) = cfg.capture.resize() {
        source = source.with_resize(width, height);
    }

    let extractor = TextExtractor::tesseract(&cfg.ocr).context("initialising Tesseract")?;
    let mut pipeline = PipelineCoordinator::from_config(cfg, source, extractor)?;
    pipeline.start()?;

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("setting Ctrl-C handler")?;
    log::info!("recording, press Ctrl-C to stop");

    let detections = pipeline.detections();
    let started = Instant::now();
    let mut timer = FrameTimer::new(cfg.capture.interval());
    while running.load(Ordering::SeqCst) {
        if duration.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
        pipeline.pump();
        detections.try_iter().for_each(|d| print_detection(&d));
        timer.wait();
    }

    pipeline.stop()?;
    detections.try_iter().for_each(|d| print_detection(&d));
    log::debug!("metrics:\n{}", pipeline.metrics().render());
    Ok(())
}

fn print_detection(detection: &DetectionResult) {
    println!(
        "{} {} {}",
        detection.recognized_at.format("%Y-%m-%d %H:%M:%S"),
        detection.text,
        detection.image_path.display()
    );
}

fn results(cfg: &Config) -> Result<()> {
    let store = ResultStore::open(&cfg.output.dir)?;
    println!("results in {}", store.dir().display());
    for plate in store.entries()? {
        println!("{plate}");
    }
    Ok(())
}
