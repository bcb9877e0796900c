use crate::analyzer::{feed, Analyzer, AnalyzerStats, Published};
use crate::camera::CameraSource;
use crate::config::{config_path, load_config, save_config, Config};
use crate::display::{predictions, render_lines, Labels};
use crate::frame::{DirectorySource, Frame, FrameSource};
use crate::model::{classify, ModelBackend, OnnxBackend, Scores};
use crate::preprocess::preprocess;
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "alertcam",
    version,
    about = "Classify camera frames with an on-device model"
)]
pub struct Cli {
    /// Model file, overriding the configured one
    #[arg(long, global = true)]
    pub model: Option<PathBuf>,
    /// Label file, overriding the configured one
    #[arg(long, global = true)]
    pub labels: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify image files once
    Classify {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Analyze live camera frames
    Camera {
        /// Camera index, overriding the configured one
        #[arg(short, long)]
        index: Option<u32>,
        /// Stop after this many captured frames
        #[arg(short, long)]
        frames: Option<u64>,
    },
    /// Feed the images of a directory through the analyzer
    Replay {
        /// Directory containing frames
        #[arg(short, long)]
        dir: PathBuf,
        /// Number of frames to submit, defaults to one pass over the directory
        #[arg(short, long)]
        frames: Option<u64>,
    },
    /// Show or change the stored configuration
    Config {
        #[command(subcommand)]
        action: ConfigSubcommand,
    },
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the configuration
    Show,
    /// Set the model path
    Model { path: PathBuf },
    /// Set the label file path
    Labels { path: PathBuf },
    /// Set camera parameters
    Camera {
        #[arg(long)]
        index: Option<u32>,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
    },
}

pub fn run_cli() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();
    if let Err(e) = execute(cli) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let mut cfg = load_config();
    if let Some(model) = cli.model {
        cfg.model = model;
    }
    if let Some(labels) = cli.labels {
        cfg.labels = Some(labels);
    }
    match cli.command {
        Commands::Classify { images } => classify_command(&cfg, &images),
        Commands::Camera { index, frames } => {
            if let Some(i) = index {
                cfg.camera.index = i;
            }
            camera_command(&cfg, frames)
        }
        Commands::Replay { dir, frames } => replay_command(&cfg, dir, frames),
        Commands::Config { action } => configure(action),
    }
}

fn load_backend(cfg: &Config) -> anyhow::Result<OnnxBackend> {
    OnnxBackend::load(&cfg.model)
        .with_context(|| format!("loading model {}", cfg.model.display()))
}

fn load_labels(cfg: &Config) -> anyhow::Result<Option<Labels>> {
    cfg.labels
        .as_ref()
        .map(|p| Labels::load(p).with_context(|| format!("loading labels {}", p.display())))
        .transpose()
}

fn write_scores(
    out: &mut impl Write,
    scores: &Scores,
    labels: Option<&Labels>,
) -> io::Result<()> {
    for line in render_lines(&predictions(scores, labels)) {
        writeln!(out, "{line}")?;
    }
    Ok(())
}

/// Classifies each image once and writes the rendered predictions to `out`.
pub fn classify_images<B: ModelBackend + ?Sized>(
    backend: &B,
    labels: Option<&Labels>,
    images: &[PathBuf],
    out: &mut impl Write,
) -> anyhow::Result<()> {
    for path in images {
        let frame = Frame::open(path).with_context(|| format!("reading {}", path.display()))?;
        let scores = classify(backend, &preprocess(&frame))?;
        writeln!(out, "{}", path.display())?;
        write_scores(out, &scores, labels)?;
    }
    Ok(())
}

/// Runs `source` through a fresh analyzer, writing each new result to `out`.
pub fn analyze<S, B>(
    source: &mut S,
    backend: B,
    labels: Option<&Labels>,
    frames: Option<u64>,
    interval: Duration,
    out: &mut impl Write,
) -> anyhow::Result<AnalyzerStats>
where
    S: FrameSource + ?Sized,
    B: ModelBackend + Send + 'static,
{
    let analyzer = Analyzer::start(backend)?;
    let results = analyzer.results();
    let mut write_err = None;
    let mut on_result = |published: &Published| {
        debug!(sequence = published.sequence, "rendering result");
        if let Err(e) = write_scores(out, &published.scores, labels) {
            write_err.get_or_insert(e);
        }
    };
    let captured = feed(source, &analyzer, frames, interval, &mut on_result);
    let stats = analyzer.stop()?;
    let captured = captured.context("reading frames")?;
    if let Some(published) = results.take() {
        on_result(&published);
    }
    if let Some(e) = write_err {
        return Err(e.into());
    }
    info!(
        captured,
        processed = stats.processed,
        failed = stats.failed,
        skipped = stats.skipped,
        "analysis finished"
    );
    Ok(stats)
}

fn classify_command(cfg: &Config, images: &[PathBuf]) -> anyhow::Result<()> {
    let backend = load_backend(cfg)?;
    let labels = load_labels(cfg)?;
    classify_images(&backend, labels.as_ref(), images, &mut io::stdout().lock())
}

fn camera_command(cfg: &Config, frames: Option<u64>) -> anyhow::Result<()> {
    let backend = load_backend(cfg)?;
    let labels = load_labels(cfg)?;
    let mut source = CameraSource::open(&cfg.camera).context("opening camera")?;
    info!(camera = cfg.camera.index, "camera analysis started");
    analyze(
        &mut source,
        backend,
        labels.as_ref(),
        frames,
        Duration::ZERO,
        &mut io::stdout().lock(),
    )?;
    Ok(())
}

fn replay_command(cfg: &Config, dir: PathBuf, frames: Option<u64>) -> anyhow::Result<()> {
    let mut source = DirectorySource::new(&dir);
    if source.is_empty() {
        bail!("no frames found in {}", dir.display());
    }
    let backend = load_backend(cfg)?;
    let labels = load_labels(cfg)?;
    let total = frames.unwrap_or(source.len() as u64);
    let interval = Duration::from_secs_f64(1.0 / cfg.camera.fps.max(1) as f64);
    info!(dir = %dir.display(), total, "replay started");
    analyze(
        &mut source,
        backend,
        labels.as_ref(),
        Some(total),
        interval,
        &mut io::stdout().lock(),
    )?;
    Ok(())
}

fn configure(action: ConfigSubcommand) -> anyhow::Result<()> {
    let mut cfg = load_config();
    match action {
        ConfigSubcommand::Show => {
            println!("{}", serde_json::to_string_pretty(&cfg)?);
            return Ok(());
        }
        ConfigSubcommand::Model { path } => {
            info!("model set to {}", path.display());
            cfg.model = path;
        }
        ConfigSubcommand::Labels { path } => {
            info!("labels set to {}", path.display());
            cfg.labels = Some(path);
        }
        ConfigSubcommand::Camera {
            index,
            width,
            height,
        } => {
            if let Some(i) = index {
                cfg.camera.index = i;
            }
            if let Some(w) = width {
                cfg.camera.width = w;
            }
            if let Some(h) = height {
                cfg.camera.height = h;
            }
            info!(camera = ?cfg.camera, "camera updated");
        }
    }
    save_config(&cfg).with_context(|| format!("writing config {}", config_path().display()))
}
