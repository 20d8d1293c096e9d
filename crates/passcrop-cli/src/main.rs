use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use passcrop_core::{
    parse_gesture_stream, select_detector, ContainerSize, CropRegion, CropSession, DisplayedLayout,
    FrameSizing, GestureEvent, OriginalImage, PixelRect, Vector, ViewportTransform,
};
use passcrop_imaging::FileImageProcessor;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod compliance;
mod config;
mod executor;

use compliance::{ComplianceChecker, ComplianceReport};
use config::Config;
use executor::{CropExecutor, ExecutorSettings, ProcessedPhoto};

#[derive(Parser)]
#[command(name = "passcrop", version, about = "Passport photo crop and head-size check")]
struct Cli {
    /// TOML configuration file (overrides PASSCROP_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how the photo is fitted in the container and the zoom limits
    Layout {
        #[command(flatten)]
        display: DisplayArgs,
    },
    /// Resolve the crop region for a zoom/pan without writing anything
    Region {
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Resolve the crop region and produce the final square photo
    Crop {
        #[command(flatten)]
        view: ViewArgs,
        /// Move the final photo here instead of leaving it in the work directory
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Side of the final photo in pixels (default from config)
        #[arg(long)]
        output_size: Option<u32>,
        /// Run the head-size check on the result
        #[arg(long)]
        check: bool,
    },
    /// Check head size on a finished photo
    Check {
        photo: PathBuf,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
struct DisplayArgs {
    /// Original photo
    image: PathBuf,
    /// On-screen container, WIDTHxHEIGHT
    #[arg(long, default_value = "390x700", value_parser = parse_container)]
    container: ContainerSize,
    /// Fixed crop frame side (default: fitted to the container)
    #[arg(long)]
    frame: Option<f64>,
}

#[derive(Args)]
struct ViewArgs {
    #[command(flatten)]
    display: DisplayArgs,
    /// Recorded gesture stream (JSON array of events)
    #[arg(long, conflicts_with_all = ["scale", "pan"])]
    gestures: Option<PathBuf>,
    /// Pinch factor applied as a single gesture
    #[arg(long)]
    scale: Option<f64>,
    /// Pan DX,DY in container pixels
    #[arg(long, value_parser = parse_pan, allow_hyphen_values = true)]
    pan: Option<Vector>,
}

#[derive(Serialize)]
struct LayoutReport<'a> {
    image: &'a OriginalImage,
    container: ContainerSize,
    layout: &'a DisplayedLayout,
    frame: f64,
    min_scale: f64,
    max_scale: f64,
}

#[derive(Serialize)]
struct RegionReport<'a> {
    image: &'a OriginalImage,
    transform: ViewportTransform,
    region: CropRegion,
    pixels: PixelRect,
}

#[derive(Serialize)]
struct CropReport<'a> {
    #[serde(flatten)]
    region: RegionReport<'a>,
    photo: ProcessedPhoto,
    #[serde(skip_serializing_if = "Option::is_none")]
    compliance: Option<ComplianceReport>,
}

fn parse_container(s: &str) -> Result<ContainerSize, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let width: f64 = w.trim().parse().map_err(|_| format!("bad width '{w}'"))?;
    let height: f64 = h.trim().parse().map_err(|_| format!("bad height '{h}'"))?;
    if !(width > 0.0 && height > 0.0) {
        return Err(format!("container must be positive, got {width}x{height}"));
    }
    Ok(ContainerSize::new(width, height))
}

fn parse_pan(s: &str) -> Result<Vector, String> {
    let (dx, dy) = s
        .split_once(',')
        .ok_or_else(|| format!("expected DX,DY, got '{s}'"))?;
    let dx: f64 = dx.trim().parse().map_err(|_| format!("bad dx '{dx}'"))?;
    let dy: f64 = dy.trim().parse().map_err(|_| format!("bad dy '{dy}'"))?;
    Ok(Vector::new(dx, dy))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_session(config: &Config, display: &DisplayArgs) -> Result<CropSession> {
    let original = passcrop_imaging::load_original(&display.image)
        .with_context(|| format!("failed to open {}", display.image.display()))?;
    let sizing = match display.frame {
        Some(size) => FrameSizing::Fixed(size),
        None => FrameSizing::Padding(config.crop_padding),
    };
    let session = CropSession::new(original, display.container, sizing, config.limits())
        .context("failed to lay out photo")?;
    Ok(session)
}

/// The gestures to replay: a recorded stream, or one synthetic gesture from
/// `--scale` / `--pan`.
fn gesture_events(view: &ViewArgs) -> Result<Vec<GestureEvent>> {
    if let Some(path) = &view.gestures {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        return parse_gesture_stream(&text).with_context(|| format!("invalid gesture file {}", path.display()));
    }

    let mut events = Vec::new();
    if view.scale.is_some() || view.pan.is_some() {
        events.push(GestureEvent::Start);
        if let Some(factor) = view.scale {
            if !(factor > 0.0 && factor.is_finite()) {
                bail!("--scale must be a positive number, got {factor}");
            }
            events.push(GestureEvent::Scale { factor, focal: None });
        }
        if let Some(pan) = view.pan {
            events.push(GestureEvent::Pan { dx: pan.dx, dy: pan.dy });
        }
        events.push(GestureEvent::End);
    }
    Ok(events)
}

fn replay(config: &Config, view: &ViewArgs) -> Result<CropSession> {
    let mut session = open_session(config, &view.display)?;
    let events = gesture_events(view)?;
    for event in &events {
        session.apply(event);
    }
    tracing::debug!(events = events.len(), transform = ?session.transform(), "gestures replayed");
    Ok(session)
}

fn checker(config: &Config) -> Result<ComplianceChecker> {
    let detector = select_detector(config.profile, config.detector, &config.model_dir)
        .context("face detection unavailable")?;
    Ok(ComplianceChecker::new(detector, config.band()))
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if std::fs::rename(from, to).is_err() {
        std::fs::copy(from, to).with_context(|| format!("failed to write {}", to.display()))?;
        std::fs::remove_file(from).with_context(|| format!("failed to remove {}", from.display()))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Layout { display } => {
            let session = open_session(&config, &display)?;
            print_json(&LayoutReport {
                image: session.original(),
                container: session.container(),
                layout: session.layout(),
                frame: session.frame().size,
                min_scale: session.viewport().min_scale(),
                max_scale: session.viewport().max_scale(),
            })?;
        }
        Commands::Region { view } => {
            let session = replay(&config, &view)?;
            let region = session.crop_region();
            print_json(&RegionReport {
                image: session.original(),
                transform: session.transform(),
                region,
                pixels: region.to_pixel_rect(session.original().size),
            })?;
        }
        Commands::Crop {
            view,
            out,
            output_size,
            check,
        } => {
            let session = replay(&config, &view)?;
            let region = session.crop_region();

            let processor = FileImageProcessor::new(&config.work_dir)
                .with_context(|| format!("failed to create {}", config.work_dir.display()))?;
            let executor = CropExecutor::new(
                processor,
                ExecutorSettings {
                    crop_quality: config.crop_quality,
                    resize_quality: config.resize_quality,
                    timeout: config.crop_timeout(),
                },
            );
            let mut photo = executor
                .execute(session.original(), &region, output_size.unwrap_or(config.output_size))
                .await?;

            if let Some(out) = out {
                move_file(&photo.path, &out)?;
                photo.path = out;
            }

            let compliance = if check {
                Some(checker(&config)?.check(&photo.path).await?)
            } else {
                None
            };

            print_json(&CropReport {
                region: RegionReport {
                    image: session.original(),
                    transform: session.transform(),
                    region,
                    pixels: photo.source_rect,
                },
                photo,
                compliance,
            })?;
        }
        Commands::Check { photo } => {
            let report = checker(&config)?.check(&photo).await?;
            print_json(&report)?;
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
