use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tryon_core::{
    compute_transform, AccessoryCategory, CanvasSize, MappingStrategy, PlacementOptions,
};
use tryon_providers::{LocalProvider, RawFrame, RemoteProvider, StaticFrameSource};
use tryon_tracker::{HybridScheduler, TrackerConfig, TrackingMode};

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/api/face/detect/";

#[derive(Parser)]
#[command(name = "tryon", about = "Hybrid face-tracking diagnostics CLI")]
struct Cli {
    /// Path to the face-mesh ONNX model (required for local/hybrid modes)
    #[arg(long, global = true)]
    model: Option<String>,
    /// Remote detection service endpoint
    #[arg(long, global = true, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,
    /// Tracking mode: local-only, remote-only, or hybrid
    #[arg(long, global = true, default_value = "hybrid")]
    mode: TrackingMode,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one detection against a still image and print the result
    Detect {
        /// Image file to detect against
        image: PathBuf,
    },
    /// Run the tracking loop against a still image
    Track {
        image: PathBuf,
        /// Local polling period in milliseconds
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
        /// Number of results to collect before stopping
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
    /// Detect and compute an accessory placement transform
    Transform {
        image: PathBuf,
        /// Accessory category: glasses or hat
        #[arg(long, default_value = "glasses")]
        category: String,
        /// Screen-to-world mapping: linear or centered
        #[arg(long, default_value = "linear")]
        strategy: String,
        /// Treat the feed as mirrored
        #[arg(long)]
        mirrored: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let scheduler = build_scheduler(cli.model.as_deref(), &cli.endpoint, cli.mode)?;

    match cli.command {
        Commands::Detect { image } => {
            let frame = load_frame(&image)?;
            match scheduler.detect_once(&frame).await {
                Some(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                None => println!("no face detected"),
            }
        }
        Commands::Track {
            image,
            interval_ms,
            count,
        } => {
            let frame = load_frame(&image)?;
            let frames = Arc::new(StaticFrameSource::new(frame));
            let mut rx = scheduler.start(frames, Duration::from_millis(interval_ms));
            for i in 0..count {
                let Some(result) = rx.recv().await else {
                    break;
                };
                println!(
                    "[{i}] source={:?} confidence={:.3} eye_distance={:.1}",
                    result.source, result.confidence, result.measurements.eye_distance
                );
            }
            scheduler.stop();
            println!(
                "{}",
                serde_json::to_string_pretty(&scheduler.performance_stats())?
            );
        }
        Commands::Transform {
            image,
            category,
            strategy,
            mirrored,
        } => {
            let frame = load_frame(&image)?;
            let canvas = CanvasSize {
                width: frame.width as f64,
                height: frame.height as f64,
            };
            let result = scheduler
                .detect_once(&frame)
                .await
                .context("no face detected")?;
            let options = PlacementOptions {
                strategy: parse_strategy(&strategy)?,
                mirrored,
                ..Default::default()
            };
            let transform =
                compute_transform(&result, parse_category(&category)?, canvas, &options);
            println!("{}", serde_json::to_string_pretty(&transform)?);
        }
    }

    Ok(())
}

fn build_scheduler(
    model: Option<&str>,
    endpoint: &str,
    mode: TrackingMode,
) -> Result<HybridScheduler> {
    let remote = Arc::new(RemoteProvider::new(endpoint));
    let local = match (mode, model) {
        (TrackingMode::RemoteOnly, _) => {
            // Never polled, but the scheduler wants both seams filled.
            Arc::new(RemoteProvider::new(endpoint)) as Arc<dyn tryon_providers::DetectionProvider>
        }
        (_, Some(path)) => Arc::new(LocalProvider::load(path)?) as _,
        (_, None) => anyhow::bail!("--model is required for local-only and hybrid modes"),
    };

    let config = TrackerConfig {
        mode,
        ..TrackerConfig::from_env()
    };
    Ok(HybridScheduler::new(local, remote, config))
}

fn load_frame(path: &PathBuf) -> Result<RawFrame> {
    let img = image::open(path)
        .with_context(|| format!("failed to open image: {}", path.display()))?
        .to_rgb8();
    let (width, height) = img.dimensions();
    Ok(RawFrame::rgb(img.into_raw(), width, height))
}

fn parse_category(s: &str) -> Result<AccessoryCategory> {
    match s {
        "glasses" => Ok(AccessoryCategory::Glasses),
        "hat" => Ok(AccessoryCategory::Hat),
        other => anyhow::bail!("unknown accessory category: {other}"),
    }
}

fn parse_strategy(s: &str) -> Result<MappingStrategy> {
    match s {
        "linear" => Ok(MappingStrategy::Linear),
        "centered" => Ok(MappingStrategy::Centered),
        other => anyhow::bail!("unknown mapping strategy: {other}"),
    }
}
