use anyhow::{bail, Context, Result};
use camola_overlay::capture::{CaptureSource, StillImageCapture, WebcamCapture};
use camola_overlay::compositing::CompositingPipeline;
use camola_overlay::config::{Anchor, PipelineConfig};
use camola_overlay::output::{Background, LoopbackSurface, V4L2Output};
use camola_overlay::scheduler::FrameScheduler;
use camola_overlay::segmentation::{self, SegmentationEngine, TensorLayout};
use camola_overlay::status::LogStatus;
use clap::Parser;
use image::Rgba;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Use a still image as the camera instead of a webcam
    #[arg(long)]
    input_image: Option<PathBuf>,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Capture resolution width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Output resolution width
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Path to segmentation model (ONNX file)
    /// If not provided, only the skin-tone heuristic is used
    #[arg(long)]
    model: Option<PathBuf>,

    /// Model input width
    #[arg(long, default_value_t = 256)]
    model_width: u32,

    /// Model input height
    #[arg(long, default_value_t = 256)]
    model_height: u32,

    /// Model input tensor layout
    #[arg(long, value_enum, default_value_t = TensorLayout::Nhwc)]
    model_layout: TensorLayout,

    /// Weight of the previous mask when smoothing model output, 0 disables
    #[arg(long, default_value_t = 0.0)]
    temporal_smoothing: f32,

    /// Gaussian blur radius for mask edges
    #[arg(long, default_value_t = 5.0)]
    blur_radius: f32,

    /// Subject height as a fraction of the output height
    #[arg(long, default_value_t = 0.4)]
    scale: f32,

    /// Corner the subject is anchored to
    #[arg(long, value_enum, default_value_t = Anchor::BottomRight)]
    anchor: Anchor,

    /// Overlay opacity in [0, 1]
    #[arg(long, default_value_t = 1.0)]
    opacity: f32,

    /// Do not mirror the camera image
    #[arg(long)]
    no_mirror: bool,

    /// Background image behind the subject
    #[arg(long, conflicts_with = "background_color")]
    background_image: Option<PathBuf>,

    /// Solid background color as RRGGBB
    #[arg(long, default_value = "00b140", value_parser = parse_color)]
    background_color: Rgba<u8>,

    /// Init retries before the model is abandoned
    #[arg(long, default_value_t = 3)]
    max_init_retries: u32,

    /// Consecutive model errors before falling back to the heuristic
    #[arg(long, default_value_t = 3)]
    max_errors: u32,
}

fn parse_color(s: &str) -> Result<Rgba<u8>> {
    let hex = s.trim_start_matches('#');
    if hex.len() != 6 {
        bail!("expected RRGGBB, got {s:?}");
    }
    let value = u32::from_str_radix(hex, 16).with_context(|| format!("invalid color {s:?}"))?;
    Ok(Rgba([(value >> 16) as u8, (value >> 8) as u8, value as u8, 255]))
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.refine.blur_radius = self.blur_radius;
        config.engine.thresholds.max_init_retries = self.max_init_retries;
        config.engine.thresholds.max_errors_before_fallback = self.max_errors;
        config.placement.scale = self.scale;
        config.placement.anchor = self.anchor;
        config.overlay_opacity = self.opacity.clamp(0.0, 1.0);
        config.mirror = !self.no_mirror;
        config.target_fps = self.fps;
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("Camola overlay starting");
    tracing::info!("Output: {}x{}", args.output_width, args.output_height);
    tracing::info!("Target FPS: {}", args.fps);

    match &args.input_image {
        Some(path) => {
            let capture = StillImageCapture::open(path)?;
            run(capture, &args).await
        }
        None => {
            tracing::info!("Capture: {}x{}", args.capture_width, args.capture_height);
            let capture =
                WebcamCapture::new(args.input_device, args.capture_width, args.capture_height)
                    .context("Failed to initialize webcam capture")?;
            run(capture, &args).await
        }
    }
}

async fn run<C: CaptureSource>(capture: C, args: &Args) -> Result<()> {
    let config = args.pipeline_config();

    let background = match &args.background_image {
        Some(path) => Background::open(path)?,
        None => Background::Solid(args.background_color),
    };
    let output = V4L2Output::new(&args.output_device, args.output_width, args.output_height)
        .context("Failed to initialize v4l2loopback output")?;
    let surface = LoopbackSurface::new(output, &background);

    let engine = match &args.model {
        Some(path) => {
            tracing::info!("Using segmentation model {}", path.display());
            let backend = segmentation::create_default_backend(
                path,
                (args.model_width, args.model_height),
                args.model_layout,
            )
            .with_temporal_smoothing(args.temporal_smoothing);
            SegmentationEngine::new(backend, &config)
        }
        None => {
            tracing::info!("No model given, using skin-tone segmentation only");
            SegmentationEngine::heuristic_only(&config)
        }
    };

    let mut pipeline = CompositingPipeline::new(capture, engine, surface, &config);

    let mut scheduler = FrameScheduler::new(config.target_fps);
    if let Some(frames) = args.frames {
        scheduler = scheduler.with_max_ticks(frames);
    }

    let handle = scheduler.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping");
            handle.stop();
        }
    });
    tracing::info!("Press Ctrl+C to stop");

    let report = scheduler
        .run(&mut pipeline, &LogStatus)
        .await
        .context("Overlay pipeline stopped")?;

    tracing::info!(
        "Done: {} frames drawn out of {} ticks",
        report.drawn,
        report.ticks
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_colors() {
        assert_eq!(parse_color("00b140").unwrap(), Rgba([0x00, 0xb1, 0x40, 255]));
        assert_eq!(parse_color("#ffffff").unwrap(), Rgba([255, 255, 255, 255]));
        assert!(parse_color("fff").is_err());
        assert!(parse_color("zzzzzz").is_err());
    }

    #[test]
    fn args_map_onto_pipeline_config() {
        let args = Args::parse_from(["camola-overlay", "--no-mirror", "--anchor", "top-left", "--opacity", "2"]);
        let config = args.pipeline_config();
        assert!(!config.mirror);
        assert_eq!(config.placement.anchor, Anchor::TopLeft);
        assert_eq!(config.overlay_opacity, 1.0);
    }
}
