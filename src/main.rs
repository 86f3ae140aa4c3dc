use anyhow::{Context, Result};
use bodyfit::camera::{FrameSource, FrameTransform};
use bodyfit::config::Config;
use bodyfit::pipeline::{self, FramePipeline};
use bodyfit::pose::MoveNetEstimator;
use bodyfit::render::Overlay;
use bodyfit::server::{self, AppState};
use bodyfit::studio::Studio;
use bodyfit::tryon::TryOnClient;
use log::{info, warn};
use std::sync::atomic::Ordering;
use std::sync::Arc;

const CONFIG_PATH: &str = "bodyfit.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("failed to load {}", config_path))?;

    let filter = if config.verbose { "debug" } else { "info" };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(filter));

    info!("bodyfit ({})", env!("GIT_VERSION"));

    let pipeline_config = config.pipeline.resolve();
    info!(
        "capture {}x{} -> {}x{} (rotation {:?}, mirror {}, crop {})",
        pipeline_config.capture_width,
        pipeline_config.capture_height,
        pipeline_config.target_width,
        pipeline_config.target_height,
        pipeline_config.rotation,
        pipeline_config.mirror,
        pipeline_config.crop_to_aspect,
    );

    let studio = Arc::new(Studio::from_config(&config)?);
    let tryon = TryOnClient::new(&config.tryon)?;
    if !tryon.is_enabled() {
        info!("try-on relay disabled (no [tryon] endpoint)");
    }

    let source = FrameSource::start(
        &config.camera,
        pipeline_config.capture_width,
        pipeline_config.capture_height,
    )?;
    let estimator = MoveNetEstimator::new(&config.model.path, config.model.confidence_threshold)
        .with_context(|| format!("failed to load model {}", config.model.path.display()))?;
    info!("model loaded: {}", config.model.path.display());

    let frame_pipeline = FramePipeline::new(
        source,
        FrameTransform::from_config(&pipeline_config),
        estimator,
        Overlay::new(pipeline_config.draw_skeleton, config.model.confidence_threshold),
        studio.clone(),
        config.server.jpeg_quality,
    );
    let running = frame_pipeline.running();
    let frame_loop = pipeline::spawn(frame_pipeline)?;

    let state = AppState {
        studio,
        tryon: Arc::new(tryon),
        default_snapshot_secs: config.snapshot.default_duration_secs,
    };

    tokio::select! {
        result = server::serve(&config.server.listen_addr, state) => {
            result.with_context(|| format!("HTTP server on {}", config.server.listen_addr))?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    running.store(false, Ordering::Relaxed);
    if frame_loop.join().is_err() {
        warn!("frame loop panicked");
    }
    Ok(())
}
