//! 画像ファイル1枚を採寸して JSON を出力する
//!
//! usage: measure_image <image> [config.toml]

use anyhow::{bail, Context, Result};
use bodyfit::calibration::UnitConverter;
use bodyfit::camera::FrameTransform;
use bodyfit::config::Config;
use bodyfit::measure::MeasurementEngine;
use bodyfit::pose::{MoveNetEstimator, PoseEstimator};
use bodyfit::sizing::recommend_all;
use bodyfit::Error;
use log::info;
use opencv::core::{Mat, Vector};
use opencv::imgcodecs;
use opencv::prelude::*;

const CONFIG_PATH: &str = "bodyfit.toml";

fn decode_image(path: &str) -> bodyfit::Result<Mat> {
    let data = std::fs::read(path)?;
    let buf = Vector::<u8>::from_slice(&data);
    let image = imgcodecs::imdecode(&buf, imgcodecs::IMREAD_COLOR)
        .map_err(|e| Error::ImageDecode(format!("{}: {}", path, e)))?;
    if image.empty() {
        return Err(Error::ImageDecode(format!("{}: not a supported image", path)));
    }
    Ok(image)
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        bail!("usage: {} <image> [config.toml]", args[0]);
    }
    let image_path = &args[1];
    let config_path = args.get(2).map(String::as_str).unwrap_or(CONFIG_PATH);

    let config = Config::load_or_default(config_path)
        .with_context(|| format!("failed to load {}", config_path))?;
    let filter = if config.verbose { "debug" } else { "info" };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(filter));

    let image = decode_image(image_path)?;
    // 静止画は鏡像にしない。回転・クロップ・リサイズは設定どおり
    let mut transform = FrameTransform::from_config(&config.pipeline.resolve());
    transform.mirror = false;
    let frame = transform.apply(&image)?;
    info!(
        "{}: {}x{} -> {}x{}",
        image_path,
        image.cols(),
        image.rows(),
        frame.cols(),
        frame.rows()
    );

    let mut estimator = MoveNetEstimator::new(&config.model.path, config.model.confidence_threshold)
        .with_context(|| format!("failed to load model {}", config.model.path.display()))?;
    let pose = estimator.estimate(&frame)?;
    if pose.is_none() {
        info!("no subject detected");
    }

    let engine = MeasurementEngine::new(config.measurement);
    let pixels = engine.measure(pose.as_ref(), frame.cols() as u32, frame.rows() as u32);
    let converted = UnitConverter::new(config.calibration.unit).convert(
        &pixels,
        &config.calibration.table()?,
        config.display.api_unit,
    );

    let output = serde_json::json!({
        "image": image_path,
        "unit": config.display.api_unit,
        "pixels": pixels,
        "measurements": converted,
        "size": recommend_all(&converted),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
