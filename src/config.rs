use log::warn;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::calibration::{CalibrationTable, LengthUnit, ReferenceProfile};
use crate::measure::{Measurement, MeasurementFactors};
use crate::{Error, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub model: ModelConfig,
    /// 距離→採寸値の係数
    #[serde(default)]
    pub measurement: MeasurementFactors,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub tryon: TryOnConfig,
    /// debugログを有効化
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// JPEG品質 (0-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: i32,
}

fn default_listen_addr() -> String { "127.0.0.1:5000".to_string() }
fn default_jpeg_quality() -> i32 { 80 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    /// カメラindex
    #[serde(default)]
    pub index: i32,
    /// 読み込み失敗時の待機時間（ミリ秒）
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_retry_backoff_ms() -> u64 { 100 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_path")]
    pub path: PathBuf,
    /// 両肩・両腰の信頼度閾値
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

fn default_model_path() -> PathBuf { PathBuf::from("models/movenet_lightning.onnx") }
fn default_confidence_threshold() -> f32 { 0.3 }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

/// 画像の回転（時計回り）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "u16")]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Rotate180,
    Clockwise270,
}

impl Rotation {
    /// 90度/270度回転では幅と高さが入れ替わる
    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Clockwise90 | Self::Clockwise270)
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(degrees: u16) -> std::result::Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Self::None),
            90 => Ok(Self::Clockwise90),
            180 => Ok(Self::Rotate180),
            270 => Ok(Self::Clockwise270),
            other => Err(format!("rotation must be 0, 90, 180 or 270, got {}", other)),
        }
    }
}

/// 撮影レイアウトのプリセット
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// 1080x720 横長
    #[default]
    Landscape,
    /// 1920x1080で取得し、中央を9:16に切り出して720x1280
    Portrait,
}

/// フレーム処理の設定（プリセット適用後）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub capture_width: u32,
    pub capture_height: u32,
    pub target_width: u32,
    pub target_height: u32,
    pub rotation: Rotation,
    /// 左右反転（鏡像表示）
    pub mirror: bool,
    /// リサイズ前に目標アスペクト比へ中央クロップ
    pub crop_to_aspect: bool,
    pub draw_skeleton: bool,
    /// 未検出フレームでも直前の骨格を描画
    pub persist_landmarks: bool,
    /// 未検出フレームでも直前の採寸値を保持
    pub hold_last_measurements: bool,
}

impl PipelineConfig {
    pub fn preset(preset: Preset) -> Self {
        match preset {
            Preset::Landscape => Self {
                capture_width: 1080,
                capture_height: 720,
                target_width: 1080,
                target_height: 720,
                rotation: Rotation::None,
                mirror: true,
                crop_to_aspect: false,
                draw_skeleton: true,
                persist_landmarks: false,
                hold_last_measurements: true,
            },
            Preset::Portrait => Self {
                capture_width: 1920,
                capture_height: 1080,
                target_width: 720,
                target_height: 1280,
                rotation: Rotation::None,
                mirror: true,
                crop_to_aspect: true,
                draw_skeleton: true,
                persist_landmarks: false,
                hold_last_measurements: true,
            },
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::preset(Preset::default())
    }
}

/// `[pipeline]` セクション。未指定の項目はプリセット値を使う。
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PipelineSection {
    #[serde(default)]
    pub preset: Preset,
    pub capture_width: Option<u32>,
    pub capture_height: Option<u32>,
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
    pub rotation: Option<Rotation>,
    pub mirror: Option<bool>,
    pub crop_to_aspect: Option<bool>,
    pub draw_skeleton: Option<bool>,
    pub persist_landmarks: Option<bool>,
    pub hold_last_measurements: Option<bool>,
}

impl PipelineSection {
    pub fn resolve(&self) -> PipelineConfig {
        let base = PipelineConfig::preset(self.preset);
        PipelineConfig {
            capture_width: self.capture_width.unwrap_or(base.capture_width),
            capture_height: self.capture_height.unwrap_or(base.capture_height),
            target_width: self.target_width.unwrap_or(base.target_width),
            target_height: self.target_height.unwrap_or(base.target_height),
            rotation: self.rotation.unwrap_or(base.rotation),
            mirror: self.mirror.unwrap_or(base.mirror),
            crop_to_aspect: self.crop_to_aspect.unwrap_or(base.crop_to_aspect),
            draw_skeleton: self.draw_skeleton.unwrap_or(base.draw_skeleton),
            persist_landmarks: self.persist_landmarks.unwrap_or(base.persist_landmarks),
            hold_last_measurements: self
                .hold_last_measurements
                .unwrap_or(base.hold_last_measurements),
        }
    }
}

/// 採寸項目ごとの値（係数・基準サイズ）
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct MeasurementValues {
    pub chest_circumference: f64,
    pub shoulder_width: f64,
    pub hip_length: f64,
    pub thigh_circumference: f64,
}

impl MeasurementValues {
    pub fn pairs(&self) -> [(Measurement, f64); Measurement::COUNT] {
        [
            (Measurement::ChestCircumference, self.chest_circumference),
            (Measurement::ShoulderWidth, self.shoulder_width),
            (Measurement::HipLength, self.hip_length),
            (Measurement::ThighCircumference, self.thigh_circumference),
        ]
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CalibrationConfig {
    /// 係数・基準サイズの単位
    #[serde(default)]
    pub unit: LengthUnit,
    /// 初期係数（1単位あたりのピクセル数）
    #[serde(default = "default_factors")]
    pub factors: MeasurementValues,
    /// 基準キャリブレーションの期待値
    #[serde(default = "default_reference")]
    pub reference: MeasurementValues,
    /// 許容誤差（この値以内なら係数を更新しない）
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_factors() -> MeasurementValues {
    let table = CalibrationTable::default();
    MeasurementValues {
        chest_circumference: table.get(Measurement::ChestCircumference),
        shoulder_width: table.get(Measurement::ShoulderWidth),
        hip_length: table.get(Measurement::HipLength),
        thigh_circumference: table.get(Measurement::ThighCircumference),
    }
}

fn default_reference() -> MeasurementValues {
    let reference = ReferenceProfile::default();
    MeasurementValues {
        chest_circumference: reference.sizes.get(Measurement::ChestCircumference),
        shoulder_width: reference.sizes.get(Measurement::ShoulderWidth),
        hip_length: reference.sizes.get(Measurement::HipLength),
        thigh_circumference: reference.sizes.get(Measurement::ThighCircumference),
    }
}

fn default_tolerance() -> f64 { ReferenceProfile::default().tolerance }

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            unit: LengthUnit::default(),
            factors: default_factors(),
            reference: default_reference(),
            tolerance: default_tolerance(),
        }
    }
}

impl CalibrationConfig {
    pub fn table(&self) -> Result<CalibrationTable> {
        CalibrationTable::new(self.factors.pairs())
    }

    pub fn reference_profile(&self) -> ReferenceProfile {
        ReferenceProfile::new(self.reference.pairs(), self.tolerance)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    /// /measurements のデフォルト単位
    #[serde(default = "default_api_unit")]
    pub api_unit: LengthUnit,
    /// 映像に重ねる採寸値の単位
    #[serde(default)]
    pub overlay_unit: LengthUnit,
}

fn default_api_unit() -> LengthUnit { LengthUnit::Centimeter }

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            api_unit: default_api_unit(),
            overlay_unit: LengthUnit::Inch,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotConfig {
    /// duration 未指定時の秒数
    #[serde(default = "default_snapshot_duration")]
    pub default_duration_secs: u64,
}

fn default_snapshot_duration() -> u64 { 3 }

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            default_duration_secs: default_snapshot_duration(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TryOnConfig {
    /// 試着サービスのURL（未設定なら /tryon は無効）
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_tryon_timeout")]
    pub timeout_secs: u64,
    /// 衣服画像が指定されなかったときに使う画像
    #[serde(default)]
    pub default_garment: Option<PathBuf>,
}

fn default_tryon_timeout() -> u64 { 60 }

impl Default for TryOnConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_tryon_timeout(),
            default_garment: None,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// ファイルがなければデフォルト値を使う
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("{} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn validate(&self) -> Result<()> {
        self.calibration.table()?;
        let reference = self.calibration.reference_profile();
        if reference.sizes.iter().any(|(_, v)| !(v.is_finite() && v > 0.0)) {
            return Err(Error::Config("reference sizes must be positive".to_string()));
        }
        if !(self.calibration.tolerance.is_finite() && self.calibration.tolerance >= 0.0) {
            return Err(Error::Config("tolerance must be non-negative".to_string()));
        }
        let factors = &self.measurement;
        if [factors.chest, factors.hip, factors.thigh]
            .iter()
            .any(|f| !(f.is_finite() && *f > 0.0))
        {
            return Err(Error::Config("measurement factors must be positive".to_string()));
        }
        let pipeline = self.pipeline.resolve();
        if pipeline.target_width == 0 || pipeline.target_height == 0 {
            return Err(Error::Config("target resolution must be non-zero".to_string()));
        }
        if !(0..=100).contains(&self.server.jpeg_quality) {
            return Err(Error::Config("jpeg_quality must be within 0-100".to_string()));
        }
        Ok(())
    }
}
