use anyhow::{Context, Result};
use log::{info, warn};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs, VideoCaptureTrait},
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::config::CameraConfig;

/// OpenCVを使用したカメラキャプチャ
pub struct OpenCvCamera {
    capture: VideoCapture,
    width: u32,
    height: u32,
}

impl OpenCvCamera {
    /// 解像度を指定してカメラを開く（実際の解像度はカメラ次第）
    pub fn open(index: i32, width: u32, height: u32) -> Result<Self> {
        let mut capture = VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32)
            .with_context(|| format!("failed to open camera {}", index))?;

        if !capture.is_opened()? {
            anyhow::bail!("Camera {} is not available", index);
        }

        capture.set(videoio::CAP_PROP_FRAME_WIDTH, width as f64)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64)?;
        capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;

        let actual_width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let actual_height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
        info!(
            "[cam{}] opened {}x{} (requested {}x{})",
            index, actual_width, actual_height, width, height
        );

        Ok(Self {
            capture,
            width: actual_width,
            height: actual_height,
        })
    }

    /// 解像度を取得
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// フレームを読み込む（BGR形式）
    pub fn read_frame(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        self.capture
            .read(&mut frame)
            .context("Failed to read frame")?;

        if frame.empty() {
            anyhow::bail!("Empty frame received");
        }

        Ok(frame)
    }
}

/// 別スレッドでカメラキャプチャを行い、最新フレームを提供する
///
/// 読み込みに失敗しても止まらず、`retry_backoff_ms` 待って再試行する。
pub struct FrameSource {
    latest: Arc<Mutex<Option<Mat>>>,
    frame_id: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    width: u32,
    height: u32,
    handle: Option<thread::JoinHandle<()>>,
}

impl FrameSource {
    pub fn start(config: &CameraConfig, width: u32, height: u32) -> Result<Self> {
        let index = config.index;
        let backoff = Duration::from_millis(config.retry_backoff_ms);
        let mut camera = OpenCvCamera::open(index, width, height)?;
        let (w, h) = camera.resolution();

        let latest = Arc::new(Mutex::new(None::<Mat>));
        let latest_ref = latest.clone();
        let frame_id = Arc::new(AtomicU64::new(0));
        let frame_id_ref = frame_id.clone();
        let running = Arc::new(AtomicBool::new(true));
        let running_ref = running.clone();

        let handle = thread::Builder::new()
            .name(format!("camera-{}", index))
            .spawn(move || {
                while running_ref.load(Ordering::Relaxed) {
                    match camera.read_frame() {
                        Ok(frame) => {
                            *latest_ref.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
                            frame_id_ref.fetch_add(1, Ordering::Release);
                        }
                        Err(e) => {
                            warn!("[cam{}] read error: {:#}, retrying in {:?}", index, e, backoff);
                            thread::sleep(backoff);
                        }
                    }
                }
            })
            .context("failed to spawn camera thread")?;

        Ok(Self {
            latest,
            frame_id,
            running,
            width: w,
            height: h,
            handle: Some(handle),
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// 現在のフレームID。新フレームが到着するたびにインクリメントされる。
    pub fn frame_id(&self) -> u64 {
        self.frame_id.load(Ordering::Acquire)
    }

    /// 最新フレームを取得。初回フレーム到着前のみNone。
    pub fn latest(&self) -> Option<Mat> {
        let guard = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(|m| m.clone())
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
