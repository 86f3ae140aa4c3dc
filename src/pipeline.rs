//! フレームループ: 取得 → 変換 → 姿勢推定 → 採寸 → 描画 → JPEG → 配信
//!
//! 専用スレッドで回し続ける。1フレームの失敗はログに出して次のフレームへ進む。

use anyhow::{Context, Result};
use bytes::Bytes;
use log::{debug, info, warn};
use opencv::core::{Mat, Vector};
use opencv::imgcodecs;
use opencv::imgproc;
use opencv::prelude::*;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::camera::{FrameSource, FrameTransform};
use crate::pose::PoseEstimator;
use crate::render::Overlay;
use crate::studio::Studio;

/// フレームを JPEG にエンコード
pub fn jpeg_encode(frame: &Mat, quality: i32) -> crate::Result<Bytes> {
    let params = Vector::from_iter([imgcodecs::IMWRITE_JPEG_QUALITY, quality]);
    let mut buf: Vector<u8> = Vector::new();

    // imencode expects BGR 8UC3; convert BGRA if needed
    let mat = if frame.channels() == 4 {
        let mut bgr = Mat::default();
        imgproc::cvt_color_def(frame, &mut bgr, imgproc::COLOR_BGRA2BGR)?;
        Cow::Owned(bgr)
    } else {
        Cow::Borrowed(frame)
    };

    imgcodecs::imencode(".jpg", &*mat, &mut buf, &params)?;
    Ok(Bytes::from(buf.to_vec()))
}

/// フレームIDが進んだときだけ `latest` を呼ぶ（同じIDならロックもコピーもしない）
fn take_if_new<T>(id: u64, last_id: u64, latest: impl FnOnce() -> Option<T>) -> Option<T> {
    if id == last_id {
        return None;
    }
    latest()
}

pub struct FramePipeline<E: PoseEstimator> {
    source: FrameSource,
    transform: FrameTransform,
    estimator: E,
    overlay: Overlay,
    studio: Arc<Studio>,
    jpeg_quality: i32,
    running: Arc<AtomicBool>,
}

impl<E: PoseEstimator> FramePipeline<E> {
    pub fn new(
        source: FrameSource,
        transform: FrameTransform,
        estimator: E,
        overlay: Overlay,
        studio: Arc<Studio>,
        jpeg_quality: i32,
    ) -> Self {
        Self {
            source,
            transform,
            estimator,
            overlay,
            studio,
            jpeg_quality,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// 停止フラグ（false にするとループを抜ける）
    pub fn running(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// 停止フラグが下りるまでフレームを処理する
    pub fn run(&mut self) {
        let mut last_id = 0;
        let mut fps_counter: u32 = 0;
        let mut process_sum_ms = 0.0;
        let mut fps_timer = Instant::now();
        info!("frame loop started");

        while self.running.load(Ordering::Relaxed) {
            let id = self.source.frame_id();
            let frame = match take_if_new(id, last_id, || self.source.latest()) {
                Some(frame) => frame,
                None => {
                    thread::sleep(Duration::from_millis(2));
                    continue;
                }
            };
            last_id = id;

            let start = Instant::now();
            if let Err(e) = self.process(&frame) {
                warn!("frame {} dropped: {}", id, e);
            }
            process_sum_ms += start.elapsed().as_secs_f64() * 1000.0;

            fps_counter += 1;
            if fps_timer.elapsed() >= Duration::from_secs(1) {
                debug!(
                    "[fps] {} (process={:.1}ms)",
                    fps_counter,
                    process_sum_ms / fps_counter as f64
                );
                fps_counter = 0;
                process_sum_ms = 0.0;
                fps_timer = Instant::now();
            }
        }
        info!("frame loop stopped");
    }

    fn process(&mut self, raw: &Mat) -> crate::Result<()> {
        let mut frame = self.transform.apply(raw)?;
        let width = frame.cols() as u32;
        let height = frame.rows() as u32;

        // 推定失敗は未検出として扱う
        let pose = self.estimator.estimate(&frame).unwrap_or_else(|e| {
            debug!("pose estimation failed: {}", e);
            None
        });

        let view = self.studio.record(pose.as_ref(), width, height);
        if let Some(landmarks) = &view.landmarks {
            self.overlay.draw_pose(&mut frame, landmarks)?;
        }
        self.overlay.draw_measurements(&mut frame, &view.overlay)?;

        // スナップショット用はカウントダウンなし
        let clean = jpeg_encode(&frame, self.jpeg_quality)?;
        let streamed = match view.countdown {
            Some(remaining) => {
                let mut with_countdown = frame.try_clone()?;
                self.overlay.draw_countdown(&mut with_countdown, remaining)?;
                jpeg_encode(&with_countdown, self.jpeg_quality)?
            }
            None => clean.clone(),
        };
        self.studio.publish(clean, streamed);
        Ok(())
    }
}

/// パイプラインを専用スレッドで起動する
pub fn spawn<E: PoseEstimator + 'static>(mut pipeline: FramePipeline<E>) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("frame-loop".into())
        .spawn(move || pipeline.run())
        .context("failed to spawn frame loop")
}
