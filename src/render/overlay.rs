//! Text and skeleton overlay for the preview stream.
//!
//! Layout (text, positions) is computed by plain functions; drawing onto an
//! OpenCV image is only available with the `desktop` feature.

use crate::calibration::ConvertedMeasurements;

/// Left margin of the measurement lines
pub const TEXT_X: i32 = 10;
/// Baseline of the first measurement line
pub const LINE_Y0: i32 = 30;
/// Vertical spacing between measurement lines
pub const LINE_SPACING: i32 = 30;

/// One line per measurement, e.g. `Shoulder Width: 10.00 inch` or `Hip Length: N/A`
pub fn measurement_lines(measured: &ConvertedMeasurements) -> Vec<String> {
    let unit = measured.unit.suffix();
    measured
        .iter()
        .map(|(m, value)| match value {
            Some(v) => format!("{}: {:.2} {}", m, v, unit),
            None => format!("{}: N/A", m),
        })
        .collect()
}

/// Baseline origin of the `index`-th measurement line
pub fn line_origin(index: usize) -> (i32, i32) {
    (TEXT_X, LINE_Y0 + index as i32 * LINE_SPACING)
}

pub fn countdown_text(remaining_secs: u64) -> String {
    format!("Snapshot in: {}s", remaining_secs)
}

/// Countdown anchor: 20% from the left, vertically centred
pub fn countdown_origin(width: u32, height: u32) -> (i32, i32) {
    ((width as f64 * 0.2) as i32, (height as f64 * 0.5) as i32)
}

#[cfg(feature = "desktop")]
pub use drawing::Overlay;

#[cfg(feature = "desktop")]
mod drawing {
    use opencv::core::{Mat, Point, Scalar};
    use opencv::imgproc;
    use opencv::prelude::*;

    use super::{countdown_origin, countdown_text, line_origin, measurement_lines};
    use crate::calibration::ConvertedMeasurements;
    use crate::pose::Pose;
    use crate::render::skeleton::{
        keypoint_color, rgb_to_bgr, visible_connections, COUNTDOWN_COLOR, SKELETON_COLOR, TEXT_COLOR,
    };
    use crate::Result;

    fn scalar(color: u32) -> Scalar {
        let [b, g, r] = rgb_to_bgr(color);
        Scalar::new(b as f64, g as f64, r as f64, 0.0)
    }

    /// OpenCV で採寸値・骨格・カウントダウンを描画する
    #[derive(Debug, Clone, Copy)]
    pub struct Overlay {
        pub draw_skeleton: bool,
        /// これ未満のキーポイントには骨格線を引かない
        pub confidence_threshold: f32,
    }

    impl Overlay {
        pub fn new(draw_skeleton: bool, confidence_threshold: f32) -> Self {
            Self {
                draw_skeleton,
                confidence_threshold,
            }
        }

        pub fn draw_measurements(&self, frame: &mut Mat, measured: &ConvertedMeasurements) -> Result<()> {
            for (i, line) in measurement_lines(measured).iter().enumerate() {
                let (x, y) = line_origin(i);
                imgproc::put_text(
                    frame,
                    line,
                    Point::new(x, y),
                    imgproc::FONT_HERSHEY_SIMPLEX,
                    0.7,
                    scalar(TEXT_COLOR),
                    2,
                    imgproc::LINE_8,
                    false,
                )?;
            }
            Ok(())
        }

        /// 骨格線とキーポイントを描画（`draw_skeleton` が無効なら何もしない）
        pub fn draw_pose(&self, frame: &mut Mat, pose: &Pose) -> Result<()> {
            if !self.draw_skeleton {
                return Ok(());
            }
            let w = frame.cols() as u32;
            let h = frame.rows() as u32;

            for (start, end) in visible_connections(pose, self.confidence_threshold) {
                let (x1, y1) = start.to_pixel(w, h);
                let (x2, y2) = end.to_pixel(w, h);
                imgproc::line(
                    frame,
                    Point::new(x1, y1),
                    Point::new(x2, y2),
                    scalar(SKELETON_COLOR),
                    2,
                    imgproc::LINE_AA,
                    0,
                )?;
            }

            for kp in pose.keypoints.iter() {
                let (px, py) = kp.to_pixel(w, h);
                imgproc::circle(
                    frame,
                    Point::new(px, py),
                    4,
                    scalar(keypoint_color(kp, self.confidence_threshold)),
                    -1,
                    imgproc::LINE_AA,
                    0,
                )?;
            }
            Ok(())
        }

        pub fn draw_countdown(&self, frame: &mut Mat, remaining_secs: u64) -> Result<()> {
            let (x, y) = countdown_origin(frame.cols() as u32, frame.rows() as u32);
            imgproc::put_text(
                frame,
                &countdown_text(remaining_secs),
                Point::new(x, y),
                imgproc::FONT_HERSHEY_SIMPLEX,
                1.5,
                scalar(COUNTDOWN_COLOR),
                3,
                imgproc::LINE_8,
                false,
            )?;
            Ok(())
        }
    }
}
