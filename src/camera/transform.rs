//! 取得フレームの前処理（左右反転・回転・中央クロップ・リサイズ）
//!
//! 順序: mirror → rotate → crop → resize。
//! 幾何計算は OpenCV なしで使える純粋関数にしてある。

use crate::config::{PipelineConfig, Rotation};

/// 矩形領域（ピクセル）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// 回転後の画像サイズ
pub fn rotated_size(width: u32, height: u32, rotation: Rotation) -> (u32, u32) {
    if rotation.swaps_axes() {
        (height, width)
    } else {
        (width, height)
    }
}

/// 目標アスペクト比で切り出せる最大の中央領域
///
/// 幅・高さは切り捨て、最低1ピクセル。
pub fn center_crop_window(width: u32, height: u32, target_width: u32, target_height: u32) -> CropWindow {
    let full = CropWindow {
        x: 0,
        y: 0,
        width,
        height,
    };
    if target_width == 0 || target_height == 0 || width == 0 || height == 0 {
        return full;
    }

    // 比較は整数で行う（w/h と tw/th の大小）
    let lhs = width as u64 * target_height as u64;
    let rhs = height as u64 * target_width as u64;
    let (cw, ch) = if lhs > rhs {
        // 横に余る → 幅を詰める
        let cw = (height as u64 * target_width as u64 / target_height as u64) as u32;
        (cw.max(1), height)
    } else if lhs < rhs {
        let ch = (width as u64 * target_height as u64 / target_width as u64) as u32;
        (width, ch.max(1))
    } else {
        return full;
    };

    CropWindow {
        x: (width - cw) / 2,
        y: (height - ch) / 2,
        width: cw,
        height: ch,
    }
}

/// パイプライン設定から決まる変換
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTransform {
    pub mirror: bool,
    pub rotation: Rotation,
    pub crop_to_aspect: bool,
    pub target_width: u32,
    pub target_height: u32,
}

impl FrameTransform {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            mirror: config.mirror,
            rotation: config.rotation,
            crop_to_aspect: config.crop_to_aspect,
            target_width: config.target_width,
            target_height: config.target_height,
        }
    }

    /// 入力サイズに対するクロップ領域（クロップ無効なら `None`）
    pub fn crop_window(&self, width: u32, height: u32) -> Option<CropWindow> {
        if !self.crop_to_aspect {
            return None;
        }
        let (rw, rh) = rotated_size(width, height, self.rotation);
        let window = center_crop_window(rw, rh, self.target_width, self.target_height);
        (window.width != rw || window.height != rh).then_some(window)
    }

    /// 出力サイズは常に目標解像度
    pub fn output_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }
}

#[cfg(feature = "desktop")]
mod apply {
    use opencv::core::{self, Mat, Rect, Size};
    use opencv::imgproc;
    use opencv::prelude::*;

    use super::FrameTransform;
    use crate::config::Rotation;
    use crate::Result;

    impl FrameTransform {
        /// BGR フレームに変換を適用する
        pub fn apply(&self, frame: &Mat) -> Result<Mat> {
            // クロップ領域は回転後のサイズに対して決まる
            let crop = self.crop_window(frame.cols() as u32, frame.rows() as u32);
            let mut current = frame.try_clone()?;

            if self.mirror {
                let mut flipped = Mat::default();
                core::flip(&current, &mut flipped, 1)?;
                current = flipped;
            }

            let code = match self.rotation {
                Rotation::None => None,
                Rotation::Clockwise90 => Some(core::ROTATE_90_CLOCKWISE),
                Rotation::Rotate180 => Some(core::ROTATE_180),
                Rotation::Clockwise270 => Some(core::ROTATE_90_COUNTERCLOCKWISE),
            };
            if let Some(code) = code {
                let mut rotated = Mat::default();
                core::rotate(&current, &mut rotated, code)?;
                current = rotated;
            }

            if let Some(w) = crop {
                let roi = Rect::new(w.x as i32, w.y as i32, w.width as i32, w.height as i32);
                let cropped = Mat::roi(&current, roi)?.try_clone()?;
                current = cropped;
            }

            let (tw, th) = self.output_size();
            if current.cols() as u32 == tw && current.rows() as u32 == th {
                return Ok(current);
            }
            let mut resized = Mat::default();
            imgproc::resize(
                &current,
                &mut resized,
                Size::new(tw as i32, th as i32),
                0.0,
                0.0,
                imgproc::INTER_LINEAR,
            )?;
            Ok(resized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Preset;

    #[test]
    fn test_portrait_crop_from_landscape_capture() {
        // 1920x1080 から 9:16
        let w = center_crop_window(1920, 1080, 720, 1280);
        assert_eq!(
            w,
            CropWindow {
                x: 656,
                y: 0,
                width: 607,
                height: 1080
            }
        );
    }

    #[test]
    fn test_crop_trims_height_for_tall_input() {
        let w = center_crop_window(1000, 1000, 2, 1);
        assert_eq!(
            w,
            CropWindow {
                x: 0,
                y: 250,
                width: 1000,
                height: 500
            }
        );
    }

    #[test]
    fn test_same_aspect_is_full_frame() {
        let w = center_crop_window(1920, 1080, 1280, 720);
        assert_eq!((w.x, w.y, w.width, w.height), (0, 0, 1920, 1080));
        assert_eq!(center_crop_window(640, 480, 0, 0).width, 640);
    }

    #[test]
    fn test_rotated_size() {
        assert_eq!(rotated_size(1920, 1080, Rotation::Clockwise90), (1080, 1920));
        assert_eq!(rotated_size(1920, 1080, Rotation::Rotate180), (1920, 1080));
        assert_eq!(rotated_size(1920, 1080, Rotation::Clockwise270), (1080, 1920));
    }

    #[test]
    fn test_preset_transforms() {
        let landscape = FrameTransform::from_config(&PipelineConfig::preset(Preset::Landscape));
        assert_eq!(landscape.crop_window(1080, 720), None);
        assert_eq!(landscape.output_size(), (1080, 720));

        let portrait = FrameTransform::from_config(&PipelineConfig::preset(Preset::Portrait));
        assert_eq!(portrait.crop_window(1920, 1080).map(|w| w.width), Some(607));
        assert_eq!(portrait.output_size(), (720, 1280));
    }

    #[test]
    fn test_rotation_before_crop() {
        let mut config = PipelineConfig::preset(Preset::Portrait);
        config.rotation = Rotation::Clockwise90;
        let t = FrameTransform::from_config(&config);
        // 回転後 1080x1920 は既に 9:16
        assert_eq!(t.crop_window(1920, 1080), None);

        config.target_width = 1080;
        config.target_height = 1080;
        let t = FrameTransform::from_config(&config);
        let w = t.crop_window(1920, 1080).unwrap();
        assert_eq!((w.x, w.y, w.width, w.height), (0, 420, 1080, 1080));
    }

    #[cfg(feature = "desktop")]
    #[test]
    fn test_apply_crops_then_resizes() {
        use opencv::core::{Mat, Scalar, CV_8UC3};
        use opencv::prelude::*;

        let frame = Mat::new_rows_cols_with_default(1080, 1920, CV_8UC3, Scalar::all(0.0)).unwrap();
        let portrait = FrameTransform::from_config(&PipelineConfig::preset(Preset::Portrait));
        let out = portrait.apply(&frame).unwrap();
        assert_eq!((out.cols(), out.rows()), (720, 1280));

        let mut config = PipelineConfig::preset(Preset::Portrait);
        config.rotation = Rotation::Clockwise90;
        config.target_width = 1080;
        config.target_height = 1080;
        let square = FrameTransform::from_config(&config);
        let out = square.apply(&frame).unwrap();
        assert_eq!((out.cols(), out.rows()), (1080, 1080));
    }
}
