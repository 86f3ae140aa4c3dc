use ndarray::Array4;
use opencv::{
    core::{Mat, Size},
    imgproc,
    prelude::*,
};

use crate::{Error, Result};

/// MoveNet Lightning の入力サイズ
pub const MOVENET_INPUT_SIZE: i32 = 192;

/// BGR フレームを MoveNet の入力テンソル `[1, 192, 192, 3]` (RGB, 0.0-255.0) に変換
///
/// アスペクト比は保たずに引き伸ばす。出力座標はフレーム全体に対する正規化座標になる。
pub fn preprocess_for_movenet(frame: &Mat) -> Result<Array4<f32>> {
    let mut resized = Mat::default();
    imgproc::resize(
        frame,
        &mut resized,
        Size::new(MOVENET_INPUT_SIZE, MOVENET_INPUT_SIZE),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;

    let mut rgb = Mat::default();
    imgproc::cvt_color_def(&resized, &mut rgb, imgproc::COLOR_BGR2RGB)?;
    // resize/cvtColor の出力は連続領域なので data_bytes で一括で読める
    let bytes = rgb.data_bytes()?;

    let size = MOVENET_INPUT_SIZE as usize;
    let expected = size * size * 3;
    if bytes.len() != expected {
        return Err(Error::ImageDecode(format!(
            "expected {} bytes of 8-bit RGB, got {}",
            expected,
            bytes.len()
        )));
    }

    let tensor = Array4::from_shape_fn((1, size, size, 3), |(_, y, x, c)| {
        bytes[(y * size + x) * 3 + c] as f32
    });
    Ok(tensor)
}
