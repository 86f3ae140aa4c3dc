use log::debug;
use opencv::core::Mat;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use super::keypoint::{subject_from_keypoints, Keypoint, Landmark, Pose};
use super::preprocess::preprocess_for_movenet;
use super::PoseEstimator;
use crate::{Error, Result};

/// MoveNet Lightning を使用した姿勢推定器
pub struct MoveNetEstimator {
    session: Session,
    confidence_threshold: f32,
}

impl MoveNetEstimator {
    /// ONNXモデルを読み込んで初期化
    pub fn new<P: AsRef<Path>>(model_path: P, confidence_threshold: f32) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path.as_ref())?;

        Ok(Self {
            session,
            confidence_threshold,
        })
    }

    /// 前処理済みフレームから17キーポイントを推定（検証なし）
    pub fn detect_raw(&mut self, frame: &Mat) -> Result<Pose> {
        let input = preprocess_for_movenet(frame)?;
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs!["serving_default_input_0" => input_tensor])?;

        let output: ndarray::ArrayViewD<f32> =
            outputs["StatefulPartitionedCall_0"].try_extract_array()?;
        pose_from_output(output.shape(), |i| {
            (output[[0, 0, i, 0]], output[[0, 0, i, 1]], output[[0, 0, i, 2]])
        })
    }
}

/// MoveNet の出力形状 [1, 1, 17, 3] (y, x, confidence)
pub const MOVENET_OUTPUT_SHAPE: [usize; 4] = [1, 1, Landmark::COUNT, 3];

/// 出力形状を確認してから各ランドマークの (y, x, confidence) を読み出す
fn pose_from_output<F>(shape: &[usize], mut read: F) -> Result<Pose>
where
    F: FnMut(usize) -> (f32, f32, f32),
{
    if shape != MOVENET_OUTPUT_SHAPE {
        return Err(Error::Inference(format!(
            "unexpected model output shape {:?}, expected {:?}",
            shape, MOVENET_OUTPUT_SHAPE
        )));
    }
    let mut pose = Pose::default();
    for landmark in Landmark::ALL {
        let (y, x, confidence) = read(landmark as usize);
        pose.set(landmark, Keypoint::new(x, y, confidence));
    }
    Ok(pose)
}

impl PoseEstimator for MoveNetEstimator {
    fn estimate(&mut self, frame: &Mat) -> Result<Option<Pose>> {
        let pose = self.detect_raw(frame)?;
        let avg = pose.average_confidence();
        let subject = subject_from_keypoints(pose, self.confidence_threshold);
        if subject.is_none() {
            debug!("no subject (avg confidence {:.2})", avg);
        }
        Ok(subject)
    }
}
