#[cfg(feature = "desktop")]
pub mod detector;
pub mod keypoint;
#[cfg(feature = "desktop")]
pub mod preprocess;

#[cfg(feature = "desktop")]
pub use detector::MoveNetEstimator;
pub use keypoint::{subject_from_keypoints, Keypoint, Landmark, Pose};
#[cfg(feature = "desktop")]
pub use preprocess::preprocess_for_movenet;

/// 姿勢推定器の境界
///
/// 1回の呼び出しにつき、被写体なし (`None`) か1人分の姿勢を返す。
/// 呼び出し間の平滑化は前提にしない。
#[cfg(feature = "desktop")]
pub trait PoseEstimator: Send {
    fn estimate(&mut self, frame: &opencv::core::Mat) -> crate::Result<Option<Pose>>;
}
