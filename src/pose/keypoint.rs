/// MoveNet の 17 ランドマーク
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum Landmark {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl Landmark {
    pub const COUNT: usize = 17;

    pub const ALL: [Landmark; Landmark::COUNT] = [
        Self::Nose,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEar,
        Self::RightEar,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];

    /// 採寸に必要なランドマーク（両肩・両腰）
    pub const MEASURED: [Landmark; 4] = [
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftHip,
        Self::RightHip,
    ];
}

/// フレーム外として許容する正規化座標のはみ出し幅
pub const COORD_MARGIN: f32 = 0.5;

/// 単一キーポイント
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Keypoint {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0)
    pub y: f32,
    /// 信頼度スコア (0.0〜1.0)
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    /// 信頼度が閾値以上か
    pub fn is_valid(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }

    /// 座標が有限かつフレーム近傍 (`-COORD_MARGIN..=1+COORD_MARGIN`) にあるか
    pub fn is_in_frame(&self) -> bool {
        let range = -COORD_MARGIN..=1.0 + COORD_MARGIN;
        range.contains(&self.x) && range.contains(&self.y)
    }

    /// ピクセル座標に変換（0方向へ切り捨て）
    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        let px = (self.x as f64 * width as f64) as i32;
        let py = (self.y as f64 * height as f64) as i32;
        (px, py)
    }
}

/// 17ランドマークからなる姿勢
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub keypoints: [Keypoint; Landmark::COUNT],
}

impl Pose {
    pub fn new(keypoints: [Keypoint; Landmark::COUNT]) -> Self {
        Self { keypoints }
    }

    /// ランドマークでキーポイントを取得
    pub fn get(&self, landmark: Landmark) -> &Keypoint {
        &self.keypoints[landmark as usize]
    }

    pub fn set(&mut self, landmark: Landmark, keypoint: Keypoint) {
        self.keypoints[landmark as usize] = keypoint;
    }

    /// 全キーポイントの平均信頼度
    pub fn average_confidence(&self) -> f32 {
        let sum: f32 = self.keypoints.iter().map(|k| k.confidence).sum();
        sum / Landmark::COUNT as f32
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            keypoints: [Keypoint::default(); Landmark::COUNT],
        }
    }
}

/// 推定結果を検証し、被写体として扱えるかを判定する
///
/// 両肩・両腰がすべて閾値以上で、座標がフレーム近傍にあるときだけ `Some` を返す。
/// それ以外は「未検出」扱い。
pub fn subject_from_keypoints(pose: Pose, threshold: f32) -> Option<Pose> {
    let complete = Landmark::MEASURED.iter().all(|&lm| {
        let kp = pose.get(lm);
        kp.is_valid(threshold) && kp.is_in_frame()
    });
    complete.then_some(pose)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_count() {
        assert_eq!(Landmark::COUNT, 17);
        assert_eq!(Landmark::ALL.len(), Landmark::COUNT);
        for (i, lm) in Landmark::ALL.iter().enumerate() {
            assert_eq!(*lm as usize, i);
        }
    }

    #[test]
    fn test_keypoint_in_frame() {
        assert!(Keypoint::new(0.0, 1.0, 0.9).is_in_frame());
        assert!(Keypoint::new(-0.5, 1.5, 0.9).is_in_frame());
        assert!(!Keypoint::new(1.6, 0.5, 0.9).is_in_frame());
        assert!(!Keypoint::new(0.5, f32::NAN, 0.9).is_in_frame());
        assert!(!Keypoint::new(f32::INFINITY, 0.5, 0.9).is_in_frame());
    }

    #[test]
    fn test_keypoint_to_pixel_truncates() {
        let kp = Keypoint::new(0.5, 0.25, 1.0);
        assert_eq!(kp.to_pixel(640, 480), (320, 120));

        let kp = Keypoint::new(0.3339, 0.999, 1.0);
        assert_eq!(kp.to_pixel(1080, 720), (360, 719));
    }

    #[test]
    fn test_pose_get_set() {
        let mut pose = Pose::default();
        pose.set(Landmark::Nose, Keypoint::new(0.5, 0.3, 0.9));
        let nose = pose.get(Landmark::Nose);
        assert_eq!(nose.x, 0.5);
        assert_eq!(nose.y, 0.3);
        assert_eq!(nose.confidence, 0.9);
    }

    #[test]
    fn test_subject_requires_shoulders_and_hips() {
        let mut pose = Pose::new([Keypoint::new(0.5, 0.5, 0.9); Landmark::COUNT]);
        assert!(subject_from_keypoints(pose.clone(), 0.5).is_some());

        pose.set(Landmark::RightHip, Keypoint::new(0.5, 0.5, 0.1));
        assert!(subject_from_keypoints(pose, 0.5).is_none());
    }

    #[test]
    fn test_subject_ignores_low_confidence_face() {
        let mut pose = Pose::new([Keypoint::new(0.5, 0.5, 0.9); Landmark::COUNT]);
        pose.set(Landmark::Nose, Keypoint::new(0.5, 0.1, 0.0));
        assert!(subject_from_keypoints(pose, 0.5).is_some());
    }

    #[test]
    fn test_subject_rejects_far_out_of_frame_coordinates() {
        let mut pose = Pose::new([Keypoint::new(0.5, 0.5, 0.9); Landmark::COUNT]);
        pose.set(Landmark::LeftShoulder, Keypoint::new(-3.0e6, 0.3, 0.9));
        pose.set(Landmark::RightShoulder, Keypoint::new(3.0e6, 0.3, 0.9));
        assert!(subject_from_keypoints(pose.clone(), 0.5).is_none());

        pose.set(Landmark::LeftShoulder, Keypoint::new(0.3, 0.3, 0.9));
        pose.set(Landmark::RightShoulder, Keypoint::new(0.7, 0.3, 0.9));
        pose.set(Landmark::LeftHip, Keypoint::new(0.4, f32::NAN, 0.9));
        assert!(subject_from_keypoints(pose, 0.5).is_none());
    }
}
