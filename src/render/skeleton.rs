use crate::pose::{Keypoint, Landmark, Pose};

/// 骨格の接続定義 (開始ランドマーク, 終了ランドマーク)
pub const SKELETON_CONNECTIONS: [(Landmark, Landmark); 16] = [
    // 顔
    (Landmark::LeftEar, Landmark::LeftEye),
    (Landmark::LeftEye, Landmark::Nose),
    (Landmark::Nose, Landmark::RightEye),
    (Landmark::RightEye, Landmark::RightEar),
    // 上半身
    (Landmark::LeftShoulder, Landmark::RightShoulder),
    (Landmark::LeftShoulder, Landmark::LeftElbow),
    (Landmark::LeftElbow, Landmark::LeftWrist),
    (Landmark::RightShoulder, Landmark::RightElbow),
    (Landmark::RightElbow, Landmark::RightWrist),
    // 胴体
    (Landmark::LeftShoulder, Landmark::LeftHip),
    (Landmark::RightShoulder, Landmark::RightHip),
    (Landmark::LeftHip, Landmark::RightHip),
    // 下半身
    (Landmark::LeftHip, Landmark::LeftKnee),
    (Landmark::LeftKnee, Landmark::LeftAnkle),
    (Landmark::RightHip, Landmark::RightKnee),
    (Landmark::RightKnee, Landmark::RightAnkle),
];

/// キーポイントの色 (RGB)
pub const KEYPOINT_COLOR: u32 = 0xFF0000; // 赤

/// 低信頼度キーポイントの色 (RGB)
pub const LOW_CONFIDENCE_COLOR: u32 = 0x808080; // 灰

/// 骨格線の色 (RGB)
pub const SKELETON_COLOR: u32 = 0xFFFFFF; // 白

/// 採寸値テキストの色 (RGB)
pub const TEXT_COLOR: u32 = 0x00FF00; // 緑

/// カウントダウンの色 (RGB)
pub const COUNTDOWN_COLOR: u32 = 0xFF0000; // 赤

/// 両端が閾値以上の接続だけを返す
pub fn visible_connections(pose: &Pose, threshold: f32) -> impl Iterator<Item = (&Keypoint, &Keypoint)> + '_ {
    SKELETON_CONNECTIONS.iter().filter_map(move |(start, end)| {
        let (a, b) = (pose.get(*start), pose.get(*end));
        (a.is_valid(threshold) && b.is_valid(threshold)).then_some((a, b))
    })
}

/// キーポイントの描画色
pub fn keypoint_color(kp: &Keypoint, threshold: f32) -> u32 {
    if kp.is_valid(threshold) {
        KEYPOINT_COLOR
    } else {
        LOW_CONFIDENCE_COLOR
    }
}

/// RGB を (B, G, R) に分解
pub fn rgb_to_bgr(color: u32) -> [u8; 3] {
    let r = ((color >> 16) & 0xFF) as u8;
    let g = ((color >> 8) & 0xFF) as u8;
    let b = (color & 0xFF) as u8;
    [b, g, r]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connections_cover_measured_landmarks() {
        for lm in Landmark::MEASURED {
            assert!(SKELETON_CONNECTIONS
                .iter()
                .any(|(a, b)| *a == lm || *b == lm));
        }
    }

    #[test]
    fn test_visible_connections_skip_undetected_ends() {
        let mut pose = Pose::new([Keypoint::new(0.5, 0.5, 0.9); Landmark::COUNT]);
        assert_eq!(visible_connections(&pose, 0.3).count(), SKELETON_CONNECTIONS.len());

        // 左手首が未検出なら 肘-手首 の1本だけ消える
        pose.set(Landmark::LeftWrist, Keypoint::new(0.0, 0.0, 0.1));
        assert_eq!(visible_connections(&pose, 0.3).count(), SKELETON_CONNECTIONS.len() - 1);
        assert!(visible_connections(&pose, 0.3).all(|(a, b)| a.x != 0.0 && b.x != 0.0));

        // 顔が全部未検出なら顔の4本が消える
        for lm in [Landmark::Nose, Landmark::LeftEye, Landmark::RightEye, Landmark::LeftEar, Landmark::RightEar] {
            pose.set(lm, Keypoint::new(0.0, 0.0, 0.0));
        }
        assert_eq!(visible_connections(&pose, 0.3).count(), SKELETON_CONNECTIONS.len() - 5);
    }

    #[test]
    fn test_keypoint_color_by_confidence() {
        assert_eq!(keypoint_color(&Keypoint::new(0.5, 0.5, 0.3), 0.3), KEYPOINT_COLOR);
        assert_eq!(keypoint_color(&Keypoint::new(0.5, 0.5, 0.29), 0.3), LOW_CONFIDENCE_COLOR);
    }

    #[test]
    fn test_rgb_to_bgr() {
        assert_eq!(rgb_to_bgr(0x00FF00), [0, 255, 0]);
        assert_eq!(rgb_to_bgr(0xFF0000), [0, 0, 255]);
        assert_eq!(rgb_to_bgr(0x102030), [0x30, 0x20, 0x10]);
    }
}
