//! Measurement engine: landmark pairs to pixel-space body measurements.
//!
//! Every value is derived from a 2D distance between two landmarks scaled by a
//! fixed factor. No temporal state: each call reports the current frame only.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::pose::{Keypoint, Landmark, Pose};
use crate::Error;

/// Named body measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Measurement {
    ChestCircumference,
    ShoulderWidth,
    HipLength,
    ThighCircumference,
}

impl Measurement {
    pub const COUNT: usize = 4;

    pub const ALL: [Measurement; Measurement::COUNT] = [
        Self::ChestCircumference,
        Self::ShoulderWidth,
        Self::HipLength,
        Self::ThighCircumference,
    ];

    /// Display name, also used as the JSON key
    pub fn name(self) -> &'static str {
        match self {
            Self::ChestCircumference => "Chest Circumference",
            Self::ShoulderWidth => "Shoulder Width",
            Self::HipLength => "Hip Length",
            Self::ThighCircumference => "Thigh Circumference",
        }
    }

    fn snake_name(self) -> &'static str {
        match self {
            Self::ChestCircumference => "chest_circumference",
            Self::ShoulderWidth => "shoulder_width",
            Self::HipLength => "hip_length",
            Self::ThighCircumference => "thigh_circumference",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Measurement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.name() == s || m.snake_name() == s)
            .ok_or_else(|| Error::InvalidCalibrationInput(format!("unknown measurement '{}'", s)))
    }
}

impl Serialize for Measurement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Measurement {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Fixed table keyed by [`Measurement`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerMeasurement<T> {
    values: [T; Measurement::COUNT],
}

impl<T: Copy> PerMeasurement<T> {
    pub fn from_fn(mut f: impl FnMut(Measurement) -> T) -> Self {
        Self {
            values: Measurement::ALL.map(&mut f),
        }
    }

    pub fn get(&self, m: Measurement) -> T {
        self.values[m.index()]
    }

    pub fn set(&mut self, m: Measurement, value: T) {
        self.values[m.index()] = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Measurement, T)> + '_ {
        Measurement::ALL.into_iter().map(move |m| (m, self.get(m)))
    }
}

/// Per-frame measurements in pixels; an entry is `None` when nothing was detected
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementSet {
    values: PerMeasurement<Option<f64>>,
}

impl MeasurementSet {
    /// All measurements absent
    pub fn empty() -> Self {
        Self {
            values: PerMeasurement::from_fn(|_| None),
        }
    }

    pub fn from_values(values: [(Measurement, f64); Measurement::COUNT]) -> Self {
        let mut set = Self::empty();
        for (m, v) in values {
            set.insert(m, v);
        }
        set
    }

    pub fn get(&self, m: Measurement) -> Option<f64> {
        self.values.get(m)
    }

    /// Negative or non-finite values are stored as absent
    pub fn insert(&mut self, m: Measurement, pixels: f64) {
        let value = (pixels.is_finite() && pixels >= 0.0).then_some(pixels);
        self.values.set(m, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Measurement, Option<f64>)> + '_ {
        self.values.iter()
    }

    /// True when every measurement is absent
    pub fn is_empty(&self) -> bool {
        self.iter().all(|(_, v)| v.is_none())
    }
}

impl Default for MeasurementSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl Serialize for MeasurementSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Measurement::COUNT))?;
        for (m, v) in self.iter() {
            map.serialize_entry(m.name(), &v)?;
        }
        map.end()
    }
}

/// Euclidean distance between two landmarks in pixel space.
///
/// Normalised coordinates are scaled by the image size and truncated to whole
/// pixels before the distance is taken.
pub fn pixel_distance(a: &Keypoint, b: &Keypoint, width: u32, height: u32) -> f64 {
    let (x1, y1) = a.to_pixel(width, height);
    let (x2, y2) = b.to_pixel(width, height);
    // 飽和した座標同士でも溢れないよう f64 で差を取る
    let dx = x2 as f64 - x1 as f64;
    let dy = y2 as f64 - y1 as f64;
    dx.hypot(dy)
}

/// Multipliers that turn a landmark distance into a circumference/width estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementFactors {
    /// Shoulder-to-shoulder width to chest circumference
    pub chest: f64,
    /// Hip-to-hip distance to hip length
    pub hip: f64,
    /// Hip-to-hip distance to thigh circumference
    pub thigh: f64,
}

impl Default for MeasurementFactors {
    fn default() -> Self {
        Self {
            chest: 2.5,
            hip: 1.0,
            thigh: 2.5,
        }
    }
}

/// Converts one detected pose into a [`MeasurementSet`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MeasurementEngine {
    factors: MeasurementFactors,
}

impl MeasurementEngine {
    pub fn new(factors: MeasurementFactors) -> Self {
        Self { factors }
    }

    /// Measure the current frame. `None` (no detection) yields an all-absent set.
    pub fn measure(&self, pose: Option<&Pose>, width: u32, height: u32) -> MeasurementSet {
        let Some(pose) = pose else {
            return MeasurementSet::empty();
        };

        let shoulders = pixel_distance(
            pose.get(Landmark::LeftShoulder),
            pose.get(Landmark::RightShoulder),
            width,
            height,
        );
        let hips = pixel_distance(
            pose.get(Landmark::LeftHip),
            pose.get(Landmark::RightHip),
            width,
            height,
        );

        // Thigh reuses the hip landmarks; kept as-is pending a product decision.
        MeasurementSet::from_values([
            (Measurement::ChestCircumference, (shoulders * self.factors.chest).trunc()),
            (Measurement::ShoulderWidth, shoulders.trunc()),
            (Measurement::HipLength, (hips * self.factors.hip).trunc()),
            (Measurement::ThighCircumference, (hips * self.factors.thigh).trunc()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_pose(ls: (f32, f32), rs: (f32, f32), lh: (f32, f32), rh: (f32, f32)) -> Pose {
        let mut pose = Pose::default();
        pose.set(Landmark::LeftShoulder, Keypoint::new(ls.0, ls.1, 0.9));
        pose.set(Landmark::RightShoulder, Keypoint::new(rs.0, rs.1, 0.9));
        pose.set(Landmark::LeftHip, Keypoint::new(lh.0, lh.1, 0.9));
        pose.set(Landmark::RightHip, Keypoint::new(rh.0, rh.1, 0.9));
        pose
    }

    #[test]
    fn test_pixel_distance_matches_scaled_euclidean() {
        let a = Keypoint::new(0.25, 0.5, 1.0);
        let b = Keypoint::new(0.75, 0.25, 1.0);
        // (270, 360) -> (810, 180)
        let d = pixel_distance(&a, &b, 1080, 720);
        assert_relative_eq!(d, (540.0f64 * 540.0 + 180.0 * 180.0).sqrt());
    }

    #[test]
    fn test_pixel_distance_truncates_coordinates() {
        let a = Keypoint::new(0.0, 0.0, 1.0);
        let b = Keypoint::new(0.0999, 0.0, 1.0);
        // 0.0999 * 100 = 9.99 -> 9
        assert_eq!(pixel_distance(&a, &b, 100, 100), 9.0);
    }

    #[test]
    fn test_pixel_distance_saturated_coordinates() {
        // to_pixel は i32 に飽和する。差は溢れずに有限の距離になる
        let a = Keypoint::new(-1e10, 0.0, 0.9);
        let b = Keypoint::new(1e10, 0.0, 0.9);
        let d = pixel_distance(&a, &b, 1080, 720);
        assert_eq!(d, i32::MAX as f64 - i32::MIN as f64);
    }

    #[test]
    fn test_measure_detected_pose() {
        let engine = MeasurementEngine::default();
        // shoulders 300px apart, hips 200px apart at 1000x1000
        let pose = make_pose((0.35, 0.3), (0.65, 0.3), (0.4, 0.6), (0.6, 0.6));
        let set = engine.measure(Some(&pose), 1000, 1000);

        assert_eq!(set.get(Measurement::ShoulderWidth), Some(300.0));
        assert_eq!(set.get(Measurement::ChestCircumference), Some(750.0));
        assert_eq!(set.get(Measurement::HipLength), Some(200.0));
        assert_eq!(set.get(Measurement::ThighCircumference), Some(500.0));
    }

    #[test]
    fn test_measure_applies_hip_factor() {
        let engine = MeasurementEngine::new(MeasurementFactors {
            chest: 2.6,
            hip: 2.7,
            thigh: 2.5,
        });
        let pose = make_pose((0.35, 0.3), (0.65, 0.3), (0.4, 0.6), (0.6, 0.6));
        let set = engine.measure(Some(&pose), 1000, 1000);
        assert_eq!(set.get(Measurement::HipLength), Some(540.0));
        assert_eq!(set.get(Measurement::ChestCircumference), Some(780.0));
    }

    #[test]
    fn test_measure_truncates_values() {
        let engine = MeasurementEngine::default();
        // shoulders (30, 40) apart -> 50px, chest 125; hips 5px -> thigh 12.5 -> 12
        let pose = make_pose((0.0, 0.0), (0.3, 0.4), (0.0, 0.0), (0.05, 0.0));
        let set = engine.measure(Some(&pose), 100, 100);
        assert_eq!(set.get(Measurement::ShoulderWidth), Some(50.0));
        assert_eq!(set.get(Measurement::ChestCircumference), Some(125.0));
        assert_eq!(set.get(Measurement::ThighCircumference), Some(12.0));
    }

    #[test]
    fn test_no_detection_is_all_absent() {
        let engine = MeasurementEngine::default();
        let set = engine.measure(None, 1080, 720);
        assert!(set.is_empty());
        for m in Measurement::ALL {
            assert_eq!(set.get(m), None);
        }
    }

    #[test]
    fn test_measurement_names_round_trip() {
        for m in Measurement::ALL {
            assert_eq!(m.name().parse::<Measurement>().unwrap(), m);
        }
        assert_eq!(
            "shoulder_width".parse::<Measurement>().unwrap(),
            Measurement::ShoulderWidth
        );
        assert!(matches!(
            "Waist".parse::<Measurement>(),
            Err(Error::InvalidCalibrationInput(_))
        ));
    }

    #[test]
    fn test_insert_rejects_negative() {
        let mut set = MeasurementSet::empty();
        set.insert(Measurement::HipLength, -3.0);
        assert_eq!(set.get(Measurement::HipLength), None);
        set.insert(Measurement::HipLength, f64::NAN);
        assert_eq!(set.get(Measurement::HipLength), None);
    }

    #[test]
    fn test_serialize_uses_display_names_and_null() {
        let mut set = MeasurementSet::empty();
        set.insert(Measurement::ShoulderWidth, 84.0);
        let json = serde_json::to_value(set).unwrap();
        assert_eq!(json["Shoulder Width"], 84.0);
        assert!(json["Chest Circumference"].is_null());
        assert_eq!(json.as_object().unwrap().len(), 4);
    }
}
