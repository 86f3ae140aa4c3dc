//! Apparel size recommendation from converted measurements.
//!
//! Each chart maps half chest circumference, shoulder width and body length
//! (the hip measurement) to a size; the overall size is the largest of the three.

use serde::{Deserialize, Serialize};

use crate::calibration::{ConvertedMeasurements, LengthUnit};
use crate::measure::Measurement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Size {
    XS,
    S,
    M,
    L,
    XL,
    XXL,
}

impl Size {
    const ORDERED: [Size; 6] = [Size::XS, Size::S, Size::M, Size::L, Size::XL, Size::XXL];

    /// First size whose upper bound exceeds `value`; XXL above the last bound
    fn from_bounds(value: f64, bounds: &[f64; 5]) -> Size {
        bounds
            .iter()
            .position(|&b| value < b)
            .map_or(Size::XXL, |i| Self::ORDERED[i])
    }
}

/// Regional size chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeChart {
    Standard,
    Eu,
    Us,
}

impl SizeChart {
    pub const ALL: [SizeChart; 3] = [SizeChart::Standard, SizeChart::Eu, SizeChart::Us];

    /// Upper bounds (cm) for half chest circumference
    fn chest_bounds(self) -> [f64; 5] {
        match self {
            Self::Standard => [45.5, 48.5, 51.5, 54.5, 57.5],
            Self::Eu => [43.5, 45.5, 47.5, 49.5, 51.5],
            Self::Us => [43.0, 45.5, 48.0, 50.5, 53.5],
        }
    }

    fn shoulder_bounds(self) -> [f64; 5] {
        [41.0, 43.0, 45.0, 47.0, 49.0]
    }

    fn length_bounds(self) -> [f64; 5] {
        [64.5, 67.5, 70.5, 73.0, 75.0]
    }

    /// Overall recommendation; `None` if a required measurement is absent
    pub fn recommend(self, measured: &ConvertedMeasurements) -> Option<Size> {
        let to_cm = measured.unit.to(LengthUnit::Centimeter);
        let cm = |m: Measurement| measured.get(m).map(|v| v * to_cm);

        let chest = cm(Measurement::ChestCircumference)?;
        let shoulder = cm(Measurement::ShoulderWidth)?;
        let length = cm(Measurement::HipLength)?;

        [
            Size::from_bounds(chest / 2.0, &self.chest_bounds()),
            Size::from_bounds(shoulder, &self.shoulder_bounds()),
            Size::from_bounds(length, &self.length_bounds()),
        ]
        .into_iter()
        .max()
    }
}

/// Recommendations for every chart
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SizeRecommendation {
    pub standard: Option<Size>,
    pub eu: Option<Size>,
    pub us: Option<Size>,
}

pub fn recommend_all(measured: &ConvertedMeasurements) -> SizeRecommendation {
    SizeRecommendation {
        standard: SizeChart::Standard.recommend(measured),
        eu: SizeChart::Eu.recommend(measured),
        us: SizeChart::Us.recommend(measured),
    }
}
