//! Calibration factor table and pixel-to-length conversion.
//!
//! A factor is pixels per calibration unit. Reading a measurement divides the
//! pixel value by its factor and, if requested, rescales to another unit.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::measure::{Measurement, MeasurementSet, PerMeasurement};
use crate::{Error, Result};

const CM_PER_INCH: f64 = 2.54;

/// Physical length unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    #[default]
    #[serde(alias = "in", alias = "inches")]
    Inch,
    #[serde(alias = "cm", alias = "centimeters")]
    Centimeter,
}

impl LengthUnit {
    /// Multiplier converting a length in `self` into `target`
    pub fn to(self, target: LengthUnit) -> f64 {
        match (self, target) {
            (Self::Inch, Self::Centimeter) => CM_PER_INCH,
            (Self::Centimeter, Self::Inch) => 1.0 / CM_PER_INCH,
            _ => 1.0,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Self::Inch => "inch",
            Self::Centimeter => "cm",
        }
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// One strictly positive factor per measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationTable {
    factors: PerMeasurement<f64>,
}

impl CalibrationTable {
    /// Build a table; every factor must be positive and finite
    pub fn new(factors: [(Measurement, f64); Measurement::COUNT]) -> Result<Self> {
        let mut table = Self::default();
        for (m, v) in factors {
            table.set(m, v)?;
        }
        Ok(table)
    }

    pub fn get(&self, m: Measurement) -> f64 {
        self.factors.get(m)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Measurement, f64)> + '_ {
        self.factors.iter()
    }

    /// Direct override. Leaves the table untouched on error.
    pub fn set(&mut self, m: Measurement, value: f64) -> Result<()> {
        validate_factor(m, value)?;
        self.factors.set(m, value);
        Ok(())
    }

    /// Direct override by display name
    pub fn set_by_name(&mut self, name: &str, value: f64) -> Result<Measurement> {
        let m: Measurement = name.parse()?;
        self.set(m, value)?;
        Ok(m)
    }

    /// Reference calibration.
    ///
    /// Every present measurement whose converted value is further than
    /// `reference.tolerance` from the expected size gets the factor
    /// `pixels / expected`. Returns the factors that changed.
    pub fn calibrate(
        &mut self,
        measured: &MeasurementSet,
        reference: &ReferenceProfile,
    ) -> Result<BTreeMap<Measurement, f64>> {
        if measured.is_empty() {
            return Err(Error::NoMeasurementsForCalibration);
        }

        let mut updated = BTreeMap::new();
        for (m, pixels) in measured.iter() {
            let Some(pixels) = pixels else { continue };
            let expected = reference.sizes.get(m);
            let physical = pixels / self.get(m);
            if (physical - expected).abs() <= reference.tolerance {
                continue;
            }
            let factor = pixels / expected;
            // A zero-pixel reading cannot produce a usable factor.
            if validate_factor(m, factor).is_ok() {
                self.factors.set(m, factor);
                updated.insert(m, factor);
            }
        }
        Ok(updated)
    }
}

fn validate_factor(m: Measurement, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidCalibrationInput(format!(
            "factor for '{}' must be a positive number, got {}",
            m, value
        )))
    }
}

impl Default for CalibrationTable {
    /// Pixels per inch at the reference camera distance
    fn default() -> Self {
        Self {
            factors: PerMeasurement::from_fn(|m| match m {
                Measurement::ChestCircumference => 10.2,
                Measurement::ShoulderWidth => 8.4,
                Measurement::HipLength => 5.8,
                Measurement::ThighCircumference => 9.3,
            }),
        }
    }
}

impl Serialize for CalibrationTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Measurement::COUNT))?;
        for (m, v) in self.iter() {
            map.serialize_entry(m.name(), &v)?;
        }
        map.end()
    }
}

/// Expected physical sizes used by reference calibration, in the calibration unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceProfile {
    pub sizes: PerMeasurement<f64>,
    /// Allowed deviation before a factor is recomputed (inclusive)
    pub tolerance: f64,
}

impl ReferenceProfile {
    pub fn new(sizes: [(Measurement, f64); Measurement::COUNT], tolerance: f64) -> Self {
        let mut table = PerMeasurement::from_fn(|_| 0.0);
        for (m, v) in sizes {
            table.set(m, v);
        }
        Self {
            sizes: table,
            tolerance,
        }
    }
}

impl Default for ReferenceProfile {
    /// Reference subject in inches, tolerance one inch
    fn default() -> Self {
        Self::new(
            [
                (Measurement::ChestCircumference, 38.0),
                (Measurement::ShoulderWidth, 17.0),
                (Measurement::HipLength, 14.0),
                (Measurement::ThighCircumference, 22.0),
            ],
            1.0,
        )
    }
}

/// Measurements converted to a physical unit; absent stays absent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvertedMeasurements {
    pub unit: LengthUnit,
    values: PerMeasurement<Option<f64>>,
}

impl ConvertedMeasurements {
    pub fn get(&self, m: Measurement) -> Option<f64> {
        self.values.get(m)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Measurement, Option<f64>)> + '_ {
        self.values.iter()
    }
}

impl Serialize for ConvertedMeasurements {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Measurement::COUNT))?;
        for (m, v) in self.iter() {
            map.serialize_entry(m.name(), &v)?;
        }
        map.end()
    }
}

/// Pixel measurements to physical units
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitConverter {
    /// Unit the calibration factors are expressed in
    pub calibration_unit: LengthUnit,
}

impl UnitConverter {
    pub fn new(calibration_unit: LengthUnit) -> Self {
        Self { calibration_unit }
    }

    pub fn convert(
        &self,
        measured: &MeasurementSet,
        table: &CalibrationTable,
        unit: LengthUnit,
    ) -> ConvertedMeasurements {
        let scale = self.calibration_unit.to(unit);
        ConvertedMeasurements {
            unit,
            values: PerMeasurement::from_fn(|m| measured.get(m).map(|px| px / table.get(m) * scale)),
        }
    }
}
