//! Shared state between the frame loop and the HTTP handlers.
//!
//! The frame loop is the only writer of measurements, landmarks and frames.
//! Calibration is written by request handlers. All of it sits behind one mutex
//! that is never held across an await point.

use bytes::Bytes;
use log::info;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::watch;

use crate::calibration::{CalibrationTable, ConvertedMeasurements, LengthUnit, ReferenceProfile, UnitConverter};
use crate::config::Config;
use crate::measure::{Measurement, MeasurementEngine, MeasurementSet};
use crate::pose::Pose;
use crate::snapshot::{SnapshotController, SnapshotState};
use crate::{Error, Result};

/// Fixed behaviour of a [`Studio`]
#[derive(Debug, Clone, Copy)]
pub struct StudioSettings {
    pub engine: MeasurementEngine,
    pub converter: UnitConverter,
    pub reference: ReferenceProfile,
    /// Keep the previous measurements when a frame has no detection
    pub hold_last_measurements: bool,
    /// Keep drawing the previous landmarks when a frame has no detection
    pub persist_landmarks: bool,
    pub overlay_unit: LengthUnit,
    pub api_unit: LengthUnit,
}

impl Default for StudioSettings {
    fn default() -> Self {
        Self {
            engine: MeasurementEngine::default(),
            converter: UnitConverter::default(),
            reference: ReferenceProfile::default(),
            hold_last_measurements: true,
            persist_landmarks: false,
            overlay_unit: LengthUnit::Inch,
            api_unit: LengthUnit::Centimeter,
        }
    }
}

struct StudioState {
    /// `None` until the first processed frame
    measurements: Option<MeasurementSet>,
    calibration: CalibrationTable,
    /// Last rendered frame without the countdown, JPEG encoded
    last_frame: Option<Bytes>,
    landmarks: Option<Pose>,
}

/// What the frame loop needs to render one frame
#[derive(Debug, Clone)]
pub struct FrameView {
    pub overlay: ConvertedMeasurements,
    pub landmarks: Option<Pose>,
    /// Seconds left on an active snapshot countdown
    pub countdown: Option<u64>,
}

pub struct Studio {
    settings: StudioSettings,
    state: Mutex<StudioState>,
    snapshot: SnapshotController,
    frames: watch::Sender<Option<Bytes>>,
}

impl Studio {
    pub fn new(settings: StudioSettings, calibration: CalibrationTable) -> Self {
        let (frames, _) = watch::channel(None);
        Self {
            settings,
            state: Mutex::new(StudioState {
                measurements: None,
                calibration,
                last_frame: None,
                landmarks: None,
            }),
            snapshot: SnapshotController::new(),
            frames,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let pipeline = config.pipeline.resolve();
        let settings = StudioSettings {
            engine: MeasurementEngine::new(config.measurement),
            converter: UnitConverter::new(config.calibration.unit),
            reference: config.calibration.reference_profile(),
            hold_last_measurements: pipeline.hold_last_measurements,
            persist_landmarks: pipeline.persist_landmarks,
            overlay_unit: config.display.overlay_unit,
            api_unit: config.display.api_unit,
        };
        Ok(Self::new(settings, config.calibration.table()?))
    }

    pub fn settings(&self) -> &StudioSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, StudioState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- frame loop side ---

    /// Measure one processed frame and return what to draw on it
    pub fn record(&self, pose: Option<&Pose>, width: u32, height: u32) -> FrameView {
        let current = self.settings.engine.measure(pose, width, height);
        let mut state = self.lock();

        if pose.is_some() || !self.settings.hold_last_measurements || state.measurements.is_none() {
            state.measurements = Some(current);
        }
        match pose {
            Some(p) => state.landmarks = Some(p.clone()),
            None if !self.settings.persist_landmarks => state.landmarks = None,
            None => {}
        }

        let shown = state.measurements.unwrap_or_default();
        FrameView {
            overlay: self
                .settings
                .converter
                .convert(&shown, &state.calibration, self.settings.overlay_unit),
            landmarks: state.landmarks.clone(),
            countdown: self.snapshot.countdown_remaining(Instant::now()),
        }
    }

    /// Store the clean frame for snapshots and push the streamed one to viewers
    pub fn publish(&self, clean: Bytes, streamed: Bytes) {
        self.lock().last_frame = Some(clean);
        self.frames.send_replace(Some(streamed));
    }

    // --- request side ---

    pub fn subscribe(&self) -> watch::Receiver<Option<Bytes>> {
        self.frames.subscribe()
    }

    pub fn last_frame(&self) -> Option<Bytes> {
        self.lock().last_frame.clone()
    }

    /// Latest measurements in `unit`; all absent before the first frame
    pub fn measurements(&self, unit: LengthUnit) -> ConvertedMeasurements {
        let state = self.lock();
        let raw = state.measurements.unwrap_or_default();
        self.settings.converter.convert(&raw, &state.calibration, unit)
    }

    pub fn factors(&self) -> CalibrationTable {
        self.lock().calibration
    }

    pub fn override_factor(&self, name: &str, value: f64) -> Result<Measurement> {
        let m = self.lock().calibration.set_by_name(name, value)?;
        info!("[calibration] {} factor set to {}", m, value);
        Ok(m)
    }

    /// Reference calibration against the configured expected sizes
    pub fn calibrate(&self) -> Result<BTreeMap<Measurement, f64>> {
        let mut state = self.lock();
        let measured = state.measurements.ok_or(Error::NoMeasurementsForCalibration)?;
        let updated = state.calibration.calibrate(&measured, &self.settings.reference)?;
        drop(state);

        for (m, factor) in &updated {
            info!("[calibration] {} factor recalibrated to {:.3}", m, factor);
        }
        if updated.is_empty() {
            info!("[calibration] all measurements within tolerance");
        }
        Ok(updated)
    }

    /// Count down `duration_secs`, then return the last clean frame
    pub async fn snapshot(&self, duration_secs: u64) -> Result<Bytes> {
        let ticket = self.snapshot.begin(duration_secs)?;
        info!("[snapshot] countdown {}s", duration_secs);
        ticket.wait().await?;
        let frame = self.last_frame().ok_or(Error::NoFrameAvailable);
        drop(ticket);
        frame
    }

    pub fn cancel_snapshot(&self) -> bool {
        let cancelled = self.snapshot.cancel();
        if cancelled {
            info!("[snapshot] countdown cancelled");
        }
        cancelled
    }

    pub fn snapshot_state(&self) -> SnapshotState {
        self.snapshot.state(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Keypoint, Landmark};
    use approx::assert_relative_eq;
    use std::sync::Arc;
    use std::time::Duration;

    /// shoulders 250px apart, hips 125px apart on a 1000x1000 frame
    fn standing_pose() -> Pose {
        let mut pose = Pose::default();
        pose.set(Landmark::LeftShoulder, Keypoint::new(0.25, 0.25, 0.9));
        pose.set(Landmark::RightShoulder, Keypoint::new(0.5, 0.25, 0.9));
        pose.set(Landmark::LeftHip, Keypoint::new(0.375, 0.5, 0.9));
        pose.set(Landmark::RightHip, Keypoint::new(0.5, 0.5, 0.9));
        pose
    }

    fn studio_with(hold: bool) -> Studio {
        let settings = StudioSettings {
            hold_last_measurements: hold,
            ..StudioSettings::default()
        };
        Studio::new(settings, CalibrationTable::default())
    }

    #[test]
    fn test_record_measures_and_converts() {
        let studio = studio_with(true);
        let view = studio.record(Some(&standing_pose()), 1000, 1000);

        assert_relative_eq!(view.overlay.get(Measurement::ShoulderWidth).unwrap(), 250.0 / 8.4);
        assert!(view.landmarks.is_some());
        assert_eq!(view.countdown, None);
        assert_relative_eq!(
            studio.measurements(LengthUnit::Inch).get(Measurement::HipLength).unwrap(),
            125.0 / 5.8
        );
    }

    #[test]
    fn test_hold_keeps_previous_measurements() {
        let studio = studio_with(true);
        studio.record(Some(&standing_pose()), 1000, 1000);
        let view = studio.record(None, 1000, 1000);

        assert!(view.overlay.get(Measurement::ShoulderWidth).is_some());
        assert!(view.landmarks.is_none());
    }

    #[test]
    fn test_without_hold_absent_frame_clears() {
        let studio = studio_with(false);
        studio.record(Some(&standing_pose()), 1000, 1000);
        studio.record(None, 1000, 1000);

        let converted = studio.measurements(LengthUnit::Centimeter);
        for m in Measurement::ALL {
            assert_eq!(converted.get(m), None);
        }
    }

    #[test]
    fn test_persist_landmarks() {
        let settings = StudioSettings {
            persist_landmarks: true,
            ..StudioSettings::default()
        };
        let studio = Studio::new(settings, CalibrationTable::default());
        studio.record(Some(&standing_pose()), 1000, 1000);
        let view = studio.record(None, 1000, 1000);
        assert_eq!(view.landmarks, Some(standing_pose()));
    }

    #[test]
    fn test_calibrate_before_any_frame_fails() {
        let studio = studio_with(true);
        assert!(matches!(studio.calibrate(), Err(Error::NoMeasurementsForCalibration)));

        // a frame without detection still gives nothing to calibrate against
        studio.record(None, 1000, 1000);
        assert!(matches!(studio.calibrate(), Err(Error::NoMeasurementsForCalibration)));
    }

    #[test]
    fn test_calibrate_updates_factors() {
        let studio = studio_with(true);
        studio.record(Some(&standing_pose()), 1000, 1000);
        let updated = studio.calibrate().unwrap();

        // shoulder 250px / 8.4 = 29.8in vs 17in expected
        assert_relative_eq!(updated[&Measurement::ShoulderWidth], 250.0 / 17.0);
        assert_eq!(studio.factors().get(Measurement::ShoulderWidth), 250.0 / 17.0);
    }

    #[test]
    fn test_override_round_trip() {
        let studio = studio_with(true);
        studio.record(Some(&standing_pose()), 1000, 1000);
        studio.override_factor("Shoulder Width", 25.0).unwrap();
        let inches = studio.measurements(LengthUnit::Inch);
        assert_relative_eq!(inches.get(Measurement::ShoulderWidth).unwrap(), 10.0);

        let before = studio.factors();
        assert!(studio.override_factor("Shoulder Width", -1.0).is_err());
        assert!(studio.override_factor("Wingspan", 2.0).is_err());
        assert_eq!(studio.factors(), before);
    }

    #[tokio::test]
    async fn test_snapshot_without_frame() {
        let studio = studio_with(true);
        assert!(matches!(studio.snapshot(0).await, Err(Error::NoFrameAvailable)));
        assert_eq!(studio.snapshot_state(), SnapshotState::Idle);
    }

    #[tokio::test]
    async fn test_snapshot_zero_duration_returns_last_frame() {
        let studio = studio_with(true);
        studio.publish(Bytes::from_static(b"clean"), Bytes::from_static(b"streamed"));
        let frame = studio.snapshot(0).await.unwrap();
        assert_eq!(&frame[..], b"clean");
    }

    #[tokio::test]
    async fn test_snapshot_sees_frames_published_during_countdown() {
        let studio = Arc::new(studio_with(true));
        studio.publish(Bytes::from_static(b"first"), Bytes::from_static(b"first"));

        let waiter = {
            let studio = Arc::clone(&studio);
            tokio::spawn(async move { studio.snapshot(1).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(matches!(studio.snapshot_state(), SnapshotState::Countdown { .. }));
        assert!(studio.record(None, 10, 10).countdown.is_some());
        studio.publish(Bytes::from_static(b"second"), Bytes::from_static(b"second"));

        let frame = waiter.await.unwrap().unwrap();
        assert_eq!(&frame[..], b"second");
        assert_eq!(studio.snapshot_state(), SnapshotState::Idle);
    }

    #[tokio::test]
    async fn test_concurrent_snapshot_rejected_and_cancel() {
        let studio = Arc::new(studio_with(true));
        studio.publish(Bytes::from_static(b"f"), Bytes::from_static(b"f"));

        let waiter = {
            let studio = Arc::clone(&studio);
            tokio::spawn(async move { studio.snapshot(30).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(studio.snapshot(1).await, Err(Error::SnapshotBusy)));

        assert!(studio.cancel_snapshot());
        assert!(matches!(waiter.await.unwrap(), Err(Error::SnapshotCancelled)));
        assert!(!studio.cancel_snapshot());
    }

    #[tokio::test]
    async fn test_subscribers_receive_streamed_frame() {
        let studio = studio_with(true);
        let mut rx = studio.subscribe();
        studio.publish(Bytes::from_static(b"clean"), Bytes::from_static(b"streamed"));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_deref(), Some(&b"streamed"[..]));
    }
}
