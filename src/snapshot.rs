//! Timed "countdown then capture" state machine.
//!
//! `Idle -> Countdown` on [`SnapshotController::begin`], back to `Idle` when the
//! returned ticket is dropped. A second request while counting down is rejected
//! with [`Error::SnapshotBusy`]. The wait is an async timer that can be cancelled.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Observable controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SnapshotState {
    Idle,
    Countdown { duration_secs: u64, remaining_secs: u64 },
}

#[derive(Debug, Clone)]
struct SnapshotRequest {
    id: u64,
    duration_secs: u64,
    started_at: Instant,
    cancel: CancellationToken,
}

impl SnapshotRequest {
    /// Requested duration minus whole elapsed seconds, floored at zero
    fn remaining_secs(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.started_at).as_secs();
        self.duration_secs.saturating_sub(elapsed)
    }
}

#[derive(Debug, Default)]
pub struct SnapshotController {
    active: Mutex<Option<SnapshotRequest>>,
    next_id: AtomicU64,
}

impl SnapshotController {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<SnapshotRequest>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a countdown, or fail if one is already running
    pub fn begin(&self, duration_secs: u64) -> Result<SnapshotTicket<'_>> {
        let mut active = self.lock();
        if active.is_some() {
            return Err(Error::SnapshotBusy);
        }

        let request = SnapshotRequest {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            duration_secs,
            started_at: Instant::now(),
            cancel: CancellationToken::new(),
        };
        let ticket = SnapshotTicket {
            controller: self,
            id: request.id,
            duration: Duration::from_secs(duration_secs),
            cancel: request.cancel.clone(),
        };
        *active = Some(request);
        Ok(ticket)
    }

    /// Abort the running countdown. Returns false when idle.
    pub fn cancel(&self) -> bool {
        match self.lock().as_ref() {
            Some(request) => {
                request.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn state(&self, now: Instant) -> SnapshotState {
        match self.lock().as_ref() {
            Some(request) => SnapshotState::Countdown {
                duration_secs: request.duration_secs,
                remaining_secs: request.remaining_secs(now),
            },
            None => SnapshotState::Idle,
        }
    }

    /// Seconds left for the overlay, `None` when idle
    pub fn countdown_remaining(&self, now: Instant) -> Option<u64> {
        self.lock().as_ref().map(|r| r.remaining_secs(now))
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    fn finish(&self, id: u64) {
        let mut active = self.lock();
        if active.as_ref().is_some_and(|r| r.id == id) {
            *active = None;
        }
    }
}

/// Proof of an active countdown. Dropping it returns the controller to idle.
#[derive(Debug)]
pub struct SnapshotTicket<'a> {
    controller: &'a SnapshotController,
    id: u64,
    duration: Duration,
    cancel: CancellationToken,
}

impl SnapshotTicket<'_> {
    /// Wait for the countdown to elapse without blocking the runtime
    pub async fn wait(&self) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::SnapshotCancelled),
            _ = tokio::time::sleep(self.duration) => Ok(()),
        }
    }
}

impl Drop for SnapshotTicket<'_> {
    fn drop(&mut self) {
        self.controller.finish(self.id);
    }
}
