//! Pulse calibration for the two channels and the shared handle the mapper
//! and output sink read on every tick.
//!
//! The configuration owner keeps a clone of `CalibrationHandle` and may swap
//! values at any time; readers take a `snapshot()` per call, so an update is
//! visible on the very next tick.

use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// Steering servo, addressed by pulse width rather than angle so asymmetric
/// left/right throw is representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoCalibration {
    pub channel: u8,
    pub min_pulse_us: u16,
    pub max_pulse_us: u16,
    pub left_pulse_us: u16,
    pub center_pulse_us: u16,
    pub right_pulse_us: u16,
}

impl Default for ServoCalibration {
    fn default() -> Self {
        Self {
            channel: 0,
            min_pulse_us: 1000,
            max_pulse_us: 2000,
            left_pulse_us: 1200,
            center_pulse_us: 1500,
            right_pulse_us: 1800,
        }
    }
}

/// ESC calibration with a dead band between `reverse_max_pulse_us` and
/// `forward_min_pulse_us`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorCalibration {
    pub channel: u8,
    pub min_pulse_us: u16,
    pub max_pulse_us: u16,
    pub neutral_pulse_us: u16,
    pub forward_min_pulse_us: u16,
    pub forward_max_pulse_us: u16,
    pub reverse_max_pulse_us: u16,
    pub reverse_min_pulse_us: u16,
}

impl Default for MotorCalibration {
    fn default() -> Self {
        Self {
            channel: 1,
            min_pulse_us: 1000,
            max_pulse_us: 2000,
            neutral_pulse_us: 1500,
            forward_min_pulse_us: 1550,
            forward_max_pulse_us: 2000,
            reverse_max_pulse_us: 1450,
            reverse_min_pulse_us: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Calibration {
    pub servo: ServoCalibration,
    pub motor: MotorCalibration,
}

/// Partial servo update; `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServoPatch {
    pub min_pulse_us: Option<u16>,
    pub max_pulse_us: Option<u16>,
    pub left_pulse_us: Option<u16>,
    pub center_pulse_us: Option<u16>,
    pub right_pulse_us: Option<u16>,
}

/// Partial motor update; `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default)]
pub struct MotorPatch {
    pub min_pulse_us: Option<u16>,
    pub max_pulse_us: Option<u16>,
    pub neutral_pulse_us: Option<u16>,
    pub forward_min_pulse_us: Option<u16>,
    pub forward_max_pulse_us: Option<u16>,
    pub reverse_max_pulse_us: Option<u16>,
    pub reverse_min_pulse_us: Option<u16>,
}

impl ServoCalibration {
    fn apply(&mut self, p: &ServoPatch) {
        self.min_pulse_us = p.min_pulse_us.unwrap_or(self.min_pulse_us);
        self.max_pulse_us = p.max_pulse_us.unwrap_or(self.max_pulse_us);
        self.left_pulse_us = p.left_pulse_us.unwrap_or(self.left_pulse_us);
        self.center_pulse_us = p.center_pulse_us.unwrap_or(self.center_pulse_us);
        self.right_pulse_us = p.right_pulse_us.unwrap_or(self.right_pulse_us);
    }
}

impl MotorCalibration {
    fn apply(&mut self, p: &MotorPatch) {
        self.min_pulse_us = p.min_pulse_us.unwrap_or(self.min_pulse_us);
        self.max_pulse_us = p.max_pulse_us.unwrap_or(self.max_pulse_us);
        self.neutral_pulse_us = p.neutral_pulse_us.unwrap_or(self.neutral_pulse_us);
        self.forward_min_pulse_us = p.forward_min_pulse_us.unwrap_or(self.forward_min_pulse_us);
        self.forward_max_pulse_us = p.forward_max_pulse_us.unwrap_or(self.forward_max_pulse_us);
        self.reverse_max_pulse_us = p.reverse_max_pulse_us.unwrap_or(self.reverse_max_pulse_us);
        self.reverse_min_pulse_us = p.reverse_min_pulse_us.unwrap_or(self.reverse_min_pulse_us);
    }
}

/// Shared-read, single-writer calibration handle.
#[derive(Debug, Clone, Default)]
pub struct CalibrationHandle {
    inner: Arc<RwLock<Calibration>>,
}

impl CalibrationHandle {
    pub fn new(calibration: Calibration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(calibration)),
        }
    }

    /// Current values. A poisoned lock still yields the last written value.
    pub fn snapshot(&self) -> Calibration {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn servo(&self) -> ServoCalibration {
        self.snapshot().servo
    }

    pub fn motor(&self) -> MotorCalibration {
        self.snapshot().motor
    }

    pub fn replace(&self, calibration: Calibration) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = calibration;
        info!(?calibration, "calibration replaced");
    }

    pub fn update_servo(&self, patch: ServoPatch) -> ServoCalibration {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.servo.apply(&patch);
        let servo = guard.servo;
        drop(guard);
        info!(?servo, "servo calibration updated");
        servo
    }

    pub fn update_motor(&self, patch: MotorPatch) -> MotorCalibration {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.motor.apply(&patch);
        let motor = guard.motor;
        drop(guard);
        info!(?motor, "motor calibration updated");
        motor
    }
}
