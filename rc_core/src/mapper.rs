//! Normalized motion to calibrated pulse widths.
//!
//! Each call runs expo shaping, the dead-zone split (throttle) or piecewise
//! interpolation (steer), the per-tick ramp limiter and a final clamp to the
//! channel's absolute range. Calibration is read from the shared handle on
//! every call.

use crate::calibration::{CalibrationHandle, MotorCalibration, ServoCalibration};
use crate::config::MapperCfg;

/// Curved magnitudes at or below this map to the neutral pulse.
pub const DEAD_ZONE: f32 = 0.01;

#[derive(Debug, Clone)]
pub struct Mapper {
    cfg: MapperCfg,
    calibration: CalibrationHandle,
    esc_pulse_us: u16,
    steer_pulse_us: u16,
}

impl Mapper {
    /// Ramp anchors start at the current neutral and center pulses.
    pub fn new(cfg: MapperCfg, calibration: CalibrationHandle) -> Self {
        let cal = calibration.snapshot();
        Self {
            cfg,
            calibration,
            esc_pulse_us: cal.motor.neutral_pulse_us,
            steer_pulse_us: cal.servo.center_pulse_us,
        }
    }

    pub fn map_throttle_to_pulse(&mut self, speed: f32) -> u16 {
        let motor = self.calibration.motor();
        let curved = apply_expo(speed, self.cfg.throttle_expo);
        let target = throttle_target(&motor, curved);
        let next = ramp_toward(self.esc_pulse_us, target, self.cfg.max_esc_ramp_per_tick)
            .clamp(motor.min_pulse_us, motor.max_pulse_us);
        self.esc_pulse_us = next;
        next
    }

    pub fn map_steer_to_pulse(&mut self, steer: f32) -> u16 {
        let servo = self.calibration.servo();
        let curved = apply_expo(steer, self.cfg.steer_expo);
        let target = steer_target(&servo, curved);
        let next = ramp_toward(self.steer_pulse_us, target, self.cfg.max_steer_ramp_per_tick)
            .clamp(servo.min_pulse_us, servo.max_pulse_us);
        self.steer_pulse_us = next;
        next
    }

    /// Snap both anchors back to the current neutral and center.
    pub fn reset(&mut self) {
        let cal = self.calibration.snapshot();
        self.esc_pulse_us = cal.motor.neutral_pulse_us;
        self.steer_pulse_us = cal.servo.center_pulse_us;
    }

    pub fn current_esc(&self) -> u16 {
        self.esc_pulse_us
    }

    pub fn current_steer(&self) -> u16 {
        self.steer_pulse_us
    }

    pub fn cfg(&self) -> &MapperCfg {
        &self.cfg
    }

    pub fn calibration(&self) -> &CalibrationHandle {
        &self.calibration
    }
}

/// `|v|(1-e) + |v|^3 e` with the sign of `v` restored. `v` is clamped to
/// `[-1, 1]` and `e` to `[0, 1]`; non-finite input maps to 0.
pub fn apply_expo(v: f32, e: f32) -> f32 {
    if !v.is_finite() {
        return 0.0;
    }
    let v = v.clamp(-1.0, 1.0);
    let e = if e.is_finite() { e.clamp(0.0, 1.0) } else { 0.0 };
    let a = v.abs();
    let curved = a.mul_add(1.0 - e, a * a * a * e);
    curved.copysign(v)
}

/// Unramped ESC pulse for an already-curved throttle value.
pub fn throttle_target(motor: &MotorCalibration, curved: f32) -> u16 {
    if !curved.is_finite() || curved.abs() <= DEAD_ZONE {
        return motor.neutral_pulse_us;
    }
    let c = curved.clamp(-1.0, 1.0);
    if c > 0.0 {
        let span = i32::from(motor.forward_max_pulse_us) - i32::from(motor.forward_min_pulse_us);
        offset(motor.forward_min_pulse_us, c, span)
    } else {
        // c -> 0- gives reverse_max (the dead-band edge), c = -1 gives reverse_min.
        let span = i32::from(motor.reverse_max_pulse_us) - i32::from(motor.reverse_min_pulse_us);
        offset(motor.reverse_max_pulse_us, c, span)
    }
}

/// Unramped servo pulse for an already-curved steer value.
pub fn steer_target(servo: &ServoCalibration, curved: f32) -> u16 {
    if !curved.is_finite() {
        return servo.center_pulse_us;
    }
    let c = curved.clamp(-1.0, 1.0);
    let center = i32::from(servo.center_pulse_us);
    if c < 0.0 {
        offset(servo.center_pulse_us, -c, i32::from(servo.left_pulse_us) - center)
    } else {
        offset(servo.center_pulse_us, c, i32::from(servo.right_pulse_us) - center)
    }
}

/// Move from `current` toward `target` by at most `max_step`.
pub fn ramp_toward(current: u16, target: u16, max_step: u16) -> u16 {
    if target > current {
        current.saturating_add(max_step).min(target)
    } else {
        current.saturating_sub(max_step).max(target)
    }
}

/// `base + round(fraction * span)`, saturated to `u16`.
#[allow(clippy::cast_possible_truncation)]
fn offset(base: u16, fraction: f32, span: i32) -> u16 {
    #[allow(clippy::cast_precision_loss)]
    let delta = (fraction * span as f32).round() as i32;
    let v = i32::from(base) + delta;
    u16::try_from(v.clamp(0, i32::from(u16::MAX))).unwrap_or(base)
}
