//! Kinematic driver state machine.
//!
//! Holds normalized `speed` in `[-max_reverse_speed, 1]` and `steer` in
//! `[-1, 1]` and moves them toward the requested motion each tick. It knows
//! nothing about pulses or calibration.
//!
//! Digital reverse is sequenced: holding backward while moving forward brakes
//! to a full stop (latched) before reverse acceleration may begin, so the
//! motor never sees a direction flip within one tick.

use crate::config::DriverCfg;
use crate::input::ControlInput;

#[derive(Debug, Clone)]
pub struct Driver {
    cfg: DriverCfg,
    speed: f32,
    steer: f32,
    was_braking_from_forward: bool,
}

impl Driver {
    pub fn new(cfg: DriverCfg) -> Self {
        Self {
            cfg,
            speed: 0.0,
            steer: 0.0,
            was_braking_from_forward: false,
        }
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn steer(&self) -> f32 {
        self.steer
    }

    pub fn cfg(&self) -> &DriverCfg {
        &self.cfg
    }

    /// Advance by `delta_seconds`. Without input or without an active deadman
    /// the vehicle coasts to neutral.
    pub fn tick(&mut self, delta_seconds: f32, input: Option<&ControlInput>, deadman_active: bool) {
        let dt = if delta_seconds.is_finite() {
            delta_seconds.max(0.0)
        } else {
            0.0
        };
        match input {
            Some(input) if deadman_active => {
                if input.is_analog() {
                    self.analog(dt, input);
                } else {
                    self.digital(dt, input);
                }
            }
            _ => self.coast_to_neutral(dt),
        }
        self.enforce_bounds();
    }

    pub fn reset(&mut self) {
        self.speed = 0.0;
        self.steer = 0.0;
        self.was_braking_from_forward = false;
    }

    fn analog(&mut self, dt: f32, input: &ControlInput) {
        let max_rev = self.cfg.max_reverse_speed;
        // Reverse target is capped to maneuvering speed; forward is not.
        let target_throttle = finite_or_zero(input.throttle.unwrap_or(0.0)).clamp(-max_rev, 1.0);
        let target_steer = finite_or_zero(input.steer.unwrap_or(0.0)).clamp(-1.0, 1.0);

        let max_throttle_step = self.cfg.accel_rate * dt * 2.0;
        self.speed += (target_throttle - self.speed).clamp(-max_throttle_step, max_throttle_step);
        self.speed = self.speed.clamp(-max_rev, 1.0);

        let max_steer_step = self.cfg.steer_rate * dt * 2.0;
        self.steer += (target_steer - self.steer).clamp(-max_steer_step, max_steer_step);
        self.steer = self.steer.clamp(-1.0, 1.0);
    }

    fn digital(&mut self, dt: f32, input: &ControlInput) {
        self.update_throttle(dt, input.forward, input.backward);
        self.update_steering(dt, input.left, input.right);
    }

    fn update_throttle(&mut self, dt: f32, forward: bool, backward: bool) {
        let c = self.cfg;
        match (forward, backward) {
            (true, false) => {
                self.was_braking_from_forward = false;
                self.speed = (self.speed + c.accel_rate * dt).min(1.0);
            }
            (false, true) => {
                if self.speed > c.reverse_threshold {
                    self.was_braking_from_forward = true;
                    self.speed = (self.speed - c.brake_rate * dt).max(0.0);
                } else if !self.was_braking_from_forward {
                    self.speed = (self.speed - c.reverse_accel_rate * dt).max(-c.max_reverse_speed);
                } else if self.speed <= c.stop_threshold {
                    self.was_braking_from_forward = false;
                    self.speed = 0.0;
                } else {
                    self.speed = (self.speed - c.brake_rate * dt).max(0.0);
                }
            }
            _ => {
                self.was_braking_from_forward = false;
                self.speed = decay(self.speed, c.coast_rate * dt, c.stop_threshold);
            }
        }
    }

    fn update_steering(&mut self, dt: f32, left: bool, right: bool) {
        let c = self.cfg;
        match (left, right) {
            (true, false) => self.steer = (self.steer - c.steer_rate * dt).max(-1.0),
            (false, true) => self.steer = (self.steer + c.steer_rate * dt).min(1.0),
            _ => self.steer = decay(self.steer, c.steer_return_rate * dt, c.stop_threshold),
        }
    }

    fn coast_to_neutral(&mut self, dt: f32) {
        let c = self.cfg;
        self.was_braking_from_forward = false;
        self.speed = decay(self.speed, c.brake_rate * dt, c.stop_threshold);
        self.steer = decay(self.steer, c.steer_return_rate * dt, c.stop_threshold);
    }

    fn enforce_bounds(&mut self) {
        self.speed = finite_or_zero(self.speed).clamp(-self.cfg.max_reverse_speed, 1.0);
        self.steer = finite_or_zero(self.steer).clamp(-1.0, 1.0);
    }
}

/// Move `value` toward 0 by `step`, snapping to exactly 0 inside `stop`.
/// Never crosses zero.
fn decay(value: f32, step: f32, stop: f32) -> f32 {
    if value.abs() < stop {
        return 0.0;
    }
    let next = if value > 0.0 {
        (value - step).max(0.0)
    } else {
        (value + step).min(0.0)
    };
    if next.abs() < stop { 0.0 } else { next }
}

#[inline]
fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() { v } else { 0.0 }
}
