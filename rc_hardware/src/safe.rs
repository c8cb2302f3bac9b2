//! Pulse-limiting decorator for any `PwmController`.
//!
//! Every duty written through `set_duty_us` is clamped to the channel's
//! configured limits, or to the global fallback range for channels without an
//! entry. `unsafe_set_duty_us` skips the clamp and exists only for the
//! calibration tooling; the control loop never holds a path to it because it
//! only sees the decorator through the `PwmController` trait.

use rc_traits::PwmController;
use std::collections::BTreeMap;
use tracing::warn;

pub const DEFAULT_GLOBAL_MIN_PULSE_US: u16 = 500;
pub const DEFAULT_GLOBAL_MAX_PULSE_US: u16 = 2500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLimits {
    pub min_pulse_us: u16,
    pub max_pulse_us: u16,
    pub name: String,
}

impl ChannelLimits {
    pub fn new(name: impl Into<String>, min_pulse_us: u16, max_pulse_us: u16) -> Self {
        Self {
            min_pulse_us,
            max_pulse_us,
            name: name.into(),
        }
    }
}

#[derive(Debug)]
pub struct SafePwm<C> {
    inner: C,
    limits: BTreeMap<u8, ChannelLimits>,
    global_min_pulse_us: u16,
    global_max_pulse_us: u16,
}

impl<C: PwmController> SafePwm<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            limits: BTreeMap::new(),
            global_min_pulse_us: DEFAULT_GLOBAL_MIN_PULSE_US,
            global_max_pulse_us: DEFAULT_GLOBAL_MAX_PULSE_US,
        }
    }

    pub fn with_channel_limits(mut self, channel: u8, limits: ChannelLimits) -> Self {
        self.limits.insert(channel, limits);
        self
    }

    pub fn with_global_range(mut self, min_pulse_us: u16, max_pulse_us: u16) -> Self {
        self.global_min_pulse_us = min_pulse_us;
        self.global_max_pulse_us = max_pulse_us;
        self
    }

    /// Replace (or add) the limits for one channel, e.g. after a calibration edit.
    pub fn set_channel_limits(&mut self, channel: u8, limits: ChannelLimits) {
        self.limits.insert(channel, limits);
    }

    /// Clamp `duty_us` for `channel` without writing it.
    pub fn clamp(&self, channel: u8, duty_us: u16) -> u16 {
        match self.limits.get(&channel) {
            Some(l) => duty_us.clamp(l.min_pulse_us, l.max_pulse_us.max(l.min_pulse_us)),
            None => duty_us.clamp(
                self.global_min_pulse_us,
                self.global_max_pulse_us.max(self.global_min_pulse_us),
            ),
        }
    }

    /// Write straight to the wrapped controller, bypassing all limits.
    /// Calibration tooling only.
    pub fn unsafe_set_duty_us(
        &mut self,
        channel: u8,
        duty_us: u16,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        warn!(channel, duty_us, "calibration pulse bypassing safety limits");
        self.inner.set_duty_us(channel, duty_us)
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: PwmController> PwmController for SafePwm<C> {
    fn set_duty_us(
        &mut self,
        channel: u8,
        duty_us: u16,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let clamped = self.clamp(channel, duty_us);
        if clamped != duty_us {
            match self.limits.get(&channel) {
                Some(l) => warn!(
                    channel,
                    name = %l.name,
                    requested_us = duty_us,
                    clamped_us = clamped,
                    min_us = l.min_pulse_us,
                    max_us = l.max_pulse_us,
                    "pulse clamped to channel limits"
                ),
                None => warn!(
                    channel,
                    requested_us = duty_us,
                    clamped_us = clamped,
                    min_us = self.global_min_pulse_us,
                    max_us = self.global_max_pulse_us,
                    "pulse clamped to global limits"
                ),
            }
        }
        self.inner.set_duty_us(channel, clamped)
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.inner.close()
    }
}
