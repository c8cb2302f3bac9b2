//! Production output sink: writes both pulses to a `PwmController` with
//! bounded retry and error-rate tracking.
//!
//! Failures never leave this type. After `max_attempts` failed attempts the
//! write is dropped, the counters advance and a warning is emitted at most
//! once per `error_cooldown`. When the consecutive count reaches
//! `escalate_after` a single wiring-check error is logged. The next successful
//! write resets the consecutive count.
use crate::calibration::CalibrationHandle;
use crate::config::RetryPolicy;
use rc_traits::{Clock, MonotonicClock, PwmController, PwmOutput};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Snapshot of the sink's fault counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorStats {
    pub consecutive: u64,
    pub total: u64,
}

/// How often the sink actually spoke up about faults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultDiagnostics {
    /// Rate-limited "write failed" warnings.
    pub warnings: u64,
    /// Wiring-check errors; one per fault streak that reaches `escalate_after`.
    pub escalations: u64,
}

/// Shared fault counters; clone to observe a sink that has moved into the
/// tick thread.
#[derive(Debug, Clone, Default)]
pub struct ErrorCounters {
    consecutive: Arc<AtomicU64>,
    total: Arc<AtomicU64>,
    warnings: Arc<AtomicU64>,
    escalations: Arc<AtomicU64>,
}

impl ErrorCounters {
    pub fn stats(&self) -> ErrorStats {
        ErrorStats {
            consecutive: self.consecutive.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
        }
    }

    pub fn diagnostics(&self) -> FaultDiagnostics {
        FaultDiagnostics {
            warnings: self.warnings.load(Ordering::Relaxed),
            escalations: self.escalations.load(Ordering::Relaxed),
        }
    }

    /// Returns the new consecutive count.
    fn record_failure(&self) -> u64 {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.consecutive.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns the consecutive count that was cleared.
    fn record_success(&self) -> u64 {
        self.consecutive.swap(0, Ordering::Relaxed)
    }
}

pub struct RetryingPwmOutput<C: PwmController> {
    controller: C,
    calibration: CalibrationHandle,
    policy: RetryPolicy,
    clock: Arc<dyn Clock + Send + Sync>,
    counters: ErrorCounters,
    last_warn: Option<Instant>,
}

impl<C: PwmController> std::fmt::Debug for RetryingPwmOutput<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingPwmOutput")
            .field("policy", &self.policy)
            .field("errors", &self.counters.stats())
            .finish_non_exhaustive()
    }
}

impl<C: PwmController> RetryingPwmOutput<C> {
    pub fn new(controller: C, calibration: CalibrationHandle, policy: RetryPolicy) -> Self {
        Self::with_clock(controller, calibration, policy, Arc::new(MonotonicClock::new()))
    }

    /// Retry delays go through `clock.sleep`.
    pub fn with_clock(
        controller: C,
        calibration: CalibrationHandle,
        policy: RetryPolicy,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            controller,
            calibration,
            policy,
            clock,
            counters: ErrorCounters::default(),
            last_warn: None,
        }
    }

    pub fn error_stats(&self) -> ErrorStats {
        self.counters.stats()
    }

    pub fn diagnostics(&self) -> FaultDiagnostics {
        self.counters.diagnostics()
    }

    pub fn counters(&self) -> ErrorCounters {
        self.counters.clone()
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    pub fn into_inner(self) -> C {
        self.controller
    }

    fn write(&mut self, channel: u8, us: u16, label: &'static str) {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.controller.set_duty_us(channel, us) {
                Ok(()) => {
                    let cleared = self.counters.record_success();
                    if cleared > 0 {
                        tracing::info!(channel, label, errors = cleared, "PWM output recovered");
                    }
                    return;
                }
                Err(e) => {
                    tracing::trace!(channel, label, attempt, error = %e, "PWM write attempt failed");
                    last_err = Some(e);
                    if attempt < attempts {
                        self.clock.sleep(self.policy.retry_delay);
                    }
                }
            }
        }

        let consecutive = self.counters.record_failure();
        let due = self
            .last_warn
            .is_none_or(|t| self.clock.elapsed_since(t) >= self.policy.error_cooldown);
        if due {
            self.last_warn = Some(self.clock.now());
            self.counters.warnings.fetch_add(1, Ordering::Relaxed);
            let error = last_err.map(|e| e.to_string()).unwrap_or_default();
            tracing::warn!(
                channel,
                label,
                pulse_us = us,
                consecutive,
                total = self.counters.stats().total,
                %error,
                "PWM write failed after retries"
            );
        }
        if consecutive == u64::from(self.policy.escalate_after) {
            self.counters.escalations.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                consecutive,
                "PWM output keeps failing; check PCA9685 power, I2C wiring and address"
            );
        }
    }
}

impl<C: PwmController> PwmOutput for RetryingPwmOutput<C> {
    fn set_esc_pulse_us(&mut self, us: u16) {
        let channel = self.calibration.motor().channel;
        self.write(channel, us, "esc");
    }

    fn set_steer_pulse_us(&mut self, us: u16) {
        let channel = self.calibration.servo().channel;
        self.write(channel, us, "steer");
    }
}
