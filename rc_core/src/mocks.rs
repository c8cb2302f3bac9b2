//! In-memory sinks and controllers for tests and simulation.

use rc_traits::{PwmController, PwmOutput};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

const LOG_EVERY: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pulses {
    esc: u16,
    steer: u16,
}

/// Output sink that keeps the last value per channel. Clones share state, so
/// keep one as a view before handing the sink to the loop.
#[derive(Debug, Clone)]
pub struct RecordingOutput {
    last: Arc<Mutex<Pulses>>,
    history: Arc<Mutex<Vec<(u16, u16)>>>,
    writes: Arc<AtomicU64>,
}

impl Default for RecordingOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self {
            last: Arc::new(Mutex::new(Pulses {
                esc: 1500,
                steer: 1500,
            })),
            history: Arc::new(Mutex::new(Vec::new())),
            writes: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn esc_pulse_us(&self) -> u16 {
        self.last.lock().unwrap_or_else(PoisonError::into_inner).esc
    }

    pub fn steer_pulse_us(&self) -> u16 {
        self.last.lock().unwrap_or_else(PoisonError::into_inner).steer
    }

    /// Total individual channel writes.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// `(esc, steer)` after every steer write; the loop writes esc first.
    pub fn history(&self) -> Vec<(u16, u16)> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn count(&self, channel: &'static str, us: u16) {
        let n = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if n % LOG_EVERY == 0 {
            tracing::debug!(channel, pulse_us = us, writes = n, "recording output");
        }
    }
}

impl PwmOutput for RecordingOutput {
    fn set_esc_pulse_us(&mut self, us: u16) {
        self.last.lock().unwrap_or_else(PoisonError::into_inner).esc = us;
        self.count("esc", us);
    }

    fn set_steer_pulse_us(&mut self, us: u16) {
        let snapshot = {
            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            last.steer = us;
            *last
        };
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((snapshot.esc, snapshot.steer));
        self.count("steer", us);
    }
}

#[derive(Debug, Default)]
struct FlakyState {
    remaining_failures: Option<u64>,
    attempts: u64,
    channels: BTreeMap<u8, u16>,
    closed: bool,
}

/// Controller that fails a set number of times (or forever) before writes
/// start to land.
#[derive(Debug, Clone, Default)]
pub struct FlakyPwm {
    state: Arc<Mutex<FlakyState>>,
}

impl FlakyPwm {
    pub fn failing_first(n: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(FlakyState {
                remaining_failures: Some(n),
                ..FlakyState::default()
            })),
        }
    }

    pub fn always_failing() -> Self {
        Self {
            state: Arc::new(Mutex::new(FlakyState {
                remaining_failures: None,
                ..FlakyState::default()
            })),
        }
    }

    /// Make the next `n` attempts fail; `None` fails until changed again.
    pub fn set_failures(&self, n: Option<u64>) {
        self.lock().remaining_failures = n;
    }

    pub fn attempts(&self) -> u64 {
        self.lock().attempts
    }

    pub fn last(&self, channel: u8) -> Option<u16> {
        self.lock().channels.get(&channel).copied()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FlakyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PwmController for FlakyPwm {
    fn set_duty_us(
        &mut self,
        channel: u8,
        duty_us: u16,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut st = self.lock();
        st.attempts += 1;
        match st.remaining_failures {
            None => return Err(Box::new(std::io::Error::other("injected i2c fault"))),
            Some(0) => {}
            Some(n) => {
                st.remaining_failures = Some(n - 1);
                return Err(Box::new(std::io::Error::other("injected i2c fault")));
            }
        }
        st.channels.insert(channel, duty_us);
        Ok(())
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.lock().closed = true;
        Ok(())
    }
}
