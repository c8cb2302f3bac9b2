//! Simulated PWM controller for development without a PCA9685 attached.

use crate::MAX_CHANNEL;
use crate::error::HwError;
use rc_traits::PwmController;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Log the channel table once every this many writes (~2 s at 50 Hz, two channels).
const LOG_EVERY_N_WRITES: u32 = 200;

/// Records the last duty per channel. Clones share state so a test or the CLI
/// can inspect what the control loop wrote.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPwm {
    channels: Arc<Mutex<BTreeMap<u8, u16>>>,
    writes: Arc<Mutex<u32>>,
}

impl SimulatedPwm {
    pub fn new() -> Self {
        info!("simulated PWM controller initialized");
        Self::default()
    }

    /// Last duty written to `channel`, if any.
    pub fn duty_us(&self, channel: u8) -> Option<u16> {
        self.channels
            .lock()
            .ok()
            .and_then(|m| m.get(&channel).copied())
    }

    /// Snapshot of all channel states.
    pub fn states(&self) -> BTreeMap<u8, u16> {
        self.channels.lock().map(|m| m.clone()).unwrap_or_default()
    }

    fn maybe_log(&self) {
        let Ok(mut n) = self.writes.lock() else {
            return;
        };
        *n += 1;
        if *n >= LOG_EVERY_N_WRITES {
            *n = 0;
            debug!(channels = ?self.states(), "simulated pwm");
        }
    }
}

impl PwmController for SimulatedPwm {
    fn set_duty_us(
        &mut self,
        channel: u8,
        duty_us: u16,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if channel > MAX_CHANNEL {
            return Err(Box::new(HwError::InvalidChannel(channel)));
        }
        if let Ok(mut m) = self.channels.lock() {
            m.insert(channel, duty_us);
        }
        self.maybe_log();
        Ok(())
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!("simulated PWM controller closed");
        if let Ok(mut m) = self.channels.lock() {
            m.clear();
        }
        Ok(())
    }
}
