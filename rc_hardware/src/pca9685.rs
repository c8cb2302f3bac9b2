use std::time::Duration;
use tracing::{debug, info, trace};

use crate::MAX_CHANNEL;
use crate::error::{HwError, Result};

pub const DEFAULT_ADDRESS: u16 = 0x40;

const MODE1: u8 = 0x00;
const PRESCALE: u8 = 0xFE;
const LED0_ON_L: u8 = 0x06;

const MODE1_SLEEP: u8 = 0x10;
const MODE1_AI: u8 = 0x20;
const MODE1_RESTART: u8 = 0x80;
const MODE1_ALLCALL: u8 = 0x01;

const OSC_HZ: u32 = 25_000_000;
const STEPS: u32 = 4096;

fn i2c_err(e: rppal::i2c::Error) -> HwError {
    HwError::I2c(e.to_string())
}

/// PCA9685 16-channel PWM expander on the Raspberry Pi I2C bus.
pub struct Pca9685 {
    i2c: rppal::i2c::I2c,
    frequency_hz: u32,
    closed: bool,
}

impl Pca9685 {
    pub fn open(bus: u8, address: u16, frequency_hz: u32) -> Result<Self> {
        let mut i2c = rppal::i2c::I2c::with_bus(bus).map_err(i2c_err)?;
        i2c.set_slave_address(address).map_err(i2c_err)?;
        let mut dev = Self {
            i2c,
            frequency_hz: frequency_hz.max(1),
            closed: false,
        };
        dev.configure_frequency()?;
        info!(bus, address = format_args!("{address:#04x}"), frequency_hz, "PCA9685 ready");
        Ok(dev)
    }

    fn configure_frequency(&mut self) -> Result<()> {
        let prescale = prescale_for(self.frequency_hz);
        let old_mode = self.i2c.smbus_read_byte(MODE1).map_err(i2c_err)?;
        debug!(mode1 = old_mode, prescale, "PCA9685 set frequency");

        // Prescale can only be written while the oscillator sleeps.
        self.i2c
            .smbus_write_byte(MODE1, (old_mode & !MODE1_RESTART) | MODE1_SLEEP)
            .map_err(i2c_err)?;
        self.i2c.smbus_write_byte(PRESCALE, prescale).map_err(i2c_err)?;
        self.i2c.smbus_write_byte(MODE1, 0x00).map_err(i2c_err)?;
        std::thread::sleep(Duration::from_millis(5));
        self.i2c
            .smbus_write_byte(MODE1, MODE1_RESTART | MODE1_AI | MODE1_ALLCALL)
            .map_err(i2c_err)?;
        Ok(())
    }

    pub fn write_pulse_us(&mut self, channel: u8, pulse_us: u16) -> Result<()> {
        if self.closed {
            return Err(HwError::Closed);
        }
        if channel > MAX_CHANNEL {
            return Err(HwError::InvalidChannel(channel));
        }
        let off = counts_for_pulse(pulse_us, self.frequency_hz);
        let reg = LED0_ON_L + 4 * channel;
        let buf = [reg, 0, 0, (off & 0xFF) as u8, ((off >> 8) & 0x0F) as u8];
        self.i2c.write(&buf).map_err(i2c_err)?;
        trace!(channel, pulse_us, off, "PCA9685 write");
        Ok(())
    }
}

/// Prescale register value for the requested output frequency.
fn prescale_for(frequency_hz: u32) -> u8 {
    let hz = frequency_hz.max(1);
    let raw = (OSC_HZ + (STEPS * hz) / 2) / (STEPS * hz);
    raw.saturating_sub(1).clamp(3, 255) as u8
}

/// OFF count for a pulse of `pulse_us` at `frequency_hz`, capped to 12 bits.
fn counts_for_pulse(pulse_us: u16, frequency_hz: u32) -> u16 {
    let counts = u64::from(pulse_us) * u64::from(frequency_hz) * u64::from(STEPS) / 1_000_000;
    counts.min(u64::from(STEPS - 1)) as u16
}

impl rc_traits::PwmController for Pca9685 {
    fn set_duty_us(
        &mut self,
        channel: u8,
        duty_us: u16,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.write_pulse_us(channel, duty_us)?;
        Ok(())
    }

    fn close(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.closed {
            info!("closing PCA9685");
            // Put the oscillator to sleep; outputs stop toggling.
            self.i2c
                .smbus_write_byte(MODE1, MODE1_SLEEP)
                .map_err(i2c_err)?;
            self.closed = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prescale_for_servo_rate() {
        // 25 MHz / (4096 * 50 Hz) = 122.07 -> 121
        assert_eq!(prescale_for(50), 121);
    }

    #[test]
    fn pulse_counts_at_50hz() {
        // 20 ms frame, 4096 steps => ~4.88 us per count
        assert_eq!(counts_for_pulse(1500, 50), 307);
        assert_eq!(counts_for_pulse(1000, 50), 204);
        assert_eq!(counts_for_pulse(60_000, 50), 4095);
    }
}
