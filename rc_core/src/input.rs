//! Client motion intent and the latest-input register shared with the
//! transport side.
//!
//! The slot holds one value: the most recent input plus the instant it was
//! received. Writers replace it, the tick thread reads it; there is no queue.

use crossbeam_utils::atomic::AtomicCell;
use rc_traits::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    Keys,
    Analog,
    Deadman,
}

/// One decoded client sample. Analog values take precedence over the key
/// booleans whenever either is present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlInput {
    #[serde(rename = "type", default)]
    pub kind: InputKind,
    /// Must be true for any motion.
    pub deadman: bool,
    #[serde(default)]
    pub forward: bool,
    #[serde(default)]
    pub backward: bool,
    #[serde(default)]
    pub left: bool,
    #[serde(default)]
    pub right: bool,
    /// Analog throttle in [-1, 1].
    #[serde(default)]
    pub throttle: Option<f32>,
    /// Analog steer in [-1, 1].
    #[serde(default)]
    pub steer: Option<f32>,
    /// Client-side send time (ms since UNIX epoch); informational only.
    #[serde(default)]
    pub timestamp: u64,
}

impl ControlInput {
    pub fn analog(throttle: f32, steer: f32) -> Self {
        Self {
            kind: InputKind::Analog,
            deadman: true,
            forward: false,
            backward: false,
            left: false,
            right: false,
            throttle: Some(throttle),
            steer: Some(steer),
            timestamp: 0,
        }
    }

    pub fn keys(forward: bool, backward: bool, left: bool, right: bool) -> Self {
        Self {
            kind: InputKind::Keys,
            deadman: true,
            forward,
            backward,
            left,
            right,
            throttle: None,
            steer: None,
            timestamp: 0,
        }
    }

    /// Same input with the deadman flag replaced.
    pub fn with_deadman(mut self, deadman: bool) -> Self {
        self.deadman = deadman;
        self
    }

    pub fn is_analog(&self) -> bool {
        self.throttle.is_some() || self.steer.is_some()
    }
}

/// An input together with its receipt time on this host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReceivedInput {
    pub input: ControlInput,
    pub received_at: Instant,
}

/// Single most-recent-value register.
#[derive(Debug, Default)]
pub struct InputSlot {
    cell: AtomicCell<Option<ReceivedInput>>,
}

impl InputSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, received: ReceivedInput) {
        self.cell.store(Some(received));
    }

    pub fn clear(&self) {
        self.cell.store(None);
    }

    pub fn load(&self) -> Option<ReceivedInput> {
        self.cell.load()
    }
}

/// Transport-side writer for the input slot. Cheap to clone; safe to use
/// from any thread, out of phase with the tick loop.
#[derive(Clone)]
pub struct InputHandle {
    slot: Arc<InputSlot>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl std::fmt::Debug for InputHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputHandle")
            .field("latest", &self.slot.load())
            .finish()
    }
}

impl InputHandle {
    pub fn new(slot: Arc<InputSlot>, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self { slot, clock }
    }

    /// Replace the latest input; its receipt time is now.
    pub fn update_input(&self, input: ControlInput) {
        self.slot.store(ReceivedInput {
            input,
            received_at: self.clock.now(),
        });
    }

    /// Client went away: the next tick sees stale input immediately.
    pub fn clear_input(&self) {
        self.slot.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rc_traits::MonotonicClock;

    #[test]
    fn decodes_key_message_with_defaults() {
        let json = r#"{"type":"keys","deadman":true,"forward":true}"#;
        let input: ControlInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.kind, InputKind::Keys);
        assert!(input.forward && !input.backward);
        assert!(!input.is_analog());
    }

    #[test]
    fn decodes_analog_message() {
        let json = r#"{"type":"analog","deadman":true,"throttle":0.5,"steer":null}"#;
        let input: ControlInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.throttle, Some(0.5));
        assert!(input.is_analog());
    }

    #[test]
    fn last_write_wins_and_clear_empties() {
        let slot = Arc::new(InputSlot::new());
        let handle = InputHandle::new(slot.clone(), Arc::new(MonotonicClock::new()));
        handle.update_input(ControlInput::keys(true, false, false, false));
        handle.update_input(ControlInput::analog(0.2, -0.1));
        let got = slot.load().unwrap();
        assert_eq!(got.input.throttle, Some(0.2));
        handle.clear_input();
        assert!(slot.load().is_none());
    }
}
