//! Latest-value telemetry broadcast.
//!
//! Every subscriber owns a capacity-1 channel. Publishing overwrites a value
//! the subscriber has not read yet, so a slow reader only ever sees the most
//! recent snapshot. Nothing published before `subscribe()` is delivered.
use crossbeam_channel as xch;
use crossbeam_utils::atomic::AtomicCell;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Telemetry {
    pub esc_pulse_us: u16,
    pub steer_pulse_us: u16,
    pub speed: f32,
    pub steer: f32,
    pub deadman_active: bool,
    pub stale: bool,
    /// Milliseconds since the UNIX epoch.
    pub timestamp_ms: u64,
}

struct Subscriber {
    tx: xch::Sender<Telemetry>,
    // Second handle on the subscriber's queue, used to evict an unread value.
    drain: xch::Receiver<Telemetry>,
    alive: Weak<()>,
}

#[derive(Default)]
pub struct TelemetryBus {
    subscribers: Mutex<Vec<Subscriber>>,
    latest: AtomicCell<Option<Telemetry>>,
}

impl std::fmt::Debug for TelemetryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryBus")
            .field("subscribers", &self.subscriber_count())
            .field("latest", &self.latest.load())
            .finish()
    }
}

impl TelemetryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> TelemetrySubscription {
        let (tx, rx) = xch::bounded(1);
        let alive = Arc::new(());
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                tx,
                drain: rx.clone(),
                alive: Arc::downgrade(&alive),
            });
        TelemetrySubscription { rx, _alive: alive }
    }

    pub fn publish(&self, snapshot: Telemetry) {
        self.latest.store(Some(snapshot));
        let mut subs = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subs.retain(|s| {
            if s.alive.strong_count() == 0 {
                return false;
            }
            match s.tx.try_send(snapshot) {
                Ok(()) => true,
                Err(xch::TrySendError::Full(v)) => {
                    let _ = s.drain.try_recv();
                    let _ = s.tx.try_send(v);
                    true
                }
                Err(xch::TrySendError::Disconnected(_)) => false,
            }
        });
    }

    /// Most recent snapshot, if any was published.
    pub fn latest(&self) -> Option<Telemetry> {
        self.latest.load()
    }

    /// Live subscribers, after pruning dropped ones on the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.alive.strong_count() > 0)
            .count()
    }
}

/// Receiving end of a telemetry subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct TelemetrySubscription {
    rx: xch::Receiver<Telemetry>,
    _alive: Arc<()>,
}

impl TelemetrySubscription {
    /// Block until the next snapshot.
    pub fn recv(&self) -> Option<Telemetry> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Telemetry> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn try_recv(&self) -> Option<Telemetry> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(ts: u64) -> Telemetry {
        Telemetry {
            esc_pulse_us: 1500,
            steer_pulse_us: 1500,
            speed: 0.0,
            steer: 0.0,
            deadman_active: false,
            stale: true,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn slow_subscriber_sees_only_latest() {
        let bus = TelemetryBus::new();
        let sub = bus.subscribe();
        bus.publish(snap(1));
        bus.publish(snap(2));
        bus.publish(snap(3));
        assert_eq!(sub.try_recv().map(|t| t.timestamp_ms), Some(3));
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn late_subscriber_misses_earlier_values() {
        let bus = TelemetryBus::new();
        bus.publish(snap(1));
        let sub = bus.subscribe();
        assert!(sub.try_recv().is_none());
        assert_eq!(bus.latest().map(|t| t.timestamp_ms), Some(1));
    }

    #[test]
    fn dropped_subscription_is_pruned() {
        let bus = TelemetryBus::new();
        let a = bus.subscribe();
        let _b = bus.subscribe();
        drop(a);
        bus.publish(snap(1));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn serializes_as_flat_json() {
        let json = serde_json::to_string(&snap(7)).unwrap();
        assert!(json.contains("\"esc_pulse_us\":1500"));
        assert!(json.contains("\"timestamp_ms\":7"));
    }
}
