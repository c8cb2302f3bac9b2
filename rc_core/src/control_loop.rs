//! Fixed-rate control loop.
//!
//! States: `Stopped -> Running <-> Paused -> Stopped`.
//!
//! The loop owns a driver, a mapper and an output sink (together the tick
//! state). While running, a dedicated `rc-tick` thread takes the tick state
//! out of its slot and is its only user until it exits; `stop()` gets it back.
//! The only values shared with other threads are the latest-input slot, the
//! telemetry bus and a few atomic flags and counters.
//!
//! Per tick (skipped while paused):
//! 1. read the latest input and its receipt instant
//! 2. `stale` if absent or older than `failsafe_timeout` (strictly greater)
//! 3. `deadman_active = !stale && input.deadman`
//! 4. advance the driver, map to pulses, write ESC then steer
//! 5. every `tick_rate_hz / telemetry_rate_hz` ticks, publish telemetry
//!
//! Resuming from pause requests a reset: the next tick zeroes the driver,
//! snaps the ramp anchors and writes neutral/center without advancing.
use crate::calibration::CalibrationHandle;
use crate::config::{DriverCfg, LoopCfg, MapperCfg};
use crate::driver::Driver;
use crate::error::{BuildError, LoopError};
use crate::input::{ControlInput, InputHandle, InputSlot};
use crate::mapper::Mapper;
use crate::telemetry::{Telemetry, TelemetryBus, TelemetrySubscription};
use crate::util::{period, remaining_sleep, telemetry_divisor, unix_time_ms};
use rc_traits::{Clock, MonotonicClock, PwmOutput};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopStatus {
    pub running: bool,
    pub paused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopStats {
    /// Ticks that ran the full update (including post-resume resets).
    pub ticks: u64,
    /// Ticks skipped because the loop was paused.
    pub paused_ticks: u64,
    /// Ticks whose work took longer than the nominal interval.
    pub overruns: u64,
}

#[derive(Debug, Default)]
struct Flags {
    running: AtomicBool,
    paused: AtomicBool,
    reset_requested: AtomicBool,
    ticks: AtomicU64,
    paused_ticks: AtomicU64,
    overruns: AtomicU64,
}

/// Everything a tick reads that is not owned by the tick state.
struct Context {
    cfg: LoopCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    input: Arc<InputSlot>,
    telemetry: Arc<TelemetryBus>,
    flags: Flags,
}

struct TickState<O> {
    driver: Driver,
    mapper: Mapper,
    output: O,
    since_telemetry: u32,
    telemetry_every: u32,
    was_stale: bool,
    /// Outputs sit at neutral/center and the driver is at rest.
    parked: bool,
}

impl<O: PwmOutput> TickState<O> {
    fn tick(&mut self, ctx: &Context, dt: Duration) {
        let flags = &ctx.flags;
        if flags.paused.load(Ordering::SeqCst) {
            flags.paused_ticks.fetch_add(1, Ordering::Relaxed);
            return;
        }
        flags.ticks.fetch_add(1, Ordering::Relaxed);
        if flags.reset_requested.swap(false, Ordering::SeqCst) {
            self.park();
            return;
        }

        let latest = ctx.input.load();
        let stale = latest
            .is_none_or(|r| ctx.clock.elapsed_since(r.received_at) > ctx.cfg.failsafe_timeout);
        let effective: Option<ControlInput> = if stale { None } else { latest.map(|r| r.input) };
        let deadman_active = effective.is_some_and(|i| i.deadman);

        if stale != self.was_stale {
            if stale {
                tracing::warn!(
                    timeout_ms = as_ms(ctx.cfg.failsafe_timeout),
                    "control input stale, failsafe engaged"
                );
            } else {
                tracing::info!("control input acquired");
            }
            self.was_stale = stale;
        }

        self.driver.tick(dt.as_secs_f32(), effective.as_ref(), deadman_active);
        let esc = self.mapper.map_throttle_to_pulse(self.driver.speed());
        let steer = self.mapper.map_steer_to_pulse(self.driver.steer());
        self.output.set_esc_pulse_us(esc);
        self.output.set_steer_pulse_us(steer);
        self.parked = false;
        tracing::trace!(
            speed = self.driver.speed(),
            steer = self.driver.steer(),
            esc,
            steer_us = steer,
            stale,
            deadman_active,
            "tick"
        );

        self.since_telemetry += 1;
        if self.since_telemetry >= self.telemetry_every {
            self.since_telemetry = 0;
            ctx.telemetry.publish(Telemetry {
                esc_pulse_us: esc,
                steer_pulse_us: steer,
                speed: self.driver.speed(),
                steer: self.driver.steer(),
                deadman_active,
                stale,
                timestamp_ms: unix_time_ms(),
            });
        }
    }

    /// Zero the driver, snap the ramp anchors and write neutral/center.
    fn park(&mut self) {
        self.driver.reset();
        self.mapper.reset();
        self.output.set_esc_pulse_us(self.mapper.current_esc());
        self.output.set_steer_pulse_us(self.mapper.current_steer());
        self.parked = true;
    }
}

/// Clears `running` when the tick thread exits, including by unwinding, so a
/// dead thread never reads as a running loop.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!("tick thread panicked; outputs hold their last written pulses");
        }
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ControlLoop<O: PwmOutput + Send + 'static> {
    ctx: Arc<Context>,
    state: Arc<Mutex<Option<TickState<O>>>>,
    join: Option<JoinHandle<()>>,
}

impl<O: PwmOutput + Send + 'static> std::fmt::Debug for ControlLoop<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlLoop")
            .field("cfg", &self.ctx.cfg)
            .field("status", &self.status())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl<O: PwmOutput + Send + 'static> ControlLoop<O> {
    pub fn new(
        output: O,
        calibration: CalibrationHandle,
        cfg: LoopCfg,
        driver: DriverCfg,
        mapper: MapperCfg,
    ) -> Result<Self, BuildError> {
        Self::with_clock(
            output,
            calibration,
            cfg,
            driver,
            mapper,
            Arc::new(MonotonicClock::new()),
        )
    }

    pub fn with_clock(
        output: O,
        calibration: CalibrationHandle,
        cfg: LoopCfg,
        driver: DriverCfg,
        mapper: MapperCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Result<Self, BuildError> {
        cfg.validate()?;
        driver.validate()?;
        mapper.validate()?;
        let state = TickState {
            driver: Driver::new(driver),
            mapper: Mapper::new(mapper, calibration),
            output,
            since_telemetry: 0,
            telemetry_every: telemetry_divisor(cfg.tick_rate_hz, cfg.telemetry_rate_hz),
            was_stale: true,
            parked: true,
        };
        Ok(Self {
            ctx: Arc::new(Context {
                cfg,
                clock,
                input: Arc::new(InputSlot::new()),
                telemetry: Arc::new(TelemetryBus::new()),
                flags: Flags::default(),
            }),
            state: Arc::new(Mutex::new(Some(state))),
            join: None,
        })
    }

    pub fn cfg(&self) -> &LoopCfg {
        &self.ctx.cfg
    }

    /// Writer for the latest-input slot, for the transport side.
    pub fn handle(&self) -> InputHandle {
        InputHandle::new(self.ctx.input.clone(), self.ctx.clock.clone())
    }

    pub fn update_input(&self, input: ControlInput) {
        self.handle().update_input(input);
    }

    pub fn clear_input(&self) {
        self.ctx.input.clear();
    }

    pub fn subscribe(&self) -> TelemetrySubscription {
        self.ctx.telemetry.subscribe()
    }

    pub fn latest_telemetry(&self) -> Option<Telemetry> {
        self.ctx.telemetry.latest()
    }

    /// Spawn the tick thread. No-op if already running. A tick thread that
    /// died since the last call is reaped first and reported.
    pub fn start(&mut self) -> Result<(), LoopError> {
        if self.is_running() {
            return Ok(());
        }
        if self.join.is_some() {
            self.stop()?;
        }
        if self.lock_state().is_none() {
            return Err(LoopError::TickPanicked);
        }
        let flags = &self.ctx.flags;
        flags.running.store(true, Ordering::SeqCst);

        let ctx = self.ctx.clone();
        let slot = self.state.clone();
        let spawned = std::thread::Builder::new()
            .name("rc-tick".into())
            .spawn(move || run(&ctx, &slot));
        match spawned {
            Ok(handle) => {
                self.join = Some(handle);
                tracing::info!(
                    tick_rate_hz = self.ctx.cfg.tick_rate_hz,
                    failsafe_timeout_ms = as_ms(self.ctx.cfg.failsafe_timeout),
                    telemetry_rate_hz = self.ctx.cfg.telemetry_rate_hz,
                    "control loop started"
                );
                Ok(())
            }
            Err(e) => {
                flags.running.store(false, Ordering::SeqCst);
                tracing::error!(error = %e, "failed to spawn tick thread");
                Err(LoopError::Spawn(e))
            }
        }
    }

    /// Stop the tick thread. It resets the driver and mapper and writes
    /// neutral/center once before exiting. Without a thread the same park
    /// happens here, unless the outputs are already parked.
    pub fn stop(&mut self) -> Result<(), LoopError> {
        self.ctx.flags.running.store(false, Ordering::SeqCst);
        let Some(handle) = self.join.take() else {
            if let Some(state) = self.lock_state().as_mut()
                && !state.parked
            {
                state.park();
                tracing::debug!("outputs parked");
            }
            return Ok(());
        };
        match handle.join() {
            Ok(()) => {
                tracing::info!(stats = ?self.stats(), "control loop stopped");
                Ok(())
            }
            Err(e) => {
                tracing::error!(?e, "tick thread panicked");
                Err(LoopError::TickPanicked)
            }
        }
    }

    /// Subsequent ticks do nothing until `resume()`.
    pub fn pause(&self) {
        if !self.ctx.flags.paused.swap(true, Ordering::SeqCst) {
            tracing::info!("control loop paused");
        }
    }

    /// Clear the pause; the next tick resets to neutral/center.
    pub fn resume(&self) {
        let flags = &self.ctx.flags;
        if flags.paused.load(Ordering::SeqCst) {
            flags.reset_requested.store(true, Ordering::SeqCst);
            flags.paused.store(false, Ordering::SeqCst);
            tracing::info!("control loop resumed");
        }
    }

    /// True while a live tick thread is scheduled.
    pub fn is_running(&self) -> bool {
        self.ctx.flags.running.load(Ordering::SeqCst)
            && self.join.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn is_paused(&self) -> bool {
        self.ctx.flags.paused.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> LoopStatus {
        LoopStatus {
            running: self.is_running(),
            paused: self.is_paused(),
        }
    }

    pub fn stats(&self) -> LoopStats {
        let f = &self.ctx.flags;
        LoopStats {
            ticks: f.ticks.load(Ordering::Relaxed),
            paused_ticks: f.paused_ticks.load(Ordering::Relaxed),
            overruns: f.overruns.load(Ordering::Relaxed),
        }
    }

    /// Run one tick on the caller's thread with the given elapsed time.
    pub fn step(&mut self, delta: Duration) -> Result<(), LoopError> {
        if self.is_running() {
            return Err(LoopError::Running);
        }
        let mut guard = self.lock_state();
        let state = guard.as_mut().ok_or(LoopError::TickPanicked)?;
        state.tick(&self.ctx, delta);
        Ok(())
    }

    /// Current `(speed, steer)`; `None` while the tick thread owns the state.
    pub fn motion(&self) -> Option<(f32, f32)> {
        self.lock_state()
            .as_ref()
            .map(|s| (s.driver.speed(), s.driver.steer()))
    }

    /// Run `f` against the output sink; `None` while the tick thread owns it.
    pub fn with_output<R>(&self, f: impl FnOnce(&mut O) -> R) -> Option<R> {
        self.lock_state().as_mut().map(|s| f(&mut s.output))
    }

    /// Stop the loop and hand back the output sink.
    pub fn into_output(mut self) -> Result<O, LoopError> {
        self.stop()?;
        self.lock_state()
            .take()
            .map(|s| s.output)
            .ok_or(LoopError::TickPanicked)
    }

    fn lock_state(&self) -> MutexGuard<'_, Option<TickState<O>>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<O: PwmOutput + Send + 'static> Drop for ControlLoop<O> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "control loop did not stop cleanly");
        }
    }
}

fn as_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn run<O: PwmOutput>(ctx: &Context, slot: &Mutex<Option<TickState<O>>>) {
    let _running = RunningGuard(&ctx.flags.running);
    let Some(mut state) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() else {
        tracing::error!("tick state missing, tick thread exiting");
        return;
    };
    tracing::debug!("tick thread running");
    let interval = period(ctx.cfg.tick_rate_hz);
    let flags = &ctx.flags;
    let mut last: Option<std::time::Instant> = None;

    while flags.running.load(Ordering::SeqCst) {
        let start = ctx.clock.now();
        let dt = last.map_or(Duration::ZERO, |l| start.saturating_duration_since(l));
        last = Some(start);

        state.tick(ctx, dt);

        let work = ctx.clock.elapsed_since(start);
        if work > interval {
            flags.overruns.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(
                work_ms = as_ms(work),
                interval_ms = as_ms(interval),
                "tick overran its interval"
            );
        }
        if !flags.running.load(Ordering::SeqCst) {
            break;
        }
        ctx.clock.sleep(remaining_sleep(interval, work));
    }

    state.park();
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(state);
    tracing::debug!("tick thread exiting");
}
