//! Hardware assembly, the stdin input adapter and the `run` / `pulse` /
//! `check-config` commands.

use crate::rt::{RtOptions, setup_rt_once};
use rc_core::{ControlInput, ErrorStats, InputHandle, LoopStats};
use rc_hardware::{ChannelLimits, SafePwm, SimulatedPwm};
use rc_traits::PwmController;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Lowest and highest pulse the calibration bypass accepts.
pub const PULSE_RANGE_US: std::ops::RangeInclusive<u16> = 500..=2500;

type DynController = Box<dyn PwmController + Send>;

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub sim: bool,
    pub telemetry: bool,
    pub duration: Option<Duration>,
    pub rt: Option<RtOptions>,
}

#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub loop_stats: LoopStats,
    pub errors: ErrorStats,
    pub inputs: u64,
    pub rejected: u64,
}

/// PCA9685 on I2C with the `hardware` feature on Linux, otherwise the simulator.
pub fn make_controller(cfg: &rc_config::Config, sim: bool) -> eyre::Result<DynController> {
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        if !sim {
            let pca = rc_hardware::Pca9685::open(cfg.i2c.bus, cfg.i2c.address, cfg.i2c.pwm_frequency_hz)?;
            return Ok(Box::new(pca));
        }
    }
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    {
        let _ = &cfg.i2c;
        if !sim {
            tracing::info!("built without hardware support; using simulated PWM");
        }
    }
    Ok(Box::new(SimulatedPwm::new()))
}

/// Clamp each configured channel to its calibration range; everything else
/// gets the global range.
pub fn safety_wrap(cfg: &rc_config::Config, controller: DynController) -> SafePwm<DynController> {
    SafePwm::new(controller)
        .with_global_range(cfg.safety.global_min_pulse_us, cfg.safety.global_max_pulse_us)
        .with_channel_limits(
            cfg.servo.channel,
            ChannelLimits::new("Steering", cfg.servo.min_pulse_us, cfg.servo.max_pulse_us),
        )
        .with_channel_limits(
            cfg.motor.channel,
            ChannelLimits::new("ESC", cfg.motor.min_pulse_us, cfg.motor.max_pulse_us),
        )
}

pub fn run_drive(
    cfg: &rc_config::Config,
    opts: RunOptions,
    input: impl BufRead + Send + 'static,
    mut out: impl Write,
    shutdown: &Arc<AtomicBool>,
) -> eyre::Result<RunSummary> {
    if let Some(rt) = opts.rt {
        setup_rt_once(rt);
    }

    let controller = safety_wrap(cfg, make_controller(cfg, opts.sim)?);
    let (mut cl, _calibration, _counters) = rc_core::build_loop(controller, cfg)?;
    let telemetry = cl.subscribe();
    cl.start()?;

    let stop_on_eof = opts.duration.is_none();
    let eof = Arc::new(AtomicBool::new(false));
    let counts = Arc::new(InputCounts::default());
    {
        let handle = cl.handle();
        let eof = eof.clone();
        let counts = counts.clone();
        // Detached: a blocking read cannot be interrupted, and the process
        // exits right after the loop stops.
        std::thread::Builder::new()
            .name("rc-stdin".into())
            .spawn(move || {
                read_inputs(input, &handle, &counts);
                eof.store(true, Ordering::SeqCst);
            })?;
    }

    let deadline = opts.duration.map(|d| Instant::now() + d);
    loop {
        if shutdown.load(Ordering::SeqCst) {
            tracing::info!("shutdown requested");
            break;
        }
        if stop_on_eof && eof.load(Ordering::SeqCst) {
            tracing::info!("input closed");
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        if let Some(t) = telemetry.recv_timeout(Duration::from_millis(50))
            && opts.telemetry
        {
            writeln!(out, "{}", serde_json::to_string(&t)?)?;
            out.flush()?;
        }
    }

    let loop_stats = cl.stats();
    let output = cl.into_output()?;
    let errors = output.error_stats();
    let mut controller = output.into_inner();
    if let Err(e) = controller.close() {
        tracing::warn!(error = %e, "failed to close PWM controller");
    }

    Ok(RunSummary {
        loop_stats,
        errors,
        inputs: counts.accepted.load(Ordering::Relaxed),
        rejected: counts.rejected.load(Ordering::Relaxed),
    })
}

#[derive(Debug, Default)]
struct InputCounts {
    accepted: std::sync::atomic::AtomicU64,
    rejected: std::sync::atomic::AtomicU64,
}

/// One JSON `ControlInput` per line. A blank line means the client went away;
/// so does end of input. Malformed lines are dropped and the previous input
/// keeps ageing toward the failsafe timeout.
fn read_inputs(input: impl BufRead, handle: &InputHandle, counts: &InputCounts) {
    for line in input.lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            handle.clear_input();
            tracing::debug!("client disconnected (blank line)");
            continue;
        }
        match serde_json::from_str::<ControlInput>(line) {
            Ok(ci) => {
                handle.update_input(ci);
                counts.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                counts.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "ignoring malformed control input");
            }
        }
    }
    handle.clear_input();
    tracing::debug!("stdin closed");
}

/// Print loop and output counters to stderr.
pub fn print_summary(s: &RunSummary) {
    eprintln!("\n--- rcdrive stats ---");
    eprintln!("Ticks: {}", s.loop_stats.ticks);
    eprintln!("Paused ticks: {}", s.loop_stats.paused_ticks);
    eprintln!("Overruns (> period): {}", s.loop_stats.overruns);
    eprintln!("Inputs accepted/rejected: {} / {}", s.inputs, s.rejected);
    eprintln!(
        "Output errors consecutive/total: {} / {}",
        s.errors.consecutive, s.errors.total
    );
    eprintln!("---------------------\n");
}

/// Calibration bypass: one raw pulse straight to the controller.
pub fn run_pulse(cfg: &rc_config::Config, channel: u8, us: u16, sim: bool) -> eyre::Result<()> {
    if channel > rc_hardware::MAX_CHANNEL {
        eyre::bail!("channel must be in 0..={}", rc_hardware::MAX_CHANNEL);
    }
    if !PULSE_RANGE_US.contains(&us) {
        eyre::bail!(
            "pulse must be in {}..={} us",
            PULSE_RANGE_US.start(),
            PULSE_RANGE_US.end()
        );
    }
    let mut pwm = safety_wrap(cfg, make_controller(cfg, sim)?);
    pwm.unsafe_set_duty_us(channel, us).map_err(hw_report)?;
    println!("channel {channel} set to {us} us");
    let mut inner = pwm.into_inner();
    inner.close().map_err(hw_report)?;
    Ok(())
}

/// Keep `HwError` typed so exit codes and hints still apply.
fn hw_report(e: Box<dyn std::error::Error + Send + Sync>) -> eyre::Report {
    match e.downcast::<rc_hardware::HwError>() {
        Ok(hw) => eyre::Report::new(*hw),
        Err(other) => eyre::eyre!(other),
    }
}

/// One-screen summary of a validated config.
pub fn config_summary(cfg: &rc_config::Config) -> String {
    let s = &cfg.servo;
    let m = &cfg.motor;
    let c = &cfg.control;
    format!(
        "config OK\n\
         servo: ch {} left/center/right {}/{}/{} us (range {}..={})\n\
         motor: ch {} reverse {}..={} neutral {} forward {}..={} us (range {}..={})\n\
         control: {} Hz tick, {} ms failsafe, {} Hz telemetry\n\
         mapper: expo {:.2}/{:.2}, ramp {}/{} us per tick",
        s.channel,
        s.left_pulse_us,
        s.center_pulse_us,
        s.right_pulse_us,
        s.min_pulse_us,
        s.max_pulse_us,
        m.channel,
        m.reverse_min_pulse_us,
        m.reverse_max_pulse_us,
        m.neutral_pulse_us,
        m.forward_min_pulse_us,
        m.forward_max_pulse_us,
        m.min_pulse_us,
        m.max_pulse_us,
        c.tick_rate_hz,
        c.failsafe_timeout_ms,
        c.telemetry_rate_hz,
        cfg.mapper.throttle_expo,
        cfg.mapper.steer_expo,
        cfg.mapper.max_esc_ramp_per_tick,
        cfg.mapper.max_steer_ramp_per_tick,
    )
}
