//! `rcdrive` arguments, plus process-wide state set once in `main`.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Set from `--json`; read when formatting a fatal error.
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "rcdrive", version, about = "RC vehicle drive controller")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/rcdrive.toml")]
    pub config: PathBuf,

    /// JSON log lines and JSON error output
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Level for stderr logs; `RUST_LOG` wins when set
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// What to do
    #[command(subcommand)]
    pub cmd: Commands,
}

/// `mlockall` mode used with `--rt`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Leave paging alone
    None,
    /// MCL_CURRENT
    Current,
    /// MCL_CURRENT | MCL_FUTURE
    All,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the control loop, reading JSON control input lines from stdin
    Run {
        /// Use the simulated PWM controller even if built with hardware support
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
        /// Print a JSON telemetry line to stdout for every snapshot
        #[arg(long, action = ArgAction::SetTrue)]
        telemetry: bool,
        /// Run for this long, then stop. End of input only clears the input
        /// slot instead of stopping.
        #[arg(long, value_name = "MS")]
        duration_ms: Option<u64>,
        /// Run the tick thread under SCHED_FIFO, pinned and memory-locked
        #[arg(
            long,
            action = ArgAction::SetTrue,
            long_help = "Enable real-time mode on Linux.\n\nApplies SCHED_FIFO priority, pins the process to one CPU and locks memory before the tick thread starts, so the tick thread inherits them. Needs CAP_SYS_NICE / CAP_IPC_LOCK or root; failures are logged and the run continues."
        )]
        rt: bool,
        /// SCHED_FIFO priority (clamped to the system range)
        #[arg(long, value_name = "PRIO")]
        rt_prio: Option<i32>,
        /// Memory locking mode for --rt
        #[arg(long, value_enum, value_name = "MODE", default_value = "current")]
        rt_lock: RtLock,
        /// CPU index to pin to for --rt (default 0)
        #[arg(long, value_name = "CPU")]
        rt_cpu: Option<usize>,
    },
    /// Write one raw pulse to a channel, bypassing safety limits (calibration)
    Pulse {
        /// PWM channel (0..=15)
        #[arg(long)]
        channel: u8,
        /// Pulse width in microseconds (500..=2500)
        #[arg(long)]
        us: u16,
        /// Use the simulated PWM controller
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
    },
    /// Load and validate the config, then print a summary
    CheckConfig,
}
