use thiserror::Error;

/// Failures surfaced by the control loop's lifecycle calls. Per-tick faults
/// never reach here; the output sink absorbs them.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("failed to spawn tick thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("tick thread panicked")]
    TickPanicked,
    #[error("control loop is running; stop it before stepping manually")]
    Running,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}
