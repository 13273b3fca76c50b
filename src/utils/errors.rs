use thiserror::Error;

#[derive(Error, Debug)]
pub enum FootprintError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Snapshot unavailable for pid {pid}: {reason}")]
    SnapshotUnavailable { pid: u32, reason: String },
    #[error("Observation interrupted")]
    Interrupted,
    #[error("Tick trace error: {0}")]
    Trace(String),
}
