use thiserror::Error;

use crate::policy::StreamPolicy;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FocusError {
    #[error("focus request has no listener")]
    MissingListener,
    #[error("policy {0:?} cannot hold focus")]
    InvalidPolicy(StreamPolicy),
    #[error("focus request carries an invalid stream id")]
    InvalidStream,
}

impl FocusError {
    /// Integer result code reported to media clients.
    pub const fn code(&self) -> i32 {
        -1
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to spawn notification worker: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("notification worker has exited")]
    WorkerExited,
}
