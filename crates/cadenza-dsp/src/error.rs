use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DspError {
    #[error("unsupported channel count {0}")]
    UnsupportedChannels(usize),
    #[error("sample rate must be non-zero")]
    InvalidRate,
    #[error("conversion {from} Hz -> {to} Hz is outside the supported ratio range")]
    UnsupportedRatio { from: u32, to: u32 },
    #[error("unsupported sample width of {0} bytes")]
    UnsupportedWidth(usize),
    #[error("converter parameters differ from the ones it was initialised with")]
    ParamMismatch,
    #[error("buffer of {len} samples does not hold whole {channels}-channel frames")]
    PartialFrame { len: usize, channels: usize },
}

pub type Result<T, E = DspError> = std::result::Result<T, E>;
