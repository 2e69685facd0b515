use thiserror::Error;

/// Result codes reported by the stream/device manager.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioError {
    #[error("no audio card is available")]
    NoAvailableCard,
    #[error("audio card is not ready")]
    CardNotReady,
    #[error("audio device failed")]
    DeviceFail,
    #[error("operation not supported by the device")]
    DeviceNotSupported,
    #[error("invalid parameter")]
    InvalidParam,
    #[error("sample conversion failed")]
    ResampleFail,
    #[error("device is in xrun state")]
    XrunState,
    #[error("device is suspended")]
    DeviceSuspended,
    #[error("device is dead")]
    DeviceDead,
    #[error("operation failed")]
    OperationFail,
    #[error("device is already in use")]
    AlreadyInUse,
    #[error("invalid device")]
    InvalidDevice,
    #[error("try again")]
    Again,
}

impl AudioError {
    /// Stable integer code; zero is reserved for success.
    pub const fn code(self) -> i32 {
        match self {
            AudioError::NoAvailableCard => -1,
            AudioError::CardNotReady => -2,
            AudioError::DeviceFail => -3,
            AudioError::DeviceNotSupported => -4,
            AudioError::InvalidParam => -5,
            AudioError::ResampleFail => -6,
            AudioError::XrunState => -7,
            AudioError::DeviceSuspended => -8,
            AudioError::DeviceDead => -9,
            AudioError::OperationFail => -10,
            AudioError::AlreadyInUse => -11,
            AudioError::InvalidDevice => -12,
            AudioError::Again => -13,
        }
    }
}

pub type AudioResult<T> = Result<T, AudioError>;

/// Code for a whole result, `0` on success.
pub fn result_code<T>(result: &AudioResult<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(err) => err.code(),
    }
}

/// Failures reported by a PCM driver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("broken pipe (xrun)")]
    Pipe,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("stream suspended")]
    Suspended,
    #[error("device unreachable")]
    Unreachable,
    #[error("resource temporarily unavailable")]
    Again,
    #[error("device busy")]
    Busy,
    #[error("access denied")]
    AccessDenied,
    #[error("not implemented")]
    NotImplemented,
    #[error("no such device")]
    NotFound,
    #[error("driver i/o error: {0}")]
    Io(String),
}

impl From<DriverError> for AudioError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Pipe => AudioError::XrunState,
            DriverError::InvalidArgument => AudioError::InvalidParam,
            DriverError::Suspended => AudioError::DeviceSuspended,
            DriverError::Unreachable => AudioError::DeviceDead,
            DriverError::Again => AudioError::Again,
            DriverError::Busy => AudioError::AlreadyInUse,
            DriverError::AccessDenied | DriverError::NotImplemented => {
                AudioError::DeviceNotSupported
            }
            DriverError::NotFound => AudioError::InvalidDevice,
            DriverError::Io(_) => AudioError::DeviceFail,
        }
    }
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
