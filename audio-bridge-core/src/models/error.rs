use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors produced by the port bridge.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("allocation failed: {0}")]
    AllocationError(String),

    #[error("buffer creation failed: {0}")]
    BufferCreate(String),

    #[error("buffer destruction failed: {0}")]
    BufferDestroy(String),

    #[error("buffer underrun")]
    BufferUnderrun,

    #[error("port has been destroyed")]
    PortDestroyed,

    #[error("device not available: {0}")]
    DeviceUnavailable(String),

    #[error("stream creation failed: {0}")]
    StreamCreate(String),

    #[error("stream start failed: {0}")]
    StreamStart(String),

    #[error("format mismatch: {0}")]
    FormatMismatch(FormatMismatch),
}

impl BridgeError {
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn device_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::DeviceUnavailable(msg.into())
    }

    pub fn stream_create<S: Into<String>>(msg: S) -> Self {
        Self::StreamCreate(msg.into())
    }

    pub fn stream_start<S: Into<String>>(msg: S) -> Self {
        Self::StreamStart(msg.into())
    }
}

/// Which part of a port's format disagreed with the device port.
///
/// Each variant has a stable numeric code so callers can surface it to users.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FormatMismatch {
    #[error("clock rate {actual} Hz, expected {expected} Hz")]
    ClockRate { expected: u32, actual: u32 },

    #[error("{actual} samples per frame, expected {expected}")]
    SamplesPerFrame { expected: u32, actual: u32 },

    #[error("{actual} channels, expected {expected}")]
    ChannelCount { expected: u16, actual: u16 },

    #[error("{actual} bits per sample, expected {expected}")]
    BitsPerSample { expected: u16, actual: u16 },
}

impl FormatMismatch {
    pub fn code(&self) -> u32 {
        match self {
            Self::ClockRate { .. } => 1,
            Self::SamplesPerFrame { .. } => 2,
            Self::ChannelCount { .. } => 3,
            Self::BitsPerSample { .. } => 4,
        }
    }
}

impl From<FormatMismatch> for BridgeError {
    fn from(mismatch: FormatMismatch) -> Self {
        Self::FormatMismatch(mismatch)
    }
}
