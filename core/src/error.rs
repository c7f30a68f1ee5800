use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModemError {
    #[error("sample rate {0} Hz not supported (expected 8000, 16000 or 48000)")]
    UnsupportedSampleRate(u32),

    #[error("invalid callsign {0:?}: expected up to 6 alphanumeric characters")]
    InvalidCallsign(String),

    #[error("invalid SSID in callsign {0:?}: expected 0..=15")]
    InvalidSsid(String),

    #[error("payload of {0} bytes exceeds the AX.25 information field limit")]
    PayloadTooLarge(usize),

    #[error("digipeater path of {0} entries exceeds the AX.25 limit of 8")]
    PathTooLong(usize),

    #[error("frame of {0} bytes exceeds the maximum AX.25 frame size")]
    FrameTooLarge(usize),

    #[error("sample buffer of {0} samples is smaller than the required {1}")]
    BufferTooSmall(usize, usize),
}

pub type Result<T> = std::result::Result<T, ModemError>;
