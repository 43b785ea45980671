use thiserror::Error;

#[derive(Debug, Error)]
pub enum AbfError {
    #[error("Channel not found: {0}")]
    InvalidChannelIndex(String),

    #[error("Unsupported ABF format version: {0}")]
    UnsupportedFormatVersion(String),

    #[error("Inconsistent protocol metadata: {0}")]
    InconsistentProtocol(String),

    #[error("Invalid epoch specification: {0}")]
    InvalidEpochSpec(String),

    #[error("Unsupported waveform source: {0}")]
    UnsupportedWaveformSource(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AbfError>;
