use thiserror::Error;
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("sample rate must be a positive finite number, got {0}")]
    InvalidSampleRate(f64),
    #[error(
        "frequency band [{low}, {high}) Hz is not representable on a {resolution} Hz grid up to {max_hz} Hz"
    )]
    BandRange {
        low: f64,
        high: f64,
        resolution: f64,
        max_hz: f64,
    },
    #[error("data quality: {0}")]
    DataQuality(String),
    #[error("threshold estimation failed: {0}")]
    ThresholdEstimation(String),
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
    #[error("channel {index} failed: {source}")]
    ChannelFailed {
        index: usize,
        #[source]
        source: Box<AnalysisError>,
    },
}
