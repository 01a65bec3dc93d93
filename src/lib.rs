//! UP/DOWN cortical state detection on multichannel recordings.
pub mod analysis;
pub mod args;
pub mod types;

pub use analysis::{AnalysisError, ChannelAnalyzer, ChannelBatch, ChannelSignal, UpDownPipeline};
pub use types::{DebounceOrder, PipelineConfig, ThresholdMode};
