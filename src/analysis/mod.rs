// src/analysis/mod.rs
pub mod error;
pub mod fit;
pub mod pipeline;
pub mod provenance;
pub mod source;
pub mod spectral;
pub mod states;
pub mod threshold;
pub mod transitions;
// 公开导出常用类型，方便外部调用
pub use error::AnalysisError;
pub use fit::{fit_gaussian, DensityHistogram, GaussianFit};
pub use pipeline::{ChannelAnalyzer, ChannelDetection, DetectionReport, RecordingReport, UpDownPipeline};
pub use provenance::{strip_internal_keys, Provenance, ThresholdProvenance};
pub use source::{Annotations, ChannelBatch, ChannelSignal, JsonSource, ManualSource, SignalSource};
pub use spectral::{detrend, FrequencySpectrum, LogMuaEstimator, LogMuaSignal, WelchEstimator};
pub use states::{classify, clear_short_runs, debounce};
pub use threshold::{BimodalThresholdEstimator, NoiseEstimate};
pub use transitions::{
    average_transition_profiles, extract_transitions, TransitionKind, TransitionPair,
    TransitionProfiles, TransitionStream,
};
