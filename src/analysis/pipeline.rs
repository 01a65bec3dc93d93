use log::{debug, info, warn};
use ndarray::Array2;
use rayon::prelude::*;

use crate::analysis::error::AnalysisError;
use crate::analysis::provenance::{Provenance, ThresholdProvenance};
use crate::analysis::source::{ChannelBatch, SignalSource};
use crate::analysis::spectral::{LogMuaEstimator, LogMuaSignal};
use crate::analysis::states::{classify, debounce};
use crate::analysis::threshold::{BimodalThresholdEstimator, NoiseEstimate};
use crate::analysis::transitions::{
    average_transition_profiles, extract_transitions, TransitionPair, TransitionProfiles,
    TransitionStream,
};
use crate::types::{PipelineConfig, ThresholdMode};

/// Everything the detection stage produced for one channel.
#[derive(Clone, Debug)]
pub struct ChannelDetection {
    pub index: usize,
    pub noise: NoiseEstimate,
    pub threshold: ThresholdProvenance,
    pub states: Vec<bool>,
    pub transitions: TransitionPair,
    pub profiles: TransitionProfiles,
}

/// Per-channel detection results in channel order. A failed channel keeps its
/// slot and carries the error instead of a result.
#[derive(Clone, Debug, Default)]
pub struct DetectionReport {
    pub channels: Vec<Result<ChannelDetection, AnalysisError>>,
}

impl DetectionReport {
    /// Boolean matrix, rows = channels, columns = logMUA samples.
    pub fn state_matrix(&self) -> Result<Array2<bool>, AnalysisError> {
        let mut rows: Vec<&[bool]> = Vec::with_capacity(self.channels.len());
        for (index, outcome) in self.channels.iter().enumerate() {
            match outcome {
                Ok(detection) => rows.push(&detection.states),
                Err(err) => {
                    return Err(AnalysisError::ChannelFailed {
                        index,
                        source: Box::new(err.clone()),
                    })
                }
            }
        }
        let width = rows.first().map_or(0, |row| row.len());
        if let Some(row) = rows.iter().find(|row| row.len() != width) {
            return Err(AnalysisError::ChannelMismatch {
                expected: width,
                actual: row.len(),
            });
        }
        let flat: Vec<bool> = rows.iter().flat_map(|row| row.iter().copied()).collect();
        Array2::from_shape_vec((rows.len(), width), flat).map_err(|_| {
            AnalysisError::ChannelMismatch {
                expected: rows.len() * width,
                actual: rows.iter().map(|row| row.len()).sum(),
            }
        })
    }

    /// UP→DOWN streams by channel; `None` marks a failed channel.
    pub fn up_to_down(&self) -> Vec<Option<&TransitionStream>> {
        self.channels
            .iter()
            .map(|outcome| outcome.as_ref().ok().map(|d| &d.transitions.up_to_down))
            .collect()
    }

    /// DOWN→UP streams by channel; `None` marks a failed channel.
    pub fn down_to_up(&self) -> Vec<Option<&TransitionStream>> {
        self.channels
            .iter()
            .map(|outcome| outcome.as_ref().ok().map(|d| &d.transitions.down_to_up))
            .collect()
    }

    pub fn failures(&self) -> Vec<(usize, &AnalysisError)> {
        self.channels
            .iter()
            .enumerate()
            .filter_map(|(index, outcome)| outcome.as_ref().err().map(|err| (index, err)))
            .collect()
    }
}

/// Both stages for one recording.
#[derive(Clone, Debug)]
pub struct RecordingReport {
    pub log_mua: Vec<Result<LogMuaSignal, AnalysisError>>,
    pub detection: DetectionReport,
}

/// Per-channel stages shared by every recording; holds no source so it can be
/// borrowed across the worker pool.
pub struct ChannelAnalyzer {
    config: PipelineConfig,
    log_mua: LogMuaEstimator,
    thresholds: BimodalThresholdEstimator,
    threshold_mode: ThresholdMode,
}

impl ChannelAnalyzer {
    /// Rejects an unusable configuration before any channel is touched.
    pub fn new(config: PipelineConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        let threshold_mode = config.detection.threshold_mode()?;
        let log_mua = LogMuaEstimator::new(config.log_mua.clone())?;
        let thresholds = BimodalThresholdEstimator::from_config(&config.detection);
        Ok(Self {
            config,
            log_mua,
            thresholds,
            threshold_mode,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn process_batch(&self, batch: &ChannelBatch) -> RecordingReport {
        info!("processing {} channels", batch.num_channels());
        let log_mua = self.estimate_log_mua(batch);
        let detection = self.detect_states(&log_mua);
        RecordingReport { log_mua, detection }
    }

    pub fn estimate_log_mua(&self, batch: &ChannelBatch) -> Vec<Result<LogMuaSignal, AnalysisError>> {
        batch
            .channels
            .par_iter()
            .enumerate()
            .map(|(index, channel)| {
                let result = self.log_mua.estimate(channel);
                if let Err(err) = &result {
                    warn!("channel {index}: logMUA estimation failed: {err}");
                }
                result
            })
            .collect()
    }

    /// Channels whose logMUA failed keep that error in their slot.
    pub fn detect_states(&self, log_mua: &[Result<LogMuaSignal, AnalysisError>]) -> DetectionReport {
        let channels = log_mua
            .par_iter()
            .enumerate()
            .map(|(index, signal)| -> Result<ChannelDetection, AnalysisError> {
                let signal = signal.as_ref().map_err(Clone::clone)?;
                let result = self.detect_channel(index, signal);
                if let Err(err) = &result {
                    warn!("channel {index}: state detection failed: {err}");
                }
                result
            })
            .collect();
        DetectionReport { channels }
    }

    pub fn detect_channel(
        &self,
        index: usize,
        log_mua: &LogMuaSignal,
    ) -> Result<ChannelDetection, AnalysisError> {
        let detection = &self.config.detection;
        let noise = self.thresholds.estimate(log_mua.samples())?;
        let threshold = ThresholdProvenance {
            mode: self.threshold_mode,
            threshold: noise.threshold(self.threshold_mode),
            m0: noise.m0,
            s0: noise.s0,
        };
        let states = debounce(
            &classify(log_mua.samples(), threshold.threshold),
            detection.min_state_duration,
            detection.debounce_order,
        );
        let provenance = log_mua.provenance.merged(&Provenance {
            threshold: Some(threshold),
            min_state_duration: Some(detection.min_state_duration),
            debounce_order: Some(detection.debounce_order),
            ..Provenance::default()
        });
        let transitions = extract_transitions(&states, &log_mua.signal, &provenance);
        let profiles = average_transition_profiles(
            log_mua.samples(),
            &states,
            log_mua.signal.sample_rate_hz,
            detection.profile_half_window,
        );
        debug!(
            "channel {index}: threshold {:.4}, {} UP onsets, {} DOWN onsets",
            threshold.threshold,
            transitions.down_to_up.times.len(),
            transitions.up_to_down.times.len()
        );
        Ok(ChannelDetection {
            index,
            noise,
            threshold,
            states,
            transitions,
            profiles,
        })
    }
}

/// Pulls recordings from a source and runs them through a [`ChannelAnalyzer`].
pub struct UpDownPipeline<S: SignalSource> {
    source: S,
    analyzer: ChannelAnalyzer,
}

impl<S: SignalSource> UpDownPipeline<S> {
    pub fn new(source: S, config: PipelineConfig) -> Result<Self, AnalysisError> {
        Ok(Self {
            source,
            analyzer: ChannelAnalyzer::new(config)?,
        })
    }

    pub fn analyzer(&self) -> &ChannelAnalyzer {
        &self.analyzer
    }

    pub fn pump_once(&mut self) -> Result<Option<RecordingReport>, AnalysisError> {
        let Some(batch) = self.source.next_batch()? else {
            return Ok(None);
        };
        Ok(Some(self.analyzer.process_batch(&batch)))
    }
}
