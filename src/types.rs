// src/types.rs
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisError;

// Which short runs are cleared first by the debouncer
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebounceOrder {
    #[default]
    DownFirst,
    UpFirst,
}

impl DebounceOrder {
    /// State values in the order their short runs are cleared.
    pub fn passes(self) -> [bool; 2] {
        match self {
            DebounceOrder::DownFirst => [false, true],
            DebounceOrder::UpFirst => [true, false],
        }
    }
}

// Resolved threshold rule
#[derive(PartialEq, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "value")]
pub enum ThresholdMode {
    /// Absolute offset above the noise-mode mean.
    Fixed(f64),
    /// Multiple of the noise-mode spread above its mean.
    Sigma(f64),
}

impl ThresholdMode {
    pub fn apply(self, m0: f64, s0: f64) -> f64 {
        match self {
            ThresholdMode::Fixed(offset) => m0 + offset,
            ThresholdMode::Sigma(multiplier) => m0 + multiplier * s0,
        }
    }
}

// Starting point for a Gaussian fit
#[derive(PartialEq, Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GaussianGuess {
    pub mean: f64,
    pub std: f64,
}

impl GaussianGuess {
    pub fn new(mean: f64, std: f64) -> Self {
        Self { mean, std }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogMuaConfig {
    /// (low, high) in Hz. `low` also sets the window size and PSD resolution.
    pub freq_band: (f64, f64),
    pub detrending_order: u8,
    pub psd_overlap: f64,
}

impl Default for LogMuaConfig {
    fn default() -> Self {
        Self {
            freq_band: (200.0, 1500.0),
            detrending_order: 2,
            psd_overlap: 0.5,
        }
    }
}

impl LogMuaConfig {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let (low, high) = self.freq_band;
        if !(low.is_finite() && high.is_finite()) || low <= 0.0 || high <= low {
            return Err(AnalysisError::Config(format!(
                "frequency band must satisfy 0 < low < high, got ({low}, {high})"
            )));
        }
        if self.detrending_order > 2 {
            return Err(AnalysisError::Config(format!(
                "detrending order must be 0, 1 or 2, got {}",
                self.detrending_order
            )));
        }
        if !(0.0..1.0).contains(&self.psd_overlap) {
            return Err(AnalysisError::Config(format!(
                "psd overlap must lie in [0, 1), got {}",
                self.psd_overlap
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub min_state_duration: usize,
    pub debounce_order: DebounceOrder,
    pub fixed_threshold: Option<f64>,
    pub sigma_threshold: Option<f64>,
    pub histogram_bins: usize,
    /// Initial guess for the dominant (DOWN) mode fit.
    pub peak_guess: GaussianGuess,
    /// Initial guess for the mirrored lower-half fit.
    pub spread_guess: GaussianGuess,
    pub max_fit_evaluations: usize,
    /// Half width, in logMUA samples, of the transition profile window.
    pub profile_half_window: usize,
    /// Adds threshold diagnostics to the rendered report.
    pub show_plots: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_state_duration: 2,
            debounce_order: DebounceOrder::DownFirst,
            fixed_threshold: None,
            sigma_threshold: None,
            histogram_bins: 100,
            peak_guess: GaussianGuess::new(-4.0, 1.0),
            spread_guess: GaussianGuess::new(0.0, 1.0),
            max_fit_evaluations: 600,
            profile_half_window: 50,
            show_plots: false,
        }
    }
}

impl DetectionConfig {
    pub fn threshold_mode(&self) -> Result<ThresholdMode, AnalysisError> {
        match (self.fixed_threshold, self.sigma_threshold) {
            (Some(offset), None) if offset.is_finite() => Ok(ThresholdMode::Fixed(offset)),
            (None, Some(multiplier)) if multiplier.is_finite() => {
                Ok(ThresholdMode::Sigma(multiplier))
            }
            (Some(_), Some(_)) => Err(AnalysisError::Config(
                "set either fixed_threshold or sigma_threshold, not both".into(),
            )),
            (None, None) => Err(AnalysisError::Config(
                "one of fixed_threshold or sigma_threshold is required".into(),
            )),
            _ => Err(AnalysisError::Config("threshold value must be finite".into())),
        }
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        self.threshold_mode()?;
        if self.min_state_duration == 0 {
            return Err(AnalysisError::Config(
                "min_state_duration must be at least one sample".into(),
            ));
        }
        if self.histogram_bins == 0 {
            return Err(AnalysisError::Config("histogram_bins must be positive".into()));
        }
        if self.max_fit_evaluations == 0 {
            return Err(AnalysisError::Config(
                "max_fit_evaluations must be positive".into(),
            ));
        }
        Ok(())
    }
}

// Full configuration surface handed to the pipeline
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub log_mua: LogMuaConfig,
    pub detection: DetectionConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        self.log_mua.validate()?;
        self.detection.validate()
    }
}
