// src/analysis/threshold.rs
use log::debug;
use serde::Serialize;

use crate::analysis::fit::{fit_gaussian, gaussian_density, DensityHistogram};
use crate::analysis::AnalysisError;
use crate::types::{DetectionConfig, GaussianGuess, ThresholdMode};

/// Center and spread of the noise mode plus the data behind them.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NoiseEstimate {
    pub m0: f64,
    pub s0: f64,
    /// Twice the share of samples at or below the peak. Diagnostic only.
    pub peak_fraction: f64,
    /// Histogram of the finite samples, centers shifted by `-m0`.
    pub histogram: DensityHistogram,
}

impl NoiseEstimate {
    pub fn threshold(&self, mode: ThresholdMode) -> f64 {
        mode.apply(self.m0, self.s0)
    }

    /// Histogram density minus the unit-area noise Gaussian `N(0, s0)`.
    pub fn non_gaussian_tail(&self) -> Vec<f64> {
        self.histogram
            .centers
            .iter()
            .zip(&self.histogram.density)
            .map(|(&x, &d)| d - gaussian_density(x, 0.0, self.s0))
            .collect()
    }
}

/// m0 comes from a Gaussian fit to the whole histogram, s0 from the part at or
/// below m0 mirrored about it.
#[derive(Clone, Debug)]
pub struct BimodalThresholdEstimator {
    bins: usize,
    peak_guess: GaussianGuess,
    spread_guess: GaussianGuess,
    max_evaluations: usize,
}

impl BimodalThresholdEstimator {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            bins: config.histogram_bins,
            peak_guess: config.peak_guess,
            spread_guess: config.spread_guess,
            max_evaluations: config.max_fit_evaluations,
        }
    }

    pub fn estimate(&self, log_mua: &[f64]) -> Result<NoiseEstimate, AnalysisError> {
        let finite: Vec<f64> = log_mua.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Err(AnalysisError::DataQuality(format!(
                "none of the {} logMUA samples is finite",
                log_mua.len()
            )));
        }

        let histogram = DensityHistogram::from_values(&finite, self.bins)?;
        let peak = fit_gaussian(
            &histogram.centers,
            &histogram.density,
            self.peak_guess,
            self.max_evaluations,
        )?;
        let m0 = peak.mean;

        let lower: Vec<f64> = finite.iter().map(|v| v - m0).filter(|&v| v <= 0.0).collect();
        if lower.is_empty() {
            return Err(AnalysisError::ThresholdEstimation(format!(
                "no samples at or below the fitted peak {m0}"
            )));
        }
        let peak_fraction = 2.0 * lower.len() as f64 / finite.len() as f64;
        let mirrored: Vec<f64> = lower.iter().copied().chain(lower.iter().map(|v| -v)).collect();
        let mirrored_histogram = DensityHistogram::from_values(&mirrored, self.bins)?;
        let spread = fit_gaussian(
            &mirrored_histogram.centers,
            &mirrored_histogram.density,
            self.spread_guess,
            self.max_evaluations,
        )?;
        let s0 = spread.std;
        debug!(
            "noise mode m0 = {m0:.4}, s0 = {s0:.4} ({} + {} fit evaluations)",
            peak.evaluations, spread.evaluations
        );

        Ok(NoiseEstimate {
            m0,
            s0,
            peak_fraction,
            histogram: DensityHistogram {
                centers: histogram.centers.iter().map(|c| c - m0).collect(),
                ..histogram
            },
        })
    }
}
