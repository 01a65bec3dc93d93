// src/analysis/spectral.rs
use std::sync::Arc;

use log::debug;
use rustfft::{num_complex::Complex64, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::analysis::provenance::{strip_internal_keys, Provenance};
use crate::analysis::source::ChannelSignal;
use crate::analysis::AnalysisError;
use crate::types::LogMuaConfig;

/// One-sided power spectral density of a single window.
#[derive(Clone, Debug)]
pub struct FrequencySpectrum {
    pub sample_rate_hz: f64,
    pub frequencies_hz: Vec<f64>,
    pub power: Vec<f64>,
}

impl FrequencySpectrum {
    /// Mean power over the bins picked by `band`.
    pub fn band_mean(&self, band: &BandSelection) -> f64 {
        let bins = &self.power[band.low_idx..band.high_idx];
        bins.iter().sum::<f64>() / bins.len() as f64
    }
}

/// Half-open bin range `[low_idx, high_idx)` covering a frequency band.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BandSelection {
    pub low_idx: usize,
    pub high_idx: usize,
}

impl BandSelection {
    /// Picks the first bin at or above each band edge.
    pub fn locate(frequencies_hz: &[f64], low: f64, high: f64) -> Result<Self, AnalysisError> {
        let band_error = || AnalysisError::BandRange {
            low,
            high,
            resolution: frequencies_hz.get(1).copied().unwrap_or(0.0),
            max_hz: frequencies_hz.last().copied().unwrap_or(0.0),
        };
        let low_idx = frequencies_hz
            .iter()
            .position(|&f| f >= low)
            .ok_or_else(band_error)?;
        let high_idx = frequencies_hz
            .iter()
            .position(|&f| f >= high)
            .ok_or_else(band_error)?;
        if high_idx <= low_idx {
            return Err(band_error());
        }
        Ok(Self { low_idx, high_idx })
    }
}

/// Welch periodogram averaging with a fixed segment length.
pub struct WelchEstimator {
    sample_rate_hz: f64,
    segment_len: usize,
    overlap_len: usize,
    window: Vec<f64>,
    scale: f64,
    fft: Arc<dyn Fft<f64>>,
}

impl WelchEstimator {
    /// Segment length is `floor(fs / freq_res)`, overlap `floor(len * overlap)`.
    pub fn with_resolution(
        sample_rate_hz: f64,
        freq_res: f64,
        overlap: f64,
    ) -> Result<Self, AnalysisError> {
        if !sample_rate_hz.is_finite() || sample_rate_hz <= 0.0 {
            return Err(AnalysisError::InvalidSampleRate(sample_rate_hz));
        }
        let segment_len = (sample_rate_hz / freq_res).floor() as usize;
        if segment_len < 2 {
            return Err(AnalysisError::BandRange {
                low: freq_res,
                high: freq_res,
                resolution: freq_res,
                max_hz: sample_rate_hz / 2.0,
            });
        }
        let overlap_len = (segment_len as f64 * overlap).floor() as usize;
        let window = hann_periodic(segment_len);
        let scale = 1.0 / (sample_rate_hz * window.iter().map(|w| w * w).sum::<f64>());
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(segment_len);
        Ok(Self {
            sample_rate_hz,
            segment_len,
            overlap_len,
            window,
            scale,
            fft,
        })
    }

    pub fn segment_len(&self) -> usize {
        self.segment_len
    }

    pub fn frequencies(&self) -> Vec<f64> {
        (0..=self.segment_len / 2)
            .map(|k| k as f64 * self.sample_rate_hz / self.segment_len as f64)
            .collect()
    }

    pub fn segment_count(&self, len: usize) -> usize {
        if len < self.segment_len {
            return 0;
        }
        let step = self.segment_len - self.overlap_len;
        (len - self.overlap_len) / step
    }

    pub fn compute(&self, data: &[f64]) -> Result<FrequencySpectrum, AnalysisError> {
        let segments = self.segment_count(data.len());
        if segments == 0 {
            return Err(AnalysisError::DataQuality(format!(
                "{} samples cannot hold a PSD segment of {}",
                data.len(),
                self.segment_len
            )));
        }
        let step = self.segment_len - self.overlap_len;
        let bins = self.segment_len / 2 + 1;
        let mut power = vec![0.0; bins];
        let mut buffer = vec![Complex64::new(0.0, 0.0); self.segment_len];
        for s in 0..segments {
            let segment = &data[s * step..s * step + self.segment_len];
            for ((slot, &x), &w) in buffer.iter_mut().zip(segment).zip(&self.window) {
                *slot = Complex64::new(x * w, 0.0);
            }
            self.fft.process(&mut buffer);
            for (acc, c) in power.iter_mut().zip(&buffer) {
                *acc += c.norm_sqr() * self.scale;
            }
        }
        // One-sided: fold negative frequencies, except DC and an even-length Nyquist bin.
        let last_doubled = if self.segment_len % 2 == 0 {
            bins - 1
        } else {
            bins
        };
        for (k, p) in power.iter_mut().enumerate() {
            *p /= segments as f64;
            if k > 0 && k < last_doubled {
                *p *= 2.0;
            }
        }
        Ok(FrequencySpectrum {
            sample_rate_hz: self.sample_rate_hz,
            frequencies_hz: self.frequencies(),
            power,
        })
    }
}

fn hann_periodic(len: usize) -> Vec<f64> {
    (0..len)
        .map(|n| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * n as f64 / len as f64).cos())
        .collect()
}

/// Removes slow drift from one analysis window.
///
/// Order 0 leaves the window untouched, order 1 subtracts the mean and order 2
/// also subtracts `linspace(-n/2, n/2, n) * mean(diff(x))`.
pub fn detrend(window: &[f64], order: u8) -> Vec<f64> {
    let mut out = window.to_vec();
    let n = out.len();
    if order == 0 || n == 0 {
        return out;
    }
    let mean = out.iter().sum::<f64>() / n as f64;
    out.iter_mut().for_each(|x| *x -= mean);
    if order > 1 && n > 1 {
        // The mean first difference telescopes to the end-point slope.
        let slope = (out[n - 1] - out[0]) / (n - 1) as f64;
        let half = n as f64 / 2.0;
        let step = n as f64 / (n - 1) as f64;
        for (i, x) in out.iter_mut().enumerate() {
            *x -= (-half + i as f64 * step) * slope;
        }
    }
    out
}

/// Reduced-rate log-power series derived from one raw channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogMuaSignal {
    pub signal: ChannelSignal,
    pub provenance: Provenance,
}

impl LogMuaSignal {
    pub fn samples(&self) -> &[f64] {
        &self.signal.samples
    }

    pub fn times(&self) -> Vec<f64> {
        self.signal.times()
    }
}

/// One log band power sample per `round(fs / low)` raw samples.
pub struct LogMuaEstimator {
    config: LogMuaConfig,
}

impl LogMuaEstimator {
    pub fn new(config: LogMuaConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn window_size(&self, sample_rate_hz: f64) -> usize {
        (sample_rate_hz / self.config.freq_band.0).round() as usize
    }

    pub fn estimate(&self, channel: &ChannelSignal) -> Result<LogMuaSignal, AnalysisError> {
        channel.validate()?;
        let (low, high) = self.config.freq_band;
        let fs = channel.sample_rate_hz;
        let welch = WelchEstimator::with_resolution(fs, low, self.config.psd_overlap)?;
        let band = BandSelection::locate(&welch.frequencies(), low, high)?;
        let window_size = self.window_size(fs);
        let windows = channel.len() / window_size;
        if windows == 0 {
            return Err(AnalysisError::DataQuality(format!(
                "{} samples are shorter than one analysis window of {window_size}",
                channel.len()
            )));
        }
        let sample_rate_hz = windows as f64 / channel.duration_seconds();
        debug!(
            "logMUA: {windows} windows of {window_size} samples, PSD segment {}, {sample_rate_hz:.3} Hz",
            welch.segment_len()
        );
        let samples = channel
            .samples
            .chunks_exact(window_size)
            .map(|chunk| -> Result<f64, AnalysisError> {
                let detrended = detrend(chunk, self.config.detrending_order);
                let spectrum = welch.compute(&detrended)?;
                Ok(spectrum.band_mean(&band).ln())
            })
            .collect::<Result<Vec<f64>, _>>()?;
        Ok(LogMuaSignal {
            signal: ChannelSignal {
                samples,
                sample_rate_hz,
                t_start: channel.t_start,
                t_stop: channel.t_stop,
                unit: "dimensionless".to_owned(),
                annotations: strip_internal_keys(&channel.annotations),
            },
            provenance: Provenance {
                window_size: Some(window_size),
                freq_band: Some((low, high)),
                detrending_order: Some(self.config.detrending_order),
                psd_freq_res: Some(low),
                psd_overlap: Some(self.config.psd_overlap),
                psd_sample_rate_hz: Some(fs),
                ..Provenance::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use rand_distr::{Distribution, Normal};

    fn band_config(low: f64, high: f64) -> LogMuaConfig {
        LogMuaConfig {
            freq_band: (low, high),
            detrending_order: 2,
            psd_overlap: 0.5,
        }
    }

    fn sine(freq_hz: f64, amplitude: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| amplitude * (2.0 * std::f64::consts::PI * freq_hz * i as f64 / fs).sin())
            .collect()
    }

    fn variance(values: &[f64]) -> f64 {
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
    }

    #[test]
    fn welch_grid_matches_resolution() {
        let welch = WelchEstimator::with_resolution(1000.0, 10.0, 0.5).unwrap();
        let freqs = welch.frequencies();
        assert_eq!(welch.segment_len(), 100);
        assert_eq!(freqs.len(), 51);
        assert_eq!(freqs[1], 10.0);
        assert_eq!(*freqs.last().unwrap(), 500.0);
        assert_eq!(welch.segment_count(100), 1);
        assert_eq!(welch.segment_count(200), 3);
        assert_eq!(welch.segment_count(99), 0);
    }

    #[test]
    fn density_scaling_preserves_sine_power() {
        let welch = WelchEstimator::with_resolution(1000.0, 10.0, 0.5).unwrap();
        let spectrum = welch.compute(&sine(50.0, 2.0, 1000.0, 300)).unwrap();
        let total: f64 = spectrum.power.iter().sum::<f64>() * spectrum.frequencies_hz[1];
        assert!((total - 2.0).abs() < 1e-9, "total power {total}");
        let peak = spectrum
            .power
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k)
            .unwrap();
        assert_eq!(spectrum.frequencies_hz[peak], 50.0);
    }

    #[test]
    fn band_selection_is_half_open() {
        let freqs: Vec<f64> = (0..=50).map(|k| k as f64 * 10.0).collect();
        let band = BandSelection::locate(&freqs, 10.0, 200.0).unwrap();
        assert_eq!(band, BandSelection { low_idx: 1, high_idx: 20 });
        let between = BandSelection::locate(&freqs, 15.0, 200.0).unwrap();
        assert_eq!(between.low_idx, 2);
    }

    #[test]
    fn band_beyond_grid_is_rejected() {
        let freqs: Vec<f64> = (0..=50).map(|k| k as f64 * 10.0).collect();
        assert!(matches!(
            BandSelection::locate(&freqs, 10.0, 600.0),
            Err(AnalysisError::BandRange { .. })
        ));
        assert!(matches!(
            BandSelection::locate(&freqs, 12.0, 15.0),
            Err(AnalysisError::BandRange { .. })
        ));
    }

    #[test]
    fn detrending_orders() {
        let ramp: Vec<f64> = (0..50).map(|i| 3.0 + 2.0 * i as f64).collect();
        assert_eq!(detrend(&ramp, 0), ramp);

        let centered = detrend(&ramp, 1);
        assert!(centered.iter().sum::<f64>().abs() < 1e-9);
        let spread = centered.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        assert!((spread - 49.0).abs() < 1e-9);

        // Order 2 leaves only a residual ramp of at most one unit.
        let flattened = detrend(&ramp, 2);
        let residual = flattened.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        assert!(residual <= 1.0 + 1e-9, "residual {residual}");
    }

    #[test]
    fn log_mua_length_rate_and_provenance() {
        let fs = 1000.0;
        let channel = ChannelSignal::new(sine(50.0, 1.0, fs, 1234), fs)
            .with_annotation("nix_name", "neo.analogsignal.0")
            .with_annotation("electrode", 4);
        let estimator = LogMuaEstimator::new(band_config(10.0, 200.0)).unwrap();
        let log_mua = estimator.estimate(&channel).unwrap();
        assert_eq!(log_mua.samples().len(), 12);
        assert!((log_mua.signal.sample_rate_hz - 12.0 / 1.234).abs() < 1e-9);
        assert_eq!(log_mua.signal.unit, "dimensionless");
        assert!(!log_mua.signal.annotations.contains_key("nix_name"));
        assert_eq!(log_mua.signal.annotations["electrode"], 4);
        assert_eq!(log_mua.provenance.window_size, Some(100));
        assert_eq!(log_mua.provenance.freq_band, Some((10.0, 200.0)));
        assert_eq!(log_mua.provenance.psd_freq_res, Some(10.0));
        assert_eq!(log_mua.provenance.psd_sample_rate_hz, Some(fs));
        assert!((log_mua.times()[1] - 1.234 / 12.0).abs() < 1e-12);
    }

    #[test]
    fn band_above_nyquist_fails_per_channel() {
        let estimator = LogMuaEstimator::new(band_config(10.0, 600.0)).unwrap();
        let channel = ChannelSignal::new(vec![0.5; 1000], 1000.0);
        assert!(matches!(
            estimator.estimate(&channel),
            Err(AnalysisError::BandRange { .. })
        ));
    }

    #[test]
    fn signal_shorter_than_a_window_is_rejected() {
        let estimator = LogMuaEstimator::new(band_config(10.0, 200.0)).unwrap();
        let channel = ChannelSignal::new(vec![0.5; 99], 1000.0);
        assert!(matches!(
            estimator.estimate(&channel),
            Err(AnalysisError::DataQuality(_))
        ));
    }

    #[test]
    fn in_band_sine_is_steadier_than_white_noise() {
        let fs = 1000.0;
        let n = 10_000;
        let mut rng = StdRng::seed_from_u64(7);
        let faint = Normal::<f64>::new(0.0, 1e-6).unwrap();
        let tone: Vec<f64> = sine(50.0, 1.0, fs, n)
            .into_iter()
            .map(|x| x + faint.sample(&mut rng))
            .collect();
        // Same mean power as the unit sine.
        let white = Normal::<f64>::new(0.0, 0.5_f64.sqrt()).unwrap();
        let noise: Vec<f64> = (0..n).map(|_| white.sample(&mut rng)).collect();

        let estimator = LogMuaEstimator::new(band_config(10.0, 200.0)).unwrap();
        let tone_mua = estimator.estimate(&ChannelSignal::new(tone, fs)).unwrap();
        let noise_mua = estimator.estimate(&ChannelSignal::new(noise, fs)).unwrap();
        let tone_var = variance(tone_mua.samples());
        let noise_var = variance(noise_mua.samples());
        assert!(
            tone_var < 0.01 * noise_var,
            "tone variance {tone_var} vs noise variance {noise_var}"
        );
    }
}
