use serde::Serialize;

use crate::analysis::AnalysisError;
use crate::types::GaussianGuess;

// Same defaults MINPACK uses for both the relative cost and step tolerances.
const TOLERANCE: f64 = 1.49012e-8;

/// Normalized histogram with NumPy `density=True` semantics.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DensityHistogram {
    pub centers: Vec<f64>,
    pub density: Vec<f64>,
    pub bin_width: f64,
}

impl DensityHistogram {
    /// Equal-width bins over `[min, max]`, the last bin closed on the right.
    pub fn from_values(values: &[f64], bins: usize) -> Result<Self, AnalysisError> {
        if values.is_empty() || bins == 0 {
            return Err(AnalysisError::DataQuality(
                "cannot build a histogram without samples".into(),
            ));
        }
        let (mut lo, mut hi) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }
        let bin_width = (hi - lo) / bins as f64;
        let mut counts = vec![0usize; bins];
        for &v in values {
            let idx = (((v - lo) / bin_width) as usize).min(bins - 1);
            counts[idx] += 1;
        }
        let norm = values.len() as f64 * bin_width;
        Ok(Self {
            centers: (0..bins)
                .map(|i| lo + (i as f64 + 0.5) * bin_width)
                .collect(),
            density: counts.iter().map(|&c| c as f64 / norm).collect(),
            bin_width,
        })
    }
}

pub fn gaussian_density(x: f64, mean: f64, std: f64) -> f64 {
    let z = (x - mean) / std;
    (-0.5 * z * z).exp() / (std * (2.0 * std::f64::consts::PI).sqrt())
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GaussianFit {
    pub mean: f64,
    /// Always non-negative.
    pub std: f64,
    pub evaluations: usize,
}

/// Least-squares fit of a normal density to `(x, y)` by Levenberg-Marquardt.
///
/// Fails instead of returning the last iterate when the budget runs out, the
/// model vanishes over the data (zero Jacobian), or the parameters leave the
/// finite range.
pub fn fit_gaussian(
    x: &[f64],
    y: &[f64],
    guess: GaussianGuess,
    max_evaluations: usize,
) -> Result<GaussianFit, AnalysisError> {
    if !(guess.mean.is_finite() && guess.std.is_finite()) || guess.std == 0.0 {
        return Err(AnalysisError::ThresholdEstimation(format!(
            "unusable initial guess (mean {}, std {})",
            guess.mean, guess.std
        )));
    }
    let mut params = [guess.mean, guess.std];
    let mut cost = residual_cost(x, y, params);
    let mut evaluations = 1;
    let mut lambda = 1e-3;

    while evaluations < max_evaluations {
        let (jtj, jtr) = normal_equations(x, y, params);
        if !(jtj[0][0] > 0.0 && jtj[1][1] > 0.0) {
            return Err(AnalysisError::ThresholdEstimation(format!(
                "model vanished over the histogram support at mean {}, std {}",
                params[0], params[1]
            )));
        }
        if jtr == [0.0, 0.0] {
            return finish(params, evaluations);
        }
        loop {
            let a = jtj[0][0] * (1.0 + lambda);
            let d = jtj[1][1] * (1.0 + lambda);
            let b = jtj[0][1];
            let det = a * d - b * b;
            let step = [
                (-jtr[0] * d + jtr[1] * b) / det,
                (-jtr[1] * a + jtr[0] * b) / det,
            ];
            let candidate = [params[0] + step[0], params[1] + step[1]];
            let new_cost = residual_cost(x, y, candidate);
            evaluations += 1;

            let step_norm = step[0].hypot(step[1]);
            let small_step = step_norm <= TOLERANCE * (params[0].hypot(params[1]) + TOLERANCE);
            if new_cost.is_finite() && new_cost < cost {
                let reduction = (cost - new_cost) / cost;
                params = candidate;
                cost = new_cost;
                lambda = (lambda / 10.0).max(1e-12);
                if reduction <= TOLERANCE || small_step {
                    return finish(params, evaluations);
                }
                break;
            }
            if small_step {
                return finish(params, evaluations);
            }
            lambda *= 10.0;
            if evaluations >= max_evaluations {
                break;
            }
        }
    }
    Err(AnalysisError::ThresholdEstimation(format!(
        "no convergence within {max_evaluations} evaluations"
    )))
}

fn finish(params: [f64; 2], evaluations: usize) -> Result<GaussianFit, AnalysisError> {
    let mean = params[0];
    let std = params[1].abs();
    if !mean.is_finite() || !std.is_finite() || std == 0.0 {
        return Err(AnalysisError::ThresholdEstimation(format!(
            "degenerate fit (mean {mean}, std {std})"
        )));
    }
    Ok(GaussianFit {
        mean,
        std,
        evaluations,
    })
}

fn residual_cost(x: &[f64], y: &[f64], [mean, std]: [f64; 2]) -> f64 {
    x.iter()
        .zip(y)
        .map(|(&xi, &yi)| {
            let r = gaussian_density(xi, mean, std) - yi;
            r * r
        })
        .sum()
}

/// `(JᵀJ, Jᵀr)` for residuals `r = model - y`.
fn normal_equations(x: &[f64], y: &[f64], [mean, std]: [f64; 2]) -> ([[f64; 2]; 2], [f64; 2]) {
    let mut jtj = [[0.0; 2]; 2];
    let mut jtr = [0.0; 2];
    for (&xi, &yi) in x.iter().zip(y) {
        let g = gaussian_density(xi, mean, std);
        let dx = xi - mean;
        let d_mean = g * dx / (std * std);
        let d_std = g * (dx * dx / (std * std * std) - 1.0 / std);
        let r = g - yi;
        jtj[0][0] += d_mean * d_mean;
        jtj[0][1] += d_mean * d_std;
        jtj[1][1] += d_std * d_std;
        jtr[0] += d_mean * r;
        jtr[1] += d_std * r;
    }
    jtj[1][0] = jtj[0][1];
    (jtj, jtr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_matches_numpy_density() {
        let hist = DensityHistogram::from_values(&[0.0, 1.0, 2.0, 3.0], 3).unwrap();
        assert_eq!(hist.centers, vec![0.5, 1.5, 2.5]);
        assert_eq!(hist.density, vec![0.25, 0.25, 0.5]);
        let area: f64 = hist.density.iter().sum::<f64>() * hist.bin_width;
        assert!((area - 1.0).abs() < 1e-12);
    }

    #[test]
    fn constant_values_widen_the_range() {
        let hist = DensityHistogram::from_values(&[2.0, 2.0, 2.0], 2).unwrap();
        assert_eq!(hist.bin_width, 0.5);
        assert_eq!(hist.density, vec![0.0, 2.0]);
    }

    #[test]
    fn recovers_exact_gaussian() {
        let x: Vec<f64> = (0..80).map(|i| -3.0 + i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|&v| gaussian_density(v, 1.5, 0.7)).collect();
        let fit = fit_gaussian(&x, &y, GaussianGuess::new(0.5, 1.0), 600).unwrap();
        assert!((fit.mean - 1.5).abs() < 1e-6, "mean {}", fit.mean);
        assert!((fit.std - 0.7).abs() < 1e-6, "std {}", fit.std);
    }

    #[test]
    fn far_guess_reports_failure() {
        let x: Vec<f64> = (0..50).map(|i| -6.0 + i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|&v| gaussian_density(v, -4.0, 0.5)).collect();
        let result = fit_gaussian(&x, &y, GaussianGuess::new(1000.0, 0.001), 600);
        assert!(matches!(result, Err(AnalysisError::ThresholdEstimation(_))));
    }

    #[test]
    fn exhausted_budget_reports_failure() {
        let x: Vec<f64> = (0..50).map(|i| -6.0 + i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|&v| gaussian_density(v, -4.0, 0.5)).collect();
        let result = fit_gaussian(&x, &y, GaussianGuess::new(-3.0, 1.0), 1);
        assert!(matches!(result, Err(AnalysisError::ThresholdEstimation(_))));
    }

    #[test]
    fn zero_spread_guess_is_rejected() {
        let result = fit_gaussian(&[0.0], &[1.0], GaussianGuess::new(0.0, 0.0), 600);
        assert!(matches!(result, Err(AnalysisError::ThresholdEstimation(_))));
    }
}
