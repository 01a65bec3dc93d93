use serde::Serialize;

use crate::analysis::provenance::{strip_internal_keys, Provenance};
use crate::analysis::source::{Annotations, ChannelSignal};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    UpToDown,
    DownToUp,
}

/// Onset times of one transition kind on one channel.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransitionStream {
    pub kind: TransitionKind,
    pub times: Vec<f64>,
    pub sample_rate_hz: f64,
    pub t_start: f64,
    pub t_stop: f64,
    pub annotations: Annotations,
    pub provenance: Provenance,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransitionPair {
    pub up_to_down: TransitionStream,
    pub down_to_up: TransitionStream,
}

impl TransitionPair {
    /// Every event of both kinds in time order.
    pub fn events(&self) -> Vec<(f64, TransitionKind)> {
        let mut events: Vec<(f64, TransitionKind)> = self
            .up_to_down
            .times
            .iter()
            .map(|&t| (t, TransitionKind::UpToDown))
            .chain(
                self.down_to_up
                    .times
                    .iter()
                    .map(|&t| (t, TransitionKind::DownToUp)),
            )
            .collect();
        events.sort_by(|a, b| a.0.total_cmp(&b.0));
        events
    }
}

/// Splits state flips into `(up_to_down, down_to_up)` onset times.
///
/// Each onset is stamped with the time of the first sample in the new state.
pub fn transition_times(states: &[bool], times: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut up_to_down = Vec::new();
    let mut down_to_up = Vec::new();
    for (pair, &t) in states.windows(2).zip(times.iter().skip(1)) {
        match (pair[0], pair[1]) {
            (true, false) => up_to_down.push(t),
            (false, true) => down_to_up.push(t),
            _ => {}
        }
    }
    (up_to_down, down_to_up)
}

/// Builds both transition streams for a channel whose states are aligned with `source`.
pub fn extract_transitions(
    states: &[bool],
    source: &ChannelSignal,
    provenance: &Provenance,
) -> TransitionPair {
    let (up_to_down, down_to_up) = transition_times(states, &source.times());
    let annotations = strip_internal_keys(&source.annotations);
    let stream = |kind, times| TransitionStream {
        kind,
        times,
        sample_rate_hz: source.sample_rate_hz,
        t_start: source.t_start,
        t_stop: source.t_stop,
        annotations: annotations.clone(),
        provenance: provenance.clone(),
    };
    TransitionPair {
        up_to_down: stream(TransitionKind::UpToDown, up_to_down),
        down_to_up: stream(TransitionKind::DownToUp, down_to_up),
    }
}

/// Mean logMUA trajectory around onsets of one kind.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransitionProfile {
    pub lag_seconds: Vec<f64>,
    /// NaN everywhere when `count` is zero.
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransitionProfiles {
    /// Around DOWN→UP onsets.
    pub up: TransitionProfile,
    /// Around UP→DOWN onsets.
    pub down: TransitionProfile,
}

/// Averages `log_mua[i - half_window .. i + half_window]` over every onset `i`
/// that has a full window on both sides. Windows holding non-finite samples
/// are skipped.
pub fn average_transition_profiles(
    log_mua: &[f64],
    states: &[bool],
    sample_rate_hz: f64,
    half_window: usize,
) -> TransitionProfiles {
    let mut up_windows: Vec<&[f64]> = Vec::new();
    let mut down_windows: Vec<&[f64]> = Vec::new();
    let len = states.len().min(log_mua.len());
    for i in (half_window + 1)..len.saturating_sub(half_window) {
        if states[i - 1] == states[i] {
            continue;
        }
        let window = &log_mua[i - half_window..i + half_window];
        if window.iter().any(|v| !v.is_finite()) {
            continue;
        }
        if states[i] {
            up_windows.push(window);
        } else {
            down_windows.push(window);
        }
    }
    let lag_seconds: Vec<f64> = (0..2 * half_window)
        .map(|k| (k as f64 - half_window as f64) / sample_rate_hz)
        .collect();
    TransitionProfiles {
        up: profile(&up_windows, &lag_seconds),
        down: profile(&down_windows, &lag_seconds),
    }
}

fn profile(windows: &[&[f64]], lag_seconds: &[f64]) -> TransitionProfile {
    let width = lag_seconds.len();
    let count = windows.len();
    let mut mean = vec![0.0; width];
    let mut std = vec![0.0; width];
    for k in 0..width {
        let m = windows.iter().map(|w| w[k]).sum::<f64>() / count as f64;
        let var = windows.iter().map(|w| (w[k] - m).powi(2)).sum::<f64>() / count as f64;
        mean[k] = m;
        std[k] = var.sqrt();
    }
    TransitionProfile {
        lag_seconds: lag_seconds.to_vec(),
        mean,
        std,
        count,
    }
}
