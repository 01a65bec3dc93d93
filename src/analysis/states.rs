use crate::types::DebounceOrder;

/// `true` (UP) where the sample lies strictly above `threshold`.
pub fn classify(log_mua: &[f64], threshold: f64) -> Vec<bool> {
    log_mua.iter().map(|&v| v > threshold).collect()
}

/// Flips every run of `target` shorter than `min_duration` to the opposite
/// state.
///
/// Runs are only visited on a transition into `target`, so a run starting at
/// index 0 is left alone. A run reaching the end of the sequence is measured
/// like any other.
pub fn clear_short_runs(states: &mut [bool], target: bool, min_duration: usize) {
    let n = states.len();
    let mut i = 0;
    while i + 1 < n {
        if states[i] != target && states[i + 1] == target {
            i += 1;
            let start = i;
            while i < n && states[i] == target {
                i += 1;
            }
            if i - start < min_duration {
                states[start..i].fill(!target);
            }
        } else {
            i += 1;
        }
    }
}

/// Removes short UP and DOWN runs in the given order.
///
/// With [`DebounceOrder::DownFirst`] cleared DOWN gaps let neighbouring UP
/// runs merge before short UP runs are judged, so the two orders can segment
/// the same input differently.
pub fn debounce(states: &[bool], min_duration: usize, order: DebounceOrder) -> Vec<bool> {
    let mut cleaned = states.to_vec();
    for target in order.passes() {
        clear_short_runs(&mut cleaned, target, min_duration);
    }
    cleaned
}
