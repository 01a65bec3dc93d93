// src/analysis/provenance.rs
use serde::{Deserialize, Serialize};

use crate::analysis::source::Annotations;
use crate::types::{DebounceOrder, ThresholdMode};

/// Bookkeeping keys written by storage layers that must not be copied onto
/// derived objects.
pub const INTERNAL_KEYS: [&str; 2] = ["nix_name", "neo_name"];

/// Returns a copy of `annotations` without the storage bookkeeping keys.
pub fn strip_internal_keys(annotations: &Annotations) -> Annotations {
    annotations
        .iter()
        .filter(|(key, _)| !INTERNAL_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Threshold parameters attached to transition streams.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdProvenance {
    pub mode: ThresholdMode,
    /// Absolute cutoff applied to the logMUA samples.
    pub threshold: f64,
    pub m0: f64,
    pub s0: f64,
}

/// How a derived signal or event stream was computed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freq_band: Option<(f64, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detrending_order: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psd_freq_res: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psd_overlap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psd_sample_rate_hz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<ThresholdProvenance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_state_duration: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_order: Option<DebounceOrder>,
}

impl Provenance {
    /// Layers `later` on top of `self`; fields set in `later` win.
    pub fn merged(&self, later: &Provenance) -> Provenance {
        Provenance {
            window_size: later.window_size.or(self.window_size),
            freq_band: later.freq_band.or(self.freq_band),
            detrending_order: later.detrending_order.or(self.detrending_order),
            psd_freq_res: later.psd_freq_res.or(self.psd_freq_res),
            psd_overlap: later.psd_overlap.or(self.psd_overlap),
            psd_sample_rate_hz: later.psd_sample_rate_hz.or(self.psd_sample_rate_hz),
            threshold: later.threshold.or(self.threshold),
            min_state_duration: later.min_state_duration.or(self.min_state_duration),
            debounce_order: later.debounce_order.or(self.debounce_order),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_keys_are_dropped() {
        let mut annotations = Annotations::new();
        annotations.insert("nix_name".into(), "neo.analogsignal.1".into());
        annotations.insert("neo_name".into(), "asig".into());
        annotations.insert("electrode_x".into(), 3.into());
        let stripped = strip_internal_keys(&annotations);
        assert_eq!(stripped.len(), 1);
        assert!(stripped.contains_key("electrode_x"));
    }

    #[test]
    fn merge_prefers_later_fields() {
        let spectral = Provenance {
            window_size: Some(40),
            freq_band: Some((250.0, 1500.0)),
            ..Provenance::default()
        };
        let detection = Provenance {
            min_state_duration: Some(5),
            debounce_order: Some(DebounceOrder::UpFirst),
            ..Provenance::default()
        };
        let merged = spectral.merged(&detection);
        assert_eq!(merged.window_size, Some(40));
        assert_eq!(merged.min_state_duration, Some(5));
        assert_eq!(merged.debounce_order, Some(DebounceOrder::UpFirst));
    }

    #[test]
    fn unset_fields_are_not_serialized() {
        let provenance = Provenance {
            window_size: Some(40),
            ..Provenance::default()
        };
        let json = serde_json::to_value(&provenance).unwrap();
        assert_eq!(json, serde_json::json!({ "window_size": 40 }));
    }
}
