use std::collections::{BTreeMap, VecDeque};
use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisError;

/// Free-form metadata carried alongside a signal.
pub type Annotations = BTreeMap<String, serde_json::Value>;

/// One recorded channel of a complete, already acquired recording.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelSignal {
    pub samples: Vec<f64>,
    pub sample_rate_hz: f64,
    pub t_start: f64,
    pub t_stop: f64,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default)]
    pub annotations: Annotations,
}

fn default_unit() -> String {
    "uV".to_owned()
}

impl ChannelSignal {
    /// Builds a channel starting at zero whose stop time follows from its length.
    pub fn new(samples: Vec<f64>, sample_rate_hz: f64) -> Self {
        let t_stop = samples.len() as f64 / sample_rate_hz;
        Self {
            samples,
            sample_rate_hz,
            t_start: 0.0,
            t_stop,
            unit: default_unit(),
            annotations: Annotations::new(),
        }
    }

    pub fn with_annotation(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.annotations.insert(key.to_owned(), value.into());
        self
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !self.sample_rate_hz.is_finite() || self.sample_rate_hz <= 0.0 {
            return Err(AnalysisError::InvalidSampleRate(self.sample_rate_hz));
        }
        if self.is_empty() {
            return Err(AnalysisError::DataQuality("channel holds no samples".into()));
        }
        if !(self.t_stop > self.t_start) {
            return Err(AnalysisError::DataQuality(format!(
                "empty time span [{}, {}]",
                self.t_start, self.t_stop
            )));
        }
        Ok(())
    }

    pub fn duration_seconds(&self) -> f64 {
        self.t_stop - self.t_start
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Timestamp of every sample, `t_start + k / rate`.
    pub fn times(&self) -> Vec<f64> {
        (0..self.samples.len())
            .map(|k| self.t_start + k as f64 / self.sample_rate_hz)
            .collect()
    }
}

/// Multichannel recording. Index order is the canonical output order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelBatch {
    pub channels: Vec<ChannelSignal>,
}

impl ChannelBatch {
    pub fn new(channels: Vec<ChannelSignal>) -> Self {
        Self { channels }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }
}

/// Trait representing something that can yield recordings on demand.
pub trait SignalSource {
    fn next_batch(&mut self) -> Result<Option<ChannelBatch>, AnalysisError>;
}

/// In-memory source useful for tests and deterministic playback.
pub struct ManualSource {
    queue: VecDeque<ChannelBatch>,
}

impl ManualSource {
    pub fn new(batches: impl IntoIterator<Item = ChannelBatch>) -> Self {
        Self {
            queue: batches.into_iter().collect(),
        }
    }
}

impl SignalSource for ManualSource {
    fn next_batch(&mut self) -> Result<Option<ChannelBatch>, AnalysisError> {
        Ok(self.queue.pop_front())
    }
}

/// Reads a single JSON-encoded batch from any reader.
pub struct JsonSource<R: Read> {
    reader: Option<R>,
}

impl<R: Read> JsonSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
        }
    }
}

impl<R: Read> SignalSource for JsonSource<R> {
    fn next_batch(&mut self) -> Result<Option<ChannelBatch>, AnalysisError> {
        let Some(reader) = self.reader.take() else {
            return Ok(None);
        };
        let batch = serde_json::from_reader(reader)
            .map_err(|err| AnalysisError::DataQuality(format!("malformed recording: {err}")))?;
        Ok(Some(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_source_yields_one_batch() {
        let json = r#"{ "channels": [
            { "samples": [0.0, 1.0, 2.0, 3.0], "sample_rate_hz": 2.0,
              "t_start": 1.0, "t_stop": 3.0, "annotations": { "electrode": 7 } }
        ] }"#;
        let mut source = JsonSource::new(json.as_bytes());
        let batch = source.next_batch().unwrap().unwrap();
        assert_eq!(batch.num_channels(), 1);
        let channel = &batch.channels[0];
        assert_eq!(channel.unit, "uV");
        assert_eq!(channel.times(), vec![1.0, 1.5, 2.0, 2.5]);
        assert_eq!(channel.annotations["electrode"], 7);
        assert!(source.next_batch().unwrap().is_none());
    }

    #[test]
    fn malformed_json_is_reported() {
        let mut source = JsonSource::new("{ not json".as_bytes());
        assert!(matches!(
            source.next_batch(),
            Err(AnalysisError::DataQuality(_))
        ));
    }

    #[test]
    fn channel_validation_rejects_bad_rate_and_span() {
        assert!(matches!(
            ChannelSignal::new(vec![0.0; 4], 0.0).validate(),
            Err(AnalysisError::InvalidSampleRate(_))
        ));
        let mut empty = ChannelSignal::new(vec![0.0; 4], 4.0);
        empty.t_stop = empty.t_start;
        assert!(matches!(empty.validate(), Err(AnalysisError::DataQuality(_))));
        assert!(matches!(
            ChannelSignal::new(Vec::new(), 4.0).validate(),
            Err(AnalysisError::DataQuality(_))
        ));
    }
}
