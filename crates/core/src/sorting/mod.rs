use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Result, StitchError};

/// Final event stream: parallel `times`/`labels` arrays in global frames.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sorting {
    times: Vec<u64>,
    labels: Vec<u32>,
    sampling_frequency: f64,
}

/// Builds a [`Sorting`] from already-merged parallel arrays. The arrays are
/// stored as given; no sorting or deduplication happens here.
pub fn build_sorting(times: Vec<u64>, labels: Vec<u32>, sampling_frequency: f64) -> Result<Sorting> {
    if times.len() != labels.len() {
        return Err(StitchError::invalid_config(format!(
            "got {} times but {} labels",
            times.len(),
            labels.len()
        )));
    }
    if !(sampling_frequency.is_finite() && sampling_frequency > 0.0) {
        return Err(StitchError::invalid_config(format!(
            "sampling frequency must be positive, got {sampling_frequency}"
        )));
    }

    Ok(Sorting {
        times,
        labels,
        sampling_frequency,
    })
}

#[derive(Deserialize)]
struct SortingFile {
    times: Vec<u64>,
    labels: Vec<u32>,
    sampling_frequency: f64,
}

impl<'de> Deserialize<'de> for Sorting {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let file = SortingFile::deserialize(deserializer)?;
        build_sorting(file.times, file.labels, file.sampling_frequency)
            .map_err(serde::de::Error::custom)
    }
}

impl Sorting {
    pub fn times(&self) -> &[u64] {
        &self.times
    }

    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    pub fn sampling_frequency(&self) -> f64 {
        self.sampling_frequency
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Distinct labels in ascending order.
    pub fn unit_ids(&self) -> Vec<u32> {
        self.labels
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Event times of one unit, in stored order.
    pub fn spike_train(&self, unit: u32) -> Vec<u64> {
        self.iter()
            .filter(|&(_, label)| label == unit)
            .map(|(time, _)| time)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, u32)> + '_ {
        self.times.iter().copied().zip(self.labels.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_arrays_in_given_order() {
        let sorting = build_sorting(vec![30, 10, 20], vec![2, 1, 2], 20_000.0).unwrap();

        assert_eq!(sorting.times(), &[30, 10, 20]);
        assert_eq!(sorting.unit_ids(), vec![1, 2]);
        assert_eq!(sorting.spike_train(2), vec![30, 20]);
        assert_eq!(sorting.len(), 3);
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let err = build_sorting(vec![1, 2], vec![1], 20_000.0).unwrap_err();
        assert!(matches!(err, StitchError::InvalidConfiguration(_)));
    }

    #[test]
    fn deserializing_applies_the_same_checks() {
        let sorting = build_sorting(vec![5, 9], vec![1, 2], 30_000.0).unwrap();
        let json = serde_json::to_string(&sorting).unwrap();
        assert_eq!(serde_json::from_str::<Sorting>(&json).unwrap(), sorting);

        let ragged = r#"{"times": [1, 2], "labels": [1], "sampling_frequency": 30000.0}"#;
        assert!(serde_json::from_str::<Sorting>(ragged).is_err());

        let silent = r#"{"times": [], "labels": [], "sampling_frequency": 0.0}"#;
        assert!(serde_json::from_str::<Sorting>(silent).is_err());
    }

    #[test]
    fn rejects_bad_sampling_frequency() {
        assert!(build_sorting(vec![], vec![], 0.0).is_err());
        assert!(build_sorting(vec![], vec![], f64::NAN).is_err());
        assert!(build_sorting(vec![], vec![], 1.0).unwrap().is_empty());
    }
}
