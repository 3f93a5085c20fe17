//! Minimal amplitude-threshold block sorter.
//!
//! Events are detected where any channel's absolute amplitude reaches the
//! detection threshold, then grouped by peak channel. Groups are matched
//! against the reference classifiers of the previous block by channel and
//! mean peak amplitude, which is enough to carry unit identities across
//! blocks for well-separated units.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    BlockSorter, BlockSorting, ClassifierMap, Recording, RecordingInfo, Result, StitchError,
    TraceRecording,
};

const DEFAULT_DETECT_THRESHOLD: f32 = 5.0;
const DEFAULT_REFRACTORY_FRAMES: usize = 30;
const DEFAULT_AMPLITUDE_TOLERANCE: f32 = 0.25;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Absolute amplitude an event has to reach on its peak channel.
    pub detect_threshold: f32,
    /// Minimum distance between two detections, in frames.
    pub refractory_frames: usize,
    /// Relative amplitude difference still accepted as the same unit.
    pub amplitude_tolerance: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            detect_threshold: DEFAULT_DETECT_THRESHOLD,
            refractory_frames: DEFAULT_REFRACTORY_FRAMES,
            amplitude_tolerance: DEFAULT_AMPLITUDE_TOLERANCE,
        }
    }
}

/// What a unit looked like in the block that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakClassifier {
    pub channel: usize,
    pub mean_amplitude: f32,
    pub count: usize,
}

impl PeakClassifier {
    fn matches(&self, channel: usize, amplitude: f32, tolerance: f32) -> bool {
        self.channel == channel
            && (amplitude - self.mean_amplitude).abs() <= tolerance * self.mean_amplitude
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Detection {
    frame: usize,
    channel: usize,
    amplitude: f32,
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ThresholdSortError(String);

#[derive(Debug, Default, Clone, Copy)]
pub struct ThresholdSorter;

impl ThresholdSorter {
    pub fn new() -> Self {
        Self
    }

    fn detect(recording: &TraceRecording, config: &ThresholdConfig) -> Vec<Detection> {
        let mut detections = Vec::new();
        let frame_count = recording.frame_count();
        let mut frame = 0;

        while frame < frame_count {
            let Some(crossing) = peak_of(recording.frame(frame))
                .filter(|&(_, amplitude)| amplitude >= config.detect_threshold)
            else {
                frame += 1;
                continue;
            };

            // Settle on the largest sample within the refractory window.
            let window_end = (frame + config.refractory_frames.max(1)).min(frame_count);
            let mut best = Detection {
                frame,
                channel: crossing.0,
                amplitude: crossing.1,
            };
            for candidate in frame + 1..window_end {
                if let Some((channel, amplitude)) = peak_of(recording.frame(candidate)) {
                    if amplitude > best.amplitude {
                        best = Detection {
                            frame: candidate,
                            channel,
                            amplitude,
                        };
                    }
                }
            }

            detections.push(best);
            frame = best.frame + config.refractory_frames.max(1);
        }

        detections
    }
}

fn peak_of(samples: &[f32]) -> Option<(usize, f32)> {
    samples
        .iter()
        .map(|sample| sample.abs())
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

impl BlockSorter<TraceRecording> for ThresholdSorter {
    type Config = ThresholdConfig;
    type Classifier = PeakClassifier;
    type Error = ThresholdSortError;

    fn check_valid(&self, config: &ThresholdConfig, info: &RecordingInfo) -> Result<()> {
        if !(config.detect_threshold.is_finite() && config.detect_threshold > 0.0) {
            return Err(StitchError::invalid_config(format!(
                "detect threshold must be positive, got {}",
                config.detect_threshold
            )));
        }
        if !(config.amplitude_tolerance.is_finite() && config.amplitude_tolerance >= 0.0) {
            return Err(StitchError::invalid_config(format!(
                "amplitude tolerance must be non-negative, got {}",
                config.amplitude_tolerance
            )));
        }
        if config.refractory_frames > info.frame_count {
            return Err(StitchError::invalid_config(format!(
                "refractory window of {} frames exceeds the {}-frame recording",
                config.refractory_frames, info.frame_count
            )));
        }
        Ok(())
    }

    fn sort_block(
        &self,
        recording: &TraceRecording,
        config: &ThresholdConfig,
        label_offset: u32,
        reference: Option<&ClassifierMap<PeakClassifier>>,
    ) -> std::result::Result<BlockSorting<PeakClassifier>, ThresholdSortError> {
        let detections = Self::detect(recording, config);

        // Channels in order of their first detection, so minting is deterministic.
        let mut groups: Vec<(usize, Vec<Detection>)> = Vec::new();
        for detection in &detections {
            match groups.iter_mut().find(|(channel, _)| *channel == detection.channel) {
                Some((_, members)) => members.push(*detection),
                None => groups.push((detection.channel, vec![*detection])),
            }
        }

        // Reference labels above the offset belong to units seen only in the
        // previous block's padding; fresh labels must not reuse them.
        let mut next_label = reference
            .and_then(|reference| reference.keys().next_back().copied())
            .map_or(label_offset, |largest| largest.max(label_offset));
        let mut label_of_channel = BTreeMap::new();
        let mut classifiers = ClassifierMap::new();
        for (channel, members) in &groups {
            let count = members.len();
            let mean_amplitude = members.iter().map(|d| d.amplitude).sum::<f32>() / count as f32;

            let continued = reference.and_then(|reference| {
                reference
                    .iter()
                    .filter(|(_, c)| c.matches(*channel, mean_amplitude, config.amplitude_tolerance))
                    .min_by(|a, b| {
                        let da = (a.1.mean_amplitude - mean_amplitude).abs();
                        let db = (b.1.mean_amplitude - mean_amplitude).abs();
                        da.total_cmp(&db)
                    })
                    .map(|(&label, _)| label)
            });
            let label = match continued {
                Some(label) => label,
                None => {
                    next_label = next_label.checked_add(1).ok_or_else(|| {
                        ThresholdSortError(format!("label space exhausted above {label_offset}"))
                    })?;
                    next_label
                }
            };

            label_of_channel.insert(*channel, label);
            classifiers.insert(
                label,
                PeakClassifier {
                    channel: *channel,
                    mean_amplitude,
                    count,
                },
            );
        }

        let mut sorting = BlockSorting::empty();
        for detection in detections {
            sorting.times.push(detection.frame as u64);
            sorting.labels.push(label_of_channel[&detection.channel]);
        }
        sorting.classifiers = classifiers;

        Ok(sorting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sort_chunked, ChannelLocation, StitchParameters};

    fn recording(frame_count: usize, spikes: &[(usize, usize, f32)]) -> TraceRecording {
        let mut frames = vec![vec![0.0_f32; 3]; frame_count];
        for &(frame, channel, amplitude) in spikes {
            frames[frame][channel] = -amplitude;
            // A smaller echo on the neighbouring channel.
            frames[frame][(channel + 1) % 3] = -amplitude * 0.3;
        }
        TraceRecording::from_frames(
            1_000.0,
            (0..3).map(|i| ChannelLocation::planar(0.0, i as f64 * 20.0)).collect(),
            frames,
        )
        .unwrap()
    }

    #[test]
    fn detects_peaks_and_respects_refractory_window() {
        let rec = recording(200, &[(10, 0, 8.0), (12, 0, 9.0), (100, 2, 12.0)]);
        let config = ThresholdConfig::default();

        let sorting = ThresholdSorter.sort_block(&rec, &config, 0, None).unwrap();

        assert_eq!(sorting.times, vec![12, 100]);
        assert_eq!(sorting.labels, vec![1, 2]);
        assert_eq!(sorting.classifiers[&1].channel, 0);
        assert_eq!(sorting.classifiers[&2].mean_amplitude, 12.0);
    }

    #[test]
    fn mints_above_offset_and_continues_reference_labels() {
        let rec = recording(300, &[(50, 1, 10.0), (150, 2, 7.0)]);
        let config = ThresholdConfig::default();
        let reference = ClassifierMap::from([(
            3,
            PeakClassifier {
                channel: 1,
                mean_amplitude: 10.5,
                count: 4,
            },
        )]);

        let sorting = ThresholdSorter
            .sort_block(&rec, &config, 40, Some(&reference))
            .unwrap();

        assert_eq!(sorting.labels, vec![3, 41]);
        assert_eq!(sorting.classifiers.keys().copied().collect::<Vec<_>>(), vec![3, 41]);
    }

    #[test]
    fn amplitude_outside_tolerance_is_a_new_unit() {
        let rec = recording(100, &[(50, 1, 20.0)]);
        let reference = ClassifierMap::from([(
            1,
            PeakClassifier {
                channel: 1,
                mean_amplitude: 10.0,
                count: 1,
            },
        )]);

        let sorting = ThresholdSorter
            .sort_block(&rec, &ThresholdConfig::default(), 1, Some(&reference))
            .unwrap();

        assert_eq!(sorting.labels, vec![2]);
    }

    #[test]
    fn mints_above_reference_labels_from_previous_padding() {
        let rec = recording(300, &[(50, 0, 8.0)]);
        let reference = ClassifierMap::from([(
            5,
            PeakClassifier {
                channel: 1,
                mean_amplitude: 10.0,
                count: 1,
            },
        )]);

        let sorting = ThresholdSorter
            .sort_block(&rec, &ThresholdConfig::default(), 2, Some(&reference))
            .unwrap();

        assert_eq!(sorting.labels, vec![6]);
    }

    #[test]
    fn unit_first_seen_in_padding_does_not_share_a_label() {
        let rec = recording(4_000, &[(100, 0, 10.0), (2_200, 2, 15.0), (3_000, 1, 12.0)]);
        let params = StitchParameters::new(ThresholdConfig::default(), 2.0).with_padding(500);

        let sorting = sort_chunked(&rec, &params, &ThresholdSorter).unwrap();

        assert_eq!(sorting.times(), &[100, 2_200, 3_000]);
        assert_eq!(sorting.labels(), &[1, 2, 3]);
        assert_eq!(sorting.unit_ids().len(), 3);
    }

    #[test]
    fn rejects_invalid_config() {
        let info = recording(10, &[]).info();
        let mut config = ThresholdConfig::default();
        config.detect_threshold = 0.0;
        assert!(ThresholdSorter.check_valid(&config, &info).is_err());

        let config = ThresholdConfig::default();
        assert!(ThresholdSorter.check_valid(&config, &info).is_err());

        let config = ThresholdConfig {
            refractory_frames: 5,
            ..Default::default()
        };
        assert!(ThresholdSorter.check_valid(&config, &info).is_ok());
    }

    #[test]
    fn stitched_units_keep_labels_across_blocks() {
        let spikes: Vec<_> = (0..20)
            .flat_map(|i| [(i * 500 + 100, 0, 10.0), (i * 500 + 300, 2, 15.0)])
            .collect();
        let rec = recording(10_000, &spikes);
        let params = StitchParameters::new(ThresholdConfig::default(), 2.0).with_padding(200);

        let sorting = sort_chunked(&rec, &params, &ThresholdSorter).unwrap();

        assert_eq!(sorting.len(), spikes.len());
        assert_eq!(sorting.unit_ids(), vec![1, 2]);
        assert_eq!(sorting.spike_train(1).len(), 20);
        assert!(sorting.times().windows(2).all(|w| w[0] < w[1]));
    }
}
