use serde::{Deserialize, Serialize};

use crate::{Result, StitchError};

/// Spatial position of a single electrode channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelLocation {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl ChannelLocation {
    pub fn planar(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }
}

/// Geometry snapshot handed to configuration validators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingInfo {
    pub channel_count: usize,
    pub frame_count: usize,
    pub sampling_frequency: f64,
    pub channel_locations: Vec<ChannelLocation>,
}

/// Read-only multichannel time series.
pub trait Recording {
    /// Type produced when slicing a frame range out of this recording.
    type Block: Recording;

    fn channel_count(&self) -> usize;

    fn frame_count(&self) -> usize;

    fn sampling_frequency(&self) -> f64;

    fn channel_locations(&self) -> &[ChannelLocation];

    /// Extracts the half-open frame range `[start_frame, end_frame)`.
    ///
    /// Fails with [`StitchError::OutOfRange`] if the range does not lie within
    /// `[0, frame_count())`.
    fn extract_subrange(&self, start_frame: usize, end_frame: usize) -> Result<Self::Block>;

    fn info(&self) -> RecordingInfo {
        RecordingInfo {
            channel_count: self.channel_count(),
            frame_count: self.frame_count(),
            sampling_frequency: self.sampling_frequency(),
            channel_locations: self.channel_locations().to_vec(),
        }
    }
}

/// In-memory recording stored frame-major: sample `c` of frame `t` lives at
/// `samples[t * channel_count + c]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecording {
    sampling_frequency: f64,
    channel_locations: Vec<ChannelLocation>,
    samples: Vec<f32>,
}

impl TraceRecording {
    pub fn new(
        sampling_frequency: f64,
        channel_locations: Vec<ChannelLocation>,
        samples: Vec<f32>,
    ) -> Result<Self> {
        if !(sampling_frequency.is_finite() && sampling_frequency > 0.0) {
            return Err(StitchError::invalid_config(format!(
                "sampling frequency must be positive, got {sampling_frequency}"
            )));
        }
        let channels = channel_locations.len();
        if channels == 0 {
            return Err(StitchError::invalid_config(
                "recording needs at least one channel",
            ));
        }
        if samples.len() % channels != 0 {
            return Err(StitchError::invalid_config(format!(
                "{} samples cannot be split evenly across {channels} channels",
                samples.len()
            )));
        }

        Ok(Self {
            sampling_frequency,
            channel_locations,
            samples,
        })
    }

    /// Builds a recording from a list of frames, each holding one sample per channel.
    pub fn from_frames(
        sampling_frequency: f64,
        channel_locations: Vec<ChannelLocation>,
        frames: Vec<Vec<f32>>,
    ) -> Result<Self> {
        let channels = channel_locations.len();
        if let Some((index, frame)) = frames
            .iter()
            .enumerate()
            .find(|(_, frame)| frame.len() != channels)
        {
            return Err(StitchError::invalid_config(format!(
                "frame {index} has {} samples, expected {channels}",
                frame.len()
            )));
        }

        Self::new(
            sampling_frequency,
            channel_locations,
            frames.into_iter().flatten().collect(),
        )
    }

    /// Samples of one frame, one per channel.
    pub fn frame(&self, index: usize) -> &[f32] {
        let channels = self.channel_count();
        &self.samples[index * channels..(index + 1) * channels]
    }

    pub fn frames(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.samples.chunks_exact(self.channel_count())
    }
}

impl Recording for TraceRecording {
    type Block = TraceRecording;

    fn channel_count(&self) -> usize {
        self.channel_locations.len()
    }

    fn frame_count(&self) -> usize {
        self.samples.len() / self.channel_count()
    }

    fn sampling_frequency(&self) -> f64 {
        self.sampling_frequency
    }

    fn channel_locations(&self) -> &[ChannelLocation] {
        &self.channel_locations
    }

    fn extract_subrange(&self, start_frame: usize, end_frame: usize) -> Result<Self::Block> {
        let frame_count = self.frame_count();
        if start_frame > end_frame || end_frame > frame_count {
            return Err(StitchError::OutOfRange {
                start: start_frame,
                end: end_frame,
                frame_count,
            });
        }

        let channels = self.channel_count();
        Ok(Self {
            sampling_frequency: self.sampling_frequency,
            channel_locations: self.channel_locations.clone(),
            samples: self.samples[start_frame * channels..end_frame * channels].to_vec(),
        })
    }
}

#[derive(Deserialize)]
struct TraceRecordingFile {
    sampling_frequency: f64,
    channel_locations: Vec<ChannelLocation>,
    traces: Vec<Vec<f32>>,
}

impl<'de> Deserialize<'de> for TraceRecording {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let file = TraceRecordingFile::deserialize(deserializer)?;
        Self::from_frames(file.sampling_frequency, file.channel_locations, file.traces)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_channel(frames: usize) -> TraceRecording {
        let samples = (0..frames * 2).map(|v| v as f32).collect();
        TraceRecording::new(
            30_000.0,
            vec![ChannelLocation::planar(0.0, 0.0), ChannelLocation::planar(0.0, 20.0)],
            samples,
        )
        .unwrap()
    }

    #[test]
    fn reports_geometry() {
        let recording = two_channel(10);
        let info = recording.info();

        assert_eq!(info.channel_count, 2);
        assert_eq!(info.frame_count, 10);
        assert_eq!(info.sampling_frequency, 30_000.0);
        assert_eq!(info.channel_locations.len(), 2);
    }

    #[test]
    fn extracts_half_open_subrange() {
        let recording = two_channel(10);
        let block = recording.extract_subrange(3, 6).unwrap();

        assert_eq!(block.frame_count(), 3);
        assert_eq!(block.frame(0), &[6.0, 7.0]);
        assert_eq!(block.frame(2), &[10.0, 11.0]);
        assert_eq!(block.sampling_frequency(), 30_000.0);
    }

    #[test]
    fn rejects_out_of_range_subrange() {
        let recording = two_channel(10);

        let err = recording.extract_subrange(5, 11).unwrap_err();
        assert!(matches!(err, StitchError::OutOfRange { end: 11, frame_count: 10, .. }));

        let err = recording.extract_subrange(6, 5).unwrap_err();
        assert!(matches!(err, StitchError::OutOfRange { .. }));
    }

    #[test]
    fn rejects_ragged_samples() {
        let err = TraceRecording::new(
            1_000.0,
            vec![ChannelLocation::planar(0.0, 0.0), ChannelLocation::planar(1.0, 0.0)],
            vec![0.0; 5],
        )
        .unwrap_err();
        assert!(matches!(err, StitchError::InvalidConfiguration(_)));
    }

    #[test]
    fn deserializes_from_frame_list() {
        let json = r#"{
            "sampling_frequency": 1000.0,
            "channel_locations": [{"x": 0.0, "y": 0.0}, {"x": 0.0, "y": 25.0, "z": 1.0}],
            "traces": [[0.0, 1.0], [2.0, 3.0], [4.0, 5.0]]
        }"#;
        let recording: TraceRecording = serde_json::from_str(json).unwrap();

        assert_eq!(recording.frame_count(), 3);
        assert_eq!(recording.channel_locations()[1].z, Some(1.0));
        assert_eq!(recording.frames().nth(1).unwrap(), &[2.0, 3.0]);

        let ragged = r#"{"sampling_frequency": 1000.0, "channel_locations": [{"x": 0.0, "y": 0.0}], "traces": [[0.0, 1.0]]}"#;
        assert!(serde_json::from_str::<TraceRecording>(ragged).is_err());
    }
}
