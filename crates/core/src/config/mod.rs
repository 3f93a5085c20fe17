use serde::{Deserialize, Serialize};

use crate::{BlockSorter, Recording, RecordingInfo, Result, StitchError};

/// Context frames attached to each side of a block.
pub const DEFAULT_PADDING_FRAMES: usize = 1000;

fn default_padding_frames() -> usize {
    DEFAULT_PADDING_FRAMES
}

/// Top-level parameters of a chunked sort. `C` is the block sorter's own
/// configuration and is passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StitchParameters<C> {
    pub block_duration_sec: f64,
    #[serde(default = "default_padding_frames")]
    pub padding_frames: usize,
    pub block_sorting_parameters: C,
}

impl<C> StitchParameters<C> {
    pub fn new(block_sorting_parameters: C, block_duration_sec: f64) -> Self {
        Self {
            block_duration_sec,
            padding_frames: DEFAULT_PADDING_FRAMES,
            block_sorting_parameters,
        }
    }

    pub fn with_padding(mut self, padding_frames: usize) -> Self {
        self.padding_frames = padding_frames;
        self
    }

    /// Core chunk length in frames: block duration times sampling frequency,
    /// truncated.
    pub fn chunk_size(&self, sampling_frequency: f64) -> Result<usize> {
        if !(self.block_duration_sec.is_finite() && self.block_duration_sec > 0.0) {
            return Err(StitchError::invalid_config(format!(
                "block duration must be positive, got {} s",
                self.block_duration_sec
            )));
        }
        if !(sampling_frequency.is_finite() && sampling_frequency > 0.0) {
            return Err(StitchError::invalid_config(format!(
                "sampling frequency must be positive, got {sampling_frequency}"
            )));
        }

        let frames = (self.block_duration_sec * sampling_frequency).floor();
        if frames < 1.0 {
            return Err(StitchError::invalid_config(format!(
                "block duration {} s is shorter than one frame at {sampling_frequency} Hz",
                self.block_duration_sec
            )));
        }

        Ok(frames as usize)
    }

    /// Validates these parameters, then the block sorter's parameters, against
    /// the whole recording.
    pub fn check_valid<R, S>(&self, sorter: &S, info: &RecordingInfo) -> Result<()>
    where
        R: Recording,
        S: BlockSorter<R, Config = C>,
    {
        self.chunk_size(info.sampling_frequency)?;
        if info.channel_locations.len() != info.channel_count {
            return Err(StitchError::invalid_config(format!(
                "{} channel locations for {} channels",
                info.channel_locations.len(),
                info.channel_count
            )));
        }

        sorter.check_valid(&self.block_sorting_parameters, info)
    }
}
