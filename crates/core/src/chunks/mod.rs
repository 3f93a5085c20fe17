use serde::{Deserialize, Serialize};

use crate::{Result, StitchError};

/// Planning unit: an authoritative core interval `[start, end)` plus the
/// context frames attached on either side of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub start: usize,
    pub end: usize,
    pub padding_left: usize,
    pub padding_right: usize,
}

impl Chunk {
    pub fn core_len(&self) -> usize {
        self.end - self.start
    }

    /// First frame of the padded sub-view.
    pub fn padded_start(&self) -> usize {
        self.start - self.padding_left
    }

    /// One past the last frame of the padded sub-view.
    pub fn padded_end(&self) -> usize {
        self.end + self.padding_right
    }

    /// Whether a time local to the padded sub-view lands in the core interval.
    pub fn contains_local(&self, local_time: u64) -> bool {
        let lo = self.padding_left as u64;
        let hi = (self.padding_left + self.core_len()) as u64;
        local_time >= lo && local_time < hi
    }

    /// Converts a sub-view local time into a whole-recording frame index.
    pub fn to_global(&self, local_time: u64) -> u64 {
        local_time + self.padded_start() as u64
    }
}

/// Splits `[0, frame_count)` into contiguous core intervals of `chunk_size`
/// frames (the last one may be shorter) and attaches up to `padding` frames of
/// context on each side, clipped to the recording bounds.
pub fn plan_chunks(frame_count: usize, chunk_size: usize, padding: usize) -> Result<Vec<Chunk>> {
    if chunk_size == 0 {
        return Err(StitchError::invalid_config("chunk size must be positive"));
    }

    let mut chunks = Vec::with_capacity(frame_count.div_ceil(chunk_size));
    let mut start = 0;
    while start < frame_count {
        let end = (start + chunk_size).min(frame_count);
        chunks.push(Chunk {
            start,
            end,
            padding_left: padding.min(start),
            padding_right: padding.min(frame_count - end),
        });
        start = end;
    }

    Ok(chunks)
}
