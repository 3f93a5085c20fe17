//! Core library for the Spike Stitch sorter.
//!
//! Long recordings are sorted in overlapping blocks by an external
//! [`BlockSorter`]. This crate plans the blocks, drives the sorter over them
//! one at a time while carrying the label watermark and classifier snapshot
//! forward, and stitches the per-block results into a single [`Sorting`] in
//! which unit labels stay stable across block boundaries.

pub mod chunks;
pub mod config;
pub mod error;
pub mod recording;
pub mod reference;
pub mod sorter;
pub mod sorting;
pub mod stitch;

pub use chunks::{plan_chunks, Chunk};
pub use config::{StitchParameters, DEFAULT_PADDING_FRAMES};
pub use error::{BoxedSortError, Result, StitchError};
pub use recording::{ChannelLocation, Recording, RecordingInfo, TraceRecording};
pub use reference::{PeakClassifier, ThresholdConfig, ThresholdSortError, ThresholdSorter};
pub use sorter::{BlockSorter, BlockSorting, ClassifierMap};
pub use sorting::{build_sorting, Sorting};
pub use stitch::{
    reconcile, sort_chunked, sort_chunked_with_report, ChunkEvents, ChunkReport, StitchReport,
    StitchState,
};
