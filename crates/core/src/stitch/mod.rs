//! Sequential block driver and boundary reconciliation.
//!
//! A recording is cut into [`Chunk`]s and each padded chunk is handed to a
//! [`BlockSorter`] in order. Two values are threaded from one block to the
//! next through [`StitchState`]: the label watermark (the floor for freshly
//! minted labels) and the classifier snapshot of the previous block (the
//! reference used to continue labels of recurring units). Only events inside
//! a chunk's core interval survive, so every event is attributed to exactly
//! one chunk.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    build_sorting, plan_chunks, BlockSorter, BoxedSortError, Chunk, ClassifierMap, Recording,
    Result, Sorting, StitchError, StitchParameters,
};

/// State carried between blocks of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct StitchState<C> {
    last_label_used: u32,
    previous_classifiers: Option<ClassifierMap<C>>,
}

impl<C> Default for StitchState<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> StitchState<C> {
    pub fn new() -> Self {
        Self {
            last_label_used: 0,
            previous_classifiers: None,
        }
    }

    /// Highest label kept so far; new labels must be minted above it.
    pub fn last_label_used(&self) -> u32 {
        self.last_label_used
    }

    /// Classifiers of the previous block, `None` before the first block.
    pub fn reference(&self) -> Option<&ClassifierMap<C>> {
        self.previous_classifiers.as_ref()
    }

    /// Folds one block's result into the state. The classifier snapshot is
    /// replaced outright; the watermark only moves up, and only when events
    /// survived the boundary filter.
    pub fn advance(self, kept: &ChunkEvents, classifiers: ClassifierMap<C>) -> Self {
        let last_label_used = kept
            .max_label()
            .map_or(self.last_label_used, |max| max.max(self.last_label_used));

        Self {
            last_label_used,
            previous_classifiers: Some(classifiers),
        }
    }
}

/// Events of one chunk after boundary filtering, in global frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkEvents {
    pub times: Vec<u64>,
    pub labels: Vec<u32>,
}

impl ChunkEvents {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn max_label(&self) -> Option<u32> {
        self.labels.iter().copied().max()
    }
}

/// Keeps the events whose local time falls in the chunk's core interval and
/// shifts them to whole-recording frame indices. Order is preserved.
pub fn reconcile(chunk: &Chunk, times: &[u64], labels: &[u32]) -> ChunkEvents {
    let (times, labels): (Vec<u64>, Vec<u32>) = times
        .iter()
        .zip(labels)
        .filter(|&(&time, _)| chunk.contains_local(time))
        .map(|(&time, &label)| (chunk.to_global(time), label))
        .unzip();

    ChunkEvents { times, labels }
}

/// Bookkeeping for one processed chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkReport {
    pub index: usize,
    pub chunk: Chunk,
    /// Events the block sorter returned, padding included.
    pub events_returned: usize,
    pub events_kept: usize,
    pub last_label_used: u32,
    /// Kept labels above the watermark the block started with, ascending.
    pub new_labels: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StitchReport {
    pub chunks: Vec<ChunkReport>,
}

impl StitchReport {
    pub fn last_label_used(&self) -> u32 {
        self.chunks.last().map_or(0, |c| c.last_label_used)
    }
}

/// Sorts `recording` block by block and stitches the results into one
/// label-continuous [`Sorting`].
pub fn sort_chunked<R, S>(
    recording: &R,
    params: &StitchParameters<S::Config>,
    sorter: &S,
) -> Result<Sorting>
where
    R: Recording,
    S: BlockSorter<R::Block>,
{
    sort_chunked_with_report(recording, params, sorter).map(|(sorting, _)| sorting)
}

/// Like [`sort_chunked`], also returning per-chunk bookkeeping.
pub fn sort_chunked_with_report<R, S>(
    recording: &R,
    params: &StitchParameters<S::Config>,
    sorter: &S,
) -> Result<(Sorting, StitchReport)>
where
    R: Recording,
    S: BlockSorter<R::Block>,
{
    let recording_info = recording.info();
    params.check_valid::<R::Block, S>(sorter, &recording_info)?;

    let chunk_size = params.chunk_size(recording_info.sampling_frequency)?;
    let chunks = plan_chunks(recording_info.frame_count, chunk_size, params.padding_frames)?;
    let chunk_count = chunks.len();

    let mut state = StitchState::new();
    let mut kept_per_chunk = Vec::with_capacity(chunk_count);
    let mut report = StitchReport::default();

    for (index, chunk) in chunks.iter().enumerate() {
        info!(
            block = index + 1,
            of = chunk_count,
            start = chunk.start,
            end = chunk.end,
            "processing block {} of {}",
            index + 1,
            chunk_count
        );

        let (kept, next, chunk_report) =
            sort_chunk(recording, params, sorter, state, index, chunk_count, chunk)?;
        state = next;
        report.chunks.push(chunk_report);
        kept_per_chunk.push(kept);
    }

    let total: usize = kept_per_chunk.iter().map(ChunkEvents::len).sum();
    let mut times = Vec::with_capacity(total);
    let mut labels = Vec::with_capacity(total);
    for kept in kept_per_chunk {
        times.extend(kept.times);
        labels.extend(kept.labels);
    }

    let sorting = build_sorting(times, labels, recording_info.sampling_frequency)?;
    info!(
        events = sorting.len(),
        units = sorting.unit_ids().len(),
        last_label_used = state.last_label_used(),
        "stitched {} blocks",
        chunk_count
    );

    Ok((sorting, report))
}

fn sort_chunk<R, S>(
    recording: &R,
    params: &StitchParameters<S::Config>,
    sorter: &S,
    state: StitchState<S::Classifier>,
    index: usize,
    chunk_count: usize,
    chunk: &Chunk,
) -> Result<(ChunkEvents, StitchState<S::Classifier>, ChunkReport)>
where
    R: Recording,
    S: BlockSorter<R::Block>,
{
    let (start, end) = (chunk.padded_start(), chunk.padded_end());
    let block = recording
        .extract_subrange(start, end)
        .map_err(|source| StitchError::Chunk {
            chunk_index: index,
            start,
            end,
            source: Box::new(source),
        })?;

    let block_error = |source: BoxedSortError| StitchError::BlockSort {
        chunk_index: index,
        chunk_count,
        start,
        end,
        source,
    };

    let label_offset = state.last_label_used();
    let result = sorter
        .sort_block(
            &block,
            &params.block_sorting_parameters,
            label_offset,
            state.reference(),
        )
        .map_err(|err| block_error(Box::new(err)))?;

    if result.times.len() != result.labels.len() {
        return Err(block_error(
            format!(
                "sorter returned {} times but {} labels",
                result.times.len(),
                result.labels.len()
            )
            .into(),
        ));
    }

    let kept = reconcile(chunk, &result.times, &result.labels);
    let mut new_labels: Vec<u32> = kept
        .labels
        .iter()
        .copied()
        .filter(|&label| label > label_offset)
        .collect();
    new_labels.sort_unstable();
    new_labels.dedup();

    if let Some(label) = kept.labels.iter().copied().find(|&label| {
        label <= label_offset && !state.reference().is_some_and(|r| r.contains_key(&label))
    }) {
        warn!(
            block = index + 1,
            label, label_offset, "label at or below the watermark has no reference classifier"
        );
    }
    if kept.is_empty() {
        warn!(block = index + 1, "no events kept in the core interval");
    }
    debug!(
        block = index + 1,
        returned = result.times.len(),
        kept = kept.len(),
        new_units = new_labels.len(),
        "reconciled block"
    );

    let next = state.advance(&kept, result.classifiers);
    let chunk_report = ChunkReport {
        index,
        chunk: *chunk,
        events_returned: result.times.len(),
        events_kept: kept.len(),
        last_label_used: next.last_label_used(),
        new_labels,
    };

    Ok((kept, next, chunk_report))
}
