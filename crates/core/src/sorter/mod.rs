use std::collections::BTreeMap;

use crate::{Recording, RecordingInfo, Result};

/// Per-label classifier snapshot emitted by a block sort and fed back as the
/// reference for the next block.
pub type ClassifierMap<C> = BTreeMap<u32, C>;

/// Output of a single block sort. `times` are local to the block handed to
/// the sorter and index-aligned with `labels`.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSorting<C> {
    pub times: Vec<u64>,
    pub labels: Vec<u32>,
    pub classifiers: ClassifierMap<C>,
}

impl<C> BlockSorting<C> {
    pub fn new(times: Vec<u64>, labels: Vec<u32>, classifiers: ClassifierMap<C>) -> Self {
        Self {
            times,
            labels,
            classifiers,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new(), ClassifierMap::new())
    }
}

/// Block-level clustering and classification procedure.
///
/// Implementations must mint every label that is not continued from a
/// `reference` classifier strictly above `label_offset`. A label taken over
/// from `reference` may be at or below it.
pub trait BlockSorter<R: Recording> {
    /// Sorting parameters for one block, opaque to the stitcher.
    type Config;
    /// Model of what a unit looks like, carried from one block to the next.
    type Classifier;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Checks the block parameters against the whole recording's geometry.
    /// Called once before any block is sorted.
    fn check_valid(&self, _config: &Self::Config, _info: &RecordingInfo) -> Result<()> {
        Ok(())
    }

    fn sort_block(
        &self,
        recording: &R,
        config: &Self::Config,
        label_offset: u32,
        reference: Option<&ClassifierMap<Self::Classifier>>,
    ) -> std::result::Result<BlockSorting<Self::Classifier>, Self::Error>;
}
