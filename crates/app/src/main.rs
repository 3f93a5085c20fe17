use std::{fs, path::Path, path::PathBuf};

use clap::{Parser, Subcommand};
use spike_stitch_core::{
    plan_chunks, sort_chunked_with_report, StitchParameters, ThresholdConfig, ThresholdSorter,
    TraceRecording, DEFAULT_PADDING_FRAMES,
};
use tracing_subscriber::EnvFilter;

fn main() -> spike_stitch_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan {
            frames,
            sampling_frequency,
            block_duration,
            padding,
        } => run_plan(frames, sampling_frequency, block_duration, padding),
        Commands::Sort {
            recording,
            params,
            output,
        } => run_sort(&recording, &params, &output),
    }
}

fn run_plan(
    frames: usize,
    sampling_frequency: f64,
    block_duration: f64,
    padding: usize,
) -> spike_stitch_core::Result<()> {
    let params = StitchParameters::new((), block_duration).with_padding(padding);
    let chunk_size = params.chunk_size(sampling_frequency)?;
    let chunks = plan_chunks(frames, chunk_size, padding)?;
    tracing::info!(chunk_size, chunks = chunks.len(), "planned blocks");

    println!("{}", serde_json::to_string_pretty(&chunks)?);
    Ok(())
}

fn run_sort(recording: &Path, params: &Path, output: &Path) -> spike_stitch_core::Result<()> {
    tracing::info!(?recording, ?params, ?output, "running chunked sort");

    let recording: TraceRecording = serde_json::from_slice(&fs::read(recording)?)?;
    let params: StitchParameters<ThresholdConfig> = serde_json::from_slice(&fs::read(params)?)?;

    let (sorting, report) = sort_chunked_with_report(&recording, &params, &ThresholdSorter)?;
    for chunk in &report.chunks {
        tracing::debug!(
            block = chunk.index + 1,
            kept = chunk.events_kept,
            new_labels = ?chunk.new_labels,
            "block summary"
        );
    }

    fs::write(output, serde_json::to_vec_pretty(&sorting)?)?;
    tracing::info!(
        events = sorting.len(),
        units = sorting.unit_ids().len(),
        "wrote sorting"
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Chunked, label-continuous spike sorting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the block layout for a recording of the given length.
    Plan {
        /// Number of frames in the recording.
        #[arg(long)]
        frames: usize,
        /// Sampling frequency in Hz.
        #[arg(long)]
        sampling_frequency: f64,
        /// Core block duration in seconds.
        #[arg(long)]
        block_duration: f64,
        /// Context frames attached to each side of a block.
        #[arg(long, default_value_t = DEFAULT_PADDING_FRAMES)]
        padding: usize,
    },
    /// Sort a recording block by block and write the stitched result.
    Sort {
        /// JSON recording: sampling_frequency, channel_locations and traces.
        recording: PathBuf,
        /// JSON stitch parameters with threshold sorter settings.
        params: PathBuf,
        /// Output path for the stitched sorting.
        output: PathBuf,
    },
}
