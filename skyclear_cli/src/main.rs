mod args;
mod logging;
mod sequence;
mod stage_bars;

use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Parser;
use skyclear::{PaintReason, PipelineOrchestrator};
use tracing::{error, info};

use crate::args::{Args, output_dir_for, test_paint_dir_for};
use crate::sequence::{ImageSequence, TiffSink};
use crate::stage_bars::StageBars;

const RESET: &str = "\x1b[0m";

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Argument Parsing ---
    let args = Args::parse();
    if args.show_test_paint_colors {
        print_test_paint_colors();
        return Ok(());
    }
    let Some(input_dir) = args.image_sequence_dir.clone() else {
        bail!("an image sequence directory is required");
    };

    // --- 2. Logging & Configuration ---
    logging::init(&args.console_log_level, args.log_file.as_deref())?;
    let config = args.load_config()?;
    let histograms = args.load_histograms()?;

    // --- 3. Sequence I/O Initialization ---
    let sequence = ImageSequence::open(&input_dir)?;
    let output_dir = output_dir_for(&input_dir, &config);
    let test_paint_dir = config.test_paint.then(|| test_paint_dir_for(&output_dir));
    let sink = TiffSink::new(output_dir.clone(), test_paint_dir, sequence.file_names())?;
    let frame_count = sequence.len();
    info!(
        frames = frame_count,
        input = %input_dir.display(),
        output = %output_dir.display(),
        "processing image sequence"
    );

    // --- 4. Pipeline ---
    let bars = Arc::new(StageBars::new(frame_count, config.max_concurrent_frames));
    let orchestrator = PipelineOrchestrator::new(config, histograms, Arc::new(sequence), Arc::new(sink))?
        .with_reporter(bars.clone());
    let report = orchestrator.run().await?;
    bars.finish();

    // --- 5. Summary ---
    for (name, count) in report.decisions.iter().filter(|(_, count)| **count > 0) {
        info!(reason = name, groups = count, "decisions");
    }
    for (frame, err) in &report.failed {
        error!(frame, error = %err, "frame was not written");
    }
    if !report.is_success() {
        bail!("{} of {} frames failed", report.failed.len(), frame_count);
    }
    info!(output = %output_dir.display(), "processing complete");
    Ok(())
}

fn print_test_paint_colors() {
    println!("outlier groups are painted over in the following cases:");
    for reason in PaintReason::should_paint_cases() {
        print_reason(&reason);
    }
    println!("\noutlier groups are not painted over in the following cases:");
    for reason in PaintReason::should_not_paint_cases() {
        print_reason(&reason);
    }
    println!();
}

fn print_reason(reason: &PaintReason) {
    let color = reason.display_color();
    println!("{}{:>18}{RESET}: {}", color.ansi(), color.name(), reason.description());
}
