// THEORY:
// This file is the main entry point for the `skyclear` library crate.
// It follows the standard Rust convention of using `lib.rs` to define the public
// API that will be exposed to external consumers (like the `skyclear` command line
// tool).
//
// The engine finds airplane streaks in a night sky timelapse by comparing each frame
// with the frames either side of it, decides which bright groups are planes, and
// paints them out using the neighbors' pixels. The primary goal is to export the
// `PipelineOrchestrator`, the single-frame `process_frame`, and their data structures
// (`Config`, `RunReport`, `PaintReason`, etc.) as the interface for the whole engine.
// The engine does no file I/O: frames come in through a `FrameLoader` and leave
// through a `FrameSink`.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use config::{Config, StreakConfig};
pub use core_modules::frame::{PixelBuffer, RowLayout};
pub use core_modules::frame_cache::FrameLoader;
pub use core_modules::histogram::ReferenceHistograms;
pub use core_modules::outlier_group::OutlierGroup;
pub use core_modules::paint_reason::{DisplayColor, PaintReason};
pub use core_modules::pixel::pixel::Pixel;
pub use core_modules::progress::{FrameProcessingState, ProgressReporter, StageMap};
pub use error::{Result, SkyclearError};
pub use pipeline::{FrameSink, PipelineOrchestrator, RunReport, process_frame};
