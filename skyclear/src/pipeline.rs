// THEORY:
// The `pipeline` module is the top-level API for the engine. It drives a whole frame
// sequence through the stage state machine with a bounded number of frames in flight,
// and it offers a single-frame entry point for callers that manage frames themselves.
//
// Key architectural principles:
// 1.  **Two passes**: reconciliation needs every frame in a window classified first.
//     Pass one takes every frame to `OutlierProcessingComplete` and publishes an
//     immutable `FrameSnapshot`. Pass two reconciles, paints, and writes. The barrier
//     between them is the end of pass one, so no frame ever waits on a neighbor task.
// 2.  **Frame isolation**: a frame's mask, groups, and decisions belong to its own
//     task. The only shared things are the frame cache, the published snapshots, and
//     the progress channel.
// 3.  **Blocking work on the blocking pool**: detection, grouping, Hough, painting, and
//     sink writes are synchronous and run under `spawn_blocking`. The async side only
//     schedules, loads, and reports.
// 4.  **Failures stay local**: a failing frame is reported and its output withheld.
//     Every other frame carries on, and a frame next to an unreadable one is compared
//     against its remaining neighbor.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::config::Config;
use crate::core_modules::classifier::GroupClassifier;
use crate::core_modules::frame::PixelBuffer;
use crate::core_modules::frame_cache::{FrameCache, FrameLoader};
use crate::core_modules::group_extractor::group_extractor;
use crate::core_modules::group_painter::{decision_counts, paint_frame, test_paint_frame};
use crate::core_modules::histogram::ReferenceHistograms;
use crate::core_modules::hough::{self, Line};
use crate::core_modules::outlier::OutlierMask;
use crate::core_modules::outlier_detector::detect_outliers;
use crate::core_modules::outlier_group::OutlierGroup;
use crate::core_modules::progress::{
    FrameProcessingState, FrameStage, ProgressMonitor, ProgressReporter, SilentReporter,
};
use crate::core_modules::streak_reconciler::{FrameSnapshot, StreakReconciler};
use crate::error::{Result, SkyclearError};

/// Destination for finished frames. Called from the blocking pool.
pub trait FrameSink: Send + Sync + 'static {
    fn write(&self, frame_index: usize, frame: PixelBuffer) -> Result<()>;

    /// Receives the color-coded diagnostic frame when test paint is enabled.
    fn write_test_paint(&self, _frame_index: usize, _frame: PixelBuffer) -> Result<()> {
        Ok(())
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub completed: Vec<usize>,
    pub failed: Vec<(usize, SkyclearError)>,
    /// Final decisions by reason name, across completed frames.
    pub decisions: BTreeMap<&'static str, usize>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A frame's pass-one result, owned by that frame until it is painted.
struct ClassifiedFrame {
    groups: Vec<OutlierGroup>,
    lines: Vec<Line>,
}

/// Indices of the frames directly before and after `frame_index`.
fn neighbor_indices(frame_index: usize, frame_count: usize) -> Vec<usize> {
    let mut neighbors = Vec::with_capacity(2);
    if frame_index > 0 {
        neighbors.push(frame_index - 1);
    }
    if frame_index + 1 < frame_count {
        neighbors.push(frame_index + 1);
    }
    neighbors
}

/// Groups the mask, runs the whole-frame and per-group Hough transforms, and
/// classifies every group.
fn classify_mask(
    frame_index: usize,
    mut mask: OutlierMask,
    config: &Config,
    classifier: &GroupClassifier,
) -> (Vec<OutlierGroup>, Vec<Line>) {
    let set = group_extractor::extract_groups(&mut mask, config);
    let lines = hough::lines(
        mask.width(),
        mask.height(),
        mask.grid(),
        config.min_line_count,
        config.max_number_of_lines,
    );
    let mut groups = set.into_groups();
    for group in &mut groups {
        if group.size <= config.assume_airplane_size {
            group.compute_lines(config.group_min_line_count, config.group_hough_line_count);
        }
        classifier.classify(frame_index, group);
    }
    (groups, lines)
}

/// Runs one frame through detection, classification, single-frame reconciliation,
/// and painting.
///
/// With no other frames' decisions available, reconciliation can only downgrade.
/// Fails if any neighbor's dimensions differ from the frame's.
pub fn process_frame(
    frame_index: usize,
    frame: &PixelBuffer,
    neighbors: &[&PixelBuffer],
    config: &Config,
    histograms: Arc<ReferenceHistograms>,
) -> Result<(PixelBuffer, Vec<OutlierGroup>)> {
    config.validate()?;
    let classifier = GroupClassifier::new(config, histograms);
    let mask = detect_outliers(frame_index, frame, neighbors, config.max_pixel_distance)?;
    let (mut groups, lines) = classify_mask(frame_index, mask, config, &classifier);
    StreakReconciler::new(config).reconcile(frame_index, &mut groups, &lines, &[]);
    let output = paint_frame(frame_index, frame, neighbors, &groups, config.padding_pixels())?;
    Ok((output, groups))
}

/// Drives a frame sequence from loader to sink.
pub struct PipelineOrchestrator {
    config: Arc<Config>,
    classifier: GroupClassifier,
    reconciler: StreakReconciler,
    cache: Arc<FrameCache>,
    sink: Arc<dyn FrameSink>,
    reporter: Arc<dyn ProgressReporter>,
}

impl PipelineOrchestrator {
    /// Validates `config` and `histograms` before anything is loaded.
    pub fn new(
        config: Config,
        histograms: Arc<ReferenceHistograms>,
        loader: Arc<dyn FrameLoader>,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Self> {
        config.validate()?;
        histograms.validate()?;
        let cache = Arc::new(FrameCache::new(loader, config.cache_retain, config.load_retries));
        Ok(Self {
            classifier: GroupClassifier::new(&config, histograms),
            reconciler: StreakReconciler::new(&config),
            config: Arc::new(config),
            cache,
            sink,
            reporter: Arc::new(SilentReporter),
        })
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn frame_count(&self) -> usize {
        self.cache.frame_count()
    }

    pub async fn run(&self) -> Result<RunReport> {
        let frame_count = self.frame_count();
        let limit = self.config.max_concurrent_frames;
        let monitor = ProgressMonitor::spawn(Arc::clone(&self.reporter));
        let mut report = RunReport::default();
        info!(frames = frame_count, concurrency = limit, "starting run");

        // --- Pass 1: per-frame classification ---
        let mut classified: Vec<Option<(FrameStage, ClassifiedFrame)>> = (0..frame_count).map(|_| None).collect();
        {
            let mut results = stream::iter(0..frame_count)
                .map(|frame_index| {
                    let stage = FrameStage::new(frame_index, monitor.handle());
                    self.classify_frame(stage)
                })
                .buffer_unordered(limit);
            while let Some((stage, result)) = results.next().await {
                let frame_index = stage.frame();
                match result {
                    Ok(frame) => classified[frame_index] = Some((stage, frame)),
                    Err(err) => {
                        stage.fail(err.clone());
                        report.failed.push((frame_index, err));
                    }
                }
            }
        }

        let snapshots: Vec<Arc<FrameSnapshot>> = classified
            .iter()
            .enumerate()
            .filter_map(|(frame_index, entry)| {
                entry.as_ref().map(|(_, frame)| {
                    Arc::new(FrameSnapshot::new(frame_index, &frame.groups, frame.lines.clone(), &self.config))
                })
            })
            .collect();

        // --- Pass 2: reconcile, paint, write ---
        {
            let snapshots = &snapshots;
            let mut results = stream::iter(classified.into_iter().flatten())
                .map(|(stage, frame)| self.finish_frame(stage, frame, snapshots))
                .buffer_unordered(limit);
            while let Some((stage, result)) = results.next().await {
                let frame_index = stage.frame();
                match result {
                    Ok(counts) => {
                        for (name, count) in counts {
                            *report.decisions.entry(name).or_default() += count;
                        }
                        report.completed.push(frame_index);
                    }
                    Err(err) => {
                        stage.fail(err.clone());
                        report.failed.push((frame_index, err));
                    }
                }
            }
        }

        monitor.finish().await?;
        report.completed.sort_unstable();
        report.failed.sort_by_key(|(frame_index, _)| *frame_index);
        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            decisions = ?report.decisions,
            "run finished"
        );
        Ok(report)
    }

    /// Loads a frame and whichever of its neighbors can be decoded. An unreadable
    /// neighbor only narrows the comparison; the frame fails on its own load errors.
    async fn load_with_neighbors(&self, frame_index: usize) -> Result<(Arc<PixelBuffer>, Vec<Arc<PixelBuffer>>)> {
        let frame = self.cache.get(frame_index).await?;
        let mut neighbors = Vec::with_capacity(2);
        for neighbor in neighbor_indices(frame_index, self.frame_count()) {
            match self.cache.get(neighbor).await {
                Ok(loaded) => neighbors.push(loaded),
                Err(err @ SkyclearError::Input { .. }) => {
                    warn!(frame = frame_index, neighbor, error = %err, "skipping unreadable neighbor");
                }
                Err(err) => return Err(err),
            }
        }
        Ok((frame, neighbors))
    }

    async fn classify_frame(&self, mut stage: FrameStage) -> (FrameStage, Result<ClassifiedFrame>) {
        let result = self.classify_frame_stages(&mut stage).await;
        (stage, result)
    }

    async fn classify_frame_stages(&self, stage: &mut FrameStage) -> Result<ClassifiedFrame> {
        let frame_index = stage.frame();
        stage.advance(FrameProcessingState::DetectingOutliers)?;
        let (frame, neighbors) = self.load_with_neighbors(frame_index).await?;
        let max_pixel_distance = self.config.max_pixel_distance;
        let mask = tokio::task::spawn_blocking(move || {
            let neighbors: Vec<&PixelBuffer> = neighbors.iter().map(Arc::as_ref).collect();
            detect_outliers(frame_index, &frame, &neighbors, max_pixel_distance)
        })
        .await??;

        stage.advance(FrameProcessingState::InterFrameProcessing)?;
        let config = Arc::clone(&self.config);
        let classifier = self.classifier.clone();
        let (groups, lines) =
            tokio::task::spawn_blocking(move || classify_mask(frame_index, mask, &config, &classifier)).await?;

        stage.advance(FrameProcessingState::OutlierProcessingComplete)?;
        Ok(ClassifiedFrame { groups, lines })
    }

    async fn finish_frame(
        &self,
        mut stage: FrameStage,
        frame: ClassifiedFrame,
        snapshots: &[Arc<FrameSnapshot>],
    ) -> (FrameStage, Result<Vec<(&'static str, usize)>>) {
        let result = self.finish_frame_stages(&mut stage, frame, snapshots).await;
        (stage, result)
    }

    async fn finish_frame_stages(
        &self,
        stage: &mut FrameStage,
        frame: ClassifiedFrame,
        snapshots: &[Arc<FrameSnapshot>],
    ) -> Result<Vec<(&'static str, usize)>> {
        let frame_index = stage.frame();
        let ClassifiedFrame { mut groups, lines } = frame;

        let window = self.config.streak.neighbor_window;
        let neighbors: Vec<Arc<FrameSnapshot>> = snapshots
            .iter()
            .filter(|snapshot| {
                snapshot.frame_index != frame_index && snapshot.frame_index.abs_diff(frame_index) <= window
            })
            .cloned()
            .collect();
        let summary = self.reconciler.reconcile(frame_index, &mut groups, &lines, &neighbors);
        if summary.changed() > 0 {
            info!(
                frame = frame_index,
                joined_streak = summary.joined_streak,
                adjacent_overlap = summary.adjacent_overlap,
                small_non_linear = summary.small_non_linear,
                "reconciled"
            );
        }

        stage.advance(FrameProcessingState::Painting)?;
        let (source, neighbor_frames) = self.load_with_neighbors(frame_index).await?;
        let padding = self.config.padding_pixels();
        let test_paint = self.config.test_paint;
        let (output, diagnostic, counts) = tokio::task::spawn_blocking(move || {
            let neighbors: Vec<&PixelBuffer> = neighbor_frames.iter().map(Arc::as_ref).collect();
            let output = paint_frame(frame_index, &source, &neighbors, &groups, padding)?;
            let diagnostic = test_paint.then(|| test_paint_frame(&source, &groups));
            Ok::<_, SkyclearError>((output, diagnostic, decision_counts(&groups)))
        })
        .await??;

        stage.advance(FrameProcessingState::WritingOutputFile)?;
        let sink = Arc::clone(&self.sink);
        tokio::task::spawn_blocking(move || {
            if let Some(diagnostic) = diagnostic {
                if let Err(err) = sink.write_test_paint(frame_index, diagnostic) {
                    warn!(frame = frame_index, error = %err, "could not write test paint frame");
                }
            }
            sink.write(frame_index, output)
        })
        .await??;

        stage.advance(FrameProcessingState::Complete)?;
        info!(frame = frame_index, "frame complete");
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbors_at_sequence_edges() {
        assert_eq!(neighbor_indices(0, 5), vec![1]);
        assert_eq!(neighbor_indices(2, 5), vec![1, 3]);
        assert_eq!(neighbor_indices(4, 5), vec![3]);
        assert!(neighbor_indices(0, 1).is_empty());
    }

    #[test]
    fn process_frame_rejects_mismatched_neighbors() {
        use crate::core_modules::pixel::pixel::Pixel;
        let frame = PixelBuffer::filled(10, 10, Pixel::BLACK);
        let neighbor = PixelBuffer::filled(10, 11, Pixel::BLACK);
        let err = process_frame(3, &frame, &[&neighbor], &Config::default(), Arc::default()).unwrap_err();
        assert!(matches!(err, SkyclearError::DimensionMismatch { frame: 3, .. }));
    }
}
