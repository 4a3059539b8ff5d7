use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use skyclear::core_modules::progress::StageMap;
use skyclear::{
    Config, FrameLoader, FrameProcessingState, FrameSink, PaintReason, Pixel, PipelineOrchestrator, PixelBuffer,
    ProgressReporter, ReferenceHistograms, Result, SkyclearError, process_frame,
};

const SIZE: u32 = 520;
const STREAK: Pixel = Pixel::new(30000, 30000, 30000);

fn sky(x: u32, y: u32, lift: u16) -> Pixel {
    Pixel::new(
        1000 + (x % 7) as u16 * 10 + lift,
        1200 + (y % 5) as u16 * 10 + lift,
        1400 + lift,
    )
}

fn background(lift: u16) -> PixelBuffer {
    let mut frame = PixelBuffer::filled(SIZE, SIZE, Pixel::BLACK);
    for y in 0..SIZE {
        for x in 0..SIZE {
            frame.set_pixel(x, y, sky(x, y, lift));
        }
    }
    frame
}

fn streak_points() -> Vec<(u32, u32)> {
    (0..500).map(|i| (i + 10, i + 10)).collect()
}

/// Clean frames 0 and 2, and frame 1 slightly brighter overall with a 500 pixel
/// 45 degree streak across it.
fn three_frames() -> Vec<PixelBuffer> {
    let mut streaked = background(100);
    for (x, y) in streak_points() {
        streaked.set_pixel(x, y, STREAK);
    }
    vec![background(0), streaked, background(0)]
}

struct MemoryLoader {
    frames: Vec<PixelBuffer>,
    broken: Option<usize>,
}

impl FrameLoader for MemoryLoader {
    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn load(&self, frame_index: usize) -> Result<PixelBuffer> {
        if self.broken == Some(frame_index) {
            return Err(SkyclearError::input(frame_index, "truncated file"));
        }
        self.frames
            .get(frame_index)
            .cloned()
            .ok_or_else(|| SkyclearError::input(frame_index, "no such frame"))
    }
}

#[derive(Default)]
struct MemorySink {
    written: Mutex<BTreeMap<usize, PixelBuffer>>,
    test_painted: Mutex<BTreeMap<usize, PixelBuffer>>,
}

impl FrameSink for MemorySink {
    fn write(&self, frame_index: usize, frame: PixelBuffer) -> Result<()> {
        self.written.lock().unwrap().insert(frame_index, frame);
        Ok(())
    }

    fn write_test_paint(&self, frame_index: usize, frame: PixelBuffer) -> Result<()> {
        self.test_painted.lock().unwrap().insert(frame_index, frame);
        Ok(())
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<(usize, FrameProcessingState)>>,
}

impl ProgressReporter for Recorder {
    fn on_stage_change(&self, frame: usize, stage: FrameProcessingState, stages: &StageMap) {
        assert_eq!(stages.stage_of(frame), Some(stage));
        self.events.lock().unwrap().push((frame, stage));
    }
}

#[test]
fn streak_is_painted_from_neighbors() {
    let frames = three_frames();
    let (output, groups) = process_frame(
        1,
        &frames[1],
        &[&frames[0], &frames[2]],
        &Config::default(),
        Arc::new(ReferenceHistograms::default()),
    )
    .unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].size, 500);
    assert!(groups[0].will_paint(), "{:?}", groups[0].paint_reason());
    for (x, y) in streak_points() {
        assert_eq!(output.pixel(x, y), frames[0].pixel(x, y), "({x}, {y})");
    }
    // Outside the padded box the frame is untouched.
    assert_eq!(output.pixel(0, 0), frames[1].pixel(0, 0));
    assert_eq!(output.pixel(515, 515), frames[1].pixel(515, 515));
}

#[test]
fn identical_frames_have_no_groups() {
    let frame = background(0);
    let (output, groups) = process_frame(
        0,
        &frame,
        &[&frame.clone()],
        &Config::default(),
        Arc::new(ReferenceHistograms::default()),
    )
    .unwrap();
    assert!(groups.is_empty());
    assert_eq!(output, frame);
}

#[test]
fn large_group_is_assumed_and_padding_clamps_at_edge() {
    let clean = background(0);
    let mut blob = background(100);
    for y in 100..140 {
        for x in 0..40 {
            blob.set_pixel(x, y, STREAK);
        }
    }
    let config = Config { padding: 5, ..Config::default() };
    let (output, groups) = process_frame(
        1,
        &blob,
        &[&clean],
        &config,
        Arc::new(ReferenceHistograms::default()),
    )
    .unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].size, 1600);
    assert_eq!(groups[0].paint_reason(), Some(PaintReason::Assumed));
    assert!(groups[0].lines.is_empty());

    for y in 90..150 {
        for x in 0..50 {
            let painted = x <= 44 && (95..=144).contains(&y);
            let expected = if painted { clean.pixel(x, y) } else { blob.pixel(x, y) };
            assert_eq!(output.pixel(x, y), expected, "({x}, {y})");
        }
    }
}

#[test]
fn groups_fit_their_bounding_boxes() {
    let frames = three_frames();
    let (_, groups) = process_frame(
        1,
        &frames[1],
        &[&frames[0]],
        &Config::default(),
        Arc::new(ReferenceHistograms::default()),
    )
    .unwrap();
    for group in &groups {
        assert!(u64::from(group.bounds.width()) * u64::from(group.bounds.height()) >= group.size as u64);
    }
}

#[test]
fn invalid_config_is_rejected_before_running() {
    let loader = Arc::new(MemoryLoader { frames: three_frames(), broken: None });
    let config = Config { padding: 0, ..Config::default() };
    let result = PipelineOrchestrator::new(
        config,
        Arc::new(ReferenceHistograms::default()),
        loader,
        Arc::new(MemorySink::default()),
    );
    assert!(matches!(result, Err(SkyclearError::Config(_))));
}

#[tokio::test]
async fn pipeline_paints_and_reports_every_stage() {
    let frames = three_frames();
    let loader = Arc::new(MemoryLoader { frames: frames.clone(), broken: None });
    let sink = Arc::new(MemorySink::default());
    let recorder = Arc::new(Recorder::default());
    let config = Config { test_paint: true, max_concurrent_frames: 2, ..Config::default() };
    let orchestrator = PipelineOrchestrator::new(config, Arc::new(ReferenceHistograms::default()), loader, sink.clone())
        .unwrap()
        .with_reporter(recorder.clone());

    let report = orchestrator.run().await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.completed, vec![0, 1, 2]);
    assert_eq!(report.decisions.values().sum::<usize>(), 1);

    let written = sink.written.lock().unwrap();
    assert_eq!(written.len(), 3);
    assert_eq!(written[&0], frames[0]);
    assert_eq!(written[&2], frames[2]);
    for (x, y) in streak_points() {
        assert_eq!(written[&1].pixel(x, y), frames[0].pixel(x, y));
    }

    let test_painted = sink.test_painted.lock().unwrap();
    let color = test_painted[&1].pixel(10, 10);
    assert!(PaintReason::should_paint_cases().any(|reason| reason.display_color().pixel() == color));

    let events = recorder.events.lock().unwrap();
    for frame in 0..3 {
        let stages: Vec<_> = events.iter().filter(|(f, _)| *f == frame).map(|(_, s)| *s).collect();
        assert_eq!(stages, FrameProcessingState::ALL.to_vec(), "frame {frame}");
    }
}

#[tokio::test]
async fn failed_frame_is_reported_and_not_written() {
    let mut frames = three_frames();
    frames.push(background(0));
    frames.push(background(0));
    let loader = Arc::new(MemoryLoader { frames: frames.clone(), broken: Some(4) });
    let sink = Arc::new(MemorySink::default());
    let orchestrator =
        PipelineOrchestrator::new(Config::default(), Arc::new(ReferenceHistograms::default()), loader, sink.clone())
            .unwrap();

    let report = orchestrator.run().await.unwrap();
    assert!(!report.is_success());
    let failed: Vec<_> = report.failed.iter().map(|(frame, _)| *frame).collect();
    assert_eq!(failed, vec![4]);
    assert!(matches!(report.failed[0].1, SkyclearError::Input { frame: 4, .. }));
    assert_eq!(report.completed, vec![0, 1, 2, 3]);

    let written = sink.written.lock().unwrap();
    assert!(!written.contains_key(&4));
    // Frame 3 is compared against frame 2 alone.
    assert_eq!(written[&3], frames[3]);
}

#[tokio::test]
async fn unreadable_frame_does_not_fail_its_neighbors() {
    let mut frames = three_frames();
    frames.push(background(0));
    frames.push(background(0));
    let loader = Arc::new(MemoryLoader { frames: frames.clone(), broken: Some(2) });
    let sink = Arc::new(MemorySink::default());
    let orchestrator =
        PipelineOrchestrator::new(Config::default(), Arc::new(ReferenceHistograms::default()), loader, sink.clone())
            .unwrap();

    let report = orchestrator.run().await.unwrap();
    let failed: Vec<_> = report.failed.iter().map(|(frame, _)| *frame).collect();
    assert_eq!(failed, vec![2]);
    assert_eq!(report.completed, vec![0, 1, 3, 4]);

    // The streak in frame 1 is still found and painted from frame 0 alone.
    let written = sink.written.lock().unwrap();
    for (x, y) in streak_points() {
        assert_eq!(written[&1].pixel(x, y), frames[0].pixel(x, y), "({x}, {y})");
    }
    assert_eq!(written[&3], frames[3]);
}

/// Tracks the most frames seen at once in each pass.
#[derive(Default)]
struct InFlight {
    classifying: Mutex<usize>,
    finishing: Mutex<usize>,
}

impl ProgressReporter for InFlight {
    fn on_stage_change(&self, _frame: usize, _stage: FrameProcessingState, stages: &StageMap) {
        let classifying = stages.count(FrameProcessingState::DetectingOutliers)
            + stages.count(FrameProcessingState::InterFrameProcessing);
        let finishing = stages.count(FrameProcessingState::Painting)
            + stages.count(FrameProcessingState::WritingOutputFile);
        let mut peak = self.classifying.lock().unwrap();
        *peak = (*peak).max(classifying);
        let mut peak = self.finishing.lock().unwrap();
        *peak = (*peak).max(finishing);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn frames_in_flight_never_exceed_the_limit() {
    let frames: Vec<_> = (0..8).map(|i| background(i * 10)).collect();
    let loader = Arc::new(MemoryLoader { frames, broken: None });
    let sink = Arc::new(MemorySink::default());
    let in_flight = Arc::new(InFlight::default());
    let config = Config { max_concurrent_frames: 2, ..Config::default() };
    let orchestrator = PipelineOrchestrator::new(config, Arc::new(ReferenceHistograms::default()), loader, sink.clone())
        .unwrap()
        .with_reporter(in_flight.clone());

    let report = orchestrator.run().await.unwrap();
    assert_eq!(report.completed, (0..8).collect::<Vec<_>>());

    let classifying = *in_flight.classifying.lock().unwrap();
    let finishing = *in_flight.finishing.lock().unwrap();
    assert!((1..=2).contains(&classifying), "pass one peak {classifying}");
    assert!((1..=2).contains(&finishing), "pass two peak {finishing}");
    assert_eq!(sink.written.lock().unwrap().len(), 8);
}
