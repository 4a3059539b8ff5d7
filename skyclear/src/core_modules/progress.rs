// THEORY:
// Progress is owned by a single actor. Frame tasks never touch the aggregate
// state-by-stage map; they send stage changes down a channel and the monitor task
// applies them one at a time, exactly like chunk actors own their own state.
//
// Key architectural principles:
// 1.  **Forward only**: each frame carries a `FrameStage` that knows the one legal
//     next state. Skipping or going back is a `Stage` error, raised in the frame task
//     before anything is reported.
// 2.  **Atomic moves**: the monitor removes a frame from its old stage and inserts it
//     into the new one inside one message, so no observer can ever see a frame in two
//     stages or in none.
// 3.  **Never blocks the pipeline**: the channel is unbounded. Reporters are called
//     from the monitor task and are expected to return quickly.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{Result, SkyclearError};

/// Where a frame is in its processing, in the only order it may move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrameProcessingState {
    DetectingOutliers,
    InterFrameProcessing,
    OutlierProcessingComplete,
    Painting,
    WritingOutputFile,
    Complete,
}

impl FrameProcessingState {
    pub const ALL: [FrameProcessingState; 6] = [
        FrameProcessingState::DetectingOutliers,
        FrameProcessingState::InterFrameProcessing,
        FrameProcessingState::OutlierProcessingComplete,
        FrameProcessingState::Painting,
        FrameProcessingState::WritingOutputFile,
        FrameProcessingState::Complete,
    ];

    pub fn next(&self) -> Option<FrameProcessingState> {
        match self {
            Self::DetectingOutliers => Some(Self::InterFrameProcessing),
            Self::InterFrameProcessing => Some(Self::OutlierProcessingComplete),
            Self::OutlierProcessingComplete => Some(Self::Painting),
            Self::Painting => Some(Self::WritingOutputFile),
            Self::WritingOutputFile => Some(Self::Complete),
            Self::Complete => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::DetectingOutliers => "detecting outliers",
            Self::InterFrameProcessing => "inter-frame processing",
            Self::OutlierProcessingComplete => "outlier processing complete",
            Self::Painting => "painting",
            Self::WritingOutputFile => "writing output file",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for FrameProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which frames are in which stage, plus frames that failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageMap {
    stages: BTreeMap<FrameProcessingState, BTreeSet<usize>>,
    current: HashMap<usize, FrameProcessingState>,
    failed: BTreeSet<usize>,
}

impl StageMap {
    fn move_frame(&mut self, frame: usize, to: FrameProcessingState) {
        if let Some(from) = self.current.insert(frame, to) {
            if let Some(frames) = self.stages.get_mut(&from) {
                frames.remove(&frame);
            }
        }
        self.stages.entry(to).or_default().insert(frame);
    }

    fn mark_failed(&mut self, frame: usize) {
        if let Some(from) = self.current.remove(&frame) {
            if let Some(frames) = self.stages.get_mut(&from) {
                frames.remove(&frame);
            }
        }
        self.failed.insert(frame);
    }

    pub fn stage_of(&self, frame: usize) -> Option<FrameProcessingState> {
        self.current.get(&frame).copied()
    }

    pub fn count(&self, stage: FrameProcessingState) -> usize {
        self.stages.get(&stage).map_or(0, BTreeSet::len)
    }

    pub fn frames_in(&self, stage: FrameProcessingState) -> impl Iterator<Item = usize> + '_ {
        self.stages.get(&stage).into_iter().flat_map(|frames| frames.iter().copied())
    }

    pub fn failed(&self) -> &BTreeSet<usize> {
        &self.failed
    }
}

/// Receives every stage change. Called from the monitor task; must return quickly.
pub trait ProgressReporter: Send + Sync + 'static {
    fn on_stage_change(&self, frame: usize, stage: FrameProcessingState, stages: &StageMap);

    fn on_frame_failed(&self, _frame: usize, _error: &SkyclearError) {}
}

/// Reporter that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn on_stage_change(&self, _frame: usize, _stage: FrameProcessingState, _stages: &StageMap) {}
}

enum ProgressMessage {
    StageChange { frame: usize, stage: FrameProcessingState },
    Failed { frame: usize, error: SkyclearError },
    Snapshot(oneshot::Sender<StageMap>),
}

/// Sending side of the monitor, cloned into every frame task.
#[derive(Clone)]
pub struct ProgressHandle {
    sender: mpsc::UnboundedSender<ProgressMessage>,
}

impl ProgressHandle {
    fn send(&self, message: ProgressMessage) {
        // A closed monitor only means nobody is watching any more.
        let _ = self.sender.send(message);
    }

    pub fn failed(&self, frame: usize, error: SkyclearError) {
        self.send(ProgressMessage::Failed { frame, error });
    }
}

/// The actor owning the aggregate stage map.
pub struct ProgressMonitor {
    handle: ProgressHandle,
    task: JoinHandle<StageMap>,
}

impl ProgressMonitor {
    pub fn spawn(reporter: Arc<dyn ProgressReporter>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<ProgressMessage>();
        let task = tokio::spawn(async move {
            let mut stages = StageMap::default();
            while let Some(message) = receiver.recv().await {
                match message {
                    ProgressMessage::StageChange { frame, stage } => {
                        stages.move_frame(frame, stage);
                        debug!(frame, stage = %stage, "stage change");
                        reporter.on_stage_change(frame, stage, &stages);
                    }
                    ProgressMessage::Failed { frame, error } => {
                        stages.mark_failed(frame);
                        error!(frame, error = %error, "frame failed");
                        reporter.on_frame_failed(frame, &error);
                    }
                    ProgressMessage::Snapshot(reply) => {
                        let _ = reply.send(stages.clone());
                    }
                }
            }
            stages
        });
        Self { handle: ProgressHandle { sender }, task }
    }

    pub fn handle(&self) -> ProgressHandle {
        self.handle.clone()
    }

    /// The current stage map, after every message sent before this call.
    pub async fn snapshot(&self) -> Result<StageMap> {
        let (reply, response) = oneshot::channel();
        self.handle.send(ProgressMessage::Snapshot(reply));
        response
            .await
            .map_err(|_| SkyclearError::Task("progress monitor stopped".into()))
    }

    /// Waits for every outstanding handle to drop and returns the final stage map.
    pub async fn finish(self) -> Result<StageMap> {
        drop(self.handle);
        Ok(self.task.await?)
    }
}

/// One frame's position in the state machine.
pub struct FrameStage {
    frame: usize,
    current: Option<FrameProcessingState>,
    progress: ProgressHandle,
}

impl FrameStage {
    pub fn new(frame: usize, progress: ProgressHandle) -> Self {
        Self { frame, current: None, progress }
    }

    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn current(&self) -> Option<FrameProcessingState> {
        self.current
    }

    /// Moves to `to`, which must be the immediate successor of the current state (or
    /// `DetectingOutliers` for a fresh frame).
    pub fn advance(&mut self, to: FrameProcessingState) -> Result<()> {
        let expected = match self.current {
            None => Some(FrameProcessingState::DetectingOutliers),
            Some(current) => current.next(),
        };
        if expected != Some(to) {
            return Err(SkyclearError::Stage { frame: self.frame, from: self.current, to });
        }
        self.current = Some(to);
        self.progress.send(ProgressMessage::StageChange { frame: self.frame, stage: to });
        Ok(())
    }

    pub fn fail(&self, error: SkyclearError) {
        self.progress.failed(self.frame, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(usize, FrameProcessingState)>>,
    }

    impl ProgressReporter for Recorder {
        fn on_stage_change(&self, frame: usize, stage: FrameProcessingState, stages: &StageMap) {
            assert_eq!(stages.stage_of(frame), Some(stage));
            let total: usize = FrameProcessingState::ALL.iter().map(|s| stages.count(*s)).sum();
            assert_eq!(total, stages.current.len());
            self.events.lock().unwrap().push((frame, stage));
        }
    }

    #[test]
    fn states_are_ordered() {
        assert!(FrameProcessingState::ALL.windows(2).all(|w| w[0] < w[1] && w[0].next() == Some(w[1])));
        assert_eq!(FrameProcessingState::Complete.next(), None);
    }

    #[tokio::test]
    async fn frames_move_forward_only() {
        let monitor = ProgressMonitor::spawn(Arc::new(SilentReporter));
        let mut stage = FrameStage::new(7, monitor.handle());
        assert!(stage.advance(FrameProcessingState::InterFrameProcessing).is_err());
        stage.advance(FrameProcessingState::DetectingOutliers).unwrap();
        stage.advance(FrameProcessingState::InterFrameProcessing).unwrap();
        let err = stage.advance(FrameProcessingState::Painting).unwrap_err();
        assert_eq!(
            err,
            SkyclearError::Stage {
                frame: 7,
                from: Some(FrameProcessingState::InterFrameProcessing),
                to: FrameProcessingState::Painting,
            }
        );
        let err = stage.advance(FrameProcessingState::DetectingOutliers).unwrap_err();
        assert!(matches!(err, SkyclearError::Stage { .. }));
        assert_eq!(stage.current(), Some(FrameProcessingState::InterFrameProcessing));
    }

    #[tokio::test]
    async fn monitor_tracks_each_frame_in_one_stage() {
        let recorder = Arc::new(Recorder::default());
        let monitor = ProgressMonitor::spawn(recorder.clone());
        let mut a = FrameStage::new(0, monitor.handle());
        let mut b = FrameStage::new(1, monitor.handle());
        for state in FrameProcessingState::ALL {
            a.advance(state).unwrap();
        }
        b.advance(FrameProcessingState::DetectingOutliers).unwrap();

        let snapshot = monitor.snapshot().await.unwrap();
        assert_eq!(snapshot.stage_of(0), Some(FrameProcessingState::Complete));
        assert_eq!(snapshot.count(FrameProcessingState::DetectingOutliers), 1);
        assert_eq!(snapshot.frames_in(FrameProcessingState::Complete).collect::<Vec<_>>(), vec![0]);

        b.fail(SkyclearError::input(1, "truncated"));
        drop(a);
        drop(b);
        let finished = monitor.finish().await.unwrap();
        assert_eq!(finished.stage_of(1), None);
        assert!(finished.failed().contains(&1));

        let events = recorder.events.lock().unwrap();
        let frame_zero: Vec<_> = events.iter().filter(|(f, _)| *f == 0).map(|(_, s)| *s).collect();
        assert_eq!(frame_zero, FrameProcessingState::ALL.to_vec());
    }
}
