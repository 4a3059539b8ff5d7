// THEORY:
// The `streak_reconciler` module is the cross-frame layer. A single frame can be
// fooled: a faint stretch of a streak scores badly, and a twinkling star can score
// well. Airplanes keep going, stars stay put, so looking a few frames either side
// corrects both mistakes.
//
// This module solves the "data association problem" without tracking: it never
// follows an object, it only asks whether neighbors agree.
//
// Key architectural principles:
// 1.  **Frozen neighbors**: neighbor frames are read as `FrameSnapshot`s published at
//     the end of per-frame classification. Reconciling frame i never sees another
//     frame's reconciled result, so the outcome is independent of scheduling order.
// 2.  **Continuity upgrades**: a bad-scored or unresolved group whose line continues
//     painted groups' lines in enough neighbor frames joins the streak.
// 3.  **Overlap downgrades**: a group sitting on top of something a neighbor frame
//     chose not to paint is a stationary feature, not a plane.
// 4.  **Sacred verdicts**: `Assumed` and `InStreak` are never touched.

use std::sync::Arc;

use tracing::debug;

use crate::config::{Config, StreakConfig};
use crate::core_modules::bounding_box::BoundingBox;
use crate::core_modules::hough::{self, Line};
use crate::core_modules::outlier_group::OutlierGroup;
use crate::core_modules::paint_reason::PaintReason;

/// The parts of a classified group a neighbor frame needs.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSnapshot {
    pub name: String,
    pub size: usize,
    pub bounds: BoundingBox,
    /// Dominant line in frame coordinates, or the borrowed frame line.
    pub line: Option<Line>,
    pub paint_reason: Option<PaintReason>,
}

impl GroupSnapshot {
    pub fn will_paint(&self) -> bool {
        self.paint_reason.is_some_and(|reason| reason.will_paint())
    }
}

/// One frame's phase-one result, immutable once published.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    pub frame_index: usize,
    pub groups: Vec<GroupSnapshot>,
    /// Whole-frame Hough lines.
    pub lines: Vec<Line>,
}

impl FrameSnapshot {
    pub fn new(frame_index: usize, groups: &[OutlierGroup], lines: Vec<Line>, config: &Config) -> Self {
        let groups = groups
            .iter()
            .map(|group| GroupSnapshot {
                name: group.name.clone(),
                size: group.size,
                bounds: group.bounds,
                line: group_line(group, &lines, config.frame_line_theta_diff, config.frame_line_rho_diff),
                paint_reason: group.paint_reason(),
            })
            .collect();
        Self { frame_index, groups, lines }
    }
}

/// The strongest whole-frame line passing within `max_distance` of the group's box
/// center and running within `max_theta_diff` of the group's own orientation. A group
/// with no preferred direction accepts any angle.
pub fn borrowed_frame_line(
    group: &OutlierGroup,
    frame_lines: &[Line],
    max_theta_diff: f64,
    max_distance: f64,
) -> Option<Line> {
    let (cx, cy) = group.bounds.center();
    let orientation = group.orientation();
    frame_lines
        .iter()
        .find(|line| {
            line.distance_to(cx, cy) <= max_distance
                && orientation.is_none_or(|theta| hough::theta_difference(line.theta, theta) <= max_theta_diff)
        })
        .copied()
}

fn group_line(group: &OutlierGroup, frame_lines: &[Line], max_theta_diff: f64, max_distance: f64) -> Option<Line> {
    group
        .dominant_line()
        .or_else(|| borrowed_frame_line(group, frame_lines, max_theta_diff, max_distance))
}

/// How many decisions a reconciliation pass changed, by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileSummary {
    pub joined_streak: usize,
    pub adjacent_overlap: usize,
    pub small_non_linear: usize,
}

impl ReconcileSummary {
    pub fn changed(&self) -> usize {
        self.joined_streak + self.adjacent_overlap + self.small_non_linear
    }
}

#[derive(Debug, Clone)]
pub struct StreakReconciler {
    streak: StreakConfig,
    frame_line_theta_diff: f64,
    frame_line_rho_diff: f64,
    looks_like_a_line_min_size: usize,
}

impl StreakReconciler {
    pub fn new(config: &Config) -> Self {
        Self {
            streak: config.streak.clone(),
            frame_line_theta_diff: config.frame_line_theta_diff,
            frame_line_rho_diff: config.frame_line_rho_diff,
            looks_like_a_line_min_size: config.looks_like_a_line_min_size,
        }
    }

    /// Revises `groups` of frame `frame_index` against the published `neighbors`.
    /// Snapshots outside the configured window, or of this frame itself, are ignored.
    pub fn reconcile(
        &self,
        frame_index: usize,
        groups: &mut [OutlierGroup],
        frame_lines: &[Line],
        neighbors: &[Arc<FrameSnapshot>],
    ) -> ReconcileSummary {
        let window: Vec<&FrameSnapshot> = neighbors
            .iter()
            .map(Arc::as_ref)
            .filter(|snapshot| {
                snapshot.frame_index != frame_index
                    && snapshot.frame_index.abs_diff(frame_index) <= self.streak.neighbor_window
            })
            .collect();

        let mut summary = ReconcileSummary::default();
        for group in groups.iter_mut() {
            let current = group.paint_reason();
            if matches!(current, Some(PaintReason::Assumed | PaintReason::InStreak(_))) {
                continue;
            }

            if let Some(distance) = self.overlap_with_unpainted(group, &window) {
                group.reclassify(PaintReason::AdjacentOverlap(distance));
                summary.adjacent_overlap += 1;
                debug!(frame = frame_index, group = %group.name, distance, "overlaps unpainted neighbor group");
                continue;
            }

            let Some(line) = group_line(group, frame_lines, self.frame_line_theta_diff, self.frame_line_rho_diff) else {
                continue;
            };
            let matching = self.matching_frames(group, &line, &window);

            match current {
                None | Some(PaintReason::BadScore(_)) if matching >= self.streak.min_matching_neighbors => {
                    group.reclassify(PaintReason::InStreak(matching + 1));
                    summary.joined_streak += 1;
                    debug!(frame = frame_index, group = %group.name, matching, "continues a streak");
                }
                Some(PaintReason::GoodScore(_))
                    if matching == 0
                        && group.size < self.looks_like_a_line_min_size
                        && group.line_score().unwrap_or(0.0) == 0.0 =>
                {
                    group.reclassify(PaintReason::SmallNonLinear);
                    summary.small_non_linear += 1;
                    debug!(frame = frame_index, group = %group.name, size = group.size, "small and not linear");
                }
                _ => {}
            }
        }
        summary
    }

    /// Most negative padded edge distance to an unpainted neighbor group, if any is at
    /// or below the adjacent edge amount.
    fn overlap_with_unpainted(&self, group: &OutlierGroup, window: &[&FrameSnapshot]) -> Option<f64> {
        let padding = self.streak.boundary_padding;
        let bounds = group.bounds.padded(padding);
        window
            .iter()
            .flat_map(|snapshot| snapshot.groups.iter())
            .filter(|other| !other.will_paint())
            .map(|other| bounds.edge_distance(&other.bounds.padded(padding)) as f64)
            .filter(|distance| *distance <= self.streak.adjacent_edge_amount)
            .min_by(f64::total_cmp)
    }

    /// Neighbor frames holding a painted group whose line and position continue `line`.
    fn matching_frames(&self, group: &OutlierGroup, line: &Line, window: &[&FrameSnapshot]) -> usize {
        let (cx, cy) = group.bounds.center();
        let reach = self.streak.center_distance_multiplier
            * f64::from(group.bounds.width().max(group.bounds.height()));
        window
            .iter()
            .filter(|snapshot| {
                snapshot.groups.iter().any(|other| {
                    if !other.will_paint() {
                        return false;
                    }
                    let Some(other_line) = other.line else {
                        return false;
                    };
                    let (ox, oy) = other.bounds.center();
                    other_line.is_close_to(line, self.streak.max_theta_diff, self.streak.max_rho_diff)
                        && (ox - cx).hypot(oy - cy) <= reach
                })
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::bounding_box::Point;

    fn horizontal(name: &str, x0: u32, y: u32, len: u32) -> OutlierGroup {
        let members = (x0..x0 + len).map(|x| Point::new(x, y)).collect();
        let mut group = OutlierGroup::new(name.into(), members, u64::from(len) * 100);
        group.compute_lines(1, 100);
        group
    }

    fn snapshot(frame_index: usize, groups: &[OutlierGroup]) -> Arc<FrameSnapshot> {
        Arc::new(FrameSnapshot::new(frame_index, groups, Vec::new(), &Config::default()))
    }

    fn painted_neighbor(frame_index: usize, x0: u32) -> Arc<FrameSnapshot> {
        let mut group = horizontal("group_0", x0, 50, 40);
        group.classify(PaintReason::LooksLikeALine(0.9));
        snapshot(frame_index, &[group])
    }

    #[test]
    fn bad_score_joins_streak_with_enough_neighbors() {
        let reconciler = StreakReconciler::new(&Config::default());
        let mut groups = vec![horizontal("group_0", 100, 50, 40)];
        groups[0].classify(PaintReason::BadScore(0.3));
        let neighbors = vec![painted_neighbor(4, 40), painted_neighbor(6, 160)];
        let summary = reconciler.reconcile(5, &mut groups, &[], &neighbors);
        assert_eq!(summary.joined_streak, 1);
        assert_eq!(groups[0].paint_reason(), Some(PaintReason::InStreak(3)));
    }

    #[test]
    fn single_matching_neighbor_is_not_enough() {
        let reconciler = StreakReconciler::new(&Config::default());
        let mut groups = vec![horizontal("group_0", 100, 50, 40)];
        groups[0].classify(PaintReason::BadScore(0.3));
        let neighbors = vec![painted_neighbor(4, 40)];
        let summary = reconciler.reconcile(5, &mut groups, &[], &neighbors);
        assert_eq!(summary.changed(), 0);
        assert_eq!(groups[0].paint_reason(), Some(PaintReason::BadScore(0.3)));
    }

    #[test]
    fn neighbors_outside_window_are_ignored() {
        let reconciler = StreakReconciler::new(&Config::default());
        let mut groups = vec![horizontal("group_0", 100, 50, 40)];
        groups[0].classify(PaintReason::BadScore(0.3));
        let neighbors = vec![painted_neighbor(1, 40), painted_neighbor(9, 160)];
        reconciler.reconcile(5, &mut groups, &[], &neighbors);
        assert_eq!(groups[0].paint_reason(), Some(PaintReason::BadScore(0.3)));
    }

    #[test]
    fn overlap_with_unpainted_neighbor_suppresses_paint() {
        let reconciler = StreakReconciler::new(&Config::default());
        let mut groups = vec![horizontal("group_0", 100, 50, 40)];
        groups[0].classify(PaintReason::GoodScore(0.7));
        let mut star = horizontal("group_2", 110, 50, 20);
        star.classify(PaintReason::BadScore(0.1));
        let neighbors = vec![snapshot(4, &[star])];
        let summary = reconciler.reconcile(5, &mut groups, &[], &neighbors);
        assert_eq!(summary.adjacent_overlap, 1);
        assert!(matches!(groups[0].paint_reason(), Some(PaintReason::AdjacentOverlap(d)) if d <= -2.0));
        assert!(!groups[0].will_paint());
    }

    #[test]
    fn assumed_is_never_changed() {
        let reconciler = StreakReconciler::new(&Config::default());
        let mut groups = vec![horizontal("group_0", 100, 50, 40)];
        groups[0].classify(PaintReason::Assumed);
        let mut star = horizontal("group_0", 100, 50, 40);
        star.classify(PaintReason::BadScore(0.1));
        reconciler.reconcile(5, &mut groups, &[], &[snapshot(6, &[star])]);
        assert_eq!(groups[0].paint_reason(), Some(PaintReason::Assumed));
    }

    #[test]
    fn small_good_score_without_line_shape_is_downgraded() {
        let reconciler = StreakReconciler::new(&Config::default());
        let mut groups = vec![horizontal("group_0", 100, 50, 40)];
        groups[0].set_line_score(0.0);
        groups[0].classify(PaintReason::GoodScore(0.6));
        let summary = reconciler.reconcile(5, &mut groups, &[], &[]);
        assert_eq!(summary.small_non_linear, 1);
        assert_eq!(groups[0].paint_reason(), Some(PaintReason::SmallNonLinear));
    }

    #[test]
    fn unset_group_borrows_frame_line() {
        let members = (100..140).map(|x| Point::new(x, 50)).collect();
        let mut group = OutlierGroup::new("group_0".into(), members, 4000);
        assert!(group.lines.is_empty());
        let frame_lines = vec![Line { theta: 90.0, rho: 50.0, count: 40 }];
        let borrowed = borrowed_frame_line(&group, &frame_lines, 4.0, 70.0);
        assert_eq!(borrowed, Some(frame_lines[0]));

        let reconciler = StreakReconciler::new(&Config::default());
        let neighbors = vec![painted_neighbor(4, 40), painted_neighbor(6, 160)];
        reconciler.reconcile(5, std::slice::from_mut(&mut group), &frame_lines, &neighbors);
        assert_eq!(group.paint_reason(), Some(PaintReason::InStreak(3)));
    }

    #[test]
    fn frame_line_across_the_group_is_not_borrowed() {
        let members = (100..140).map(|x| Point::new(x, 50)).collect();
        let group = OutlierGroup::new("group_0".into(), members, 4000);
        // Passes through the box center but runs 80 degrees off the group's direction.
        let crossing = Line { theta: 170.0, rho: -40.0, count: 60 };
        assert!(crossing.distance_to(119.5, 50.0) <= 70.0);
        let along = Line { theta: 90.0, rho: 50.0, count: 40 };

        assert_eq!(borrowed_frame_line(&group, &[crossing], 0.0, 70.0), None);
        assert_eq!(borrowed_frame_line(&group, &[crossing], 4.0, 70.0), None);
        assert_eq!(borrowed_frame_line(&group, &[crossing, along], 4.0, 70.0), Some(along));
        assert_eq!(borrowed_frame_line(&group, &[crossing], 90.0, 70.0), Some(crossing));
    }

    #[test]
    fn frame_line_theta_tolerance_comes_from_config() {
        let members = (100..140).map(|x| Point::new(x, 50)).collect();
        let group = OutlierGroup::new("group_0".into(), members, 4000);
        let frame_lines = vec![Line { theta: 96.0, rho: 50.0, count: 40 }];

        let strict = Config::default();
        let snapshot = FrameSnapshot::new(5, std::slice::from_ref(&group), frame_lines.clone(), &strict);
        assert_eq!(snapshot.groups[0].line, None);

        let loose = Config { frame_line_theta_diff: 10.0, ..Config::default() };
        let snapshot = FrameSnapshot::new(5, std::slice::from_ref(&group), frame_lines.clone(), &loose);
        assert_eq!(snapshot.groups[0].line, Some(frame_lines[0]));
    }
}
