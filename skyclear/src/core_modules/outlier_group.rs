// THEORY:
// An `OutlierGroup` is one connected region of outlier pixels in one frame: a single
// candidate streak. It plays the role a blob plays in a motion engine, with two
// differences that matter here.
//
// 1.  **Identity is per frame**: the name (`group_0`, `group_1`, ...) is unique within
//     its frame and means nothing across frames. Cross-frame association goes through
//     Hough lines and bounding boxes, never names.
// 2.  **Write-once verdict**: the classifier assigns a `PaintReason` exactly once. Only
//     the streak reconciler may replace it, and it replaces it wholesale. Groups with no
//     Hough lines stay unset, which downstream means "do not paint, unresolved".
// 3.  **Lines are local**: the group's Hough lines are computed on a grid the size of
//     its bounding box. `dominant_line` translates the best one into frame coordinates.

use crate::core_modules::bounding_box::{BoundingBox, Point};
use crate::core_modules::hough::{self, Line};
use crate::core_modules::paint_reason::PaintReason;

#[derive(Debug, Clone)]
pub struct OutlierGroup {
    pub name: String,
    /// Number of member pixels.
    pub size: usize,
    pub bounds: BoundingBox,
    /// Mean brightness in excess of the outlier threshold.
    pub brightness: u32,
    pub members: Vec<Point>,
    /// Ranked Hough lines in bounding-box-local coordinates.
    pub lines: Vec<Line>,
    line_score: Option<f64>,
    paint_reason: Option<PaintReason>,
}

impl OutlierGroup {
    /// Builds a group from its member pixels and the sum of their excess brightness.
    pub fn new(name: String, members: Vec<Point>, total_excess: u64) -> Self {
        assert!(!members.is_empty(), "outlier group {name} has no members");
        let mut bounds = BoundingBox::from_point(members[0]);
        for point in &members[1..] {
            bounds.include(*point);
        }
        let size = members.len();
        Self {
            name,
            size,
            bounds,
            brightness: (total_excess / size as u64) as u32,
            members,
            lines: Vec::new(),
            line_score: None,
            paint_reason: None,
        }
    }

    /// Absorbs `other` into this group, keeping this group's name.
    pub fn merge(&mut self, other: OutlierGroup) {
        let total = self.brightness as u64 * self.size as u64 + other.brightness as u64 * other.size as u64;
        self.members.extend(other.members);
        self.size = self.members.len();
        self.bounds = self.bounds.union(&other.bounds);
        self.brightness = (total / self.size as u64) as u32;
    }

    /// Group pixels over bounding-box area.
    pub fn fill_amount(&self) -> f64 {
        self.size as f64 / self.bounds.area() as f64
    }

    /// Bounding-box width over height.
    pub fn aspect_ratio(&self) -> f64 {
        f64::from(self.bounds.width()) / f64::from(self.bounds.height())
    }

    /// Hough theta in degrees of the members' principal axis, from their second
    /// central moments. `None` when the members have no preferred direction.
    pub fn orientation(&self) -> Option<f64> {
        let n = self.size as f64;
        let (sum_x, sum_y) = self.members.iter().fold((0.0, 0.0), |(sx, sy), point| {
            (sx + f64::from(point.x), sy + f64::from(point.y))
        });
        let (mean_x, mean_y) = (sum_x / n, sum_y / n);
        let (mut xx, mut yy, mut xy) = (0.0, 0.0, 0.0);
        for point in &self.members {
            let dx = f64::from(point.x) - mean_x;
            let dy = f64::from(point.y) - mean_y;
            xx += dx * dx;
            yy += dy * dy;
            xy += dx * dy;
        }
        if (xx - yy).hypot(2.0 * xy) <= 1e-9 * (xx + yy).max(1.0) {
            return None;
        }
        let direction = (0.5 * (2.0 * xy).atan2(xx - yy)).to_degrees();
        Some((direction + 90.0).rem_euclid(180.0))
    }

    /// The group's pixels on a grid the size of its bounding box.
    pub fn local_grid(&self) -> Vec<bool> {
        let width = self.bounds.width() as usize;
        let mut grid = vec![false; width * self.bounds.height() as usize];
        for point in &self.members {
            let x = (point.x - self.bounds.min.x) as usize;
            let y = (point.y - self.bounds.min.y) as usize;
            grid[y * width + x] = true;
        }
        grid
    }

    /// Runs the Hough transform over this group's pixels only.
    pub fn compute_lines(&mut self, min_count: u32, max_lines: usize) {
        let grid = self.local_grid();
        self.lines = hough::lines(self.bounds.width(), self.bounds.height(), &grid, min_count, max_lines);
    }

    /// The best line, in frame coordinates.
    pub fn dominant_line(&self) -> Option<Line> {
        self.lines.first().map(|line| line.to_frame_coordinates(self.bounds.min))
    }

    pub fn line_score(&self) -> Option<f64> {
        self.line_score
    }

    pub(crate) fn set_line_score(&mut self, score: f64) {
        self.line_score = Some(score);
    }

    pub fn paint_reason(&self) -> Option<PaintReason> {
        self.paint_reason
    }

    pub fn will_paint(&self) -> bool {
        self.paint_reason.is_some_and(|reason| reason.will_paint())
    }

    /// Single assignment of the classifier's verdict. A second call is ignored and
    /// returns false.
    pub fn classify(&mut self, reason: PaintReason) -> bool {
        if self.paint_reason.is_some() {
            return false;
        }
        self.paint_reason = Some(reason);
        true
    }

    /// Wholesale replacement of the verdict by cross-frame reconciliation.
    pub(crate) fn reclassify(&mut self, reason: PaintReason) {
        self.paint_reason = Some(reason);
    }
}
