// THEORY:
// The Hough transform turns "is this blob a straight streak?" into a voting problem.
// Every set pixel votes for every (theta, rho) line that could pass through it; real
// lines collect far more votes than any accidental alignment of noise.
//
// Key architectural principles:
// 1.  **Classic parametrization**: `rho = x cos(theta) + y sin(theta)`, theta in whole
//     degrees over [0, 180), rho in whole pixels over the grid diagonal in both signs.
// 2.  **Pure function**: `lines` owns its accumulator and shares nothing but a static
//     trig table, so the same code runs on a full frame mask or on one group's pixels,
//     concurrently across groups and frames.
// 3.  **Deterministic ranking**: lines sort by votes descending, then theta, then rho.
//     Identical input always produces an identically ordered list.
// 4.  **Bounded output**: callers ask for N lines, and a global cap protects against
//     pathological inputs (a frame that is nothing but outliers).

use std::cmp::Ordering;
use std::sync::OnceLock;

use crate::core_modules::bounding_box::Point;

pub const THETA_STEPS: usize = 180;

/// No call ever returns more lines than this, whatever the caller asks for.
pub const MAX_LINES: usize = 1000;

static TRIG_TABLE: OnceLock<[(f64, f64); THETA_STEPS]> = OnceLock::new();

fn trig_table() -> &'static [(f64, f64); THETA_STEPS] {
    TRIG_TABLE.get_or_init(|| {
        let mut table = [(0.0, 0.0); THETA_STEPS];
        for (degrees, entry) in table.iter_mut().enumerate() {
            let radians = (degrees as f64).to_radians();
            *entry = (radians.cos(), radians.sin());
        }
        table
    })
}

/// Angle between two Hough thetas in degrees, wrapping at 180.
pub fn theta_difference(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs().rem_euclid(180.0);
    diff.min(180.0 - diff)
}

/// A candidate line in Hough space. `theta` is in degrees, `rho` in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub theta: f64,
    pub rho: f64,
    pub count: u32,
}

impl Line {
    /// Ranking order: most votes first, ties by lower theta then lower rho.
    pub fn rank(&self, other: &Line) -> Ordering {
        other
            .count
            .cmp(&self.count)
            .then(self.theta.total_cmp(&other.theta))
            .then(self.rho.total_cmp(&other.rho))
    }

    /// Re-expresses a line found in a sub-grid whose top-left corner sits at `origin`.
    pub fn to_frame_coordinates(&self, origin: Point) -> Line {
        let radians = self.theta.to_radians();
        Line {
            theta: self.theta,
            rho: self.rho + f64::from(origin.x) * radians.cos() + f64::from(origin.y) * radians.sin(),
            count: self.count,
        }
    }

    /// Theta and rho differences to `other`. A line at (theta, rho) is the same line as
    /// (theta - 180, -rho), so the smaller of the direct and wrapped comparisons wins.
    pub fn difference(&self, other: &Line) -> (f64, f64) {
        let theta = (self.theta - other.theta).abs();
        let direct = (theta, (self.rho - other.rho).abs());
        let wrapped = (180.0 - theta, (self.rho + other.rho).abs());
        if wrapped.0 < direct.0 { wrapped } else { direct }
    }

    pub fn is_close_to(&self, other: &Line, max_theta_diff: f64, max_rho_diff: f64) -> bool {
        let (theta, rho) = self.difference(other);
        theta <= max_theta_diff && rho <= max_rho_diff
    }

    /// Perpendicular distance from (x, y) to this line.
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        let radians = self.theta.to_radians();
        (x * radians.cos() + y * radians.sin() - self.rho).abs()
    }
}

/// Votes a row-major `width` x `height` boolean grid into lines with at least
/// `min_count` votes, returning at most `max_lines` of them (and never more than
/// [`MAX_LINES`]).
pub fn lines(width: u32, height: u32, grid: &[bool], min_count: u32, max_lines: usize) -> Vec<Line> {
    assert_eq!(
        grid.len(),
        width as usize * height as usize,
        "hough grid does not match {width}x{height}"
    );
    let wanted = max_lines.min(MAX_LINES);
    if wanted == 0 || grid.is_empty() {
        return Vec::new();
    }

    let diagonal = (f64::from(width).hypot(f64::from(height))).ceil() as i64;
    let rho_bins = (2 * diagonal + 1) as usize;
    let mut accumulator = vec![0u32; THETA_STEPS * rho_bins];
    let table = trig_table();

    let row_len = width as usize;
    for (i, _) in grid.iter().enumerate().filter(|(_, set)| **set) {
        let x = (i % row_len) as f64;
        let y = (i / row_len) as f64;
        for (theta, (cos, sin)) in table.iter().enumerate() {
            let rho = (x * cos + y * sin).round() as i64;
            accumulator[theta * rho_bins + (rho + diagonal) as usize] += 1;
        }
    }

    let mut found: Vec<Line> = accumulator
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0 && **count >= min_count)
        .map(|(bin, count)| Line {
            theta: (bin / rho_bins) as f64,
            rho: ((bin % rho_bins) as i64 - diagonal) as f64,
            count: *count,
        })
        .collect();

    if found.len() > wanted {
        found.select_nth_unstable_by(wanted - 1, |a, b| a.rank(b));
        found.truncate(wanted);
    }
    found.sort_unstable_by(|a, b| a.rank(b));
    found
}
