//! Tunable behavior for the whole engine, threaded explicitly into every stage.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SkyclearError};

/// Tolerances for cross-frame streak reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreakConfig {
    /// Frames searched in each direction.
    pub neighbor_window: usize,
    pub max_theta_diff: f64,
    pub max_rho_diff: f64,
    /// Neighbor frames that must carry a matching line before a group joins a streak.
    pub min_matching_neighbors: usize,
    /// Padding applied to both boxes before the overlap check.
    pub boundary_padding: u32,
    /// Signed edge distance at or below which two padded boxes count as overlapping.
    pub adjacent_edge_amount: f64,
    /// A neighbor group's center must lie within this many of the group's larger
    /// box dimensions.
    pub center_distance_multiplier: f64,
}

impl Default for StreakConfig {
    fn default() -> Self {
        Self {
            neighbor_window: 2,
            max_theta_diff: 5.0,
            max_rho_diff: 70.0,
            min_matching_neighbors: 2,
            boundary_padding: 1,
            adjacent_edge_amount: -2.0,
            center_distance_multiplier: 8.0,
        }
    }
}

/// Configuration for a run, with defaults matching the documented values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Brightness distance a pixel must exceed against every neighbor to be an outlier.
    pub max_pixel_distance: u16,
    /// Groups smaller than this are pruned.
    pub min_group_size: usize,
    /// Groups whose boxes are at most this many pixels apart are merged.
    pub group_merge_distance: i64,
    /// Groups larger than this are painted without scoring.
    pub assume_airplane_size: usize,
    pub looks_like_a_line_min_size: usize,
    /// Fewer group lines than this give a line score of zero.
    pub min_lines_for_line_score: usize,
    /// Hough lines requested per group.
    pub group_hough_line_count: usize,
    pub group_min_line_count: u32,
    /// Minimum votes for a whole-frame Hough line.
    pub min_line_count: u32,
    /// Whole-frame Hough lines kept per frame.
    pub max_number_of_lines: usize,
    pub frame_line_theta_diff: f64,
    pub frame_line_rho_diff: f64,
    /// Pixels added on every side of a painted group's box. Must be positive.
    pub padding: i32,
    pub max_concurrent_frames: usize,
    /// Decoded frames the cache keeps alive after their last user lets go.
    pub cache_retain: usize,
    /// Attempts made after a load reports resource exhaustion.
    pub load_retries: usize,
    /// Also produce the color-coded diagnostic sequence.
    pub test_paint: bool,
    pub streak: StreakConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_pixel_distance: 8500,
            min_group_size: 150,
            group_merge_distance: 0,
            assume_airplane_size: 1000,
            looks_like_a_line_min_size: 300,
            min_lines_for_line_score: 10,
            group_hough_line_count: 100,
            group_min_line_count: 1,
            min_line_count: 20,
            max_number_of_lines: 500,
            frame_line_theta_diff: 4.0,
            frame_line_rho_diff: 70.0,
            padding: 1,
            max_concurrent_frames: 4,
            cache_retain: 8,
            load_retries: 2,
            test_paint: false,
            streak: StreakConfig::default(),
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(json).map_err(|e| SkyclearError::Config(format!("unreadable config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings no frame could be processed with.
    pub fn validate(&self) -> Result<()> {
        fn reject(message: String) -> Result<()> {
            Err(SkyclearError::Config(message))
        }
        fn tolerance(name: &str, value: f64) -> Result<()> {
            if !value.is_finite() || value < 0.0 {
                return reject(format!("{name} must be finite and non-negative, got {value}"));
            }
            Ok(())
        }

        if self.max_pixel_distance == 0 {
            return reject("max_pixel_distance must be positive".into());
        }
        if self.min_group_size == 0 {
            return reject("min_group_size must be at least 1".into());
        }
        if self.group_merge_distance < 0 {
            return reject(format!("group_merge_distance must not be negative, got {}", self.group_merge_distance));
        }
        if self.padding <= 0 {
            return reject(format!("padding must be positive, got {}", self.padding));
        }
        if self.max_concurrent_frames == 0 {
            return reject("max_concurrent_frames must be at least 1".into());
        }
        if self.group_hough_line_count == 0 || self.max_number_of_lines == 0 {
            return reject("hough line counts must be at least 1".into());
        }
        if self.group_min_line_count == 0 || self.min_line_count == 0 {
            return reject("hough minimum votes must be at least 1".into());
        }
        if self.streak.min_matching_neighbors == 0 {
            return reject("streak.min_matching_neighbors must be at least 1".into());
        }
        tolerance("frame_line_theta_diff", self.frame_line_theta_diff)?;
        tolerance("frame_line_rho_diff", self.frame_line_rho_diff)?;
        tolerance("streak.max_theta_diff", self.streak.max_theta_diff)?;
        tolerance("streak.max_rho_diff", self.streak.max_rho_diff)?;
        tolerance("streak.center_distance_multiplier", self.streak.center_distance_multiplier)?;
        if !self.streak.adjacent_edge_amount.is_finite() {
            return reject("streak.adjacent_edge_amount must be finite".into());
        }
        Ok(())
    }

    /// Padding as a pixel count. Non-positive values are rejected by `validate`.
    pub fn padding_pixels(&self) -> u32 {
        self.padding.max(0) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_pixel_distance, 8500);
        assert_eq!(config.streak.min_matching_neighbors, 2);
    }

    #[test]
    fn rejects_non_positive_padding() {
        for padding in [0, -3] {
            let config = Config { padding, ..Config::default() };
            assert!(matches!(config.validate(), Err(SkyclearError::Config(_))));
        }
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = Config::from_json(r#"{ "padding": 5, "streak": { "neighbor_window": 3 } }"#).unwrap();
        assert_eq!(config.padding, 5);
        assert_eq!(config.streak.neighbor_window, 3);
        assert_eq!(config.streak.max_rho_diff, 70.0);
        assert_eq!(config.min_group_size, 150);
    }

    #[test]
    fn bad_json_is_a_config_error() {
        assert!(matches!(Config::from_json("{ nope"), Err(SkyclearError::Config(_))));
        assert!(matches!(
            Config::from_json(r#"{ "max_concurrent_frames": 0 }"#),
            Err(SkyclearError::Config(_))
        ));
    }
}
