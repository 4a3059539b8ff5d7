// THEORY:
// Classification is calibrated against two populations of hand-labelled outlier
// groups: airplanes and everything else (stars twinkling, satellites too faint to
// matter, noise, clouds). For each feature we keep one bucketed histogram per
// population. A value is scored by looking it up in both and asking what fraction of
// the combined frequency belongs to airplanes.
//
// Key architectural principles:
// 1.  **One primitive**: `histogram_lookup` is the only table access. It is a pure
//     function of (value, domain, bucket width, table) with a caller-chosen result for
//     anything outside the table.
// 2.  **Boundary scores**: past the calibrated range one population has no examples
//     at all, so the score saturates at 1 or 0 instead of interpolating.
// 3.  **Fixed for the process lifetime**: tables are loaded (or defaulted) once,
//     validated, and then shared immutably behind an `Arc`.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SkyclearError};

/// Score given when neither population has data for a value.
const NEUTRAL_SCORE: f64 = 0.5;

/// A bucketed frequency table over `[min, max]` with buckets `step` wide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub values: Vec<f64>,
}

impl Histogram {
    pub fn new(min: f64, max: f64, step: f64, values: Vec<f64>) -> Self {
        Self { min, max, step, values }
    }

    fn validate(&self, feature: &str) -> Result<()> {
        let valid = self.min.is_finite()
            && self.max.is_finite()
            && self.min < self.max
            && self.step.is_finite()
            && self.step > 0.0
            && !self.values.is_empty()
            && self.values.iter().all(|v| v.is_finite() && *v >= 0.0);
        if valid {
            Ok(())
        } else {
            Err(SkyclearError::Config(format!("malformed {feature} histogram")))
        }
    }
}

/// Returns the bucket at `floor((value - min) / step)`, or `out_of_domain` when the
/// value lies outside `[min, max]` or past the end of the table.
pub fn histogram_lookup(value: f64, histogram: &Histogram, out_of_domain: f64) -> f64 {
    if !value.is_finite() || value < histogram.min || value > histogram.max {
        return out_of_domain;
    }
    let index = ((value - histogram.min) / histogram.step).floor() as usize;
    histogram.values.get(index).copied().unwrap_or(out_of_domain)
}

/// Which end of a feature's range belongs to airplanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leaning {
    /// Below the airplane minimum scores 1, above the non-airplane maximum scores 0.
    SmallIsAirplane,
    /// Below the non-airplane minimum scores 0, above the airplane maximum scores 1.
    LargeIsAirplane,
}

/// The airplane and non-airplane tables for a single feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureHistograms {
    pub airplanes: Histogram,
    pub non_airplanes: Histogram,
    pub leaning: Leaning,
}

impl FeatureHistograms {
    /// Likelihood in 0..=1 that `value` came from an airplane.
    pub fn score(&self, value: f64) -> f64 {
        match self.leaning {
            Leaning::SmallIsAirplane => {
                if value < self.airplanes.min {
                    return 1.0;
                }
                if value > self.non_airplanes.max {
                    return 0.0;
                }
            }
            Leaning::LargeIsAirplane => {
                if value < self.non_airplanes.min {
                    return 0.0;
                }
                if value > self.airplanes.max {
                    return 1.0;
                }
            }
        }
        let airplane = histogram_lookup(value, &self.airplanes, 0.0);
        let non_airplane = histogram_lookup(value, &self.non_airplanes, 0.0);
        if airplane + non_airplane <= 0.0 {
            return NEUTRAL_SCORE;
        }
        airplane / (airplane + non_airplane)
    }

    fn validate(&self, feature: &str) -> Result<()> {
        self.airplanes.validate(feature)?;
        self.non_airplanes.validate(feature)
    }
}

/// Reference histograms for every feature the classifier scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceHistograms {
    /// Pixel count of the group.
    pub group_size: FeatureHistograms,
    /// Bounding box width over height.
    pub aspect_ratio: FeatureHistograms,
    /// Pixel count over bounding box area.
    pub fill_amount: FeatureHistograms,
    /// Distinct vote counts over number of lines in the group's Hough result.
    pub distinct_counts_ratio: FeatureHistograms,
    /// Normalized index of the first line whose votes fall to half the vote range.
    pub center_line_position: FeatureHistograms,
}

impl ReferenceHistograms {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let histograms: Self = serde_json::from_str(json)
            .map_err(|err| SkyclearError::Config(format!("reference histograms: {err}")))?;
        histograms.validate()?;
        Ok(histograms)
    }

    pub fn validate(&self) -> Result<()> {
        self.group_size.validate("group size")?;
        self.aspect_ratio.validate("aspect ratio")?;
        self.fill_amount.validate("fill amount")?;
        self.distinct_counts_ratio.validate("distinct counts ratio")?;
        self.center_line_position.validate("center line position")
    }
}

impl Default for ReferenceHistograms {
    fn default() -> Self {
        Self {
            group_size: FeatureHistograms {
                airplanes: Histogram::new(
                    150.0,
                    1000.0,
                    50.0,
                    vec![
                        0.020, 0.030, 0.040, 0.050, 0.050, 0.060, 0.060, 0.070, 0.070, 0.070, 0.070,
                        0.070, 0.070, 0.070, 0.070, 0.070, 0.080,
                    ],
                ),
                non_airplanes: Histogram::new(
                    100.0,
                    1000.0,
                    50.0,
                    vec![
                        0.300, 0.200, 0.130, 0.090, 0.070, 0.050, 0.040, 0.030, 0.025, 0.020, 0.015,
                        0.012, 0.010, 0.008, 0.006, 0.005, 0.004, 0.003,
                    ],
                ),
                leaning: Leaning::LargeIsAirplane,
            },
            aspect_ratio: FeatureHistograms {
                airplanes: Histogram::new(
                    0.1,
                    10.0,
                    0.5,
                    vec![
                        0.120, 0.080, 0.060, 0.055, 0.050, 0.050, 0.045, 0.045, 0.040, 0.040, 0.040,
                        0.040, 0.035, 0.035, 0.035, 0.030, 0.030, 0.030, 0.030, 0.030,
                    ],
                ),
                non_airplanes: Histogram::new(
                    0.2,
                    8.0,
                    0.4,
                    vec![
                        0.080, 0.150, 0.200, 0.150, 0.100, 0.070, 0.050, 0.040, 0.030, 0.025, 0.020,
                        0.015, 0.012, 0.010, 0.010, 0.008, 0.008, 0.006, 0.006, 0.005,
                    ],
                ),
                leaning: Leaning::SmallIsAirplane,
            },
            fill_amount: FeatureHistograms {
                airplanes: Histogram::new(
                    0.001,
                    1.0,
                    0.05,
                    vec![
                        0.200, 0.150, 0.120, 0.100, 0.080, 0.070, 0.060, 0.050, 0.040, 0.030, 0.025,
                        0.020, 0.015, 0.010, 0.008, 0.006, 0.005, 0.004, 0.003, 0.002,
                    ],
                ),
                non_airplanes: Histogram::new(
                    0.01,
                    1.0,
                    0.05,
                    vec![
                        0.010, 0.020, 0.030, 0.040, 0.050, 0.060, 0.070, 0.080, 0.080, 0.080, 0.080,
                        0.070, 0.070, 0.060, 0.050, 0.040, 0.030, 0.030, 0.020, 0.010,
                    ],
                ),
                leaning: Leaning::SmallIsAirplane,
            },
            distinct_counts_ratio: FeatureHistograms {
                airplanes: Histogram::new(
                    0.05,
                    1.0,
                    0.1,
                    vec![0.220, 0.180, 0.150, 0.120, 0.100, 0.080, 0.060, 0.040, 0.030, 0.020],
                ),
                non_airplanes: Histogram::new(
                    0.1,
                    1.0,
                    0.1,
                    vec![0.020, 0.040, 0.060, 0.080, 0.100, 0.120, 0.140, 0.140, 0.150, 0.150],
                ),
                leaning: Leaning::SmallIsAirplane,
            },
            center_line_position: FeatureHistograms {
                airplanes: Histogram::new(
                    0.02,
                    0.6,
                    0.04,
                    vec![
                        0.250, 0.180, 0.130, 0.100, 0.080, 0.060, 0.050, 0.040, 0.030, 0.020, 0.015,
                        0.010, 0.008, 0.005, 0.002,
                    ],
                ),
                non_airplanes: Histogram::new(
                    0.05,
                    1.0,
                    0.05,
                    vec![
                        0.005, 0.010, 0.020, 0.030, 0.040, 0.050, 0.060, 0.070, 0.070, 0.070, 0.070,
                        0.070, 0.070, 0.070, 0.060, 0.060, 0.050, 0.050, 0.040, 0.040,
                    ],
                ),
                leaning: Leaning::SmallIsAirplane,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Histogram {
        Histogram::new(10.0, 20.0, 2.5, vec![1.0, 2.0, 3.0, 4.0])
    }

    #[test]
    fn lookup_picks_floor_bucket() {
        assert_eq!(histogram_lookup(10.0, &table(), -1.0), 1.0);
        assert_eq!(histogram_lookup(12.49, &table(), -1.0), 1.0);
        assert_eq!(histogram_lookup(12.5, &table(), -1.0), 2.0);
        assert_eq!(histogram_lookup(19.99, &table(), -1.0), 4.0);
    }

    #[test]
    fn lookup_outside_domain_returns_boundary() {
        assert_eq!(histogram_lookup(9.99, &table(), 0.25), 0.25);
        assert_eq!(histogram_lookup(20.01, &table(), 0.75), 0.75);
        assert_eq!(histogram_lookup(f64::NAN, &table(), 0.5), 0.5);
        // 20.0 is in the domain but one past the last bucket.
        assert_eq!(histogram_lookup(20.0, &table(), 9.0), 9.0);
    }

    #[test]
    fn lookup_is_pure() {
        let t = table();
        let first = histogram_lookup(15.3, &t, 0.0);
        for _ in 0..10 {
            assert_eq!(histogram_lookup(15.3, &t, 0.0), first);
        }
    }

    #[test]
    fn feature_score_saturates_past_calibration() {
        let refs = ReferenceHistograms::default();
        assert_eq!(refs.group_size.score(50.0), 0.0);
        assert_eq!(refs.group_size.score(5000.0), 1.0);
        assert_eq!(refs.center_line_position.score(0.01), 1.0);
        assert_eq!(refs.center_line_position.score(1.5), 0.0);
    }

    #[test]
    fn feature_score_is_airplane_share() {
        let refs = ReferenceHistograms::default();
        // size 500: airplane bucket 7 (0.07), non-airplane bucket 8 (0.025)
        let score = refs.group_size.score(500.0);
        assert!((score - 0.07 / 0.095).abs() < 1e-12);
    }

    #[test]
    fn neutral_when_neither_population_has_data() {
        let feature = FeatureHistograms {
            airplanes: Histogram::new(0.0, 1.0, 0.5, vec![0.0, 0.0]),
            non_airplanes: Histogram::new(0.0, 1.0, 0.5, vec![0.0, 0.0]),
            leaning: Leaning::SmallIsAirplane,
        };
        assert_eq!(feature.score(0.3), 0.5);
    }

    #[test]
    fn json_round_trip_and_validation() {
        let json = serde_json::to_string(&ReferenceHistograms::default()).expect("serialize");
        let parsed = ReferenceHistograms::from_json_str(&json).expect("parse");
        assert_eq!(parsed, ReferenceHistograms::default());

        let mut broken = ReferenceHistograms::default();
        broken.fill_amount.airplanes.step = 0.0;
        assert!(broken.validate().is_err());
    }
}
