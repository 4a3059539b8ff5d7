//! Why a group is, or is not, painted over.

use std::fmt;

use crate::core_modules::pixel::pixel::Pixel;

/// Colors used by the diagnostic test-paint output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayColor {
    BrightMagenta,
    Yellow,
    Red,
    BrightRed,
    BrightCyan,
    BrightBlue,
    Cyan,
}

impl DisplayColor {
    pub fn name(&self) -> &'static str {
        match self {
            DisplayColor::BrightMagenta => "bright magenta",
            DisplayColor::Yellow => "yellow",
            DisplayColor::Red => "red",
            DisplayColor::BrightRed => "bright red",
            DisplayColor::BrightCyan => "bright cyan",
            DisplayColor::BrightBlue => "bright blue",
            DisplayColor::Cyan => "cyan",
        }
    }

    pub fn pixel(&self) -> Pixel {
        const FULL: u16 = u16::MAX;
        const HALF: u16 = 0x8000;
        const LOW: u16 = 0x4000;
        match self {
            DisplayColor::BrightMagenta => Pixel::new(FULL, LOW, FULL),
            DisplayColor::Yellow => Pixel::new(FULL, FULL, 0),
            DisplayColor::Red => Pixel::new(HALF, 0, 0),
            DisplayColor::BrightRed => Pixel::new(FULL, LOW, LOW),
            DisplayColor::BrightCyan => Pixel::new(LOW, FULL, FULL),
            DisplayColor::BrightBlue => Pixel::new(LOW, LOW, FULL),
            DisplayColor::Cyan => Pixel::new(0, HALF, HALF),
        }
    }

    /// ANSI escape that renders terminal text in this color.
    pub fn ansi(&self) -> &'static str {
        match self {
            DisplayColor::BrightMagenta => "\x1b[95m",
            DisplayColor::Yellow => "\x1b[33m",
            DisplayColor::Red => "\x1b[31m",
            DisplayColor::BrightRed => "\x1b[91m",
            DisplayColor::BrightCyan => "\x1b[96m",
            DisplayColor::BrightBlue => "\x1b[94m",
            DisplayColor::Cyan => "\x1b[36m",
        }
    }
}

/// The final verdict on one outlier group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaintReason {
    /// Larger than the assume-airplane size.
    Assumed,
    /// Single-frame score above 0.5.
    GoodScore(f64),
    /// The group's own Hough lines look like one dominant line.
    LooksLikeALine(f64),
    /// Continues a line seen in this many frames.
    InStreak(usize),
    /// Single-frame score at or below 0.5.
    BadScore(f64),
    /// Overlaps an unpainted group in an adjacent frame by this signed edge distance.
    AdjacentOverlap(f64),
    /// Too small and not linear enough.
    SmallNonLinear,
}

impl PaintReason {
    /// One representative of every variant, payloads zeroed.
    pub const ALL: [PaintReason; 7] = [
        PaintReason::Assumed,
        PaintReason::LooksLikeALine(0.0),
        PaintReason::GoodScore(0.0),
        PaintReason::InStreak(0),
        PaintReason::BadScore(0.0),
        PaintReason::AdjacentOverlap(0.0),
        PaintReason::SmallNonLinear,
    ];

    pub fn will_paint(&self) -> bool {
        match self {
            PaintReason::Assumed
            | PaintReason::GoodScore(_)
            | PaintReason::LooksLikeALine(_)
            | PaintReason::InStreak(_) => true,
            PaintReason::BadScore(_) | PaintReason::AdjacentOverlap(_) | PaintReason::SmallNonLinear => false,
        }
    }

    /// Variants that paint, in display order.
    pub fn should_paint_cases() -> impl Iterator<Item = PaintReason> {
        Self::ALL.into_iter().filter(|reason| reason.will_paint())
    }

    /// Variants that do not paint, in display order.
    pub fn should_not_paint_cases() -> impl Iterator<Item = PaintReason> {
        Self::ALL.into_iter().filter(|reason| !reason.will_paint())
    }

    /// Same variant, payload ignored.
    pub fn is_same_reason(&self, other: &PaintReason) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PaintReason::Assumed => "assumed",
            PaintReason::GoodScore(_) => "good score",
            PaintReason::LooksLikeALine(_) => "looks like a line",
            PaintReason::InStreak(_) => "in a streak",
            PaintReason::BadScore(_) => "bad score",
            PaintReason::AdjacentOverlap(_) => "adjacent overlap",
            PaintReason::SmallNonLinear => "small not linear",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PaintReason::Assumed => "Painted over because the group is larger than the assume-airplane size.",
            PaintReason::GoodScore(_) => {
                "Painted over because of a good score analyzing the outliers in a single frame."
            }
            PaintReason::LooksLikeALine(_) => {
                "Painted over because the group looks like a line based upon its hough transform."
            }
            PaintReason::InStreak(_) => "Painted over because the group continues a streak across frames.",
            PaintReason::BadScore(_) => {
                "Not painted over because of a bad score analyzing the outliers in a single frame."
            }
            PaintReason::AdjacentOverlap(_) => {
                "Not painted over because the group overlaps an unpainted group in an adjacent frame."
            }
            PaintReason::SmallNonLinear => "Not painted over because the group is too small and not linear enough.",
        }
    }

    pub fn display_color(&self) -> DisplayColor {
        match self {
            PaintReason::Assumed => DisplayColor::BrightMagenta,
            PaintReason::GoodScore(_) => DisplayColor::Yellow,
            PaintReason::LooksLikeALine(_) => DisplayColor::Red,
            PaintReason::InStreak(_) => DisplayColor::BrightRed,
            PaintReason::BadScore(_) => DisplayColor::BrightCyan,
            PaintReason::AdjacentOverlap(_) => DisplayColor::BrightBlue,
            PaintReason::SmallNonLinear => DisplayColor::Cyan,
        }
    }
}

impl fmt::Display for PaintReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaintReason::GoodScore(score) | PaintReason::LooksLikeALine(score) | PaintReason::BadScore(score) => {
                write!(f, "{} ({score:.3})", self.name())
            }
            PaintReason::InStreak(length) => write!(f, "{} ({length} frames)", self.name()),
            PaintReason::AdjacentOverlap(distance) => write!(f, "{} ({distance})", self.name()),
            PaintReason::Assumed | PaintReason::SmallNonLinear => f.write_str(self.name()),
        }
    }
}
