//! Inclusive pixel-space bounding boxes.

/// A pixel coordinate in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// The rectangle spanned by `min` and `max`, both inclusive. `min <= max` on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub min: Point,
    pub max: Point,
}

impl BoundingBox {
    pub fn new(min: Point, max: Point) -> Self {
        assert!(min.x <= max.x && min.y <= max.y, "inverted bounding box {min:?}..{max:?}");
        Self { min, max }
    }

    pub fn from_point(point: Point) -> Self {
        Self { min: point, max: point }
    }

    pub fn width(&self) -> u32 {
        self.max.x - self.min.x + 1
    }

    pub fn height(&self) -> u32 {
        self.max.y - self.min.y + 1
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.min.x && x <= self.max.x && y >= self.min.y && y <= self.max.y
    }

    pub fn include(&mut self, point: Point) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let mut merged = *self;
        merged.include(other.min);
        merged.include(other.max);
        merged
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (f64::from(self.min.x) + f64::from(self.max.x)) / 2.0,
            (f64::from(self.min.y) + f64::from(self.max.y)) / 2.0,
        )
    }

    /// Grows the box by `padding` on every side, clamped to a `width` x `height` frame.
    pub fn expanded(&self, padding: u32, width: u32, height: u32) -> BoundingBox {
        BoundingBox {
            min: Point::new(self.min.x.saturating_sub(padding), self.min.y.saturating_sub(padding)),
            max: Point::new(
                self.max.x.saturating_add(padding).min(width.saturating_sub(1)),
                self.max.y.saturating_add(padding).min(height.saturating_sub(1)),
            ),
        }
    }

    /// Grows the box by `padding` on every side with no frame clamp.
    pub fn padded(&self, padding: u32) -> BoundingBox {
        BoundingBox {
            min: Point::new(self.min.x.saturating_sub(padding), self.min.y.saturating_sub(padding)),
            max: Point::new(self.max.x.saturating_add(padding), self.max.y.saturating_add(padding)),
        }
    }

    /// Signed number of empty pixels between two boxes along the axis where they are
    /// furthest apart. Touching boxes are 0 apart; overlapping boxes are negative.
    pub fn edge_distance(&self, other: &BoundingBox) -> i64 {
        let axis = |a_min: u32, a_max: u32, b_min: u32, b_max: u32| -> i64 {
            let forward = i64::from(b_min) - i64::from(a_max);
            let backward = i64::from(a_min) - i64::from(b_max);
            forward.max(backward) - 1
        };
        let x = axis(self.min.x, self.max.x, other.min.x, other.max.x);
        let y = axis(self.min.y, self.max.y, other.min.y, other.max.y);
        x.max(y)
    }
}
