//! Outlier pixels and the per-frame outlier mask.

use std::hash::{Hash, Hasher};

/// A pixel that is brighter than every available neighbor frame by more than the
/// configured threshold. Identity is the coordinate alone.
#[derive(Debug, Clone)]
pub struct Outlier {
    pub x: u32,
    pub y: u32,
    /// Brightness in excess of the threshold.
    pub amount: u32,
    /// Name of the group this outlier ended up in, once grouped.
    pub tag: Option<String>,
}

impl Outlier {
    pub fn new(x: u32, y: u32, amount: u32) -> Self {
        Self { x, y, amount, tag: None }
    }
}

impl PartialEq for Outlier {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl Eq for Outlier {}

impl Hash for Outlier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.x.hash(state);
        self.y.hash(state);
    }
}

/// Boolean outlier grid for one frame plus the excess brightness of each flagged pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlierMask {
    width: u32,
    height: u32,
    flags: Vec<bool>,
    excess: Vec<u32>,
}

impl OutlierMask {
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self { width, height, flags: vec![false; len], excess: vec![0; len] }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn mark(&mut self, x: u32, y: u32, excess: u32) {
        let i = self.index(x, y);
        self.flags[i] = true;
        self.excess[i] = excess;
    }

    pub fn clear(&mut self, x: u32, y: u32) {
        let i = self.index(x, y);
        self.flags[i] = false;
        self.excess[i] = 0;
    }

    pub fn is_outlier(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.flags[self.index(x, y)]
    }

    pub fn excess(&self, x: u32, y: u32) -> u32 {
        self.excess[self.index(x, y)]
    }

    pub fn count(&self) -> usize {
        self.flags.iter().filter(|flag| **flag).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.flags.iter().any(|flag| *flag)
    }

    /// Row-major boolean grid, suitable as Hough transform input.
    pub fn grid(&self) -> &[bool] {
        &self.flags
    }

    /// All flagged pixels in raster order.
    pub fn outliers(&self) -> impl Iterator<Item = Outlier> + '_ {
        let width = self.width as usize;
        self.flags
            .iter()
            .enumerate()
            .filter(|(_, flag)| **flag)
            .map(move |(i, _)| Outlier::new((i % width) as u32, (i / width) as u32, self.excess[i]))
    }
}
