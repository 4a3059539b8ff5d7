// THEORY:
// The group extractor is the spatial grouping layer. It turns a frame's outlier mask
// into a small set of candidate streaks that the rest of the engine can reason about
// one at a time.
//
// Key architectural principles & algorithm steps:
// 1.  **Labeling**: a raster scan seeds a flood fill at every unvisited outlier. The
//     fill uses 8-connectivity, so a one-pixel-wide diagonal streak stays one group.
//     Groups are named `group_N` in the order their first pixel is met.
// 2.  **Pruning**: components below the minimum group size are noise (stars twinkling,
//     hot pixels). They are dropped and their pixels cleared from the mask, so the
//     whole-frame Hough pass never sees them.
// 3.  **Merging**: a streak broken by a dim stretch shows up as several components
//     whose boxes touch or nearly touch. Pairs within the merge distance are fused
//     until no pair qualifies. The survivor keeps the earlier name.
// 4.  **Indexing**: the result carries a sparse pixel -> group index for lookups
//     during painting and diagnostics.
// 5.  **Stateless Utility**: nothing is remembered between frames.

use std::collections::HashMap;

use crate::config::Config;
use crate::core_modules::bounding_box::Point;
use crate::core_modules::outlier::{Outlier, OutlierMask};
use crate::core_modules::outlier_group::OutlierGroup;

/// The surviving groups of one frame and the pixel index over them.
#[derive(Debug, Clone, Default)]
pub struct GroupSet {
    pub groups: Vec<OutlierGroup>,
    index: HashMap<Point, usize>,
}

impl GroupSet {
    fn new(groups: Vec<OutlierGroup>) -> Self {
        let mut index = HashMap::with_capacity(groups.iter().map(|g| g.size).sum());
        for (i, group) in groups.iter().enumerate() {
            for point in &group.members {
                index.insert(*point, i);
            }
        }
        Self { groups, index }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group_at(&self, x: u32, y: u32) -> Option<&OutlierGroup> {
        self.index.get(&Point::new(x, y)).map(|i| &self.groups[*i])
    }

    pub fn group_name_at(&self, x: u32, y: u32) -> Option<&str> {
        self.group_at(x, y).map(|group| group.name.as_str())
    }

    /// The mask's outliers tagged with the name of the group each belongs to.
    pub fn tagged_outliers(&self, mask: &OutlierMask) -> Vec<Outlier> {
        mask.outliers()
            .map(|mut outlier| {
                outlier.tag = self.group_name_at(outlier.x, outlier.y).map(str::to_owned);
                outlier
            })
            .collect()
    }

    pub fn into_groups(self) -> Vec<OutlierGroup> {
        self.groups
    }
}

pub mod group_extractor {
    use super::*;

    /// Labels, prunes, and merges the outliers in `mask`. Pixels of pruned groups are
    /// cleared from the mask.
    pub fn extract_groups(mask: &mut OutlierMask, config: &Config) -> GroupSet {
        if mask.is_empty() {
            return GroupSet::default();
        }

        // --- 1. Labeling ---
        let components = label(mask);

        // --- 2. Pruning ---
        let mut groups = Vec::with_capacity(components.len());
        for group in components {
            if group.size < config.min_group_size {
                for point in &group.members {
                    mask.clear(point.x, point.y);
                }
            } else {
                groups.push(group);
            }
        }

        // --- 3. Merging ---
        let groups = merge_until_stable(groups, config.group_merge_distance);

        // --- 4. Indexing ---
        GroupSet::new(groups)
    }

    fn label(mask: &OutlierMask) -> Vec<OutlierGroup> {
        let width = mask.width();
        let height = mask.height();
        let mut visited = vec![false; width as usize * height as usize];
        let mut components = Vec::new();

        for y in 0..height {
            for x in 0..width {
                let seed = y as usize * width as usize + x as usize;
                if visited[seed] || !mask.is_outlier(x, y) {
                    continue;
                }
                visited[seed] = true;

                let mut members = Vec::new();
                let mut total_excess = 0u64;
                let mut stack = vec![Point::new(x, y)];
                while let Some(current) = stack.pop() {
                    total_excess += u64::from(mask.excess(current.x, current.y));
                    members.push(current);

                    for dy in -1i64..=1 {
                        for dx in -1i64..=1 {
                            if dx == 0 && dy == 0 {
                                continue;
                            }
                            let nx = i64::from(current.x) + dx;
                            let ny = i64::from(current.y) + dy;
                            if nx < 0 || ny < 0 || nx >= i64::from(width) || ny >= i64::from(height) {
                                continue;
                            }
                            let (nx, ny) = (nx as u32, ny as u32);
                            let i = ny as usize * width as usize + nx as usize;
                            if !visited[i] && mask.is_outlier(nx, ny) {
                                visited[i] = true;
                                stack.push(Point::new(nx, ny));
                            }
                        }
                    }
                }

                let name = format!("group_{}", components.len());
                components.push(OutlierGroup::new(name, members, total_excess));
            }
        }
        components
    }

    fn merge_until_stable(mut groups: Vec<OutlierGroup>, merge_distance: i64) -> Vec<OutlierGroup> {
        loop {
            let pair = groups.iter().enumerate().find_map(|(i, a)| {
                groups[i + 1..]
                    .iter()
                    .position(|b| a.bounds.edge_distance(&b.bounds) <= merge_distance)
                    .map(|offset| (i, i + 1 + offset))
            });
            let Some((keep, absorb)) = pair else {
                return groups;
            };
            let absorbed = groups.remove(absorb);
            groups[keep].merge(absorbed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::group_extractor::extract_groups;
    use super::*;

    fn config(min_group_size: usize) -> Config {
        Config { min_group_size, ..Config::default() }
    }

    fn mask_with(width: u32, height: u32, points: &[(u32, u32)]) -> OutlierMask {
        let mut mask = OutlierMask::new(width, height);
        for (x, y) in points {
            mask.mark(*x, *y, 10);
        }
        mask
    }

    #[test]
    fn empty_mask_yields_no_groups() {
        let mut mask = OutlierMask::new(30, 30);
        assert!(extract_groups(&mut mask, &config(1)).is_empty());
    }

    #[test]
    fn diagonal_pixels_are_one_group() {
        let points: Vec<_> = (0..20).map(|i| (i, i)).collect();
        let mut mask = mask_with(20, 20, &points);
        let set = extract_groups(&mut mask, &config(1));
        assert_eq!(set.len(), 1);
        assert_eq!(set.groups[0].name, "group_0");
        assert_eq!(set.groups[0].size, 20);
        assert_eq!(set.group_name_at(7, 7), Some("group_0"));
        assert_eq!(set.group_name_at(7, 8), None);
        let tagged = set.tagged_outliers(&mask);
        assert_eq!(tagged.len(), 20);
        assert!(tagged.iter().all(|o| o.tag.as_deref() == Some("group_0")));
    }

    #[test]
    fn small_groups_are_pruned_from_the_mask() {
        let mut points: Vec<_> = (0..10).map(|x| (x, 0)).collect();
        points.push((25, 25));
        let mut mask = mask_with(30, 30, &points);
        let set = extract_groups(&mut mask, &config(5));
        assert_eq!(set.len(), 1);
        assert!(!mask.is_outlier(25, 25));
        assert!(mask.is_outlier(3, 0));
    }

    #[test]
    fn touching_boxes_merge_and_keep_first_name() {
        // Two L-shaped groups whose boxes touch without their pixels being adjacent.
        let points = [(0, 0), (1, 0), (2, 0), (0, 1), (4, 3), (4, 2), (3, 3)];
        let mut mask = mask_with(10, 10, &points);
        let set = extract_groups(&mut mask, &config(1));
        assert_eq!(set.len(), 1);
        assert_eq!(set.groups[0].name, "group_0");
        assert_eq!(set.groups[0].size, 7);
        assert_eq!(set.group_name_at(4, 3), Some("group_0"));
    }

    #[test]
    fn distant_groups_stay_apart() {
        let points = [(0, 0), (1, 1), (10, 10), (11, 11)];
        let mut mask = mask_with(20, 20, &points);
        let set = extract_groups(&mut mask, &config(1));
        let names: Vec<_> = set.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["group_0", "group_1"]);
        for group in &set.groups {
            assert!(group.bounds.area() >= group.size as u64);
        }
    }
}
