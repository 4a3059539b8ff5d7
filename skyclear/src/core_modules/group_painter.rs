//! Applies final decisions to a frame.
//!
//! Painting is all-or-nothing: both entry points build a fresh buffer and only hand
//! it back once every painted region has been written.

use tracing::debug;

use crate::core_modules::frame::PixelBuffer;
use crate::core_modules::outlier_group::OutlierGroup;
use crate::core_modules::paint_reason::PaintReason;
use crate::error::Result;

/// Returns a copy of `frame` in which every painted group's box, grown by `padding`
/// and clamped to the frame, is rebuilt from the per-channel minimum of `neighbors`.
///
/// With no neighbors there is nothing to rebuild from and the frame passes through.
pub fn paint_frame(
    frame_index: usize,
    frame: &PixelBuffer,
    neighbors: &[&PixelBuffer],
    groups: &[OutlierGroup],
    padding: u32,
) -> Result<PixelBuffer> {
    for neighbor in neighbors {
        frame.ensure_same_dimensions(neighbor, frame_index)?;
    }

    let mut output = frame.clone();
    if neighbors.is_empty() {
        return Ok(output);
    }

    let (width, height) = frame.dimensions();
    let mut painted = 0usize;
    for group in groups.iter().filter(|group| group.will_paint()) {
        let region = group.bounds.expanded(padding, width, height);
        for y in region.min.y..=region.max.y {
            for x in region.min.x..=region.max.x {
                let replacement = neighbors[1..]
                    .iter()
                    .fold(neighbors[0].pixel(x, y), |acc, neighbor| acc.channel_min(&neighbor.pixel(x, y)));
                output.set_pixel(x, y, replacement);
            }
        }
        painted += 1;
    }
    debug!(frame = frame_index, painted, "painted groups");
    Ok(output)
}

/// Returns a copy of `frame` in which the member pixels of every classified group are
/// drawn in the display color of its `PaintReason`.
pub fn test_paint_frame(frame: &PixelBuffer, groups: &[OutlierGroup]) -> PixelBuffer {
    let mut output = frame.clone();
    for group in groups {
        let Some(reason) = group.paint_reason() else {
            continue;
        };
        let color = reason.display_color().pixel();
        for point in &group.members {
            output.set_pixel(point.x, point.y, color);
        }
    }
    output
}

/// Count of groups per final reason name, in `PaintReason::ALL` order, plus unset.
pub fn decision_counts(groups: &[OutlierGroup]) -> Vec<(&'static str, usize)> {
    let mut counts: Vec<(&'static str, usize)> = PaintReason::ALL.iter().map(|reason| (reason.name(), 0)).collect();
    counts.push(("unset", 0));
    for group in groups {
        let name = group.paint_reason().map_or("unset", |reason| reason.name());
        if let Some(entry) = counts.iter_mut().find(|(n, _)| *n == name) {
            entry.1 += 1;
        }
    }
    counts
}
