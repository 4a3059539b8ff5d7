// THEORY:
// The `OutlierDetector` is the temporal analysis layer. Where a moving-camera video
// engine has to learn what "normal" looks like, a tripod timelapse already has the
// answer one frame away: the previous and next frames show the same sky.
//
// Key architectural principles:
// 1.  **Unanimous neighbors**: a pixel is an outlier only if it is brighter than *every*
//     available neighbor frame by more than the threshold. Something that shows up in
//     only one comparison (a streak that lingers into the next frame, a passing cloud
//     edge) is not transient enough to flag.
// 2.  **Excess, not distance**: the mask records how far past the threshold the pixel
//     went, using the smallest distance across neighbors. Downstream brightness scoring
//     works on that excess.
// 3.  **Hot loop hygiene**: this is the dominant cost of the whole pipeline. It walks
//     rows as slices and reads pixels straight out of them, with no per-pixel allocation.

use crate::core_modules::frame::PixelBuffer;
use crate::core_modules::outlier::OutlierMask;
use crate::core_modules::pixel::pixel::{Distance, Pixel};
use crate::error::Result;

/// Builds the outlier mask for `frame` by comparing it to each of `neighbors`.
///
/// With no neighbors there is nothing to compare against and the mask is empty.
pub fn detect_outliers(
    frame_index: usize,
    frame: &PixelBuffer,
    neighbors: &[&PixelBuffer],
    max_pixel_distance: u16,
) -> Result<OutlierMask> {
    for neighbor in neighbors {
        frame.ensure_same_dimensions(neighbor, frame_index)?;
    }

    let (width, height) = frame.dimensions();
    let mut mask = OutlierMask::new(width, height);
    if neighbors.is_empty() {
        return Ok(mask);
    }

    let threshold = Distance::from(max_pixel_distance);
    for y in 0..height {
        let row = frame.row(y);
        for (x, sample) in row.chunks_exact(3).enumerate() {
            let pixel = Pixel::new(sample[0], sample[1], sample[2]);
            let mut closest = Distance::MAX;
            for neighbor in neighbors {
                let other = &neighbor.row(y)[x * 3..x * 3 + 3];
                let distance = pixel.brightness_distance(&Pixel::new(other[0], other[1], other[2]));
                closest = closest.min(distance);
                if closest <= threshold {
                    break;
                }
            }
            if closest > threshold {
                mask.mark(x as u32, y, closest - threshold);
            }
        }
    }

    Ok(mask)
}
