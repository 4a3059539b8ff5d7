pub mod bounding_box;
pub mod classifier;
pub mod frame;
pub mod frame_cache;
pub mod group_extractor;
pub mod group_painter;
pub mod histogram;
pub mod hough;
pub mod outlier;
pub mod outlier_detector;
pub mod outlier_group;
pub mod paint_reason;
pub mod pixel;
pub mod progress;
pub mod streak_reconciler;
