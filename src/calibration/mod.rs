//! Road-plane calibration module.
//!
//! Maps image-space pixel coordinates onto a metric ground plane. Supports:
//!
//! - Four-point homography estimation (normalized DLT) with degeneracy checks
//! - Forward (image -> world) and inverse (world -> image) point projection
//! - A `CoordinateTransformation` seam for alternative mappings

mod homography;
mod road;
mod transformations;

pub use homography::perspective_transform;
pub use road::RoadCalibration;
pub use transformations::{CoordinateTransformation, HomographyTransformation};
