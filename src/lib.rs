//! # roadspeed - Vehicle Speed Estimation
//!
//! Estimates per-vehicle ground speed from a fixed monocular camera.
//!
//! Tracked image-space anchor points are projected onto a calibrated road plane
//! (a homography built from four road corners and the road's physical size) and
//! the displacement across a sliding window of recent positions is converted
//! into km/h.
//!
//! ## Features
//!
//! - Four-point road calibration with degenerate geometry rejection
//! - Image <-> world projection of point sets
//! - Per-identity sliding window speed estimation
//! - Thread-safe estimator for pipelines that parallelize across identities
//! - Region-of-interest and class filtering glue for tracker output
//!
//! ## Example
//!
//! ```rust,ignore
//! use roadspeed::{RoadCalibration, SpeedEstimator};
//! use nalgebra::Point2;
//!
//! let corners = [[1252.0, 787.0], [2298.0, 803.0], [5039.0, 2159.0], [-550.0, 2159.0]];
//! let calibration = RoadCalibration::new(corners, 25.0, 250.0).unwrap();
//! let mut estimator = SpeedEstimator::new(30).unwrap();
//!
//! let world = calibration.project_point(Point2::new(1800.0, 1200.0));
//! let speed_kph = estimator.update(7, world);
//! ```

// Public modules
pub mod calibration;
pub mod speed;
pub mod detection;
pub mod zone;
pub mod pipeline;
pub mod config;
pub mod utils;

// Re-exports for convenience
pub use calibration::{CoordinateTransformation, HomographyTransformation, RoadCalibration};
pub use speed::{SharedSpeedEstimator, SpeedEstimator, TrackHistory, TrackState};
pub use detection::{Anchor, TrackedDetection};
pub use zone::PolygonZone;
pub use pipeline::{FrameSpeeds, SpeedPipeline, VehicleSpeed};
pub use config::SpeedConfig;

// Error types
pub use crate::error::{Error, Result};

mod error {
    use thiserror::Error;

    /// Errors that can occur while calibrating or estimating speeds
    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("Invalid points shape: expected {expected}, got {got}")]
        InvalidPointsShape { expected: String, got: String },

        #[error("Degenerate geometry: {0}")]
        DegenerateGeometry(String),

        #[error("Config parse error: {0}")]
        ConfigParse(String),

        #[error("IO error: {0}")]
        IoError(#[from] std::io::Error),
    }

    /// Result type for roadspeed operations
    pub type Result<T> = std::result::Result<T, Error>;
}
