//! Speed estimation module.
//!
//! Converts streams of per-identity world positions into km/h figures using
//! a bounded sliding window per identity:
//!
//! - `SpeedEstimator`: single-owner estimator (`&mut self` updates)
//! - `SharedSpeedEstimator`: `&self` updates guarded per identity
//! - `TrackHistory`: the bounded window and the distance/time arithmetic
//!
//! Distance is the straight line between the oldest and newest retained
//! positions, so curved paths read slower than they are.

mod estimator;
mod history;
mod shared;

pub use estimator::SpeedEstimator;
pub use history::{Sample, TrackHistory, TrackState, MPS_TO_KPH};
pub use shared::SharedSpeedEstimator;
