//! Static startup configuration.
//!
//! ```toml
//! road_polygon = [[1252.0, 787.0], [2298.0, 803.0], [5039.0, 2159.0], [-550.0, 2159.0]]
//! road_width_m = 25.0
//! road_length_m = 250.0
//! fps = 30
//! vehicle_classes = [2, 3, 5, 7]
//! anchor = "bottom_center"
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::calibration::RoadCalibration;
use crate::detection::Anchor;
use crate::pipeline::SpeedPipeline;
use crate::speed::SpeedEstimator;
use crate::zone::PolygonZone;
use crate::{Error, Result};

fn default_road_width_m() -> f64 {
    25.0
}

fn default_road_length_m() -> f64 {
    250.0
}

fn default_fps() -> u32 {
    30
}

/// COCO car, motorcycle, bus, truck.
fn default_vehicle_classes() -> Vec<i32> {
    vec![2, 3, 5, 7]
}

fn default_true() -> bool {
    true
}

/// Calibration and estimation settings supplied once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedConfig {
    /// Road corners in image pixels: top-left, top-right, bottom-right, bottom-left.
    pub road_polygon: Vec<[f64; 2]>,

    #[serde(default = "default_road_width_m")]
    pub road_width_m: f64,

    #[serde(default = "default_road_length_m")]
    pub road_length_m: f64,

    /// Nominal video frame rate; also the speed window capacity.
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Class ids kept by the pipeline; empty keeps all.
    #[serde(default = "default_vehicle_classes")]
    pub vehicle_classes: Vec<i32>,

    #[serde(default)]
    pub anchor: Anchor,

    /// Also use the road polygon as the region-of-interest filter.
    #[serde(default = "default_true")]
    pub filter_to_road: bool,

    /// Cap on retained track histories; unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tracks: Option<usize>,
}

impl SpeedConfig {
    /// Config with default dimensions for the given road corners.
    pub fn new(road_polygon: Vec<[f64; 2]>) -> Self {
        Self {
            road_polygon,
            road_width_m: default_road_width_m(),
            road_length_m: default_road_length_m(),
            fps: default_fps(),
            vehicle_classes: default_vehicle_classes(),
            anchor: Anchor::default(),
            filter_to_road: true,
            max_tracks: None,
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let content = fs::read_to_string(&path).map_err(|e| {
            Error::IoError(std::io::Error::new(
                e.kind(),
                format!("failed to read config file '{}': {}", path_str, e),
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Reject malformed values without building anything.
    pub fn validate(&self) -> Result<()> {
        if self.road_polygon.len() != 4 {
            return Err(Error::InvalidConfig(format!(
                "road_polygon needs exactly 4 corners, got {}",
                self.road_polygon.len()
            )));
        }
        if !(self.road_width_m.is_finite() && self.road_width_m > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "road_width_m must be positive, got {}",
                self.road_width_m
            )));
        }
        if !(self.road_length_m.is_finite() && self.road_length_m > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "road_length_m must be positive, got {}",
                self.road_length_m
            )));
        }
        if self.fps == 0 {
            return Err(Error::InvalidConfig("fps must be positive".to_string()));
        }
        if self.max_tracks == Some(0) {
            return Err(Error::InvalidConfig("max_tracks must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn calibration(&self) -> Result<RoadCalibration> {
        self.validate()?;
        RoadCalibration::from_slice(&self.road_polygon, self.road_width_m, self.road_length_m)
    }

    pub fn estimator(&self) -> Result<SpeedEstimator<i64>> {
        self.validate()?;
        let estimator = SpeedEstimator::new(self.fps)?;
        match self.max_tracks {
            Some(max_tracks) => estimator.with_max_tracks(max_tracks),
            None => Ok(estimator),
        }
    }

    /// Build the full pipeline; fails before any frame if the calibration is unusable.
    pub fn pipeline(&self) -> Result<SpeedPipeline> {
        let calibration = Arc::new(self.calibration()?);
        let mut pipeline = SpeedPipeline::new(calibration, self.estimator()?)
            .with_vehicle_classes(self.vehicle_classes.clone())
            .with_anchor(self.anchor);

        if self.filter_to_road {
            pipeline = pipeline.with_zone(PolygonZone::from_coords(&self.road_polygon, self.anchor)?);
        }

        Ok(pipeline)
    }
}
