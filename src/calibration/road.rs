//! Road-plane calibration from four image corners and known road dimensions.

use log::debug;
use nalgebra::{DMatrix, Matrix3, Point2};

use super::homography::perspective_transform;
use super::transformations::{CoordinateTransformation, HomographyTransformation};
use crate::utils::validate_points;
use crate::{Error, Result};

/// Immutable mapping between the camera image and the road plane.
///
/// The four `corners` are given in image pixels in the winding order
/// top-left, top-right, bottom-right, bottom-left, where "width" runs from the
/// first to the second corner and "length" from the first to the fourth.
/// They are mapped onto the metre grid
/// `(0, 0), (width_m - 1, 0), (width_m - 1, length_m - 1), (0, length_m - 1)`;
/// the `- 1` places the corners on metre cells rather than rectangle edges.
#[derive(Debug, Clone)]
pub struct RoadCalibration {
    corners: [Point2<f64>; 4],
    width_m: f64,
    length_m: f64,
    transform: HomographyTransformation,
}

impl RoadCalibration {
    /// Build a calibration from four `[x, y]` image corners and the road size in metres.
    ///
    /// # Errors
    /// - `Error::InvalidConfig` if a dimension is not strictly positive or a value is not finite
    /// - `Error::DegenerateGeometry` if the corners (or the target rectangle) do not admit
    ///   a well-conditioned homography
    pub fn new(corners: [[f64; 2]; 4], width_m: f64, length_m: f64) -> Result<Self> {
        Self::from_points(corners.map(|c| Point2::new(c[0], c[1])), width_m, length_m)
    }

    /// Build a calibration from a slice of corners, checking that exactly four are given.
    pub fn from_slice(corners: &[[f64; 2]], width_m: f64, length_m: f64) -> Result<Self> {
        let corners: [[f64; 2]; 4] = corners.try_into().map_err(|_| {
            Error::InvalidConfig(format!(
                "calibration needs exactly 4 corners, got {}",
                corners.len()
            ))
        })?;
        Self::new(corners, width_m, length_m)
    }

    /// Build a calibration from four image points.
    pub fn from_points(corners: [Point2<f64>; 4], width_m: f64, length_m: f64) -> Result<Self> {
        if !(width_m.is_finite() && width_m > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "road width must be positive, got {}",
                width_m
            )));
        }
        if !(length_m.is_finite() && length_m > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "road length must be positive, got {}",
                length_m
            )));
        }
        if corners.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(Error::InvalidConfig(
                "calibration corners must be finite".to_string(),
            ));
        }

        let target = Self::target_rectangle(width_m, length_m);
        let matrix = perspective_transform(&corners, &target)?;
        let transform = HomographyTransformation::new(matrix)?;

        debug!(
            "road calibration built: {}m x {}m, corners {:?}",
            width_m, length_m, corners
        );

        Ok(Self {
            corners,
            width_m,
            length_m,
            transform,
        })
    }

    /// World-space rectangle the corners are mapped onto.
    pub fn target_rectangle(width_m: f64, length_m: f64) -> [Point2<f64>; 4] {
        [
            Point2::new(0.0, 0.0),
            Point2::new(width_m - 1.0, 0.0),
            Point2::new(width_m - 1.0, length_m - 1.0),
            Point2::new(0.0, length_m - 1.0),
        ]
    }

    pub fn corners(&self) -> &[Point2<f64>; 4] {
        &self.corners
    }

    pub fn width_m(&self) -> f64 {
        self.width_m
    }

    pub fn length_m(&self) -> f64 {
        self.length_m
    }

    /// The image -> world homography.
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.transform.homography_matrix
    }

    /// The underlying transformation, usable through the `CoordinateTransformation` seam.
    pub fn transformation(&self) -> &HomographyTransformation {
        &self.transform
    }

    /// Project an `n x 2` matrix of image points onto the road plane.
    ///
    /// An empty input (zero rows) is returned as an empty `0 x 2` matrix without
    /// touching the transform. Output rows keep the input order.
    ///
    /// # Errors
    /// `Error::InvalidPointsShape` if a non-empty input does not have 2 columns.
    pub fn project(&self, points: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        if points.nrows() == 0 {
            return Ok(DMatrix::zeros(0, 2));
        }
        let points = validate_points(points)?;
        Ok(self.transform.image_to_world(&points))
    }

    /// Map road-plane points (metres) back into the image.
    pub fn unproject(&self, points: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        if points.nrows() == 0 {
            return Ok(DMatrix::zeros(0, 2));
        }
        let points = validate_points(points)?;
        Ok(self.transform.world_to_image(&points))
    }

    /// Project a single image point onto the road plane.
    pub fn project_point(&self, point: Point2<f64>) -> Point2<f64> {
        HomographyTransformation::apply(&self.transform.homography_matrix, &point)
    }

    /// Map a single road-plane point back into the image.
    pub fn unproject_point(&self, point: Point2<f64>) -> Point2<f64> {
        HomographyTransformation::apply(&self.transform.inverse_homography_matrix, &point)
    }
}
