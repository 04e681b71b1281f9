//! Coordinate transformation implementations.

use nalgebra::{DMatrix, Matrix3, Point2};

use crate::utils::warn_once;
use crate::{Error, Result};

/// Denominators closer to zero than this are treated as the horizon line.
const HORIZON_EPSILON: f64 = 0.0000001;

/// Trait for transforming between image and world coordinates.
///
/// Point sets are `n_points x 2` matrices. Coordinates can be interpreted in 2 references:
/// - Image: pixel position on the camera frame, (0, 0) is top left
/// - World: position on the road plane in metres, (0, 0) is the first calibration corner
pub trait CoordinateTransformation: Send + Sync + std::fmt::Debug {
    /// Transform points from image (pixel) to world (metre) coordinates.
    fn image_to_world(&self, points: &DMatrix<f64>) -> DMatrix<f64>;

    /// Transform points from world (metre) to image (pixel) coordinates.
    fn world_to_image(&self, points: &DMatrix<f64>) -> DMatrix<f64>;

    /// Clone this transformation into a boxed trait object.
    fn clone_box(&self) -> Box<dyn CoordinateTransformation>;
}

impl Clone for Box<dyn CoordinateTransformation> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Full perspective transformation using a 3x3 homography matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct HomographyTransformation {
    /// 3x3 image -> world matrix.
    pub homography_matrix: Matrix3<f64>,
    /// Pre-computed inverse (world -> image).
    pub inverse_homography_matrix: Matrix3<f64>,
}

impl HomographyTransformation {
    /// Create a new homography transformation with the given 3x3 matrix.
    pub fn new(homography_matrix: Matrix3<f64>) -> Result<Self> {
        if homography_matrix.iter().any(|v| !v.is_finite()) {
            return Err(Error::DegenerateGeometry(
                "homography matrix contains non-finite values".to_string(),
            ));
        }

        let inverse = homography_matrix
            .try_inverse()
            .ok_or_else(|| Error::DegenerateGeometry("cannot invert homography matrix".to_string()))?;

        Ok(Self {
            homography_matrix,
            inverse_homography_matrix: inverse,
        })
    }

    /// Apply a 3x3 matrix to a single point, including the perspective division.
    pub(crate) fn apply(transform_matrix: &Matrix3<f64>, point: &Point2<f64>) -> Point2<f64> {
        let x = point.x;
        let y = point.y;

        // [x', y', w'] = H * [x, y, 1]^T
        let x_prime = transform_matrix[(0, 0)] * x + transform_matrix[(0, 1)] * y + transform_matrix[(0, 2)];
        let y_prime = transform_matrix[(1, 0)] * x + transform_matrix[(1, 1)] * y + transform_matrix[(1, 2)];
        let w_prime = transform_matrix[(2, 0)] * x + transform_matrix[(2, 1)] * y + transform_matrix[(2, 2)];

        let w = if w_prime.abs() < HORIZON_EPSILON {
            warn_once("projected point lies on the horizon line; result is unbounded");
            HORIZON_EPSILON.copysign(w_prime)
        } else {
            w_prime
        };

        Point2::new(x_prime / w, y_prime / w)
    }

    /// Apply homography transformation to an `n x 2` point matrix.
    fn transform_points(&self, points: &DMatrix<f64>, transform_matrix: &Matrix3<f64>) -> DMatrix<f64> {
        if points.ncols() != 2 {
            return points.clone();
        }

        let rows = points.nrows();
        let mut result = DMatrix::zeros(rows, 2);

        for i in 0..rows {
            let projected = Self::apply(transform_matrix, &Point2::new(points[(i, 0)], points[(i, 1)]));
            result[(i, 0)] = projected.x;
            result[(i, 1)] = projected.y;
        }

        result
    }
}

impl CoordinateTransformation for HomographyTransformation {
    fn image_to_world(&self, points: &DMatrix<f64>) -> DMatrix<f64> {
        self.transform_points(points, &self.homography_matrix)
    }

    fn world_to_image(&self, points: &DMatrix<f64>) -> DMatrix<f64> {
        self.transform_points(points, &self.inverse_homography_matrix)
    }

    fn clone_box(&self) -> Box<dyn CoordinateTransformation> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_homography() {
        let transform = HomographyTransformation::new(Matrix3::identity()).unwrap();
        let points = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);

        assert_eq!(transform.image_to_world(&points), points);
        assert_eq!(transform.world_to_image(&points), points);
    }

    #[test]
    fn test_scale_and_translate() {
        // x' = 2x + 10, y' = 3y - 5
        let h = Matrix3::new(2.0, 0.0, 10.0, 0.0, 3.0, -5.0, 0.0, 0.0, 1.0);
        let transform = HomographyTransformation::new(h).unwrap();
        let points = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, -4.0, 0.0]);

        let world = transform.image_to_world(&points);
        assert_relative_eq!(world[(0, 0)], 12.0, epsilon = 1e-10);
        assert_relative_eq!(world[(0, 1)], 1.0, epsilon = 1e-10);
        assert_relative_eq!(world[(1, 0)], 2.0, epsilon = 1e-10);
        assert_relative_eq!(world[(1, 1)], -5.0, epsilon = 1e-10);
    }

    #[test]
    fn test_perspective_roundtrip() {
        let h = Matrix3::new(1.2, 0.1, -30.0, 0.05, 0.9, 12.0, 0.0004, 0.0002, 1.0);
        let transform = HomographyTransformation::new(h).unwrap();
        let points = DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 100.0, 50.0, 640.0, 480.0]);

        let world = transform.image_to_world(&points);
        let back = transform.world_to_image(&world);

        for i in 0..points.nrows() {
            for j in 0..points.ncols() {
                assert_relative_eq!(back[(i, j)], points[(i, j)], epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn test_singular_matrix_rejected() {
        let h = Matrix3::new(1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 0.0, 0.0, 1.0);
        let result = HomographyTransformation::new(h);
        assert!(matches!(result, Err(Error::DegenerateGeometry(_))));
    }

    #[test]
    fn test_non_finite_matrix_rejected() {
        let h = Matrix3::new(f64::NAN, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        assert!(HomographyTransformation::new(h).is_err());
    }

    #[test]
    fn test_wrong_column_count_passthrough() {
        let transform = HomographyTransformation::new(Matrix3::identity() * 2.0).unwrap();
        let points = DMatrix::from_row_slice(1, 3, &[1.0, 2.0, 3.0]);
        assert_eq!(transform.image_to_world(&points), points);
    }

    #[test]
    fn test_boxed_clone() {
        let transform: Box<dyn CoordinateTransformation> =
            Box::new(HomographyTransformation::new(Matrix3::identity()).unwrap());
        let cloned = transform.clone();
        let points = DMatrix::from_row_slice(1, 2, &[5.0, 6.0]);
        assert_eq!(cloned.image_to_world(&points), points);
    }
}
