use cgmath::{EuclideanSpace, InnerSpace, Matrix, Matrix4, Point3, SquareMatrix, Vector3, Vector4};

use crate::EPSILON;

/// A plane in 3D space defined by a normal and distance from origin.
///
/// The plane equation is: normal · point + distance = 0
/// Points with negative signed distance are "inside" (on the normal's opposite side).
/// Convex volumes and clip vectors keep the inside half-space of each of their planes.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Plane {
    /// Unit normal pointing "outside" the half-space
    pub normal: Vector3<f64>,
    /// Signed distance from origin along the normal
    pub distance: f64,
}

impl Plane {
    /// Creates a new plane from a normal vector and a point on the plane.
    /// The normal will be normalized automatically.
    pub fn new(normal: Vector3<f64>, point: Point3<f64>) -> Self {
        let normal = normal.normalize();
        let distance = -normal.dot(point.to_vec());
        Self { normal, distance }
    }

    /// Creates a plane from the coefficients of the plane equation ax + by + cz + d = 0.
    /// The coefficients will be normalized so that (a, b, c) becomes a unit vector.
    pub fn from_coefficients(a: f64, b: f64, c: f64, d: f64) -> Self {
        let length = (a * a + b * b + c * c).sqrt();
        if length < EPSILON {
            // Degenerate plane, return a default
            return Self {
                normal: Vector3::new(0.0, 0.0, 1.0),
                distance: 0.0,
            };
        }
        Self {
            normal: Vector3::new(a / length, b / length, c / length),
            distance: d / length,
        }
    }

    /// Computes the signed distance from a point to the plane.
    ///
    /// - Positive: point is on the "outside" (same side as normal)
    /// - Zero: point is on the plane
    /// - Negative: point is on the "inside" (opposite side from normal)
    pub fn signed_distance(&self, point: Point3<f64>) -> f64 {
        self.normal.dot(point.to_vec()) + self.distance
    }

    /// Returns true if the point is on the inside (negative side) of the plane.
    pub fn contains_point(&self, point: Point3<f64>) -> bool {
        self.signed_distance(point) <= EPSILON
    }

    /// Transforms the plane by a 4x4 transformation matrix.
    ///
    /// Planes transform by the inverse-transpose of the point transform so that
    /// normals stay perpendicular under non-uniform scaling.
    pub fn transform(&self, matrix: &Matrix4<f64>) -> Self {
        let inv_transpose = matrix
            .invert()
            .unwrap_or(Matrix4::identity())
            .transpose();

        let plane_vec = Vector4::new(self.normal.x, self.normal.y, self.normal.z, self.distance);
        let transformed = inv_transpose * plane_vec;

        Self::from_coefficients(transformed.x, transformed.y, transformed.z, transformed.w)
    }

    /// Finds the intersection point of a line segment with the plane.
    /// Returns Some((t, point)) where t is the parameter (0 to 1) and point is the intersection.
    /// Returns None if the segment is parallel to the plane or doesn't intersect.
    pub fn intersect_segment(
        &self,
        start: Point3<f64>,
        end: Point3<f64>,
    ) -> Option<(f64, Point3<f64>)> {
        let direction = end - start;
        let denom = self.normal.dot(direction);

        if denom.abs() < EPSILON {
            return None;
        }

        let t = -(self.normal.dot(start.to_vec()) + self.distance) / denom;
        if !(0.0..=1.0).contains(&t) {
            return None;
        }

        Some((t, start + direction * t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Rad;

    #[test]
    fn test_plane_from_normal_and_point() {
        let plane = Plane::new(Vector3::new(0.0, 1.0, 0.0), Point3::new(0.0, 5.0, 0.0));

        assert!((plane.normal.magnitude() - 1.0).abs() < EPSILON);
        assert!(plane.signed_distance(Point3::new(10.0, 5.0, -3.0)).abs() < EPSILON);
        assert!(plane.signed_distance(Point3::new(0.0, 6.0, 0.0)) > 0.0);
        assert!(plane.signed_distance(Point3::new(0.0, 4.0, 0.0)) < 0.0);
    }

    #[test]
    fn test_plane_from_coefficients_normalizes() {
        // 2y - 10 = 0 is the plane y = 5
        let plane = Plane::from_coefficients(0.0, 2.0, 0.0, -10.0);

        assert!((plane.normal.magnitude() - 1.0).abs() < EPSILON);
        assert!(plane.signed_distance(Point3::new(0.0, 5.0, 0.0)).abs() < EPSILON);
    }

    #[test]
    fn test_plane_contains_point() {
        let plane = Plane::new(Vector3::new(0.0, 1.0, 0.0), Point3::origin());

        assert!(plane.contains_point(Point3::new(0.0, 0.0, 0.0)));
        assert!(plane.contains_point(Point3::new(5.0, -0.5, 3.0)));
        assert!(!plane.contains_point(Point3::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn test_plane_transform_translation() {
        let plane = Plane::new(Vector3::new(0.0, 1.0, 0.0), Point3::origin());
        let transformed = plane.transform(&Matrix4::from_translation(Vector3::new(0.0, 5.0, 0.0)));

        assert!((transformed.normal.y - 1.0).abs() < EPSILON);
        assert!(transformed.signed_distance(Point3::new(0.0, 5.0, 0.0)).abs() < EPSILON);
    }

    #[test]
    fn test_plane_transform_rotation() {
        let plane = Plane::new(Vector3::new(0.0, 1.0, 0.0), Point3::origin());
        let transformed = plane.transform(&Matrix4::from_angle_x(Rad(std::f64::consts::FRAC_PI_2)));

        assert!(transformed.normal.y.abs() < 1e-6);
        assert!((transformed.normal.z - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_plane_intersect_segment() {
        let plane = Plane::new(Vector3::new(0.0, 1.0, 0.0), Point3::origin());

        let (t, point) = plane
            .intersect_segment(Point3::new(0.0, -1.0, 0.0), Point3::new(0.0, 1.0, 0.0))
            .unwrap();
        assert!((t - 0.5).abs() < EPSILON);
        assert!(point.y.abs() < EPSILON);

        assert!(plane
            .intersect_segment(Point3::new(0.0, 1.0, 0.0), Point3::new(1.0, 1.0, 0.0))
            .is_none());
        assert!(plane
            .intersect_segment(Point3::new(0.0, 1.0, 0.0), Point3::new(0.0, 2.0, 0.0))
            .is_none());
    }
}
