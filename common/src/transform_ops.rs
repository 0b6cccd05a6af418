//! Transform operations used by animation and attachment placement.
//!
//! Pure functions for pivot-based composition, rotation extraction, and
//! interpolation between transforms.

use cgmath::{
    EuclideanSpace, InnerSpace, Matrix3, Matrix4, Point3, Quaternion, Rotation, VectorSpace,
};

use crate::EPSILON;

// =============================================================================
// Pivot-Based Transforms
// =============================================================================

/// Rotates a position around a pivot point.
pub fn rotate_position_about_pivot(
    position: Point3<f64>,
    pivot: Point3<f64>,
    rotation: Quaternion<f64>,
) -> Point3<f64> {
    let offset = position - pivot;
    pivot + rotation.rotate_vector(offset)
}

/// Builds `post(position) * rotation * pre(-pivot)`.
///
/// The pivot is moved to the origin, rotated, then moved to `position`.
pub fn compose_pivot_transform(
    pivot: Point3<f64>,
    orientation: Quaternion<f64>,
    position: Point3<f64>,
) -> Matrix4<f64> {
    let pre = Matrix4::from_translation(-pivot.to_vec());
    let post = Matrix4::from_translation(position.to_vec());
    post * Matrix4::from(orientation) * pre
}

// =============================================================================
// Decomposition
// =============================================================================

/// The translation part of an affine transform.
pub fn origin_of(matrix: &Matrix4<f64>) -> Point3<f64> {
    Point3::new(matrix.w.x, matrix.w.y, matrix.w.z)
}

/// Extracts the rotation of an affine transform as a unit quaternion.
///
/// Columns are normalized first so uniform or axis scaling does not leak into
/// the rotation. A degenerate column yields the identity rotation.
pub fn rotation_from_matrix(matrix: &Matrix4<f64>) -> Quaternion<f64> {
    let x = matrix.x.truncate();
    let y = matrix.y.truncate();
    let z = matrix.z.truncate();

    if x.magnitude2() < EPSILON || y.magnitude2() < EPSILON || z.magnitude2() < EPSILON {
        return Quaternion::new(1.0, 0.0, 0.0, 0.0);
    }

    let rotation = Matrix3::from_cols(x.normalize(), y.normalize(), z.normalize());
    Quaternion::from(rotation).normalize()
}

// =============================================================================
// Interpolation
// =============================================================================

/// Linear interpolation between two points.
pub fn interpolate_point(a: Point3<f64>, b: Point3<f64>, fraction: f64) -> Point3<f64> {
    Point3::from_vec(a.to_vec().lerp(b.to_vec(), fraction))
}

/// Spherical interpolation between two orientations along the shorter arc.
pub fn interpolate_rotation(
    a: Quaternion<f64>,
    b: Quaternion<f64>,
    fraction: f64,
) -> Quaternion<f64> {
    a.normalize().slerp(b.normalize(), fraction).normalize()
}

/// Interpolates two full transforms by their rotation and origin only.
///
/// Used when keyframes do not carry a pivot/orientation/position decomposition.
/// Any scale or shear in the inputs is discarded.
pub fn interpolate_matrix(a: &Matrix4<f64>, b: &Matrix4<f64>, fraction: f64) -> Matrix4<f64> {
    let rotation = interpolate_rotation(rotation_from_matrix(a), rotation_from_matrix(b), fraction);
    let origin = interpolate_point(origin_of(a), origin_of(b), fraction);
    Matrix4::from_translation(origin.to_vec()) * Matrix4::from(rotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, Rotation3, Vector3};

    const TEST_EPSILON: f64 = 1e-9;

    fn transform_point(m: &Matrix4<f64>, p: Point3<f64>) -> Point3<f64> {
        Point3::from_homogeneous(m * p.to_homogeneous())
    }

    #[test]
    fn test_rotate_position_about_offset_pivot() {
        let result = rotate_position_about_pivot(
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Quaternion::from_angle_z(Deg(90.0)),
        );

        assert!((result.x - 1.0).abs() < TEST_EPSILON);
        assert!((result.y - 1.0).abs() < TEST_EPSILON);
    }

    #[test]
    fn test_compose_pivot_transform_maps_pivot_to_position() {
        let pivot = Point3::new(1.0, 2.0, 3.0);
        let position = Point3::new(10.0, 0.0, 0.0);
        let m = compose_pivot_transform(pivot, Quaternion::from_angle_z(Deg(90.0)), position);

        let mapped = transform_point(&m, pivot);
        assert!((mapped - position).magnitude() < TEST_EPSILON);

        // One unit along +X from the pivot rotates to +Y from the position
        let mapped = transform_point(&m, Point3::new(2.0, 2.0, 3.0));
        assert!((mapped - Point3::new(10.0, 1.0, 0.0)).magnitude() < TEST_EPSILON);
    }

    #[test]
    fn test_rotation_from_matrix_ignores_scale() {
        let q = Quaternion::from_angle_y(Deg(30.0));
        let m = Matrix4::from(q) * Matrix4::from_scale(4.0);

        let extracted = rotation_from_matrix(&m);
        assert!(extracted.dot(q).abs() > 1.0 - 1e-9);
    }

    #[test]
    fn test_interpolate_rotation_halfway() {
        let a = Quaternion::from_angle_z(Deg(0.0));
        let b = Quaternion::from_angle_z(Deg(90.0));
        let mid = interpolate_rotation(a, b, 0.5);

        let expected = Quaternion::from_angle_z(Deg(45.0));
        assert!(mid.dot(expected).abs() > 1.0 - 1e-9);
    }

    #[test]
    fn test_interpolate_matrix_blends_origin_and_rotation() {
        let a = Matrix4::from_translation(Vector3::new(0.0, 0.0, 0.0));
        let b = Matrix4::from_translation(Vector3::new(10.0, 0.0, 0.0))
            * Matrix4::from_angle_z(Deg(90.0));

        let mid = interpolate_matrix(&a, &b, 0.5);
        assert!((origin_of(&mid).x - 5.0).abs() < TEST_EPSILON);

        let rotated = transform_point(&mid, Point3::new(1.0, 0.0, 0.0)) - origin_of(&mid);
        let half = std::f64::consts::FRAC_1_SQRT_2;
        assert!((rotated.x - half).abs() < 1e-9);
        assert!((rotated.y - half).abs() < 1e-9);
    }
}
