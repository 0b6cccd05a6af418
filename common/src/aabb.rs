use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, Vector3};

/// An axis-aligned bounding box (a "range") in 3D space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    /// Creates a new AABB from min and max points.
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Creates an AABB that encompasses all the given points.
    /// Returns None if the points slice is empty.
    pub fn from_points(points: &[Point3<f64>]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut aabb = Self::new(*first, *first);
        for point in rest {
            aabb = aabb.expand(*point);
        }
        Some(aabb)
    }

    /// Returns the 8 corner points of the AABB.
    pub fn corners(&self) -> [Point3<f64>; 8] {
        [
            Point3::new(self.min.x, self.min.y, self.min.z),
            Point3::new(self.max.x, self.min.y, self.min.z),
            Point3::new(self.min.x, self.max.y, self.min.z),
            Point3::new(self.max.x, self.max.y, self.min.z),
            Point3::new(self.min.x, self.min.y, self.max.z),
            Point3::new(self.max.x, self.min.y, self.max.z),
            Point3::new(self.min.x, self.max.y, self.max.z),
            Point3::new(self.max.x, self.max.y, self.max.z),
        ]
    }

    /// Transforms the AABB by the given 4x4 transformation matrix.
    /// Transforms all 8 corners and returns their axis-aligned bounds.
    pub fn transform(&self, matrix: &Matrix4<f64>) -> Self {
        let corners = self.corners();
        let first = Point3::from_homogeneous(matrix * corners[0].to_homogeneous());
        corners[1..].iter().fold(Self::new(first, first), |aabb, corner| {
            aabb.expand(Point3::from_homogeneous(matrix * corner.to_homogeneous()))
        })
    }

    /// Expands the AABB to include the given point.
    pub fn expand(&self, point: Point3<f64>) -> Self {
        Self {
            min: Point3::new(
                self.min.x.min(point.x),
                self.min.y.min(point.y),
                self.min.z.min(point.z),
            ),
            max: Point3::new(
                self.max.x.max(point.x),
                self.max.y.max(point.y),
                self.max.z.max(point.z),
            ),
        }
    }

    /// Returns the smallest AABB containing both boxes.
    pub fn merge(&self, other: &Aabb) -> Self {
        self.expand(other.min).expand(other.max)
    }

    pub fn center(&self) -> Point3<f64> {
        self.min.midpoint(self.max)
    }

    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Length of the diagonal from min to max.
    pub fn diagonal(&self) -> f64 {
        self.size().magnitude()
    }

    /// Radius of the sphere that bounds this box.
    pub fn radius(&self) -> f64 {
        self.diagonal() * 0.5
    }

    /// True if any extent is negative.
    pub fn is_null(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Tests if a point is inside or on the boundary of this AABB.
    pub fn contains_point(&self, point: Point3<f64>) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Tests if this AABB overlaps another (touching counts as overlapping).
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Returns the point at fractional coordinates (0..1 on each axis) within the box.
    pub fn fraction_to_point(&self, fx: f64, fy: f64, fz: f64) -> Point3<f64> {
        let size = self.size();
        Point3::new(
            self.min.x + size.x * fx,
            self.min.y + size.y * fy,
            self.min.z + size.z * fz,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EPSILON;

    fn unit() -> Aabb {
        Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_from_points() {
        let points = [
            Point3::new(1.0, -2.0, 3.0),
            Point3::new(-1.0, 4.0, 0.0),
            Point3::new(0.5, 0.0, 5.0),
        ];
        let aabb = Aabb::from_points(&points).unwrap();

        assert_eq!(aabb.min, Point3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, Point3::new(1.0, 4.0, 5.0));
        assert!(Aabb::from_points(&[]).is_none());
    }

    #[test]
    fn test_transform_translation() {
        let moved = unit().transform(&Matrix4::from_translation(Vector3::new(10.0, 0.0, -1.0)));

        assert!((moved.min.x - 10.0).abs() < EPSILON);
        assert!((moved.max.x - 11.0).abs() < EPSILON);
        assert!((moved.min.z + 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_transform_rotation_grows_bounds() {
        let rotated = unit().transform(&Matrix4::from_angle_z(cgmath::Deg(45.0)));
        let expected = 2.0_f64.sqrt();

        assert!((rotated.size().x - expected).abs() < 1e-6);
        assert!((rotated.size().y - expected).abs() < 1e-6);
    }

    #[test]
    fn test_center_and_radius() {
        let aabb = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 2.0, 0.0));

        assert_eq!(aabb.center(), Point3::new(1.0, 1.0, 0.0));
        assert!((aabb.radius() - 2.0_f64.sqrt()).abs() < EPSILON);
    }

    #[test]
    fn test_intersects_and_contains() {
        let a = unit();
        let b = Aabb::new(Point3::new(0.5, 0.5, 0.5), Point3::new(2.0, 2.0, 2.0));
        let c = Aabb::new(Point3::new(3.0, 3.0, 3.0), Point3::new(4.0, 4.0, 4.0));

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.contains_point(Point3::new(1.0, 0.0, 0.5)));
        assert!(!a.contains_point(Point3::new(1.5, 0.0, 0.5)));
        assert_eq!(a.merge(&c).max, Point3::new(4.0, 4.0, 4.0));
    }

    #[test]
    fn test_is_null() {
        assert!(!unit().is_null());
        assert!(Aabb::new(Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 1.0)).is_null());
    }
}
