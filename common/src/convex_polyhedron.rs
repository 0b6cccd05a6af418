use cgmath::{Matrix4, Point3, Vector3};

use crate::{Aabb, Plane, EPSILON};

/// Result of classifying a volume against a convex region.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Containment {
    /// Entirely inside every plane.
    Inside,
    /// Straddles at least one plane.
    Partial,
    /// Entirely outside at least one plane.
    Outside,
}

/// A convex polyhedron defined as the intersection of half-spaces (planes).
///
/// A point is inside the polyhedron if it is on the "inside" (negative signed distance)
/// of all planes. View frusta and clip primitives both use this representation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexPolyhedron {
    planes: Vec<Plane>,
}

impl ConvexPolyhedron {
    /// Creates a new convex polyhedron from a list of planes.
    /// Each plane's normal should point "outward" from the volume.
    pub fn new(planes: Vec<Plane>) -> Self {
        Self { planes }
    }

    /// Returns the planes defining this polyhedron.
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Extracts 6 frustum planes from a view-projection matrix.
    ///
    /// Uses the Gribb/Hartmann method on an OpenGL-style projection (clip z in -w..w).
    /// The planes are ordered: Left, Right, Bottom, Top, Near, Far, with normals
    /// negated so they point outward.
    pub fn from_frustum(view_proj: &Matrix4<f64>) -> Self {
        // cgmath is column-major, so rows are gathered across columns
        let row = |r: usize| {
            (
                Vector3::new(view_proj[0][r], view_proj[1][r], view_proj[2][r]),
                view_proj[3][r],
            )
        };
        let (row0, w0) = row(0);
        let (row1, w1) = row(1);
        let (row2, w2) = row(2);
        let (row3, w3) = row(3);

        let outward = |v: Vector3<f64>, w: f64| Plane::from_coefficients(-v.x, -v.y, -v.z, -w);

        let planes = vec![
            outward(row3 + row0, w3 + w0),
            outward(row3 - row0, w3 - w0),
            outward(row3 + row1, w3 + w1),
            outward(row3 - row1, w3 - w1),
            outward(row3 + row2, w3 + w2),
            outward(row3 - row2, w3 - w2),
        ];

        Self { planes }
    }

    /// Creates a convex polyhedron from an axis-aligned bounding box.
    /// Results in 6 planes (one for each face of the box).
    pub fn from_aabb(aabb: &Aabb) -> Self {
        let planes = vec![
            Plane::new(Vector3::new(-1.0, 0.0, 0.0), Point3::new(aabb.min.x, 0.0, 0.0)),
            Plane::new(Vector3::new(1.0, 0.0, 0.0), Point3::new(aabb.max.x, 0.0, 0.0)),
            Plane::new(Vector3::new(0.0, -1.0, 0.0), Point3::new(0.0, aabb.min.y, 0.0)),
            Plane::new(Vector3::new(0.0, 1.0, 0.0), Point3::new(0.0, aabb.max.y, 0.0)),
            Plane::new(Vector3::new(0.0, 0.0, -1.0), Point3::new(0.0, 0.0, aabb.min.z)),
            Plane::new(Vector3::new(0.0, 0.0, 1.0), Point3::new(0.0, 0.0, aabb.max.z)),
        ];

        Self { planes }
    }

    /// Tests if a point is inside the polyhedron (on the inside of all planes).
    pub fn contains_point(&self, point: Point3<f64>) -> bool {
        self.planes.iter().all(|plane| plane.contains_point(point))
    }

    /// Classifies an AABB against the polyhedron.
    ///
    /// Conservative: a box reported `Partial` may in fact lie outside near a corner
    /// where two planes meet, but a box reported `Outside` never overlaps the volume.
    pub fn classify_aabb(&self, aabb: &Aabb) -> Containment {
        let corners = aabb.corners();
        let mut all_inside = true;

        for plane in &self.planes {
            let outside = corners
                .iter()
                .filter(|corner| plane.signed_distance(**corner) > EPSILON)
                .count();

            if outside == corners.len() {
                return Containment::Outside;
            }
            if outside > 0 {
                all_inside = false;
            }
        }

        if all_inside {
            Containment::Inside
        } else {
            Containment::Partial
        }
    }

    /// Tests if an AABB intersects with the polyhedron (broad-phase test).
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.classify_aabb(aabb) != Containment::Outside
    }

    /// Tests if an AABB is fully contained within the polyhedron.
    pub fn contains_aabb(&self, aabb: &Aabb) -> bool {
        self.classify_aabb(aabb) == Containment::Inside
    }

    /// Transforms every plane by the given point transform.
    pub fn transform(&self, matrix: &Matrix4<f64>) -> Self {
        Self {
            planes: self.planes.iter().map(|p| p.transform(matrix)).collect(),
        }
    }

    /// Clips a planar convex polygon against every plane (Sutherland-Hodgman).
    /// Returns the surviving vertices; fewer than 3 means nothing survived.
    pub fn clip_polygon(&self, polygon: &[Point3<f64>]) -> Vec<Point3<f64>> {
        let mut output: Vec<Point3<f64>> = polygon.to_vec();

        for plane in &self.planes {
            if output.is_empty() {
                break;
            }

            let input = std::mem::take(&mut output);
            for (i, current) in input.iter().enumerate() {
                let previous = input[(i + input.len() - 1) % input.len()];
                let current_in = plane.contains_point(*current);
                let previous_in = plane.contains_point(previous);

                if current_in != previous_in {
                    if let Some((_, point)) = plane.intersect_segment(previous, *current) {
                        output.push(point);
                    }
                }
                if current_in {
                    output.push(*current);
                }
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, EuclideanSpace, PerspectiveFov, Rad, SquareMatrix};

    fn create_unit_cube_polyhedron() -> ConvexPolyhedron {
        let aabb = Aabb::new(Point3::new(-0.5, -0.5, -0.5), Point3::new(0.5, 0.5, 0.5));
        ConvexPolyhedron::from_aabb(&aabb)
    }

    #[test]
    fn test_contains_point() {
        let poly = create_unit_cube_polyhedron();

        assert!(poly.contains_point(Point3::origin()));
        assert!(poly.contains_point(Point3::new(0.5, 0.0, 0.0)));
        assert!(!poly.contains_point(Point3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_classify_aabb() {
        let poly = create_unit_cube_polyhedron();

        let inside = Aabb::new(Point3::new(-0.1, -0.1, -0.1), Point3::new(0.1, 0.1, 0.1));
        let partial = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let outside = Aabb::new(Point3::new(2.0, 2.0, 2.0), Point3::new(3.0, 3.0, 3.0));

        assert_eq!(poly.classify_aabb(&inside), Containment::Inside);
        assert_eq!(poly.classify_aabb(&partial), Containment::Partial);
        assert_eq!(poly.classify_aabb(&outside), Containment::Outside);
        assert!(poly.intersects_aabb(&partial));
        assert!(!poly.contains_aabb(&partial));
    }

    #[test]
    fn test_transform_translation() {
        let poly = create_unit_cube_polyhedron();
        let transformed = poly.transform(&Matrix4::from_translation(Vector3::new(5.0, 0.0, 0.0)));

        assert!(!transformed.contains_point(Point3::origin()));
        assert!(transformed.contains_point(Point3::new(5.0, 0.0, 0.0)));
    }

    #[test]
    fn test_from_frustum_basic() {
        let fov: PerspectiveFov<f64> = PerspectiveFov {
            fovy: Rad::from(Deg(90.0)),
            aspect: 1.0,
            near: 0.1,
            far: 100.0,
        };
        let proj: Matrix4<f64> = fov.into();
        let frustum = ConvexPolyhedron::from_frustum(&(proj * Matrix4::identity()));

        assert_eq!(frustum.planes().len(), 6);
        assert!(frustum.contains_point(Point3::new(0.0, 0.0, -1.0)));
        assert!(!frustum.contains_point(Point3::new(0.0, 0.0, 1.0)));
        assert!(!frustum.contains_point(Point3::new(0.0, 0.0, -200.0)));
    }

    #[test]
    fn test_clip_polygon_half() {
        // Keep x <= 0.5
        let poly = ConvexPolyhedron::new(vec![Plane::new(
            Vector3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 0.0, 0.0),
        )]);
        let square = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];

        let clipped = poly.clip_polygon(&square);

        assert_eq!(clipped.len(), 4);
        assert!(clipped.iter().all(|p| p.x <= 0.5 + EPSILON));
        let range = Aabb::from_points(&clipped).unwrap();
        assert!((range.max.x - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_clip_polygon_fully_outside() {
        let poly = ConvexPolyhedron::new(vec![Plane::new(
            Vector3::new(1.0, 0.0, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
        )]);
        let triangle = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];

        assert!(poly.clip_polygon(&triangle).is_empty());
    }
}
