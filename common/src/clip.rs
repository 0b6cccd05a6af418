use cgmath::{Matrix4, Point3, Vector3};

use crate::{Aabb, Containment, ConvexPolyhedron, Plane};

/// A clip volume: the intersection of one or more convex clip primitives.
///
/// A point is visible when it lies inside every primitive. Composing two clip
/// vectors therefore just concatenates their primitives.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClipVector {
    primitives: Vec<ConvexPolyhedron>,
}

impl ClipVector {
    pub fn new(primitives: Vec<ConvexPolyhedron>) -> Self {
        Self { primitives }
    }

    /// A clip that hides everything on the side `direction` points to, keeping the
    /// half-space behind the plane through `position`.
    pub fn from_plane(position: Point3<f64>, direction: Vector3<f64>) -> Self {
        Self::new(vec![ConvexPolyhedron::new(vec![Plane::new(direction, position)])])
    }

    pub fn primitives(&self) -> &[ConvexPolyhedron] {
        &self.primitives
    }

    /// True when there is nothing to clip against.
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    /// Returns a clip that keeps only what both clips keep.
    pub fn intersect(&self, other: &ClipVector) -> ClipVector {
        let mut primitives = self.primitives.clone();
        primitives.extend(other.primitives.iter().cloned());
        Self { primitives }
    }

    /// Transforms every primitive into another coordinate space.
    pub fn transform(&self, matrix: &Matrix4<f64>) -> ClipVector {
        Self {
            primitives: self.primitives.iter().map(|p| p.transform(matrix)).collect(),
        }
    }

    pub fn contains_point(&self, point: Point3<f64>) -> bool {
        self.primitives.iter().all(|p| p.contains_point(point))
    }

    /// Classifies a box against the whole clip; `Outside` if any primitive rejects it.
    pub fn classify_aabb(&self, aabb: &Aabb) -> Containment {
        let mut result = Containment::Inside;
        for primitive in &self.primitives {
            match primitive.classify_aabb(aabb) {
                Containment::Outside => return Containment::Outside,
                Containment::Partial => result = Containment::Partial,
                Containment::Inside => {}
            }
        }
        result
    }

    /// Clips a planar convex polygon by every primitive in turn.
    pub fn clip_polygon(&self, polygon: &[Point3<f64>]) -> Vec<Point3<f64>> {
        self.primitives
            .iter()
            .fold(polygon.to_vec(), |points, primitive| primitive.clip_polygon(&points))
    }
}
