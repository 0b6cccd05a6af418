//! Geometry primitives shared by the scene model and the tile engine.

mod aabb;
mod clip;
mod color;
mod convex_polyhedron;
mod plane;
pub mod transform_ops;

pub use aabb::Aabb;
pub use clip::ClipVector;
pub use color::RgbaColor;
pub use convex_polyhedron::{Containment, ConvexPolyhedron};
pub use plane::Plane;

/// Tolerance used for geometric comparisons.
pub const EPSILON: f64 = 1.0e-9;
