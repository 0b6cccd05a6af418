use cgmath::{EuclideanSpace, InnerSpace, Matrix4, MetricSpace, Point3, Vector3};

use crate::common::{Aabb, ConvexPolyhedron};

/// A camera that defines the viewpoint and projection of a view.
///
/// Coordinates are `f64` world units. The projection follows the OpenGL
/// clip-space convention (depth in -w..w), which is what
/// [`ConvexPolyhedron::from_frustum`] expects.
///
/// # Example
///
/// ```
/// use cgmath::{Point3, Vector3};
/// use tileview::Camera;
///
/// let camera = Camera {
///     eye: Point3::new(0.0, 0.0, 5.0),
///     target: Point3::new(0.0, 0.0, 0.0),
///     up: Vector3::new(0.0, 1.0, 0.0),
///     aspect: 16.0 / 9.0,
///     fovy: 45.0,
///     znear: 0.1,
///     zfar: 100.0,
///     ortho: false,
/// };
/// assert!(camera.frustum().contains_point(Point3::new(0.0, 0.0, 0.0)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// The position of the camera in world space.
    pub eye: Point3<f64>,
    /// The point the camera is looking at in world space.
    pub target: Point3<f64>,
    pub up: Vector3<f64>,
    /// Width / height of the viewport.
    pub aspect: f64,
    /// Vertical field of view in degrees.
    pub fovy: f64,
    pub znear: f64,
    pub zfar: f64,
    /// When true, use orthographic projection. The orthographic extent is
    /// derived from the eye distance and `fovy` so zooming behaves the same
    /// in both modes.
    pub ortho: bool,
}

impl Camera {
    /// A top-down orthographic camera framing `bounds`, used for drawings,
    /// sheets and off-screen attachment renders.
    pub fn top_down(bounds: &Aabb, aspect: f64) -> Self {
        let mut camera = Self {
            eye: Point3::new(0.0, 0.0, 1.0),
            target: Point3::origin(),
            up: Vector3::unit_y(),
            aspect,
            fovy: 45.0,
            znear: 0.1,
            zfar: 100.0,
            ortho: true,
        };
        camera.fit_to_bounds(bounds);
        camera
    }

    pub fn view_matrix(&self) -> Matrix4<f64> {
        Matrix4::look_at_rh(self.eye, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Matrix4<f64> {
        if self.ortho {
            let (half_width, half_height) = self.ortho_half_extents();
            cgmath::ortho(-half_width, half_width, -half_height, half_height, self.znear, self.zfar)
        } else {
            cgmath::perspective(cgmath::Deg(self.fovy), self.aspect, self.znear, self.zfar)
        }
    }

    /// Combined world-to-clip matrix.
    pub fn view_projection_matrix(&self) -> Matrix4<f64> {
        self.projection_matrix() * self.view_matrix()
    }

    /// The six planes bounding what this camera sees, in world space.
    pub fn frustum(&self) -> ConvexPolyhedron {
        ConvexPolyhedron::from_frustum(&self.view_projection_matrix())
    }

    /// Describes how world units map to pixels for a viewport of the given height.
    pub fn viewing_space(&self, viewport_height: u32) -> ViewingSpace {
        let height = viewport_height.max(1) as f64;
        if self.ortho {
            let (_, half_height) = self.ortho_half_extents();
            ViewingSpace::Orthographic {
                pixel_size: 2.0 * half_height / height,
            }
        } else {
            ViewingSpace::Perspective {
                eye: self.eye,
                fovy: self.fovy.to_radians(),
                viewport_height: height,
            }
        }
    }

    fn ortho_half_extents(&self) -> (f64, f64) {
        let half_height = self.length() * (self.fovy.to_radians() / 2.0).tan();
        (half_height * self.aspect, half_height)
    }

    pub fn forward(&self) -> Vector3<f64> {
        (self.target - self.eye).normalize()
    }

    pub fn right(&self) -> Vector3<f64> {
        self.forward().cross(self.up).normalize()
    }

    /// Distance from the eye to the target.
    pub fn length(&self) -> f64 {
        self.eye.distance(self.target)
    }

    /// Moves the camera along its current view direction until `bounds` fits
    /// in view, and adjusts the clipping planes to enclose it.
    pub fn fit_to_bounds(&mut self, bounds: &Aabb) {
        let center = bounds.center();
        let bounding_radius = bounds.radius().max(1.0e-6);

        let half_fov = (self.fovy / 2.0).to_radians();
        let vertical_distance = bounding_radius / half_fov.sin();
        let half_hfov = (half_fov.tan() * self.aspect).atan();
        let horizontal_distance = bounding_radius / half_hfov.sin();
        let distance = vertical_distance.max(horizontal_distance);

        let view_dir = if self.eye.distance(self.target) < 1.0e-9 {
            Vector3::new(0.0, 0.0, -1.0)
        } else {
            (self.target - self.eye).normalize()
        };

        self.target = center;
        self.eye = center - view_dir * distance;
        self.znear = (distance * 0.001).max(0.001);
        self.zfar = (distance + bounding_radius) * 2.0;
    }

    /// Projects a world point to normalized device coordinates.
    pub fn project_point_ndc(&self, world_point: Point3<f64>) -> Point3<f64> {
        let homogeneous = self.view_projection_matrix() * world_point.to_homogeneous();
        Point3::from_homogeneous(homogeneous)
    }

    /// Projects a world point to pixel coordinates, y down.
    pub fn project_point_screen(&self, world_point: Point3<f64>, width: u32, height: u32) -> Point3<f64> {
        let ndc = self.project_point_ndc(world_point);
        Point3::new(
            (ndc.x + 1.0) * 0.5 * width as f64,
            (1.0 - ndc.y) * 0.5 * height as f64,
            ndc.z,
        )
    }
}

/// World-units-per-pixel model used by the screen-space error metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewingSpace {
    Perspective {
        eye: Point3<f64>,
        /// Vertical field of view in radians
        fovy: f64,
        viewport_height: f64,
    },
    Orthographic {
        pixel_size: f64,
    },
}

impl ViewingSpace {
    /// Size in world units of one pixel at `point`.
    pub fn pixel_size_at(&self, point: Point3<f64>) -> f64 {
        match *self {
            ViewingSpace::Perspective {
                eye,
                fovy,
                viewport_height,
            } => {
                let distance = eye.distance(point).max(1.0e-9);
                distance * 2.0 * (fovy / 2.0).tan() / viewport_height
            }
            ViewingSpace::Orthographic { pixel_size } => pixel_size,
        }
    }

    /// Approximate on-screen diameter in pixels of a range.
    pub fn projected_size(&self, range: &Aabb) -> f64 {
        let pixel_size = self.pixel_size_at(range.center());
        if pixel_size <= 0.0 {
            return f64::MAX;
        }
        range.radius() / pixel_size
    }

    /// The same view rendered at a different resolution.
    pub fn scaled(&self, factor: f64) -> Self {
        match *self {
            ViewingSpace::Perspective {
                eye,
                fovy,
                viewport_height,
            } => ViewingSpace::Perspective {
                eye,
                fovy,
                viewport_height: viewport_height * factor,
            },
            ViewingSpace::Orthographic { pixel_size } => ViewingSpace::Orthographic {
                pixel_size: pixel_size / factor,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::EPSILON;

    fn create_test_camera() -> Camera {
        Camera {
            eye: Point3::new(0.0, 0.0, 5.0),
            target: Point3::new(0.0, 0.0, 0.0),
            up: Vector3::new(0.0, 1.0, 0.0),
            aspect: 16.0 / 9.0,
            fovy: 45.0,
            znear: 0.1,
            zfar: 100.0,
            ortho: false,
        }
    }

    #[test]
    fn test_camera_forward_and_right() {
        let camera = create_test_camera();
        let forward = camera.forward();
        assert!((forward.z - -1.0).abs() < EPSILON);

        let right = camera.right();
        assert!(forward.dot(right).abs() < EPSILON);
        assert!((right.x - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_frustum_contains_target_not_behind_eye() {
        let camera = create_test_camera();
        let frustum = camera.frustum();

        assert!(frustum.contains_point(Point3::new(0.0, 0.0, 0.0)));
        assert!(!frustum.contains_point(Point3::new(0.0, 0.0, 10.0)));
    }

    #[test]
    fn test_project_target_to_screen_center() {
        let camera = create_test_camera();
        let screen = camera.project_point_screen(camera.target, 800, 600);

        assert!((screen.x - 400.0).abs() < 1.0e-6);
        assert!((screen.y - 300.0).abs() < 1.0e-6);
    }

    #[test]
    fn test_fit_to_bounds_keeps_bounds_in_frustum() {
        let mut camera = create_test_camera();
        let bounds = Aabb::new(Point3::new(100.0, 100.0, 0.0), Point3::new(200.0, 150.0, 10.0));
        camera.fit_to_bounds(&bounds);

        assert_eq!(camera.target, bounds.center());
        assert!(camera.frustum().contains_aabb(&bounds));
    }

    #[test]
    fn test_perspective_pixel_size_grows_with_distance() {
        let camera = create_test_camera();
        let viewing = camera.viewing_space(600);

        let near = viewing.pixel_size_at(Point3::new(0.0, 0.0, 4.0));
        let far = viewing.pixel_size_at(Point3::new(0.0, 0.0, -5.0));
        assert!((far / near - 10.0).abs() < 1.0e-6);

        let expected = 5.0 * 2.0 * (22.5f64).to_radians().tan() / 600.0;
        assert!((viewing.pixel_size_at(Point3::origin()) - expected).abs() < EPSILON);
    }

    #[test]
    fn test_orthographic_pixel_size_is_constant() {
        let bounds = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 0.0));
        let camera = Camera::top_down(&bounds, 1.0);
        let viewing = camera.viewing_space(100);

        let a = viewing.pixel_size_at(Point3::new(0.0, 0.0, 0.0));
        let b = viewing.pixel_size_at(Point3::new(10.0, 10.0, 0.0));
        assert!((a - b).abs() < EPSILON);
        assert!(camera.frustum().contains_aabb(&bounds));
    }

    #[test]
    fn test_scaled_viewing_space_halves_pixel_size() {
        let viewing = ViewingSpace::Orthographic { pixel_size: 2.0 };
        let scaled = viewing.scaled(2.0);
        assert!((scaled.pixel_size_at(Point3::origin()) - 1.0).abs() < EPSILON);
    }
}
