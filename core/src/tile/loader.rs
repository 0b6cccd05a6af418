use crate::common::Aabb;
use crate::error::TileLoadError;
use crate::render::RenderSystem;
use crate::request::PendingResult;
use crate::scene::{Range3dProps, TileProps};

use super::tile::TileContent;

/// What a loader needs to know about the tile it is fetching.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRequestInfo {
    pub tree_id: String,
    pub content_id: String,
    pub range: Aabb,
    pub depth: u32,
}

/// Fetches and decodes tile content for one tile tree.
///
/// `request_content` may run on another thread; `read_content` always runs
/// on the frame thread because it creates graphics through the render system.
pub trait TileLoader {
    fn request_content(&self, tile: &TileRequestInfo) -> PendingResult<Result<Vec<u8>, TileLoadError>>;

    fn read_content(
        &self,
        data: &[u8],
        tile: &TileRequestInfo,
        system: &dyn RenderSystem,
    ) -> Result<TileContent, TileLoadError>;

    /// Props of a tile's children. `child_depth` is the depth of the children
    /// and `max_depth` the tree's depth limit.
    fn child_props(&self, parent: &TileProps, child_depth: u32, max_depth: u32) -> Vec<TileProps> {
        subdivide(parent, child_depth, max_depth)
    }
}

/// Splits `range` along every axis whose extent is at least half the largest
/// extent, yielding 2, 4 or 8 boxes ordered x fastest, then y, then z.
pub fn subdivide_range(range: &Aabb) -> Vec<Aabb> {
    let size = range.size();
    let max_extent = size.x.max(size.y).max(size.z);
    let split = |extent: f64| max_extent > 0.0 && extent >= max_extent * 0.5;
    let halves = |split: bool| if split { vec![(0.0, 0.5), (0.5, 1.0)] } else { vec![(0.0, 1.0)] };

    let xs = halves(split(size.x));
    let ys = halves(split(size.y));
    let zs = halves(split(size.z));

    let mut ranges = Vec::with_capacity(xs.len() * ys.len() * zs.len());
    for (z0, z1) in &zs {
        for (y0, y1) in &ys {
            for (x0, x1) in &xs {
                ranges.push(Aabb::new(
                    range.fraction_to_point(*x0, *y0, *z0),
                    range.fraction_to_point(*x1, *y1, *z1),
                ));
            }
        }
    }
    ranges
}

/// Default child props: the subdivided range, content ids suffixed with the
/// child index, leaves at `max_depth`.
pub fn subdivide(parent: &TileProps, child_depth: u32, max_depth: u32) -> Vec<TileProps> {
    subdivide_range(&parent.range.to_aabb())
        .into_iter()
        .enumerate()
        .map(|(i, range)| TileProps {
            content_id: format!("{}/{}", parent.content_id, i),
            range: Range3dProps::from_aabb(&range),
            content_range: None,
            maximum_size: parent.maximum_size,
            is_leaf: child_depth >= max_depth,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::EPSILON;
    use cgmath::Point3;

    fn props(low: [f64; 3], high: [f64; 3]) -> TileProps {
        TileProps {
            content_id: "0".to_string(),
            range: Range3dProps { low, high },
            content_range: None,
            maximum_size: 512.0,
            is_leaf: false,
        }
    }

    #[test]
    fn test_flat_range_splits_into_quadrants() {
        let range = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(100.0, 100.0, 1.0));
        let children = subdivide_range(&range);
        assert_eq!(children.len(), 4);

        assert!((children[0].max.x - 50.0).abs() < EPSILON);
        assert!((children[1].min.x - 50.0).abs() < EPSILON);
        assert!((children[2].min.y - 50.0).abs() < EPSILON);
        assert!((children[3].max.z - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_cube_splits_into_octants() {
        let range = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(8.0, 8.0, 8.0));
        assert_eq!(subdivide_range(&range).len(), 8);
    }

    #[test]
    fn test_long_range_splits_in_two() {
        let range = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(100.0, 10.0, 10.0));
        assert_eq!(subdivide_range(&range).len(), 2);
    }

    #[test]
    fn test_children_become_leaves_at_max_depth() {
        let parent = props([0.0, 0.0, 0.0], [10.0, 10.0, 0.0]);
        let children = subdivide(&parent, 1, 1);

        assert_eq!(children.len(), 4);
        assert!(children.iter().all(|c| c.is_leaf));
        assert_eq!(children[3].content_id, "0/3");

        let deeper = subdivide(&parent, 1, 3);
        assert!(deeper.iter().all(|c| !c.is_leaf));
    }
}
