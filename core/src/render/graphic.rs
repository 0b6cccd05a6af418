use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cgmath::{Matrix4, Point3, SquareMatrix};

use crate::common::{Aabb, ClipVector};
use crate::scene::{FeatureOverrides, FeatureTable, ModelId, ViewFlagOverrides};

/// Opaque handle to a resource owned by the render system.
///
/// The engine never looks inside; a [`RenderSystem`](super::RenderSystem)
/// implementation downcasts to its own type.
#[derive(Clone)]
pub struct GpuHandle(Arc<dyn Any + Send + Sync>);

impl GpuHandle {
    pub fn new<T: Any + Send + Sync>(resource: T) -> Self {
        Self(Arc::new(resource))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &GpuHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for GpuHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GpuHandle(..)")
    }
}

/// A drawable leaf: geometry the render system has already uploaded.
#[derive(Debug, Clone)]
pub struct GraphicPrimitive {
    pub handle: GpuHandle,
    pub range: Aabb,
}

/// A node of the graphic tree handed to the renderer each frame.
#[derive(Debug, Clone)]
pub enum RenderGraphic {
    Primitive(GraphicPrimitive),
    List(Vec<RenderGraphic>),
    Branch(Box<GraphicBranch>),
    Batch(Box<Batch>),
}

impl RenderGraphic {
    pub fn primitive(handle: GpuHandle, range: Aabb) -> Self {
        RenderGraphic::Primitive(GraphicPrimitive { handle, range })
    }

    pub fn branch(branch: GraphicBranch) -> Self {
        RenderGraphic::Branch(Box::new(branch))
    }

    pub fn batch(batch: Batch) -> Self {
        RenderGraphic::Batch(Box::new(batch))
    }

    /// Bounds of the graphic in its own coordinates.
    pub fn range(&self) -> Option<Aabb> {
        match self {
            RenderGraphic::Primitive(primitive) => Some(primitive.range),
            RenderGraphic::List(list) => merge_ranges(list.iter().filter_map(RenderGraphic::range)),
            RenderGraphic::Branch(branch) => branch.range(),
            RenderGraphic::Batch(batch) => Some(batch.range),
        }
    }

    /// Number of primitives reachable from this graphic.
    pub fn primitive_count(&self) -> usize {
        match self {
            RenderGraphic::Primitive(_) => 1,
            RenderGraphic::List(list) => list.iter().map(RenderGraphic::primitive_count).sum(),
            RenderGraphic::Branch(branch) => branch.entries.iter().map(RenderGraphic::primitive_count).sum(),
            RenderGraphic::Batch(batch) => batch.graphic.primitive_count(),
        }
    }
}

fn merge_ranges(mut ranges: impl Iterator<Item = Aabb>) -> Option<Aabb> {
    let first = ranges.next()?;
    Some(ranges.fold(first, |acc, range| acc.merge(&range)))
}

/// A group of graphics drawn under a shared transform, clip and overrides.
#[derive(Debug, Clone)]
pub struct GraphicBranch {
    pub entries: Vec<RenderGraphic>,
    /// Branch-local to parent transform
    pub transform: Matrix4<f64>,
    pub view_flag_overrides: ViewFlagOverrides,
    pub symbology_overrides: Option<Arc<FeatureOverrides>>,
    /// Clip in branch-local coordinates
    pub clip: Option<ClipVector>,
    pub planar_classifier: Option<RenderPlanarClassifier>,
    pub texture_drape: Option<TextureDrape>,
    /// Key into the frame's animation branch states
    pub animation_key: Option<String>,
    /// Key of the iModel the graphics came from
    pub imodel: Option<String>,
}

impl Default for GraphicBranch {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl GraphicBranch {
    pub fn new(entries: Vec<RenderGraphic>) -> Self {
        Self {
            entries,
            transform: Matrix4::identity(),
            view_flag_overrides: ViewFlagOverrides::default(),
            symbology_overrides: None,
            clip: None,
            planar_classifier: None,
            texture_drape: None,
            animation_key: None,
            imodel: None,
        }
    }

    pub fn with_transform(mut self, transform: Matrix4<f64>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_view_flag_overrides(mut self, overrides: ViewFlagOverrides) -> Self {
        self.view_flag_overrides = overrides;
        self
    }

    pub fn with_symbology_overrides(mut self, overrides: Arc<FeatureOverrides>) -> Self {
        self.symbology_overrides = Some(overrides);
        self
    }

    pub fn with_clip(mut self, clip: Option<ClipVector>) -> Self {
        self.clip = clip;
        self
    }

    pub fn with_planar_classifier(mut self, classifier: Option<RenderPlanarClassifier>) -> Self {
        self.planar_classifier = classifier;
        self
    }

    pub fn with_texture_drape(mut self, drape: Option<TextureDrape>) -> Self {
        self.texture_drape = drape;
        self
    }

    pub fn with_animation_key(mut self, key: impl Into<String>) -> Self {
        self.animation_key = Some(key.into());
        self
    }

    pub fn with_imodel(mut self, key: impl Into<String>) -> Self {
        self.imodel = Some(key.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bounds of the entries in the parent's coordinates.
    pub fn range(&self) -> Option<Aabb> {
        let local = merge_ranges(self.entries.iter().filter_map(RenderGraphic::range))?;
        Some(local.transform(&self.transform))
    }
}

static NEXT_BATCH_UID: AtomicU64 = AtomicU64::new(1);

/// A graphic whose primitives carry per-feature indices into `features`.
#[derive(Debug, Clone)]
pub struct Batch {
    uid: u64,
    pub graphic: RenderGraphic,
    pub features: Arc<FeatureTable>,
    pub range: Aabb,
}

impl Batch {
    pub fn new(graphic: RenderGraphic, features: Arc<FeatureTable>, range: Aabb) -> Self {
        Self {
            uid: NEXT_BATCH_UID.fetch_add(1, Ordering::Relaxed),
            graphic,
            features,
            range,
        }
    }

    /// Process-unique identity. Clones share it, so a tile's batch keeps one
    /// batch id across the frames that draw it.
    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }
}

#[derive(Debug, Clone)]
pub struct RenderTexture {
    pub handle: GpuHandle,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct RenderClipVolume {
    pub clip: ClipVector,
    pub handle: GpuHandle,
}

/// Geometry of one model rendered into a mask that classifies another model.
#[derive(Debug, Clone)]
pub struct RenderPlanarClassifier {
    pub model_id: ModelId,
    pub handle: GpuHandle,
}

/// Graphics rendered to a texture and draped over a model's surface.
#[derive(Debug, Clone)]
pub struct TextureDrape {
    pub model_id: ModelId,
    pub handle: GpuHandle,
}

/// A planar polygon with texture coordinates, one per point.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyface {
    pub points: Vec<Point3<f64>>,
    pub params: Vec<[f64; 2]>,
}

impl Polyface {
    pub fn is_empty(&self) -> bool {
        self.points.len() < 3
    }

    pub fn range(&self) -> Option<Aabb> {
        Aabb::from_points(&self.points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::BatchType;
    use cgmath::Vector3;

    fn unit_primitive() -> RenderGraphic {
        RenderGraphic::primitive(
            GpuHandle::new(()),
            Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)),
        )
    }

    #[test]
    fn test_branch_range_is_transformed() {
        let branch = GraphicBranch::new(vec![unit_primitive()])
            .with_transform(Matrix4::from_translation(Vector3::new(10.0, 0.0, 0.0)));
        let range = branch.range().unwrap();
        assert_eq!(range.min.x, 10.0);
        assert_eq!(range.max.x, 11.0);
    }

    #[test]
    fn test_primitive_count_walks_tree() {
        let table = Arc::new(FeatureTable::new(ModelId::new(1), BatchType::Primary, Vec::new()));
        let batch = Batch::new(
            RenderGraphic::List(vec![unit_primitive(), unit_primitive()]),
            table,
            Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)),
        );
        let graphic = RenderGraphic::branch(GraphicBranch::new(vec![
            RenderGraphic::batch(batch),
            unit_primitive(),
        ]));
        assert_eq!(graphic.primitive_count(), 3);
    }

    #[test]
    fn test_batch_clone_keeps_uid() {
        let table = Arc::new(FeatureTable::new(ModelId::new(1), BatchType::Primary, Vec::new()));
        let range = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let a = Batch::new(unit_primitive(), table.clone(), range);
        let b = Batch::new(unit_primitive(), table, range);

        assert_eq!(a.clone().uid(), a.uid());
        assert_ne!(a.uid(), b.uid());
    }

    #[test]
    fn test_handle_downcast() {
        let handle = GpuHandle::new(42u32);
        assert_eq!(handle.downcast_ref::<u32>(), Some(&42));
        assert!(handle.downcast_ref::<String>().is_none());
        assert!(handle.ptr_eq(&handle.clone()));
    }
}
