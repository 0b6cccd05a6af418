//! Per-frame accumulation of graphics and missing tiles.

use std::collections::HashMap;
use std::time::Instant;

use cgmath::{Matrix4, SquareMatrix};

use crate::camera::ViewingSpace;
use crate::common::{ClipVector, ConvexPolyhedron, Plane};
use crate::render::{RenderGraphic, RenderPlanarClassifier, RenderSystem, TextureDrape};
use crate::scene::ModelId;
use crate::tile::{MissingTile, MissingTiles, TileAdmin, TileDrawArgs, TileTree, ViewportId};

/// Which list produced graphics are routed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphicType {
    #[default]
    Scene,
    BackgroundMap,
    Overlay,
}

/// Graphics produced by one scene traversal.
#[derive(Debug, Clone, Default)]
pub struct SceneGraphics {
    pub foreground: Vec<RenderGraphic>,
    pub background_map: Vec<RenderGraphic>,
    pub overlay: Vec<RenderGraphic>,
    planar_classifiers: HashMap<ModelId, Option<RenderPlanarClassifier>>,
    texture_drapes: HashMap<ModelId, Option<TextureDrape>>,
}

impl SceneGraphics {
    pub fn list(&self, graphic_type: GraphicType) -> &[RenderGraphic] {
        match graphic_type {
            GraphicType::Scene => &self.foreground,
            GraphicType::BackgroundMap => &self.background_map,
            GraphicType::Overlay => &self.overlay,
        }
    }

    fn list_mut(&mut self, graphic_type: GraphicType) -> &mut Vec<RenderGraphic> {
        match graphic_type {
            GraphicType::Scene => &mut self.foreground,
            GraphicType::BackgroundMap => &mut self.background_map,
            GraphicType::Overlay => &mut self.overlay,
        }
    }

    pub fn planar_classifier(&self, model_id: ModelId) -> Option<&RenderPlanarClassifier> {
        self.planar_classifiers.get(&model_id)?.as_ref()
    }

    pub fn planar_classifier_count(&self) -> usize {
        self.planar_classifiers.values().filter(|c| c.is_some()).count()
    }

    pub fn texture_drape(&self, model_id: ModelId) -> Option<&TextureDrape> {
        self.texture_drapes.get(&model_id)?.as_ref()
    }

    pub fn texture_drape_count(&self) -> usize {
        self.texture_drapes.values().filter(|d| d.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.foreground.is_empty() && self.background_map.is_empty() && self.overlay.is_empty()
    }

    /// All routed graphics, background map first.
    pub fn all(&self) -> impl Iterator<Item = &RenderGraphic> {
        self.background_map
            .iter()
            .chain(self.foreground.iter())
            .chain(self.overlay.iter())
    }
}

/// What a finished traversal hands back to its viewport.
#[derive(Debug, Clone, Default)]
pub struct SceneOutput {
    pub graphics: SceneGraphics,
    pub missing: MissingTiles,
    pub selected_tiles: usize,
    /// Something other than a missing tile (a nested attachment scene, for
    /// instance) still needs another frame
    pub incomplete: bool,
}

impl SceneOutput {
    pub fn is_complete(&self) -> bool {
        !self.incomplete && self.missing.is_empty()
    }
}

/// Collects the graphics of one frame while tile-tree references draw.
///
/// The current graphic type, frustum, transform and clip are ambient: scoped
/// helpers such as [`with_graphic_type_and_frustum`](Self::with_graphic_type_and_frustum)
/// change them for a closure and restore them afterwards, so nested trees do
/// not thread them through explicitly.
pub struct SceneContext<'a> {
    system: &'a dyn RenderSystem,
    viewing: ViewingSpace,
    frustum: ConvexPolyhedron,
    plane: Option<Plane>,
    graphic_type: GraphicType,
    transform: Matrix4<f64>,
    clip: Option<ClipVector>,
    now: Instant,
    purge_older_than: Option<Instant>,
    tile_size_modifier: f64,
    graphics: SceneGraphics,
    missing: MissingTiles,
    selected_tiles: usize,
    incomplete: bool,
}

impl<'a> SceneContext<'a> {
    pub fn new(system: &'a dyn RenderSystem, frustum: ConvexPolyhedron, viewing: ViewingSpace, now: Instant) -> Self {
        Self {
            system,
            viewing,
            frustum,
            plane: None,
            graphic_type: GraphicType::Scene,
            transform: Matrix4::identity(),
            clip: None,
            now,
            purge_older_than: None,
            tile_size_modifier: 1.0,
            graphics: SceneGraphics::default(),
            missing: MissingTiles::new(),
            selected_tiles: 0,
            incomplete: false,
        }
    }

    pub fn with_tile_settings(mut self, tile_size_modifier: f64, purge_older_than: Option<Instant>) -> Self {
        self.tile_size_modifier = tile_size_modifier;
        self.purge_older_than = purge_older_than;
        self
    }

    /// World-space clip applied to everything drawn in this context.
    pub fn with_view_clip(mut self, clip: Option<ClipVector>) -> Self {
        self.clip = clip;
        self
    }

    pub fn system(&self) -> &'a dyn RenderSystem {
        self.system
    }

    pub fn viewing(&self) -> &ViewingSpace {
        &self.viewing
    }

    pub fn frustum(&self) -> &ConvexPolyhedron {
        &self.frustum
    }

    /// Plane the current graphics are projected onto, if any.
    pub fn plane(&self) -> Option<&Plane> {
        self.plane.as_ref()
    }

    pub fn graphic_type(&self) -> GraphicType {
        self.graphic_type
    }

    pub fn transform(&self) -> &Matrix4<f64> {
        &self.transform
    }

    pub fn clip(&self) -> Option<&ClipVector> {
        self.clip.as_ref()
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn with_graphic_type<R>(&mut self, graphic_type: GraphicType, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = std::mem::replace(&mut self.graphic_type, graphic_type);
        let result = f(self);
        self.graphic_type = previous;
        result
    }

    pub fn with_graphic_type_and_frustum<R>(
        &mut self,
        graphic_type: GraphicType,
        frustum: ConvexPolyhedron,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let previous_type = std::mem::replace(&mut self.graphic_type, graphic_type);
        let previous_frustum = std::mem::replace(&mut self.frustum, frustum);
        let result = f(self);
        self.frustum = previous_frustum;
        self.graphic_type = previous_type;
        result
    }

    pub fn with_graphic_type_and_plane<R>(
        &mut self,
        graphic_type: GraphicType,
        plane: Plane,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let previous_type = std::mem::replace(&mut self.graphic_type, graphic_type);
        let previous_plane = self.plane.replace(plane);
        let result = f(self);
        self.plane = previous_plane;
        self.graphic_type = previous_type;
        result
    }

    /// Draws under an extra transform and a world-space clip.
    pub fn with_transform_and_clip<R>(
        &mut self,
        transform: Matrix4<f64>,
        clip: Option<ClipVector>,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let previous_transform = self.transform;
        let previous_clip = self.clip.clone();

        self.transform = previous_transform * transform;
        if let Some(clip) = clip {
            self.clip = Some(match &previous_clip {
                Some(existing) => existing.intersect(&clip),
                None => clip,
            });
        }

        let result = f(self);
        self.transform = previous_transform;
        self.clip = previous_clip;
        result
    }

    /// Selection arguments for a tree drawn in this context.
    pub fn create_tile_draw_args(&self, tree: &TileTree, transform: Option<&Matrix4<f64>>) -> TileDrawArgs {
        let mut location = self.transform;
        if let Some(transform) = transform {
            location = location * transform;
        }
        location = location * tree.location();

        let tree_clip = tree.clip_volume().map(|clip| clip.transform(&location));
        let clip = match (self.clip.clone(), tree_clip) {
            (Some(a), Some(b)) => Some(a.intersect(&b)),
            (a, b) => a.or(b),
        };

        TileDrawArgs {
            location,
            frustum: self.frustum.clone(),
            clip,
            viewing: self.viewing,
            tile_size_modifier: self.tile_size_modifier,
            now: self.now,
            purge_older_than: self.purge_older_than,
        }
    }

    /// Routes a graphic into the list for the current graphic type.
    pub fn output_graphic(&mut self, graphic: RenderGraphic) {
        self.graphics.list_mut(self.graphic_type).push(graphic);
    }

    /// Returns the classifier for `model_id`, creating it with `create` the
    /// first time it is asked for in this frame.
    pub fn get_or_create_planar_classifier<F>(&mut self, model_id: ModelId, create: F) -> Option<RenderPlanarClassifier>
    where
        F: FnOnce(&mut Self) -> Option<RenderPlanarClassifier>,
    {
        if let Some(existing) = self.graphics.planar_classifiers.get(&model_id) {
            return existing.clone();
        }
        let classifier = create(self);
        self.graphics.planar_classifiers.insert(model_id, classifier.clone());
        classifier
    }

    /// Returns the drape for `model_id`, creating it with `create` the first
    /// time it is asked for in this frame.
    pub fn get_or_create_texture_drape<F>(&mut self, model_id: ModelId, create: F) -> Option<TextureDrape>
    where
        F: FnOnce(&mut Self) -> Option<TextureDrape>,
    {
        if let Some(existing) = self.graphics.texture_drapes.get(&model_id) {
            return existing.clone();
        }
        let drape = create(self);
        self.graphics.texture_drapes.insert(model_id, drape.clone());
        drape
    }

    pub fn insert_missing_tile(&mut self, tile: MissingTile) {
        self.missing.insert(tile);
    }

    /// Adds tiles missing from a nested traversal, so one request covers both.
    pub fn merge_missing_tiles(&mut self, missing: MissingTiles) {
        self.missing.extend(missing);
    }

    pub fn missing_tiles(&self) -> &MissingTiles {
        &self.missing
    }

    pub fn has_missing_tiles(&self) -> bool {
        !self.missing.is_empty()
    }

    /// Hands the collected missing tiles to the scheduler in one call.
    pub fn request_missing_tiles(&mut self, admin: &mut TileAdmin, viewport: ViewportId) {
        admin.request_tiles(viewport, self.missing.clone());
    }

    pub fn add_selected_tiles(&mut self, count: usize) {
        self.selected_tiles += count;
    }

    pub fn selected_tiles(&self) -> usize {
        self.selected_tiles
    }

    pub fn mark_scene_incomplete(&mut self) {
        self.incomplete = true;
    }

    pub fn is_scene_incomplete(&self) -> bool {
        self.incomplete
    }

    pub fn graphics(&self) -> &SceneGraphics {
        &self.graphics
    }

    pub fn finish(self) -> SceneOutput {
        SceneOutput {
            graphics: self.graphics,
            missing: self.missing,
            selected_tiles: self.selected_tiles,
            incomplete: self.incomplete,
        }
    }
}

// ============================================================================
// Decorations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecorationType {
    /// Drawn in world space, depth-tested with the scene
    World,
    /// Drawn in world space on top of the scene
    WorldOverlay,
    /// Drawn in view coordinates on top of everything
    ViewOverlay,
}

/// Graphics added by decorators, drawn after the scene.
#[derive(Debug, Clone, Default)]
pub struct Decorations {
    pub world: Vec<RenderGraphic>,
    pub world_overlay: Vec<RenderGraphic>,
    pub view_overlay: Vec<RenderGraphic>,
}

impl Decorations {
    pub fn is_empty(&self) -> bool {
        self.world.is_empty() && self.world_overlay.is_empty() && self.view_overlay.is_empty()
    }

    pub fn len(&self) -> usize {
        self.world.len() + self.world_overlay.len() + self.view_overlay.len()
    }
}

pub struct DecorateContext<'a> {
    system: &'a dyn RenderSystem,
    viewing: ViewingSpace,
    decorations: Decorations,
}

impl<'a> DecorateContext<'a> {
    pub fn new(system: &'a dyn RenderSystem, viewing: ViewingSpace) -> Self {
        Self {
            system,
            viewing,
            decorations: Decorations::default(),
        }
    }

    pub fn system(&self) -> &'a dyn RenderSystem {
        self.system
    }

    pub fn viewing(&self) -> &ViewingSpace {
        &self.viewing
    }

    pub fn add_decoration(&mut self, decoration_type: DecorationType, graphic: RenderGraphic) {
        match decoration_type {
            DecorationType::World => self.decorations.world.push(graphic),
            DecorationType::WorldOverlay => self.decorations.world_overlay.push(graphic),
            DecorationType::ViewOverlay => self.decorations.view_overlay.push(graphic),
        }
    }

    pub fn finish(self) -> Decorations {
        self.decorations
    }
}

/// Adds graphics to a viewport on every frame.
pub trait Decorator {
    fn decorate(&self, context: &mut DecorateContext);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Aabb;
    use crate::render::GpuHandle;
    use crate::testing::MockRenderSystem;
    use cgmath::{Point3, Vector3};

    fn primitive() -> RenderGraphic {
        RenderGraphic::primitive(
            GpuHandle::new(()),
            Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)),
        )
    }

    fn context(system: &MockRenderSystem) -> SceneContext<'_> {
        SceneContext::new(
            system,
            ConvexPolyhedron::new(Vec::new()),
            ViewingSpace::Orthographic { pixel_size: 1.0 },
            Instant::now(),
        )
    }

    #[test]
    fn test_graphics_route_by_ambient_type() {
        let system = MockRenderSystem::new();
        let mut context = context(&system);

        context.output_graphic(primitive());
        context.with_graphic_type_and_frustum(GraphicType::BackgroundMap, ConvexPolyhedron::new(Vec::new()), |ctx| {
            ctx.output_graphic(primitive());
            ctx.with_graphic_type(GraphicType::Overlay, |ctx| ctx.output_graphic(primitive()));
            ctx.output_graphic(primitive());
        });
        context.output_graphic(primitive());

        let graphics = context.finish().graphics;
        assert_eq!(graphics.foreground.len(), 2);
        assert_eq!(graphics.background_map.len(), 2);
        assert_eq!(graphics.overlay.len(), 1);
    }

    #[test]
    fn test_plane_is_scoped() {
        let system = MockRenderSystem::new();
        let mut context = context(&system);
        let plane = Plane::new(Vector3::unit_z(), Point3::new(0.0, 0.0, 0.0));

        context.with_graphic_type_and_plane(GraphicType::Overlay, plane, |ctx| {
            assert!(ctx.plane().is_some());
            assert_eq!(ctx.graphic_type(), GraphicType::Overlay);
        });
        assert!(context.plane().is_none());
        assert_eq!(context.graphic_type(), GraphicType::Scene);
    }

    #[test]
    fn test_planar_classifier_created_once_per_model() {
        let system = MockRenderSystem::new();
        let mut context = context(&system);
        let model = ModelId::new(0x1d);

        let mut calls = 0;
        for _ in 0..3 {
            let classifier = context.get_or_create_planar_classifier(model, |ctx| {
                calls += 1;
                ctx.system().create_planar_classifier(model, vec![primitive()])
            });
            assert!(classifier.is_some());
        }

        assert_eq!(calls, 1);
        assert_eq!(system.planar_classifiers_created(), 1);
        assert_eq!(context.graphics().planar_classifier_count(), 1);
    }

    #[test]
    fn test_texture_drape_created_once_per_model() {
        let system = MockRenderSystem::new();
        let mut context = context(&system);
        let model = ModelId::new(0x1e);

        let first = context.get_or_create_texture_drape(model, |ctx| ctx.system().create_texture_drape(model, Vec::new()));
        let second = context.get_or_create_texture_drape(model, |_| None);

        assert!(first.unwrap().handle.ptr_eq(&second.unwrap().handle));
    }

    #[test]
    fn test_transform_and_clip_are_restored() {
        let system = MockRenderSystem::new();
        let mut context = context(&system);
        let clip = ClipVector::from_plane(Point3::new(0.0, 0.0, 0.0), Vector3::unit_x());

        context.with_transform_and_clip(Matrix4::from_scale(2.0), Some(clip), |ctx| {
            assert_eq!(ctx.transform()[0][0], 2.0);
            assert!(ctx.clip().is_some());
        });
        assert_eq!(*context.transform(), Matrix4::identity());
        assert!(context.clip().is_none());
    }

    #[test]
    fn test_decorations_route_by_type() {
        let system = MockRenderSystem::new();
        let mut context = DecorateContext::new(&system, ViewingSpace::Orthographic { pixel_size: 1.0 });
        context.add_decoration(DecorationType::World, primitive());
        context.add_decoration(DecorationType::ViewOverlay, primitive());

        let decorations = context.finish();
        assert_eq!(decorations.world.len(), 1);
        assert_eq!(decorations.view_overlay.len(), 1);
        assert_eq!(decorations.len(), 2);
    }
}
