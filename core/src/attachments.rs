//! Sheets and the views attached to them.
//!
//! A 2d attachment draws a drawing's tile trees straight into the sheet under
//! the placement transform. A 3d attachment cannot: its view has its own
//! camera. It is drawn as a quad tree of textured tiles instead, where
//! "loading" a tile means rendering the attached view off-screen into that
//! tile's part of the picture. Finer tiles re-render the view at higher
//! resolution, so the same coarse-to-fine fallback as geometry tiles applies.

use std::collections::HashMap;

use cgmath::{Matrix4, Point2, Point3, Rad, SquareMatrix, Vector3};
use image::RgbaImage;

use crate::camera::Camera;
use crate::common::{Aabb, ClipVector, ConvexPolyhedron, Plane, RgbaColor};
use crate::context::{Decorations, SceneContext, SceneGraphics, SceneOutput};
use crate::imodel::IModelSession;
use crate::render::{GraphicBranch, Polyface, RenderGraphic, RenderSystem, SubRect};
use crate::scene::{Id64, ModelId};
use crate::tile::{PrimaryTreeReference, SelectParent, TileTreeReference};
use crate::view::{DisplayStyleState, DrawingViewState, SpatialViewState, ViewState};
use crate::viewport::{Viewport, ViewportConfig};

// ============================================================================
// Placement
// ============================================================================

/// Where an attachment sits on its sheet: a rectangle of `width` by `height`
/// sheet units with its lower-left corner at `origin`, rotated about it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement2d {
    pub origin: Point2<f64>,
    pub rotation: Rad<f64>,
    pub width: f64,
    pub height: f64,
}

impl Placement2d {
    pub fn new(origin: Point2<f64>, width: f64, height: f64) -> Self {
        Self {
            origin,
            rotation: Rad(0.0),
            width,
            height,
        }
    }

    pub fn with_rotation(mut self, rotation: Rad<f64>) -> Self {
        self.rotation = rotation;
        self
    }

    /// Maps placement coordinates (`0..width`, `0..height`) to the sheet.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        Matrix4::from_translation(Vector3::new(self.origin.x, self.origin.y, 0.0)) * Matrix4::from_angle_z(self.rotation)
    }

    /// The placement rectangle in placement coordinates.
    pub fn local_range(&self) -> Aabb {
        Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(self.width, self.height, 0.0))
    }

    /// Keeps the placement rectangle, in placement coordinates.
    pub fn local_clip(&self) -> ClipVector {
        let (w, h) = (self.width, self.height);
        ClipVector::new(vec![ConvexPolyhedron::new(vec![
            Plane::new(Vector3::new(-1.0, 0.0, 0.0), Point3::new(0.0, 0.0, 0.0)),
            Plane::new(Vector3::new(1.0, 0.0, 0.0), Point3::new(w, 0.0, 0.0)),
            Plane::new(Vector3::new(0.0, -1.0, 0.0), Point3::new(0.0, 0.0, 0.0)),
            Plane::new(Vector3::new(0.0, 1.0, 0.0), Point3::new(0.0, h, 0.0)),
        ])])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentProps {
    pub id: Id64,
    pub placement: Placement2d,
    /// Extra clip in placement coordinates
    pub clip: Option<ClipVector>,
}

impl AttachmentProps {
    pub fn new(id: Id64, placement: Placement2d) -> Self {
        Self {
            id,
            placement,
            clip: None,
        }
    }

    pub fn with_clip(mut self, clip: ClipVector) -> Self {
        self.clip = Some(clip);
        self
    }

    /// Placement rectangle combined with the attachment clip, in placement
    /// coordinates.
    fn local_clip(&self) -> ClipVector {
        let rectangle = self.placement.local_clip();
        match &self.clip {
            Some(clip) => rectangle.intersect(clip),
            None => rectangle,
        }
    }
}

// ============================================================================
// 2d attachments
// ============================================================================

/// A drawing view drawn directly into the sheet.
#[derive(Debug)]
pub struct Attachment2d {
    props: AttachmentProps,
    view: DrawingViewState,
}

impl Attachment2d {
    pub fn new(props: AttachmentProps, view: DrawingViewState) -> Self {
        Self { props, view }
    }

    pub fn props(&self) -> &AttachmentProps {
        &self.props
    }

    /// Maps the drawing's extents onto the placement rectangle.
    pub fn to_sheet(&self) -> Matrix4<f64> {
        let extents = &self.view.extents;
        let size = extents.size();
        let scale_x = if size.x > 0.0 { self.props.placement.width / size.x } else { 1.0 };
        let scale_y = if size.y > 0.0 { self.props.placement.height / size.y } else { 1.0 };

        self.props.placement.to_matrix()
            * Matrix4::from_nonuniform_scale(scale_x, scale_y, 1.0)
            * Matrix4::from_translation(Vector3::new(-extents.min.x, -extents.min.y, 0.0))
    }

    pub fn add_to_scene(&self, session: &IModelSession, context: &mut SceneContext) {
        let clip = self.props.local_clip().transform(&self.props.placement.to_matrix());
        context.with_transform_and_clip(self.to_sheet(), Some(clip), |ctx| self.view.create_scene(session, ctx));
    }
}

// ============================================================================
// 3d attachments
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentConfig {
    /// Deepest level of the tile quad tree
    pub max_depth: u32,
    /// Pixel size of each rendered tile texture
    pub texture_size: u32,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            texture_size: 512,
        }
    }
}

impl AttachmentConfig {
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_texture_size(mut self, texture_size: u32) -> Self {
        self.texture_size = texture_size;
        self
    }
}

/// Readiness of the attached view's scene at one level of detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttachmentSceneState {
    #[default]
    NotLoaded,
    /// Built, but tiles of the attached view are still missing
    Loading,
    Ready,
    /// Complete and nothing to draw
    Empty,
}

#[derive(Default)]
struct DepthScene {
    state: AttachmentSceneState,
    graphics: SceneGraphics,
    built_frame: Option<u64>,
}

enum TextureRender {
    Throttled,
    Rendered(Option<RgbaImage>),
}

/// Off-screen viewport that renders an attached view into tile textures.
pub struct AttachmentViewport {
    viewport: Viewport,
    rendering: bool,
    rendered_frame: Option<u64>,
}

impl AttachmentViewport {
    fn new(view: ViewState, system: &dyn RenderSystem, texture_size: u32) -> Self {
        let target = system.create_offscreen_target(texture_size, texture_size);
        Self {
            viewport: Viewport::new(view, target, ViewportConfig::new(texture_size, texture_size)),
            rendering: false,
            rendered_frame: None,
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Builds the attached view's scene at `resolution` pixels across.
    fn create_scene(&mut self, session: &IModelSession, outer: &SceneContext, resolution: u32) -> SceneOutput {
        let view = self.viewport.view();
        let camera = view.camera();
        let mut context = SceneContext::new(outer.system(), camera.frustum(), camera.viewing_space(resolution), outer.now())
            .with_view_clip(view.view_clip().cloned());
        self.viewport.create_scene(session, &mut context);
        context.finish()
    }

    /// Renders `rect` of the scene into an image, at most once per frame.
    fn render_texture(
        &mut self,
        system: &dyn RenderSystem,
        graphics: &SceneGraphics,
        rect: SubRect,
        frame: u64,
    ) -> TextureRender {
        if self.rendering || self.rendered_frame == Some(frame) {
            return TextureRender::Throttled;
        }

        self.rendering = true;
        self.viewport.render_scene(system, graphics, &Decorations::default(), Some(rect));
        let image = self.viewport.read_image();
        self.rendering = false;
        self.rendered_frame = Some(frame);
        TextureRender::Rendered(image)
    }

    fn background(&self) -> RgbaColor {
        self.viewport.render_plan(None).background
    }
}

/// Tile of a 3d attachment's quad tree.
pub type Tile3dId = u32;

#[derive(Debug)]
enum Tile3dStatus {
    NotLoaded,
    Ready(RenderGraphic),
    NotFound,
}

/// One tile of a [`Tree3d`]: a rectangle of the attachment in normalized
/// `0..1` coordinates.
#[derive(Debug)]
pub struct Tile3d {
    id: Tile3dId,
    depth: u32,
    rect: SubRect,
    children: Option<Vec<Tile3dId>>,
    polyface: Option<Polyface>,
    status: Tile3dStatus,
}

impl Tile3d {
    fn new(id: Tile3dId, depth: u32, rect: SubRect) -> Self {
        Self {
            id,
            depth,
            rect,
            children: None,
            polyface: None,
            status: Tile3dStatus::NotLoaded,
        }
    }

    pub fn id(&self) -> Tile3dId {
        self.id
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn rect(&self) -> &SubRect {
        &self.rect
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.status, Tile3dStatus::Ready(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.status, Tile3dStatus::NotFound)
    }

    pub fn graphic(&self) -> Option<&RenderGraphic> {
        match &self.status {
            Tile3dStatus::Ready(graphic) => Some(graphic),
            _ => None,
        }
    }

    /// Range of the tile in placement coordinates.
    fn local_range(&self, placement: &Placement2d) -> Aabb {
        Aabb::new(
            Point3::new(self.rect.left * placement.width, self.rect.bottom * placement.height, 0.0),
            Point3::new(self.rect.right * placement.width, self.rect.top * placement.height, 0.0),
        )
    }
}

/// Quadrants of `rect`: upper left, upper right, lower left, lower right.
fn quadrants(rect: &SubRect) -> [SubRect; 4] {
    let mid_x = (rect.left + rect.right) / 2.0;
    let mid_y = (rect.bottom + rect.top) / 2.0;
    [
        SubRect { left: rect.left, bottom: mid_y, right: mid_x, top: rect.top },
        SubRect { left: mid_x, bottom: mid_y, right: rect.right, top: rect.top },
        SubRect { left: rect.left, bottom: rect.bottom, right: mid_x, top: mid_y },
        SubRect { left: mid_x, bottom: rect.bottom, right: rect.right, top: mid_y },
    ]
}

/// The tile's quad clipped by `clip`, with texture coordinates relative to the
/// tile. `None` when nothing of the quad survives.
fn tile_polyface(rect: &SubRect, placement: &Placement2d, clip: &ClipVector) -> Option<Polyface> {
    let (w, h) = (placement.width, placement.height);
    let corners = [
        Point3::new(rect.left * w, rect.bottom * h, 0.0),
        Point3::new(rect.right * w, rect.bottom * h, 0.0),
        Point3::new(rect.right * w, rect.top * h, 0.0),
        Point3::new(rect.left * w, rect.top * h, 0.0),
    ];
    let points = clip.clip_polygon(&corners);
    if points.len() < 3 || w <= 0.0 || h <= 0.0 {
        return None;
    }

    let (tile_w, tile_h) = (rect.right - rect.left, rect.top - rect.bottom);
    let params = points
        .iter()
        .map(|p| [(p.x / w - rect.left) / tile_w, (p.y / h - rect.bottom) / tile_h])
        .collect();
    Some(Polyface { points, params })
}

fn is_all_background(image: &RgbaImage, background: RgbaColor) -> bool {
    let background = background.to_rgba8();
    image.pixels().all(|pixel| pixel.0 == background)
}

/// Arena of the tiles of a 3d attachment.
#[derive(Debug)]
pub struct Tree3d {
    tiles: HashMap<Tile3dId, Tile3d>,
    next_id: Tile3dId,
}

impl Default for Tree3d {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree3d {
    pub fn new() -> Self {
        let root = Tile3d::new(0, 0, SubRect { left: 0.0, bottom: 0.0, right: 1.0, top: 1.0 });
        Self {
            tiles: HashMap::from([(0, root)]),
            next_id: 1,
        }
    }

    pub fn root_id(&self) -> Tile3dId {
        0
    }

    pub fn tile(&self, id: Tile3dId) -> Option<&Tile3d> {
        self.tiles.get(&id)
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn ready_count(&self) -> usize {
        self.tiles.values().filter(|tile| tile.is_ready()).count()
    }

    fn get_or_create_children(&mut self, id: Tile3dId) -> Vec<Tile3dId> {
        let Some(tile) = self.tiles.get(&id) else {
            return Vec::new();
        };
        if let Some(children) = &tile.children {
            return children.clone();
        }

        let depth = tile.depth + 1;
        let mut children = Vec::with_capacity(4);
        for rect in quadrants(&tile.rect) {
            let child = self.next_id;
            self.next_id += 1;
            self.tiles.insert(child, Tile3d::new(child, depth, rect));
            children.push(child);
        }
        if let Some(tile) = self.tiles.get_mut(&id) {
            tile.children = Some(children.clone());
        }
        children
    }

    fn unload_children(&mut self, id: Tile3dId) {
        let Some(children) = self.tiles.get_mut(&id).and_then(|tile| tile.children.take()) else {
            return;
        };
        for child in children {
            self.unload_children(child);
            self.tiles.remove(&child);
        }
    }
}

enum TileLoad {
    Ready,
    NotFound,
    Pending,
}

/// A 3d view drawn into the sheet as textured tiles.
pub struct Attachment3d {
    props: AttachmentProps,
    config: AttachmentConfig,
    viewport: AttachmentViewport,
    scenes: Vec<DepthScene>,
    tree: Tree3d,
    frame: u64,
}

impl Attachment3d {
    pub fn new(props: AttachmentProps, view: SpatialViewState, system: &dyn RenderSystem, config: AttachmentConfig) -> Self {
        let scenes = (0..=config.max_depth).map(|_| DepthScene::default()).collect();
        Self {
            viewport: AttachmentViewport::new(ViewState::Spatial(view), system, config.texture_size),
            props,
            config,
            scenes,
            tree: Tree3d::new(),
            frame: 0,
        }
    }

    pub fn props(&self) -> &AttachmentProps {
        &self.props
    }

    pub fn config(&self) -> &AttachmentConfig {
        &self.config
    }

    pub fn tree(&self) -> &Tree3d {
        &self.tree
    }

    pub fn attachment_viewport(&self) -> &AttachmentViewport {
        &self.viewport
    }

    pub fn scene_state(&self, depth: u32) -> AttachmentSceneState {
        self.scenes
            .get(depth as usize)
            .map(|scene| scene.state)
            .unwrap_or(AttachmentSceneState::Empty)
    }

    pub fn add_to_scene(&mut self, session: &IModelSession, context: &mut SceneContext) {
        self.frame += 1;
        let location = *context.transform() * self.props.placement.to_matrix();

        let mut selected = Vec::new();
        let root = self.tree.root_id();
        if self.select_tile(root, &location, session, context, &mut selected) == SelectParent::Yes {
            log::trace!("Attachment {} has nothing ready to draw", self.props.id);
        }
        context.add_selected_tiles(selected.len());

        let graphics: Vec<RenderGraphic> = selected
            .iter()
            .filter_map(|id| self.tree.tile(*id)?.graphic().cloned())
            .collect();
        if graphics.is_empty() {
            return;
        }

        let local_clip = match (context.clip(), location.invert()) {
            (Some(clip), Some(inverse)) => Some(clip.transform(&inverse)),
            _ => None,
        };
        let branch = GraphicBranch::new(graphics).with_transform(location).with_clip(local_clip);
        context.output_graphic(RenderGraphic::branch(branch));
    }

    fn select_tile(
        &mut self,
        id: Tile3dId,
        location: &Matrix4<f64>,
        session: &IModelSession,
        context: &mut SceneContext,
        selected: &mut Vec<Tile3dId>,
    ) -> SelectParent {
        let Some(tile) = self.tree.tile(id) else {
            return SelectParent::No;
        };
        if tile.is_not_found() {
            return SelectParent::No;
        }

        let range = tile.local_range(&self.props.placement).transform(location);
        if !context.frustum().intersects_aabb(&range) {
            self.tree.unload_children(id);
            return SelectParent::No;
        }

        let too_coarse = tile.depth < self.config.max_depth
            && context.viewing().projected_size(&range) > self.config.texture_size as f64;
        let ready = tile.is_ready();

        if too_coarse {
            let initial = selected.len();
            let mut parent_needed = false;
            for child in self.tree.get_or_create_children(id) {
                if self.select_tile(child, location, session, context, selected) == SelectParent::Yes {
                    parent_needed = true;
                }
            }

            if !parent_needed {
                return SelectParent::No;
            }
            selected.truncate(initial);
            if ready {
                selected.push(id);
                return SelectParent::No;
            }
            // Stands in for its children as soon as its own texture exists
            return match self.load_tile(id, session, context) {
                TileLoad::Ready => {
                    selected.push(id);
                    SelectParent::No
                }
                TileLoad::NotFound | TileLoad::Pending => SelectParent::Yes,
            };
        }

        if ready {
            selected.push(id);
            self.tree.unload_children(id);
            return SelectParent::No;
        }

        match self.load_tile(id, session, context) {
            TileLoad::Ready => {
                selected.push(id);
                SelectParent::No
            }
            TileLoad::NotFound => SelectParent::No,
            TileLoad::Pending => {
                context.mark_scene_incomplete();
                SelectParent::Yes
            }
        }
    }

    fn load_tile(&mut self, id: Tile3dId, session: &IModelSession, context: &mut SceneContext) -> TileLoad {
        let clip = self.props.local_clip();
        let Some(tile) = self.tree.tiles.get_mut(&id) else {
            return TileLoad::NotFound;
        };
        if tile.polyface.is_none() {
            match tile_polyface(&tile.rect, &self.props.placement, &clip) {
                Some(polyface) => tile.polyface = Some(polyface),
                None => {
                    tile.status = Tile3dStatus::NotFound;
                    return TileLoad::NotFound;
                }
            }
        }
        let (depth, rect) = (tile.depth, tile.rect);

        match self.update_scene(depth, session, context) {
            AttachmentSceneState::Ready => {}
            AttachmentSceneState::Empty => {
                self.set_not_found(id);
                return TileLoad::NotFound;
            }
            AttachmentSceneState::NotLoaded | AttachmentSceneState::Loading => return TileLoad::Pending,
        }

        let system = context.system();
        let Some(scene) = self.scenes.get(depth as usize) else {
            return TileLoad::NotFound;
        };
        let image = match self.viewport.render_texture(system, &scene.graphics, rect, self.frame) {
            TextureRender::Throttled => {
                log::trace!("Attachment {} tile {} waits for the next frame", self.props.id, id);
                return TileLoad::Pending;
            }
            TextureRender::Rendered(image) => image,
        };

        let background = self.viewport.background();
        let Some(image) = image.filter(|image| !is_all_background(image, background)) else {
            log::debug!("Attachment {} tile {} rendered nothing", self.props.id, id);
            self.set_not_found(id);
            return TileLoad::NotFound;
        };

        let graphic = self.tree.tile(id).and_then(|tile| {
            let polyface = tile.polyface.as_ref()?;
            let texture = system.create_texture(&image)?;
            system.create_polyface(polyface, Some(&texture))
        });
        match (graphic, self.tree.tiles.get_mut(&id)) {
            (Some(graphic), Some(tile)) => {
                tile.status = Tile3dStatus::Ready(graphic);
                TileLoad::Ready
            }
            _ => {
                self.set_not_found(id);
                TileLoad::NotFound
            }
        }
    }

    fn set_not_found(&mut self, id: Tile3dId) {
        if let Some(tile) = self.tree.tiles.get_mut(&id) {
            tile.status = Tile3dStatus::NotFound;
        }
    }

    /// Advances the scene state for `depth`, building its scene at most once
    /// per frame. Ready and empty scenes are kept as they are.
    fn update_scene(&mut self, depth: u32, session: &IModelSession, context: &mut SceneContext) -> AttachmentSceneState {
        let frame = self.frame;
        let Some(scene) = self.scenes.get(depth as usize) else {
            return AttachmentSceneState::Empty;
        };
        match scene.state {
            AttachmentSceneState::Ready | AttachmentSceneState::Empty => return scene.state,
            state if scene.built_frame == Some(frame) => return state,
            _ => {}
        }

        let resolution = self.config.texture_size.saturating_mul(1u32.checked_shl(depth).unwrap_or(u32::MAX));
        let output = self.viewport.create_scene(session, context, resolution);
        let complete = output.is_complete();
        let SceneOutput { graphics, missing, .. } = output;
        context.merge_missing_tiles(missing);

        let next = if !complete {
            AttachmentSceneState::Loading
        } else if graphics.is_empty() {
            AttachmentSceneState::Empty
        } else {
            AttachmentSceneState::Ready
        };

        let Some(scene) = self.scenes.get_mut(depth as usize) else {
            return AttachmentSceneState::Empty;
        };
        if scene.state != next {
            log::debug!("Attachment {} depth {} scene {:?} -> {:?}", self.props.id, depth, scene.state, next);
        }
        scene.state = next;
        scene.graphics = graphics;
        scene.built_frame = Some(frame);
        next
    }
}

/// A view placed on a sheet.
pub enum Attachment {
    TwoD(Attachment2d),
    ThreeD(Box<Attachment3d>),
}

impl Attachment {
    pub fn props(&self) -> &AttachmentProps {
        match self {
            Attachment::TwoD(attachment) => attachment.props(),
            Attachment::ThreeD(attachment) => attachment.props(),
        }
    }

    pub fn as_3d(&self) -> Option<&Attachment3d> {
        match self {
            Attachment::ThreeD(attachment) => Some(&**attachment),
            Attachment::TwoD(_) => None,
        }
    }

    fn add_to_scene(&mut self, session: &IModelSession, context: &mut SceneContext) {
        match self {
            Attachment::TwoD(attachment) => attachment.add_to_scene(session, context),
            Attachment::ThreeD(attachment) => attachment.add_to_scene(session, context),
        }
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Attachment::TwoD(attachment) => f.debug_tuple("TwoD").field(&attachment.props().id).finish(),
            Attachment::ThreeD(attachment) => f.debug_tuple("ThreeD").field(&attachment.props().id).finish(),
        }
    }
}

// ============================================================================
// Sheets
// ============================================================================

/// A sheet: its own 2d model plus the views attached to it.
#[derive(Debug)]
pub struct SheetViewState {
    pub camera: Camera,
    pub style: DisplayStyleState,
    pub sheet_model: ModelId,
    pub attachments: Vec<Attachment>,
}

impl SheetViewState {
    /// A sheet of `extents` viewed from above.
    pub fn new(style: DisplayStyleState, sheet_model: ModelId, extents: &Aabb, aspect: f64) -> Self {
        Self {
            camera: Camera::top_down(extents, aspect),
            style,
            sheet_model,
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn style(&self) -> &DisplayStyleState {
        &self.style
    }

    pub fn style_mut(&mut self) -> &mut DisplayStyleState {
        &mut self.style
    }

    pub fn create_scene(&mut self, session: &IModelSession, context: &mut SceneContext) {
        let sheet = PrimaryTreeReference::new(session, self.sheet_model, false, None, None);
        sheet.add_to_scene(context);

        for attachment in &mut self.attachments {
            attachment.add_to_scene(session, context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::EPSILON;

    fn unit_rect() -> SubRect {
        SubRect {
            left: 0.0,
            bottom: 0.0,
            right: 1.0,
            top: 1.0,
        }
    }

    #[test]
    fn test_placement_maps_corners() {
        let placement = Placement2d::new(Point2::new(10.0, 20.0), 4.0, 2.0).with_rotation(Rad(std::f64::consts::FRAC_PI_2));
        let corner = placement.to_matrix() * cgmath::Vector4::new(4.0, 0.0, 0.0, 1.0);

        assert!((corner.x - 10.0).abs() < 1.0e-9);
        assert!((corner.y - 24.0).abs() < 1.0e-9);
    }

    #[test]
    fn test_placement_clip_keeps_rectangle() {
        let placement = Placement2d::new(Point2::new(0.0, 0.0), 4.0, 2.0);
        let clip = placement.local_clip();

        assert!(clip.contains_point(Point3::new(2.0, 1.0, 0.0)));
        assert!(clip.contains_point(Point3::new(2.0, 1.0, 50.0)));
        assert!(!clip.contains_point(Point3::new(5.0, 1.0, 0.0)));
        assert!(!clip.contains_point(Point3::new(2.0, -1.0, 0.0)));
    }

    #[test]
    fn test_quadrant_order() {
        let [upper_left, upper_right, lower_left, lower_right] = quadrants(&unit_rect());

        assert!((upper_left.left - 0.0).abs() < EPSILON && (upper_left.bottom - 0.5).abs() < EPSILON);
        assert!((upper_right.left - 0.5).abs() < EPSILON && (upper_right.bottom - 0.5).abs() < EPSILON);
        assert!((lower_left.left - 0.0).abs() < EPSILON && (lower_left.top - 0.5).abs() < EPSILON);
        assert!((lower_right.right - 1.0).abs() < EPSILON && (lower_right.top - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_tile_polyface_params_span_tile() {
        let placement = Placement2d::new(Point2::new(0.0, 0.0), 10.0, 10.0);
        let rect = quadrants(&unit_rect())[3];
        let polyface = tile_polyface(&rect, &placement, &placement.local_clip()).unwrap();

        assert_eq!(polyface.points.len(), 4);
        for (point, param) in polyface.points.iter().zip(&polyface.params) {
            assert!(point.x >= 5.0 - EPSILON && point.y <= 5.0 + EPSILON);
            assert!((0.0..=1.0).contains(&param[0]) && (0.0..=1.0).contains(&param[1]));
        }
    }

    #[test]
    fn test_tile_polyface_partially_clipped() {
        let placement = Placement2d::new(Point2::new(0.0, 0.0), 10.0, 10.0);
        // Keep x <= 2.5
        let clip = ClipVector::from_plane(Point3::new(2.5, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
        let polyface = tile_polyface(&unit_rect(), &placement, &clip).unwrap();

        let range = polyface.range().unwrap();
        assert!((range.max.x - 2.5).abs() < 1.0e-9);
        let max_u = polyface.params.iter().map(|p| p[0]).fold(0.0, f64::max);
        assert!((max_u - 0.25).abs() < 1.0e-9);
    }

    #[test]
    fn test_fully_clipped_tile_has_no_polyface() {
        let placement = Placement2d::new(Point2::new(0.0, 0.0), 10.0, 10.0);
        let clip = ClipVector::from_plane(Point3::new(2.5, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
        let right_half = quadrants(&unit_rect())[1];

        assert!(tile_polyface(&right_half, &placement, &clip).is_none());
    }

    #[test]
    fn test_background_detection() {
        let background = RgbaColor::new(0.0, 0.0, 0.0, 1.0);
        let mut pixels = RgbaImage::from_pixel(4, 4, image::Rgba(background.to_rgba8()));
        assert!(is_all_background(&pixels, background));

        pixels.put_pixel(1, 1, image::Rgba([255, 0, 0, 255]));
        assert!(!is_all_background(&pixels, background));
    }

    #[test]
    fn test_tree_children_and_unload() {
        let mut tree = Tree3d::new();
        let children = tree.get_or_create_children(tree.root_id());
        assert_eq!(children, vec![1, 2, 3, 4]);
        assert_eq!(tree.get_or_create_children(tree.root_id()), children);

        let grandchildren = tree.get_or_create_children(1);
        assert_eq!(grandchildren, vec![5, 6, 7, 8]);
        assert_eq!(tree.tile(5).unwrap().depth(), 2);
        assert_eq!(tree.tile_count(), 9);

        tree.unload_children(tree.root_id());
        assert_eq!(tree.tile_count(), 1);
        // Ids are not reused
        assert_eq!(tree.get_or_create_children(tree.root_id()), vec![9, 10, 11, 12]);
    }

    #[test]
    fn test_default_config() {
        let config = AttachmentConfig::default();
        assert_eq!(config.max_depth, 4);
        assert_eq!(config.texture_size, 512);
    }
}
