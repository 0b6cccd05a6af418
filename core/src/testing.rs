//! In-memory collaborators for tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use cgmath::Point3;
use image::{Rgba, RgbaImage};

use crate::common::{Aabb, ClipVector};
use crate::error::{TileLoadError, TileTreeError};
use crate::imodel::{IModelConnection, ModelProps};
use crate::render::{
    Frame, GpuHandle, GraphicBranch, Polyface, RenderClipVolume, RenderGraphic, RenderPlanarClassifier,
    RenderSystem, RenderTarget, RenderTexture, TextureDrape,
};
use crate::request::{PendingResult, ResultSender};
use crate::scene::schedule::element_branch_key;
use crate::scene::{ModelId, Range3dProps, TileProps, TileTreeProps, TransformProps};
use crate::tile::{TileContent, TileLoader, TileRequestInfo, TileTree, TileTreeId};

// ============================================================================
// Render system
// ============================================================================

#[derive(Default)]
struct MockCounters {
    polyfaces: Cell<usize>,
    textures: Cell<usize>,
    clip_volumes: Cell<usize>,
    planar_classifiers: Cell<usize>,
    texture_drapes: Cell<usize>,
    offscreen_frames: Cell<usize>,
}

/// Render system that records what it was asked to create.
#[derive(Default)]
pub struct MockRenderSystem {
    counters: Rc<MockCounters>,
}

impl MockRenderSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn polyfaces_created(&self) -> usize {
        self.counters.polyfaces.get()
    }

    pub fn textures_created(&self) -> usize {
        self.counters.textures.get()
    }

    pub fn clip_volumes_created(&self) -> usize {
        self.counters.clip_volumes.get()
    }

    pub fn planar_classifiers_created(&self) -> usize {
        self.counters.planar_classifiers.get()
    }

    pub fn texture_drapes_created(&self) -> usize {
        self.counters.texture_drapes.get()
    }

    /// Frames rendered by every off-screen target this system created.
    pub fn offscreen_frames_rendered(&self) -> usize {
        self.counters.offscreen_frames.get()
    }
}

fn bump(counter: &Cell<usize>) {
    counter.set(counter.get() + 1);
}

impl RenderSystem for MockRenderSystem {
    fn create_polyface(&self, polyface: &Polyface, texture: Option<&RenderTexture>) -> Option<RenderGraphic> {
        let range = polyface.range()?;
        if polyface.is_empty() {
            return None;
        }
        bump(&self.counters.polyfaces);
        let handle = GpuHandle::new((polyface.clone(), texture.map(|t| (t.width, t.height))));
        Some(RenderGraphic::primitive(handle, range))
    }

    fn create_texture(&self, image: &RgbaImage) -> Option<RenderTexture> {
        bump(&self.counters.textures);
        Some(RenderTexture {
            handle: GpuHandle::new(image.clone()),
            width: image.width(),
            height: image.height(),
        })
    }

    fn create_clip_volume(&self, clip: &ClipVector) -> Option<RenderClipVolume> {
        bump(&self.counters.clip_volumes);
        Some(RenderClipVolume {
            clip: clip.clone(),
            handle: GpuHandle::new(()),
        })
    }

    fn create_planar_classifier(
        &self,
        model_id: ModelId,
        graphics: Vec<RenderGraphic>,
    ) -> Option<RenderPlanarClassifier> {
        bump(&self.counters.planar_classifiers);
        Some(RenderPlanarClassifier {
            model_id,
            handle: GpuHandle::new(graphics.len()),
        })
    }

    fn create_texture_drape(&self, model_id: ModelId, graphics: Vec<RenderGraphic>) -> Option<TextureDrape> {
        bump(&self.counters.texture_drapes);
        Some(TextureDrape {
            model_id,
            handle: GpuHandle::new(graphics.len()),
        })
    }

    fn create_offscreen_target(&self, width: u32, height: u32) -> Box<dyn RenderTarget> {
        Box::new(MockTarget::new(width, height).with_frame_counter(self.counters.clone()))
    }
}

/// Target that "draws" a frame by filling its image: background color when
/// the frame is empty, opaque red otherwise.
pub struct MockTarget {
    width: u32,
    height: u32,
    image: Option<RgbaImage>,
    last_feature_id: Option<u32>,
    frames: usize,
    counters: Option<Rc<MockCounters>>,
}

impl MockTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            image: None,
            last_feature_id: None,
            frames: 0,
            counters: None,
        }
    }

    fn with_frame_counter(mut self, counters: Rc<MockCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    pub fn frames_rendered(&self) -> usize {
        self.frames
    }
}

impl RenderTarget for MockTarget {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn render_frame(&mut self, frame: &Frame) {
        self.frames += 1;
        if let Some(counters) = &self.counters {
            bump(&counters.offscreen_frames);
        }

        let pixel = if frame.is_empty() {
            Rgba(frame.plan.background.to_rgba8())
        } else {
            Rgba([255, 0, 0, 255])
        };
        self.image = Some(RgbaImage::from_pixel(self.width.max(1), self.height.max(1), pixel));
        self.last_feature_id = frame
            .commands()
            .map(|command| command.batch_id)
            .filter(|id| *id != 0)
            .last();
    }

    fn read_image(&mut self) -> Option<RgbaImage> {
        self.image.clone()
    }

    fn read_feature_id(&mut self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.last_feature_id
    }
}

// ============================================================================
// Tile loading
// ============================================================================

type ContentSender = ResultSender<Result<Vec<u8>, TileLoadError>>;

/// Controls how [`MockLoader`]s answer requests. Shared between a test and
/// the loaders it hands out.
#[derive(Default)]
pub struct MockLoaderState {
    requested: RefCell<Vec<String>>,
    not_found: RefCell<HashSet<String>>,
    failing: RefCell<HashSet<String>>,
    empty: RefCell<HashSet<String>>,
    nodes: RefCell<HashMap<String, (ModelId, Vec<u32>)>>,
    hold: Cell<bool>,
    held: RefCell<Vec<(String, ContentSender)>>,
}

impl MockLoaderState {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Content ids requested so far, in request order.
    pub fn requested(&self) -> Vec<String> {
        self.requested.borrow().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requested.borrow().len()
    }

    pub fn set_not_found(&self, content_id: &str) {
        self.not_found.borrow_mut().insert(content_id.to_string());
    }

    pub fn set_failing(&self, content_id: &str) {
        self.failing.borrow_mut().insert(content_id.to_string());
    }

    /// Content that decodes to nothing drawable.
    pub fn set_empty(&self, content_id: &str) {
        self.empty.borrow_mut().insert(content_id.to_string());
    }

    /// Content split into one animation-node branch per entry of `nodes`,
    /// as a tree built for element animation would deliver it.
    pub fn set_animation_nodes(&self, content_id: &str, model_id: ModelId, nodes: &[u32]) {
        self.nodes
            .borrow_mut()
            .insert(content_id.to_string(), (model_id, nodes.to_vec()));
    }

    /// While held, requests stay pending until [`release`](Self::release).
    pub fn set_hold(&self, hold: bool) {
        self.hold.set(hold);
    }

    pub fn held_count(&self) -> usize {
        self.held.borrow().len()
    }

    /// Completes every held request. Returns how many reached a live handle.
    pub fn release(&self) -> usize {
        let held = std::mem::take(&mut *self.held.borrow_mut());
        held.into_iter()
            .filter(|(_, sender)| !sender.is_canceled())
            .map(|(content_id, sender)| sender.send(Ok(content_id.into_bytes())))
            .filter(|delivered| *delivered)
            .count()
    }

    /// Canceled requests among those held.
    pub fn held_canceled(&self) -> usize {
        self.held.borrow().iter().filter(|(_, sender)| sender.is_canceled()).count()
    }
}

/// Loader whose content is the content id itself, drawn as one primitive
/// covering the tile range.
pub struct MockLoader {
    state: Rc<MockLoaderState>,
}

impl MockLoader {
    pub fn new(state: Rc<MockLoaderState>) -> Self {
        Self { state }
    }
}

impl TileLoader for MockLoader {
    fn request_content(&self, tile: &TileRequestInfo) -> PendingResult<Result<Vec<u8>, TileLoadError>> {
        let content_id = tile.content_id.clone();
        self.state.requested.borrow_mut().push(content_id.clone());

        if self.state.not_found.borrow().contains(&content_id) {
            return PendingResult::ready(Err(TileLoadError::NotFound));
        }
        if self.state.failing.borrow().contains(&content_id) {
            return PendingResult::ready(Err(TileLoadError::Failed(format!("{} is broken", content_id))));
        }
        if self.state.hold.get() {
            let (sender, pending) = PendingResult::channel();
            self.state.held.borrow_mut().push((content_id, sender));
            return pending;
        }
        PendingResult::ready(Ok(content_id.into_bytes()))
    }

    fn read_content(
        &self,
        data: &[u8],
        tile: &TileRequestInfo,
        _system: &dyn RenderSystem,
    ) -> Result<TileContent, TileLoadError> {
        let content_id = String::from_utf8(data.to_vec()).map_err(|err| TileLoadError::Failed(err.to_string()))?;
        if self.state.empty.borrow().contains(&content_id) {
            return Ok(TileContent::empty());
        }
        if let Some((model_id, nodes)) = self.state.nodes.borrow().get(&content_id) {
            let branches = nodes
                .iter()
                .map(|node| {
                    let primitive = RenderGraphic::primitive(GpuHandle::new(format!("{}#{}", content_id, node)), tile.range);
                    RenderGraphic::branch(
                        GraphicBranch::new(vec![primitive]).with_animation_key(element_branch_key(*model_id, *node)),
                    )
                })
                .collect();
            return Ok(TileContent::new(RenderGraphic::List(branches)));
        }
        Ok(TileContent::new(RenderGraphic::primitive(GpuHandle::new(content_id), tile.range)))
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Props of a flat square tree of `size` units subdivided to `max_depth`.
pub fn quad_tree_props(id: &str, size: f64, max_depth: u32) -> TileTreeProps {
    TileTreeProps {
        id: id.to_string(),
        root_tile: TileProps {
            content_id: "0".to_string(),
            range: Range3dProps {
                low: [0.0, 0.0, 0.0],
                high: [size, size, 0.0],
            },
            content_range: None,
            maximum_size: 512.0,
            is_leaf: max_depth == 0,
        },
        location: TransformProps::identity(),
        expiration_secs: None,
        max_depth,
        is_3d: true,
    }
}

pub fn quad_tree(size: f64, max_depth: u32, state: &Rc<MockLoaderState>) -> TileTree {
    TileTree::new(
        &quad_tree_props("test", size, max_depth),
        Box::new(MockLoader::new(state.clone())),
    )
    .expect("valid props")
}

/// Connection serving a fixed set of tile trees, all loaded by mock loaders
/// sharing one [`MockLoaderState`].
pub struct MockConnection {
    key: String,
    trees: RefCell<HashMap<TileTreeId, TileTreeProps>>,
    models: RefCell<HashMap<ModelId, ModelProps>>,
    tree_requests: Cell<usize>,
    loaders: Rc<MockLoaderState>,
}

impl MockConnection {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            trees: RefCell::new(HashMap::new()),
            models: RefCell::new(HashMap::new()),
            tree_requests: Cell::new(0),
            loaders: MockLoaderState::new(),
        }
    }

    pub fn with_tree(self, id: TileTreeId, props: TileTreeProps) -> Self {
        self.trees.borrow_mut().insert(id, props);
        self
    }

    pub fn with_model(self, model_id: ModelId, is_3d: bool, size: f64) -> Self {
        let range = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(size, size, 0.0));
        self.models.borrow_mut().insert(
            model_id,
            ModelProps {
                id: model_id,
                name: format!("Model {}", model_id),
                is_3d,
                range: Some(range),
            },
        );
        self
    }

    pub fn loaders(&self) -> &Rc<MockLoaderState> {
        &self.loaders
    }

    /// Number of tree-props requests received.
    pub fn tree_requests(&self) -> usize {
        self.tree_requests.get()
    }
}

impl IModelConnection for MockConnection {
    fn key(&self) -> &str {
        &self.key
    }

    fn request_tile_tree_props(&self, id: &TileTreeId) -> PendingResult<Result<TileTreeProps, TileTreeError>> {
        bump(&self.tree_requests);
        match self.trees.borrow().get(id) {
            Some(props) => PendingResult::ready(Ok(props.clone())),
            None => PendingResult::ready(Err(TileTreeError::NotFound)),
        }
    }

    fn create_tile_loader(&self, _id: &TileTreeId, _props: &TileTreeProps) -> Box<dyn TileLoader> {
        Box::new(MockLoader::new(self.loaders.clone()))
    }

    fn model_props(&self, model_id: ModelId) -> Option<ModelProps> {
        self.models.borrow().get(&model_id).cloned()
    }
}
