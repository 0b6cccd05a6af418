//! Viewports: a view drawn to a render target, one frame at a time.

use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use image::RgbaImage;

use crate::common::RgbaColor;
use crate::context::{DecorateContext, Decorations, Decorator, SceneContext, SceneGraphics};
use crate::imodel::IModelSession;
use crate::render::{compile_frame, BatchState, BranchState, RenderPlan, RenderSystem, RenderTarget, SubRect};
use crate::scene::{Feature, ModelId};
use crate::tile::{TileAdmin, TileAdminConfig, ViewportId};
use crate::view::ViewState;

static NEXT_VIEWPORT_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Debug, Clone, PartialEq)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
    /// Overrides the display style's background color
    pub background: Option<RgbaColor>,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            background: None,
        }
    }
}

impl ViewportConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn with_background(mut self, background: RgbaColor) -> Self {
        self.background = Some(background);
        self
    }

    pub fn aspect(&self) -> f64 {
        self.width.max(1) as f64 / self.height.max(1) as f64
    }
}

/// What one call to [`Viewport::render_frame`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub selected_tiles: usize,
    pub missing_tiles: usize,
    pub draw_commands: usize,
    /// False while finer tiles or nested scenes are still arriving
    pub scene_complete: bool,
}

/// A feature resolved from a pixel of the last frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickResult {
    pub feature_id: u32,
    pub model_id: ModelId,
    pub feature: Option<Feature>,
}

/// Everything viewports of one iModel share: the tree cache, the render
/// system, and the tile scheduler.
pub struct RenderSession {
    pub imodel: Rc<IModelSession>,
    pub system: Rc<dyn RenderSystem>,
    pub admin: TileAdmin,
}

impl RenderSession {
    pub fn new(imodel: Rc<IModelSession>, system: Rc<dyn RenderSystem>, config: TileAdminConfig) -> Self {
        Self {
            imodel,
            system,
            admin: TileAdmin::new(config),
        }
    }
}

/// Displays a [`ViewState`] on a [`RenderTarget`].
///
/// Each frame builds the scene from scratch, requests whatever tiles are
/// missing, and draws what is ready. The viewport stays invalid until a
/// frame finds nothing missing, so callers keep rendering while content
/// streams in.
pub struct Viewport {
    id: ViewportId,
    view: ViewState,
    target: Box<dyn RenderTarget>,
    config: ViewportConfig,
    animation_time: Option<f64>,
    decorators: Vec<Box<dyn Decorator>>,
    last_batches: Option<BatchState>,
    invalid: bool,
    frames_rendered: u64,
}

impl Viewport {
    pub fn new(mut view: ViewState, target: Box<dyn RenderTarget>, config: ViewportConfig) -> Self {
        view.camera_mut().aspect = config.aspect();
        Self {
            id: NEXT_VIEWPORT_ID.fetch_add(1, Ordering::Relaxed),
            view,
            target,
            config,
            animation_time: None,
            decorators: Vec::new(),
            last_batches: None,
            invalid: true,
            frames_rendered: 0,
        }
    }

    pub fn id(&self) -> ViewportId {
        self.id
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    /// Mutable access to the view; the viewport is invalidated.
    pub fn view_mut(&mut self) -> &mut ViewState {
        self.invalid = true;
        &mut self.view
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    pub fn invalidate(&mut self) {
        self.invalid = true;
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn animation_time(&self) -> Option<f64> {
        self.animation_time
    }

    /// Selects the schedule time the view is animated to; `None` turns
    /// animation off.
    pub fn set_animation_time(&mut self, time: Option<f64>) {
        if self.animation_time != time {
            self.animation_time = time;
            self.invalid = true;
        }
    }

    pub fn add_decorator(&mut self, decorator: Box<dyn Decorator>) {
        self.decorators.push(decorator);
        self.invalid = true;
    }

    /// Scene context for drawing this viewport's view at `now`.
    pub fn scene_context<'a>(&self, system: &'a dyn RenderSystem, now: Instant) -> SceneContext<'a> {
        let camera = self.view.camera();
        SceneContext::new(system, camera.frustum(), camera.viewing_space(self.config.height), now)
            .with_view_clip(self.view.view_clip().cloned())
    }

    pub fn create_scene(&mut self, session: &IModelSession, context: &mut SceneContext) {
        self.view.create_scene(session, context);
    }

    pub fn render_plan(&self, sub_rect: Option<SubRect>) -> RenderPlan {
        let style = self.view.style();
        RenderPlan {
            view_projection: self.view.camera().view_projection_matrix(),
            width: self.config.width,
            height: self.config.height,
            sub_rect,
            view_flags: style.view_flags(),
            background: self.config.background.unwrap_or_else(|| style.background_color()),
            animation_time: self.animation_time,
        }
    }

    /// Compiles `graphics` under the style's overrides and animation state
    /// and draws them. Returns the number of draw commands.
    pub fn render_scene(
        &mut self,
        system: &dyn RenderSystem,
        graphics: &SceneGraphics,
        decorations: &Decorations,
        sub_rect: Option<SubRect>,
    ) -> usize {
        let style = self.view.style();
        let root = BranchState::root(style.view_flags(), style.symbology_overrides(self.animation_time));
        let animation = style.animation_branches(self.animation_time);
        let plan = self.render_plan(sub_rect);

        let (frame, batches) = compile_frame(system, plan, root, animation.as_ref(), graphics, decorations);
        self.target.render_frame(&frame);
        self.last_batches = Some(batches);
        self.frames_rendered += 1;
        frame.command_count()
    }

    pub fn render_frame(&mut self, session: &mut RenderSession) -> FrameStats {
        self.render_frame_at(session, Instant::now())
    }

    /// Builds, schedules and draws one frame as of `now`.
    pub fn render_frame_at(&mut self, session: &mut RenderSession, now: Instant) -> FrameStats {
        let system = session.system.clone();
        let tiles = session.admin.config().clone();

        let mut context = self
            .scene_context(system.as_ref(), now)
            .with_tile_settings(tiles.tile_size_modifier, now.checked_sub(tiles.tile_expiration));
        self.create_scene(&session.imodel, &mut context);
        context.request_missing_tiles(&mut session.admin, self.id);
        let output = context.finish();

        session.admin.process(system.as_ref());
        let purged = session.imodel.purge_tile_trees(now, tiles.tree_expiration);
        if purged > 0 {
            log::debug!("Purged {} idle tile trees", purged);
        }

        let decorations = self.decorate(system.as_ref());
        let draw_commands = self.render_scene(system.as_ref(), &output.graphics, &decorations, None);

        let stats = FrameStats {
            selected_tiles: output.selected_tiles,
            missing_tiles: output.missing.len(),
            draw_commands,
            scene_complete: output.is_complete(),
        };
        self.invalid = !stats.scene_complete;
        stats
    }

    fn decorate(&self, system: &dyn RenderSystem) -> Decorations {
        let viewing = self.view.camera().viewing_space(self.config.height);
        let mut context = DecorateContext::new(system, viewing);
        for decorator in &self.decorators {
            decorator.decorate(&mut context);
        }
        context.finish()
    }

    /// The image drawn by the last frame, if the target can read it back.
    pub fn read_image(&mut self) -> Option<RgbaImage> {
        self.target.read_image()
    }

    /// Resolves the feature drawn at pixel `(x, y)` in the last frame.
    pub fn pick_feature(&mut self, x: u32, y: u32) -> Option<PickResult> {
        let feature_id = self.target.read_feature_id(x, y).filter(|id| *id != 0)?;
        let lookup = self.last_batches.as_ref()?.find(feature_id)?;
        Some(PickResult {
            feature_id,
            model_id: lookup.features.model_id,
            feature: lookup.feature().copied(),
        })
    }

    /// Withdraws this viewport's tile requests.
    pub fn close(self, session: &mut RenderSession) {
        session.admin.forget_viewport(self.id);
    }
}
