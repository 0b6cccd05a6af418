use std::time::Instant;

use crate::common::Aabb;
use crate::render::RenderGraphic;
use crate::scene::{Range3dProps, TileProps};

/// Index of a tile within its tree.
pub type TileId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    NotLoaded,
    Queued,
    Loading,
    Ready,
    /// The content does not exist. Nothing to draw; never requested again.
    NotFound,
    /// Loading failed too many times. Never requested again; an ancestor
    /// stands in for it.
    Failed,
}

/// How a tile relates to the current view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileVisibility {
    OutsideFrustum,
    /// Visible, but its content is too coarse for the view
    TooCoarse,
    Visible,
}

/// Returned by selection: whether the parent must be drawn in place of this
/// subtree because something in it is not ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectParent {
    Yes,
    No,
}

/// Decoded content of a tile.
#[derive(Debug, Clone, Default)]
pub struct TileContent {
    /// `None` for content that decodes to nothing drawable
    pub graphic: Option<RenderGraphic>,
    /// Content may reveal that the tile has no children
    pub is_leaf: Option<bool>,
    pub content_range: Option<Aabb>,
}

impl TileContent {
    pub fn new(graphic: RenderGraphic) -> Self {
        Self {
            graphic: Some(graphic),
            ..Default::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// One node of a tile tree.
#[derive(Debug, Clone)]
pub struct Tile {
    pub(crate) id: TileId,
    pub(crate) parent: Option<TileId>,
    pub(crate) depth: u32,
    pub(crate) content_id: String,
    pub(crate) range: Aabb,
    pub(crate) content_range: Option<Aabb>,
    pub(crate) maximum_size: f64,
    pub(crate) is_leaf: bool,
    pub(crate) status: LoadStatus,
    pub(crate) content: Option<TileContent>,
    /// `None` until children are first needed
    pub(crate) children: Option<Vec<TileId>>,
    pub(crate) last_used: Option<Instant>,
    pub(crate) failed_attempts: u32,
}

impl Tile {
    pub(crate) fn new(id: TileId, parent: Option<TileId>, depth: u32, props: &TileProps) -> Self {
        Self {
            id,
            parent,
            depth,
            content_id: props.content_id.clone(),
            range: props.range.to_aabb(),
            content_range: props.content_range.as_ref().map(Range3dProps::to_aabb),
            maximum_size: props.maximum_size,
            is_leaf: props.is_leaf,
            status: LoadStatus::NotLoaded,
            content: None,
            children: None,
            last_used: None,
            failed_attempts: 0,
        }
    }

    pub fn id(&self) -> TileId {
        self.id
    }

    pub fn parent(&self) -> Option<TileId> {
        self.parent
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    pub fn range(&self) -> &Aabb {
        &self.range
    }

    /// Tighter bounds of the content if known, otherwise the tile range.
    pub fn content_range(&self) -> &Aabb {
        self.content_range.as_ref().unwrap_or(&self.range)
    }

    pub fn maximum_size(&self) -> f64 {
        self.maximum_size
    }

    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    pub fn load_status(&self) -> LoadStatus {
        self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status == LoadStatus::Ready
    }

    pub fn is_not_found(&self) -> bool {
        self.status == LoadStatus::NotFound
    }

    pub fn is_abandoned(&self) -> bool {
        self.status == LoadStatus::Failed
    }

    /// Queued or loading.
    pub fn is_loading(&self) -> bool {
        matches!(self.status, LoadStatus::Queued | LoadStatus::Loading)
    }

    pub fn graphic(&self) -> Option<&RenderGraphic> {
        self.content.as_ref()?.graphic.as_ref()
    }

    pub fn children(&self) -> Option<&[TileId]> {
        self.children.as_deref()
    }

    pub fn last_used(&self) -> Option<Instant> {
        self.last_used
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// Props describing this tile, as handed to a loader.
    pub fn props(&self) -> TileProps {
        TileProps {
            content_id: self.content_id.clone(),
            range: Range3dProps::from_aabb(&self.range),
            content_range: self.content_range.as_ref().map(Range3dProps::from_aabb),
            maximum_size: self.maximum_size,
            is_leaf: self.is_leaf,
        }
    }

    pub(crate) fn set_status(&mut self, status: LoadStatus) {
        self.status = status;
    }

    pub(crate) fn set_content(&mut self, content: TileContent) {
        if let Some(is_leaf) = content.is_leaf {
            self.is_leaf = is_leaf;
        }
        if let Some(range) = content.content_range {
            self.content_range = Some(range);
        }
        self.content = Some(content);
        self.status = LoadStatus::Ready;
        self.failed_attempts = 0;
    }

    /// Reverts a failed load so a later frame may retry it, or gives up on the
    /// tile once `max_retries` attempts have failed.
    pub(crate) fn mark_failed(&mut self, max_retries: u32) {
        self.failed_attempts += 1;
        self.status = if self.failed_attempts >= max_retries {
            LoadStatus::Failed
        } else {
            LoadStatus::NotLoaded
        };
    }

    pub(crate) fn set_not_found(&mut self) {
        self.status = LoadStatus::NotFound;
        self.content = None;
    }

    pub(crate) fn mark_used(&mut self, now: Instant) {
        self.last_used = Some(now);
    }
}
