//! Tile request scheduling.
//!
//! Viewports report the tiles they are missing once per frame with
//! [`TileAdmin::request_tiles`]. [`TileAdmin::process`] then polls in-flight
//! requests, decodes finished content, cancels requests no viewport wants any
//! more, and starts new ones up to the configured limit, coarsest first.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::error::TileLoadError;
use crate::render::RenderSystem;
use crate::request::{PendingResult, Poll};

use super::tile::{LoadStatus, TileId};
use super::tree::TileTree;

/// Identifies a viewport to the scheduler.
pub type ViewportId = u32;

/// Scheduler and tile-lifetime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TileAdminConfig {
    /// Maximum number of requests in flight at once
    pub max_active_requests: usize,
    /// Failed loads after which a tile is never requested again
    pub max_retries: u32,
    /// How long unused child tiles are kept before being unloaded
    pub tile_expiration: Duration,
    /// How long an unused tile tree is kept before being disposed
    pub tree_expiration: Duration,
    /// Cancel requests for tiles no viewport still wants
    pub cancel_unused_requests: bool,
    /// Scales tile screen sizes; above 1 selects finer tiles
    pub tile_size_modifier: f64,
}

impl Default for TileAdminConfig {
    fn default() -> Self {
        Self {
            max_active_requests: 10,
            max_retries: 3,
            tile_expiration: Duration::from_secs(20),
            tree_expiration: Duration::from_secs(300),
            cancel_unused_requests: true,
            tile_size_modifier: 1.0,
        }
    }
}

impl TileAdminConfig {
    pub fn with_max_active_requests(mut self, max: usize) -> Self {
        self.max_active_requests = max;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_tile_expiration(mut self, expiration: Duration) -> Self {
        self.tile_expiration = expiration;
        self
    }

    pub fn with_tree_expiration(mut self, expiration: Duration) -> Self {
        self.tree_expiration = expiration;
        self
    }

    pub fn with_cancel_unused_requests(mut self, cancel: bool) -> Self {
        self.cancel_unused_requests = cancel;
        self
    }

    pub fn with_tile_size_modifier(mut self, modifier: f64) -> Self {
        self.tile_size_modifier = modifier;
        self
    }
}

/// A tile whose content a view is waiting for.
#[derive(Debug, Clone)]
pub struct MissingTile {
    tree: Weak<RefCell<TileTree>>,
    tree_serial: u64,
    tile_id: TileId,
    depth: u32,
}

impl MissingTile {
    pub fn new(tree: &Rc<RefCell<TileTree>>, tree_serial: u64, tile_id: TileId, depth: u32) -> Self {
        Self {
            tree: Rc::downgrade(tree),
            tree_serial,
            tile_id,
            depth,
        }
    }

    pub fn tree_serial(&self) -> u64 {
        self.tree_serial
    }

    pub fn tile_id(&self) -> TileId {
        self.tile_id
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn tree(&self) -> Option<Rc<RefCell<TileTree>>> {
        self.tree.upgrade()
    }

    fn key(&self) -> (u64, TileId) {
        (self.tree_serial, self.tile_id)
    }
}

/// Set of missing tiles, deduplicated by tree and tile.
#[derive(Debug, Clone, Default)]
pub struct MissingTiles {
    tiles: BTreeMap<(u64, TileId), MissingTile>,
}

impl MissingTiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the tile was already present.
    pub fn insert(&mut self, tile: MissingTile) -> bool {
        self.tiles.insert(tile.key(), tile).is_none()
    }

    pub fn contains(&self, tree_serial: u64, tile_id: TileId) -> bool {
        self.tiles.contains_key(&(tree_serial, tile_id))
    }

    pub fn extend(&mut self, other: MissingTiles) {
        self.tiles.extend(other.tiles);
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MissingTile> {
        self.tiles.values()
    }
}

/// Running totals reported by [`TileAdmin::statistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileRequestStats {
    pub queued: usize,
    pub active: usize,
    pub completed: usize,
    pub not_found: usize,
    pub failed: usize,
    pub canceled: usize,
    pub abandoned: usize,
}

struct ActiveRequest {
    tile: MissingTile,
    pending: PendingResult<Result<Vec<u8>, TileLoadError>>,
}

/// Per-session tile request scheduler.
pub struct TileAdmin {
    config: TileAdminConfig,
    requested: HashMap<ViewportId, MissingTiles>,
    queue: Vec<MissingTile>,
    active: Vec<ActiveRequest>,
    stats: TileRequestStats,
}

impl Default for TileAdmin {
    fn default() -> Self {
        Self::new(TileAdminConfig::default())
    }
}

impl TileAdmin {
    pub fn new(config: TileAdminConfig) -> Self {
        Self {
            config,
            requested: HashMap::new(),
            queue: Vec::new(),
            active: Vec::new(),
            stats: TileRequestStats::default(),
        }
    }

    pub fn config(&self) -> &TileAdminConfig {
        &self.config
    }

    /// Replaces the set of tiles `viewport` is waiting for. Tiles not yet
    /// requested are queued; tiles already queued or loading are left alone.
    pub fn request_tiles(&mut self, viewport: ViewportId, missing: MissingTiles) {
        for tile in missing.iter() {
            let Some(tree) = tile.tree() else {
                continue;
            };
            let mut tree = tree.borrow_mut();
            let Some(entry) = tree.tile_mut(tile.tile_id) else {
                continue;
            };

            if entry.load_status() != LoadStatus::NotLoaded {
                continue;
            }

            entry.set_status(LoadStatus::Queued);
            self.queue.push(tile.clone());
        }

        self.requested.insert(viewport, missing);
    }

    /// Drops everything a closed viewport asked for.
    pub fn forget_viewport(&mut self, viewport: ViewportId) {
        self.requested.remove(&viewport);
    }

    /// Advances the scheduler by one frame.
    pub fn process(&mut self, system: &dyn RenderSystem) {
        self.poll_active(system);
        if self.config.cancel_unused_requests {
            self.cancel_unrequested();
        }
        self.start_queued();
    }

    pub fn statistics(&self) -> TileRequestStats {
        TileRequestStats {
            queued: self.queue.len(),
            active: self.active.len(),
            ..self.stats
        }
    }

    /// True while anything is queued or in flight.
    pub fn has_pending_requests(&self) -> bool {
        !self.queue.is_empty() || !self.active.is_empty()
    }

    fn poll_active(&mut self, system: &dyn RenderSystem) {
        let mut still_active = Vec::with_capacity(self.active.len());
        for request in std::mem::take(&mut self.active) {
            match request.pending.poll() {
                Poll::Pending => still_active.push(request),
                Poll::Ready(result) => self.apply_result(&request.tile, result, system),
                Poll::Disconnected => self.apply_result(
                    &request.tile,
                    Err(TileLoadError::Failed("request dropped".to_string())),
                    system,
                ),
            }
        }
        self.active = still_active;
    }

    fn apply_result(
        &mut self,
        tile: &MissingTile,
        result: Result<Vec<u8>, TileLoadError>,
        system: &dyn RenderSystem,
    ) {
        // The tree was disposed or the tile discarded; nothing to update
        let Some(tree) = tile.tree() else {
            return;
        };
        let mut tree = tree.borrow_mut();
        let Some(info) = tree.request_info(tile.tile_id) else {
            return;
        };

        let content = result.and_then(|data| tree.loader().read_content(&data, &info, system));
        let max_retries = self.config.max_retries;
        let Some(entry) = tree.tile_mut(tile.tile_id) else {
            return;
        };

        match content {
            Ok(content) => {
                log::trace!("Loaded tile {}/{}", info.tree_id, info.content_id);
                entry.set_content(content);
                self.stats.completed += 1;
            }
            Err(TileLoadError::NotFound) => {
                entry.set_not_found();
                self.stats.not_found += 1;
            }
            Err(TileLoadError::Canceled) => {
                entry.set_status(LoadStatus::NotLoaded);
                self.stats.canceled += 1;
            }
            Err(err) => {
                entry.mark_failed(max_retries);
                self.stats.failed += 1;
                if entry.load_status() == LoadStatus::Failed {
                    log::warn!(
                        "Abandoning tile {}/{} after {} failures: {}",
                        info.tree_id,
                        info.content_id,
                        entry.failed_attempts(),
                        err
                    );
                    self.stats.abandoned += 1;
                } else {
                    log::debug!("Tile {}/{} failed: {}", info.tree_id, info.content_id, err);
                }
            }
        }
    }

    fn cancel_unrequested(&mut self) {
        let requested = &self.requested;
        let stats = &mut self.stats;

        self.queue.retain(|tile| {
            if is_requested(requested, tile) {
                return true;
            }
            revert_to_not_loaded(tile);
            stats.canceled += 1;
            false
        });

        self.active.retain(|request| {
            if is_requested(requested, &request.tile) {
                return true;
            }
            request.pending.cancel();
            revert_to_not_loaded(&request.tile);
            stats.canceled += 1;
            false
        });
    }

    fn start_queued(&mut self) {
        if self.active.len() >= self.config.max_active_requests || self.queue.is_empty() {
            return;
        }

        self.queue.sort_by_key(|tile| (tile.depth, tile.tree_serial, tile.tile_id));
        let available = self.config.max_active_requests - self.active.len();
        let count = available.min(self.queue.len());

        for tile in self.queue.drain(..count) {
            let Some(tree) = tile.tree() else {
                continue;
            };
            let mut tree = tree.borrow_mut();
            let Some(info) = tree.request_info(tile.tile_id) else {
                continue;
            };
            match tree.tile_mut(tile.tile_id) {
                Some(entry) if entry.load_status() == LoadStatus::Queued => entry.set_status(LoadStatus::Loading),
                _ => continue,
            }

            log::trace!("Requesting tile {}/{}", info.tree_id, info.content_id);
            let pending = tree.loader().request_content(&info);
            self.active.push(ActiveRequest { tile, pending });
        }
    }
}

fn is_requested(requested: &HashMap<ViewportId, MissingTiles>, tile: &MissingTile) -> bool {
    requested.values().any(|set| set.contains(tile.tree_serial, tile.tile_id))
}

fn revert_to_not_loaded(tile: &MissingTile) {
    if let Some(tree) = tile.tree() {
        if let Some(entry) = tree.borrow_mut().tile_mut(tile.tile_id) {
            if entry.is_loading() {
                entry.set_status(LoadStatus::NotLoaded);
            }
        }
    }
}
