use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use cgmath::Matrix4;

use crate::camera::ViewingSpace;
use crate::common::{ClipVector, Containment, ConvexPolyhedron};
use crate::error::TileTreeError;
use crate::scene::TileTreeProps;

use super::loader::{TileLoader, TileRequestInfo};
use super::tile::{LoadStatus, SelectParent, Tile, TileId, TileVisibility};

static NEXT_TREE_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Everything tile selection needs to know about the view, in world space.
#[derive(Debug, Clone)]
pub struct TileDrawArgs {
    /// Tree to world
    pub location: Matrix4<f64>,
    pub frustum: ConvexPolyhedron,
    /// World-space clip; tiles entirely outside it are culled
    pub clip: Option<ClipVector>,
    pub viewing: ViewingSpace,
    /// Scales the computed pixel size; larger values select finer tiles
    pub tile_size_modifier: f64,
    pub now: Instant,
    /// Children unused since this instant may be unloaded; `None` unloads
    /// them as soon as they are not needed
    pub purge_older_than: Option<Instant>,
}

impl TileDrawArgs {
    /// Classifies a tile against the view.
    pub fn visibility(&self, tile: &Tile) -> TileVisibility {
        let range = tile.range().transform(&self.location);
        if !self.frustum.intersects_aabb(&range) {
            return TileVisibility::OutsideFrustum;
        }
        if let Some(clip) = &self.clip {
            if clip.classify_aabb(&range) == Containment::Outside {
                return TileVisibility::OutsideFrustum;
            }
        }
        if tile.is_leaf() {
            return TileVisibility::Visible;
        }

        let pixel_size = self.viewing.projected_size(&range) * self.tile_size_modifier;
        if pixel_size > tile.maximum_size() {
            TileVisibility::TooCoarse
        } else {
            TileVisibility::Visible
        }
    }
}

/// Tiles chosen by one traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct TileSelection {
    /// Ready tiles to draw, in traversal order
    pub selected: Vec<TileId>,
    /// Tiles that must load before the view is complete
    pub missing: Vec<TileId>,
    /// `Yes` when not even the root could stand in for what is missing
    pub parent: SelectParent,
}

/// A hierarchy of tiles covering one model (or map, reality mesh, ...) at
/// increasing resolution.
///
/// Tiles live in an arena keyed by [`TileId`]. Children are created lazily
/// from the loader's [`child_props`](TileLoader::child_props) and discarded
/// when no longer needed; ids are never reused, so stale references to a
/// discarded tile simply find nothing.
pub struct TileTree {
    serial: u64,
    id: String,
    location: Matrix4<f64>,
    expiration: Option<Duration>,
    clip_volume: Option<ClipVector>,
    max_depth: u32,
    is_3d: bool,
    tiles: HashMap<TileId, Tile>,
    root: TileId,
    next_tile_id: TileId,
    loader: Box<dyn TileLoader>,
    created: Instant,
    last_selected: Option<Instant>,
}

impl TileTree {
    pub fn new(props: &TileTreeProps, loader: Box<dyn TileLoader>) -> Result<Self, TileTreeError> {
        let location = props.location.to_matrix()?;
        if props.root_tile.range.to_aabb().is_null() {
            return Err(TileTreeError::InvalidProps(format!("tree {} has an inverted root range", props.id)));
        }

        let root = Tile::new(0, None, 0, &props.root_tile);
        let mut tiles = HashMap::new();
        tiles.insert(0, root);

        Ok(Self {
            serial: NEXT_TREE_SERIAL.fetch_add(1, Ordering::Relaxed),
            id: props.id.clone(),
            location,
            expiration: props.expiration_secs.map(Duration::from_secs_f64),
            clip_volume: None,
            max_depth: props.max_depth,
            is_3d: props.is_3d,
            tiles,
            root: 0,
            next_tile_id: 1,
            loader,
            created: Instant::now(),
            last_selected: None,
        })
    }

    /// Clip in tree coordinates applied to everything the tree draws.
    pub fn with_clip_volume(mut self, clip: Option<ClipVector>) -> Self {
        self.clip_volume = clip;
        self
    }

    /// Process-unique identity of this tree.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn location(&self) -> &Matrix4<f64> {
        &self.location
    }

    pub fn clip_volume(&self) -> Option<&ClipVector> {
        self.clip_volume.as_ref()
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn is_3d(&self) -> bool {
        self.is_3d
    }

    pub fn root_id(&self) -> TileId {
        self.root
    }

    pub fn root(&self) -> Option<&Tile> {
        self.tiles.get(&self.root)
    }

    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.tiles.get(&id)
    }

    pub(crate) fn tile_mut(&mut self, id: TileId) -> Option<&mut Tile> {
        self.tiles.get_mut(&id)
    }

    /// Number of tiles currently in memory.
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn loader(&self) -> &dyn TileLoader {
        self.loader.as_ref()
    }

    pub fn last_selected(&self) -> Option<Instant> {
        self.last_selected
    }

    /// True once the tree has gone unselected for longer than its expiration
    /// (or `default_expiration` when the props named none).
    pub fn is_expired(&self, now: Instant, default_expiration: Duration) -> bool {
        let last = self.last_selected.unwrap_or(self.created);
        let expiration = self.expiration.unwrap_or(default_expiration);
        now.saturating_duration_since(last) > expiration
    }

    pub fn request_info(&self, id: TileId) -> Option<TileRequestInfo> {
        let tile = self.tiles.get(&id)?;
        Some(TileRequestInfo {
            tree_id: self.id.clone(),
            content_id: tile.content_id().to_string(),
            range: *tile.range(),
            depth: tile.depth(),
        })
    }

    /// Selects the tiles to draw for a view and collects those still missing.
    pub fn select_tiles(&mut self, args: &TileDrawArgs) -> TileSelection {
        self.last_selected = Some(args.now);

        let mut selected = Vec::new();
        let mut missing = Vec::new();
        let parent = self.select_tile(self.root, args, &mut selected, &mut missing);

        TileSelection {
            selected,
            missing,
            parent,
        }
    }

    fn select_tile(
        &mut self,
        id: TileId,
        args: &TileDrawArgs,
        selected: &mut Vec<TileId>,
        missing: &mut Vec<TileId>,
    ) -> SelectParent {
        let Some(tile) = self.tiles.get_mut(&id) else {
            return SelectParent::No;
        };
        tile.mark_used(args.now);
        let status = tile.load_status();
        let visibility = args.visibility(tile);

        if visibility == TileVisibility::OutsideFrustum {
            self.unload_children(id, args.purge_older_than);
            return SelectParent::No;
        }
        if status == LoadStatus::NotFound {
            return SelectParent::No;
        }
        // Abandoned tiles are never requested again, so they are not missing
        let wanted = status != LoadStatus::Failed;

        if visibility == TileVisibility::TooCoarse {
            let children = self.get_or_create_children(id);
            if !children.is_empty() {
                let initial = selected.len();
                let mut parent_needed = false;
                // Every child is visited so all missing ones are requested
                for child in children {
                    if self.select_tile(child, args, selected, missing) == SelectParent::Yes {
                        parent_needed = true;
                    }
                }

                if !parent_needed {
                    return SelectParent::No;
                }

                selected.truncate(initial);
                if status == LoadStatus::Ready {
                    selected.push(id);
                    return SelectParent::No;
                }
                // Needed as a stand-in until the children arrive
                if wanted {
                    missing.push(id);
                }
                return SelectParent::Yes;
            }
        }

        if status == LoadStatus::Ready {
            selected.push(id);
            self.unload_children(id, args.purge_older_than);
            return SelectParent::No;
        }
        if wanted {
            missing.push(id);
        }
        SelectParent::Yes
    }

    /// Children of a tile, creating them on first use. Empty for leaves.
    pub(crate) fn get_or_create_children(&mut self, id: TileId) -> Vec<TileId> {
        let Some(tile) = self.tiles.get(&id) else {
            return Vec::new();
        };
        if let Some(children) = tile.children() {
            return children.to_vec();
        }
        if tile.is_leaf() {
            return Vec::new();
        }

        let child_depth = tile.depth() + 1;
        let child_props = if tile.depth() >= self.max_depth {
            Vec::new()
        } else {
            self.loader.child_props(&tile.props(), child_depth, self.max_depth)
        };

        let mut children = Vec::with_capacity(child_props.len());
        for props in &child_props {
            let child_id = self.next_tile_id;
            self.next_tile_id += 1;
            self.tiles.insert(child_id, Tile::new(child_id, Some(id), child_depth, props));
            children.push(child_id);
        }

        if let Some(tile) = self.tiles.get_mut(&id) {
            if children.is_empty() {
                tile.is_leaf = true;
            }
            tile.children = Some(children.clone());
        }
        children
    }

    /// Discards a tile's descendants unless one was used at or after `older_than`.
    pub(crate) fn unload_children(&mut self, id: TileId, older_than: Option<Instant>) {
        let Some(children) = self.tiles.get(&id).and_then(|t| t.children.clone()) else {
            return;
        };

        if let Some(threshold) = older_than {
            let recently_used = children.iter().any(|child| {
                self.tiles
                    .get(child)
                    .and_then(Tile::last_used)
                    .is_some_and(|used| used >= threshold)
            });
            if recently_used {
                return;
            }
        }

        for child in children {
            self.remove_subtree(child);
        }
        if let Some(tile) = self.tiles.get_mut(&id) {
            tile.children = None;
        }
    }

    fn remove_subtree(&mut self, id: TileId) {
        if let Some(tile) = self.tiles.remove(&id) {
            for child in tile.children.unwrap_or_default() {
                self.remove_subtree(child);
            }
        }
    }

    /// Unloads the descendants of every tile not used since `older_than`.
    /// Returns the number of tiles discarded.
    pub fn prune(&mut self, older_than: Instant) -> usize {
        let before = self.tiles.len();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(tile) = self.tiles.get(&id) else {
                continue;
            };
            let Some(children) = tile.children.clone() else {
                continue;
            };

            if tile.last_used().map_or(true, |used| used < older_than) {
                self.unload_children(id, None);
            } else {
                stack.extend(children);
            }
        }

        let removed = before - self.tiles.len();
        if removed > 0 {
            log::debug!("Pruned {} tiles from tree {}", removed, self.id);
        }
        removed
    }
}

impl std::fmt::Debug for TileTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileTree")
            .field("serial", &self.serial)
            .field("id", &self.id)
            .field("tiles", &self.tiles.len())
            .finish()
    }
}
