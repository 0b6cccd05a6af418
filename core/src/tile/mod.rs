//! Hierarchical level-of-detail tiles.
//!
//! A [`TileTree`] is selected against a view by [`TileTree::select_tiles`],
//! which falls back to coarser ready tiles while finer ones stream in. Trees
//! are shared between views through a [`TileTreeOwner`], and the content of
//! missing tiles is fetched by the [`TileAdmin`].

mod admin;
mod loader;
mod owner;
mod reference;
#[allow(clippy::module_inception)]
mod tile;
mod tree;

pub use admin::{MissingTile, MissingTiles, TileAdmin, TileAdminConfig, TileRequestStats, ViewportId};
pub use loader::{subdivide, subdivide_range, TileLoader, TileRequestInfo};
pub use owner::{
    PrimaryTileTreeSupplier, PrimaryTreeId, TileTreeCache, TileTreeId, TileTreeOwner, TileTreeSupplier,
    TreeLoadStatus,
};
pub use reference::{
    draw_tile_tree, BackgroundMapReference, PrimaryTreeReference, RealityModelReference, TileTreeReference,
};
pub use tile::{LoadStatus, SelectParent, Tile, TileContent, TileId, TileVisibility};
pub use tree::{TileDrawArgs, TileSelection, TileTree};
