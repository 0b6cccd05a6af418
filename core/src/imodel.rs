use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::common::Aabb;
use crate::error::TileTreeError;
use crate::request::PendingResult;
use crate::scene::{ModelId, TileTreeProps};
use crate::tile::{
    PrimaryTileTreeSupplier, PrimaryTreeId, TileLoader, TileTreeCache, TileTreeId, TileTreeOwner,
    TileTreeSupplier,
};

/// Metadata about one model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelProps {
    pub id: ModelId,
    pub name: String,
    pub is_3d: bool,
    pub range: Option<Aabb>,
}

/// A source of iModel data: tile-tree metadata, tile loaders and model metadata.
pub trait IModelConnection {
    /// Identifies the iModel; graphics from it are tagged with this key.
    fn key(&self) -> &str;

    fn request_tile_tree_props(&self, id: &TileTreeId) -> PendingResult<Result<TileTreeProps, TileTreeError>>;

    fn create_tile_loader(&self, id: &TileTreeId, props: &TileTreeProps) -> Box<dyn TileLoader>;

    fn model_props(&self, _model_id: ModelId) -> Option<ModelProps> {
        None
    }
}

/// An open connection plus the tile trees loaded from it.
///
/// Views created from the same session share tile trees: equal tree ids map
/// to one [`TileTreeOwner`].
pub struct IModelSession {
    connection: Rc<dyn IModelConnection>,
    trees: RefCell<TileTreeCache>,
    primary_supplier: Rc<dyn TileTreeSupplier>,
}

impl IModelSession {
    pub fn new(connection: Rc<dyn IModelConnection>) -> Rc<Self> {
        Rc::new(Self {
            connection,
            trees: RefCell::new(TileTreeCache::new()),
            primary_supplier: Rc::new(PrimaryTileTreeSupplier),
        })
    }

    pub fn connection(&self) -> &Rc<dyn IModelConnection> {
        &self.connection
    }

    pub fn key(&self) -> &str {
        self.connection.key()
    }

    pub fn tile_tree_owner(&self, id: TileTreeId, supplier: &Rc<dyn TileTreeSupplier>) -> TileTreeOwner {
        self.trees.borrow_mut().get_owner(id, supplier, &self.connection)
    }

    pub fn primary_tree_owner(&self, id: PrimaryTreeId) -> TileTreeOwner {
        self.tile_tree_owner(TileTreeId::Primary(id), &self.primary_supplier)
    }

    /// Supplier used for model geometry and classifier trees.
    pub fn primary_supplier(&self) -> &Rc<dyn TileTreeSupplier> {
        &self.primary_supplier
    }

    pub fn tree_cache(&self) -> Ref<'_, TileTreeCache> {
        self.trees.borrow()
    }

    /// Disposes trees unused for longer than their expiration, then forgets
    /// owners no reference holds any more. Returns the number of trees disposed.
    pub fn purge_tile_trees(&self, now: Instant, default_expiration: Duration) -> usize {
        let mut trees = self.trees.borrow_mut();
        let disposed = trees.purge(now, default_expiration);
        trees.drop_unreferenced();
        disposed
    }
}
