use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::error::TileTreeError;
use crate::imodel::IModelConnection;
use crate::request::{PendingResult, Poll};
use crate::scene::{BatchType, Id64, ModelId, TileTreeProps};

use super::loader::TileLoader;
use super::tree::TileTree;

/// Identifies a model's geometry tree. Views that agree on every field share
/// one tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimaryTreeId {
    pub model_id: ModelId,
    pub is_3d: bool,
    /// Set when the schedule animates elements of the model, which splits
    /// tile content into animation nodes
    pub animation_id: Option<Id64>,
    pub edges_required: bool,
    pub batch_type: BatchType,
}

impl PrimaryTreeId {
    pub fn new(model_id: ModelId, is_3d: bool) -> Self {
        Self {
            model_id,
            is_3d,
            animation_id: None,
            edges_required: false,
            batch_type: BatchType::Primary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TileTreeId {
    Primary(PrimaryTreeId),
    BackgroundMap { provider: String, terrain: bool },
    RealityModel { url: String, model_id: Option<ModelId> },
    Classifier { model_id: ModelId, batch_type: BatchType },
}

impl TileTreeId {
    pub fn model_id(&self) -> Option<ModelId> {
        match self {
            TileTreeId::Primary(id) => Some(id.model_id),
            TileTreeId::BackgroundMap { .. } => None,
            TileTreeId::RealityModel { model_id, .. } => *model_id,
            TileTreeId::Classifier { model_id, .. } => Some(*model_id),
        }
    }
}

impl fmt::Display for TileTreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileTreeId::Primary(id) => {
                write!(f, "{}:{}", id.model_id, if id.is_3d { "3d" } else { "2d" })?;
                if let Some(animation) = id.animation_id {
                    write!(f, ":A{}", animation)?;
                }
                if id.edges_required {
                    write!(f, ":E")?;
                }
                if id.batch_type != BatchType::Primary {
                    write!(f, ":{:?}", id.batch_type)?;
                }
                Ok(())
            }
            TileTreeId::BackgroundMap { provider, terrain } => {
                write!(f, "map:{}{}", provider, if *terrain { ":terrain" } else { "" })
            }
            TileTreeId::RealityModel { url, .. } => write!(f, "reality:{}", url),
            TileTreeId::Classifier { model_id, batch_type } => {
                write!(f, "classifier:{}:{:?}", model_id, batch_type)
            }
        }
    }
}

/// Knows how to obtain and build one kind of tile tree.
pub trait TileTreeSupplier {
    /// Distinguishes suppliers within a cache; trees from different suppliers
    /// never share an owner even if their ids compare equal.
    fn supplier_key(&self) -> &'static str;

    fn request_tree_props(
        &self,
        id: &TileTreeId,
        imodel: &dyn IModelConnection,
    ) -> PendingResult<Result<TileTreeProps, TileTreeError>>;

    fn create_loader(
        &self,
        id: &TileTreeId,
        props: &TileTreeProps,
        imodel: &Rc<dyn IModelConnection>,
    ) -> Box<dyn TileLoader>;

    fn create_tile_tree(
        &self,
        id: &TileTreeId,
        props: &TileTreeProps,
        imodel: &Rc<dyn IModelConnection>,
    ) -> Result<TileTree, TileTreeError> {
        TileTree::new(props, self.create_loader(id, props, imodel))
    }
}

/// Supplies model geometry and classifier trees straight from the connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrimaryTileTreeSupplier;

impl TileTreeSupplier for PrimaryTileTreeSupplier {
    fn supplier_key(&self) -> &'static str {
        "primary"
    }

    fn request_tree_props(
        &self,
        id: &TileTreeId,
        imodel: &dyn IModelConnection,
    ) -> PendingResult<Result<TileTreeProps, TileTreeError>> {
        imodel.request_tile_tree_props(id)
    }

    fn create_loader(
        &self,
        id: &TileTreeId,
        props: &TileTreeProps,
        imodel: &Rc<dyn IModelConnection>,
    ) -> Box<dyn TileLoader> {
        imodel.create_tile_loader(id, props)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeLoadStatus {
    NotLoaded,
    Loading,
    Loaded,
    NotFound,
}

enum OwnerState {
    NotLoaded,
    Loading(PendingResult<Result<TileTreeProps, TileTreeError>>),
    Loaded(Rc<RefCell<TileTree>>),
    NotFound,
}

struct OwnerInner {
    id: TileTreeId,
    supplier: Rc<dyn TileTreeSupplier>,
    imodel: Rc<dyn IModelConnection>,
    state: OwnerState,
}

/// Shared handle through which references obtain their tile tree.
///
/// Cloning the owner shares it. The tree is requested on the first
/// [`load`](Self::load) and built once its props arrive.
#[derive(Clone)]
pub struct TileTreeOwner(Rc<RefCell<OwnerInner>>);

impl TileTreeOwner {
    fn new(id: TileTreeId, supplier: Rc<dyn TileTreeSupplier>, imodel: Rc<dyn IModelConnection>) -> Self {
        Self(Rc::new(RefCell::new(OwnerInner {
            id,
            supplier,
            imodel,
            state: OwnerState::NotLoaded,
        })))
    }

    pub fn id(&self) -> TileTreeId {
        self.0.borrow().id.clone()
    }

    pub fn load_status(&self) -> TreeLoadStatus {
        match self.0.borrow().state {
            OwnerState::NotLoaded => TreeLoadStatus::NotLoaded,
            OwnerState::Loading(_) => TreeLoadStatus::Loading,
            OwnerState::Loaded(_) => TreeLoadStatus::Loaded,
            OwnerState::NotFound => TreeLoadStatus::NotFound,
        }
    }

    /// The tree if it has been built, without starting a load.
    pub fn tree(&self) -> Option<Rc<RefCell<TileTree>>> {
        match &self.0.borrow().state {
            OwnerState::Loaded(tree) => Some(tree.clone()),
            _ => None,
        }
    }

    /// Starts loading if needed and returns the tree once it exists.
    pub fn load(&self) -> Option<Rc<RefCell<TileTree>>> {
        let mut guard = self.0.borrow_mut();
        let inner = &mut *guard;

        if let OwnerState::NotLoaded = inner.state {
            log::debug!("Requesting tile tree {}", inner.id);
            inner.state = OwnerState::Loading(inner.supplier.request_tree_props(&inner.id, inner.imodel.as_ref()));
        }

        if let OwnerState::Loading(pending) = &inner.state {
            let next = match pending.poll() {
                Poll::Pending => return None,
                Poll::Ready(Ok(props)) => match inner.supplier.create_tile_tree(&inner.id, &props, &inner.imodel) {
                    Ok(tree) => {
                        log::info!("Loaded tile tree {}", inner.id);
                        OwnerState::Loaded(Rc::new(RefCell::new(tree)))
                    }
                    Err(err) => {
                        log::warn!("Failed to create tile tree {}: {}", inner.id, err);
                        OwnerState::NotFound
                    }
                },
                Poll::Ready(Err(TileTreeError::NotFound)) => {
                    log::debug!("Tile tree {} not found", inner.id);
                    OwnerState::NotFound
                }
                Poll::Ready(Err(err)) => {
                    log::warn!("Failed to load tile tree {}: {}", inner.id, err);
                    OwnerState::NotFound
                }
                Poll::Disconnected => {
                    log::warn!("Tile tree {} request dropped", inner.id);
                    OwnerState::NotFound
                }
            };
            inner.state = next;
        }

        match &inner.state {
            OwnerState::Loaded(tree) => Some(tree.clone()),
            _ => None,
        }
    }

    /// Drops the tree; the next [`load`](Self::load) requests it again.
    pub fn dispose(&self) {
        let mut inner = self.0.borrow_mut();
        if let OwnerState::Loading(pending) = &inner.state {
            pending.cancel();
        }
        inner.state = OwnerState::NotLoaded;
    }

    pub fn ptr_eq(&self, other: &TileTreeOwner) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn is_referenced_elsewhere(&self) -> bool {
        Rc::strong_count(&self.0) > 1
    }
}

impl fmt::Debug for TileTreeOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileTreeOwner")
            .field("id", &self.0.borrow().id)
            .field("status", &self.load_status())
            .finish()
    }
}

/// Owners keyed by supplier and tree id.
#[derive(Default)]
pub struct TileTreeCache {
    owners: HashMap<(&'static str, TileTreeId), TileTreeOwner>,
}

impl TileTreeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the owner for `id`, creating it on first request.
    pub fn get_owner(
        &mut self,
        id: TileTreeId,
        supplier: &Rc<dyn TileTreeSupplier>,
        imodel: &Rc<dyn IModelConnection>,
    ) -> TileTreeOwner {
        self.owners
            .entry((supplier.supplier_key(), id.clone()))
            .or_insert_with(|| TileTreeOwner::new(id, supplier.clone(), imodel.clone()))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Number of owners whose tree is currently built.
    pub fn loaded_count(&self) -> usize {
        self.owners
            .values()
            .filter(|owner| owner.load_status() == TreeLoadStatus::Loaded)
            .count()
    }

    /// Disposes trees idle for longer than their expiration.
    pub fn purge(&mut self, now: Instant, default_expiration: Duration) -> usize {
        let mut disposed = 0;
        for owner in self.owners.values() {
            let expired = owner
                .tree()
                .is_some_and(|tree| tree.borrow().is_expired(now, default_expiration));
            if expired {
                log::debug!("Disposing idle tile tree {}", owner.id());
                owner.dispose();
                disposed += 1;
            }
        }
        disposed
    }

    /// Forgets disposed owners held only by this cache. Views recreate their
    /// references every frame, so a built tree stays until it expires.
    /// Returns how many were dropped.
    pub fn drop_unreferenced(&mut self) -> usize {
        let before = self.owners.len();
        self.owners
            .retain(|_, owner| owner.is_referenced_elsewhere() || owner.load_status() != TreeLoadStatus::NotLoaded);
        before - self.owners.len()
    }
}
