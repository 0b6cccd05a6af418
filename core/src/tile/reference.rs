//! References through which views draw shared tile trees.

use std::cell::RefCell;
use std::rc::Rc;

use cgmath::{Matrix4, SquareMatrix};

use crate::context::{GraphicType, SceneContext};
use crate::imodel::IModelSession;
use crate::render::{GraphicBranch, RenderGraphic};
use crate::scene::schedule::{model_branch_key, Script};
use crate::scene::{BatchType, Id64, ModelId};

use super::admin::MissingTile;
use super::owner::{PrimaryTreeId, TileTreeId, TileTreeOwner};
use super::tile::SelectParent;
use super::tree::TileTree;

/// Something a view draws by selecting tiles from a shared tree.
pub trait TileTreeReference {
    fn owner(&self) -> &TileTreeOwner;

    fn graphic_type(&self) -> GraphicType {
        GraphicType::Scene
    }

    fn add_to_scene(&self, context: &mut SceneContext);
}

/// Selects tiles from `tree`, records those still missing, and returns the
/// selected graphics as one branch carrying the tree's location and clip.
///
/// `transform` is applied between the context transform and the tree
/// location. Returns `None` when nothing is ready to draw.
pub fn draw_tile_tree(
    tree: &Rc<RefCell<TileTree>>,
    context: &mut SceneContext,
    transform: Option<&Matrix4<f64>>,
) -> Option<GraphicBranch> {
    let mut guard = tree.borrow_mut();
    let args = context.create_tile_draw_args(&guard, transform);
    let selection = guard.select_tiles(&args);

    for id in &selection.missing {
        if let Some(tile) = guard.tile(*id) {
            context.insert_missing_tile(MissingTile::new(tree, guard.serial(), *id, tile.depth()));
        }
    }
    if selection.parent == SelectParent::Yes {
        log::trace!("Tree {} has nothing to stand in for missing tiles", guard.id());
    }
    context.add_selected_tiles(selection.selected.len());

    let graphics: Vec<RenderGraphic> = selection
        .selected
        .iter()
        .filter_map(|id| guard.tile(*id)?.graphic().cloned())
        .collect();
    if graphics.is_empty() {
        return None;
    }

    // Branch clips are expressed in the branch's own coordinates
    let local_clip = match (&args.clip, args.location.invert()) {
        (Some(clip), Some(inverse)) => Some(clip.transform(&inverse)),
        _ => None,
    };

    Some(
        GraphicBranch::new(graphics)
            .with_transform(args.location)
            .with_clip(local_clip),
    )
}

// ============================================================================
// Model geometry
// ============================================================================

/// Draws a model's geometry tree, animated by the style's schedule script.
#[derive(Debug, Clone)]
pub struct PrimaryTreeReference {
    model_id: ModelId,
    owner: TileTreeOwner,
    animation_key: Option<String>,
    imodel_key: String,
}

impl PrimaryTreeReference {
    /// `script_id` identifies the script source (normally the display style);
    /// it becomes part of the tree id when the script animates individual
    /// elements of this model, since their tiles are split into nodes.
    pub fn new(
        session: &IModelSession,
        model_id: ModelId,
        is_3d: bool,
        script: Option<&Script>,
        script_id: Option<Id64>,
    ) -> Self {
        let timeline = script.and_then(|script| script.find(model_id));

        let mut id = PrimaryTreeId::new(model_id, is_3d);
        if timeline.is_some_and(|t| t.contains_element_animation()) {
            id.animation_id = Some(script_id.unwrap_or(Id64::INVALID));
        }

        let animation_key = timeline
            .filter(|t| t.contains_model_animation())
            .map(|_| model_branch_key(model_id));

        Self {
            model_id,
            owner: session.primary_tree_owner(id),
            animation_key,
            imodel_key: session.key().to_string(),
        }
    }

    pub fn model_id(&self) -> ModelId {
        self.model_id
    }

    pub fn animation_key(&self) -> Option<&str> {
        self.animation_key.as_deref()
    }
}

impl TileTreeReference for PrimaryTreeReference {
    fn owner(&self) -> &TileTreeOwner {
        &self.owner
    }

    fn add_to_scene(&self, context: &mut SceneContext) {
        let Some(tree) = self.owner.load() else {
            return;
        };
        let Some(mut branch) = draw_tile_tree(&tree, context, None) else {
            return;
        };

        if let Some(key) = &self.animation_key {
            branch = branch.with_animation_key(key.clone());
        }
        let branch = branch.with_imodel(self.imodel_key.clone());
        context.with_graphic_type(self.graphic_type(), |ctx| ctx.output_graphic(RenderGraphic::branch(branch)));
    }
}

// ============================================================================
// Background map
// ============================================================================

#[derive(Debug, Clone)]
pub struct BackgroundMapReference {
    owner: TileTreeOwner,
}

impl BackgroundMapReference {
    pub fn new(session: &IModelSession, provider: impl Into<String>, terrain: bool) -> Self {
        let id = TileTreeId::BackgroundMap {
            provider: provider.into(),
            terrain,
        };
        Self {
            owner: session.tile_tree_owner(id, session.primary_supplier()),
        }
    }
}

impl TileTreeReference for BackgroundMapReference {
    fn owner(&self) -> &TileTreeOwner {
        &self.owner
    }

    fn graphic_type(&self) -> GraphicType {
        GraphicType::BackgroundMap
    }

    fn add_to_scene(&self, context: &mut SceneContext) {
        let Some(tree) = self.owner.load() else {
            return;
        };
        context.with_graphic_type(GraphicType::BackgroundMap, |ctx| {
            if let Some(branch) = draw_tile_tree(&tree, ctx, None) {
                ctx.output_graphic(RenderGraphic::branch(branch));
            }
        });
    }
}

// ============================================================================
// Reality models
// ============================================================================

/// A reality mesh, optionally classified by a model and draped with the map.
#[derive(Debug, Clone)]
pub struct RealityModelReference {
    owner: TileTreeOwner,
    model_id: Option<ModelId>,
    classifier: Option<(ModelId, TileTreeOwner)>,
    drape: Option<TileTreeOwner>,
}

impl RealityModelReference {
    pub fn new(session: &IModelSession, url: impl Into<String>, model_id: Option<ModelId>) -> Self {
        let id = TileTreeId::RealityModel {
            url: url.into(),
            model_id,
        };
        Self {
            owner: session.tile_tree_owner(id, session.primary_supplier()),
            model_id,
            classifier: None,
            drape: None,
        }
    }

    /// Classifies the mesh by the geometry of `classifier_model`.
    pub fn with_classifier(mut self, session: &IModelSession, classifier_model: ModelId) -> Self {
        let id = TileTreeId::Classifier {
            model_id: classifier_model,
            batch_type: BatchType::PlanarClassifier,
        };
        let owner = session.tile_tree_owner(id, session.primary_supplier());
        self.classifier = Some((classifier_model, owner));
        self
    }

    /// Drapes the background map over the mesh. Needs a model id to key the
    /// drape by.
    pub fn with_map_drape(mut self, map: &BackgroundMapReference) -> Self {
        self.drape = Some(map.owner().clone());
        self
    }

    pub fn classifier_model(&self) -> Option<ModelId> {
        self.classifier.as_ref().map(|(id, _)| *id)
    }
}

impl TileTreeReference for RealityModelReference {
    fn owner(&self) -> &TileTreeOwner {
        &self.owner
    }

    fn add_to_scene(&self, context: &mut SceneContext) {
        let Some(tree) = self.owner.load() else {
            return;
        };

        let classifier = self.classifier.as_ref().and_then(|(model_id, owner)| {
            let model_id = *model_id;
            context.get_or_create_planar_classifier(model_id, |ctx| {
                let tree = owner.load()?;
                let branch = draw_tile_tree(&tree, ctx, None)?;
                ctx.system()
                    .create_planar_classifier(model_id, vec![RenderGraphic::branch(branch)])
            })
        });

        let drape = match (self.model_id, &self.drape) {
            (Some(model_id), Some(map)) => context.get_or_create_texture_drape(model_id, |ctx| {
                let tree = map.load()?;
                let branch = draw_tile_tree(&tree, ctx, None)?;
                ctx.system().create_texture_drape(model_id, vec![RenderGraphic::branch(branch)])
            }),
            _ => None,
        };

        let Some(branch) = draw_tile_tree(&tree, context, None) else {
            return;
        };
        let branch = branch.with_planar_classifier(classifier).with_texture_drape(drape);
        context.with_graphic_type(self.graphic_type(), |ctx| ctx.output_graphic(RenderGraphic::branch(branch)));
    }
}
