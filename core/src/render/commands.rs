use std::sync::Arc;

use cgmath::Matrix4;

use super::batch::BatchState;
use super::branch::{BranchStack, BranchState};
use super::graphic::{
    Batch, GraphicBranch, GraphicPrimitive, RenderClipVolume, RenderGraphic, RenderPlanarClassifier,
    TextureDrape,
};
use super::system::{RenderPlan, RenderSystem};
use crate::context::{Decorations, SceneGraphics};
use crate::scene::schedule::AnimationBranchStates;
use crate::scene::{FeatureOverrides, ViewFlags};

/// Uniform block uploaded per draw.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BranchUniforms {
    pub transform: [[f32; 4]; 4],
    pub batch_id: u32,
    pub view_flags: u32,
    pub has_clip: u32,
    pub has_classifier: u32,
}

/// One primitive with everything needed to draw it.
#[derive(Debug, Clone)]
pub struct DrawCommand {
    pub primitive: GraphicPrimitive,
    /// Primitive to world
    pub transform: Matrix4<f64>,
    pub view_flags: ViewFlags,
    pub clip: Option<RenderClipVolume>,
    pub symbology_overrides: Option<Arc<FeatureOverrides>>,
    pub planar_classifier: Option<RenderPlanarClassifier>,
    pub texture_drape: Option<TextureDrape>,
    /// First feature id of the enclosing batch, 0 for none
    pub batch_id: u32,
    pub imodel: Option<String>,
}

impl DrawCommand {
    pub fn uniforms(&self) -> BranchUniforms {
        let columns: [[f64; 4]; 4] = self.transform.into();
        BranchUniforms {
            transform: columns.map(|column| column.map(|v| v as f32)),
            batch_id: self.batch_id,
            view_flags: self.view_flags.bits(),
            has_clip: self.clip.is_some() as u32,
            has_classifier: self.planar_classifier.is_some() as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPass {
    BackgroundMap,
    Scene,
    Overlay,
    Decorations,
}

/// A finished frame, ready for a [`RenderTarget`](super::RenderTarget).
#[derive(Debug, Clone)]
pub struct Frame {
    pub plan: RenderPlan,
    pub background_map: Vec<DrawCommand>,
    pub scene: Vec<DrawCommand>,
    pub overlay: Vec<DrawCommand>,
    pub decorations: Vec<DrawCommand>,
}

impl Frame {
    pub fn pass(&self, pass: RenderPass) -> &[DrawCommand] {
        match pass {
            RenderPass::BackgroundMap => &self.background_map,
            RenderPass::Scene => &self.scene,
            RenderPass::Overlay => &self.overlay,
            RenderPass::Decorations => &self.decorations,
        }
    }

    /// All commands in draw order.
    pub fn commands(&self) -> impl Iterator<Item = &DrawCommand> {
        self.background_map
            .iter()
            .chain(self.scene.iter())
            .chain(self.overlay.iter())
            .chain(self.decorations.iter())
    }

    pub fn command_count(&self) -> usize {
        self.background_map.len() + self.scene.len() + self.overlay.len() + self.decorations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.command_count() == 0
    }
}

/// Flattens graphic trees into draw commands.
///
/// Walks branches with a [`BranchStack`] and batches with a [`BatchState`].
/// Branches whose animation state says `omit` are skipped with everything
/// under them.
pub struct RenderCommands<'a> {
    system: &'a dyn RenderSystem,
    animation: Option<&'a AnimationBranchStates>,
    branches: BranchStack,
    /// Clip volume in effect at each stack level, root first
    clip_volumes: Vec<Option<RenderClipVolume>>,
    batches: BatchState,
    commands: Vec<DrawCommand>,
    omitted_branches: usize,
}

impl<'a> RenderCommands<'a> {
    pub fn new(
        system: &'a dyn RenderSystem,
        root: BranchState,
        animation: Option<&'a AnimationBranchStates>,
    ) -> Self {
        let root_clip = root.clip.as_ref().and_then(|clip| system.create_clip_volume(clip));
        Self {
            system,
            animation,
            branches: BranchStack::new(root),
            clip_volumes: vec![root_clip],
            batches: BatchState::new(),
            commands: Vec::new(),
            omitted_branches: 0,
        }
    }

    /// Compiles `graphics` and returns their commands in traversal order.
    pub fn add_graphics(&mut self, graphics: &[RenderGraphic]) -> Vec<DrawCommand> {
        for graphic in graphics {
            self.add_graphic(graphic);
        }
        std::mem::take(&mut self.commands)
    }

    pub fn omitted_branches(&self) -> usize {
        self.omitted_branches
    }

    /// Ends compilation, keeping the batch ids for picking.
    pub fn finish(self) -> BatchState {
        self.batches
    }

    fn add_graphic(&mut self, graphic: &RenderGraphic) {
        match graphic {
            RenderGraphic::Primitive(primitive) => self.add_primitive(primitive),
            RenderGraphic::List(list) => {
                for entry in list {
                    self.add_graphic(entry);
                }
            }
            RenderGraphic::Branch(branch) => self.add_branch(branch),
            RenderGraphic::Batch(batch) => self.add_batch(batch),
        }
    }

    fn add_branch(&mut self, branch: &GraphicBranch) {
        let states = self.animation;
        let animation = branch
            .animation_key
            .as_deref()
            .and_then(|key| states.and_then(|s| s.get(key)));

        if animation.is_some_and(|a| a.omit) {
            self.omitted_branches += 1;
            return;
        }
        if branch.is_empty() {
            return;
        }

        self.branches.push_branch(branch, animation);
        let clip_changed = branch.clip.is_some() || animation.is_some_and(|a| a.clip.is_some());
        let volume = if clip_changed {
            self.branches
                .top()
                .clip
                .as_ref()
                .and_then(|clip| self.system.create_clip_volume(clip))
        } else {
            self.clip_volumes.last().cloned().flatten()
        };
        self.clip_volumes.push(volume);

        for entry in &branch.entries {
            self.add_graphic(entry);
        }

        self.clip_volumes.pop();
        if let Err(err) = self.branches.pop() {
            log::error!("Unbalanced branch traversal: {}", err);
        }
    }

    fn add_batch(&mut self, batch: &Batch) {
        match self.batches.push(batch, true) {
            Ok(_) => {
                self.add_graphic(&batch.graphic);
                self.batches.pop();
            }
            // Drawn under the enclosing batch's id
            Err(err) => {
                log::warn!("Batch {}: {}", batch.uid(), err);
                self.add_graphic(&batch.graphic);
            }
        }
    }

    fn add_primitive(&mut self, primitive: &GraphicPrimitive) {
        let state = self.branches.top();
        self.commands.push(DrawCommand {
            primitive: primitive.clone(),
            transform: state.transform,
            view_flags: state.view_flags,
            clip: self.clip_volumes.last().cloned().flatten(),
            symbology_overrides: state.symbology_overrides.clone(),
            planar_classifier: state.planar_classifier.clone(),
            texture_drape: state.texture_drape.clone(),
            batch_id: self.batches.current_batch_id(),
            imodel: state.imodel.clone(),
        });
    }
}

/// Compiles a frame's scene graphics and decorations into per-pass commands.
pub fn compile_frame(
    system: &dyn RenderSystem,
    plan: RenderPlan,
    root: BranchState,
    animation: Option<&AnimationBranchStates>,
    graphics: &SceneGraphics,
    decorations: &Decorations,
) -> (Frame, BatchState) {
    let mut commands = RenderCommands::new(system, root, animation);

    let background_map = commands.add_graphics(&graphics.background_map);
    let scene = commands.add_graphics(&graphics.foreground);
    let overlay = commands.add_graphics(&graphics.overlay);

    let mut decoration_commands = commands.add_graphics(&decorations.world);
    decoration_commands.extend(commands.add_graphics(&decorations.world_overlay));
    decoration_commands.extend(commands.add_graphics(&decorations.view_overlay));

    if commands.omitted_branches() > 0 {
        log::trace!("Omitted {} animated branches", commands.omitted_branches());
    }

    let frame = Frame {
        plan,
        background_map,
        scene,
        overlay,
        decorations: decoration_commands,
    };
    (frame, commands.finish())
}
