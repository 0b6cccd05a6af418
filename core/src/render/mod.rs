//! Render graphics, the render-system interfaces, and the per-frame
//! scene-graph state machine that turns graphic trees into draw commands.

mod batch;
mod branch;
mod commands;
mod graphic;
mod system;

pub use batch::{BatchState, FeatureLookup};
pub use branch::{BranchStack, BranchState};
pub use commands::{compile_frame, BranchUniforms, DrawCommand, Frame, RenderCommands, RenderPass};
pub use graphic::{
    Batch, GpuHandle, GraphicBranch, GraphicPrimitive, Polyface, RenderClipVolume, RenderGraphic,
    RenderPlanarClassifier, RenderTexture, TextureDrape,
};
pub use system::{RenderPlan, RenderSystem, RenderTarget, SubRect};
