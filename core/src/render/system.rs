use cgmath::Matrix4;
use image::RgbaImage;

use super::commands::Frame;
use super::graphic::{
    Polyface, RenderClipVolume, RenderGraphic, RenderPlanarClassifier, RenderTexture, TextureDrape,
};
use crate::common::{ClipVector, RgbaColor};
use crate::scene::{ModelId, ViewFlags};

/// Factory for GPU-backed resources.
///
/// Every method returns an opaque handle, or `None` when the backend cannot
/// produce one. Callers treat `None` as "nothing to draw".
pub trait RenderSystem {
    fn create_polyface(&self, polyface: &Polyface, texture: Option<&RenderTexture>) -> Option<RenderGraphic>;

    fn create_texture(&self, image: &RgbaImage) -> Option<RenderTexture>;

    fn create_clip_volume(&self, clip: &ClipVector) -> Option<RenderClipVolume>;

    fn create_planar_classifier(
        &self,
        model_id: ModelId,
        graphics: Vec<RenderGraphic>,
    ) -> Option<RenderPlanarClassifier>;

    fn create_texture_drape(&self, model_id: ModelId, graphics: Vec<RenderGraphic>) -> Option<TextureDrape>;

    fn create_offscreen_target(&self, width: u32, height: u32) -> Box<dyn RenderTarget>;
}

/// Consumes finished frames and performs the actual draw.
pub trait RenderTarget {
    fn size(&self) -> (u32, u32);

    fn render_frame(&mut self, frame: &Frame);

    /// The last rendered image, if the target can read it back.
    fn read_image(&mut self) -> Option<RgbaImage>;

    /// Batch feature id drawn at pixel `(x, y)` (y down), 0 or `None` for none.
    fn read_feature_id(&mut self, x: u32, y: u32) -> Option<u32>;
}

/// Normalized sub-rectangle of the view to render, used by attachment tiles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubRect {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

/// Per-frame parameters for a target.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    pub view_projection: Matrix4<f64>,
    pub width: u32,
    pub height: u32,
    pub sub_rect: Option<SubRect>,
    pub view_flags: ViewFlags,
    pub background: RgbaColor,
    pub animation_time: Option<f64>,
}

impl RenderPlan {
    pub fn aspect(&self) -> f64 {
        self.width.max(1) as f64 / self.height.max(1) as f64
    }
}
