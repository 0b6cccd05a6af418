use std::sync::Arc;

use cgmath::{Matrix4, SquareMatrix};

use super::graphic::{GraphicBranch, RenderPlanarClassifier, TextureDrape};
use crate::common::ClipVector;
use crate::error::RenderError;
use crate::scene::schedule::AnimationBranchState;
use crate::scene::{FeatureOverrides, ViewFlags};

/// Accumulated state for the graphics under one branch.
///
/// `transform` maps branch-local coordinates to world; `clip` is in world
/// coordinates so nested clips combine without re-transforming.
#[derive(Debug, Clone)]
pub struct BranchState {
    pub transform: Matrix4<f64>,
    pub view_flags: ViewFlags,
    pub symbology_overrides: Option<Arc<FeatureOverrides>>,
    pub clip: Option<ClipVector>,
    pub planar_classifier: Option<RenderPlanarClassifier>,
    pub texture_drape: Option<TextureDrape>,
    pub imodel: Option<String>,
}

impl BranchState {
    pub fn root(view_flags: ViewFlags, symbology_overrides: Option<Arc<FeatureOverrides>>) -> Self {
        Self {
            transform: Matrix4::identity(),
            view_flags,
            symbology_overrides,
            clip: None,
            planar_classifier: None,
            texture_drape: None,
            imodel: None,
        }
    }

    pub fn with_clip(mut self, clip: Option<ClipVector>) -> Self {
        self.clip = clip;
        self
    }

    /// State for `branch` drawn beneath `self`, with an optional animation
    /// transform and clip applied in the parent's coordinates.
    pub fn push(&self, branch: &GraphicBranch, animation: Option<&AnimationBranchState>) -> Self {
        let parent_transform = match animation.and_then(|a| a.transform) {
            Some(animated) => self.transform * animated,
            None => self.transform,
        };
        let transform = parent_transform * branch.transform;

        let mut clip = self.clip.clone();
        if let Some(local) = &branch.clip {
            clip = Some(combine_clips(clip, local.transform(&transform)));
        }
        if let Some(animated) = animation.and_then(|a| a.clip.as_ref()) {
            clip = Some(combine_clips(clip, animated.transform(&self.transform)));
        }

        Self {
            transform,
            view_flags: branch.view_flag_overrides.apply(self.view_flags),
            symbology_overrides: branch
                .symbology_overrides
                .clone()
                .or_else(|| self.symbology_overrides.clone()),
            clip,
            planar_classifier: branch
                .planar_classifier
                .clone()
                .or_else(|| self.planar_classifier.clone()),
            texture_drape: branch.texture_drape.clone().or_else(|| self.texture_drape.clone()),
            imodel: branch.imodel.clone().or_else(|| self.imodel.clone()),
        }
    }
}

fn combine_clips(existing: Option<ClipVector>, added: ClipVector) -> ClipVector {
    match existing {
        Some(existing) => existing.intersect(&added),
        None => added,
    }
}

/// Stack of branch states. The root state is never popped.
#[derive(Debug, Clone)]
pub struct BranchStack {
    root: BranchState,
    stack: Vec<BranchState>,
}

impl BranchStack {
    pub fn new(root: BranchState) -> Self {
        Self {
            root,
            stack: Vec::new(),
        }
    }

    pub fn top(&self) -> &BranchState {
        self.stack.last().unwrap_or(&self.root)
    }

    pub fn bottom(&self) -> &BranchState {
        &self.root
    }

    /// Number of states, including the root.
    pub fn len(&self) -> usize {
        self.stack.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn push_branch(&mut self, branch: &GraphicBranch, animation: Option<&AnimationBranchState>) {
        let state = self.top().push(branch, animation);
        self.stack.push(state);
    }

    pub fn push_state(&mut self, state: BranchState) {
        self.stack.push(state);
    }

    pub fn pop(&mut self) -> Result<BranchState, RenderError> {
        self.stack.pop().ok_or(RenderError::BranchStackUnderflow)
    }

    /// Replaces the root view flags and overrides. Only valid between
    /// traversals, while nothing has been pushed.
    pub fn change_render_plan(
        &mut self,
        view_flags: ViewFlags,
        symbology_overrides: Option<Arc<FeatureOverrides>>,
    ) -> Result<(), RenderError> {
        if !self.stack.is_empty() {
            return Err(RenderError::BranchStackUnderflow);
        }
        self.root.view_flags = view_flags;
        self.root.symbology_overrides = symbology_overrides;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::ViewFlagOverrides;
    use cgmath::{Point3, Transform, Vector3};

    fn translation(x: f64, y: f64, z: f64) -> Matrix4<f64> {
        Matrix4::from_translation(Vector3::new(x, y, z))
    }

    #[test]
    fn test_root_is_never_popped() {
        let mut stack = BranchStack::new(BranchState::root(ViewFlags::default(), None));
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.pop().unwrap_err(), RenderError::BranchStackUnderflow);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_transforms_compose_parent_first() {
        let mut stack = BranchStack::new(BranchState::root(ViewFlags::default(), None));
        stack.push_branch(&GraphicBranch::new(Vec::new()).with_transform(translation(10.0, 0.0, 0.0)), None);
        stack.push_branch(
            &GraphicBranch::new(Vec::new()).with_transform(Matrix4::from_scale(2.0)),
            None,
        );

        let p = stack.top().transform.transform_point(Point3::new(1.0, 0.0, 0.0));
        assert_eq!(p, Point3::new(12.0, 0.0, 0.0));

        stack.pop().unwrap();
        let p = stack.top().transform.transform_point(Point3::new(1.0, 0.0, 0.0));
        assert_eq!(p, Point3::new(11.0, 0.0, 0.0));
    }

    #[test]
    fn test_view_flag_overrides_inherit() {
        let mut stack = BranchStack::new(BranchState::root(ViewFlags::default(), None));
        let overrides = ViewFlagOverrides::new().with(ViewFlags::LIGHTING, false);
        stack.push_branch(&GraphicBranch::new(Vec::new()).with_view_flag_overrides(overrides), None);
        stack.push_branch(&GraphicBranch::new(Vec::new()), None);

        assert!(!stack.top().view_flags.contains(ViewFlags::LIGHTING));
        assert!(stack.top().view_flags.contains(ViewFlags::TRANSPARENCY));
        assert!(stack.bottom().view_flags.contains(ViewFlags::LIGHTING));
    }

    #[test]
    fn test_plain_branch_keeps_inherited_flags() {
        let style_flags = ViewFlags::default() - ViewFlags::LIGHTING;
        let mut stack = BranchStack::new(BranchState::root(style_flags, None));
        stack.push_branch(&GraphicBranch::new(Vec::new()), None);

        assert_eq!(stack.top().view_flags, style_flags);
    }

    #[test]
    fn test_symbology_overrides_replace_or_inherit() {
        let root_overrides = Arc::new(FeatureOverrides::new());
        let mut stack = BranchStack::new(BranchState::root(ViewFlags::default(), Some(root_overrides.clone())));
        stack.push_branch(&GraphicBranch::new(Vec::new()), None);
        assert!(Arc::ptr_eq(stack.top().symbology_overrides.as_ref().unwrap(), &root_overrides));

        let branch_overrides = Arc::new(FeatureOverrides::new());
        stack.push_branch(
            &GraphicBranch::new(Vec::new()).with_symbology_overrides(branch_overrides.clone()),
            None,
        );
        assert!(Arc::ptr_eq(stack.top().symbology_overrides.as_ref().unwrap(), &branch_overrides));
    }

    #[test]
    fn test_local_clip_moves_with_branch_transform() {
        let mut stack = BranchStack::new(BranchState::root(ViewFlags::default(), None));
        // Keep x >= 0 in branch coordinates
        let clip = ClipVector::from_plane(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
        stack.push_branch(
            &GraphicBranch::new(Vec::new())
                .with_transform(translation(100.0, 0.0, 0.0))
                .with_clip(Some(clip.clone())),
            None,
        );

        let world_clip = stack.top().clip.as_ref().unwrap();
        assert_eq!(
            world_clip.contains_point(Point3::new(101.0, 0.0, 0.0)),
            clip.contains_point(Point3::new(1.0, 0.0, 0.0))
        );
        assert_eq!(
            world_clip.contains_point(Point3::new(99.0, 0.0, 0.0)),
            clip.contains_point(Point3::new(-1.0, 0.0, 0.0))
        );
    }

    #[test]
    fn test_animation_transform_applies_in_parent_space() {
        let mut stack = BranchStack::new(BranchState::root(ViewFlags::default(), None));
        let animation = AnimationBranchState {
            transform: Some(translation(0.0, 5.0, 0.0)),
            ..Default::default()
        };
        stack.push_branch(
            &GraphicBranch::new(Vec::new()).with_transform(Matrix4::from_scale(2.0)),
            Some(&animation),
        );

        let p = stack.top().transform.transform_point(Point3::new(1.0, 1.0, 0.0));
        assert_eq!(p, Point3::new(2.0, 7.0, 0.0));
    }

    #[test]
    fn test_change_render_plan_requires_only_root() {
        let mut stack = BranchStack::new(BranchState::root(ViewFlags::default(), None));
        stack.change_render_plan(ViewFlags::empty(), None).unwrap();
        assert_eq!(stack.top().view_flags, ViewFlags::empty());

        stack.push_branch(&GraphicBranch::new(Vec::new()), None);
        assert!(stack.change_render_plan(ViewFlags::default(), None).is_err());
    }
}
