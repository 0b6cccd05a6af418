use std::collections::HashMap;

use cgmath::Matrix4;

use tileview_common::ClipVector;

use super::props::{ElementTimelineProps, ModelTimelineProps};
use super::timeline::Timeline;
use crate::format::FormatError;
use crate::ids::{ElementId, ModelId};
use crate::symbology::{FeatureAppearance, FeatureOverrides};

/// Branch key for a whole model.
pub fn model_branch_key(model_id: ModelId) -> String {
    model_id.to_string()
}

/// Branch key for one animation node within a model.
pub fn element_branch_key(model_id: ModelId, batch_id: u32) -> String {
    format!("{}_Node_{}", model_id, batch_id)
}

/// Per-frame animation state for one branch of the scene graph.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnimationBranchState {
    pub transform: Option<Matrix4<f64>>,
    pub clip: Option<ClipVector>,
    /// Skip the branch entirely. Distinct from full transparency.
    pub omit: bool,
}

impl AnimationBranchState {
    pub fn omitted() -> Self {
        Self {
            omit: true,
            ..Default::default()
        }
    }
}

/// Animation states keyed by branch key, evaluated for one time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnimationBranchStates {
    states: HashMap<String, AnimationBranchState>,
}

impl AnimationBranchStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&AnimationBranchState> {
        self.states.get(key)
    }

    pub fn insert(&mut self, key: String, state: AnimationBranchState) {
        self.states.insert(key, state);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AnimationBranchState)> {
        self.states.iter()
    }
}

/// Converts a visibility percentage into the transparency it implies, if any.
fn transparency_for_visibility(visibility: f64) -> Option<f32> {
    if visibility > 0.0 && visibility < 100.0 {
        Some((1.0 - visibility / 100.0) as f32)
    } else {
        None
    }
}

/// Evaluates a timeline's branch state; `None` when it contributes nothing.
fn branch_state(timeline: &Timeline, time: f64) -> Option<AnimationBranchState> {
    if timeline.visibility_at(time).is_some_and(|v| v <= 0.0) {
        return Some(AnimationBranchState::omitted());
    }

    let transform = timeline.transform_at(time);
    let clip = timeline.clip_at(time);
    if transform.is_none() && clip.is_none() {
        return None;
    }

    Some(AnimationBranchState {
        transform,
        clip,
        omit: false,
    })
}

// ============================================================================
// Element timelines
// ============================================================================

/// Animation applied to a group of elements within one model.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementTimeline {
    /// Animation node id; 0 when the group needs no node of its own
    pub batch_id: u32,
    pub element_ids: Vec<ElementId>,
    pub timeline: Timeline,
}

impl ElementTimeline {
    fn from_props(props: &ElementTimelineProps, batch_id: u32) -> Self {
        Self {
            batch_id,
            element_ids: props.element_ids.clone(),
            timeline: Timeline::from_props(&props.timeline),
        }
    }

    /// Transforms, clips and visibility are applied per branch, so these
    /// elements must be split into their own animation node.
    pub fn requires_batching(&self) -> bool {
        self.timeline.has_transform()
            || self.timeline.has_cutting_plane()
            || self.timeline.has_visibility()
    }

    fn add_symbology_overrides(&self, overrides: &mut FeatureOverrides, time: f64) {
        let visibility = self.timeline.visibility_at(time);
        if visibility.is_some_and(|v| v <= 0.0) {
            // Nodes are omitted through the branch map instead
            if self.batch_id == 0 {
                for id in &self.element_ids {
                    overrides.set_never_drawn(*id);
                }
            }
            return;
        }

        let appearance = FeatureAppearance {
            rgb: self.timeline.color_at(time),
            transparency: visibility.and_then(transparency_for_visibility),
            ..Default::default()
        };
        if appearance.overrides_anything() {
            for id in &self.element_ids {
                overrides.override_element(*id, appearance, false);
            }
        }
    }
}

// ============================================================================
// Model timelines
// ============================================================================

/// Animation for one model: its own timeline plus per-element timelines.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTimeline {
    pub model_id: ModelId,
    pub reality_model_url: Option<String>,
    pub timeline: Timeline,
    element_timelines: Vec<ElementTimeline>,
    contains_model_animation: bool,
    contains_element_animation: bool,
    contains_feature_overrides: bool,
}

impl ModelTimeline {
    pub fn from_props(props: &ModelTimelineProps) -> Self {
        // Nodes without a persisted id are numbered after the highest persisted one
        let mut next_batch_id = props
            .element_timelines
            .iter()
            .map(|e| e.batch_id)
            .max()
            .unwrap_or(0)
            + 1;

        let element_timelines: Vec<ElementTimeline> = props
            .element_timelines
            .iter()
            .map(|e| {
                let mut element = ElementTimeline::from_props(e, e.batch_id);
                if element.batch_id == 0 && element.requires_batching() {
                    element.batch_id = next_batch_id;
                    next_batch_id += 1;
                }
                element
            })
            .collect();

        let timeline = Timeline::from_props(&props.timeline);
        let contains_model_animation =
            timeline.has_transform() || timeline.has_cutting_plane() || timeline.has_visibility();
        let contains_element_animation = element_timelines
            .iter()
            .any(|e| e.batch_id != 0 && e.requires_batching());
        let contains_feature_overrides = timeline.has_color()
            || timeline.has_visibility()
            || element_timelines
                .iter()
                .any(|e| e.timeline.has_color() || e.timeline.has_visibility());

        Self {
            model_id: props.model_id,
            reality_model_url: props.reality_model_url.clone(),
            timeline,
            element_timelines,
            contains_model_animation,
            contains_element_animation,
            contains_feature_overrides,
        }
    }

    pub fn element_timelines(&self) -> &[ElementTimeline] {
        &self.element_timelines
    }

    pub fn contains_model_animation(&self) -> bool {
        self.contains_model_animation
    }

    pub fn contains_element_animation(&self) -> bool {
        self.contains_element_animation
    }

    pub fn contains_feature_overrides(&self) -> bool {
        self.contains_feature_overrides
    }

    /// Animation node ids used by this model's element timelines.
    pub fn batch_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.element_timelines
            .iter()
            .map(|e| e.batch_id)
            .filter(|id| *id != 0)
    }

    pub fn duration(&self) -> Option<(f64, f64)> {
        std::iter::once(&self.timeline)
            .chain(self.element_timelines.iter().map(|e| &e.timeline))
            .filter_map(Timeline::duration)
            .reduce(|(a0, a1), (b0, b1)| (a0.min(b0), a1.max(b1)))
    }

    pub fn add_animation_branches(&self, branches: &mut AnimationBranchStates, time: f64) {
        if self.contains_model_animation {
            if let Some(state) = branch_state(&self.timeline, time) {
                branches.insert(model_branch_key(self.model_id), state);
            }
        }

        if self.contains_element_animation {
            for element in self.element_timelines.iter().filter(|e| e.batch_id != 0) {
                if let Some(state) = branch_state(&element.timeline, time) {
                    branches.insert(element_branch_key(self.model_id, element.batch_id), state);
                }
            }
        }
    }

    pub fn add_symbology_overrides(&self, overrides: &mut FeatureOverrides, time: f64) {
        if !self.contains_feature_overrides {
            return;
        }

        let visibility = self.timeline.visibility_at(time);
        let appearance = FeatureAppearance {
            rgb: self.timeline.color_at(time),
            transparency: visibility.and_then(transparency_for_visibility),
            ..Default::default()
        };
        if appearance.overrides_anything() {
            overrides.override_model(self.model_id, appearance, false);
        }

        for element in &self.element_timelines {
            element.add_symbology_overrides(overrides, time);
        }
    }
}

// ============================================================================
// Script
// ============================================================================

/// A complete schedule script: one timeline per animated model.
///
/// Immutable once built; a display style replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    model_timelines: Vec<ModelTimeline>,
    contains_model_animation: bool,
    contains_element_animation: bool,
    contains_feature_overrides: bool,
}

impl Script {
    pub fn from_props(props: &[ModelTimelineProps]) -> Self {
        let model_timelines: Vec<ModelTimeline> = props.iter().map(ModelTimeline::from_props).collect();

        Self {
            contains_model_animation: model_timelines.iter().any(|m| m.contains_model_animation),
            contains_element_animation: model_timelines.iter().any(|m| m.contains_element_animation),
            contains_feature_overrides: model_timelines.iter().any(|m| m.contains_feature_overrides),
            model_timelines,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, FormatError> {
        let props: Vec<ModelTimelineProps> = serde_json::from_str(json)?;
        Ok(Self::from_props(&props))
    }

    pub fn model_timelines(&self) -> &[ModelTimeline] {
        &self.model_timelines
    }

    pub fn find(&self, model_id: ModelId) -> Option<&ModelTimeline> {
        self.model_timelines.iter().find(|m| m.model_id == model_id)
    }

    pub fn contains_model_animation(&self) -> bool {
        self.contains_model_animation
    }

    pub fn contains_element_animation(&self) -> bool {
        self.contains_element_animation
    }

    pub fn contains_feature_overrides(&self) -> bool {
        self.contains_feature_overrides
    }

    /// True if any branch may carry a transform, clip or omission.
    pub fn contains_animation(&self) -> bool {
        self.contains_model_animation || self.contains_element_animation
    }

    /// Earliest and latest keyframe times in the whole script.
    pub fn duration(&self) -> Option<(f64, f64)> {
        self.model_timelines
            .iter()
            .filter_map(ModelTimeline::duration)
            .reduce(|(a0, a1), (b0, b1)| (a0.min(b0), a1.max(b1)))
    }

    /// Merges every model's branch states at `time` into one map.
    pub fn animation_branches(&self, time: f64) -> AnimationBranchStates {
        let mut branches = AnimationBranchStates::new();
        if !self.contains_animation() {
            return branches;
        }

        for model in &self.model_timelines {
            model.add_animation_branches(&mut branches, time);
        }
        branches
    }

    pub fn add_symbology_overrides(&self, overrides: &mut FeatureOverrides, time: f64) {
        if !self.contains_feature_overrides {
            return;
        }

        for model in &self.model_timelines {
            model.add_symbology_overrides(overrides, time);
        }
    }
}
