//! Display styles and the views that draw models through them.

use std::sync::Arc;

use crate::attachments::SheetViewState;
use crate::camera::Camera;
use crate::common::{Aabb, ClipVector, RgbaColor};
use crate::context::SceneContext;
use crate::imodel::IModelSession;
use crate::scene::schedule::{AnimationBranchStates, ModelTimelineProps, Script};
use crate::scene::{
    ContextRealityModelProps, DisplayStyleProps, FeatureOverrides, FormatError, Id64, ModelId, ViewFlags,
};
use crate::tile::{BackgroundMapReference, PrimaryTreeReference, RealityModelReference, TileTreeReference};

const DEFAULT_BACKGROUND: RgbaColor = RgbaColor::new(0.0, 0.0, 0.0, 1.0);

/// A parsed display style: view flags, background, and the schedule script
/// that animates the models it displays.
#[derive(Debug, Clone)]
pub struct DisplayStyleState {
    props: DisplayStyleProps,
    view_flags: ViewFlags,
    script: Option<Arc<Script>>,
}

impl DisplayStyleState {
    pub fn new(props: DisplayStyleProps) -> Self {
        let view_flags = props.settings().view_flags.to_view_flags();
        let script = props
            .settings()
            .schedule_script
            .as_deref()
            .map(|timelines| Arc::new(Script::from_props(timelines)));

        Self {
            props,
            view_flags,
            script,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, FormatError> {
        Ok(Self::new(DisplayStyleProps::from_json(json)?))
    }

    pub fn props(&self) -> &DisplayStyleProps {
        &self.props
    }

    pub fn id(&self) -> Option<Id64> {
        self.props.id
    }

    pub fn view_flags(&self) -> ViewFlags {
        self.view_flags
    }

    pub fn set_view_flags(&mut self, view_flags: ViewFlags) {
        self.view_flags = view_flags;
    }

    pub fn background_color(&self) -> RgbaColor {
        self.props
            .settings()
            .background_color
            .map(RgbaColor::from_tbgr)
            .unwrap_or(DEFAULT_BACKGROUND)
    }

    pub fn schedule_script(&self) -> Option<&Script> {
        self.script.as_deref()
    }

    /// Replaces the schedule script as a whole. Scripts are never edited in
    /// place; views pick up the new one on their next frame.
    pub fn set_schedule_script(&mut self, timelines: Option<Vec<ModelTimelineProps>>) {
        self.script = timelines
            .as_deref()
            .map(|timelines| Arc::new(Script::from_props(timelines)));
        self.props.json_properties.styles.schedule_script = timelines;
    }

    /// Provider of the background map, when the map is turned on.
    pub fn background_map_provider(&self) -> Option<String> {
        if !self.view_flags.contains(ViewFlags::BACKGROUND_MAP) {
            return None;
        }
        let provider = self
            .props
            .settings()
            .background_map
            .as_ref()
            .and_then(|map| map.get("providerName"))
            .and_then(|name| name.as_str())
            .unwrap_or("BingProvider");
        Some(provider.to_string())
    }

    pub fn context_reality_models(&self) -> &[ContextRealityModelProps] {
        &self.props.settings().context_reality_models
    }

    /// Feature overrides implied by the schedule at `time`; `None` when there
    /// is nothing to override.
    pub fn symbology_overrides(&self, time: Option<f64>) -> Option<Arc<FeatureOverrides>> {
        let (script, time) = (self.script.as_ref()?, time?);
        let mut overrides = FeatureOverrides::new();
        script.add_symbology_overrides(&mut overrides, time);
        (!overrides.is_empty()).then(|| Arc::new(overrides))
    }

    /// Animation branch states at `time`; `None` when nothing is animated.
    pub fn animation_branches(&self, time: Option<f64>) -> Option<AnimationBranchStates> {
        let (script, time) = (self.script.as_ref()?, time?);
        let branches = script.animation_branches(time);
        (!branches.is_empty()).then_some(branches)
    }

    fn primary_references(&self, session: &IModelSession, models: &[ModelId], is_3d: bool) -> Vec<PrimaryTreeReference> {
        models
            .iter()
            .map(|model| PrimaryTreeReference::new(session, *model, is_3d, self.schedule_script(), self.id()))
            .collect()
    }
}

// ============================================================================
// Views
// ============================================================================

/// A 3d view of a set of spatial models.
#[derive(Debug, Clone)]
pub struct SpatialViewState {
    pub camera: Camera,
    pub style: DisplayStyleState,
    pub models: Vec<ModelId>,
    pub clip: Option<ClipVector>,
}

impl SpatialViewState {
    pub fn new(camera: Camera, style: DisplayStyleState, models: Vec<ModelId>) -> Self {
        Self {
            camera,
            style,
            models,
            clip: None,
        }
    }

    pub fn with_clip(mut self, clip: Option<ClipVector>) -> Self {
        self.clip = clip;
        self
    }

    /// References for everything the view draws: models, the background map,
    /// and the style's reality models.
    pub fn tile_tree_references(&self, session: &IModelSession) -> Vec<Box<dyn TileTreeReference>> {
        let mut references: Vec<Box<dyn TileTreeReference>> = self
            .style
            .primary_references(session, &self.models, true)
            .into_iter()
            .map(|r| Box::new(r) as Box<dyn TileTreeReference>)
            .collect();

        let map = self
            .style
            .background_map_provider()
            .map(|provider| BackgroundMapReference::new(session, provider, false));

        for reality in self.style.context_reality_models() {
            let mut reference = RealityModelReference::new(session, reality.tileset_url.clone(), None);
            if let Some(classifier) = reality.active_classifier() {
                reference = reference.with_classifier(session, classifier.model_id);
            }
            references.push(Box::new(reference));
        }

        if let Some(map) = map {
            references.push(Box::new(map));
        }
        references
    }

    pub fn create_scene(&self, session: &IModelSession, context: &mut SceneContext) {
        for reference in self.tile_tree_references(session) {
            reference.add_to_scene(context);
        }
    }
}

/// A 2d view of one drawing model.
#[derive(Debug, Clone)]
pub struct DrawingViewState {
    pub camera: Camera,
    pub style: DisplayStyleState,
    pub model: ModelId,
    /// Region of the drawing the view looks at
    pub extents: Aabb,
    pub clip: Option<ClipVector>,
}

impl DrawingViewState {
    pub fn new(style: DisplayStyleState, model: ModelId, extents: Aabb, aspect: f64) -> Self {
        Self {
            camera: Camera::top_down(&extents, aspect),
            style,
            model,
            extents,
            clip: None,
        }
    }

    pub fn tile_tree_references(&self, session: &IModelSession) -> Vec<Box<dyn TileTreeReference>> {
        self.style
            .primary_references(session, &[self.model], false)
            .into_iter()
            .map(|r| Box::new(r) as Box<dyn TileTreeReference>)
            .collect()
    }

    pub fn create_scene(&self, session: &IModelSession, context: &mut SceneContext) {
        for reference in self.tile_tree_references(session) {
            reference.add_to_scene(context);
        }
    }
}

/// Any view a viewport can display.
#[derive(Debug)]
pub enum ViewState {
    Spatial(SpatialViewState),
    Drawing(DrawingViewState),
    Sheet(SheetViewState),
}

impl ViewState {
    pub fn is_3d(&self) -> bool {
        matches!(self, ViewState::Spatial(_))
    }

    pub fn is_sheet(&self) -> bool {
        matches!(self, ViewState::Sheet(_))
    }

    pub fn as_spatial(&self) -> Option<&SpatialViewState> {
        match self {
            ViewState::Spatial(view) => Some(view),
            _ => None,
        }
    }

    pub fn as_drawing(&self) -> Option<&DrawingViewState> {
        match self {
            ViewState::Drawing(view) => Some(view),
            _ => None,
        }
    }

    pub fn as_sheet(&self) -> Option<&SheetViewState> {
        match self {
            ViewState::Sheet(view) => Some(view),
            _ => None,
        }
    }

    pub fn as_sheet_mut(&mut self) -> Option<&mut SheetViewState> {
        match self {
            ViewState::Sheet(view) => Some(view),
            _ => None,
        }
    }

    pub fn camera(&self) -> &Camera {
        match self {
            ViewState::Spatial(view) => &view.camera,
            ViewState::Drawing(view) => &view.camera,
            ViewState::Sheet(view) => view.camera(),
        }
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        match self {
            ViewState::Spatial(view) => &mut view.camera,
            ViewState::Drawing(view) => &mut view.camera,
            ViewState::Sheet(view) => view.camera_mut(),
        }
    }

    pub fn style(&self) -> &DisplayStyleState {
        match self {
            ViewState::Spatial(view) => &view.style,
            ViewState::Drawing(view) => &view.style,
            ViewState::Sheet(view) => view.style(),
        }
    }

    pub fn style_mut(&mut self) -> &mut DisplayStyleState {
        match self {
            ViewState::Spatial(view) => &mut view.style,
            ViewState::Drawing(view) => &mut view.style,
            ViewState::Sheet(view) => view.style_mut(),
        }
    }

    /// World-space clip applied to the whole view, if the view flags allow it.
    pub fn view_clip(&self) -> Option<&ClipVector> {
        if !self.style().view_flags().contains(ViewFlags::CLIP_VOLUME) {
            return None;
        }
        match self {
            ViewState::Spatial(view) => view.clip.as_ref(),
            ViewState::Drawing(view) => view.clip.as_ref(),
            ViewState::Sheet(_) => None,
        }
    }

    /// Adds everything the view draws to `context`.
    pub fn create_scene(&mut self, session: &IModelSession, context: &mut SceneContext) {
        match self {
            ViewState::Spatial(view) => view.create_scene(session, context),
            ViewState::Drawing(view) => view.create_scene(session, context),
            ViewState::Sheet(view) => view.create_scene(session, context),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::EPSILON;

    const STYLE: &str = r#"{
        "id": "0x30",
        "jsonProperties": {
            "styles": {
                "viewflags": { "backMap": true },
                "backgroundColor": 255,
                "backgroundMap": { "providerName": "MapBoxProvider" },
                "scheduleScript": [
                    {
                        "modelId": "0x1c",
                        "visibilityTimeline": [
                            { "time": 0, "interpolation": 2, "value": 100 },
                            { "time": 10, "value": 50 }
                        ],
                        "elementTimelines": [
                            {
                                "batchId": 1,
                                "elementIds": ["0x40"],
                                "visibilityTimeline": [ { "time": 0, "value": 0 } ]
                            }
                        ]
                    }
                ]
            }
        }
    }"#;

    #[test]
    fn test_style_parses_script_and_background() {
        let style = DisplayStyleState::from_json(STYLE).unwrap();

        assert_eq!(style.id(), Some(Id64::new(0x30)));
        assert!(style.schedule_script().is_some());
        assert!((style.background_color().r - 1.0).abs() < EPSILON as f32);
        assert_eq!(style.background_map_provider().as_deref(), Some("MapBoxProvider"));
    }

    #[test]
    fn test_map_needs_view_flag() {
        let mut style = DisplayStyleState::from_json(STYLE).unwrap();
        style.set_view_flags(style.view_flags() - ViewFlags::BACKGROUND_MAP);
        assert!(style.background_map_provider().is_none());
    }

    #[test]
    fn test_schedule_script_is_replaced_wholesale() {
        let mut style = DisplayStyleState::from_json(STYLE).unwrap();
        assert!(style.animation_branches(Some(5.0)).is_some());

        style.set_schedule_script(None);
        assert!(style.schedule_script().is_none());
        assert!(style.props().settings().schedule_script.is_none());
        assert!(style.animation_branches(Some(5.0)).is_none());
        assert!(style.symbology_overrides(Some(5.0)).is_none());
    }

    #[test]
    fn test_overrides_need_a_time() {
        let style = DisplayStyleState::from_json(STYLE).unwrap();
        assert!(style.symbology_overrides(None).is_none());

        let overrides = style.symbology_overrides(Some(5.0)).unwrap();
        let appearance = overrides.model_appearance(ModelId::new(0x1c)).unwrap();
        assert!((appearance.transparency.unwrap() - 0.25).abs() < 1.0e-6);

        let overrides = style.symbology_overrides(Some(10.0)).unwrap();
        let appearance = overrides.model_appearance(ModelId::new(0x1c)).unwrap();
        assert!((appearance.transparency.unwrap() - 0.5).abs() < 1.0e-6);
    }

    #[test]
    fn test_view_state_downcasts() {
        let style = DisplayStyleState::new(DisplayStyleProps::default());
        let extents = Aabb::new(cgmath::Point3::new(0.0, 0.0, 0.0), cgmath::Point3::new(10.0, 10.0, 0.0));
        let view = ViewState::Drawing(DrawingViewState::new(style, ModelId::new(0x20), extents, 1.0));

        assert!(!view.is_3d());
        assert!(view.as_drawing().is_some());
        assert!(view.as_spatial().is_none());
        assert!(view.as_sheet().is_none());
    }
}
