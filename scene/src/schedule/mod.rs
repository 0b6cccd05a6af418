//! Time-based animation of models and elements.
//!
//! A [`Script`] is parsed once from a display style and evaluated per frame:
//! [`Script::animation_branches`] yields transform/clip/omit state per scene
//! branch, and [`Script::add_symbology_overrides`] yields color and
//! transparency per model and element.

mod props;
mod script;
mod timeline;

pub use props::{
    CuttingPlaneProps, ElementTimelineProps, Interpolation, ModelTimelineProps,
    TimelineEntryProps, TimelineProps, TransformValueProps,
};
pub use script::{
    element_branch_key, model_branch_key, AnimationBranchState, AnimationBranchStates,
    ElementTimeline, ModelTimeline, Script,
};
pub use timeline::{
    find_interval, CuttingPlane, Timeline, TimelineEntry, TimelineInterval, TransformComponents,
    TransformValue,
};
