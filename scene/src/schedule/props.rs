//! Persisted form of a schedule script.
//!
//! A script is a JSON array of model timelines. Each model timeline and each of
//! its element timelines carries up to four sparse keyframe arrays. Malformed
//! keyframes are dropped individually rather than rejecting the script.

use serde::{Deserialize, Serialize};

use crate::format::{lenient_vec, TransformProps};
use crate::ids::{ElementId, ModelId};
use crate::symbology::RgbColor;

/// How a keyframe blends toward the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Interpolation {
    /// Hold this keyframe's value until the next keyframe
    #[default]
    Step,
    /// Blend linearly toward the next keyframe's value
    Linear,
}

impl From<u8> for Interpolation {
    fn from(value: u8) -> Self {
        match value {
            2 => Interpolation::Linear,
            _ => Interpolation::Step,
        }
    }
}

impl From<Interpolation> for u8 {
    fn from(value: Interpolation) -> Self {
        match value {
            Interpolation::Step => 1,
            Interpolation::Linear => 2,
        }
    }
}

/// One keyframe. An explicit `null` (or missing) value means "no override".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntryProps<T> {
    pub time: f64,
    #[serde(default)]
    pub interpolation: Interpolation,
    pub value: Option<T>,
}

/// A transform keyframe: a full transform, a pivot/orientation/position
/// decomposition, or both.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransformValueProps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<TransformProps>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot: Option<[f64; 3]>,
    /// Quaternion as `[x, y, z, w]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<[f64; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<[f64; 3]>,
}

/// A cutting-plane keyframe. Geometry on the side `direction` points to is clipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuttingPlaneProps {
    pub position: [f64; 3],
    pub direction: [f64; 3],
    /// Ignore the plane and show everything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    /// Ignore the plane; the geometry is hidden by other means
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineProps {
    #[serde(default, deserialize_with = "lenient_vec", skip_serializing_if = "Vec::is_empty")]
    pub visibility_timeline: Vec<TimelineEntryProps<f64>>,
    #[serde(default, deserialize_with = "lenient_vec", skip_serializing_if = "Vec::is_empty")]
    pub color_timeline: Vec<TimelineEntryProps<RgbColor>>,
    #[serde(default, deserialize_with = "lenient_vec", skip_serializing_if = "Vec::is_empty")]
    pub transform_timeline: Vec<TimelineEntryProps<TransformValueProps>>,
    #[serde(default, deserialize_with = "lenient_vec", skip_serializing_if = "Vec::is_empty")]
    pub cutting_plane_timeline: Vec<TimelineEntryProps<CuttingPlaneProps>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementTimelineProps {
    /// Animation node id; 0 or absent lets the script assign one if needed
    #[serde(default)]
    pub batch_id: u32,
    #[serde(default)]
    pub element_ids: Vec<ElementId>,
    #[serde(flatten)]
    pub timeline: TimelineProps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelTimelineProps {
    pub model_id: ModelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reality_model_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_vec", skip_serializing_if = "Vec::is_empty")]
    pub element_timelines: Vec<ElementTimelineProps>,
    #[serde(flatten)]
    pub timeline: TimelineProps,
}
