//! Persisted display style properties.
//!
//! Sub-documents the engine does not interpret (`backgroundMap`,
//! `analysisStyle`, and any unknown keys) are carried verbatim so a style can be
//! written back unchanged.

use serde::{Deserialize, Serialize};

use crate::format::FormatError;
use crate::ids::{Id64, ModelId};
use crate::schedule::ModelTimelineProps;
use crate::view_flags::ViewFlagProps;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayStyleProps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id64>,
    #[serde(default)]
    pub json_properties: DisplayStyleJsonProps,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayStyleJsonProps {
    #[serde(default)]
    pub styles: DisplayStyleSettingsProps,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayStyleSettingsProps {
    #[serde(default, rename = "viewflags")]
    pub view_flags: ViewFlagProps,
    /// Packed 0xTTBBGGRR background color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_script: Option<Vec<ModelTimelineProps>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_map: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_reality_models: Vec<ContextRealityModelProps>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_style: Option<serde_json::Value>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

/// A reality model (e.g. a photogrammetry mesh) attached to a display style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRealityModelProps {
    pub tileset_url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classifiers: Vec<SpatialClassifierProps>,
}

impl ContextRealityModelProps {
    /// The first classifier marked active, if any.
    pub fn active_classifier(&self) -> Option<&SpatialClassifierProps> {
        self.classifiers.iter().find(|c| c.is_active)
    }
}

/// A model whose geometry classifies a reality model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialClassifierProps {
    pub model_id: ModelId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
}

impl DisplayStyleProps {
    pub fn from_json(json: &str) -> Result<Self, FormatError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, FormatError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn settings(&self) -> &DisplayStyleSettingsProps {
        &self.json_properties.styles
    }
}
