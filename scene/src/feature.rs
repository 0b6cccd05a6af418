use serde::{Deserialize, Serialize};

use crate::ids::{ElementId, Id64, ModelId};

/// What a batch of features is used for when drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchType {
    /// Regular visible geometry
    #[default]
    Primary,
    /// Geometry used to classify other geometry by volume
    VolumeClassifier,
    /// Geometry projected onto a plane to classify other geometry
    PlanarClassifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GeometryClass {
    #[default]
    Primary,
    Construction,
    Dimension,
    Pattern,
}

/// One pickable, individually-symbolized piece of geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Feature {
    pub element_id: ElementId,
    pub subcategory_id: Id64,
    pub geometry_class: GeometryClass,
}

impl Feature {
    pub fn new(element_id: ElementId, subcategory_id: Id64, geometry_class: GeometryClass) -> Self {
        Self {
            element_id,
            subcategory_id,
            geometry_class,
        }
    }
}

/// The features contained in one batch, indexed by local feature index.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub model_id: ModelId,
    pub batch_type: BatchType,
    features: Vec<Feature>,
}

impl FeatureTable {
    pub fn new(model_id: ModelId, batch_type: BatchType, features: Vec<Feature>) -> Self {
        Self {
            model_id,
            batch_type,
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Feature> {
        self.features.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Local index of the first feature belonging to `element_id`.
    pub fn index_of_element(&self, element_id: ElementId) -> Option<usize> {
        self.features.iter().position(|f| f.element_id == element_id)
    }
}
