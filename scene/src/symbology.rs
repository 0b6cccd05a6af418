//! Per-feature symbology overrides.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::feature::Feature;
use crate::ids::{ElementId, Id64, ModelId};

/// 8-bit RGB color as persisted in display styles and schedule scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RgbColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl RgbColor {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Channel-wise linear blend, rounded to the nearest integer.
    pub fn interpolate(&self, other: &RgbColor, fraction: f64) -> RgbColor {
        let lerp = |a: u8, b: u8| {
            let v = a as f64 + (b as f64 - a as f64) * fraction;
            v.round().clamp(0.0, 255.0) as u8
        };
        RgbColor::new(
            lerp(self.red, other.red),
            lerp(self.green, other.green),
            lerp(self.blue, other.blue),
        )
    }
}

/// Overrides applied to the appearance of a feature. `None` fields inherit.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeatureAppearance {
    pub rgb: Option<RgbColor>,
    /// 0.0 is opaque, 1.0 fully transparent
    pub transparency: Option<f32>,
    pub weight: Option<u32>,
    pub emphasized: bool,
}

impl FeatureAppearance {
    pub fn from_rgb(rgb: RgbColor) -> Self {
        Self {
            rgb: Some(rgb),
            ..Default::default()
        }
    }

    pub fn from_transparency(transparency: f32) -> Self {
        Self {
            transparency: Some(transparency),
            ..Default::default()
        }
    }

    /// Fills any unset fields of `self` from `base`.
    pub fn extend(&self, base: &FeatureAppearance) -> FeatureAppearance {
        FeatureAppearance {
            rgb: self.rgb.or(base.rgb),
            transparency: self.transparency.or(base.transparency),
            weight: self.weight.or(base.weight),
            emphasized: self.emphasized || base.emphasized,
        }
    }

    pub fn overrides_anything(&self) -> bool {
        self.rgb.is_some() || self.transparency.is_some() || self.weight.is_some() || self.emphasized
    }
}

/// Symbology overrides for the features drawn in a view.
///
/// Element appearances take precedence over model appearances, which take
/// precedence over the default appearance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureOverrides {
    default_appearance: FeatureAppearance,
    models: HashMap<ModelId, FeatureAppearance>,
    elements: HashMap<ElementId, FeatureAppearance>,
    never_drawn: HashSet<ElementId>,
}

impl FeatureOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_default_appearance(&mut self, appearance: FeatureAppearance) {
        self.default_appearance = appearance;
    }

    /// Overrides every feature of a model. With `replace_existing == false`, an
    /// existing appearance keeps its fields and only gains unset ones.
    pub fn override_model(&mut self, model_id: ModelId, appearance: FeatureAppearance, replace_existing: bool) {
        Self::insert(&mut self.models, model_id, appearance, replace_existing);
    }

    pub fn override_element(&mut self, element_id: ElementId, appearance: FeatureAppearance, replace_existing: bool) {
        Self::insert(&mut self.elements, element_id, appearance, replace_existing);
    }

    fn insert(
        map: &mut HashMap<Id64, FeatureAppearance>,
        id: Id64,
        appearance: FeatureAppearance,
        replace_existing: bool,
    ) {
        match map.get_mut(&id) {
            Some(existing) if !replace_existing => *existing = existing.extend(&appearance),
            _ => {
                map.insert(id, appearance);
            }
        }
    }

    pub fn set_never_drawn(&mut self, element_id: ElementId) {
        self.never_drawn.insert(element_id);
    }

    pub fn is_never_drawn(&self, element_id: ElementId) -> bool {
        self.never_drawn.contains(&element_id)
    }

    pub fn model_appearance(&self, model_id: ModelId) -> Option<&FeatureAppearance> {
        self.models.get(&model_id)
    }

    pub fn element_appearance(&self, element_id: ElementId) -> Option<&FeatureAppearance> {
        self.elements.get(&element_id)
    }

    /// Resolves the appearance of a feature, or `None` if it must not be drawn.
    pub fn appearance(&self, feature: &Feature, model_id: ModelId) -> Option<FeatureAppearance> {
        if self.is_never_drawn(feature.element_id) {
            return None;
        }

        let mut appearance = self.default_appearance;
        if let Some(model) = self.models.get(&model_id) {
            appearance = model.extend(&appearance);
        }
        if let Some(element) = self.elements.get(&feature.element_id) {
            appearance = element.extend(&appearance);
        }
        Some(appearance)
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
            && self.elements.is_empty()
            && self.never_drawn.is_empty()
            && !self.default_appearance.overrides_anything()
    }
}
