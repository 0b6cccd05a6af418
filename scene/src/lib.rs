pub use tileview_common as common;

pub mod display_style;
pub mod feature;
pub mod format;
pub mod ids;
pub mod schedule;
pub mod symbology;
pub mod view_flags;

pub use display_style::{
    ContextRealityModelProps, DisplayStyleProps, DisplayStyleSettingsProps, SpatialClassifierProps,
};
pub use feature::{BatchType, Feature, FeatureTable, GeometryClass};
pub use format::{FormatError, Range3dProps, TileProps, TileTreeProps, TransformProps};
pub use ids::{ElementId, Id64, ModelId};
pub use symbology::{FeatureAppearance, FeatureOverrides, RgbColor};
pub use view_flags::{ViewFlagOverrides, ViewFlagProps, ViewFlags};
