pub mod attachments;
mod camera;
pub mod context;
pub mod error;
pub mod imodel;
pub mod render;
pub mod request;
pub mod tile;
pub mod view;
pub mod viewport;

#[cfg(test)]
mod testing;

// `pub use ... as scene` makes crate::scene::* resolve to tileview_scene::*
pub use tileview_scene as scene;
pub use tileview_common as common;

pub use camera::{Camera, ViewingSpace};
pub use context::{Decorator, DecorateContext, GraphicType, SceneContext, SceneOutput};
pub use error::{RenderError, TileLoadError, TileTreeError};
pub use imodel::{IModelConnection, IModelSession};
pub use view::{DisplayStyleState, DrawingViewState, SpatialViewState, ViewState};
pub use viewport::{FrameStats, RenderSession, Viewport, ViewportConfig};
