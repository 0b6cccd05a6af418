use thiserror::Error;

/// Errors produced while fetching or decoding one tile's content.
///
/// None of these cross into tile selection: the scheduler turns them into
/// [`LoadStatus`](crate::tile::LoadStatus) transitions.
#[derive(Debug, Error)]
pub enum TileLoadError {
    /// The content legitimately does not exist; nothing to draw.
    #[error("Tile content not found")]
    NotFound,

    #[error("Tile request canceled")]
    Canceled,

    #[error("Tile load failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced while obtaining or building a tile tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TileTreeError {
    #[error("Tile tree not found")]
    NotFound,

    #[error("Invalid tile tree properties: {0}")]
    InvalidProps(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<tileview_scene::FormatError> for TileTreeError {
    fn from(err: tileview_scene::FormatError) -> Self {
        TileTreeError::InvalidProps(err.to_string())
    }
}

/// Violations of the render scene-graph state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("A batch is already active; batches cannot be nested")]
    NestedBatch,

    #[error("Cannot pop the root branch")]
    BranchStackUnderflow,
}
