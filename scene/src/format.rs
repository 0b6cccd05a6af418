//! JSON property types for persisted and wire data.
//!
//! Field names follow the camelCase layout used by display styles and the
//! tile-tree metadata returned by a connection.

use cgmath::{Matrix4, Point3, SquareMatrix};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use tileview_common::Aabb;

/// Errors that can occur while decoding persisted data.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid Id64: {0:?}")]
    InvalidId(String),

    #[error("Invalid transform: expected 12 numbers, found {0}")]
    InvalidTransform(usize),
}

// ============================================================================
// Geometry
// ============================================================================

/// A range persisted as `{ "low": [x, y, z], "high": [x, y, z] }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range3dProps {
    pub low: [f64; 3],
    pub high: [f64; 3],
}

impl Range3dProps {
    pub fn to_aabb(&self) -> Aabb {
        Aabb::new(Point3::from(self.low), Point3::from(self.high))
    }

    pub fn from_aabb(aabb: &Aabb) -> Self {
        Self {
            low: aabb.min.into(),
            high: aabb.max.into(),
        }
    }
}

/// An affine transform persisted either as three rows of four numbers or as
/// twelve numbers in row-major order. The fourth column is the translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformProps {
    Rows([[f64; 4]; 3]),
    Flat(Vec<f64>),
}

impl TransformProps {
    pub fn to_matrix(&self) -> Result<Matrix4<f64>, FormatError> {
        let rows = match self {
            TransformProps::Rows(rows) => *rows,
            TransformProps::Flat(values) => {
                if values.len() != 12 {
                    return Err(FormatError::InvalidTransform(values.len()));
                }
                let mut rows = [[0.0; 4]; 3];
                for (i, value) in values.iter().enumerate() {
                    rows[i / 4][i % 4] = *value;
                }
                rows
            }
        };

        // Matrix4::new takes columns
        Ok(Matrix4::new(
            rows[0][0], rows[1][0], rows[2][0], 0.0,
            rows[0][1], rows[1][1], rows[2][1], 0.0,
            rows[0][2], rows[1][2], rows[2][2], 0.0,
            rows[0][3], rows[1][3], rows[2][3], 1.0,
        ))
    }

    pub fn from_matrix(matrix: &Matrix4<f64>) -> Self {
        let mut rows = [[0.0; 4]; 3];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = matrix[c][r];
            }
        }
        TransformProps::Rows(rows)
    }

    pub fn identity() -> Self {
        Self::from_matrix(&Matrix4::identity())
    }
}

// ============================================================================
// Tile trees
// ============================================================================

/// Metadata describing one tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileProps {
    pub content_id: String,
    pub range: Range3dProps,
    /// Tighter range of the actual content, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_range: Option<Range3dProps>,
    /// Screen-space size in pixels at which the tile is fine enough to draw
    #[serde(default = "default_maximum_size")]
    pub maximum_size: f64,
    #[serde(default)]
    pub is_leaf: bool,
}

fn default_maximum_size() -> f64 {
    512.0
}

/// Metadata describing a tile tree, supplied by a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileTreeProps {
    pub id: String,
    pub root_tile: TileProps,
    /// Tree-to-world transform
    #[serde(default = "TransformProps::identity")]
    pub location: TransformProps,
    /// Seconds a tree may go unused before it is disposed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_secs: Option<f64>,
    /// Subdivision stops at this depth
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default)]
    pub is_3d: bool,
}

fn default_max_depth() -> u32 {
    32
}

// ============================================================================
// Helpers
// ============================================================================

/// Deserializes a list, dropping elements that fail to decode instead of
/// failing the whole document. A missing or `null` list is empty.
pub(crate) fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let values = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(entry) => Some(entry),
            Err(err) => {
                log::warn!("Skipping malformed entry: {}", err);
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_props_rows_and_flat_agree() {
        let rows: TransformProps =
            serde_json::from_str("[[1,0,0,10],[0,1,0,20],[0,0,1,30]]").unwrap();
        let flat: TransformProps =
            serde_json::from_str("[1,0,0,10,0,1,0,20,0,0,1,30]").unwrap();

        let a = rows.to_matrix().unwrap();
        let b = flat.to_matrix().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.w.x, 10.0);
        assert_eq!(a.w.y, 20.0);
        assert_eq!(a.w.z, 30.0);
    }

    #[test]
    fn test_transform_props_wrong_length() {
        let bad = TransformProps::Flat(vec![1.0, 2.0]);
        assert!(matches!(bad.to_matrix(), Err(FormatError::InvalidTransform(2))));
    }

    #[test]
    fn test_transform_props_from_matrix() {
        let m = Matrix4::from_translation(cgmath::Vector3::new(1.0, 2.0, 3.0));
        let props = TransformProps::from_matrix(&m);
        assert_eq!(props.to_matrix().unwrap(), m);
    }

    #[test]
    fn test_tile_tree_props_defaults() {
        let json = r#"{
            "id": "0x1c",
            "rootTile": { "contentId": "0", "range": { "low": [0,0,0], "high": [100,100,1] } }
        }"#;
        let props: TileTreeProps = serde_json::from_str(json).unwrap();

        assert_eq!(props.root_tile.maximum_size, 512.0);
        assert!(!props.root_tile.is_leaf);
        assert_eq!(props.location.to_matrix().unwrap(), Matrix4::identity());
        assert_eq!(props.root_tile.range.to_aabb().max.x, 100.0);
    }
}
