use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Flags controlling how a view renders its contents.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ViewFlags: u32 {
        /// Draw visible edges of surfaces
        const VISIBLE_EDGES = 1 << 0;
        /// Honor element transparency
        const TRANSPARENCY = 1 << 1;
        /// Apply lighting to surfaces
        const LIGHTING = 1 << 2;
        /// Apply the view's clip volume
        const CLIP_VOLUME = 1 << 3;
        /// Draw the background map
        const BACKGROUND_MAP = 1 << 4;
        /// Draw construction geometry
        const CONSTRUCTIONS = 1 << 5;
        /// Apply textures
        const TEXTURES = 1 << 6;
        /// Apply materials
        const MATERIALS = 1 << 7;
        /// Cast shadows
        const SHADOWS = 1 << 8;
    }
}

impl Default for ViewFlags {
    fn default() -> Self {
        ViewFlags::TRANSPARENCY
            | ViewFlags::LIGHTING
            | ViewFlags::CLIP_VOLUME
            | ViewFlags::TEXTURES
            | ViewFlags::MATERIALS
    }
}

/// A partial set of view flags applied on top of inherited flags.
///
/// Only the flags in `mask` are overridden; everything else passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewFlagOverrides {
    mask: ViewFlags,
    values: ViewFlags,
}

impl Default for ViewFlagOverrides {
    fn default() -> Self {
        Self {
            mask: ViewFlags::empty(),
            values: ViewFlags::empty(),
        }
    }
}

impl ViewFlagOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces `flag` on or off regardless of the inherited value.
    pub fn set(&mut self, flag: ViewFlags, on: bool) {
        self.mask |= flag;
        self.values.set(flag, on);
    }

    /// Builder-style variant of [`set`](Self::set).
    pub fn with(mut self, flag: ViewFlags, on: bool) -> Self {
        self.set(flag, on);
        self
    }

    /// Stops overriding `flag`.
    pub fn clear(&mut self, flag: ViewFlags) {
        self.mask.remove(flag);
        self.values.remove(flag);
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    pub fn is_overridden(&self, flag: ViewFlags) -> bool {
        self.mask.contains(flag)
    }

    /// Returns `base` with the overridden flags replaced.
    pub fn apply(&self, base: ViewFlags) -> ViewFlags {
        (base & !self.mask) | (self.values & self.mask)
    }

    /// Layers `child` on top of these overrides; the child wins where both override.
    pub fn compose(&self, child: &ViewFlagOverrides) -> ViewFlagOverrides {
        ViewFlagOverrides {
            mask: self.mask | child.mask,
            values: (self.values & !child.mask) | (child.values & child.mask),
        }
    }
}

/// Persisted view flags, as stored in a display style.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewFlagProps {
    pub no_construct: bool,
    pub no_transp: bool,
    pub no_texture: bool,
    pub no_material: bool,
    pub no_lighting: bool,
    pub vis_edges: bool,
    pub clip_vol: bool,
    pub back_map: bool,
    pub shadows: bool,
}

impl ViewFlagProps {
    pub fn to_view_flags(&self) -> ViewFlags {
        let mut flags = ViewFlags::empty();
        flags.set(ViewFlags::CONSTRUCTIONS, !self.no_construct);
        flags.set(ViewFlags::TRANSPARENCY, !self.no_transp);
        flags.set(ViewFlags::TEXTURES, !self.no_texture);
        flags.set(ViewFlags::MATERIALS, !self.no_material);
        flags.set(ViewFlags::LIGHTING, !self.no_lighting);
        flags.set(ViewFlags::VISIBLE_EDGES, self.vis_edges);
        flags.set(ViewFlags::CLIP_VOLUME, self.clip_vol);
        flags.set(ViewFlags::BACKGROUND_MAP, self.back_map);
        flags.set(ViewFlags::SHADOWS, self.shadows);
        flags
    }
}
