use serde::{Deserialize, Serialize};

/// Linear RGBA color with components in 0.0-1.0.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct RgbaColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl RgbaColor {
    pub const BLACK: RgbaColor = RgbaColor::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: RgbaColor = RgbaColor::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_rgba8(rgba: [u8; 4]) -> Self {
        Self::new(
            rgba[0] as f32 / 255.0,
            rgba[1] as f32 / 255.0,
            rgba[2] as f32 / 255.0,
            rgba[3] as f32 / 255.0,
        )
    }

    /// Quantizes to 8 bits per channel, as stored in raster images.
    pub fn to_rgba8(&self) -> [u8; 4] {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }

    /// Decodes a packed 0xAABBGGRR integer, the layout display styles persist.
    pub fn from_tbgr(value: u32) -> Self {
        let [r, g, b, t] = value.to_le_bytes();
        Self::from_rgba8([r, g, b, 255 - t])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba8_round_trip_of_white() {
        assert_eq!(RgbaColor::WHITE.to_rgba8(), [255, 255, 255, 255]);
        assert_eq!(RgbaColor::from_rgba8([255, 0, 0, 255]).r, 1.0);
    }

    #[test]
    fn test_from_tbgr() {
        // Opaque blue
        let color = RgbaColor::from_tbgr(0x00FF_0000);
        assert_eq!(color.to_rgba8(), [0, 0, 255, 255]);
    }
}
