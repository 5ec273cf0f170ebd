//! Color value types. These are the values draw contexts accept; the
//! conversion math between color spaces lives in [`crate::icc`].

use serde_derive::{Deserialize, Serialize};

use crate::document::{LabColorSpaceId, PatternId};

fn clamp01(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

/// Tagged union of the color spaces a draw context can paint with.
/// Scalar channel values are clamped to `[0, 1]` by construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type", content = "data")]
pub enum Color {
    DeviceGray(f32),
    DeviceRgb(f32, f32, f32),
    DeviceCmyk(f32, f32, f32, f32),
    /// References a Lab-space handle registered via `add_lab_colorspace`.
    Lab(LabColorSpaceId, f32, f32, f32),
    /// ICC-backed color space: profile handle plus its channel values.
    Icc(crate::document::IccProfileId, [f32; 4], u8),
    /// A named separation with a device fallback color.
    Separation(SeparationColor),
    Pattern(PatternId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeparationColor {
    pub name: String,
    pub tint: f32,
    pub fallback: DeviceFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type", content = "data")]
pub enum DeviceFallback {
    Gray(f32),
    Rgb(f32, f32, f32),
    Cmyk(f32, f32, f32, f32),
}

impl Color {
    pub fn gray(g: f32) -> Self {
        Color::DeviceGray(clamp01(g))
    }

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Color::DeviceRgb(clamp01(r), clamp01(g), clamp01(b))
    }

    pub fn cmyk(c: f32, m: f32, y: f32, k: f32) -> Self {
        Color::DeviceCmyk(clamp01(c), clamp01(m), clamp01(y), clamp01(k))
    }

    pub fn icc(profile: crate::document::IccProfileId, values: &[f32]) -> Self {
        let mut buf = [0.0f32; 4];
        let n = values.len().min(4);
        for (dst, src) in buf.iter_mut().zip(values.iter()) {
            *dst = clamp01(*src);
        }
        Color::Icc(profile, buf, n as u8)
    }

    /// Number of color operands this value contributes to `SC`/`SCN`.
    pub fn component_count(&self) -> usize {
        match self {
            Color::DeviceGray(_) => 1,
            Color::DeviceRgb(..) => 3,
            Color::DeviceCmyk(..) => 4,
            Color::Lab(..) => 3,
            Color::Icc(_, _, n) => *n as usize,
            Color::Separation(_) => 1,
            Color::Pattern(_) => 0,
        }
    }

    pub fn components(&self) -> Vec<f32> {
        match self {
            Color::DeviceGray(g) => vec![*g],
            Color::DeviceRgb(r, g, b) => vec![*r, *g, *b],
            Color::DeviceCmyk(c, m, y, k) => vec![*c, *m, *y, *k],
            Color::Lab(_, l, a, b) => vec![*l, *a, *b],
            Color::Icc(_, v, n) => v[..*n as usize].to_vec(),
            Color::Separation(s) => vec![s.tint],
            Color::Pattern(_) => vec![],
        }
    }

    pub fn is_cmyk(&self) -> bool {
        matches!(self, Color::DeviceCmyk(..))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_clamps_out_of_range_components() {
        let c = Color::rgb(2.0, -0.5, 0.3);
        assert_eq!(c.components(), vec![1.0, 0.0, 0.3]);
    }
}
