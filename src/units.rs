use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Physical length of one inch in centimeters.
pub const CM_PER_INCH: f64 = 2.54;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SizeUnit {
    #[default]
    Pixel,
    #[serde(alias = "cm", alias = "centimeter")]
    Physical,
}

impl std::str::FromStr for SizeUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pixel" | "px" => Ok(SizeUnit::Pixel),
            "physical" | "cm" | "centimeter" => Ok(SizeUnit::Physical),
            other => Err(Error::InvalidConfig(format!("unknown size unit: {other}"))),
        }
    }
}

/// Convert `value` in `unit` to pixels.
///
/// Pixel values pass through untouched and `resolution` is ignored. Physical
/// values are centimeters and `resolution` is samples per inch, so the result
/// is `round(value * resolution / 2.54)`.
pub fn to_pixels(value: f64, unit: SizeUnit, resolution: f64) -> Result<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::InvalidConfig(format!(
            "dimension must be a finite non-negative number, got {value}"
        )));
    }
    match unit {
        SizeUnit::Pixel => Ok(value),
        SizeUnit::Physical => {
            if !resolution.is_finite() || resolution <= 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "resolution must be positive, got {resolution}"
                )));
            }
            Ok((value * resolution / CM_PER_INCH).round())
        }
    }
}

/// Requested output size for a generate job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
    pub unit: SizeUnit,
    pub resolution: f64,
}

impl Default for Dimensions {
    fn default() -> Self {
        Self {
            width: 300.0,
            height: 300.0,
            unit: SizeUnit::Pixel,
            resolution: 300.0,
        }
    }
}

impl Dimensions {
    /// Resolve to whole pixel counts suitable for the codec.
    pub fn resolve(&self) -> Result<(u32, u32)> {
        let w = to_pixels(self.width, self.unit, self.resolution)?.round();
        let h = to_pixels(self.height, self.unit, self.resolution)?.round();
        if w < 1.0 || h < 1.0 || w > u32::MAX as f64 || h > u32::MAX as f64 {
            return Err(Error::InvalidConfig(format!(
                "resolved size {w}x{h} px is out of range"
            )));
        }
        Ok((w as u32, h as u32))
    }
}
