//! Color adjustment records and per-call overrides.
//!
//! Every color field is an integer in `[-100, 100]` and the vignette strength
//! is in `[0, 100]`. Values outside those ranges are rejected with
//! [`GradeError::InvalidParameterRange`]; nothing is clamped.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{GradeError, Result};

pub const MIN_VALUE: i32 = -100;
pub const MAX_VALUE: i32 = 100;

fn check_range(field: &str, value: i32) -> Result<i32> {
    check_bounds(field, value, MIN_VALUE)
}

fn check_vignette(value: i32) -> Result<i32> {
    check_bounds("vignette", value, 0)
}

fn check_bounds(field: &str, value: i32, min: i32) -> Result<i32> {
    if (min..=MAX_VALUE).contains(&value) {
        Ok(value)
    } else {
        Err(GradeError::InvalidParameterRange {
            field: field.to_string(),
            value,
        })
    }
}

/// Per-channel color deltas for one tonal range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelShift {
    pub r: i32,
    pub g: i32,
    pub b: i32,
}

impl ChannelShift {
    pub const NEUTRAL: ChannelShift = ChannelShift { r: 0, g: 0, b: 0 };

    pub fn new(r: i32, g: i32, b: i32) -> Self {
        Self { r, g, b }
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }

    fn validate(&self, range: &str) -> Result<()> {
        check_range(&format!("{range}.r"), self.r)?;
        check_range(&format!("{range}.g"), self.g)?;
        check_range(&format!("{range}.b"), self.b)?;
        Ok(())
    }
}

/// Parses `r,g,b` (also accepts `r:g:b`).
impl FromStr for ChannelShift {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split([',', ':']).map(str::trim).collect();
        if parts.len() != 3 {
            return Err(format!("expected three values r,g,b, got '{s}'"));
        }
        let mut values = [0i32; 3];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| format!("'{part}' is not an integer"))?;
        }
        Ok(ChannelShift::new(values[0], values[1], values[2]))
    }
}

impl fmt::Display for ChannelShift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.r, self.g, self.b)
    }
}

/// Color-balance deltas for shadows/midtones/highlights plus global
/// brightness, contrast, saturation and an edge-darkening vignette.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAdjustment")]
pub struct ColorAdjustment {
    shadows: ChannelShift,
    midtones: ChannelShift,
    highlights: ChannelShift,
    brightness: i32,
    contrast: i32,
    saturation: i32,
    vignette: i32,
}

impl ColorAdjustment {
    pub const NEUTRAL: ColorAdjustment = ColorAdjustment {
        shadows: ChannelShift::NEUTRAL,
        midtones: ChannelShift::NEUTRAL,
        highlights: ChannelShift::NEUTRAL,
        brightness: 0,
        contrast: 0,
        saturation: 0,
        vignette: 0,
    };

    pub fn new(
        shadows: ChannelShift,
        midtones: ChannelShift,
        highlights: ChannelShift,
        brightness: i32,
        contrast: i32,
        saturation: i32,
    ) -> Result<Self> {
        let adjustment = Self {
            shadows,
            midtones,
            highlights,
            brightness,
            contrast,
            saturation,
            vignette: 0,
        };
        adjustment.validate()?;
        Ok(adjustment)
    }

    /// Same adjustment with a vignette of the given strength (0 disables it)
    pub fn with_vignette(mut self, strength: i32) -> Result<Self> {
        self.vignette = check_vignette(strength)?;
        Ok(self)
    }

    /// Brightness/contrast/saturation only, neutral color balance.
    pub fn tonal(brightness: i32, contrast: i32, saturation: i32) -> Result<Self> {
        Self::new(
            ChannelShift::NEUTRAL,
            ChannelShift::NEUTRAL,
            ChannelShift::NEUTRAL,
            brightness,
            contrast,
            saturation,
        )
    }

    pub fn validate(&self) -> Result<()> {
        self.shadows.validate("shadows")?;
        self.midtones.validate("midtones")?;
        self.highlights.validate("highlights")?;
        check_range("brightness", self.brightness)?;
        check_range("contrast", self.contrast)?;
        check_range("saturation", self.saturation)?;
        check_vignette(self.vignette)?;
        Ok(())
    }

    pub fn shadows(&self) -> ChannelShift {
        self.shadows
    }

    pub fn midtones(&self) -> ChannelShift {
        self.midtones
    }

    pub fn highlights(&self) -> ChannelShift {
        self.highlights
    }

    pub fn brightness(&self) -> i32 {
        self.brightness
    }

    pub fn contrast(&self) -> i32 {
        self.contrast
    }

    pub fn saturation(&self) -> i32 {
        self.saturation
    }

    pub fn vignette(&self) -> i32 {
        self.vignette
    }

    /// Field-by-field merge: every override that is set wins.
    pub fn merged(&self, overrides: &AdjustmentOverrides) -> Result<Self> {
        overrides.validate()?;
        Ok(Self {
            shadows: overrides.shadows.unwrap_or(self.shadows),
            midtones: overrides.midtones.unwrap_or(self.midtones),
            highlights: overrides.highlights.unwrap_or(self.highlights),
            brightness: overrides.brightness.unwrap_or(self.brightness),
            contrast: overrides.contrast.unwrap_or(self.contrast),
            saturation: overrides.saturation.unwrap_or(self.saturation),
            vignette: overrides.vignette.unwrap_or(self.vignette),
        })
    }
}

impl fmt::Display for ColorAdjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "brightness {:+}, contrast {:+}, saturation {:+}, shadows [{}], midtones [{}], highlights [{}], vignette {}",
            self.brightness,
            self.contrast,
            self.saturation,
            self.shadows,
            self.midtones,
            self.highlights,
            self.vignette
        )
    }
}

// Deserialization goes through the range check so a hand-edited preset file
// cannot smuggle in out-of-range values.
#[derive(Deserialize)]
struct RawAdjustment {
    #[serde(default)]
    shadows: ChannelShift,
    #[serde(default)]
    midtones: ChannelShift,
    #[serde(default)]
    highlights: ChannelShift,
    #[serde(default)]
    brightness: i32,
    #[serde(default)]
    contrast: i32,
    #[serde(default)]
    saturation: i32,
    #[serde(default)]
    vignette: i32,
}

impl TryFrom<RawAdjustment> for ColorAdjustment {
    type Error = GradeError;

    fn try_from(raw: RawAdjustment) -> Result<Self> {
        ColorAdjustment::new(
            raw.shadows,
            raw.midtones,
            raw.highlights,
            raw.brightness,
            raw.contrast,
            raw.saturation,
        )?
        .with_vignette(raw.vignette)
    }
}

/// Explicit per-call values that replace the matching preset fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdjustmentOverrides {
    pub brightness: Option<i32>,
    pub contrast: Option<i32>,
    pub saturation: Option<i32>,
    pub shadows: Option<ChannelShift>,
    pub midtones: Option<ChannelShift>,
    pub highlights: Option<ChannelShift>,
    pub vignette: Option<i32>,
}

impl AdjustmentOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn brightness(mut self, value: i32) -> Self {
        self.brightness = Some(value);
        self
    }

    pub fn contrast(mut self, value: i32) -> Self {
        self.contrast = Some(value);
        self
    }

    pub fn saturation(mut self, value: i32) -> Self {
        self.saturation = Some(value);
        self
    }

    pub fn shadows(mut self, shift: ChannelShift) -> Self {
        self.shadows = Some(shift);
        self
    }

    pub fn midtones(mut self, shift: ChannelShift) -> Self {
        self.midtones = Some(shift);
        self
    }

    pub fn highlights(mut self, shift: ChannelShift) -> Self {
        self.highlights = Some(shift);
        self
    }

    pub fn vignette(mut self, strength: i32) -> Self {
        self.vignette = Some(strength);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(shift) = &self.shadows {
            shift.validate("shadows")?;
        }
        if let Some(shift) = &self.midtones {
            shift.validate("midtones")?;
        }
        if let Some(shift) = &self.highlights {
            shift.validate("highlights")?;
        }
        if let Some(value) = self.brightness {
            check_range("brightness", value)?;
        }
        if let Some(value) = self.contrast {
            check_range("contrast", value)?;
        }
        if let Some(value) = self.saturation {
            check_range("saturation", value)?;
        }
        if let Some(value) = self.vignette {
            check_vignette(value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ColorAdjustment {
        ColorAdjustment::new(
            ChannelShift::new(-5, 5, 10),
            ChannelShift::new(0, 0, 0),
            ChannelShift::new(8, 0, -10),
            10,
            15,
            -20,
        )
        .unwrap()
    }

    #[test]
    fn test_out_of_range_is_rejected_not_clamped() {
        let err = ColorAdjustment::tonal(101, 0, 0).unwrap_err();
        match err {
            GradeError::InvalidParameterRange { field, value } => {
                assert_eq!(field, "brightness");
                assert_eq!(value, 101);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = ColorAdjustment::new(
            ChannelShift::NEUTRAL,
            ChannelShift::new(0, -101, 0),
            ChannelShift::NEUTRAL,
            0,
            0,
            0,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            GradeError::InvalidParameterRange { ref field, value: -101 } if field == "midtones.g"
        ));

        assert!(ColorAdjustment::tonal(-100, 100, -100).is_ok());
    }

    #[test]
    fn test_merge_with_empty_overrides_is_identity() {
        let adjustment = sample();
        let overrides = AdjustmentOverrides::default();
        assert!(overrides.is_empty());
        assert!(!overrides.vignette(0).is_empty());
        let merged = adjustment.merged(&AdjustmentOverrides::default()).unwrap();
        assert_eq!(merged, adjustment);
    }

    #[test]
    fn test_merge_replaces_only_present_fields() {
        let adjustment = sample();
        let overrides = AdjustmentOverrides::default()
            .contrast(-40)
            .highlights(ChannelShift::new(1, 2, 3));
        let merged = adjustment.merged(&overrides).unwrap();

        assert_eq!(merged.contrast(), -40);
        assert_eq!(merged.highlights(), ChannelShift::new(1, 2, 3));
        assert_eq!(merged.brightness(), adjustment.brightness());
        assert_eq!(merged.saturation(), adjustment.saturation());
        assert_eq!(merged.shadows(), adjustment.shadows());
        assert_eq!(merged.midtones(), adjustment.midtones());
    }

    #[test]
    fn test_merge_rejects_out_of_range_override() {
        let overrides = AdjustmentOverrides::default().saturation(-150);
        let err = sample().merged(&overrides).unwrap_err();
        assert!(matches!(err, GradeError::InvalidParameterRange { value: -150, .. }));
    }

    #[test]
    fn test_vignette_range_and_merge() {
        let base = sample().with_vignette(40).unwrap();
        assert_eq!(base.vignette(), 40);
        assert!(sample().with_vignette(0).is_ok());
        assert!(matches!(
            sample().with_vignette(-1),
            Err(GradeError::InvalidParameterRange { ref field, value: -1 }) if field == "vignette"
        ));
        assert!(sample().with_vignette(101).is_err());

        let merged = base.merged(&AdjustmentOverrides::default().vignette(0)).unwrap();
        assert_eq!(merged.vignette(), 0);
        assert_eq!(merged.brightness(), base.brightness());

        let kept = base.merged(&AdjustmentOverrides::default().brightness(5)).unwrap();
        assert_eq!(kept.vignette(), 40);

        assert!(base.merged(&AdjustmentOverrides::default().vignette(-20)).is_err());
    }

    #[test]
    fn test_channel_shift_parsing() {
        assert_eq!("5,-3,0".parse::<ChannelShift>(), Ok(ChannelShift::new(5, -3, 0)));
        assert_eq!("1:2:3".parse::<ChannelShift>(), Ok(ChannelShift::new(1, 2, 3)));
        assert!("1,2".parse::<ChannelShift>().is_err());
        assert!("a,b,c".parse::<ChannelShift>().is_err());
    }

    #[test]
    fn test_deserialize_validates_range() {
        let ok: ColorAdjustment =
            serde_json::from_str(r#"{"brightness": 10, "shadows": {"r": 1, "g": 2, "b": 3}}"#)
                .unwrap();
        assert_eq!(ok.brightness(), 10);
        assert_eq!(ok.shadows(), ChannelShift::new(1, 2, 3));
        assert_eq!(ok.contrast(), 0);

        assert_eq!(ok.vignette(), 0);

        let bad = serde_json::from_str::<ColorAdjustment>(r#"{"contrast": 250}"#);
        assert!(bad.is_err());

        let vignetted: ColorAdjustment = serde_json::from_str(r#"{"vignette": 40}"#).unwrap();
        assert_eq!(vignetted.vignette(), 40);
        assert!(serde_json::from_str::<ColorAdjustment>(r#"{"vignette": -5}"#).is_err());
    }
}
