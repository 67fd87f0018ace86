//! Turns a resolved color adjustment into an ordered list of filter stages.
//!
//! Stage order is fixed for every preset: the three color-balance curves
//! (shadows, midtones, highlights), then brightness, contrast, saturation,
//! and the vignette last.

use std::f64::consts::FRAC_PI_2;
use std::fmt;

use crate::adjustment::{AdjustmentOverrides, ChannelShift, ColorAdjustment};
use crate::error::Result;

/// Tonal range targeted by a color-balance curve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneRange {
    Shadows,
    Midtones,
    Highlights,
}

impl ToneRange {
    /// Suffix used by FFmpeg's colorbalance option names (rs, gm, bh, ...)
    fn suffix(&self) -> char {
        match self {
            ToneRange::Shadows => 's',
            ToneRange::Midtones => 'm',
            ToneRange::Highlights => 'h',
        }
    }
}

/// One operation in the filter graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    Curve { range: ToneRange, shift: ChannelShift },
    Brightness(i32),
    Contrast(i32),
    Saturation(i32),
    /// Strength 0..=100
    Vignette(i32),
}

impl FilterStage {
    pub fn name(&self) -> &'static str {
        match self {
            FilterStage::Curve {
                range: ToneRange::Shadows,
                ..
            } => "shadows",
            FilterStage::Curve {
                range: ToneRange::Midtones,
                ..
            } => "midtones",
            FilterStage::Curve {
                range: ToneRange::Highlights,
                ..
            } => "highlights",
            FilterStage::Brightness(_) => "brightness",
            FilterStage::Contrast(_) => "contrast",
            FilterStage::Saturation(_) => "saturation",
            FilterStage::Vignette(_) => "vignette",
        }
    }

    /// Neutral stages leave the picture untouched
    pub fn is_identity(&self) -> bool {
        match self {
            FilterStage::Curve { shift, .. } => shift.is_neutral(),
            FilterStage::Brightness(v)
            | FilterStage::Contrast(v)
            | FilterStage::Saturation(v)
            | FilterStage::Vignette(v) => *v == 0,
        }
    }

    /// FFmpeg filter expression for this stage
    pub fn to_ffmpeg(&self) -> String {
        match self {
            FilterStage::Curve { range, shift } => {
                let s = range.suffix();
                // colorbalance takes -1..1
                format!(
                    "colorbalance=r{s}={:.2}:g{s}={:.2}:b{s}={:.2}",
                    unit(shift.r),
                    unit(shift.g),
                    unit(shift.b)
                )
            }
            // eq brightness is -1..1, neutral 0
            FilterStage::Brightness(v) => format!("eq=brightness={:.2}", unit(*v)),
            // eq contrast/saturation are multipliers, neutral 1
            FilterStage::Contrast(v) => format!("eq=contrast={:.2}", 1.0 + unit(*v)),
            FilterStage::Saturation(v) => format!("eq=saturation={:.2}", 1.0 + unit(*v)),
            // lens angle in (0, PI/2]; 40 gives FFmpeg's default PI/5
            FilterStage::Vignette(v) => format!("vignette=angle={:.4}", unit(*v) * FRAC_PI_2),
        }
    }
}

fn unit(value: i32) -> f64 {
    f64::from(value) / 100.0
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ffmpeg())
    }
}

/// Resolved adjustment plus its stages in canonical order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterPlan {
    adjustment: ColorAdjustment,
    stages: Vec<FilterStage>,
}

impl FilterPlan {
    pub fn adjustment(&self) -> &ColorAdjustment {
        &self.adjustment
    }

    /// Every stage, including neutral ones
    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    /// Stages that actually change the picture, order preserved
    pub fn active_stages(&self) -> impl Iterator<Item = &FilterStage> {
        self.stages.iter().filter(|stage| !stage.is_identity())
    }

    /// Comma-joined filter chain, or `None` when every stage is neutral
    pub fn filter_graph(&self) -> Option<String> {
        let filters: Vec<String> = self.active_stages().map(FilterStage::to_ffmpeg).collect();
        if filters.is_empty() {
            None
        } else {
            Some(filters.join(","))
        }
    }
}

/// Merge overrides into the adjustment and lay out the stages
pub fn plan(adjustment: &ColorAdjustment, overrides: &AdjustmentOverrides) -> Result<FilterPlan> {
    let resolved = adjustment.merged(overrides)?;
    Ok(plan_resolved(resolved))
}

fn plan_resolved(adjustment: ColorAdjustment) -> FilterPlan {
    let stages = vec![
        FilterStage::Curve {
            range: ToneRange::Shadows,
            shift: adjustment.shadows(),
        },
        FilterStage::Curve {
            range: ToneRange::Midtones,
            shift: adjustment.midtones(),
        },
        FilterStage::Curve {
            range: ToneRange::Highlights,
            shift: adjustment.highlights(),
        },
        FilterStage::Brightness(adjustment.brightness()),
        FilterStage::Contrast(adjustment.contrast()),
        FilterStage::Saturation(adjustment.saturation()),
        FilterStage::Vignette(adjustment.vignette()),
    ];
    FilterPlan { adjustment, stages }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets::PresetTable;

    const CANONICAL: [&str; 7] = [
        "shadows",
        "midtones",
        "highlights",
        "brightness",
        "contrast",
        "saturation",
        "vignette",
    ];

    #[test]
    fn test_stage_order_is_invariant_across_presets() {
        let table = PresetTable::with_builtins();
        for preset in table.iter() {
            let plan = plan(&preset.adjustment, &AdjustmentOverrides::default()).unwrap();
            let names: Vec<_> = plan.stages().iter().map(FilterStage::name).collect();
            assert_eq!(names, CANONICAL, "preset {}", preset.name);

            // Skipping neutral stages must not reorder the rest.
            let active: Vec<_> = plan.active_stages().map(FilterStage::name).collect();
            let positions: Vec<_> = active
                .iter()
                .map(|name| CANONICAL.iter().position(|c| c == name).unwrap())
                .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]), "preset {}", preset.name);
        }
    }

    #[test]
    fn test_overrides_flow_into_stages() {
        let base = ColorAdjustment::tonal(10, 20, 30).unwrap();
        let overrides = AdjustmentOverrides::default().contrast(-50);
        let plan = plan(&base, &overrides).unwrap();

        assert_eq!(plan.adjustment().contrast(), -50);
        assert_eq!(plan.stages()[3], FilterStage::Brightness(10));
        assert_eq!(plan.stages()[4], FilterStage::Contrast(-50));
        assert_eq!(plan.stages()[5], FilterStage::Saturation(30));
    }

    #[test]
    fn test_filter_graph_rendering() {
        let adjustment = ColorAdjustment::new(
            ChannelShift::new(-5, 5, 10),
            ChannelShift::NEUTRAL,
            ChannelShift::new(20, 0, -10),
            10,
            -25,
            50,
        )
        .unwrap();
        let plan = plan(&adjustment, &AdjustmentOverrides::default()).unwrap();

        assert_eq!(
            plan.filter_graph().unwrap(),
            "colorbalance=rs=-0.05:gs=0.05:bs=0.10,\
             colorbalance=rh=0.20:gh=0.00:bh=-0.10,\
             eq=brightness=0.10,eq=contrast=0.75,eq=saturation=1.50"
        );
    }

    #[test]
    fn test_neutral_plan_has_no_graph() {
        let plan = plan(&ColorAdjustment::NEUTRAL, &AdjustmentOverrides::default()).unwrap();
        assert_eq!(plan.stages().len(), 7);
        assert!(plan.filter_graph().is_none());
    }

    #[test]
    fn test_vignette_renders_last() {
        let adjustment = ColorAdjustment::tonal(0, 0, 20)
            .unwrap()
            .with_vignette(40)
            .unwrap();
        let plan = plan(&adjustment, &AdjustmentOverrides::default()).unwrap();

        assert_eq!(plan.stages().last(), Some(&FilterStage::Vignette(40)));
        assert_eq!(
            plan.filter_graph().unwrap(),
            "eq=saturation=1.20,vignette=angle=0.6283"
        );

        let off = super::plan(&adjustment, &AdjustmentOverrides::default().vignette(0)).unwrap();
        assert_eq!(off.filter_graph().unwrap(), "eq=saturation=1.20");
    }

    #[test]
    fn test_extreme_values_render_within_ffmpeg_ranges() {
        assert_eq!(FilterStage::Saturation(-100).to_ffmpeg(), "eq=saturation=0.00");
        assert_eq!(FilterStage::Contrast(100).to_ffmpeg(), "eq=contrast=2.00");
        assert_eq!(FilterStage::Brightness(-100).to_ffmpeg(), "eq=brightness=-1.00");
        assert_eq!(FilterStage::Vignette(100).to_ffmpeg(), "vignette=angle=1.5708");
    }
}
