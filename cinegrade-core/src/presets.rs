use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::adjustment::{ChannelShift, ColorAdjustment};
use crate::error::{GradeError, Result};
use crate::preset_store::PresetStore;

/// Where a preset came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetSource {
    BuiltIn,
    User,
}

/// A named bundle of color-adjustment parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub name: String,
    pub description: String,
    pub adjustment: ColorAdjustment,
    pub source: PresetSource,
}

impl Preset {
    pub fn user(name: &str, description: &str, adjustment: ColorAdjustment) -> Result<Self> {
        Ok(Self {
            name: normalize_name(name)?,
            description: description.to_string(),
            adjustment,
            source: PresetSource::User,
        })
    }
}

/// Lowercases and validates a preset name
pub fn normalize_name(name: &str) -> Result<String> {
    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    let re = NAME_RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("preset name pattern is valid")
    });

    let normalized = name.trim().to_lowercase();
    if re.is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(GradeError::InvalidPresetName(name.to_string()))
    }
}

/// Name → adjustment lookup, built once at startup and passed by reference.
///
/// Collision policy: a user preset may never shadow a built-in
/// ([`GradeError::DuplicatePreset`]); registering a user preset under an
/// existing user name replaces it.
#[derive(Debug, Clone, Default)]
pub struct PresetTable {
    builtin: BTreeMap<String, Preset>,
    user: BTreeMap<String, Preset>,
}

impl PresetTable {
    /// Table holding the built-in looks
    pub fn with_builtins() -> Self {
        let mut table = Self::default();
        for preset in builtin_presets() {
            table.builtin.insert(preset.name.clone(), preset);
        }
        table
    }

    /// Built-ins plus everything persisted in the store
    pub fn load(store: &PresetStore) -> Result<Self> {
        let mut table = Self::with_builtins();
        for preset in store.load()? {
            if let Err(e) = table.register(preset) {
                log::warn!("Ignoring stored preset: {}", e);
            }
        }
        Ok(table)
    }

    pub fn lookup(&self, name: &str) -> Result<&ColorAdjustment> {
        self.get(name)
            .map(|preset| &preset.adjustment)
            .ok_or_else(|| GradeError::UnknownPreset(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Preset> {
        let key = name.trim().to_lowercase();
        self.builtin.get(&key).or_else(|| self.user.get(&key))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtin.contains_key(&name.trim().to_lowercase())
    }

    /// Registers a user preset, returning the one it replaced
    pub fn register(&mut self, preset: Preset) -> Result<Option<Preset>> {
        let name = normalize_name(&preset.name)?;
        if self.builtin.contains_key(&name) {
            return Err(GradeError::DuplicatePreset(name));
        }
        preset.adjustment.validate()?;

        let preset = Preset {
            name: name.clone(),
            source: PresetSource::User,
            ..preset
        };
        Ok(self.user.insert(name, preset))
    }

    /// Built-ins first, then user presets, each sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &Preset> {
        self.builtin.values().chain(self.user.values())
    }

    pub fn len(&self) -> usize {
        self.builtin.len() + self.user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fluent construction of a user preset
#[derive(Debug, Clone)]
pub struct PresetBuilder {
    name: String,
    description: String,
    shadows: ChannelShift,
    midtones: ChannelShift,
    highlights: ChannelShift,
    brightness: i32,
    contrast: i32,
    saturation: i32,
    vignette: i32,
}

impl PresetBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            shadows: ChannelShift::NEUTRAL,
            midtones: ChannelShift::NEUTRAL,
            highlights: ChannelShift::NEUTRAL,
            brightness: 0,
            contrast: 0,
            saturation: 0,
            vignette: 0,
        }
    }

    /// Start from an existing preset's values
    pub fn based_on(mut self, table: &PresetTable, base: &str) -> Result<Self> {
        let adjustment = table.lookup(base)?;
        self.shadows = adjustment.shadows();
        self.midtones = adjustment.midtones();
        self.highlights = adjustment.highlights();
        self.brightness = adjustment.brightness();
        self.contrast = adjustment.contrast();
        self.saturation = adjustment.saturation();
        self.vignette = adjustment.vignette();
        Ok(self)
    }

    pub fn description(mut self, text: &str) -> Self {
        self.description = text.to_string();
        self
    }

    pub fn shadows(mut self, shift: ChannelShift) -> Self {
        self.shadows = shift;
        self
    }

    pub fn midtones(mut self, shift: ChannelShift) -> Self {
        self.midtones = shift;
        self
    }

    pub fn highlights(mut self, shift: ChannelShift) -> Self {
        self.highlights = shift;
        self
    }

    pub fn brightness(mut self, value: i32) -> Self {
        self.brightness = value;
        self
    }

    pub fn contrast(mut self, value: i32) -> Self {
        self.contrast = value;
        self
    }

    pub fn saturation(mut self, value: i32) -> Self {
        self.saturation = value;
        self
    }

    pub fn vignette(mut self, strength: i32) -> Self {
        self.vignette = strength;
        self
    }

    pub fn build(self) -> Result<Preset> {
        let adjustment = ColorAdjustment::new(
            self.shadows,
            self.midtones,
            self.highlights,
            self.brightness,
            self.contrast,
            self.saturation,
        )?
        .with_vignette(self.vignette)?;
        Preset::user(&self.name, &self.description, adjustment)
    }

    /// Build and persist; fails if the name belongs to a built-in
    pub fn save(self, table: &PresetTable, store: &PresetStore) -> Result<Preset> {
        let preset = self.build()?;
        if table.is_builtin(&preset.name) {
            return Err(GradeError::DuplicatePreset(preset.name));
        }
        store.upsert(&preset)?;
        log::info!("Saved preset '{}' to {}", preset.name, store.path().display());
        Ok(preset)
    }
}

fn builtin(
    name: &str,
    description: &str,
    shadows: (i32, i32, i32),
    midtones: (i32, i32, i32),
    highlights: (i32, i32, i32),
    tonal: (i32, i32, i32),
    vignette: i32,
) -> Preset {
    Preset {
        name: name.to_string(),
        description: description.to_string(),
        adjustment: ColorAdjustment::new(
            ChannelShift::new(shadows.0, shadows.1, shadows.2),
            ChannelShift::new(midtones.0, midtones.1, midtones.2),
            ChannelShift::new(highlights.0, highlights.1, highlights.2),
            tonal.0,
            tonal.1,
            tonal.2,
        )
        .and_then(|adjustment| adjustment.with_vignette(vignette))
        .expect("built-in preset values are in range"),
        source: PresetSource::BuiltIn,
    }
}

/// The built-in looks. Tuples are (r, g, b) deltas and (brightness, contrast,
/// saturation), followed by the vignette strength.
fn builtin_presets() -> Vec<Preset> {
    vec![
        builtin(
            "neutral",
            "No grading, re-encode only",
            (0, 0, 0),
            (0, 0, 0),
            (0, 0, 0),
            (0, 0, 0),
            0,
        ),
        builtin(
            "warm",
            "Golden tones with boosted reds",
            (5, 2, -5),
            (12, 6, -6),
            (8, 4, -4),
            (3, 5, 10),
            20,
        ),
        builtin(
            "cool",
            "Blue-leaning shadows and midtones",
            (-6, 0, 10),
            (-8, 0, 12),
            (-4, 0, 6),
            (0, 5, 0),
            0,
        ),
        builtin(
            "vintage",
            "Faded, slightly sepia film look",
            (6, 4, -8),
            (5, 2, -10),
            (4, 0, -12),
            (-5, -10, -15),
            40,
        ),
        builtin(
            "noir",
            "High-contrast black and white",
            (0, 0, 0),
            (0, 0, 0),
            (0, 0, 0),
            (-5, 30, -100),
            40,
        ),
        builtin(
            "cinematic",
            "Teal shadows, orange highlights",
            (-5, 5, 10),
            (0, 0, -5),
            (5, -5, -10),
            (0, 10, 5),
            40,
        ),
        builtin(
            "vibrant",
            "Punchy colors for social media",
            (0, 0, 0),
            (0, 0, 0),
            (0, 0, 0),
            (2, 8, 30),
            0,
        ),
        builtin(
            "food",
            "Warm, saturated look for food footage",
            (4, 1, -4),
            (10, 5, -5),
            (6, 3, -3),
            (5, 12, 20),
            0,
        ),
    ]
}
