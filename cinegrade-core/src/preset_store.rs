use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::adjustment::ColorAdjustment;
use crate::error::{GradeError, Result};
use crate::presets::Preset;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    presets: BTreeMap<String, StoredPreset>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredPreset {
    #[serde(default)]
    description: String,
    adjustment: ColorAdjustment,
}

/// JSON file holding user-defined presets
#[derive(Debug, Clone)]
pub struct PresetStore {
    path: PathBuf,
}

impl PresetStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored presets; a missing file is an empty store
    pub fn load(&self) -> Result<Vec<Preset>> {
        let file = self.read()?;
        file.presets
            .into_iter()
            .map(|(name, stored)| Preset::user(&name, &stored.description, stored.adjustment))
            .collect()
    }

    /// Insert or replace a preset and rewrite the file
    pub fn upsert(&self, preset: &Preset) -> Result<()> {
        let mut file = self.read()?;
        let previous = file.presets.insert(
            preset.name.clone(),
            StoredPreset {
                description: preset.description.clone(),
                adjustment: preset.adjustment,
            },
        );
        if previous.is_some() {
            log::info!("Replacing stored preset '{}'", preset.name);
        }
        self.write(&file)
    }

    fn read(&self) -> Result<StoreFile> {
        if !self.path.exists() {
            return Ok(StoreFile::default());
        }

        let content = fs::read_to_string(&self.path)?;
        serde_json::from_str(&content).map_err(|e| {
            GradeError::PresetStore(format!("failed to parse {}: {}", self.path.display(), e))
        })
    }

    fn write(&self, file: &StoreFile) -> Result<()> {
        let content = serde_json::to_string_pretty(file)
            .map_err(|e| GradeError::PresetStore(format!("failed to serialize presets: {e}")))?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        // Write next to the target and rename so readers never see a partial file.
        let mut staged = tempfile::NamedTempFile::new_in(&dir)?;
        staged.write_all(content.as_bytes())?;
        staged.flush()?;
        staged.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
