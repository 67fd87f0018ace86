use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GradeError, Result};
use crate::job::QualityTier;

/// Config file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "cinegrade.json";
pub const CONFIG_ENV: &str = "CINEGRADE_CONFIG";
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 3;

/// Process-wide settings, read once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_preset: String,
    pub quality: QualityTier,
    /// Root for job-local working directories; system temp dir when unset
    pub temp_dir: Option<PathBuf>,
    /// Ask FFmpeg for hardware-accelerated decoding
    pub gpu: bool,
    pub max_concurrent_jobs: usize,
    pub ffmpeg_path: PathBuf,
    pub preset_store: PathBuf,
    pub video_codec: String,
    pub audio_codec: String,
    /// How long in-flight jobs may keep running after cancellation
    pub cancel_grace_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_preset: "neutral".to_string(),
            quality: QualityTier::Medium,
            temp_dir: None,
            gpu: false,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            preset_store: PathBuf::from("cinegrade-presets.json"),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            cancel_grace_secs: 10,
        }
    }
}

impl Settings {
    /// Resolve settings from an explicit file, `CINEGRADE_CONFIG`, or
    /// `cinegrade.json` in the working directory, then apply environment
    /// overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut settings = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path)?,
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.exists() {
                    Self::from_file(local)?
                } else {
                    Self::default()
                }
            }
        };

        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            GradeError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| GradeError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Apply `CINEGRADE_*` overrides using the given variable lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(preset) = lookup("CINEGRADE_PRESET") {
            self.default_preset = preset;
        }
        if let Some(quality) = lookup("CINEGRADE_QUALITY") {
            self.quality = quality.parse()?;
        }
        if let Some(dir) = lookup("CINEGRADE_TEMP_DIR") {
            self.temp_dir = Some(PathBuf::from(dir));
        }
        if let Some(gpu) = lookup("CINEGRADE_GPU") {
            self.gpu = parse_bool("CINEGRADE_GPU", &gpu)?;
        }
        if let Some(jobs) = lookup("CINEGRADE_MAX_JOBS") {
            self.max_concurrent_jobs = jobs.trim().parse().map_err(|_| {
                GradeError::Config(format!("CINEGRADE_MAX_JOBS must be a number, got '{jobs}'"))
            })?;
        }
        if let Some(path) = lookup("CINEGRADE_FFMPEG") {
            self.ffmpeg_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("CINEGRADE_PRESET_STORE") {
            self.preset_store = PathBuf::from(path);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(GradeError::Config(
                "max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.default_preset.trim().is_empty() {
            return Err(GradeError::Config("default_preset must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn temp_root(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_secs(self.cancel_grace_secs)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(GradeError::Config(format!("{key} must be a boolean, got '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.max_concurrent_jobs, 3);
        assert_eq!(settings.quality, QualityTier::Medium);
        assert_eq!(settings.default_preset, "neutral");
        assert!(!settings.gpu);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cinegrade.json");
        fs::write(&path, r#"{"quality": "high", "max_concurrent_jobs": 5}"#).unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.quality, QualityTier::High);
        assert_eq!(settings.max_concurrent_jobs, 5);
        assert_eq!(settings.video_codec, "libx264");
    }

    #[test]
    fn test_explicit_file_and_env_overrides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.json");
        fs::write(&path, r#"{"default_preset": "warm"}"#).unwrap();

        let mut settings = Settings::from_file(&path).unwrap();
        settings
            .apply_env(env(&[
                ("CINEGRADE_QUALITY", "low"),
                ("CINEGRADE_GPU", "yes"),
                ("CINEGRADE_MAX_JOBS", "8"),
                ("CINEGRADE_FFMPEG", "/opt/ffmpeg/bin/ffmpeg"),
            ]))
            .unwrap();

        assert_eq!(settings.default_preset, "warm");
        assert_eq!(settings.quality, QualityTier::Low);
        assert!(settings.gpu);
        assert_eq!(settings.max_concurrent_jobs, 8);
        assert_eq!(settings.ffmpeg_path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
    }

    #[test]
    fn test_bad_env_values_are_errors() {
        let mut settings = Settings::default();
        assert!(settings.apply_env(env(&[("CINEGRADE_MAX_JOBS", "many")])).is_err());
        assert!(settings.apply_env(env(&[("CINEGRADE_GPU", "maybe")])).is_err());
        assert!(settings.apply_env(env(&[("CINEGRADE_QUALITY", "ultra")])).is_err());
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let settings = Settings {
            max_concurrent_jobs: 0,
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(GradeError::Config(_))));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Settings::from_file(&path), Err(GradeError::Config(_))));
    }
}
