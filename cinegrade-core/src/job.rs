use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{GradeError, Result};
use crate::filter_planner::FilterPlan;

/// Kind of media a file extension maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    pub const VIDEO_EXTENSIONS: &'static [&'static str] = &["mp4", "mov"];
    pub const IMAGE_EXTENSIONS: &'static [&'static str] = &["png", "jpg", "jpeg"];

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        if Self::VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else if Self::IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Image)
        } else {
            None
        }
    }
}

/// Output quality tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    #[default]
    #[value(alias = "med")]
    #[serde(alias = "med")]
    Medium,
    High,
}

impl QualityTier {
    /// CRF value for x264/x265 (lower is better)
    pub fn crf(&self) -> u8 {
        match self {
            QualityTier::Low => 28,
            QualityTier::Medium => 23,
            QualityTier::High => 18,
        }
    }

    /// Encoder speed preset
    pub fn encoder_preset(&self) -> &'static str {
        match self {
            QualityTier::Low => "veryfast",
            QualityTier::Medium => "medium",
            QualityTier::High => "slow",
        }
    }

    /// `-q:v` for JPEG output (2 is best)
    pub fn jpeg_quality(&self) -> u8 {
        match self {
            QualityTier::Low => 8,
            QualityTier::Medium => 4,
            QualityTier::High => 2,
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        };
        f.write_str(name)
    }
}

impl FromStr for QualityTier {
    type Err = GradeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(QualityTier::Low),
            "med" | "medium" => Ok(QualityTier::Medium),
            "high" => Ok(QualityTier::High),
            other => Err(GradeError::Config(format!("unknown quality tier '{other}'"))),
        }
    }
}

/// Output frame size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl FromStr for Resolution {
    type Err = GradeError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || GradeError::InvalidResolution(s.to_string());
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(invalid)?;
        let width: u32 = w.parse().map_err(|_| invalid())?;
        let height: u32 = h.parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Resolution { width, height })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Encoding options that are not part of the color grade
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JobOptions {
    pub quality: QualityTier,
    pub fps: Option<f64>,
    pub resolution: Option<Resolution>,
    /// Stop after this many video frames (used for previews)
    pub frame_limit: Option<u32>,
}

/// Fully resolved description of one file's encoder invocation
#[derive(Debug, Clone)]
pub struct JobSpec {
    input_path: PathBuf,
    output_path: PathBuf,
    input_kind: MediaKind,
    output_kind: MediaKind,
    plan: FilterPlan,
    options: JobOptions,
}

impl JobSpec {
    /// Validate paths and formats and freeze the job description.
    ///
    /// Only reads file metadata; nothing is created or written.
    pub fn build(
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        plan: FilterPlan,
        options: JobOptions,
    ) -> Result<Self> {
        let input = input.as_ref();
        let output = output.as_ref();

        let input_kind =
            MediaKind::from_path(input).ok_or_else(|| GradeError::UnsupportedFormat(input.into()))?;
        let output_kind = MediaKind::from_path(output)
            .ok_or_else(|| GradeError::UnsupportedFormat(output.into()))?;

        match (input_kind, output_kind) {
            (MediaKind::Image, MediaKind::Video) => {
                return Err(GradeError::UnsupportedFormat(output.into()));
            }
            (MediaKind::Video, MediaKind::Image) if options.frame_limit.is_none() => {
                return Err(GradeError::UnsupportedFormat(output.into()));
            }
            _ => {}
        }

        if let Some(fps) = options.fps
            && !(fps.is_finite() && fps > 0.0)
        {
            return Err(GradeError::Config(format!("frame rate must be positive, got {fps}")));
        }

        validate_input(input)?;
        validate_output(input, output)?;

        Ok(Self {
            input_path: input.to_path_buf(),
            output_path: output.to_path_buf(),
            input_kind,
            output_kind,
            plan,
            options,
        })
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn input_kind(&self) -> MediaKind {
        self.input_kind
    }

    pub fn output_kind(&self) -> MediaKind {
        self.output_kind
    }

    pub fn plan(&self) -> &FilterPlan {
        &self.plan
    }

    pub fn quality(&self) -> QualityTier {
        self.options.quality
    }

    pub fn fps(&self) -> Option<f64> {
        self.options.fps
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.options.resolution
    }

    pub fn frame_limit(&self) -> Option<u32> {
        self.options.frame_limit
    }
}

fn validate_input(input: &Path) -> Result<()> {
    match fs::metadata(input) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(GradeError::invalid_path(input, "input is not a regular file")),
        Err(e) => Err(GradeError::invalid_path(input, format!("cannot read input: {e}"))),
    }
}

fn validate_output(input: &Path, output: &Path) -> Result<()> {
    let same_file = output == input
        || (output.exists() && fs::canonicalize(output).ok() == fs::canonicalize(input).ok());
    if same_file {
        return Err(GradeError::invalid_path(output, "output would overwrite the input"));
    }

    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let meta = fs::metadata(parent).map_err(|e| {
        GradeError::invalid_path(output, format!("output directory unavailable: {e}"))
    })?;
    if !meta.is_dir() {
        return Err(GradeError::invalid_path(output, "output parent is not a directory"));
    }
    if meta.permissions().readonly() {
        return Err(GradeError::invalid_path(output, "output directory is not writable"));
    }
    if output.is_dir() {
        return Err(GradeError::invalid_path(output, "output is a directory"));
    }
    Ok(())
}
