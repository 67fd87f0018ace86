use std::path::PathBuf;

/// Errors produced while resolving presets, building jobs and running the encoder.
#[derive(Debug, thiserror::Error)]
pub enum GradeError {
    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    #[error("Preset already exists: {0}")]
    DuplicatePreset(String),

    #[error("Invalid preset name '{0}': use lowercase letters, digits, '-' or '_'")]
    InvalidPresetName(String),

    #[error("{field} is out of range: {value}")]
    InvalidParameterRange { field: String, value: i32 },

    #[error("Unsupported format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("Invalid path {}: {reason}", .path.display())]
    InvalidPath { path: PathBuf, reason: String },

    #[error("Invalid resolution '{0}': expected WIDTHxHEIGHT")]
    InvalidResolution(String),

    #[error("Encoder not available: {0}")]
    EncoderUnavailable(String),

    #[error("Encoder failed with exit code {}: {}", exit_code(.code), last_line(.stderr))]
    EncoderError { code: Option<i32>, stderr: String },

    #[error("Job cancelled")]
    Cancelled,

    #[error("Batch worker crashed: {0}")]
    WorkerCrashed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Preset store error: {0}")]
    PresetStore(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GradeError {
    pub(crate) fn invalid_path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        GradeError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

fn exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

fn last_line(stderr: &str) -> &str {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no diagnostic output")
}

pub type Result<T> = std::result::Result<T, GradeError>;
