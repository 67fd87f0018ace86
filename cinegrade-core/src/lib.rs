//! Cinegrade Core - batch color grading on top of the FFmpeg CLI
//!
//! This library turns named looks into FFmpeg filter graphs and runs them
//! over many files at once:
//! - Built-in and user-defined presets with per-call overrides
//! - A fixed-order filter pipeline (color balance, brightness, contrast, saturation, vignette)
//! - Validated job descriptions for video and still images
//! - Bounded-concurrency batch execution with cancellation
//! - Per-batch summaries of successes, failures and skips

pub mod adjustment;
pub mod batch;
pub mod cancel;
pub mod config;
pub mod error;
pub mod ffmpeg_wrapper;
pub mod filter_planner;
pub mod job;
pub mod preset_store;
pub mod presets;
pub mod processor;
pub mod summary;

// Re-export commonly used types at the crate root
pub use adjustment::{AdjustmentOverrides, ChannelShift, ColorAdjustment};
pub use batch::{BatchEntry, BatchRunner, Encoder, FfmpegEncoder, JobOutcome, JobStatus};
pub use cancel::{CancelSignal, CancelToken};
pub use config::Settings;
pub use error::{GradeError, Result};
pub use ffmpeg_wrapper::{FFmpegCommand, check_ffmpeg};
pub use filter_planner::{FilterPlan, FilterStage};
pub use job::{JobOptions, JobSpec, MediaKind, QualityTier, Resolution};
pub use preset_store::PresetStore;
pub use presets::{Preset, PresetBuilder, PresetSource, PresetTable};
pub use processor::{GradeProcessor, GradeRequest};
pub use summary::{BatchSummary, ResultAggregator, summarize};
