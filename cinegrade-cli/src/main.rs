use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use cinegrade_core::{
    AdjustmentOverrides, BatchEntry, BatchRunner, BatchSummary, CancelToken, ChannelShift,
    FfmpegEncoder, GradeProcessor, GradeRequest, JobOutcome, PresetBuilder, PresetSource,
    PresetStore, PresetTable, QualityTier, Resolution, Settings, check_ffmpeg, summarize,
};

#[derive(Parser, Debug)]
#[command(name = "cinegrade")]
#[command(about = "Preset-driven color grading for videos and photos, one file or a whole folder")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to $CINEGRADE_CONFIG, then ./cinegrade.json)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Ask FFmpeg for hardware-accelerated decoding
    #[arg(long, global = true)]
    gpu: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Grade a single file
    Process {
        /// Input video or image
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        grade: GradeArgs,
    },

    /// Grade every file in a directory
    Batch {
        /// Directory to read from
        input_dir: PathBuf,

        /// Directory to write graded files to
        #[arg(short, long)]
        output: PathBuf,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Maximum number of files encoded at once
        #[arg(short, long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        jobs: Option<usize>,

        #[command(flatten)]
        grade: GradeArgs,
    },

    /// Render one low-quality still frame to check a look
    Preview {
        /// Input video or image
        input: PathBuf,

        /// Preset to preview
        #[arg(long, value_name = "PRESET")]
        preset: Option<String>,

        /// Where to write the frame (defaults to <temp dir>/<name>_preview.jpg)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List built-in and saved presets
    ListPresets,

    /// Save a new preset to the preset store
    CreatePreset {
        /// Preset name (lowercase letters, digits, '-' or '_')
        name: String,

        /// Start from an existing preset
        #[arg(long, value_name = "PRESET")]
        base: Option<String>,

        /// Short description shown by list-presets
        #[arg(long, default_value = "")]
        description: String,

        #[command(flatten)]
        adjust: AdjustmentArgs,
    },
}

/// Options shared by `process` and `batch`
#[derive(Args, Debug)]
struct GradeArgs {
    /// Use a preset (see list-presets)
    #[arg(long, value_name = "PRESET")]
    preset: Option<String>,

    /// Output quality
    #[arg(short, long, value_enum)]
    quality: Option<QualityTier>,

    /// Output frame rate
    #[arg(long)]
    fps: Option<f64>,

    /// Output size, e.g. 1920x1080
    #[arg(long, value_name = "WxH")]
    resolution: Option<Resolution>,

    #[command(flatten)]
    adjust: AdjustmentArgs,
}

/// Values that replace the preset's own (-100 to 100)
#[derive(Args, Debug, Default)]
struct AdjustmentArgs {
    /// Brightness (-100 to 100)
    #[arg(long, allow_hyphen_values = true)]
    brightness: Option<i32>,

    /// Contrast (-100 to 100)
    #[arg(long, allow_hyphen_values = true)]
    contrast: Option<i32>,

    /// Saturation (-100 to 100)
    #[arg(long, allow_hyphen_values = true)]
    saturation: Option<i32>,

    /// Shadow color balance as r,g,b
    /// Example: "10,0,-10"
    #[arg(long, allow_hyphen_values = true, value_name = "R,G,B")]
    shadows: Option<ChannelShift>,

    /// Midtone color balance as r,g,b
    #[arg(long, allow_hyphen_values = true, value_name = "R,G,B")]
    midtones: Option<ChannelShift>,

    /// Highlight color balance as r,g,b
    #[arg(long, allow_hyphen_values = true, value_name = "R,G,B")]
    highlights: Option<ChannelShift>,

    /// Darken the frame edges (0 to 100, 0 disables)
    #[arg(long)]
    vignette: Option<i32>,
}

impl AdjustmentArgs {
    fn overrides(&self) -> AdjustmentOverrides {
        AdjustmentOverrides {
            brightness: self.brightness,
            contrast: self.contrast,
            saturation: self.saturation,
            shadows: self.shadows,
            midtones: self.midtones,
            highlights: self.highlights,
            vignette: self.vignette,
        }
    }

    fn apply(&self, mut builder: PresetBuilder) -> PresetBuilder {
        if let Some(value) = self.brightness {
            builder = builder.brightness(value);
        }
        if let Some(value) = self.contrast {
            builder = builder.contrast(value);
        }
        if let Some(value) = self.saturation {
            builder = builder.saturation(value);
        }
        if let Some(shift) = self.shadows {
            builder = builder.shadows(shift);
        }
        if let Some(shift) = self.midtones {
            builder = builder.midtones(shift);
        }
        if let Some(shift) = self.highlights {
            builder = builder.highlights(shift);
        }
        if let Some(strength) = self.vignette {
            builder = builder.vignette(strength);
        }
        builder
    }
}

impl GradeArgs {
    fn request(&self, input: &Path, output: &Path) -> GradeRequest {
        let mut request = GradeRequest::new(input, output).overrides(self.adjust.overrides());
        request.preset = self.preset.clone();
        request.quality = self.quality;
        request.fps = self.fps;
        request.resolution = self.resolution;
        request
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let mut settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };
    settings.gpu |= cli.gpu;

    let store = PresetStore::new(&settings.preset_store);
    let table = PresetTable::load(&store)
        .with_context(|| format!("Failed to load presets from {}", store.path().display()))?;

    match cli.command {
        Commands::ListPresets => {
            list_presets(&table);
            Ok(())
        }
        Commands::CreatePreset {
            name,
            base,
            description,
            adjust,
        } => {
            let replacing = table.contains(&name) && !table.is_builtin(&name);
            let mut builder = PresetBuilder::new(&name).description(&description);
            if let Some(base) = &base {
                builder = builder.based_on(&table, base)?;
            }
            let preset = adjust
                .apply(builder)
                .save(&table, &store)
                .with_context(|| format!("Failed to save preset '{}'", name))?;

            if replacing {
                println!("\n✅ Preset '{}' replaced", preset.name);
            } else {
                println!("\n✅ Preset '{}' saved", preset.name);
            }
            println!("   {}", preset.adjustment);
            println!("📁 Preset store: {:?}", store.path());
            Ok(())
        }
        Commands::Process {
            input,
            output,
            grade,
        } => {
            warn_if_ffmpeg_missing(&settings).await;
            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).context("Failed to create output directory")?;
            }

            let processor = GradeProcessor::new(&table, &settings);
            let entries = processor.prepare_all([grade.request(&input, &output)]);
            run_single(&settings, entries).await
        }
        Commands::Preview {
            input,
            preset,
            output,
        } => {
            warn_if_ffmpeg_missing(&settings).await;
            let processor = GradeProcessor::new(&table, &settings);
            let output = output.unwrap_or_else(|| processor.preview_output(&input));
            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).context("Failed to create preview directory")?;
            }

            let mut request = GradeRequest::new(&input, &output).preview();
            request.preset = preset;
            run_single(&settings, processor.prepare_all([request])).await
        }
        Commands::Batch {
            input_dir,
            output,
            recursive,
            jobs,
            grade,
        } => {
            if let Some(jobs) = jobs {
                settings.max_concurrent_jobs = jobs;
                settings.validate()?;
            }
            if !input_dir.is_dir() {
                anyhow::bail!("Input directory does not exist: {:?}", input_dir);
            }
            warn_if_ffmpeg_missing(&settings).await;

            let inputs = collect_inputs(&input_dir, recursive)?;
            if inputs.is_empty() {
                println!("No files found in {:?}", input_dir);
                return Ok(());
            }
            log::info!("Found {} file(s) in {:?}", inputs.len(), input_dir);

            let mut requests = Vec::with_capacity(inputs.len());
            for input in &inputs {
                let target = output_path(&input_dir, &output, input);
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {:?}", parent))?;
                }
                requests.push(grade.request(input, &target));
            }

            let processor = GradeProcessor::new(&table, &settings);
            let entries = processor.prepare_all(requests);
            let outcomes = run_entries(&settings, entries, true).await?;
            let summary = summarize(&outcomes);
            print_summary(&summary);

            if !summary.is_success() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

/// Run a one-entry batch and report it the way a single command should
async fn run_single(settings: &Settings, entries: Vec<BatchEntry>) -> Result<()> {
    let outcomes = run_entries(settings, entries, false).await?;
    let Some(outcome) = outcomes.first() else {
        return Ok(());
    };

    match outcome.status.reason() {
        None => {
            println!("\n✅ Grading completed successfully!");
            if let Some(output) = &outcome.output {
                println!("📁 Output saved to: {:?}", output);
            }
            Ok(())
        }
        Some(reason) => {
            eprintln!("Error: {}", reason);
            std::process::exit(1);
        }
    }
}

async fn run_entries(
    settings: &Settings,
    entries: Vec<BatchEntry>,
    show_progress: bool,
) -> Result<Vec<JobOutcome>> {
    let token = CancelToken::new();
    spawn_ctrl_c_handler(token.clone(), settings.cancel_grace_secs);

    let pb = if show_progress {
        let pb = ProgressBar::new(entries.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let runner = BatchRunner::new(
        FfmpegEncoder::new(settings.clone()),
        settings.max_concurrent_jobs,
    )
    .temp_root(settings.temp_root())
    .cancel_token(token);

    let pb_clone = pb.clone();
    let outcomes = runner
        .run(entries, move |outcome| {
            pb_clone.inc(1);
            let name = outcome
                .input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            pb_clone.set_message(name);
        })
        .await;

    pb.finish_with_message("done");
    Ok(outcomes)
}

fn spawn_ctrl_c_handler(token: CancelToken, grace_secs: u64) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!(
                "Interrupted: finishing running jobs (up to {}s), skipping the rest",
                grace_secs
            );
            token.cancel();
        }
    });
}

async fn warn_if_ffmpeg_missing(settings: &Settings) {
    match check_ffmpeg(&settings.ffmpeg_path).await {
        Ok(version) => {
            log::info!("FFmpeg version {} detected", version);
        }
        Err(e) => {
            eprintln!("Warning: FFmpeg not found!");
            eprintln!("Please install FFmpeg to use this tool.");
            eprintln!();
            eprintln!("Installation instructions:");
            eprintln!("  Ubuntu/Debian: sudo apt install ffmpeg");
            eprintln!("  macOS:         brew install ffmpeg");
            eprintln!("  Windows:       Download from https://ffmpeg.org/download.html");
            eprintln!();
            eprintln!("Details: {}", e);
        }
    }
}

fn list_presets(table: &PresetTable) {
    println!("\nAvailable presets:");
    println!("{:-<50}", "");
    for preset in table.iter() {
        let marker = match preset.source {
            PresetSource::BuiltIn => "",
            PresetSource::User => " (user)",
        };
        println!("{:<15} - {}{}", preset.name, preset.description, marker);
        log::debug!("  {}", preset.adjustment);
    }
    println!("\nUsage: cinegrade process input.mp4 -o output.mp4 --preset warm");
}

/// Regular, non-hidden files under `dir`, sorted by path
fn collect_inputs(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("Failed to read {:?}", dir))?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if entry.file_type().is_file() && !hidden {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Mirror `input`'s position under `input_dir` into `output_dir`
fn output_path(input_dir: &Path, output_dir: &Path, input: &Path) -> PathBuf {
    match input.strip_prefix(input_dir) {
        Ok(relative) => output_dir.join(relative),
        Err(_) => output_dir.join(input.file_name().unwrap_or(input.as_os_str())),
    }
}

fn print_summary(summary: &BatchSummary) {
    println!(
        "\nProcessed {} file(s) in {:.1}s: {} succeeded, {} failed, {} skipped",
        summary.total,
        summary.span.as_secs_f64(),
        summary.succeeded,
        summary.failed,
        summary.skipped
    );
    for failure in &summary.failures {
        let label = if failure.skipped { "skipped" } else { "failed" };
        println!("  {:<8} {:?}: {}", label, failure.input, failure.reason);
    }
    if summary.was_cancelled() {
        println!("\nBatch interrupted: {} file(s) not graded", summary.cancelled);
    } else if summary.is_success() {
        println!("\n✅ Batch completed successfully!");
    }
}
