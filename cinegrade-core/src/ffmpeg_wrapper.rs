use regex::Regex;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};

use crate::cancel::CancelSignal;
use crate::config::Settings;
use crate::error::{GradeError, Result};
use crate::job::{JobSpec, MediaKind};

/// Bytes of encoder stderr kept for diagnostics
const STDERR_TAIL_BYTES: usize = 4096;

/// FFmpeg command builder with fluent interface
#[derive(Debug, Clone)]
pub struct FFmpegCommand {
    input: PathBuf,
    output: PathBuf,
    video_filters: Vec<String>,
    video_codec: Option<String>,
    audio_codec: Option<String>,
    quality: Option<u8>,
    jpeg_quality: Option<u8>,
    preset: Option<String>,
    frame_rate: Option<f64>,
    size: Option<(u32, u32)>,
    frame_limit: Option<u32>,
    overwrite: bool,
    metadata_args: Vec<String>,
    hw_accel: Option<String>,
}

impl FFmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            video_filters: Vec::new(),
            video_codec: None,
            audio_codec: None,
            quality: None,
            jpeg_quality: None,
            preset: None,
            frame_rate: None,
            size: None,
            frame_limit: None,
            overwrite: false,
            metadata_args: Vec::new(),
            hw_accel: None,
        }
    }

    /// Command for one graded job, writing to `staging_output` instead of
    /// the job's final path
    pub fn for_job(job: &JobSpec, staging_output: impl AsRef<Path>, settings: &Settings) -> Self {
        let mut cmd = FFmpegCommand::new(job.input_path(), staging_output).overwrite();

        if settings.gpu {
            cmd = cmd.hardware_accel("auto");
        }

        for stage in job.plan().active_stages() {
            cmd = cmd.video_filter(&stage.to_ffmpeg());
        }

        match job.output_kind() {
            MediaKind::Video => {
                cmd = cmd
                    .video_codec(&settings.video_codec)
                    .audio_codec(&settings.audio_codec)
                    .quality(job.quality().crf())
                    .preset(job.quality().encoder_preset())
                    .preserve_metadata();
                if let Some(fps) = job.fps() {
                    cmd = cmd.frame_rate(fps);
                }
                if let Some(limit) = job.frame_limit() {
                    cmd = cmd.frame_limit(limit);
                }
            }
            MediaKind::Image => {
                if is_jpeg(job.output_path()) {
                    cmd = cmd.jpeg_quality(job.quality().jpeg_quality());
                }
                // The image muxer writes a single frame.
                cmd = cmd.frame_limit(1);
            }
        }

        if let Some(resolution) = job.resolution() {
            cmd = cmd.size(resolution.width, resolution.height);
        }

        cmd
    }

    /// Set video codec
    pub fn video_codec(mut self, codec: &str) -> Self {
        self.video_codec = Some(codec.to_string());
        self
    }

    /// Set audio codec
    pub fn audio_codec(mut self, codec: &str) -> Self {
        self.audio_codec = Some(codec.to_string());
        self
    }

    /// Set quality (CRF value, 0-51 for x264/x265)
    pub fn quality(mut self, crf: u8) -> Self {
        self.quality = Some(crf);
        self
    }

    /// Set JPEG quality (2-31, lower is better)
    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.jpeg_quality = Some(q);
        self
    }

    /// Set encoding preset (ultrafast, fast, medium, slow, veryslow)
    pub fn preset(mut self, preset: &str) -> Self {
        self.preset = Some(preset.to_string());
        self
    }

    /// Set output frame rate
    pub fn frame_rate(mut self, fps: f64) -> Self {
        self.frame_rate = Some(fps);
        self
    }

    /// Set output frame size
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.size = Some((width, height));
        self
    }

    /// Stop after `frames` video frames
    pub fn frame_limit(mut self, frames: u32) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Enable overwrite without asking
    pub fn overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }

    /// Enable hardware acceleration
    pub fn hardware_accel(mut self, method: &str) -> Self {
        self.hw_accel = Some(method.to_string());
        self
    }

    /// Add a video filter
    pub fn video_filter(mut self, filter: &str) -> Self {
        self.video_filters.push(filter.to_string());
        self
    }

    /// Preserve metadata
    pub fn preserve_metadata(mut self) -> Self {
        self.metadata_args.push("-map_metadata".to_string());
        self.metadata_args.push("0".to_string());
        self.metadata_args.push("-movflags".to_string());
        self.metadata_args.push("use_metadata_tags".to_string());
        self
    }

    /// Filter graph expression, if any filters were added
    pub fn filter_complex(&self) -> Option<String> {
        if self.video_filters.is_empty() {
            None
        } else {
            Some(format!("[0:v]{}[v]", self.video_filters.join(",")))
        }
    }

    /// Argument vector, without the binary name
    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-nostdin".into()];
        args.extend(["-loglevel".into(), "error".into()]);

        // Global options
        if self.overwrite {
            args.push("-y".into());
        }

        if let Some(ref hw) = self.hw_accel {
            args.extend(["-hwaccel".into(), hw.clone()]);
        }

        args.extend(["-i".into(), self.input.to_string_lossy().into_owned()]);

        if let Some(graph) = self.filter_complex() {
            args.extend(["-filter_complex".into(), graph]);
            args.extend(["-map".into(), "[v]".into()]);
            if self.audio_codec.is_some() {
                args.extend(["-map".into(), "0:a?".into()]);
            }
        }

        if let Some(ref codec) = self.video_codec {
            args.extend(["-c:v".into(), codec.clone()]);
        }

        if let Some(ref codec) = self.audio_codec {
            args.extend(["-c:a".into(), codec.clone()]);
        }

        if let Some(crf) = self.quality {
            args.extend(["-crf".into(), crf.to_string()]);
        }

        if let Some(ref preset) = self.preset {
            args.extend(["-preset".into(), preset.clone()]);
        }

        if let Some(q) = self.jpeg_quality {
            args.extend(["-q:v".into(), q.to_string()]);
        }

        if let Some(fps) = self.frame_rate {
            args.extend(["-r".into(), format_rate(fps)]);
        }

        if let Some((width, height)) = self.size {
            args.extend(["-s".into(), format!("{width}x{height}")]);
        }

        if let Some(frames) = self.frame_limit {
            args.extend(["-frames:v".into(), frames.to_string()]);
        }

        args.extend(self.metadata_args.iter().cloned());

        args.push(self.output.to_string_lossy().into_owned());
        args
    }

    /// Build the process for `binary`
    pub fn build(&self, binary: &Path) -> Command {
        let mut cmd = Command::new(binary);
        cmd.args(self.build_args());
        cmd
    }

    /// Run to completion, capturing stderr.
    ///
    /// When `cancel` fires the process gets `grace` to finish on its own and
    /// is killed afterwards.
    pub async fn execute(
        &self,
        binary: &Path,
        cancel: &mut CancelSignal,
        grace: Duration,
    ) -> Result<()> {
        let mut cmd = self.build(binary);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        log::debug!("Executing FFmpeg command: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|e| launch_error(binary, e))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("failed to capture encoder stderr"))?;
        let reader = tokio::spawn(collect_stderr(stderr));

        let finished = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };

        let status = match finished {
            Some(status) => status?,
            None => {
                log::warn!(
                    "Cancellation requested, waiting up to {:?} for {}",
                    grace,
                    self.input.display()
                );
                match tokio::time::timeout(grace, child.wait()).await {
                    Ok(status) => status?,
                    Err(_) => {
                        child.kill().await?;
                        reader.abort();
                        return Err(GradeError::Cancelled);
                    }
                }
            }
        };

        let stderr = reader.await.unwrap_or_default();

        if !status.success() {
            log::error!("FFmpeg failed with output:\n{}", stderr);
            return Err(GradeError::EncoderError {
                code: status.code(),
                stderr,
            });
        }

        Ok(())
    }
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg"))
}

fn format_rate(fps: f64) -> String {
    if fps.fract() == 0.0 {
        format!("{}", fps as u64)
    } else {
        format!("{fps:.3}")
    }
}

fn launch_error(binary: &Path, e: io::Error) -> GradeError {
    match e.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
            GradeError::EncoderUnavailable(format!("{}: {}", binary.display(), e))
        }
        _ => GradeError::Io(e),
    }
}

async fn collect_stderr(stderr: ChildStderr) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail: VecDeque<String> = VecDeque::new();
    let mut size = 0usize;

    while let Ok(Some(line)) = lines.next_line().await {
        size += line.len() + 1;
        tail.push_back(line);
        while size > STDERR_TAIL_BYTES && tail.len() > 1 {
            if let Some(dropped) = tail.pop_front() {
                size -= dropped.len() + 1;
            }
        }
    }

    Vec::from(tail).join("\n")
}

/// Check if FFmpeg is available and return version info
pub async fn check_ffmpeg(binary: &Path) -> Result<String> {
    let output = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| launch_error(binary, e))?;

    let version = String::from_utf8_lossy(&output.stdout);

    // Extract version number
    let version_regex = Regex::new(r"ffmpeg version (\S+)").map_err(io::Error::other)?;
    if let Some(caps) = version_regex.captures(&version) {
        Ok(caps[1].to_string())
    } else {
        Ok("unknown".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjustment::{AdjustmentOverrides, ColorAdjustment};
    use crate::filter_planner;
    use crate::job::{JobOptions, QualityTier};
    use std::fs;
    use tempfile::tempdir;

    fn arg_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    fn job(dir: &Path, input: &str, output: &str, options: JobOptions) -> JobSpec {
        let input = dir.join(input);
        fs::write(&input, b"fake").unwrap();
        let adjustment = ColorAdjustment::tonal(10, 20, -30).unwrap();
        let plan = filter_planner::plan(&adjustment, &AdjustmentOverrides::default()).unwrap();
        JobSpec::build(&input, dir.join(output), plan, options).unwrap()
    }

    #[test]
    fn test_video_job_arguments() {
        let dir = tempdir().unwrap();
        let options = JobOptions {
            quality: QualityTier::High,
            fps: Some(30.0),
            resolution: Some("1280x720".parse().unwrap()),
            frame_limit: None,
        };
        let job = job(dir.path(), "in.mp4", "out.mp4", options);
        let args = FFmpegCommand::for_job(&job, dir.path().join("stage.mp4"), &Settings::default())
            .build_args();

        assert_eq!(
            arg_after(&args, "-filter_complex"),
            Some("[0:v]eq=brightness=0.10,eq=contrast=1.20,eq=saturation=0.70[v]")
        );
        assert_eq!(arg_after(&args, "-crf"), Some("18"));
        assert_eq!(arg_after(&args, "-preset"), Some("slow"));
        assert_eq!(arg_after(&args, "-c:v"), Some("libx264"));
        assert_eq!(arg_after(&args, "-r"), Some("30"));
        assert_eq!(arg_after(&args, "-s"), Some("1280x720"));
        assert!(args.iter().any(|a| a == "0:a?"));
        assert!(!args.iter().any(|a| a == "-hwaccel"));
        assert!(args.last().unwrap().ends_with("stage.mp4"));
        assert!(args.contains(&"-y".to_string()));
    }

    #[test]
    fn test_image_job_arguments() {
        let dir = tempdir().unwrap();
        let job = job(dir.path(), "in.png", "out.jpg", JobOptions::default());
        let settings = Settings {
            gpu: true,
            ..Settings::default()
        };
        let args = FFmpegCommand::for_job(&job, dir.path().join("stage.jpg"), &settings).build_args();

        assert_eq!(arg_after(&args, "-hwaccel"), Some("auto"));
        assert_eq!(arg_after(&args, "-q:v"), Some("4"));
        assert_eq!(arg_after(&args, "-frames:v"), Some("1"));
        assert!(arg_after(&args, "-crf").is_none());
        assert!(!args.iter().any(|a| a == "0:a?"));
    }

    #[test]
    fn test_hwaccel_precedes_input() {
        let args = FFmpegCommand::new("a.mp4", "b.mp4")
            .hardware_accel("auto")
            .build_args();
        let hw = args.iter().position(|a| a == "-hwaccel").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(hw < input);
    }

    #[test]
    fn test_no_filters_means_no_graph() {
        let cmd = FFmpegCommand::new("a.mp4", "b.mp4");
        assert!(cmd.filter_complex().is_none());
        assert!(!cmd.build_args().iter().any(|a| a == "-filter_complex"));
    }

    #[test]
    fn test_fractional_frame_rate() {
        assert_eq!(format_rate(23.976), "23.976");
        assert_eq!(format_rate(60.0), "60");
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let err = check_ffmpeg(Path::new("/nonexistent/cinegrade-ffmpeg"))
            .await
            .unwrap_err();
        assert!(matches!(err, GradeError::EncoderUnavailable(_)));
    }
}
