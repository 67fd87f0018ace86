use std::path::{Path, PathBuf};

use crate::adjustment::AdjustmentOverrides;
use crate::batch::BatchEntry;
use crate::config::Settings;
use crate::error::Result;
use crate::filter_planner;
use crate::job::{JobOptions, JobSpec, QualityTier, Resolution};
use crate::presets::PresetTable;

/// One file to grade, as asked for by the caller
#[derive(Debug, Clone, Default)]
pub struct GradeRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Falls back to the configured default preset
    pub preset: Option<String>,
    pub overrides: AdjustmentOverrides,
    /// Falls back to the configured quality
    pub quality: Option<QualityTier>,
    pub fps: Option<f64>,
    pub resolution: Option<Resolution>,
    pub frame_limit: Option<u32>,
}

impl GradeRequest {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn preset(mut self, name: &str) -> Self {
        self.preset = Some(name.to_string());
        self
    }

    pub fn overrides(mut self, overrides: AdjustmentOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn quality(mut self, quality: QualityTier) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Single low-quality still frame
    pub fn preview(mut self) -> Self {
        self.quality = Some(QualityTier::Low);
        self.frame_limit = Some(1);
        self
    }
}

/// Turns grade requests into validated jobs
pub struct GradeProcessor<'a> {
    presets: &'a PresetTable,
    settings: &'a Settings,
}

impl<'a> GradeProcessor<'a> {
    pub fn new(presets: &'a PresetTable, settings: &'a Settings) -> Self {
        Self { presets, settings }
    }

    pub fn prepare(&self, request: &GradeRequest) -> Result<JobSpec> {
        let preset = request
            .preset
            .as_deref()
            .unwrap_or(&self.settings.default_preset);
        let base = self.presets.lookup(preset)?;
        let plan = filter_planner::plan(base, &request.overrides)?;

        let options = JobOptions {
            quality: request.quality.unwrap_or(self.settings.quality),
            fps: request.fps,
            resolution: request.resolution,
            frame_limit: request.frame_limit,
        };
        let job = JobSpec::build(&request.input, &request.output, plan, options)?;

        log::debug!(
            "Prepared {} with preset '{}'{}: {}",
            job.input_path().display(),
            preset,
            if request.overrides.is_empty() { "" } else { " and overrides" },
            job.plan().filter_graph().as_deref().unwrap_or("no filters")
        );
        Ok(job)
    }

    /// Prepare every request; failures become rejected entries in place
    pub fn prepare_all<I>(&self, requests: I) -> Vec<BatchEntry>
    where
        I: IntoIterator<Item = GradeRequest>,
    {
        requests
            .into_iter()
            .map(|request| match self.prepare(&request) {
                Ok(job) => BatchEntry::Ready(job),
                Err(reason) => BatchEntry::Rejected {
                    input: request.input,
                    reason,
                },
            })
            .collect()
    }

    /// Default output for a preview: `<temp root>/<stem>_preview.jpg`
    pub fn preview_output(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame".to_string());
        self.settings
            .temp_root()
            .join(format!("{stem}_preview.jpg"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjustment::ColorAdjustment;
    use crate::batch::{BatchRunner, Encoder, JobStatus};
    use crate::cancel::CancelSignal;
    use crate::error::GradeError;
    use crate::presets::Preset;
    use std::fs;
    use tempfile::tempdir;

    struct CopyEncoder;

    impl Encoder for CopyEncoder {
        async fn encode(&self, job: &JobSpec, staging: &Path, _cancel: CancelSignal) -> Result<()> {
            fs::copy(job.input_path(), staging)?;
            Ok(())
        }
    }

    fn table() -> PresetTable {
        let mut table = PresetTable::with_builtins();
        table
            .register(Preset::user("a", "", ColorAdjustment::tonal(10, 0, 0).unwrap()).unwrap())
            .unwrap();
        table
            .register(Preset::user("b", "", ColorAdjustment::tonal(-5, 0, 0).unwrap()).unwrap())
            .unwrap();
        table
    }

    #[test]
    fn test_defaults_come_from_settings() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("clip.mp4");
        fs::write(&input, b"fake").unwrap();

        let table = table();
        let settings = Settings {
            default_preset: "a".to_string(),
            quality: QualityTier::High,
            ..Settings::default()
        };
        let processor = GradeProcessor::new(&table, &settings);
        let job = processor
            .prepare(&GradeRequest::new(&input, dir.path().join("graded.mp4")))
            .unwrap();

        assert_eq!(job.plan().adjustment().brightness(), 10);
        assert_eq!(job.quality(), QualityTier::High);
    }

    #[test]
    fn test_overrides_win_over_preset() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("clip.mp4");
        fs::write(&input, b"fake").unwrap();

        let table = table();
        let settings = Settings::default();
        let processor = GradeProcessor::new(&table, &settings);
        let request = GradeRequest::new(&input, dir.path().join("graded.mp4"))
            .preset("a")
            .overrides(AdjustmentOverrides::default().brightness(-20));
        let job = processor.prepare(&request).unwrap();

        assert_eq!(job.plan().adjustment().brightness(), -20);
    }

    #[test]
    fn test_unknown_preset_is_rejected() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("clip.mp4");
        fs::write(&input, b"fake").unwrap();

        let table = table();
        let settings = Settings::default();
        let processor = GradeProcessor::new(&table, &settings);
        let result =
            processor.prepare(&GradeRequest::new(&input, dir.path().join("o.mp4")).preset("Warm2"));
        assert!(matches!(result, Err(GradeError::UnknownPreset(name)) if name == "Warm2"));
    }

    #[test]
    fn test_preview_request_and_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("holiday.mov");
        fs::write(&input, b"fake").unwrap();

        let table = table();
        let settings = Settings {
            temp_dir: Some(dir.path().to_path_buf()),
            ..Settings::default()
        };
        let processor = GradeProcessor::new(&table, &settings);
        let output = processor.preview_output(&input);
        assert_eq!(output, dir.path().join("holiday_preview.jpg"));

        let job = processor
            .prepare(&GradeRequest::new(&input, &output).preset("warm").preview())
            .unwrap();
        assert_eq!(job.quality(), QualityTier::Low);
        assert_eq!(job.frame_limit(), Some(1));
    }

    #[tokio::test]
    async fn test_mixed_batch_skips_unsupported_and_runs_the_rest() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        for name in ["x.mp4", "y.jpg", "z.avi"] {
            fs::write(dir.path().join(name), name.as_bytes()).unwrap();
        }

        let table = table();
        let settings = Settings::default();
        let processor = GradeProcessor::new(&table, &settings);
        let requests = [("x.mp4", "a"), ("y.jpg", "b"), ("z.avi", "a")]
            .into_iter()
            .map(|(name, preset)| {
                GradeRequest::new(dir.path().join(name), out.join(name)).preset(preset)
            });
        let entries = processor.prepare_all(requests);
        assert!(matches!(entries[2], BatchEntry::Rejected { .. }));

        let runner = BatchRunner::new(CopyEncoder, 2);
        let outcomes = runner.run(entries, |_| {}).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].status.is_success());
        assert!(outcomes[1].status.is_success());
        assert!(matches!(
            outcomes[2].status,
            JobStatus::Skipped(GradeError::UnsupportedFormat(_))
        ));
        assert!(!outcomes[2].was_executed());
        assert_eq!(fs::read(out.join("x.mp4")).unwrap(), b"x.mp4");
        assert_eq!(fs::read(out.join("y.jpg")).unwrap(), b"y.jpg");
        assert!(!out.join("z.avi").exists());
    }
}
