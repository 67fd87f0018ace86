//! Bounded-concurrency execution of graded jobs.
//!
//! A fixed pool of workers pulls jobs from a FIFO queue, so at most
//! `max_concurrent` encoder processes run at once. Validation failures are
//! reported as skipped without taking a slot, and a failing job never stops
//! its siblings.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::cancel::{CancelSignal, CancelToken};
use crate::config::Settings;
use crate::error::{GradeError, Result};
use crate::ffmpeg_wrapper::FFmpegCommand;
use crate::job::JobSpec;

/// Runs one job, writing the result to `staging`.
///
/// `staging` lives in a job-local directory that is removed once the job ends.
pub trait Encoder: Send + Sync + 'static {
    fn encode(
        &self,
        job: &JobSpec,
        staging: &Path,
        cancel: CancelSignal,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Encoder backed by the FFmpeg CLI
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    settings: Settings,
}

impl FfmpegEncoder {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

impl Encoder for FfmpegEncoder {
    async fn encode(&self, job: &JobSpec, staging: &Path, mut cancel: CancelSignal) -> Result<()> {
        FFmpegCommand::for_job(job, staging, &self.settings)
            .execute(
                &self.settings.ffmpeg_path,
                &mut cancel,
                self.settings.cancel_grace(),
            )
            .await
    }
}

/// One unit of work handed to the runner
#[derive(Debug)]
pub enum BatchEntry {
    Ready(JobSpec),
    /// Failed validation; reported as skipped and never executed
    Rejected { input: PathBuf, reason: GradeError },
}

impl BatchEntry {
    pub fn input(&self) -> &Path {
        match self {
            BatchEntry::Ready(job) => job.input_path(),
            BatchEntry::Rejected { input, .. } => input,
        }
    }
}

#[derive(Debug)]
pub enum JobStatus {
    Succeeded,
    Failed(GradeError),
    Skipped(GradeError),
}

impl JobStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Succeeded)
    }

    pub fn reason(&self) -> Option<&GradeError> {
        match self {
            JobStatus::Succeeded => None,
            JobStatus::Failed(e) | JobStatus::Skipped(e) => Some(e),
        }
    }
}

/// Result of one entry in a batch
#[derive(Debug)]
pub struct JobOutcome {
    /// Position of the entry in the submitted batch
    pub index: usize,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub status: JobStatus,
    pub started_at: Instant,
    pub duration: Duration,
}

impl JobOutcome {
    fn skipped(index: usize, input: PathBuf, reason: GradeError) -> Self {
        Self {
            index,
            input,
            output: None,
            status: JobStatus::Skipped(reason),
            started_at: Instant::now(),
            duration: Duration::ZERO,
        }
    }

    /// Whether the job reached the encoder
    pub fn was_executed(&self) -> bool {
        !matches!(self.status, JobStatus::Skipped(_))
    }
}

type Queue = Mutex<VecDeque<(usize, JobSpec)>>;

/// Job a worker has taken off the queue but not yet reported
struct Claim {
    index: usize,
    input: PathBuf,
    output: PathBuf,
    started_at: Instant,
}

/// Claims keyed by worker slot
type InFlight = Mutex<HashMap<usize, Claim>>;

pub struct BatchRunner<E> {
    encoder: Arc<E>,
    max_concurrent: usize,
    temp_root: PathBuf,
    cancel: CancelToken,
}

impl<E: Encoder> BatchRunner<E> {
    pub fn new(encoder: E, max_concurrent: usize) -> Self {
        Self {
            encoder: Arc::new(encoder),
            max_concurrent: max_concurrent.max(1),
            temp_root: std::env::temp_dir(),
            cancel: CancelToken::new(),
        }
    }

    /// Directory under which job-local working directories are created
    pub fn temp_root(mut self, dir: impl AsRef<Path>) -> Self {
        self.temp_root = dir.as_ref().to_path_buf();
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Execute every entry, calling `on_outcome` as each one finishes.
    ///
    /// Returns one outcome per entry, in submission order.
    pub async fn run<F>(&self, entries: Vec<BatchEntry>, on_outcome: F) -> Vec<JobOutcome>
    where
        F: Fn(&JobOutcome) + Send + Sync + 'static,
    {
        let total = entries.len();
        let on_outcome = Arc::new(on_outcome);
        let outcomes: Arc<Mutex<Vec<JobOutcome>>> = Arc::new(Mutex::new(Vec::with_capacity(total)));
        let queue: Arc<Queue> = Arc::new(Mutex::new(VecDeque::new()));

        for (index, entry) in entries.into_iter().enumerate() {
            match entry {
                BatchEntry::Ready(job) => lock(&queue).push_back((index, job)),
                BatchEntry::Rejected { input, reason } => {
                    log::warn!("Skipping {}: {}", input.display(), reason);
                    let outcome = JobOutcome::skipped(index, input, reason);
                    (*on_outcome)(&outcome);
                    lock(&outcomes).push(outcome);
                }
            }
        }

        let queued = lock(&queue).len();
        log::info!(
            "Starting batch: {} job(s) queued, {} skipped, {} slot(s)",
            queued,
            total - queued,
            self.max_concurrent
        );

        let in_flight: Arc<InFlight> = Arc::new(Mutex::new(HashMap::new()));
        loop {
            let pending = lock(&queue).len();
            if pending == 0 || self.cancel.is_cancelled() {
                break;
            }

            let workers: Vec<_> = (0..self.max_concurrent.min(pending))
                .map(|slot| {
                    let worker = Worker {
                        slot,
                        encoder: Arc::clone(&self.encoder),
                        queue: Arc::clone(&queue),
                        in_flight: Arc::clone(&in_flight),
                        outcomes: Arc::clone(&outcomes),
                        on_outcome: Arc::clone(&on_outcome),
                        temp_root: self.temp_root.clone(),
                        cancel: self.cancel.clone(),
                    };
                    (slot, tokio::spawn(worker.run()))
                })
                .collect();

            for (slot, handle) in workers {
                let Err(e) = handle.await else {
                    continue;
                };
                log::error!("Batch worker {} terminated abnormally: {}", slot, e);
                let claim = lock(&in_flight).remove(&slot);
                if let Some(claim) = claim {
                    let outcome = JobOutcome {
                        index: claim.index,
                        input: claim.input,
                        output: Some(claim.output),
                        status: JobStatus::Failed(GradeError::WorkerCrashed(e.to_string())),
                        started_at: claim.started_at,
                        duration: claim.started_at.elapsed(),
                    };
                    (*on_outcome)(&outcome);
                    lock(&outcomes).push(outcome);
                }
            }
            // Only a crash ends a round with jobs still queued.
        }

        // Whatever is still queued was never admitted.
        let leftover: Vec<_> = lock(&queue).drain(..).collect();
        for (index, job) in leftover {
            let outcome =
                JobOutcome::skipped(index, job.input_path().to_path_buf(), GradeError::Cancelled);
            (*on_outcome)(&outcome);
            lock(&outcomes).push(outcome);
        }

        let mut collected = std::mem::take(&mut *lock(&outcomes));
        collected.sort_by_key(|outcome| outcome.index);
        collected
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Worker<E, F> {
    slot: usize,
    encoder: Arc<E>,
    queue: Arc<Queue>,
    in_flight: Arc<InFlight>,
    outcomes: Arc<Mutex<Vec<JobOutcome>>>,
    on_outcome: Arc<F>,
    temp_root: PathBuf,
    cancel: CancelToken,
}

impl<E, F> Worker<E, F>
where
    E: Encoder,
    F: Fn(&JobOutcome) + Send + Sync + 'static,
{
    async fn run(self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let next = lock(&self.queue).pop_front();
            let Some((index, job)) = next else {
                break;
            };

            let claim = Claim {
                index,
                input: job.input_path().to_path_buf(),
                output: job.output_path().to_path_buf(),
                started_at: Instant::now(),
            };
            lock(&self.in_flight).insert(self.slot, claim);

            let outcome = self.execute(index, job).await;
            (*self.on_outcome)(&outcome);
            lock(&self.outcomes).push(outcome);
            lock(&self.in_flight).remove(&self.slot);
        }
    }

    async fn execute(&self, index: usize, job: JobSpec) -> JobOutcome {
        let started_at = Instant::now();
        log::info!(
            "[slot {}] Grading {} -> {}",
            self.slot,
            job.input_path().display(),
            job.output_path().display()
        );

        let result = self.encode_in_workdir(&job).await;
        let duration = started_at.elapsed();

        let status = match result {
            Ok(()) => {
                log::info!(
                    "[slot {}] Finished {} in {:.1}s",
                    self.slot,
                    job.output_path().display(),
                    duration.as_secs_f64()
                );
                JobStatus::Succeeded
            }
            Err(e) => {
                log::error!("[slot {}] {} failed: {}", self.slot, job.input_path().display(), e);
                JobStatus::Failed(e)
            }
        };

        JobOutcome {
            index,
            input: job.input_path().to_path_buf(),
            output: Some(job.output_path().to_path_buf()),
            status,
            started_at,
            duration,
        }
    }

    /// The working directory guard is dropped on every exit path, including
    /// encoder failure and cancellation.
    async fn encode_in_workdir(&self, job: &JobSpec) -> Result<()> {
        let workdir = tempfile::Builder::new()
            .prefix("cinegrade-job-")
            .tempdir_in(&self.temp_root)?;

        let file_name = job
            .output_path()
            .file_name()
            .ok_or_else(|| GradeError::invalid_path(job.output_path(), "output has no file name"))?;
        let staging = workdir.path().join(file_name);

        self.encoder
            .encode(job, &staging, self.cancel.signal())
            .await?;

        if !staging.is_file() {
            return Err(GradeError::EncoderError {
                code: Some(0),
                stderr: "encoder exited successfully but produced no output".to_string(),
            });
        }

        publish(&staging, job.output_path()).await
    }
}

/// Move the staged result into place; copy when crossing filesystems
async fn publish(staging: &Path, output: &Path) -> Result<()> {
    if tokio::fs::rename(staging, output).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(staging, output).await?;
    Ok(())
}
