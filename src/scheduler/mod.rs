//! Batch scheduling of icon tasks.
//!
//! A run walks through a fixed sequence of phases:
//!
//! ```text
//! Idle ─► CacheWarming ─► ┌ Dispatching ─► Draining ┐ ─► Finalizing ─► Idle
//!                         └──────── per batch ◄──────┘
//! ```
//!
//! Tasks are cut into batches. Each batch gets a fresh rayon pool; its
//! tasks are spawned onto it and their results come back over a channel.
//! The next batch starts only once every task of the current one has
//! reported or the batch deadline has passed, so at most one batch worth
//! of pixel buffers is ever live.

pub mod progress;

pub use progress::{Progress, ProgressEstimator};

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam::channel;
use parking_lot::Mutex;
use rayon::ThreadPoolBuilder;

use crate::cache::MaskCache;
use crate::config::{PerformanceSettings, RunConfig};
use crate::error::{RunError, TaskError};
use crate::icon::IconTask;
use crate::mask::{RegionFiller, SilhouetteExtractor, detect_strategy};
use crate::pipeline::{IconProcessor, TaskOutcome};
use crate::pool::BufferPool;
use crate::raster::Rasterizer;
use crate::shortcut::Shortcut;

// ============================================================================
// Run Phase & Report
// ============================================================================

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    CacheWarming,
    Dispatching,
    Draining,
    Finalizing,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunPhase::Idle => "idle",
            RunPhase::CacheWarming => "cache warming",
            RunPhase::Dispatching => "dispatching",
            RunPhase::Draining => "draining",
            RunPhase::Finalizing => "finalizing",
        })
    }
}

/// A task that did not produce its outputs.
#[derive(Debug)]
pub struct TaskFailure {
    pub package: String,
    pub icon: String,
    pub error: TaskError,
}

/// Summary of a finished run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub successful: usize,
    pub total: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub failures: Vec<TaskFailure>,
    pub elapsed: Duration,
    /// Where the lock-screen shortcut was written, if one was requested
    /// and rendered.
    pub shortcut: Option<PathBuf>,
}

impl RunReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Returns true if every task succeeded.
    pub fn is_success(&self) -> bool {
        self.successful == self.total
    }
}

// ============================================================================
// Per-run State
// ============================================================================

struct RunProgress {
    completed: usize,
    estimator: ProgressEstimator,
    report: RunReport,
}

/// Counters and timing of one run. Created by [`BatchScheduler::run`] and
/// dropped with it.
struct SchedulerState {
    inner: Mutex<RunProgress>,
}

impl SchedulerState {
    fn new(total: usize) -> Self {
        Self {
            inner: Mutex::new(RunProgress {
                completed: 0,
                estimator: ProgressEstimator::new(total),
                report: RunReport {
                    total,
                    ..RunReport::default()
                },
            }),
        }
    }

    fn record(&self, task: &IconTask, result: Result<TaskOutcome, TaskError>) {
        let mut inner = self.inner.lock();
        inner.completed += 1;

        match result {
            Ok(outcome) => {
                inner.report.successful += 1;
                match outcome {
                    TaskOutcome::CacheHit => inner.report.cache_hits += 1,
                    TaskOutcome::CacheMiss => inner.report.cache_misses += 1,
                    TaskOutcome::Outlined => {}
                }
            }
            Err(error) => {
                log::warn!("failed: {} ({}): {error}", task.icon, task.package);
                inner.report.failures.push(TaskFailure {
                    package: task.package.clone(),
                    icon: task.icon.clone(),
                    error,
                });
            }
        }

        let count = inner.completed;
        match inner.estimator.record(count, Instant::now()) {
            Progress::Started => {}
            tick @ Progress::Tick { .. } => {
                log::debug!("{tick} - {} ({})", task.icon, task.package)
            }
            sample @ Progress::Sample { .. } => {
                log::info!("{sample} - {} ({})", task.icon, task.package)
            }
        }
    }

    fn into_report(self) -> RunReport {
        self.inner.into_inner().report
    }
}

// ============================================================================
// BatchScheduler
// ============================================================================

type TaskResult = (usize, Result<TaskOutcome, TaskError>);

/// Drives a list of [`IconTask`]s through an [`IconProcessor`].
pub struct BatchScheduler {
    processor: Arc<IconProcessor>,
    batch_size: usize,
    max_workers: usize,
    task_timeout: Option<Duration>,
    shortcut: Option<Shortcut>,
    phase: Mutex<RunPhase>,
}

impl BatchScheduler {
    /// Creates a scheduler with the default performance settings.
    pub fn new(processor: Arc<IconProcessor>) -> Self {
        let perf = PerformanceSettings::default();
        Self {
            batch_size: perf.batch_size_for(processor.extractor().strategy()),
            max_workers: perf.effective_max_workers(),
            task_timeout: perf.task_timeout(),
            shortcut: None,
            processor,
            phase: Mutex::new(RunPhase::Idle),
        }
    }

    /// Wires up every collaborator described by `config`.
    ///
    /// The binarization strategy is detected once here and also decides
    /// the batch size.
    pub fn from_config(
        config: &RunConfig,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> Result<Self, RunError> {
        let spec = config.render_spec()?;
        let perf = &config.performance;
        let paths = &config.paths;

        let strategy = detect_strategy();
        let batch_size = perf.batch_size_for(strategy.as_ref());
        let filler = RegionFiller::with_workers(perf.fill_workers)?;
        let cache = MaskCache::new(
            paths.cache_dir.clone(),
            paths.manifest.clone(),
            paths.archive.clone(),
            spec.supersampling,
        );

        let processor = IconProcessor::new(
            spec,
            paths.output_dir.clone(),
            rasterizer,
            SilhouetteExtractor::new(strategy),
            filler,
            Arc::new(cache),
            Arc::new(BufferPool::new(perf.effective_pool_capacity())),
        );

        let shortcut = config
            .shortcut
            .as_ref()
            .map(|settings| Shortcut::from_settings(settings, &paths.source_dir));

        Ok(Self::new(Arc::new(processor))
            .with_batch_size(batch_size)
            .with_max_workers(perf.effective_max_workers())
            .with_task_timeout(perf.task_timeout())
            .with_shortcut(shortcut))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Sets the per-task deadline. `None` waits for every task.
    ///
    /// A task still running at its batch deadline is reported as
    /// [`TaskError::TimedOut`] and its thread is left to finish on its own.
    /// Such a late finisher skips every write, so a timed-out task never
    /// leaves layers or cache blobs behind unless it was already writing
    /// when the deadline passed.
    pub fn with_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Renders `shortcut` once per run, after the cache is warm.
    pub fn with_shortcut(mut self, shortcut: Option<Shortcut>) -> Self {
        self.shortcut = shortcut;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn processor(&self) -> &IconProcessor {
        &self.processor
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.lock()
    }

    fn enter(&self, phase: RunPhase) {
        let mut current = self.phase.lock();
        if *current != phase {
            match phase {
                RunPhase::Dispatching | RunPhase::Draining => log::debug!("phase: {phase}"),
                _ => log::info!("phase: {phase}"),
            }
            *current = phase;
        }
    }

    /// Processes every task and returns the run summary.
    ///
    /// Individual task failures are logged and reported, never returned.
    /// Only setup and finalisation problems abort the run.
    pub fn run(&self, tasks: &[IconTask]) -> Result<RunReport, RunError> {
        let started = Instant::now();
        let result = self.run_phases(tasks);
        self.enter(RunPhase::Idle);

        let mut report = result?;
        report.elapsed = started.elapsed();
        log::info!(
            "done: {}/{} icons in {:.1}s ({} cache hits, {} misses, {} failed)",
            report.successful,
            report.total,
            report.elapsed.as_secs_f64(),
            report.cache_hits,
            report.cache_misses,
            report.failed()
        );
        Ok(report)
    }

    fn run_phases(&self, tasks: &[IconTask]) -> Result<RunReport, RunError> {
        let out = self.processor.output_dir();
        std::fs::create_dir_all(out).map_err(|e| RunError::OutputDir(out.to_path_buf(), e))?;

        let cache = self.processor.cache();
        self.enter(RunPhase::CacheWarming);
        if let Err(e) = cache.unpack_archive() {
            log::warn!("cache: failed to unpack archive: {e}");
        }
        cache.load_manifest();

        let shortcut = self.shortcut.as_ref().and_then(|shortcut| {
            shortcut
                .write(&self.processor)
                .map_err(|e| log::warn!("shortcut: {e}"))
                .ok()
        });

        let state = SchedulerState::new(tasks.len());
        let batches = tasks.len().div_ceil(self.batch_size);
        for (i, batch) in tasks.chunks(self.batch_size).enumerate() {
            log::info!("batch {}/{batches}: {} icons", i + 1, batch.len());
            self.run_batch(batch, &state)?;
        }

        self.enter(RunPhase::Finalizing);
        cache.save_manifest().map_err(RunError::ManifestWrite)?;
        if let Err(e) = cache.pack_archive() {
            log::warn!("cache: failed to pack archive: {e}");
        }

        let mut report = state.into_report();
        report.shortcut = shortcut;
        Ok(report)
    }

    fn run_batch(&self, batch: &[IconTask], state: &SchedulerState) -> Result<(), RunError> {
        self.enter(RunPhase::Dispatching);

        let workers = self.max_workers.min(batch.len()).max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("icon-worker-{i}"))
            .build()?;

        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = channel::unbounded::<TaskResult>();
        for (idx, task) in batch.iter().enumerate() {
            let tx = tx.clone();
            let processor = Arc::clone(&self.processor);
            let cancelled = Arc::clone(&cancelled);
            let task = task.clone();
            pool.spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    processor.process_unless(&task, &cancelled)
                }))
                .unwrap_or(Err(TaskError::WorkerPanicked));
                // The receiver is gone once the batch deadline has passed.
                let _ = tx.send((idx, result));
            });
        }
        drop(tx);

        self.enter(RunPhase::Draining);

        // Tasks run in waves of `workers`; each wave gets the full timeout.
        let waves = u32::try_from(batch.len().div_ceil(workers)).unwrap_or(u32::MAX);
        let deadline = self
            .task_timeout
            .map(|timeout| Instant::now() + timeout.saturating_mul(waves));

        let mut pending = vec![true; batch.len()];
        let mut remaining = batch.len();
        while remaining > 0 {
            let received = match deadline {
                Some(deadline) => rx.recv_deadline(deadline).ok(),
                None => rx.recv().ok(),
            };
            let Some((idx, result)) = received else {
                break;
            };
            if std::mem::replace(&mut pending[idx], false) {
                remaining -= 1;
                state.record(&batch[idx], result);
            }
        }

        if remaining > 0 {
            cancelled.store(true, Ordering::Release);
            let timed_out = deadline.is_some_and(|d| Instant::now() >= d);
            for (task, _) in batch.iter().zip(&pending).filter(|(_, p)| **p) {
                let error = match self.task_timeout {
                    Some(timeout) if timed_out => TaskError::TimedOut(timeout),
                    _ => TaskError::WorkerPanicked,
                };
                state.record(task, Err(error));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("batch_size", &self.batch_size)
            .field("max_workers", &self.max_workers)
            .field("task_timeout", &self.task_timeout)
            .field("shortcut", &self.shortcut)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
