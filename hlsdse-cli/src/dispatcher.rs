//! Job Dispatcher
//!
//! Runs the accepted points of one kernel on N slots. A single coordinating
//! thread scans the slots in turn:
//!
//! ```text
//! Seeking --(point pulled, job launched)--> Running --(job exited)--> Seeking
//! Seeking --(enumeration exhausted)--> Finished
//! ```
//!
//! Liveness checks never block, so a slow job only holds up its own slot.
//! When a scan changes nothing the coordinator sleeps for the poll interval.

use crate::launcher::{JobHandle, JobLauncher, LaunchError};
use crate::progress::{NullProgress, ProgressSink, percent};
use hlsdse_core::{DesignPoint, DesignPointEnumerator, EnumerationError, KernelDescriptor};
use hlsdse_report::{CompletionRecord, MetricsRecord, ParseError, ReportExtractor};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Fatal dispatch failures; the run stops at the first one
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to reset slot caches: {0}")]
    CacheReset(#[source] LaunchError),

    #[error("failed to launch {code} on slot {slot}: {source}")]
    Launch {
        code: String,
        slot: usize,
        #[source]
        source: LaunchError,
    },

    #[error("job {code} on slot {slot} failed with {status}")]
    JobFailed {
        code: String,
        slot: usize,
        status: String,
    },

    #[error("failed to record completion of {code} on slot {slot}: {source}")]
    Completion {
        code: String,
        slot: usize,
        #[source]
        source: LaunchError,
    },

    #[error("job {code} on slot {slot} left no report")]
    MissingReport { code: String, slot: usize },

    #[error("report of {code} on slot {slot} is malformed: {source}")]
    Parse {
        code: String,
        slot: usize,
        #[source]
        source: ParseError,
    },

    #[error("submitted {submitted} jobs but the census counted {expected}")]
    CountMismatch { expected: u64, submitted: u64 },

    #[error("design point source lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Enumeration(#[from] EnumerationError),
}

/// Dispatch parameters
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Number of slots (at least 1)
    pub slots: usize,
    /// Idle wait between scans that made no progress
    pub poll_interval: Duration,
    /// Schedulable points counted beforehand, checked at the end
    pub expected: Option<u64>,
    /// Title shown once per slot in the progress display
    pub title: Option<String>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            slots: 1,
            poll_interval: Duration::from_millis(50),
            expected: None,
            title: None,
        }
    }
}

/// Work done by one slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotSummary {
    /// Jobs the slot ran
    pub jobs: u64,
    /// Summed wall-clock time of those jobs
    pub elapsed_ns: u64,
}

/// Outcome of a dispatch run
#[derive(Debug, Clone, Default)]
pub struct DispatchSummary {
    /// Jobs launched
    pub submitted: u64,
    /// Points skipped by the bypass rule
    pub bypassed: u64,
    /// Per-slot work, indexed by slot
    pub slots: Vec<SlotSummary>,
    /// Wall-clock time of the whole run
    pub total_elapsed_ns: u64,
    /// Extracted metrics in completion order (empty without an extractor)
    pub records: Vec<MetricsRecord>,
}

/// Shared enumerator handing out accepted points one at a time
pub struct PointSource<'a> {
    inner: Mutex<SourceState<'a>>,
}

struct SourceState<'a> {
    enumerator: DesignPointEnumerator<'a>,
    bypassed: u64,
}

impl<'a> PointSource<'a> {
    /// Fresh enumeration over a descriptor
    pub fn new(descriptor: &'a KernelDescriptor) -> Self {
        Self {
            inner: Mutex::new(SourceState {
                enumerator: DesignPointEnumerator::new(descriptor),
                bypassed: 0,
            }),
        }
    }

    /// Next non-bypassed point, or `None` once exhausted.
    ///
    /// Bypassed points are skipped under the same lock, so two pulls never
    /// interleave.
    pub fn pull_next(&self) -> Result<Option<DesignPoint>, DispatchError> {
        let mut state = self.inner.lock().map_err(|_| DispatchError::LockPoisoned)?;
        while state.enumerator.advance() {
            if state.enumerator.bypass()? {
                state.bypassed += 1;
                continue;
            }
            return Ok(Some(state.enumerator.point()?));
        }
        Ok(None)
    }

    /// Points skipped so far
    pub fn bypassed(&self) -> Result<u64, DispatchError> {
        let state = self.inner.lock().map_err(|_| DispatchError::LockPoisoned)?;
        Ok(state.bypassed)
    }
}

enum SlotState<H> {
    Seeking,
    Running {
        handle: H,
        code: String,
        period: f64,
        started: Instant,
    },
    Finished,
}

struct Slot<H> {
    state: SlotState<H>,
    summary: SlotSummary,
}

/// Runs the points of one kernel on a fixed pool of slots
pub struct JobDispatcher<'a> {
    source: PointSource<'a>,
    options: DispatchOptions,
    extractor: Option<&'a ReportExtractor>,
    progress: &'a dyn ProgressSink,
}

impl<'a> JobDispatcher<'a> {
    /// Dispatcher over a fresh enumeration of `descriptor`
    pub fn new(descriptor: &'a KernelDescriptor, options: DispatchOptions) -> Self {
        Self {
            source: PointSource::new(descriptor),
            options,
            extractor: None,
            progress: &NullProgress,
        }
    }

    /// Parse each report as soon as its job finishes
    pub fn with_extractor(mut self, extractor: &'a ReportExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Send progress updates to `progress`
    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    /// Run until every slot is finished.
    ///
    /// The first failure aborts the run; jobs still running are dropped, which
    /// terminates them.
    pub fn run<L: JobLauncher>(self, launcher: &mut L) -> Result<DispatchSummary, DispatchError> {
        let slot_count = self.options.slots.max(1);
        let title = self.options.title.as_deref();

        launcher
            .reset_slot_caches(slot_count)
            .map_err(DispatchError::CacheReset)?;
        for index in 0..slot_count {
            self.progress.update(index, 0, "Preparing...", title);
        }

        let mut slots: Vec<Slot<L::Handle>> = (0..slot_count)
            .map(|_| Slot {
                state: SlotState::Seeking,
                summary: SlotSummary::default(),
            })
            .collect();
        let mut submitted = 0u64;
        let mut exhausted = false;
        let mut records = Vec::new();
        let run_started = Instant::now();

        while !slots
            .iter()
            .all(|slot| matches!(slot.state, SlotState::Finished))
        {
            let mut progressed = false;

            for (index, slot) in slots.iter_mut().enumerate() {
                if let SlotState::Seeking = slot.state {
                    let next = if exhausted {
                        None
                    } else {
                        self.source.pull_next()?
                    };
                    match next {
                        Some(point) => {
                            slot.state = self.start_job(launcher, index, point, submitted)?;
                            submitted += 1;
                        }
                        None => {
                            exhausted = true;
                            slot.state = SlotState::Finished;
                            self.progress.update(
                                index,
                                100,
                                &format!(
                                    "Done, {} jobs in {:.3}s",
                                    slot.summary.jobs,
                                    slot.summary.elapsed_ns as f64 / 1e9
                                ),
                                None,
                            );
                        }
                    }
                    progressed = true;
                }

                let state = std::mem::replace(&mut slot.state, SlotState::Seeking);
                slot.state = match state {
                    SlotState::Running {
                        mut handle,
                        code,
                        period,
                        started,
                    } => {
                        if handle.is_alive() {
                            SlotState::Running {
                                handle,
                                code,
                                period,
                                started,
                            }
                        } else {
                            let elapsed_ns = nanos(started.elapsed());
                            let record = self.finish_job(
                                launcher, index, handle, code, period, elapsed_ns,
                            )?;
                            slot.summary.jobs += 1;
                            slot.summary.elapsed_ns += elapsed_ns;
                            records.extend(record);
                            progressed = true;
                            SlotState::Seeking
                        }
                    }
                    other => other,
                };
            }

            if !progressed {
                std::thread::sleep(self.options.poll_interval);
            }
        }

        let summary = DispatchSummary {
            submitted,
            bypassed: self.source.bypassed()?,
            slots: slots.iter().map(|slot| slot.summary).collect(),
            total_elapsed_ns: nanos(run_started.elapsed()),
            records,
        };
        self.progress.finish();

        if let Some(expected) = self.options.expected {
            if expected != summary.submitted {
                return Err(DispatchError::CountMismatch {
                    expected,
                    submitted: summary.submitted,
                });
            }
        }

        tracing::info!(
            submitted = summary.submitted,
            bypassed = summary.bypassed,
            slots = slot_count,
            elapsed_ms = summary.total_elapsed_ns / 1_000_000,
            "Dispatch complete"
        );
        Ok(summary)
    }

    fn start_job<L: JobLauncher>(
        &self,
        launcher: &mut L,
        slot: usize,
        point: DesignPoint,
        submitted: u64,
    ) -> Result<SlotState<L::Handle>, DispatchError> {
        let launch_error = |source| DispatchError::Launch {
            code: point.code.clone(),
            slot,
            source,
        };
        launcher.prepare(slot, &point).map_err(launch_error)?;
        let handle = launcher.launch(slot, &point).map_err(launch_error)?;

        let done = match self.options.expected {
            Some(expected) => percent(submitted + 1, expected),
            None => 0,
        };
        self.progress.update(slot, done, &point.code, None);
        tracing::debug!(slot, code = %point.code, "Launched job");

        Ok(SlotState::Running {
            handle,
            period: point.period(),
            code: point.code,
            started: Instant::now(),
        })
    }

    fn finish_job<L: JobLauncher>(
        &self,
        launcher: &mut L,
        slot: usize,
        handle: L::Handle,
        code: String,
        period: f64,
        elapsed_ns: u64,
    ) -> Result<Option<MetricsRecord>, DispatchError> {
        let output = handle.join().map_err(|source| DispatchError::Launch {
            code: code.clone(),
            slot,
            source,
        })?;
        if !output.success() {
            return Err(DispatchError::JobFailed {
                code,
                slot,
                status: output.describe_exit(),
            });
        }

        let completion = CompletionRecord { slot, elapsed_ns };
        launcher
            .record_completion(&code, &completion)
            .map_err(|source| DispatchError::Completion {
                code: code.clone(),
                slot,
                source,
            })?;
        tracing::debug!(slot, code = %code, elapsed_ns, "Job finished");

        let Some(extractor) = self.extractor else {
            return Ok(None);
        };
        let Some(text) = output.report else {
            return Err(DispatchError::MissingReport { code, slot });
        };
        let metrics = extractor
            .extract(&text)
            .map_err(|source| DispatchError::Parse {
                code: code.clone(),
                slot,
                source,
            })?;
        Ok(Some(MetricsRecord::new(code, period, metrics, completion)))
    }
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
