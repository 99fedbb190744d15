use crate::{
    classify::UNDETERMINED_NOTE,
    codec::{Codec, Symbology},
    config::Config,
    error::{CodecFailure, Error, Result},
    job::{Action, ConversionJob, FailureKind, FailureReason, JobStatus, Outcome},
    report::BatchSummary,
};
use crossbeam_channel::{Receiver, Sender};
use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub read_only_formats: BTreeSet<Symbology>,
    pub workers: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            read_only_formats: Symbology::default_read_only(),
            workers: 1,
        }
    }
}

impl BatchSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            read_only_formats: cfg.batch.read_only_formats.clone(),
            workers: cfg.batch.workers.max(1),
        }
    }
}

/// Cooperative stop request shared with running workers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct BatchProgress {
    pub index: usize,
    pub identifier: String,
    pub status: JobStatus,
    pub completed: usize,
    pub total: usize,
}

pub struct Pipeline<C: Codec> {
    codec: C,
    settings: BatchSettings,
    progress: Option<Sender<BatchProgress>>,
}

/// Per-job work resolved before any worker starts.
struct Planned {
    action: Action,
    size: Option<(u32, u32)>,
}

impl<C: Codec> Pipeline<C> {
    pub fn new(codec: C, settings: BatchSettings) -> Self {
        Self {
            codec,
            settings,
            progress: None,
        }
    }

    pub fn with_progress(mut self, tx: Sender<BatchProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Run every job once, in order, and settle each one.
    ///
    /// Precondition failures (empty batch, bad dimensions) abort before any
    /// job runs. Per-job failures never abort the batch.
    pub fn run(&self, jobs: &mut [ConversionJob], cancel: &CancelToken) -> Result<BatchSummary> {
        if jobs.is_empty() {
            return Err(Error::NoInputSelected);
        }

        let mut plan = Vec::with_capacity(jobs.len());
        for job in jobs.iter_mut() {
            let (action, undetermined) = job.intent().resolve();
            if undetermined {
                warn!(job = %job.identifier(), "{UNDETERMINED_NOTE}");
                job.annotate(UNDETERMINED_NOTE);
            }
            let size = match action {
                Action::Generate => Some(job.dimensions.resolve().map_err(|e| {
                    warn!(job = %job.identifier(), error = %e, "rejecting batch");
                    e
                })?),
                Action::Decode => None,
            };
            plan.push(Planned { action, size });
        }

        let started = Instant::now();
        let total = jobs.len();
        let workers = self.settings.workers.clamp(1, total);
        info!(total, workers, "batch starting");

        let slots = self.execute_all(jobs, &plan, workers, cancel);

        for (job, outcome) in jobs.iter_mut().zip(slots) {
            job.settle(outcome.unwrap_or(Outcome::Cancelled));
        }

        let summary = BatchSummary::from_jobs(jobs);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch finished"
        );
        Ok(summary)
    }

    fn execute_all(
        &self,
        jobs: &[ConversionJob],
        plan: &[Planned],
        workers: usize,
        cancel: &CancelToken,
    ) -> Vec<Option<Outcome>> {
        let total = jobs.len();
        let next = AtomicUsize::new(0);
        let (tx, rx) = crossbeam_channel::unbounded::<(usize, Outcome)>();
        let mut slots: Vec<Option<Outcome>> = (0..total).map(|_| None).collect();

        thread::scope(|s| {
            for _ in 0..workers {
                let tx = tx.clone();
                let next = &next;
                s.spawn(move || {
                    loop {
                        let i = next.fetch_add(1, Ordering::SeqCst);
                        if i >= total {
                            break;
                        }
                        let outcome = if cancel.is_cancelled() {
                            Outcome::Cancelled
                        } else {
                            self.execute(&jobs[i], &plan[i])
                        };
                        if tx.send((i, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            let mut completed = 0;
            for (i, outcome) in rx.iter() {
                completed += 1;
                let status = match &outcome {
                    Outcome::Succeeded(_) => JobStatus::Succeeded,
                    Outcome::Failed(_) => JobStatus::Failed,
                    Outcome::Cancelled => JobStatus::Cancelled,
                };
                debug!(index = i, job = %jobs[i].identifier(), ?status, "job settled");
                if let Some(progress) = &self.progress {
                    let _ = progress.send(BatchProgress {
                        index: i,
                        identifier: jobs[i].identifier(),
                        status,
                        completed,
                        total,
                    });
                }
                slots[i] = Some(outcome);
            }
        });

        slots
    }

    fn execute(&self, job: &ConversionJob, planned: &Planned) -> Outcome {
        if planned.action == Action::Generate
            && self.settings.read_only_formats.contains(&job.target_format)
        {
            return Outcome::Failed(FailureReason::new(
                FailureKind::UnsupportedOperation,
                format!("{} is read-only", job.target_format),
            ));
        }

        let payload = match job.payload.load() {
            Ok(p) => p,
            Err(e) => {
                let failure = match planned.action {
                    Action::Generate => CodecFailure::InvalidPayload,
                    Action::Decode => CodecFailure::InvalidImage,
                };
                return Outcome::Failed(FailureReason::new(
                    FailureKind::Codec(failure),
                    format!("unable to open {}: {e}", job.identifier()),
                ));
            }
        };

        let call = catch_unwind(AssertUnwindSafe(|| match (planned.action, planned.size) {
            (Action::Generate, Some((w, h))) => {
                self.codec
                    .generate(&payload, job.target_format, w, h, job.use_base64)
            }
            (Action::Generate, None) => Err(Error::InvalidConfig("unresolved dimensions".into())),
            (Action::Decode, _) => self
                .codec
                .decode(&payload, &BTreeSet::new(), job.use_base64)
                .map(|hit| hit.content),
        }));

        match call {
            Ok(Ok(bytes)) => Outcome::Succeeded(bytes),
            Ok(Err(e)) => Outcome::Failed(failure_from_error(e)),
            Err(_) => Outcome::Failed(FailureReason::new(
                FailureKind::Codec(CodecFailure::InternalError),
                "codec panicked".to_string(),
            )),
        }
    }
}

fn failure_from_error(e: Error) -> FailureReason {
    match e {
        Error::Codec { failure, detail } => FailureReason::new(FailureKind::Codec(failure), detail),
        Error::UnsupportedOperation { format } => FailureReason::new(
            FailureKind::UnsupportedOperation,
            format!("{format} is read-only"),
        ),
        other => FailureReason::new(
            FailureKind::Codec(CodecFailure::InternalError),
            other.to_string(),
        ),
    }
}

/// Jobs and summary handed back by a background batch.
#[derive(Debug)]
pub struct BatchResult {
    pub jobs: Vec<ConversionJob>,
    pub summary: BatchSummary,
}

/// Handle to a batch running off the calling thread.
pub struct BatchHandle {
    handle: thread::JoinHandle<Result<BatchResult>>,
    cancel: CancelToken,
    progress: Receiver<BatchProgress>,
}

impl BatchHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn progress(&self) -> &Receiver<BatchProgress> {
        &self.progress
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) -> Result<BatchResult> {
        self.handle.join().map_err(|_| {
            Error::codec(CodecFailure::InternalError, "batch thread panicked")
        })?
    }
}

impl<C: Codec + 'static> Pipeline<C> {
    /// Run the batch on a background thread.
    pub fn spawn(mut self, mut jobs: Vec<ConversionJob>) -> BatchHandle {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.progress = Some(tx);
        let cancel = CancelToken::default();
        let token = cancel.clone();
        let handle = thread::spawn(move || -> Result<BatchResult> {
            let summary = self.run(&mut jobs, &token)?;
            Ok(BatchResult { jobs, summary })
        });
        BatchHandle {
            handle,
            cancel,
            progress: rx,
        }
    }
}
