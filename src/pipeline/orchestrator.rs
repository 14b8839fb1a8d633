// PipelineOrchestrator: single in-flight identification job control
//
// Every submission gets a new generation from a shared atomic counter. The
// blocking worker and the async forwarder for a job both compare their
// generation against it, and the forwarder republishes events only while
// holding the snapshot lock, so once a newer job has started nothing from an
// older job reaches subscribers or the stored result.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::timeout_at;

use crate::analysis::{
    FeatureExtractor, InferenceBackend, InferenceEngine, MatchOutcome, PredictData,
    PredictionResult, ResultResolver,
};
use crate::audio::{AudioDecoder, AudioInput};
use crate::catalog::SpeciesCatalog;
use crate::config::AppConfig;
use crate::error::{log_pipeline_error, PipelineError, PipelineFailure};
use crate::telemetry::{self, WarmUpOutcome};

use super::channel::{JobEvent, PipelineEvent, WorkerMessage, WorkerPayload};
use super::progress::{ProgressInfo, Stage};
use super::upload::UploadProgress;
use super::warmup::{WarmUpGate, WarmUpStatus};
use super::worker::{JobStages, ProgressSender};

/// State observable between events
#[derive(Debug, Default)]
struct Snapshot {
    stage: Stage,
    last_progress: Option<ProgressInfo>,
    result: Option<PredictData>,
    /// Generation the stored result belongs to
    result_generation: u64,
    last_failure: Option<PipelineFailure>,
}

struct Inner {
    config: Arc<AppConfig>,
    stages: Arc<JobStages>,
    catalog: Arc<dyn SpeciesCatalog>,
    resolver: ResultResolver,
    generation: Arc<AtomicU64>,
    snapshot: Mutex<Snapshot>,
    events: broadcast::Sender<JobEvent>,
    uploads: broadcast::Sender<UploadProgress>,
    warm_up: WarmUpGate,
    runtime: Handle,
}

/// Owns pipeline state and sequences identification jobs
///
/// At most one job is meaningful at a time: `submit` supersedes whatever
/// was running, and the superseded job's remaining progress, errors and
/// results are discarded rather than delivered. Dropping the orchestrator
/// supersedes the active job the same way.
pub struct PipelineOrchestrator {
    inner: Arc<Inner>,
}

impl PipelineOrchestrator {
    /// Build an orchestrator on the current tokio runtime
    ///
    /// # Errors
    /// Invalid configuration, an unusable backend label set, or no runtime.
    pub fn new(
        config: AppConfig,
        backend: Arc<dyn InferenceBackend>,
        catalog: Arc<dyn SpeciesCatalog>,
    ) -> Result<Self, PipelineError> {
        let runtime = Handle::try_current().map_err(|e| {
            PipelineError::internal(format!("no tokio runtime available: {}", e))
        })?;
        Self::with_runtime(config, backend, catalog, runtime)
    }

    /// Build an orchestrator that spawns its work onto `runtime`
    pub fn with_runtime(
        config: AppConfig,
        backend: Arc<dyn InferenceBackend>,
        catalog: Arc<dyn SpeciesCatalog>,
        runtime: Handle,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let engine = InferenceEngine::new(backend)?;
        let stages = JobStages {
            decoder: AudioDecoder::new(config.audio.sample_rate, config.decoder.clone())
                .with_sample_limit(config.audio.max_length),
            extractor: FeatureExtractor::new(config.audio.clone()),
            engine,
        };
        let (events, _) = broadcast::channel(config.pipeline.event_channel_capacity);
        let (uploads, _) = broadcast::channel(config.pipeline.event_channel_capacity);

        info!(
            "[PipelineOrchestrator] Ready: {} labels, {} Hz, {} frames per job",
            stages.engine.labels().len(),
            config.audio.sample_rate,
            config.audio.frame_count()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config: Arc::new(config),
                stages: Arc::new(stages),
                catalog,
                resolver: ResultResolver::new(),
                generation: Arc::new(AtomicU64::new(0)),
                snapshot: Mutex::new(Snapshot::default()),
                events,
                uploads,
                warm_up: WarmUpGate::new(),
                runtime,
            }),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    // ========================================================================
    // JOB CONTROL
    // ========================================================================

    /// Start identifying `input`, superseding any active job
    ///
    /// Returns the new job's generation immediately; progress and the result
    /// arrive on [`PipelineOrchestrator::subscribe`].
    ///
    /// # Errors
    /// Unsupported format and oversize input are rejected here, before any
    /// decoding, and do not disturb the active job.
    pub fn submit(&self, input: AudioInput) -> Result<u64, PipelineError> {
        let inner = &self.inner;
        let format = inner.stages.decoder.validate(&input).map_err(|err| {
            let err = PipelineError::from(err);
            log_pipeline_error(&err, "submit");
            err
        })?;

        let generation = {
            let mut snapshot = inner.lock_snapshot()?;
            let generation = inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
            *snapshot = Snapshot {
                stage: Stage::Loading,
                result_generation: generation,
                ..Snapshot::default()
            };
            generation
        };

        info!(
            "[PipelineOrchestrator] Job {} started: {} ({} bytes)",
            generation,
            input.file_name,
            input.size_bytes()
        );
        telemetry::hub().record_job_started(generation, &input.file_name);

        let started = Instant::now();
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = ProgressSender::new(generation, Arc::clone(&inner.generation), tx);
        let stages = Arc::clone(&inner.stages);
        inner
            .runtime
            .spawn_blocking(move || stages.run_job(input, format, sender));

        let forwarder = Arc::clone(inner);
        inner
            .runtime
            .spawn(async move { forwarder.forward(generation, rx, started).await });

        Ok(generation)
    }

    /// Submit `input` and wait for its terminal event
    ///
    /// # Errors
    /// Rejected submissions, job failures, and supersession by a newer job
    /// (see [`PipelineFailure::is_superseded`]).
    pub async fn identify(&self, input: AudioInput) -> Result<PredictData, PipelineFailure> {
        let events = self.subscribe();
        let generation = self.submit(input).map_err(PipelineFailure::from)?;
        self.wait_for(generation, events).await
    }

    /// Wait on `events` for the terminal event of `generation`
    pub async fn wait_for(
        &self,
        generation: u64,
        mut events: broadcast::Receiver<JobEvent>,
    ) -> Result<PredictData, PipelineFailure> {
        loop {
            match events.recv().await {
                Ok(event) if event.generation == generation => match event.event {
                    PipelineEvent::Complete(data) => return Ok(data),
                    PipelineEvent::Error(failure) => return Err(failure),
                    PipelineEvent::Progress(_) => {}
                },
                Ok(event) if event.generation > generation => {
                    return Err(PipelineError::Superseded { generation }.into());
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(
                        "[PipelineOrchestrator] Waiter for job {} lagged by {} events",
                        generation, skipped
                    );
                    if let Some(outcome) = self.inner.settled(generation) {
                        return outcome;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(PipelineError::internal("event channel closed").into());
                }
            }
        }
    }

    /// Discard the stored result and return to idle
    ///
    /// An in-flight job keeps running; only a settled job's state is reset.
    pub fn clear(&self) -> Result<(), PipelineError> {
        let mut snapshot = self.inner.lock_snapshot()?;
        snapshot.result = None;
        snapshot.last_failure = None;
        if !snapshot.stage.is_active() {
            snapshot.stage = Stage::Idle;
            snapshot.last_progress = None;
        }
        debug!("[PipelineOrchestrator] Results cleared");
        Ok(())
    }

    // ========================================================================
    // WARM-UP
    // ========================================================================

    /// Exercise the catalog and the DSP path once in the background
    ///
    /// Returns whether this call started an attempt. Calls made while an
    /// attempt is running, or after one succeeded, do nothing. Failures are
    /// logged and never published as job events.
    pub fn warm_up(&self) -> bool {
        if !self.inner.warm_up.try_begin() {
            debug!(
                "[PipelineOrchestrator] Warm-up skipped ({:?})",
                self.inner.warm_up.status()
            );
            return false;
        }
        let inner = Arc::clone(&self.inner);
        self.inner
            .runtime
            .spawn(async move { inner.run_warm_up().await });
        true
    }

    pub fn warm_up_status(&self) -> WarmUpStatus {
        self.inner.warm_up.status()
    }

    pub fn subscribe_warm_up(&self) -> watch::Receiver<WarmUpStatus> {
        self.inner.warm_up.subscribe()
    }

    // ========================================================================
    // OBSERVATION
    // ========================================================================

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Upload progress reported by the transport, apart from job events
    pub fn subscribe_uploads(&self) -> broadcast::Receiver<UploadProgress> {
        self.inner.uploads.subscribe()
    }

    /// Publish transport-side upload progress
    ///
    /// Touches neither the job stage nor job progress.
    pub fn report_upload(&self, progress: UploadProgress) {
        if progress.done {
            debug!(
                "[PipelineOrchestrator] Upload of {} finished ({} bytes)",
                progress.file_name, progress.bytes_received
            );
        }
        // Nobody listening is the common case
        let _ = self.inner.uploads.send(progress);
    }

    pub fn state(&self) -> Stage {
        self.inner.read_snapshot().stage
    }

    pub fn progress(&self) -> Option<ProgressInfo> {
        self.inner.read_snapshot().last_progress.clone()
    }

    /// Result of the latest settled job, if not cleared
    pub fn result(&self) -> Option<PredictData> {
        self.inner.read_snapshot().result.clone()
    }

    pub fn last_failure(&self) -> Option<PipelineFailure> {
        self.inner.read_snapshot().last_failure.clone()
    }

    pub fn current_generation(&self) -> u64 {
        self.inner.current()
    }

    /// Feature extractions started, including warm-up dry runs
    pub fn extraction_count(&self) -> u64 {
        self.inner.stages.extractor.extraction_count()
    }
}

impl Drop for PipelineOrchestrator {
    fn drop(&mut self) {
        let superseded = self.inner.generation.fetch_add(1, Ordering::AcqRel);
        debug!(
            "[PipelineOrchestrator] Dropped; job {} will not publish further events",
            superseded
        );
    }
}

impl Inner {
    fn current(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn lock_snapshot(&self) -> Result<MutexGuard<'_, Snapshot>, PipelineError> {
        self.snapshot
            .lock()
            .map_err(|_| PipelineError::internal("pipeline state lock poisoned"))
    }

    /// Read-only access survives a poisoned lock
    fn read_snapshot(&self) -> MutexGuard<'_, Snapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish `events` and apply `update` only if `generation` is current
    ///
    /// The check, the snapshot update and the send happen under one lock,
    /// which `submit` also holds while bumping the generation.
    fn publish_if_current<F>(&self, generation: u64, events: Vec<PipelineEvent>, update: F) -> bool
    where
        F: FnOnce(&mut Snapshot),
    {
        let mut snapshot = match self.lock_snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log_pipeline_error(&err, "publish");
                return false;
            }
        };
        if self.current() != generation {
            return false;
        }
        update(&mut snapshot);
        for event in events {
            // No subscribers is fine; the snapshot still holds the state
            let _ = self.events.send(JobEvent { generation, event });
        }
        true
    }

    fn drop_stale(&self, generation: u64) {
        let current = self.current();
        debug!(
            "[PipelineOrchestrator] Dropping messages from job {} (current {})",
            generation, current
        );
        telemetry::hub().record_stale_message(generation, current);
    }

    /// Terminal state of `generation` if it has settled
    fn settled(&self, generation: u64) -> Option<Result<PredictData, PipelineFailure>> {
        let snapshot = self.read_snapshot();
        if self.current() > generation || snapshot.result_generation > generation {
            return Some(Err(PipelineError::Superseded { generation }.into()));
        }
        if snapshot.result_generation != generation {
            return None;
        }
        match snapshot.stage {
            Stage::Complete => snapshot.result.clone().map(Ok),
            Stage::Error => snapshot.last_failure.clone().map(Err),
            _ => None,
        }
    }

    /// Relay one job's worker messages to subscribers
    async fn forward(
        self: Arc<Self>,
        generation: u64,
        mut rx: mpsc::UnboundedReceiver<WorkerMessage>,
        started: Instant,
    ) {
        let timeout_ms = self.config.pipeline.job_timeout_ms;
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            let message = match timeout_at(deadline, rx.recv()).await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    if self.current() == generation {
                        self.fail(
                            generation,
                            PipelineError::WorkerLost {
                                reason: "worker exited without a result".to_string(),
                            },
                            started,
                        );
                    }
                    return;
                }
                Err(_) => {
                    if self.current() == generation {
                        warn!(
                            "[PipelineOrchestrator] Job {} exceeded {} ms",
                            generation, timeout_ms
                        );
                        self.fail(generation, PipelineError::Timeout { timeout_ms }, started);
                    }
                    return;
                }
            };

            if message.generation != self.current() {
                self.drop_stale(message.generation);
                return;
            }

            match message.payload {
                WorkerPayload::Progress(info) => {
                    let event = PipelineEvent::Progress(info.clone());
                    let published = self.publish_if_current(generation, vec![event], |s| {
                        s.stage = info.stage;
                        s.last_progress = Some(info);
                    });
                    if !published {
                        self.drop_stale(generation);
                        return;
                    }
                }
                WorkerPayload::Error(err) => {
                    self.fail(generation, err, started);
                    return;
                }
                WorkerPayload::Complete(prediction) => {
                    self.complete(generation, prediction, deadline, started).await;
                    return;
                }
            }
        }
    }

    async fn complete(
        &self,
        generation: u64,
        prediction: PredictionResult,
        deadline: tokio::time::Instant,
        started: Instant,
    ) {
        let record = if self.resolver.needs_lookup(&prediction) {
            match timeout_at(deadline, self.catalog.get_by_id(&prediction.label)).await {
                Ok(Ok(record)) => record,
                Ok(Err(err)) => {
                    self.fail(generation, err.into(), started);
                    return;
                }
                Err(_) => {
                    let timeout_ms = self.config.pipeline.job_timeout_ms;
                    self.fail(generation, PipelineError::Timeout { timeout_ms }, started);
                    return;
                }
            }
        } else {
            None
        };

        let data = self.resolver.resolve(&prediction, move |_| record);
        let outcome = data.outcome.unwrap_or(MatchOutcome::NoConfidentMatch);
        let confidence = data.confidence;
        let done = ProgressInfo::complete();
        let events = vec![
            PipelineEvent::Progress(done.clone()),
            PipelineEvent::Complete(data.clone()),
        ];
        let published = self.publish_if_current(generation, events, |s| {
            s.stage = Stage::Complete;
            s.last_progress = Some(done);
            s.result = Some(data);
            s.last_failure = None;
        });

        if published {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            info!(
                "[PipelineOrchestrator] Job {} complete: {} ({:.3}, {:?}) in {} ms",
                generation, prediction.label, confidence, outcome, elapsed_ms
            );
            telemetry::hub().record_job_completed(generation, confidence, outcome, elapsed_ms);
        } else {
            self.drop_stale(generation);
        }
    }

    fn fail(&self, generation: u64, err: PipelineError, started: Instant) {
        let failure = PipelineFailure::from(&err);
        let stored = PredictData::failed(&err);
        let kind = failure.kind;
        let events = vec![PipelineEvent::Error(failure.clone())];
        let published = self.publish_if_current(generation, events, |s| {
            s.stage = Stage::Error;
            s.result = Some(stored);
            s.last_failure = Some(failure);
        });

        if published {
            log_pipeline_error(&err, &format!("job {}", generation));
            telemetry::hub().record_job_failed(
                generation,
                kind,
                started.elapsed().as_millis() as u64,
            );
        } else {
            self.drop_stale(generation);
        }
    }

    async fn run_warm_up(self: Arc<Self>) {
        let started = Instant::now();
        let budget = Duration::from_millis(self.config.pipeline.job_timeout_ms);
        info!("[PipelineOrchestrator] Warm-up started");

        let probe = match tokio::time::timeout(budget, self.catalog.probe()).await {
            Ok(result) => result.map_err(PipelineError::from),
            Err(_) => Err(PipelineError::Timeout {
                timeout_ms: self.config.pipeline.job_timeout_ms,
            }),
        };

        let stages = Arc::clone(&self.stages);
        let signal_ms = self.config.pipeline.warm_up_signal_ms;
        let dry_run = match self
            .runtime
            .spawn_blocking(move || stages.dry_run(signal_ms))
            .await
        {
            Ok(result) => result.map(|_| ()),
            Err(join_err) => Err(PipelineError::internal(format!(
                "warm-up task failed: {}",
                join_err
            ))),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let outcome = probe.and(dry_run);
        match &outcome {
            Ok(()) => info!("[PipelineOrchestrator] Warm-up finished in {} ms", elapsed_ms),
            Err(err) => warn!(
                "[PipelineOrchestrator] Warm-up failed after {} ms: {}",
                elapsed_ms, err
            ),
        }
        let success = outcome.is_ok();
        telemetry::hub().record_warm_up(
            if success {
                WarmUpOutcome::Succeeded
            } else {
                WarmUpOutcome::Failed
            },
            elapsed_ms,
        );
        self.warm_up.finish(success);
    }
}
