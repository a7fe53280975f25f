use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use garde::Validate;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::job::{GenerationJob, JobStatus};
use crate::models::request::TryOnRequest;
use crate::services::fashn::{ProviderError, SynthesisProvider};
use crate::services::ingestion::{
    prepare_device_garment, GarmentSource, ImagePayload, ImageSource, IngestError,
};
use crate::services::media::{download_image, result_file_name, MediaError, MediaSink};
use crate::services::polling::{self, PollError, PollPolicy};
use crate::services::removal::RemoveBgClient;
use crate::services::storage::{ObjectStore, StorageError};

/// Phase of the try-on screen. Mutated only through [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Capturing,
    Uploading,
    Submitted,
    Waiting,
    Polling,
    Succeeded,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }

    /// A flow is in progress: the capture affordance is hidden and a second
    /// start is refused.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Phase::Capturing | Phase::Uploading | Phase::Submitted | Phase::Waiting | Phase::Polling
        )
    }
}

/// The single visible view, a pure function of the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenView {
    Capture,
    Loading,
    Result,
}

pub fn view_for(phase: Phase) -> ScreenView {
    match phase {
        Phase::Idle | Phase::Capturing | Phase::Failed => ScreenView::Capture,
        Phase::Uploading | Phase::Submitted | Phase::Waiting | Phase::Polling => ScreenView::Loading,
        Phase::Succeeded => ScreenView::Result,
    }
}

/// Everything that can advance the flow.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    ShutterPressed,
    CaptureCancelled,
    CaptureReady,
    UploadsComplete,
    JobAccepted { job: GenerationJob },
    QuiescenceElapsed,
    Resolved { outputs: Vec<String> },
    Rejected { notice: String },
    Reset,
}

/// The whole state machine in one pure function. Combinations not listed are
/// self-loops, which makes the terminal states absorbing for everything
/// except `Reset`.
pub fn transition(phase: Phase, event: &FlowEvent) -> Phase {
    use FlowEvent::*;
    use Phase::*;

    match (phase, event) {
        (Idle, ShutterPressed) => Capturing,
        (Capturing, CaptureCancelled) => Idle,
        (Capturing, CaptureReady) => Uploading,
        (Uploading, UploadsComplete) => Submitted,
        (Submitted, JobAccepted { .. }) => Waiting,
        (Waiting, QuiescenceElapsed) => Polling,
        (Polling, Resolved { .. }) => Succeeded,
        (Idle | Capturing | Uploading | Submitted | Waiting | Polling, Rejected { .. }) => Failed,
        (_, Reset) => Idle,
        (current, _) => current,
    }
}

/// Published state of the flow; what a UI renders from.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub phase: Phase,
    pub view: ScreenView,
    /// Dismissible error notice shown on the capture view after a failure.
    pub notice: Option<String>,
    pub job: Option<GenerationJob>,
}

impl Snapshot {
    fn idle() -> Self {
        Self {
            phase: Phase::Idle,
            view: ScreenView::Capture,
            notice: None,
            job: None,
        }
    }

    /// The image to display, save and share: always the first output.
    pub fn result_url(&self) -> Option<&str> {
        self.job.as_ref().and_then(GenerationJob::display_url)
    }
}

pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Durable record of completed try-ons (external collaborator).
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    async fn record_try_on(
        &self,
        user_id: Uuid,
        model_url: &str,
        garment_url: &str,
        result_url: &str,
    ) -> Result<(), DynError>;
}

/// Per-user generation allowance (external collaborator).
#[async_trait::async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Consume one try; returns the remaining count.
    async fn consume_try(&self, user_id: Uuid) -> Result<i32, DynError>;
}

/// Injected collaborators for one controller instance.
pub struct FlowDeps {
    pub storage: Arc<dyn ObjectStore>,
    pub provider: Arc<dyn SynthesisProvider>,
    pub removal: Option<Arc<RemoveBgClient>>,
    pub history: Arc<dyn HistoryStore>,
    pub entitlements: Arc<dyn EntitlementStore>,
    pub policy: PollPolicy,
}

/// Cancellation handle for one generation flow.
///
/// `cancel` is idempotent; after it fires, nothing the in-flight task later
/// resolves to will reach controller state.
#[derive(Debug, Clone)]
pub struct GenerationHandle {
    token: CancellationToken,
}

impl GenerationHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

struct Inner {
    phase: Phase,
    /// Bumped on every start/reset; events from older flows are discarded.
    epoch: u64,
    notice: Option<String>,
    job: Option<GenerationJob>,
    active: Option<CancellationToken>,
}

struct Shared {
    deps: FlowDeps,
    inner: Mutex<Inner>,
    updates: watch::Sender<Snapshot>,
}

/// Drives a try-on from capture to a terminal state and owns the screen's
/// single source of truth.
///
/// At most one generation is active per controller; `start` refuses while a
/// flow is in a non-terminal phase. Every state mutation is funnelled through
/// one guarded apply step, so stale completions (a superseded job) and
/// cancelled flows cannot touch published state.
#[derive(Clone)]
pub struct TryOnController {
    shared: Arc<Shared>,
}

enum FlowAbort {
    Cancelled,
    Error(TryOnError),
}

impl From<TryOnError> for FlowAbort {
    fn from(err: TryOnError) -> Self {
        FlowAbort::Error(err)
    }
}

impl TryOnController {
    pub fn new(deps: FlowDeps) -> Self {
        let (updates, _) = watch::channel(Snapshot::idle());
        Self {
            shared: Arc::new(Shared {
                deps,
                inner: Mutex::new(Inner {
                    phase: Phase::Idle,
                    epoch: 0,
                    notice: None,
                    job: None,
                    active: None,
                }),
                updates,
            }),
        }
    }

    /// Observe snapshot changes (UI subscription point).
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.shared.updates.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.shared.updates.borrow().clone()
    }

    /// Begin a generation flow: capture the model image from `model_source`,
    /// resolve the garment, upload, submit, poll to terminal.
    ///
    /// The garment is the catalog URL carried in the request when present,
    /// otherwise the supplied device image. Returns immediately with the
    /// flow's cancellation handle; progress is observed through
    /// [`TryOnController::subscribe`]. Refuses while another flow is active.
    pub fn start(
        &self,
        request: TryOnRequest,
        model_source: Arc<dyn ImageSource>,
        device_garment: Option<ImagePayload>,
    ) -> Result<GenerationHandle, TryOnError> {
        request.validate()?;

        let garment = match (request.garment_url.clone(), device_garment) {
            (Some(url), _) => GarmentSource::CatalogUrl(url),
            (None, Some(payload)) => GarmentSource::Device(payload),
            (None, None) => return Err(TryOnError::MissingGarment),
        };

        let (epoch, token) = {
            let mut inner = self.shared.inner.lock().unwrap();

            let alive = inner.active.as_ref().is_some_and(|t| !t.is_cancelled());
            if inner.phase.is_active() && alive {
                return Err(TryOnError::Busy);
            }

            inner.epoch += 1;
            inner.phase = Phase::Idle;
            inner.notice = None;
            inner.job = None;

            let token = CancellationToken::new();
            inner.active = Some(token.clone());
            self.shared.publish(&inner);

            (inner.epoch, token)
        };

        let shared = Arc::clone(&self.shared);
        let flow_token = token.clone();
        tokio::spawn(async move {
            shared
                .run_flow(epoch, flow_token, request, model_source, garment)
                .await;
        });

        Ok(GenerationHandle { token })
    }

    /// Tear the screen down: cancel any pending timer or in-flight request
    /// and return to idle. Late completions become no-ops.
    pub fn reset(&self) {
        let mut inner = self.shared.inner.lock().unwrap();
        if let Some(token) = inner.active.take() {
            token.cancel();
        }
        inner.epoch += 1;
        inner.phase = Phase::Idle;
        inner.notice = None;
        inner.job = None;
        self.shared.publish(&inner);
    }

    /// Download the displayed result and hand it to the media sink.
    pub async fn save_to_device(&self, sink: &dyn MediaSink) -> Result<PathBuf, MediaError> {
        let url = self
            .snapshot()
            .result_url()
            .map(str::to_string)
            .ok_or(MediaError::NoResult)?;
        let bytes = download_image(&url).await?;
        sink.save_image(&bytes, &result_file_name(&url)).await
    }

    /// Share the displayed result through the media sink.
    pub async fn share(&self, sink: &dyn MediaSink) -> Result<(), MediaError> {
        let url = self
            .snapshot()
            .result_url()
            .map(str::to_string)
            .ok_or(MediaError::NoResult)?;
        sink.share(&url).await
    }
}

impl Shared {
    async fn run_flow(
        &self,
        epoch: u64,
        token: CancellationToken,
        request: TryOnRequest,
        model_source: Arc<dyn ImageSource>,
        garment: GarmentSource,
    ) {
        match self
            .drive(epoch, &token, &request, model_source, garment)
            .await
        {
            Ok(()) | Err(FlowAbort::Cancelled) => {}
            Err(FlowAbort::Error(err)) => {
                metrics::counter!("tryon_jobs_failed").increment(1);
                tracing::warn!(user_id = %request.user_id, error = %err, "try-on flow failed");
                self.apply(
                    epoch,
                    FlowEvent::Rejected {
                        notice: err.to_string(),
                    },
                );
            }
        }
    }

    async fn drive(
        &self,
        epoch: u64,
        token: &CancellationToken,
        request: &TryOnRequest,
        model_source: Arc<dyn ImageSource>,
        garment: GarmentSource,
    ) -> Result<(), FlowAbort> {
        self.apply(epoch, FlowEvent::ShutterPressed);

        // Capture. A user cancel is not an error: back to idle, no notice.
        let model = guarded(token, model_source.acquire())
            .await?
            .map_err(TryOnError::Ingestion)?;
        let Some(model) = model else {
            self.apply(epoch, FlowEvent::CaptureCancelled);
            return Ok(());
        };
        self.apply(epoch, FlowEvent::CaptureReady);

        // Both images must be durable URLs before anything is submitted.
        let garment_url = match garment {
            GarmentSource::CatalogUrl(url) => url,
            GarmentSource::Device(payload) => {
                let cleaned =
                    guarded(token, prepare_device_garment(payload, self.deps.removal.as_deref()))
                        .await?
                        .map_err(TryOnError::Ingestion)?;
                guarded(token, self.deps.storage.upload(&cleaned.bytes, cleaned.content_type))
                    .await?
                    .map_err(TryOnError::Upload)?
            }
        };

        let model_url = guarded(token, self.deps.storage.upload(&model.bytes, model.content_type))
            .await?
            .map_err(TryOnError::Upload)?;
        self.apply(epoch, FlowEvent::UploadsComplete);

        // Single submission, never retried.
        let job_id = guarded(
            token,
            self.deps
                .provider
                .submit(&model_url, &garment_url, request.category),
        )
        .await?
        .map_err(TryOnError::Submission)?;

        metrics::counter!("tryon_jobs_total").increment(1);
        let submitted_at = Instant::now();
        tracing::info!(user_id = %request.user_id, %job_id, "generation job submitted");

        let job = GenerationJob::submitted(
            model_url.clone(),
            garment_url.clone(),
            request.category,
            job_id.clone(),
        );
        self.apply(epoch, FlowEvent::JobAccepted { job });

        polling::wait_quiescence(&self.deps.policy, token)
            .await
            .map_err(flow_abort_from_poll)?;
        self.apply(epoch, FlowEvent::QuiescenceElapsed);

        let outputs = polling::poll_until_terminal(
            self.deps.provider.as_ref(),
            &job_id,
            &self.deps.policy,
            token,
        )
        .await
        .map_err(flow_abort_from_poll)?;

        metrics::counter!("tryon_jobs_succeeded").increment(1);
        metrics::histogram!("tryon_generation_seconds")
            .record(submitted_at.elapsed().as_secs_f64());

        // Publish the result first; persistence is best-effort and must never
        // take an already-displayed result away.
        let applied = self.apply(
            epoch,
            FlowEvent::Resolved {
                outputs: outputs.clone(),
            },
        );
        if !applied {
            return Err(FlowAbort::Cancelled);
        }

        let result_url = outputs[0].as_str();
        if let Err(e) = self.deps.entitlements.consume_try(request.user_id).await {
            tracing::warn!(user_id = %request.user_id, error = %e, "failed to consume entitlement");
        }
        if let Err(e) = self
            .deps
            .history
            .record_try_on(request.user_id, &model_url, &garment_url, result_url)
            .await
        {
            tracing::warn!(user_id = %request.user_id, error = %e, "failed to record try-on history");
        }

        Ok(())
    }

    /// Guarded state mutation. Returns false — and changes nothing — when the
    /// event belongs to a superseded epoch or a cancelled flow.
    fn apply(&self, epoch: u64, event: FlowEvent) -> bool {
        let mut inner = self.inner.lock().unwrap();

        if inner.epoch != epoch {
            tracing::debug!(?event, "discarding event from superseded flow");
            return false;
        }
        if inner.active.as_ref().is_some_and(|t| t.is_cancelled()) {
            tracing::debug!(?event, "discarding event from cancelled flow");
            return false;
        }

        inner.phase = transition(inner.phase, &event);

        match event {
            FlowEvent::JobAccepted { mut job } => {
                job.status = JobStatus::Waiting;
                inner.job = Some(job);
            }
            FlowEvent::QuiescenceElapsed => {
                if let Some(job) = inner.job.as_mut() {
                    job.status = JobStatus::Polling;
                }
            }
            FlowEvent::Resolved { outputs } => {
                if let Some(job) = inner.job.as_mut() {
                    job.succeed(outputs);
                }
            }
            FlowEvent::Rejected { notice } => {
                if let Some(job) = inner.job.as_mut() {
                    job.fail();
                }
                inner.notice = Some(notice);
            }
            FlowEvent::Reset => {
                inner.job = None;
                inner.notice = None;
            }
            _ => {}
        }

        self.publish(&inner);
        true
    }

    fn publish(&self, inner: &Inner) {
        let _ = self.updates.send(Snapshot {
            phase: inner.phase,
            view: view_for(inner.phase),
            notice: inner.notice.clone(),
            job: inner.job.clone(),
        });
    }
}

/// Race a flow step against cancellation so teardown drops it on the floor.
async fn guarded<T>(
    token: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T, FlowAbort> {
    tokio::select! {
        _ = token.cancelled() => Err(FlowAbort::Cancelled),
        value = fut => Ok(value),
    }
}

fn flow_abort_from_poll(err: PollError) -> FlowAbort {
    match err {
        PollError::Cancelled => FlowAbort::Cancelled,
        PollError::Request(e) => FlowAbort::Error(TryOnError::Poll(e)),
        PollError::Rejected { reason } => FlowAbort::Error(TryOnError::Generation(reason)),
        PollError::EmptyOutput => {
            FlowAbort::Error(TryOnError::Generation("provider returned no images".into()))
        }
        PollError::Timeout { limit } => FlowAbort::Error(TryOnError::Timeout(limit)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TryOnError {
    #[error("invalid request: {0}")]
    Invalid(#[from] garde::Report),

    #[error("image ingestion failed: {0}")]
    Ingestion(#[from] IngestError),

    #[error("image upload failed: {0}")]
    Upload(#[from] StorageError),

    #[error("job submission failed: {0}")]
    Submission(ProviderError),

    #[error("status poll failed: {0}")]
    Poll(ProviderError),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("no garment image or catalog URL provided")]
    MissingGarment,

    #[error("a try-on is already in progress")]
    Busy,
}
