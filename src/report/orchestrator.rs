//! Recording, upload and report generation for one active job.
//!
//! The orchestrator is the single owner of the active job id, the recording
//! and upload sessions, the generation state and the one open phase stream.
//! Operations are `&mut self`; work that outlives a call (the upload task,
//! the phase stream) reports back through [`next_event`] and is folded in by
//! [`handle_event`].
//!
//! [`next_event`]: ReportOrchestrator::next_event
//! [`handle_event`]: ReportOrchestrator::handle_event

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backend::ReportBackend;
use super::error::OrchestratorError;
use super::generation::{GenerationState, Reaction};
use super::presenter::Presenter;
use crate::client::{
    ClientError, JobId, PhaseMessage, PhaseStream, RecordingSummary, StreamEvent, StreamFailure,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordingSession {
    pub active: bool,
    pub job_id: Option<JobId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UploadSession {
    pub in_progress: bool,
    pub percent: u8,
}

/// What the user currently sees the client doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    Idle,
    Recording,
    Uploading,
    Generating,
    Errored,
}

impl Activity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Uploading => "uploading",
            Self::Generating => "generating",
            Self::Errored => "errored",
        }
    }
}

#[derive(Debug)]
pub enum OrchestratorEvent {
    UploadProgress(u8),
    UploadFinished(Result<JobId, ClientError>),
    Stream(StreamEvent),
}

pub struct ReportOrchestrator<P: Presenter> {
    backend: Arc<dyn ReportBackend>,
    presenter: P,
    job_id: Option<JobId>,
    recording: RecordingSession,
    upload: UploadSession,
    upload_task: Option<JoinHandle<()>>,
    generation: GenerationState,
    stream: Option<PhaseStream>,
    last_error: Option<String>,
    events_tx: mpsc::UnboundedSender<OrchestratorEvent>,
    events_rx: mpsc::UnboundedReceiver<OrchestratorEvent>,
}

impl<P: Presenter> ReportOrchestrator<P> {
    pub fn new(backend: Arc<dyn ReportBackend>, presenter: P) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            presenter,
            job_id: None,
            recording: RecordingSession::default(),
            upload: UploadSession::default(),
            upload_task: None,
            generation: GenerationState::default(),
            stream: None,
            last_error: None,
            events_tx,
            events_rx,
        }
    }

    pub fn job_id(&self) -> Option<&JobId> {
        self.job_id.as_ref()
    }

    pub fn recording(&self) -> &RecordingSession {
        &self.recording
    }

    pub fn upload(&self) -> &UploadSession {
        &self.upload
    }

    pub fn generation(&self) -> &GenerationState {
        &self.generation
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    pub fn has_open_stream(&self) -> bool {
        self.stream.is_some()
    }

    /// Whether an upload or a report stream is still in flight.
    pub fn is_busy(&self) -> bool {
        self.upload.in_progress || self.stream.is_some()
    }

    pub fn activity(&self) -> Activity {
        if self.generation.active {
            Activity::Generating
        } else if self.upload.in_progress {
            Activity::Uploading
        } else if self.recording.active {
            Activity::Recording
        } else if self.last_error.is_some() {
            Activity::Errored
        } else {
            Activity::Idle
        }
    }

    /// Start a live recording, or stop the running one.
    ///
    /// A failed stop leaves the recording active so the user can retry.
    pub async fn toggle_recording(&mut self) {
        self.last_error = None;
        if self.recording.active {
            self.stop_recording().await;
        } else {
            self.start_recording().await;
        }
    }

    async fn start_recording(&mut self) {
        match self.backend.start_recording().await {
            Ok(job_id) => {
                info!("Recording {} started", job_id);
                self.job_id = Some(job_id.clone());
                self.recording = RecordingSession {
                    active: true,
                    job_id: Some(job_id),
                };
                self.presenter.recording_changed(&self.recording);
            }
            Err(e) => {
                error!("Failed to start recording: {}", e);
                self.alert(OrchestratorError::StartRecording(e));
            }
        }
    }

    async fn stop_recording(&mut self) {
        let Some(job_id) = self.recording.job_id.clone() else {
            warn!("Recording marked active without a job id, resetting");
            self.recording.active = false;
            self.presenter.recording_changed(&self.recording);
            return;
        };

        match self.backend.stop_recording(&job_id).await {
            Ok(()) => {
                info!("Recording {} stopped", job_id);
                self.recording.active = false;
                self.presenter.recording_changed(&self.recording);
                self.refresh_recordings().await;
            }
            Err(e) => {
                error!("Failed to stop recording {}: {}", job_id, e);
                self.alert(OrchestratorError::StopRecording(e));
            }
        }
    }

    /// Fetch the recordings list and hand it to the presenter.
    pub async fn refresh_recordings(&mut self) -> Option<Vec<RecordingSummary>> {
        match self.backend.list_recordings().await {
            Ok(recordings) => {
                debug!("Recordings refreshed: {} entries", recordings.len());
                self.presenter.recordings_listed(&recordings);
                Some(recordings)
            }
            Err(e) => {
                warn!("Failed to refresh recordings: {}", e);
                self.alert(OrchestratorError::RefreshRecordings(e));
                None
            }
        }
    }

    /// Begin uploading `path`. Progress and the outcome arrive as events.
    pub fn upload_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if self.upload.in_progress {
            warn!("Upload of {:?} rejected, another transfer is running", path);
            self.alert(OrchestratorError::UploadBusy);
            return;
        }

        self.last_error = None;
        self.upload = UploadSession {
            in_progress: true,
            percent: 0,
        };
        self.presenter.upload_changed(&self.upload);

        info!("Uploading {:?}", path);
        let backend = Arc::clone(&self.backend);
        let events = self.events_tx.clone();
        self.upload_task = Some(tokio::spawn(async move {
            let progress = events.clone();
            let result = backend
                .upload(
                    &path,
                    Box::new(move |percent| {
                        let _ = progress.send(OrchestratorEvent::UploadProgress(percent));
                    }),
                )
                .await;
            let _ = events.send(OrchestratorEvent::UploadFinished(result));
        }));
    }

    /// Make an existing recording the active job. Refused while recording.
    pub fn select_job(&mut self, job_id: JobId) -> bool {
        if self.recording.active {
            warn!("Cannot switch to job {} while recording", job_id);
            return false;
        }
        info!("Active job set to {}", job_id);
        self.job_id = Some(job_id);
        true
    }

    /// Open the phase stream for the active job.
    ///
    /// No-op without an active job or while a generation is running. Any
    /// stream still open is closed first.
    pub fn generate_report(&mut self) {
        let Some(job_id) = self.job_id.clone() else {
            debug!("Report requested without an active job, ignoring");
            return;
        };
        if self.generation.active {
            debug!("Report generation already running for {}, ignoring", job_id);
            return;
        }

        self.close_stream();
        self.last_error = None;

        info!("Generating report for {}", job_id);
        self.stream = Some(self.backend.open_phase_stream(&job_id));
        self.generation = GenerationState::started();
        self.presenter.generation_changed(&self.generation);
    }

    /// Wait for the next upload or stream event. `None` when nothing is in flight.
    pub async fn next_event(&mut self) -> Option<OrchestratorEvent> {
        let upload_pending = self.upload.in_progress;
        let events = &mut self.events_rx;
        let stream = &mut self.stream;

        tokio::select! {
            Some(event) = events.recv(), if upload_pending => Some(event),
            Some(event) = next_stream_event(stream) => Some(OrchestratorEvent::Stream(event)),
            else => None,
        }
    }

    pub async fn handle_event(&mut self, event: OrchestratorEvent) {
        match event {
            OrchestratorEvent::UploadProgress(percent) => self.upload_progressed(percent),
            OrchestratorEvent::UploadFinished(result) => self.upload_finished(result).await,
            OrchestratorEvent::Stream(StreamEvent::Message(message)) => {
                self.apply_phase(message).await
            }
            OrchestratorEvent::Stream(StreamEvent::Failure(failure)) => self.stream_failed(failure),
        }
    }

    /// Pump events until no upload or generation is in flight.
    pub async fn run_until_settled(&mut self) {
        while let Some(event) = self.next_event().await {
            self.handle_event(event).await;
        }
    }

    /// Tear down: close any open stream and abandon a running upload.
    pub fn shutdown(&mut self) {
        self.close_stream();
        if let Some(task) = self.upload_task.take() {
            task.abort();
        }
        self.upload = UploadSession::default();
        if self.generation.active {
            self.generation = self.generation.finished();
            self.presenter.generation_changed(&self.generation);
        }
    }

    fn upload_progressed(&mut self, percent: u8) {
        if !self.upload.in_progress || percent < self.upload.percent {
            return;
        }
        self.upload.percent = percent;
        self.presenter.upload_changed(&self.upload);
    }

    async fn upload_finished(&mut self, result: Result<JobId, ClientError>) {
        self.upload = UploadSession::default();
        self.upload_task = None;
        self.presenter.upload_changed(&self.upload);

        match result {
            Ok(job_id) => {
                info!("Upload finished, active job is now {}", job_id);
                self.job_id = Some(job_id);
                self.refresh_recordings().await;
            }
            Err(e) => {
                error!("Upload failed: {}", e);
                self.alert(OrchestratorError::Upload(e));
            }
        }
    }

    async fn apply_phase(&mut self, message: PhaseMessage) {
        let Some(job_id) = self.stream.as_ref().map(|s| s.job_id().clone()) else {
            debug!("Dropping {} message, no open stream", message.name());
            return;
        };

        let (next, reaction) = self.generation.fold(&message);
        let changed = next != self.generation;
        self.generation = next;

        match reaction {
            Reaction::Continue => {
                if changed {
                    debug!(
                        "Report {}: {} {}%",
                        job_id,
                        self.generation.step_label(),
                        self.generation.percent
                    );
                    self.presenter.generation_changed(&self.generation);
                }
            }
            Reaction::Completed => {
                info!("Report for {} is ready", job_id);
                self.close_stream();
                self.presenter.generation_changed(&self.generation);
                self.download_report(&job_id).await;
            }
            Reaction::Failed(message) => {
                warn!("Report generation for {} failed: {}", job_id, message);
                self.close_stream();
                self.presenter.generation_changed(&self.generation);
                self.alert(OrchestratorError::Generation(message));
            }
        }
    }

    fn stream_failed(&mut self, failure: StreamFailure) {
        warn!("Report stream dropped: {}", failure);
        self.close_stream();
        if self.generation.active {
            self.generation = self.generation.finished();
            self.presenter.generation_changed(&self.generation);
        }
    }

    async fn download_report(&mut self, job_id: &JobId) {
        match self.backend.download_report(job_id).await {
            Ok(path) => {
                info!("Report for {} saved to {:?}", job_id, path);
                self.presenter.report_saved(&path);
            }
            Err(e) => {
                error!("Failed to download report for {}: {}", job_id, e);
                self.alert(OrchestratorError::Download(e));
            }
        }
    }

    fn close_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.close();
        }
    }

    fn alert(&mut self, error: OrchestratorError) {
        self.last_error = Some(error.to_string());
        self.presenter.alert(&error);
    }
}

impl<P: Presenter> Drop for ReportOrchestrator<P> {
    fn drop(&mut self) {
        self.close_stream();
        if let Some(task) = self.upload_task.take() {
            task.abort();
        }
    }
}

async fn next_stream_event(stream: &mut Option<PhaseStream>) -> Option<StreamEvent> {
    match stream {
        Some(stream) => stream.next().await,
        None => None,
    }
}
