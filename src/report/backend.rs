//! Backend abstraction used by the orchestrator.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::client::{BackendClient, ClientError, JobId, PhaseStream, ProgressFn, RecordingSummary};

/// Everything the orchestrator needs from the meeting backend.
#[async_trait]
pub trait ReportBackend: Send + Sync {
    async fn start_recording(&self) -> Result<JobId, ClientError>;

    async fn stop_recording(&self, job_id: &JobId) -> Result<(), ClientError>;

    async fn list_recordings(&self) -> Result<Vec<RecordingSummary>, ClientError>;

    async fn upload(&self, file: &Path, on_progress: ProgressFn) -> Result<JobId, ClientError>;

    /// Open the phase stream for `job_id`. Never fails up front; connection
    /// problems arrive on the stream itself.
    fn open_phase_stream(&self, job_id: &JobId) -> PhaseStream;

    /// Fetch the generated report, returning where it was saved.
    async fn download_report(&self, job_id: &JobId) -> Result<PathBuf, ClientError>;
}

/// [`ReportBackend`] over HTTP, saving reports into `download_dir`.
pub struct HttpBackend {
    client: BackendClient,
    download_dir: PathBuf,
}

impl HttpBackend {
    pub fn new(client: BackendClient, download_dir: PathBuf) -> Self {
        Self {
            client,
            download_dir,
        }
    }

    pub fn client(&self) -> &BackendClient {
        &self.client
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }
}

#[async_trait]
impl ReportBackend for HttpBackend {
    async fn start_recording(&self) -> Result<JobId, ClientError> {
        self.client.start_recording().await
    }

    async fn stop_recording(&self, job_id: &JobId) -> Result<(), ClientError> {
        self.client.stop_recording(job_id).await
    }

    async fn list_recordings(&self) -> Result<Vec<RecordingSummary>, ClientError> {
        self.client.list_recordings().await
    }

    async fn upload(&self, file: &Path, on_progress: ProgressFn) -> Result<JobId, ClientError> {
        self.client.upload(file, on_progress).await
    }

    fn open_phase_stream(&self, job_id: &JobId) -> PhaseStream {
        self.client.open_phase_stream(job_id)
    }

    async fn download_report(&self, job_id: &JobId) -> Result<PathBuf, ClientError> {
        self.client.download_report(job_id, &self.download_dir).await
    }
}
