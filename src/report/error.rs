use thiserror::Error;

use crate::client::ClientError;

/// Failures the user has to be told about.
///
/// A dropped report stream has no variant here: it ends generation
/// without notifying the user.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Could not start recording: {0}")]
    StartRecording(#[source] ClientError),

    #[error("Could not stop recording: {0}")]
    StopRecording(#[source] ClientError),

    #[error("An upload is already in progress")]
    UploadBusy,

    #[error("Upload failed: {0}")]
    Upload(#[source] ClientError),

    #[error("Could not refresh recordings: {0}")]
    RefreshRecordings(#[source] ClientError),

    /// Explicit `error` phase; the backend's message is shown verbatim.
    #[error("Report generation failed: {0}")]
    Generation(String),

    #[error("Could not download report: {0}")]
    Download(#[source] ClientError),
}

impl OrchestratorError {
    /// Message from the backend, for the generation failure.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            Self::Generation(message) => Some(message),
            _ => None,
        }
    }
}
