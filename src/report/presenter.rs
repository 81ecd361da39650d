//! Seam between the orchestrator and whatever renders its state.

use std::path::Path;

use super::error::OrchestratorError;
use super::generation::GenerationState;
use super::orchestrator::{RecordingSession, UploadSession};
use crate::client::RecordingSummary;

/// Receives state changes and notifications from the orchestrator.
///
/// Only `alert` is required; every other hook defaults to doing nothing.
pub trait Presenter {
    /// Blocking, modal-style notification.
    fn alert(&mut self, error: &OrchestratorError);

    fn recording_changed(&mut self, _session: &RecordingSession) {}

    fn recordings_listed(&mut self, _recordings: &[RecordingSummary]) {}

    fn upload_changed(&mut self, _upload: &UploadSession) {}

    fn generation_changed(&mut self, _state: &GenerationState) {}

    fn report_saved(&mut self, _path: &Path) {}
}
