//! Terminal rendering of orchestrator state.

use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::client::RecordingSummary;
use crate::report::{
    GenerationState, OrchestratorError, Presenter, RecordingSession, UploadSession,
};

/// Progress bars on stderr, alerts on stderr, results on stdout.
///
/// Remembers whether any alert was raised so one-shot commands can exit
/// with a failure status.
#[derive(Default)]
pub struct TerminalPresenter {
    upload_bar: Option<ProgressBar>,
    generation_bar: Option<ProgressBar>,
    recordings: Vec<RecordingSummary>,
    saved_reports: Vec<PathBuf>,
    failed: bool,
}

impl TerminalPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Forget earlier failures, before the next one-shot step.
    pub fn reset_failure(&mut self) {
        self.failed = false;
    }

    /// Latest list handed over by the orchestrator.
    pub fn recordings(&self) -> &[RecordingSummary] {
        &self.recordings
    }

    pub fn saved_reports(&self) -> &[PathBuf] {
        &self.saved_reports
    }

    fn println(&self, line: &str) {
        match self.active_bar() {
            Some(bar) => bar.suspend(|| println!("{line}")),
            None => println!("{line}"),
        }
    }

    fn eprintln(&self, line: &str) {
        match self.active_bar() {
            Some(bar) => bar.suspend(|| eprintln!("{line}")),
            None => eprintln!("{line}"),
        }
    }

    fn active_bar(&self) -> Option<&ProgressBar> {
        self.generation_bar.as_ref().or(self.upload_bar.as_ref())
    }
}

impl Presenter for TerminalPresenter {
    fn alert(&mut self, error: &OrchestratorError) {
        self.failed = true;
        self.eprintln(&alert_text(error));
    }

    fn recording_changed(&mut self, session: &RecordingSession) {
        let id = session
            .job_id
            .as_ref()
            .map(|id| id.as_str())
            .unwrap_or("?");
        if session.active {
            self.println(&format!("Recording started ({id})"));
        } else {
            self.println(&format!("Recording stopped ({id})"));
        }
    }

    fn recordings_listed(&mut self, recordings: &[RecordingSummary]) {
        debug!("Presenter received {} recordings", recordings.len());
        self.recordings = recordings.to_vec();
    }

    fn upload_changed(&mut self, upload: &UploadSession) {
        if upload.in_progress {
            let bar = self
                .upload_bar
                .get_or_insert_with(|| create_progress_bar("Uploading"));
            bar.set_position(u64::from(upload.percent));
        } else if let Some(bar) = self.upload_bar.take() {
            bar.finish_and_clear();
        }
    }

    fn generation_changed(&mut self, state: &GenerationState) {
        if state.active {
            let bar = self
                .generation_bar
                .get_or_insert_with(|| create_progress_bar(state.step_label()));
            bar.set_message(state.step_label());
            bar.set_position(u64::from(state.percent));
        } else if let Some(bar) = self.generation_bar.take() {
            bar.finish_and_clear();
        }
    }

    fn report_saved(&mut self, path: &Path) {
        self.println(&format!("Report saved to {}", path.display()));
        self.saved_reports.push(path.to_path_buf());
    }
}

fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}% {msg}")
        .map(|style| style.progress_chars("━╸━"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Table of recordings, newest first as the backend sends them.
pub fn format_recordings(recordings: &[RecordingSummary]) -> String {
    if recordings.is_empty() {
        return "No recordings yet.".to_string();
    }

    let title_width = recordings
        .iter()
        .map(|r| r.title.chars().count())
        .max()
        .unwrap_or(0)
        .max("TITLE".len());

    let mut out = format!(
        "{:<title_width$}  {:<16}  {:<8}  ID",
        "TITLE", "DATE", "DURATION"
    );
    for recording in recordings {
        out.push('\n');
        out.push_str(&format!(
            "{:<title_width$}  {:<16}  {:<8}  {}",
            recording.title, recording.date, recording.duration, recording.id
        ));
    }
    out
}

/// Backend generation errors are printed as sent; everything else gets our own wording.
pub fn alert_text(error: &OrchestratorError) -> String {
    match error.backend_message() {
        Some(message) => format!("Report generation failed: {message}"),
        None => format!("Error: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, JobId};

    fn summary(id: &str, title: &str) -> RecordingSummary {
        RecordingSummary {
            id: JobId::from(id),
            title: title.to_string(),
            date: "2025-05-29 17:00".to_string(),
            duration: "?".to_string(),
        }
    }

    #[test]
    fn test_alert_marks_failure() {
        let mut presenter = TerminalPresenter::new();
        assert!(!presenter.failed());
        presenter.alert(&OrchestratorError::Upload(ClientError::InvalidUrl("x".into())));
        assert!(presenter.failed());
        presenter.reset_failure();
        assert!(!presenter.failed());
    }

    #[test]
    fn test_alert_text_keeps_backend_message() {
        let generation = OrchestratorError::Generation("Audio file is corrupted".to_string());
        assert_eq!(
            alert_text(&generation),
            "Report generation failed: Audio file is corrupted"
        );

        let upload = OrchestratorError::Upload(ClientError::InvalidUrl("x".into()));
        assert!(alert_text(&upload).starts_with("Error: Upload failed"));
    }

    #[test]
    fn test_upload_bar_lifecycle() {
        let mut presenter = TerminalPresenter::new();
        presenter.upload_changed(&UploadSession {
            in_progress: true,
            percent: 40,
        });
        assert_eq!(presenter.upload_bar.as_ref().map(|b| b.position()), Some(40));

        presenter.upload_changed(&UploadSession::default());
        assert!(presenter.upload_bar.is_none());
    }

    #[test]
    fn test_generation_bar_follows_state() {
        let mut presenter = TerminalPresenter::new();
        let state = GenerationState::started();
        presenter.generation_changed(&state);
        assert!(presenter.generation_bar.is_some());

        presenter.generation_changed(&state.finished());
        assert!(presenter.generation_bar.is_none());
    }

    #[test]
    fn test_recordings_are_kept_in_order() {
        let mut presenter = TerminalPresenter::new();
        presenter.recordings_listed(&[summary("B", "Réunion B"), summary("A", "Réunion A")]);
        let ids: Vec<_> = presenter.recordings().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A"]);
    }

    #[test]
    fn test_format_recordings() {
        assert_eq!(format_recordings(&[]), "No recordings yet.");

        let table = format_recordings(&[summary("R1", "Réunion R1")]);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("TITLE"));
        assert!(lines[1].starts_with("Réunion R1"));
        assert!(lines[1].ends_with("R1"));
    }
}
