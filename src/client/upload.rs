//! Streaming multipart upload with progress reporting.

use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Method};
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::{success_body, BackendClient, ClientError, JobId};

/// Receives upload percentages, 0 to 100.
pub type ProgressFn = Box<dyn FnMut(u8) + Send>;

/// Turns bytes handed to the transport into non-decreasing percentages.
///
/// Once [`settle`](Self::settle) has been called the callback is never
/// invoked again, whatever the transport still does with the body.
#[derive(Clone)]
pub struct UploadTracker {
    inner: Arc<Mutex<TrackerState>>,
}

struct TrackerState {
    total: u64,
    sent: u64,
    last: Option<u8>,
    settled: bool,
    on_progress: ProgressFn,
}

impl UploadTracker {
    pub fn new(total: u64, on_progress: ProgressFn) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TrackerState {
                total,
                sent: 0,
                last: None,
                settled: false,
                on_progress,
            })),
        }
    }

    /// Report the starting point (0%, or 100% for an empty file).
    pub fn begin(&self) {
        self.advance(0);
    }

    /// Account for `bytes` more handed to the transport.
    pub fn advance(&self, bytes: u64) {
        let Ok(mut state) = self.inner.lock() else {
            return;
        };
        if state.settled {
            return;
        }

        state.sent = state.sent.saturating_add(bytes).min(state.total);
        let percent = percent_of(state.sent, state.total);
        if state.last.map_or(true, |last| percent > last) {
            state.last = Some(percent);
            (state.on_progress)(percent);
        }
    }

    /// Stop reporting. Called exactly when the transfer resolves or fails.
    pub fn settle(&self) {
        if let Ok(mut state) = self.inner.lock() {
            state.settled = true;
        }
    }

    pub fn last_percent(&self) -> Option<u8> {
        self.inner.lock().ok().and_then(|state| state.last)
    }
}

/// Rounded share of `sent` over `total`, capped at 100.
fn percent_of(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = (sent as u128 * 100 + total as u128 / 2) / total as u128;
    percent.min(100) as u8
}

pub fn mime_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "wav" => Some("audio/wav"),
        "mp3" => Some("audio/mpeg"),
        "m4a" => Some("audio/mp4"),
        "flac" => Some("audio/flac"),
        "ogg" => Some("audio/ogg"),
        "opus" => Some("audio/opus"),
        "webm" => Some("audio/webm"),
        "mp4" => Some("video/mp4"),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: JobId,
}

impl BackendClient {
    /// `POST /upload` with the file streamed as multipart field `file`.
    ///
    /// `on_progress` sees non-decreasing percentages while bytes go out and
    /// is silent once this returns.
    pub async fn upload(&self, file_path: &Path, on_progress: ProgressFn) -> Result<JobId, ClientError> {
        let file = File::open(file_path).await?;
        let total = file.metadata().await?.len();

        let filename = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio")
            .to_string();
        let ext = file_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        let mime_type = mime_type_for_extension(&ext).unwrap_or("application/octet-stream");

        info!("Uploading {:?} ({} bytes, {})", file_path, total, mime_type);

        let tracker = UploadTracker::new(total, on_progress);
        tracker.begin();

        let counter = tracker.clone();
        let body_stream = ReaderStream::new(file).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                counter.advance(bytes.len() as u64);
            }
            chunk
        });

        let part = Part::stream_with_length(Body::wrap_stream(body_stream), total)
            .file_name(filename)
            .mime_str(mime_type)?;
        let form = Form::new().part("file", part);

        let result = self.send_upload(form).await;
        tracker.settle();

        match &result {
            Ok(id) => info!("Upload complete, job id {}", id),
            Err(e) => debug!("Upload of {:?} failed: {}", file_path, e),
        }
        result
    }

    async fn send_upload(&self, form: Form) -> Result<JobId, ClientError> {
        let response = self
            .request(Method::POST, self.endpoint(&["upload"]))
            .multipart(form)
            .send()
            .await?;
        let body = success_body(response).await?;
        let parsed: UploadResponse = serde_json::from_str(&body)?;
        Ok(parsed.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_tracker(total: u64) -> (UploadTracker, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let tracker = UploadTracker::new(
            total,
            Box::new(move |percent| sink.lock().unwrap().push(percent)),
        );
        (tracker, seen)
    }

    #[test]
    fn test_percent_of_rounds() {
        assert_eq!(percent_of(0, 10), 0);
        assert_eq!(percent_of(1, 3), 33);
        assert_eq!(percent_of(2, 3), 67);
        assert_eq!(percent_of(10, 10), 100);
        assert_eq!(percent_of(0, 0), 100);
    }

    #[test]
    fn test_progress_is_non_decreasing_and_reaches_100() {
        let total = 10 * 1024 * 1024;
        let (tracker, seen) = recording_tracker(total);
        tracker.begin();
        for _ in 0..160 {
            tracker.advance(64 * 1024);
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_overshoot_is_capped() {
        let (tracker, seen) = recording_tracker(100);
        tracker.advance(250);
        tracker.advance(10);
        assert_eq!(*seen.lock().unwrap(), vec![100]);
        assert_eq!(tracker.last_percent(), Some(100));
    }

    #[test]
    fn test_no_progress_after_settle() {
        let (tracker, seen) = recording_tracker(100);
        tracker.begin();
        tracker.advance(40);
        tracker.settle();
        tracker.advance(60);
        assert_eq!(*seen.lock().unwrap(), vec![0, 40]);
    }

    #[test]
    fn test_empty_file_reports_complete() {
        let (tracker, seen) = recording_tracker(0);
        tracker.begin();
        assert_eq!(*seen.lock().unwrap(), vec![100]);
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(mime_type_for_extension("wav"), Some("audio/wav"));
        assert_eq!(mime_type_for_extension("mp3"), Some("audio/mpeg"));
        assert_eq!(mime_type_for_extension("xyz"), None);
    }
}
