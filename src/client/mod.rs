//! HTTP client for the meeting backend.
//!
//! Request/response calls (recording control, listing, access codes,
//! report download) live here; the chunked upload is in [`upload`] and the
//! server-push report stream in [`stream`].

pub mod error;
pub mod phase;
pub mod sse;
pub mod stream;
pub mod upload;

use reqwest::header::{HeaderValue, CONTENT_DISPOSITION};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use crate::config::ServerConfig;

pub use error::{AuthError, ClientError, StreamFailure};
pub use phase::{PhaseMessage, PhaseStatus};
pub use stream::{PhaseStream, StreamEvent, StreamHandle, StreamSender};
pub use upload::{mime_type_for_extension, ProgressFn, UploadTracker};

/// Opaque handle minted by the backend for a recording or an upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One entry of `GET /recordings`, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingSummary {
    pub id: JobId,
    pub title: String,
    pub date: String,
    pub duration: String,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: JobId,
}

#[derive(Debug, Serialize)]
struct ValidateCodeRequest<'a> {
    code: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Client for the recording, upload and report endpoints.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
    api_prefix: bool,
    token: Option<String>,
}

impl BackendClient {
    pub fn new(server: &ServerConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(server.connect_timeout())
            .build()?;
        Self::with_http(http, &server.base_url, server.api_prefix)
    }

    pub fn with_http(
        http: reqwest::Client,
        base_url: &str,
        api_prefix: bool,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(format!(
                "{base_url}: cannot carry paths"
            )));
        }

        Ok(Self {
            http,
            base_url,
            api_prefix,
            token: None,
        })
    }

    /// Attach the bearer token sent with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an endpoint URL from path segments, honouring the `/api` prefix.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            if self.api_prefix {
                path.push("api");
            }
            path.extend(segments);
        }
        url
    }

    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// `POST /start-recording`
    pub async fn start_recording(&self) -> Result<JobId, ClientError> {
        let response = self
            .request(Method::POST, self.endpoint(&["start-recording"]))
            .send()
            .await?;
        let body = success_body(response).await?;
        let parsed: IdResponse = serde_json::from_str(&body)?;
        info!("Recording started on backend: {}", parsed.id);
        Ok(parsed.id)
    }

    /// `POST /stop-recording?id=<id>`
    pub async fn stop_recording(&self, job_id: &JobId) -> Result<(), ClientError> {
        let response = self
            .request(Method::POST, self.endpoint(&["stop-recording"]))
            .query(&[("id", job_id.as_str())])
            .send()
            .await?;
        success_body(response).await?;
        info!("Recording {} stopped", job_id);
        Ok(())
    }

    /// `GET /recordings`
    pub async fn list_recordings(&self) -> Result<Vec<RecordingSummary>, ClientError> {
        let response = self
            .request(Method::GET, self.endpoint(&["recordings"]))
            .send()
            .await?;
        let body = success_body(response).await?;
        let recordings: Vec<RecordingSummary> = serde_json::from_str(&body)?;
        debug!("Fetched {} recordings", recordings.len());
        Ok(recordings)
    }

    /// `POST /validate-code`. The route has no `/api` variant.
    pub async fn validate_access_code(&self, code: &str) -> Result<String, AuthError> {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("validate-code");
        }

        let response = self
            .http
            .post(url)
            .json(&ValidateCodeRequest { code })
            .send()
            .await
            .map_err(ClientError::from)?;

        let status = response.status();
        let body = response.text().await.map_err(ClientError::from)?;
        if !status.is_success() {
            return Err(AuthError::Rejected {
                status,
                message: error::detail_message(&body),
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(ClientError::from)?;
        Ok(parsed.token)
    }

    /// `GET /download-report/<id>`, streamed into `dir`. Returns the saved path.
    pub async fn download_report(&self, job_id: &JobId, dir: &Path) -> Result<PathBuf, ClientError> {
        let response = self
            .request(
                Method::GET,
                self.endpoint(&["download-report", job_id.as_str()]),
            )
            .send()
            .await?;
        let mut response = ensure_success(response).await?;

        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(attachment_filename)
            .unwrap_or_else(|| default_report_filename(job_id));

        fs::create_dir_all(dir).await?;
        let destination = dir.join(&filename);
        let partial = dir.join(format!("{filename}.part"));

        let mut file = BufWriter::new(fs::File::create(&partial).await?);
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        fs::rename(&partial, &destination).await?;
        info!("Report for {} saved to {:?} ({} bytes)", job_id, destination, written);
        Ok(destination)
    }
}

/// Fail with [`ClientError::Transport`] unless the status is 2xx.
pub(crate) async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Transport { status, body })
}

pub(crate) async fn success_body(response: Response) -> Result<String, ClientError> {
    let response = ensure_success(response).await?;
    Ok(response.text().await?)
}

fn default_report_filename(job_id: &JobId) -> String {
    format!("report-{}.docx", job_id)
}

/// Extract `filename` from a `Content-Disposition: attachment` header.
fn attachment_filename(header: &HeaderValue) -> Option<String> {
    let value = header.to_str().ok()?;
    let name = value.split(';').map(str::trim).find_map(|part| {
        part.strip_prefix("filename=")
            .map(|name| name.trim_matches('"').to_string())
    })?;

    // Never let the backend pick a directory.
    let name = Path::new(&name).file_name()?.to_str()?.to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
