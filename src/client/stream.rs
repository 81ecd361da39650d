//! Server-push report stream scoped to one job.
//!
//! The reader runs as a background task and forwards decoded
//! [`PhaseMessage`]s in arrival order. It stops after the first terminal
//! message (`done` or `error`), or reports a single [`StreamFailure`] when
//! the connection ends any other way. There is no reconnection.

use futures_util::{Stream, StreamExt};
use reqwest::Method;
use std::fmt::Display;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::StreamFailure;
use super::phase::PhaseMessage;
use super::sse::SseDecoder;
use super::{BackendClient, JobId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Message(PhaseMessage),
    Failure(StreamFailure),
}

impl StreamEvent {
    /// Nothing follows a terminal message or a failure.
    pub fn is_final(&self) -> bool {
        match self {
            Self::Message(message) => message.is_terminal(),
            Self::Failure(_) => true,
        }
    }
}

/// Closes the connection behind a [`PhaseStream`]. Closing twice is harmless.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    job_id: JobId,
    cancel: CancellationToken,
}

impl StreamHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            debug!("Closing report stream for {}", self.job_id);
            self.cancel.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Producer side of a [`PhaseStream`].
pub struct StreamSender {
    tx: mpsc::UnboundedSender<StreamEvent>,
    cancel: CancellationToken,
}

impl StreamSender {
    /// Forward an event. Returns false once the stream has been closed.
    pub fn send(&self, event: StreamEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves when the consumer closes the stream.
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }
}

/// Consumer side: ordered events for one job plus the handle closing them.
pub struct PhaseStream {
    handle: StreamHandle,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    finished: bool,
}

impl PhaseStream {
    /// Connected sender/stream pair for `job_id`.
    pub fn pair(job_id: JobId) -> (StreamSender, PhaseStream) {
        let (tx, events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let sender = StreamSender {
            tx,
            cancel: cancel.clone(),
        };
        let stream = PhaseStream {
            handle: StreamHandle { job_id, cancel },
            events,
            finished: false,
        };
        (sender, stream)
    }

    pub fn handle(&self) -> &StreamHandle {
        &self.handle
    }

    pub fn job_id(&self) -> &JobId {
        self.handle.job_id()
    }

    pub fn close(&self) {
        self.handle.close();
    }

    /// Next event in arrival order; `None` once closed or after a final event.
    ///
    /// A producer that goes away without a terminal message is reported as
    /// [`StreamFailure::Disconnected`].
    pub async fn next(&mut self) -> Option<StreamEvent> {
        if self.finished || self.handle.is_closed() {
            return None;
        }

        let event = match self.events.recv().await {
            Some(event) => event,
            None if self.handle.is_closed() => return None,
            None => StreamEvent::Failure(StreamFailure::Disconnected),
        };

        if self.handle.is_closed() {
            return None;
        }
        if event.is_final() {
            self.finished = true;
        }
        Some(event)
    }
}

impl Drop for PhaseStream {
    fn drop(&mut self) {
        self.handle.close();
    }
}

impl BackendClient {
    /// Open `GET /generate-report-stream/<id>`.
    ///
    /// Returns immediately; connection problems arrive as a
    /// [`StreamEvent::Failure`]. Must be called within a Tokio runtime.
    pub fn open_phase_stream(&self, job_id: &JobId) -> PhaseStream {
        let (sender, stream) = PhaseStream::pair(job_id.clone());
        let request = self
            .request(
                Method::GET,
                self.endpoint(&["generate-report-stream", job_id.as_str()]),
            )
            .header(reqwest::header::ACCEPT, "text/event-stream");
        let job_id = job_id.clone();

        tokio::spawn(async move {
            info!("Opening report stream for {}", job_id);
            let outcome = tokio::select! {
                _ = sender.closed() => Ok(()),
                outcome = read_response(request, &sender) => outcome,
            };

            match outcome {
                Ok(()) => debug!("Report stream for {} ended", job_id),
                Err(failure) => {
                    warn!("Report stream for {} failed: {}", job_id, failure);
                    sender.send(StreamEvent::Failure(failure));
                }
            }
        });

        stream
    }
}

async fn read_response(
    request: reqwest::RequestBuilder,
    sender: &StreamSender,
) -> Result<(), StreamFailure> {
    let response = request
        .send()
        .await
        .map_err(|e| StreamFailure::Connect(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(StreamFailure::Status(status));
    }

    forward_events(response.bytes_stream(), sender).await
}

/// Decode an SSE byte stream into phase messages and forward them.
///
/// Returns `Ok` after a terminal message or when the consumer is gone.
pub async fn forward_events<S, B, E>(bytes: S, sender: &StreamSender) -> Result<(), StreamFailure>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    futures_util::pin_mut!(bytes);
    let mut decoder = SseDecoder::new();

    while let Some(chunk) = bytes.next().await {
        let chunk = chunk.map_err(|e| {
            debug!("Report stream read error: {}", e);
            StreamFailure::Disconnected
        })?;

        for payload in decoder.push(chunk.as_ref()) {
            let payload = payload.map_err(|e| StreamFailure::Malformed(e.to_string()))?;
            let message = PhaseMessage::decode(&payload)
                .map_err(|e| StreamFailure::Malformed(format!("{e}: {payload}")))?;
            debug!("Report phase: {:?}", message);

            let terminal = message.is_terminal();
            if !sender.send(StreamEvent::Message(message)) {
                return Ok(());
            }
            if terminal {
                return Ok(());
            }
        }
    }

    Err(StreamFailure::Disconnected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::PhaseStatus;
    use futures_util::stream;
    use std::convert::Infallible;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<&'static [u8], Infallible>> {
        stream::iter(parts.iter().map(|p| Ok(p.as_bytes())).collect::<Vec<_>>())
    }

    async fn drain(stream: &mut PhaseStream) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_forwards_in_order_and_stops_at_done() {
        let (sender, mut stream) = PhaseStream::pair(JobId::from("abc"));
        let outcome = forward_events(
            chunks(&[
                "data: {\"phase\":\"diarization\",\"status\":\"start\"}\n\n",
                "data: {\"phase\":\"transcription\",\"total\":2,\"done\":0}\n\ndata: {\"phase\":\"done\"}\n\n",
                "data: {\"phase\":\"summary\",\"status\":\"start\"}\n\n",
            ]),
            &sender,
        )
        .await;
        assert_eq!(outcome, Ok(()));
        drop(sender);

        let events = drain(&mut stream).await;
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[2],
            StreamEvent::Message(PhaseMessage::Done { path: None })
        );
    }

    #[tokio::test]
    async fn test_malformed_record_is_a_failure() {
        let (sender, _stream) = PhaseStream::pair(JobId::from("abc"));
        let outcome = forward_events(chunks(&["data: {oops\n\n"]), &sender).await;
        assert!(matches!(outcome, Err(StreamFailure::Malformed(_))));
    }

    #[tokio::test]
    async fn test_invalid_utf8_record_is_malformed() {
        let (sender, mut stream) = PhaseStream::pair(JobId::from("abc"));
        let bytes: Vec<Result<&'static [u8], Infallible>> = vec![
            Ok(&b"data: {\"phase\":\"summary\",\"status\":\"start\"}\n\n"[..]),
            Ok(&b"data: {\"phase\":\"error\",\"message\":\"disk \xff full\"}\n\n"[..]),
        ];
        let outcome = forward_events(stream::iter(bytes), &sender).await;
        assert!(matches!(outcome, Err(StreamFailure::Malformed(_))));
        drop(sender);

        let events = drain(&mut stream).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Message(PhaseMessage::Summary {
                    status: Some(PhaseStatus::Start),
                }),
                StreamEvent::Failure(StreamFailure::Disconnected),
            ]
        );
    }

    #[tokio::test]
    async fn test_lone_cr_framing_is_forwarded() {
        let (sender, _stream) = PhaseStream::pair(JobId::from("abc"));
        let outcome = forward_events(chunks(&["data: {\"phase\":\"done\"}\r\r"]), &sender).await;
        assert_eq!(outcome, Ok(()));
    }

    #[tokio::test]
    async fn test_end_without_terminal_is_disconnect() {
        let (sender, _stream) = PhaseStream::pair(JobId::from("abc"));
        let outcome = forward_events(
            chunks(&["data: {\"phase\":\"summary\",\"status\":\"start\"}\n\n"]),
            &sender,
        )
        .await;
        assert_eq!(outcome, Err(StreamFailure::Disconnected));
    }

    #[tokio::test]
    async fn test_dropped_producer_reports_single_failure() {
        let (sender, mut stream) = PhaseStream::pair(JobId::from("abc"));
        sender.send(StreamEvent::Message(PhaseMessage::Summary { status: None }));
        drop(sender);

        let events = drain(&mut stream).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Message(PhaseMessage::Summary { status: None }),
                StreamEvent::Failure(StreamFailure::Disconnected),
            ]
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_discards_pending() {
        let (sender, mut stream) = PhaseStream::pair(JobId::from("abc"));
        sender.send(StreamEvent::Message(PhaseMessage::Summary { status: None }));

        stream.close();
        stream.close();
        assert!(stream.handle().is_closed());
        assert!(sender.is_closed());
        assert!(!sender.send(StreamEvent::Message(PhaseMessage::Done { path: None })));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_drop_closes_handle() {
        let (sender, stream) = PhaseStream::pair(JobId::from("abc"));
        let handle = stream.handle().clone();
        drop(stream);
        assert!(handle.is_closed());
        assert!(sender.is_closed());
    }
}
