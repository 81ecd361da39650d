//! Messages pushed by the report generation stream.

use serde::Deserialize;

/// Sub-status attached to the diarization, summary and docx phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Start,
    Skipped,
    End,
    #[serde(other)]
    Other,
}

/// One record of the report stream, tagged by its `phase` field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum PhaseMessage {
    Diarization {
        #[serde(default)]
        status: Option<PhaseStatus>,
        #[serde(default)]
        count: Option<u64>,
    },
    Transcription {
        #[serde(default)]
        done: Option<u64>,
        #[serde(default)]
        total: Option<u64>,
    },
    Summary {
        #[serde(default)]
        status: Option<PhaseStatus>,
    },
    Docx {
        #[serde(default)]
        status: Option<PhaseStatus>,
        #[serde(default)]
        path: Option<String>,
    },
    Done {
        #[serde(default)]
        path: Option<String>,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    /// A phase this client does not know yet.
    #[serde(other)]
    Unknown,
}

impl PhaseMessage {
    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// `done` and `error` end the stream semantically.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Diarization { .. } => "diarization",
            Self::Transcription { .. } => "transcription",
            Self::Summary { .. } => "summary",
            Self::Docx { .. } => "docx",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
            Self::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_diarization_with_count() {
        let msg = PhaseMessage::decode(r#"{"phase":"diarization","status":"end","count":4}"#).unwrap();
        assert_eq!(
            msg,
            PhaseMessage::Diarization {
                status: Some(PhaseStatus::End),
                count: Some(4)
            }
        );
    }

    #[test]
    fn test_decode_transcription_without_total() {
        let msg = PhaseMessage::decode(r#"{"phase":"transcription","done":3}"#).unwrap();
        assert_eq!(
            msg,
            PhaseMessage::Transcription {
                done: Some(3),
                total: None
            }
        );
    }

    #[test]
    fn test_decode_done_with_path() {
        let msg = PhaseMessage::decode(r#"{"phase":"done","path":"reports/abc.docx"}"#).unwrap();
        assert!(msg.is_terminal());
        assert_eq!(msg.name(), "done");
    }

    #[test]
    fn test_decode_error_message() {
        let msg = PhaseMessage::decode(r#"{"phase":"error","message":"disk full"}"#).unwrap();
        assert_eq!(
            msg,
            PhaseMessage::Error {
                message: Some("disk full".to_string())
            }
        );
        assert!(msg.is_terminal());
    }

    #[test]
    fn test_unknown_phase_and_status_are_tolerated() {
        let msg = PhaseMessage::decode(r#"{"phase":"translation","status":"start"}"#).unwrap();
        assert_eq!(msg, PhaseMessage::Unknown);
        assert!(!msg.is_terminal());

        let msg = PhaseMessage::decode(r#"{"phase":"summary","status":"paused"}"#).unwrap();
        assert_eq!(
            msg,
            PhaseMessage::Summary {
                status: Some(PhaseStatus::Other)
            }
        );
    }

    #[test]
    fn test_malformed_records_fail() {
        assert!(PhaseMessage::decode("not json").is_err());
        assert!(PhaseMessage::decode(r#"{"status":"start"}"#).is_err());
        assert!(PhaseMessage::decode(r#"{"phase":"transcription","done":"five"}"#).is_err());
    }
}
