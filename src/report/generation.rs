//! Visible progress of a report generation and the fold over phase messages.
//!
//! [`GenerationState::fold`] is pure: the orchestrator owns the side effects
//! (closing the stream, downloading, alerting) and acts on the returned
//! [`Reaction`].

use serde::Serialize;

use crate::client::{PhaseMessage, PhaseStatus};

/// Step shown to the user while the backend works.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Diarization,
    Transcription,
    Summary,
    Document,
}

impl Step {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Diarization => "Diarization",
            Self::Transcription => "Transcription",
            Self::Summary => "Résumé",
            Self::Document => "Génération du rapport",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationState {
    pub active: bool,
    pub step: Step,
    pub percent: u8,
}

impl Default for GenerationState {
    fn default() -> Self {
        Self {
            active: false,
            step: Step::Diarization,
            percent: 0,
        }
    }
}

/// What the orchestrator must do after folding a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    Continue,
    /// `done`: close the stream and download the report.
    Completed,
    /// `error`: close the stream and show the backend's message.
    Failed(String),
}

const UNKNOWN_ERROR: &str = "unknown error";

impl GenerationState {
    /// State right after a generation request.
    pub fn started() -> Self {
        Self {
            active: true,
            ..Self::default()
        }
    }

    pub fn step_label(&self) -> &'static str {
        self.step.label()
    }

    fn at(step: Step, percent: u8) -> Self {
        Self {
            active: true,
            step,
            percent,
        }
    }

    /// Apply one phase message. An inactive state ignores everything.
    pub fn fold(&self, message: &PhaseMessage) -> (GenerationState, Reaction) {
        if !self.active {
            return (self.clone(), Reaction::Continue);
        }

        match message {
            PhaseMessage::Diarization {
                status: Some(PhaseStatus::Skipped | PhaseStatus::End),
                ..
            } => (Self::at(Step::Transcription, 0), Reaction::Continue),
            PhaseMessage::Transcription { done, total } => {
                let percent = match total {
                    Some(total) if *total > 0 => transcription_percent(done.unwrap_or(0), *total),
                    _ => self.percent,
                };
                (Self::at(Step::Transcription, percent), Reaction::Continue)
            }
            PhaseMessage::Summary {
                status: Some(PhaseStatus::Start),
            } => (Self::at(Step::Summary, 0), Reaction::Continue),
            PhaseMessage::Docx {
                status: Some(PhaseStatus::Start),
                ..
            } => (Self::at(Step::Document, 0), Reaction::Continue),
            PhaseMessage::Done { .. } => (self.finished(), Reaction::Completed),
            PhaseMessage::Error { message } => {
                let message = message
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
                (self.finished(), Reaction::Failed(message))
            }
            _ => (self.clone(), Reaction::Continue),
        }
    }

    /// Same label and percent, no longer active.
    pub fn finished(&self) -> Self {
        Self {
            active: false,
            ..self.clone()
        }
    }
}

fn transcription_percent(done: u64, total: u64) -> u8 {
    let percent = (done as u128 * 100 + total as u128 / 2) / total as u128;
    percent.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold_all(messages: &[PhaseMessage]) -> (GenerationState, Vec<Reaction>) {
        let mut state = GenerationState::started();
        let mut reactions = Vec::new();
        for message in messages {
            let (next, reaction) = state.fold(message);
            state = next;
            reactions.push(reaction);
        }
        (state, reactions)
    }

    fn transcription(done: Option<u64>, total: Option<u64>) -> PhaseMessage {
        PhaseMessage::Transcription { done, total }
    }

    #[test]
    fn test_started_state() {
        let state = GenerationState::started();
        assert!(state.active);
        assert_eq!(state.step_label(), "Diarization");
        assert_eq!(state.percent, 0);
    }

    #[test]
    fn test_diarization_start_changes_nothing() {
        let state = GenerationState::started();
        let (next, reaction) = state.fold(&PhaseMessage::Diarization {
            status: Some(PhaseStatus::Start),
            count: None,
        });
        assert_eq!(next, state);
        assert_eq!(reaction, Reaction::Continue);

        let (next, _) = state.fold(&PhaseMessage::Diarization {
            status: None,
            count: None,
        });
        assert_eq!(next, state);
    }

    #[test]
    fn test_diarization_end_or_skipped_moves_to_transcription() {
        for status in [PhaseStatus::End, PhaseStatus::Skipped] {
            let (next, _) = GenerationState::started().fold(&PhaseMessage::Diarization {
                status: Some(status),
                count: Some(3),
            });
            assert_eq!(next.step, Step::Transcription);
            assert_eq!(next.percent, 0);
            assert!(next.active);
        }
    }

    #[test]
    fn test_diarization_then_transcription_half_way() {
        let (state, _) = fold_all(&[
            PhaseMessage::Diarization {
                status: Some(PhaseStatus::End),
                count: None,
            },
            transcription(Some(5), Some(10)),
        ]);
        assert_eq!(state.step_label(), "Transcription");
        assert_eq!(state.percent, 50);
        assert!(state.active);
    }

    #[test]
    fn test_transcription_without_total_keeps_percent() {
        let (state, _) = fold_all(&[transcription(Some(1), Some(4)), transcription(Some(2), None)]);
        assert_eq!(state.step, Step::Transcription);
        assert_eq!(state.percent, 25);
    }

    #[test]
    fn test_transcription_zero_total_ignored_for_percent() {
        let (state, _) = fold_all(&[transcription(Some(0), Some(0))]);
        assert_eq!(state.step, Step::Transcription);
        assert_eq!(state.percent, 0);
    }

    #[test]
    fn test_transcription_percent_rounds_and_is_monotonic() {
        let total = 7;
        let mut state = GenerationState::started();
        let mut previous = 0;
        for done in 0..=total {
            state = state.fold(&transcription(Some(done), Some(total))).0;
            assert!(state.percent >= previous);
            previous = state.percent;
        }
        assert_eq!(state.percent, 100);
        assert_eq!(transcription_percent(1, 3), 33);
        assert_eq!(transcription_percent(2, 3), 67);
        assert_eq!(transcription_percent(12, 10), 100);
    }

    #[test]
    fn test_summary_and_docx_labels() {
        let (state, _) = fold_all(&[
            transcription(Some(10), Some(10)),
            PhaseMessage::Summary {
                status: Some(PhaseStatus::Start),
            },
        ]);
        assert_eq!(state.step_label(), "Résumé");
        assert_eq!(state.percent, 0);

        let (next, _) = state.fold(&PhaseMessage::Docx {
            status: Some(PhaseStatus::Start),
            path: None,
        });
        assert_eq!(next.step_label(), "Génération du rapport");
        assert_eq!(next.percent, 0);
    }

    #[test]
    fn test_end_statuses_and_unknown_phases_are_ignored() {
        let state = GenerationState::at(Step::Summary, 0);
        for message in [
            PhaseMessage::Summary {
                status: Some(PhaseStatus::End),
            },
            PhaseMessage::Docx {
                status: Some(PhaseStatus::End),
                path: Some("x.docx".to_string()),
            },
            PhaseMessage::Summary {
                status: Some(PhaseStatus::Other),
            },
            PhaseMessage::Unknown,
        ] {
            let (next, reaction) = state.fold(&message);
            assert_eq!(next, state);
            assert_eq!(reaction, Reaction::Continue);
        }
    }

    #[test]
    fn test_done_completes() {
        let (state, reactions) = fold_all(&[
            transcription(Some(1), Some(2)),
            PhaseMessage::Done { path: None },
        ]);
        assert!(!state.active);
        assert_eq!(reactions, vec![Reaction::Continue, Reaction::Completed]);
    }

    #[test]
    fn test_error_fails_with_message() {
        let (state, reactions) = fold_all(&[PhaseMessage::Error {
            message: Some("disk full".to_string()),
        }]);
        assert!(!state.active);
        assert_eq!(reactions, vec![Reaction::Failed("disk full".to_string())]);

        let (_, reaction) = GenerationState::started().fold(&PhaseMessage::Error { message: None });
        assert_eq!(reaction, Reaction::Failed(UNKNOWN_ERROR.to_string()));
    }

    #[test]
    fn test_inactive_state_ignores_messages() {
        let state = GenerationState::default();
        let (next, reaction) = state.fold(&PhaseMessage::Done { path: None });
        assert_eq!(next, state);
        assert_eq!(reaction, Reaction::Continue);
    }

    #[test]
    fn test_active_for_every_prefix_before_done() {
        let messages = vec![
            PhaseMessage::Diarization {
                status: Some(PhaseStatus::Start),
                count: None,
            },
            PhaseMessage::Diarization {
                status: Some(PhaseStatus::Skipped),
                count: Some(1),
            },
            transcription(Some(0), Some(3)),
            transcription(Some(3), None),
            PhaseMessage::Summary {
                status: Some(PhaseStatus::Start),
            },
            PhaseMessage::Summary {
                status: Some(PhaseStatus::End),
            },
            PhaseMessage::Docx {
                status: Some(PhaseStatus::Start),
                path: None,
            },
            PhaseMessage::Done { path: None },
        ];

        let mut state = GenerationState::started();
        let mut completions = 0;
        for (index, message) in messages.iter().enumerate() {
            assert!(state.active, "inactive before message {index}");
            let (next, reaction) = state.fold(message);
            state = next;
            if reaction == Reaction::Completed {
                completions += 1;
            }
        }
        assert!(!state.active);
        assert_eq!(completions, 1);
    }
}
