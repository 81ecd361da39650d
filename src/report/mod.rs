//! Report workflow: recording control, uploads, generation progress and
//! the final download, driven by [`ReportOrchestrator`].

pub mod backend;
pub mod error;
pub mod generation;
pub mod orchestrator;
pub mod presenter;

pub use backend::{HttpBackend, ReportBackend};
pub use error::OrchestratorError;
pub use generation::{GenerationState, Reaction, Step};
pub use orchestrator::{
    Activity, OrchestratorEvent, RecordingSession, ReportOrchestrator, UploadSession,
};
pub use presenter::Presenter;
