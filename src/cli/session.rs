//! Interactive session: one-letter commands on stdin, orchestrator events
//! rendered as they arrive.

use anyhow::Result;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use super::presenter::{format_recordings, TerminalPresenter};
use super::validate_upload_file;
use crate::client::JobId;
use crate::report::{OrchestratorEvent, ReportOrchestrator};

const HELP: &str = "\
Commands:
  r           start or stop a live recording
  u <path>    upload an audio file
  g           generate the report for the active job
  j <id>      make an existing recording the active job
  l           list recordings
  s           show status
  h           show this help
  q           quit";

#[derive(Debug, PartialEq, Eq)]
enum SessionCommand {
    ToggleRecording,
    Upload(PathBuf),
    Generate,
    Select(JobId),
    List,
    Status,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

enum Input {
    Line(Option<String>),
    Event(OrchestratorEvent),
    Interrupt,
}

fn parse_command(line: &str) -> SessionCommand {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    match (head, rest) {
        ("", _) => SessionCommand::Empty,
        ("r", "") => SessionCommand::ToggleRecording,
        ("u", "") => SessionCommand::Invalid("usage: u <path>".to_string()),
        ("u", path) => SessionCommand::Upload(PathBuf::from(path)),
        ("g", "") => SessionCommand::Generate,
        ("j", "") => SessionCommand::Invalid("usage: j <id>".to_string()),
        ("j", id) => SessionCommand::Select(JobId::from(id)),
        ("l", "") => SessionCommand::List,
        ("s", "") => SessionCommand::Status,
        ("h" | "?", "") => SessionCommand::Help,
        ("q", "") => SessionCommand::Quit,
        _ => SessionCommand::Invalid(format!("unknown command '{line}', type h for help")),
    }
}

pub async fn run_session(orchestrator: &mut ReportOrchestrator<TerminalPresenter>) -> Result<()> {
    println!("{HELP}");
    if let Some(recordings) = orchestrator.refresh_recordings().await {
        println!("{}", format_recordings(&recordings));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let input = tokio::select! {
            line = lines.next_line() => Input::Line(line?),
            Some(event) = orchestrator.next_event() => Input::Event(event),
            _ = tokio::signal::ctrl_c() => Input::Interrupt,
        };

        match input {
            Input::Event(event) => orchestrator.handle_event(event).await,
            Input::Interrupt => {
                info!("Interrupted, leaving session");
                break;
            }
            Input::Line(None) => {
                debug!("Stdin closed, leaving session");
                break;
            }
            Input::Line(Some(line)) => {
                if !dispatch(orchestrator, parse_command(&line)).await {
                    break;
                }
            }
        }
    }

    orchestrator.shutdown();
    Ok(())
}

/// Run one command. Returns false when the session should end.
async fn dispatch(
    orchestrator: &mut ReportOrchestrator<TerminalPresenter>,
    command: SessionCommand,
) -> bool {
    match command {
        SessionCommand::ToggleRecording => orchestrator.toggle_recording().await,
        SessionCommand::Upload(path) => match validate_upload_file(&path) {
            Ok(()) => orchestrator.upload_file(path),
            Err(e) => eprintln!("{e}"),
        },
        SessionCommand::Generate => {
            if orchestrator.recording().active {
                eprintln!("Stop the recording before generating a report.");
            } else if orchestrator.job_id().is_none() {
                eprintln!("No active job: record, upload or select one first.");
            } else if orchestrator.generation().active {
                eprintln!("A report is already being generated.");
            } else {
                orchestrator.generate_report();
            }
        }
        SessionCommand::Select(job_id) => {
            if !orchestrator.select_job(job_id) {
                eprintln!("Stop the recording before switching jobs.");
            }
        }
        SessionCommand::List => {
            if let Some(recordings) = orchestrator.refresh_recordings().await {
                println!("{}", format_recordings(&recordings));
            }
        }
        SessionCommand::Status => println!("{}", status_line(orchestrator)),
        SessionCommand::Help => println!("{HELP}"),
        SessionCommand::Quit => return false,
        SessionCommand::Empty => {}
        SessionCommand::Invalid(message) => eprintln!("{message}"),
    }
    true
}

fn status_line(orchestrator: &ReportOrchestrator<TerminalPresenter>) -> String {
    let mut status = format!(
        "state: {}, job: {}",
        orchestrator.activity().as_str(),
        orchestrator
            .job_id()
            .map(|id| id.as_str())
            .unwrap_or("none")
    );
    if orchestrator.upload().in_progress {
        status.push_str(&format!(", upload: {}%", orchestrator.upload().percent));
    }
    let generation = orchestrator.generation();
    if generation.active {
        status.push_str(&format!(
            ", report: {} {}%",
            generation.step_label(),
            generation.percent
        ));
    }
    if let Some(error) = orchestrator.last_error() {
        status.push_str(&format!(", last error: {error}"));
    }
    status
}
