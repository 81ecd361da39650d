//! Command handlers. Every backend command goes through the login gate and
//! drives a [`ReportOrchestrator`] with a [`TerminalPresenter`].

pub mod args;
pub mod presenter;
pub mod session;

use anyhow::{bail, Result};
use dialoguer::Password;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::auth::{self, TokenStore};
use crate::client::{mime_type_for_extension, AuthError, BackendClient, JobId};
use crate::config::Config;
use crate::report::{HttpBackend, ReportOrchestrator};

pub use args::{Cli, CliCommand, GenerateCliArgs, LoginCliArgs, RecordCliArgs, UploadCliArgs};
pub use presenter::{format_recordings, TerminalPresenter};
pub use session::run_session;

type TerminalOrchestrator = ReportOrchestrator<TerminalPresenter>;

pub async fn handle_login_command(config: &Config, args: LoginCliArgs) -> Result<()> {
    let code = match args.code {
        Some(code) => code,
        None => Password::new().with_prompt("Access code").interact()?,
    };

    let client = BackendClient::new(&config.server)?;
    let store = TokenStore::default_location()?;

    match auth::login(&client, &store, &code).await {
        Ok(token) => {
            match token.expires_at() {
                Some(exp) => println!("Logged in, access valid until {}", exp.to_rfc3339()),
                None => println!("Logged in"),
            }
            Ok(())
        }
        Err(e) => match e.downcast_ref::<AuthError>() {
            Some(AuthError::Rejected { message, .. }) => {
                debug!("Backend rejected access code: {}", message);
                bail!("Code invalide ou expiré")
            }
            _ => Err(e),
        },
    }
}

pub fn handle_logout_command() -> Result<()> {
    let store = TokenStore::default_location()?;
    if store.clear()? {
        println!("Logged out");
    } else {
        println!("No stored session");
    }
    Ok(())
}

pub async fn handle_recordings_command(config: &Config) -> Result<()> {
    let mut orchestrator = connect(config)?;
    match orchestrator.refresh_recordings().await {
        Some(recordings) => {
            println!("{}", format_recordings(&recordings));
            Ok(())
        }
        None => bail!("Could not list recordings"),
    }
}

pub async fn handle_record_command(config: &Config, args: RecordCliArgs) -> Result<()> {
    let mut orchestrator = connect(config)?;

    orchestrator.toggle_recording().await;
    if !orchestrator.recording().active {
        bail!("Recording did not start");
    }

    println!("Press Enter or Ctrl-C to stop.");
    wait_for_stop().await?;

    orchestrator.toggle_recording().await;
    if orchestrator.recording().active {
        bail!("The backend is still recording, run `record` again to retry stopping it");
    }

    if args.generate {
        generate_and_wait(&mut orchestrator).await?;
    }
    Ok(())
}

pub async fn handle_upload_command(config: &Config, args: UploadCliArgs) -> Result<()> {
    validate_upload_file(&args.file)?;
    let mut orchestrator = connect(config)?;

    orchestrator.upload_file(args.file.clone());
    settle(&mut orchestrator).await?;

    let Some(job_id) = orchestrator.job_id() else {
        bail!("Upload of {} failed", args.file.display());
    };
    println!("Uploaded {} as {}", args.file.display(), job_id);

    if args.generate {
        generate_and_wait(&mut orchestrator).await?;
    }
    Ok(())
}

pub async fn handle_generate_command(config: &Config, args: GenerateCliArgs) -> Result<()> {
    let mut orchestrator = connect(config)?;
    orchestrator.select_job(JobId::new(args.id.trim()));
    generate_and_wait(&mut orchestrator).await
}

pub async fn handle_session_command(config: &Config) -> Result<()> {
    let mut orchestrator = connect(config)?;
    run_session(&mut orchestrator).await
}

/// Reject paths that cannot be uploaded before any network traffic.
pub(crate) fn validate_upload_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        bail!("File not found: {}", path.display());
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    if mime_type_for_extension(&ext).is_none() {
        warn!(
            "Unrecognised audio extension for {}, sending as application/octet-stream",
            path.display()
        );
    }
    Ok(())
}

fn connect(config: &Config) -> Result<TerminalOrchestrator> {
    let store = TokenStore::default_location()?;
    let token = store.require_valid()?;

    let client = BackendClient::new(&config.server)?.with_token(token.token);
    let backend = HttpBackend::new(client, config.reports.resolve_download_dir()?);
    debug!(
        "Using backend {} with reports saved to {:?}",
        backend.client().base_url(),
        backend.download_dir()
    );

    Ok(ReportOrchestrator::new(
        Arc::new(backend),
        TerminalPresenter::new(),
    ))
}

/// Open the report stream for the active job and wait for the download.
async fn generate_and_wait(orchestrator: &mut TerminalOrchestrator) -> Result<()> {
    let saved_before = orchestrator.presenter().saved_reports().len();
    orchestrator.presenter_mut().reset_failure();

    orchestrator.generate_report();
    if !orchestrator.generation().active {
        bail!("No recording selected for report generation");
    }
    settle(orchestrator).await?;

    if orchestrator.presenter().saved_reports().len() > saved_before {
        return Ok(());
    }
    if orchestrator.presenter().failed() {
        bail!("Report generation failed");
    }
    bail!("Report stream ended before the report was ready")
}

/// Pump orchestrator events until nothing is in flight, or until Ctrl-C.
async fn settle(orchestrator: &mut TerminalOrchestrator) -> Result<()> {
    let interrupted = tokio::select! {
        _ = orchestrator.run_until_settled() => false,
        result = tokio::signal::ctrl_c() => {
            result?;
            true
        }
    };

    if interrupted {
        info!("Interrupted, closing open transfers");
        orchestrator.shutdown();
        bail!("Interrupted");
    }
    Ok(())
}

async fn wait_for_stop() -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    tokio::select! {
        line = lines.next_line() => {
            if line?.is_none() {
                debug!("Stdin closed, waiting for Ctrl-C");
                tokio::signal::ctrl_c().await?;
            }
        }
        result = tokio::signal::ctrl_c() => result?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_upload_file() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("meeting.wav");
        std::fs::write(&audio, b"RIFF").unwrap();
        assert!(validate_upload_file(&audio).is_ok());

        let unknown = dir.path().join("notes.bin");
        std::fs::write(&unknown, b"data").unwrap();
        assert!(validate_upload_file(&unknown).is_ok());

        assert!(validate_upload_file(&dir.path().join("missing.wav")).is_err());
        assert!(validate_upload_file(dir.path()).is_err());
    }
}
