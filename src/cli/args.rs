use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "btp-meetings")]
#[command(about = "Record meetings and generate reports from the terminal", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Backend base URL (overrides the config file and BTP_MEETINGS_SERVER)
    #[arg(long, global = true)]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Exchange an access code for a session token
    Login(LoginCliArgs),
    /// Forget the stored session token
    Logout,
    /// Print version information
    Version,
    /// List recordings known to the backend
    Recordings,
    /// Record a live meeting until Enter or Ctrl-C
    Record(RecordCliArgs),
    /// Upload an audio file as a new recording
    Upload(UploadCliArgs),
    /// Generate and download the report for an existing recording
    Generate(GenerateCliArgs),
    /// Interactive session driving recording, upload and reports
    Session,
}

#[derive(ClapArgs, Debug)]
pub struct LoginCliArgs {
    /// Access code; prompted for when omitted
    #[arg(long)]
    pub code: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct RecordCliArgs {
    /// Generate the report once the recording is stopped
    #[arg(long)]
    pub generate: bool,
}

#[derive(ClapArgs, Debug)]
pub struct UploadCliArgs {
    /// Audio file to upload
    pub file: PathBuf,
    /// Generate the report once the upload finishes
    #[arg(long)]
    pub generate: bool,
}

#[derive(ClapArgs, Debug)]
pub struct GenerateCliArgs {
    /// Recording id, as shown by `recordings`
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_upload_with_generate() {
        let cli = Cli::try_parse_from([
            "btp-meetings",
            "--server",
            "http://10.0.0.2:8000",
            "upload",
            "meeting.wav",
            "--generate",
        ])
        .unwrap();

        assert_eq!(cli.server.as_deref(), Some("http://10.0.0.2:8000"));
        match cli.command {
            CliCommand::Upload(args) => {
                assert_eq!(args.file, PathBuf::from("meeting.wav"));
                assert!(args.generate);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::try_parse_from(["btp-meetings", "generate", "R1", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, CliCommand::Generate(ref args) if args.id == "R1"));
    }

    #[test]
    fn test_command_is_required() {
        assert!(Cli::try_parse_from(["btp-meetings"]).is_err());
    }
}
