use anyhow::Result;
use btp_meetings::{
    cli::{
        handle_generate_command, handle_login_command, handle_logout_command,
        handle_record_command, handle_recordings_command, handle_session_command,
        handle_upload_command, Cli, CliCommand,
    },
    config::Config,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        CliCommand::Version => {
            println!("btp-meetings {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        CliCommand::Logout => return handle_logout_command(),
        _ => {}
    }

    let mut config = Config::load()?;
    config.apply_server_override(cli.server.as_deref());

    match cli.command {
        CliCommand::Login(args) => handle_login_command(&config, args).await,
        CliCommand::Recordings => handle_recordings_command(&config).await,
        CliCommand::Record(args) => handle_record_command(&config, args).await,
        CliCommand::Upload(args) => handle_upload_command(&config, args).await,
        CliCommand::Generate(args) => handle_generate_command(&config, args).await,
        CliCommand::Session => handle_session_command(&config).await,
        CliCommand::Version | CliCommand::Logout => Ok(()),
    }
}
