use anyhow::Result;
use attendant::{
    app,
    cli::{handle_sessions_command, Cli, CliCommand},
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        CliCommand::Version => {
            println!("attendant {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliCommand::Sessions(args) => handle_sessions_command(args),
        CliCommand::Join(args) => app::run_join(args).await,
        CliCommand::Watch => app::run_watch().await,
    }
}
