use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "attendant")]
#[command(about = "Meeting and call attendant for a remotely controlled browser", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Join a meeting, record it, and process the recording
    Join(JoinCliArgs),
    /// Watch WhatsApp Web for incoming calls and answer them
    Watch,
    /// List and inspect past session records
    Sessions(SessionsCliArgs),
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug)]
pub struct JoinCliArgs {
    /// Meeting URL (Google Meet or Zoom), or a bare Zoom meeting number
    pub target: String,
    /// Label for the session record and recording filename
    #[arg(short, long)]
    pub label: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct SessionsCliArgs {
    /// Maximum number of records to show
    #[arg(short, long, default_value = "20")]
    pub limit: usize,
    /// Show the full record (including transcript) for one session
    #[arg(long)]
    pub id: Option<i64>,
}
