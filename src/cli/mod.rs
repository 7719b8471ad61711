pub mod args;
pub mod sessions;

pub use args::{Cli, CliCommand, JoinCliArgs, SessionsCliArgs};
pub use sessions::handle_sessions_command;
