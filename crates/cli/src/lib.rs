pub mod commands;
pub mod poller;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "replyq",
    about = "Replyq operator CLI",
    long_about = "Poll the remote helpdesk for unanswered client messages, generate reply drafts, and send approved drafts.",
    after_help = "Examples:\n  replyq migrate\n  replyq poll --hours 24\n  replyq poll --dry-run\n  replyq send"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Run one poll pass: find unanswered client messages and draft replies")]
    Poll {
        #[arg(long, help = "Only consider items with activity in the last N hours")]
        hours: Option<u32>,
        #[arg(long, help = "Generate drafts without persisting anything")]
        dry_run: bool,
        #[arg(long, help = "Send approved drafts instead of polling")]
        send: bool,
    },
    #[command(about = "Send all approved drafts without polling")]
    Send,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Poll { hours, dry_run, send } => commands::poll::run(hours, dry_run, send),
        Command::Send => commands::poll::run_send_only(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
