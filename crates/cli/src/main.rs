use std::process::ExitCode;

fn main() -> ExitCode {
    replyq_cli::run()
}
