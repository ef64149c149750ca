//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use std::process::ExitCode;

fn main() -> ExitCode {
    fetchsink_cli::init_logging();
    match fetchsink_cli::run() {
        Ok(outcome) => outcome.exit_code(),
        Err(err) => {
            eprintln!("fetchsink: {err}");
            err.exit_code()
        }
    }
}
