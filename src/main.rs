#![forbid(unsafe_code)]

//! fis — File Integrity Sentry CLI entry point.

use clap::Parser;

mod cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    if let Err(e) = cli_app::run(&args) {
        eprintln!("fis: {e}");
        std::process::exit(2);
    }
}
