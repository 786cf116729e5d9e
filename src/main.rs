//! regatta-replication CLI entry point
//!
//! Parses nothing itself: argument handling, dispatch and output live in
//! the CLI module. Errors are printed to stderr with a non-zero exit.

use regatta_replication::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
