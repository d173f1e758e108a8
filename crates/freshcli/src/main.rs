//! Freshcli.
//!
//! Watches a JSON document through a refresh-ahead cache. The document is reloaded in the
//! background on a fixed schedule, and the value at a JSON pointer is printed at a fixed interval.

#![warn(
    missing_docs,
    missing_debug_implementations,
    unused_crate_dependencies,
    clippy::all
)]

mod cli;
mod config;
mod logging;
mod watch;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::report_error(&error);
            std::process::exit(1);
        }
    }
}
