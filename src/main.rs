//! merge2pdf CLI
//!
//! Merges images and PDFs into one PDF, extracts embedded images, or runs the
//! dated batch merge.

use merge_to_pdf::cli;
use std::ffi::OsString;

fn main() {
    let args: Vec<OsString> = std::env::args_os().skip(1).collect();
    let verbose = args.iter().any(|a| a == "--verbose");

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if verbose { "debug" } else { "info" }),
    )
    .format_timestamp(None)
    .init();

    std::process::exit(cli::run(args).code());
}
