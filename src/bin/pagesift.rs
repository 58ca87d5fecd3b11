//! pagesift CLI binary.

use std::io::Write;
use std::process;

use clap::Parser;
use env_logger::Builder;

use pagesift::cli::args::*;
use pagesift::cli::commands::*;

fn main() {
    let args = PageSiftArgs::parse();

    Builder::new()
        .filter_level(args.log_level())
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();

    if let Err(e) = execute_command(args) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
