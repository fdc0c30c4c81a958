//! notpx - command-line entry point of the notpixel repaint bot

use std::process::ExitCode;

use notpixel::cli;

fn main() -> ExitCode {
    cli::run()
}
