//! The `run` command

use std::process::ExitCode;

use crate::api::HttpConnector;
use crate::config::BotConfig;
use crate::cycle::Bot;
use crate::session::FileSessionProvider;

use super::{runtime, EXIT_ERROR, EXIT_SUCCESS};

/// Execute the run command
pub fn run_bot(config: BotConfig, once: bool) -> ExitCode {
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(code) => return code,
    };

    let connector = HttpConnector::new(config.http_options());
    let sessions = FileSessionProvider::new(&config.files.sessions)
        .with_renew_command(config.session.renew_command.clone());
    let bot = Bot::new(config, connector, sessions);

    match rt.block_on(bot.run(once)) {
        Ok(report) => {
            println!(
                "{} accounts: {} ok, {} failed, {} pixels painted",
                report.accounts, report.succeeded, report.failed, report.painted
            );
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
