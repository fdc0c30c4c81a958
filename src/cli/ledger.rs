//! The `ledger` command

use clap::Subcommand;
use std::process::ExitCode;

use crate::config::BotConfig;
use crate::ledger::{LedgerError, RepaintLedger};

use super::{runtime, EXIT_ERROR, EXIT_SUCCESS};

#[derive(Subcommand)]
pub enum LedgerAction {
    /// Print the cells painted in the current cycle
    Show,
    /// Forget all painted cells
    Reset,
}

/// Execute the ledger command
pub fn run_ledger(config: &BotConfig, action: LedgerAction) -> ExitCode {
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(code) => return code,
    };
    let ledger = RepaintLedger::new(&config.files.ledger);

    let result = match action {
        LedgerAction::Show => rt.block_on(show(&ledger)),
        LedgerAction::Reset => rt.block_on(ledger.reset()).map(|()| {
            println!("Cleared {}", ledger.path().display());
        }),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

async fn show(ledger: &RepaintLedger) -> Result<(), LedgerError> {
    let cells = ledger.load().await?;
    println!("{}: {} painted cells", ledger.path().display(), cells.len());
    for cell in cells.keys() {
        println!("  {}", cell);
    }
    Ok(())
}
