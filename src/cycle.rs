//! The outer loop.
//!
//! Each cycle resets the ledger, prepares the shared artwork, runs every
//! account under the configured concurrency bound and reports. Only shared
//! setup can abort a cycle; per-account failures are logged and counted.
//!
//! Shared setup reads files and decodes the reference image, so it runs on
//! the blocking pool before any account starts.

use crate::account::{process_account, AccountError, AccountReport, AccountSettings, Artwork};
use crate::analyze::{AnalyzeError, ImageAnalyzer};
use crate::api::Connector;
use crate::config::BotConfig;
use crate::ledger::{LedgerError, RepaintLedger};
use crate::palette::{Palette, PaletteError};
use crate::profiles::{load_profiles, Profile, ProfileError};
use crate::schedule::run_bounded;
use crate::session::SessionProvider;
use thiserror::Error;
use tracing::Instrument;

/// Failure of shared setup
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CycleError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Analyze(#[from] AnalyzeError),
    #[error("invalid allowed colors: {0}")]
    AllowedColors(#[source] PaletteError),
    #[error(transparent)]
    Profiles(#[from] ProfileError),
    #[error("cycle setup task failed: {0}")]
    Setup(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub accounts: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub painted: u32,
}

/// Runs cycles over every configured account.
pub struct Bot<C, S> {
    config: BotConfig,
    connector: C,
    sessions: S,
    ledger: RepaintLedger,
    settings: AccountSettings,
}

impl<C: Connector, S: SessionProvider> Bot<C, S> {
    pub fn new(config: BotConfig, connector: C, sessions: S) -> Self {
        let ledger = RepaintLedger::new(&config.files.ledger);
        let settings = config.account_settings();
        Self { config, connector, sessions, ledger, settings }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn ledger(&self) -> &RepaintLedger {
        &self.ledger
    }

    /// Run one cycle over all profiles.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        self.ledger.reset().await?;
        let config = self.config.clone();
        let span = tracing::Span::current();
        let (artwork, profiles) = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let artwork = prepare_artwork(&config)?;
            let profiles = load_profiles(&config.files.profiles)?;
            Ok::<_, CycleError>((artwork, profiles))
        })
        .await??;
        tracing::info!(accounts = profiles.len(), "starting cycle");

        let artwork = artwork.as_ref();
        let results = run_bounded(
            profiles,
            self.config.schedule.concurrency,
            self.config.schedule.mode,
            move |index, profile| self.run_account(index, profile, artwork),
        )
        .await;

        let mut report = CycleReport { accounts: results.len(), ..Default::default() };
        for result in &results {
            match result {
                Ok(account) => {
                    report.succeeded += 1;
                    report.painted += account.drain.as_ref().map_or(0, |d| d.painted);
                }
                Err(_) => report.failed += 1,
            }
        }
        tracing::info!(
            accounts = report.accounts,
            succeeded = report.succeeded,
            failed = report.failed,
            painted = report.painted,
            "cycle finished"
        );
        Ok(report)
    }

    async fn run_account(
        &self,
        index: usize,
        profile: Profile,
        artwork: Option<&Artwork>,
    ) -> Result<AccountReport, AccountError> {
        let span = tracing::info_span!("account", index = index + 1, name = %profile.name);
        async move {
            let result = match self.connector.connect(&profile) {
                Ok(api) => {
                    process_account(&api, &self.sessions, &profile, &self.ledger, artwork, &self.settings)
                        .await
                }
                Err(e) => Err(AccountError::Connect(e)),
            };
            match &result {
                Ok(report) => tracing::info!(user = %report.user, balance = report.balance, "account done"),
                Err(e) => tracing::error!(kind = e.kind(), status = ?e.status(), error = %e, "account failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Run cycles, sleeping between them. With `once`, return after the first.
    pub async fn run(&self, once: bool) -> Result<CycleReport, CycleError> {
        let interval = self.config.cycle_interval();
        loop {
            let result = self.run_cycle().await;
            if once {
                return result;
            }
            if let Err(e) = &result {
                tracing::error!(error = %e, "cycle aborted");
            }
            tracing::info!(seconds = interval.as_secs(), "waiting for next cycle");
            tokio::time::sleep(interval).await;
        }
    }
}

/// Analyze the reference image and pick the paintable colors.
///
/// `None` when repainting is disabled.
fn prepare_artwork(config: &BotConfig) -> Result<Option<Artwork>, CycleError> {
    if !config.repaint.enabled {
        return Ok(None);
    }
    let files = &config.files;
    let analyzer = ImageAnalyzer::from_palette_file(&files.palette)?.with_checkpoints(config.checkpoints());
    let analysis = analyzer.analyze_file(&files.image)?;
    analysis.log_summary();

    let allowed = match config.allowed_colors() {
        Some(colors) => {
            for color in colors.iter().filter(|c| !analyzer.palette().contains(**c)) {
                tracing::warn!(%color, "allowed color is not in the palette and will never be painted");
            }
            Palette::new(colors).map_err(CycleError::AllowedColors)?
        }
        None => analyzer.palette().clone(),
    };
    Ok(Some(Artwork { image: analysis.image, allowed }))
}
