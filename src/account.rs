//! One account's turn within a cycle.

use crate::analyze::QuantizedImage;
use crate::api::GameApi;
use crate::executor::{DrainReport, DrainSettings, RepaintError, RepaintExecutor};
use crate::ledger::RepaintLedger;
use crate::palette::Palette;
use crate::profiles::Profile;
use crate::session::{AccountSession, CallError, SessionProvider};
use thiserror::Error;

/// Error that ends an account's turn early
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AccountError {
    #[error("failed to connect: {0}")]
    Connect(#[source] crate::api::ApiError),
    #[error(transparent)]
    Call(#[from] CallError),
    #[error(transparent)]
    Repaint(#[from] RepaintError),
}

impl AccountError {
    pub fn kind(&self) -> &'static str {
        match self {
            AccountError::Connect(_) => "connect",
            AccountError::Call(e) => e.kind(),
            AccountError::Repaint(RepaintError::Template(e)) => e.kind(),
            AccountError::Repaint(RepaintError::Plan(_)) => "plan",
            AccountError::Repaint(RepaintError::Ledger(_)) => "ledger",
        }
    }

    /// HTTP status behind the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            AccountError::Connect(e) => e.status(),
            AccountError::Call(e) | AccountError::Repaint(RepaintError::Template(e)) => e.status(),
            AccountError::Repaint(_) => None,
        }
    }
}

/// Reference image and color subset shared by every account in a cycle.
#[derive(Debug, Clone)]
pub struct Artwork {
    pub image: QuantizedImage,
    pub allowed: Palette,
}

/// What each account does during its turn.
#[derive(Debug, Clone)]
pub struct AccountSettings {
    pub claim_rewards: bool,
    pub drain: DrainSettings,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self { claim_rewards: true, drain: DrainSettings::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountReport {
    pub user: String,
    pub balance: f64,
    pub charges: u32,
    pub claimed: Option<f64>,
    pub drain: Option<DrainReport>,
}

/// Identify the account, optionally claim rewards, then repaint if `artwork`
/// is given.
pub async fn process_account<A: GameApi, S: SessionProvider>(
    api: &A,
    sessions: &S,
    profile: &Profile,
    ledger: &RepaintLedger,
    artwork: Option<&Artwork>,
    settings: &AccountSettings,
) -> Result<AccountReport, AccountError> {
    let mut session = AccountSession::open(sessions, profile).await?;

    let user = session.call(move |token| async move { api.me(&token).await }).await?;
    let mut report = AccountReport { user: user.display_name(), ..Default::default() };
    tracing::info!(user = %report.user, "logged in");

    if settings.claim_rewards {
        match session.call(move |token| async move { api.claim(&token).await }).await {
            Ok(claim) => {
                tracing::info!(claimed = claim.claimed, "rewards claimed");
                report.claimed = Some(claim.claimed);
            }
            Err(e) => tracing::warn!(kind = e.kind(), error = %e, "failed to claim rewards"),
        }
    }

    let status = session.call(move |token| async move { api.mining_status(&token).await }).await?;
    report.balance = status.user_balance;
    report.charges = status.charges;
    tracing::info!(balance = status.user_balance, charges = status.charges, "account status");

    if let Some(artwork) = artwork {
        let mut executor = RepaintExecutor::new(api, ledger, settings.drain.clone());
        let drain = executor.run(&mut session, &artwork.image, &artwork.allowed, &status).await?;
        if let Some(balance) = drain.last_balance {
            report.balance = balance;
        }
        report.drain = Some(drain);
    }

    Ok(report)
}
