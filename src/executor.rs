//! Repaint execution.
//!
//! Spends an account's paint charges on a plan, one cell at a time:
//!
//! 1. **Planning**: fetch the template geometry and build the plan.
//! 2. **Special phase** (optional): spend one-shot special items on the head
//!    of the plan.
//! 3. **Draining**: take up to `charges` unpainted instructions, shuffle them
//!    and paint them sequentially with a fixed delay between calls.
//! 4. **Replenishing**: when charges run out while cells remain, re-query the
//!    account status (if enabled) and keep draining.
//!
//! The ledger is checked before every call and marked after every confirmed
//! paint, so a cell is never submitted again within a cycle once marked.

use crate::analyze::QuantizedImage;
use crate::api::{GameApi, MiningStatus, SpecialRequest};
use crate::ledger::{LedgerError, RepaintLedger};
use crate::palette::Palette;
use crate::plan::{plan, PaintInstruction, PlanError};
use crate::session::{AccountSession, CallError, SessionProvider};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::Duration;
use thiserror::Error;

/// Shop item kind of the area-clearing special action.
pub const DEFAULT_SPECIAL_KIND: u32 = 7;

/// Error that stops repainting for an account
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RepaintError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("failed to fetch template: {0}")]
    Template(#[source] CallError),
}

/// Tuning of the drain loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainSettings {
    /// Pause after every remote paint attempt
    pub paint_delay: Duration,
    /// Re-query charges when they run out while cells remain
    pub refresh_charges: bool,
    /// Consecutive passes without a successful paint before giving up
    pub max_stalled_passes: u32,
    /// Special item kind to spend first; `None` skips the special phase
    pub special_kind: Option<u32>,
    pub row_stride: u64,
}

impl Default for DrainSettings {
    fn default() -> Self {
        Self {
            paint_delay: Duration::from_secs(3),
            refresh_charges: true,
            max_stalled_passes: 3,
            special_kind: Some(DEFAULT_SPECIAL_KIND),
            row_stride: crate::plan::DEFAULT_ROW_STRIDE,
        }
    }
}

/// Why a drain finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainOutcome {
    /// No charges left (and none granted on refresh)
    #[default]
    ChargesExhausted,
    /// Every planned cell is painted
    PlanComplete,
    /// Too many passes without progress
    Stalled,
    /// The session expired and could not be renewed
    SessionLost,
}

/// Summary of one account's repaint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    pub planned: usize,
    pub painted: u32,
    pub skipped: u32,
    pub failed: u32,
    pub special_used: u32,
    pub charges_left: u32,
    pub last_balance: Option<f64>,
    pub outcome: DrainOutcome,
}

enum Attempt {
    Painted(f64),
    AlreadyPainted,
    Failed,
    SessionLost,
}

enum Phase {
    Draining,
    Replenishing,
    Done(DrainOutcome),
}

/// Drives repainting for one account.
pub struct RepaintExecutor<'a, A> {
    api: &'a A,
    ledger: &'a RepaintLedger,
    settings: DrainSettings,
    rng: StdRng,
}

impl<'a, A: GameApi> RepaintExecutor<'a, A> {
    pub fn new(api: &'a A, ledger: &'a RepaintLedger, settings: DrainSettings) -> Self {
        Self { api, ledger, settings, rng: StdRng::from_os_rng() }
    }

    /// Use a fixed shuffle seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Plan against the current template and drain the account's charges.
    pub async fn run<S: SessionProvider>(
        &mut self,
        session: &mut AccountSession<'_, S>,
        image: &QuantizedImage,
        allowed: &Palette,
        status: &MiningStatus,
    ) -> Result<DrainReport, RepaintError> {
        let specials = self.settings.special_kind.map(|kind| status.goods_count(kind)).unwrap_or(0);
        if status.charges == 0 && specials == 0 {
            tracing::info!("no charges available, skipping repaint");
            return Ok(DrainReport::default());
        }

        let api = self.api;
        let template = session
            .call(move |token| async move { api.template(&token).await })
            .await
            .map_err(RepaintError::Template)?;
        let geometry = template.geometry();
        tracing::info!(
            id = ?template.id,
            x = geometry.origin_x,
            y = geometry.origin_y,
            size = geometry.width,
            "template fetched"
        );

        let instructions = plan(image, &geometry, allowed, self.settings.row_stride)?;
        self.ledger.load().await?;

        let special_used = match self.settings.special_kind {
            Some(kind) if specials > 0 => self.special_phase(session, &instructions, specials, kind).await,
            _ => 0,
        };
        if session.is_lost() {
            tracing::warn!("session lost during special phase, skipping repaint");
            return Ok(DrainReport {
                planned: instructions.len(),
                special_used,
                charges_left: status.charges,
                outcome: DrainOutcome::SessionLost,
                ..Default::default()
            });
        }

        let mut report = self.drain(session, &instructions, status.charges).await;
        report.special_used = special_used;
        Ok(report)
    }

    /// Spend up to `available` special items on the head of the plan.
    async fn special_phase<S: SessionProvider>(
        &mut self,
        session: &mut AccountSession<'_, S>,
        instructions: &[PaintInstruction],
        available: u32,
        kind: u32,
    ) -> u32 {
        tracing::info!(available, kind, "using special items");
        let api = self.api;
        let mut used = 0;
        for instruction in instructions {
            if used >= available {
                break;
            }
            let request = SpecialRequest { cell: instruction.cell, kind };
            match session.call(move |token| async move { api.special(&token, request).await }).await {
                Ok(()) => {
                    used += 1;
                    tracing::info!(cell = instruction.cell, "special action applied");
                }
                Err(e) => tracing::warn!(
                    cell = instruction.cell,
                    kind = e.kind(),
                    status = ?e.status(),
                    error = %e,
                    "special action failed"
                ),
            }
            tokio::time::sleep(self.settings.paint_delay).await;
            if session.is_lost() {
                break;
            }
        }
        used
    }

    /// Paint unpainted cells of `instructions` until charges or cells run out.
    pub async fn drain<S: SessionProvider>(
        &mut self,
        session: &mut AccountSession<'_, S>,
        instructions: &[PaintInstruction],
        charges: u32,
    ) -> DrainReport {
        let mut charges = charges;
        let mut report = DrainReport { planned: instructions.len(), ..Default::default() };
        let mut stalled = 0;
        let mut phase = Phase::Draining;

        let outcome = loop {
            phase = match phase {
                Phase::Done(outcome) => break outcome,
                Phase::Draining if charges == 0 => Phase::Replenishing,
                Phase::Draining => {
                    let mut batch = self.ledger.unpainted(instructions).await;
                    if batch.is_empty() {
                        Phase::Done(DrainOutcome::PlanComplete)
                    } else {
                        batch.truncate(charges as usize);
                        batch.shuffle(&mut self.rng);
                        tracing::info!(cells = batch.len(), charges, "painting batch");

                        let painted_before = report.painted;
                        let mut lost = false;
                        for instruction in batch {
                            match self.attempt(session, instruction).await {
                                Attempt::Painted(balance) => {
                                    charges -= 1;
                                    report.painted += 1;
                                    report.last_balance = Some(balance);
                                }
                                Attempt::AlreadyPainted => report.skipped += 1,
                                Attempt::Failed => report.failed += 1,
                                Attempt::SessionLost => {
                                    report.failed += 1;
                                    lost = true;
                                    break;
                                }
                            }
                            if charges == 0 {
                                break;
                            }
                        }

                        if report.painted == painted_before {
                            stalled += 1;
                            tracing::warn!(stalled, "pass made no progress");
                        } else {
                            stalled = 0;
                        }
                        if lost {
                            tracing::warn!("session could not be renewed, ending repaint");
                            Phase::Done(DrainOutcome::SessionLost)
                        } else if stalled >= self.settings.max_stalled_passes {
                            Phase::Done(DrainOutcome::Stalled)
                        } else {
                            Phase::Draining
                        }
                    }
                }
                Phase::Replenishing => self.replenish(session, instructions, &mut charges).await,
            };
        };

        report.charges_left = charges;
        report.outcome = outcome;
        tracing::info!(
            painted = report.painted,
            failed = report.failed,
            skipped = report.skipped,
            charges_left = charges,
            outcome = ?outcome,
            "repaint finished"
        );
        report
    }

    async fn replenish<S: SessionProvider>(
        &mut self,
        session: &mut AccountSession<'_, S>,
        instructions: &[PaintInstruction],
        charges: &mut u32,
    ) -> Phase {
        if self.ledger.unpainted(instructions).await.is_empty() {
            return Phase::Done(DrainOutcome::PlanComplete);
        }
        if !self.settings.refresh_charges {
            return Phase::Done(DrainOutcome::ChargesExhausted);
        }

        let api = self.api;
        match session.call(move |token| async move { api.mining_status(&token).await }).await {
            Ok(status) if status.charges > 0 => {
                tracing::info!(charges = status.charges, "charges replenished");
                *charges = status.charges;
                Phase::Draining
            }
            Ok(_) => Phase::Done(DrainOutcome::ChargesExhausted),
            Err(e @ CallError::RenewalFailed { .. }) => {
                tracing::warn!(error = %e, "session could not be renewed, ending repaint");
                Phase::Done(DrainOutcome::SessionLost)
            }
            Err(e) => {
                tracing::warn!(kind = e.kind(), error = %e, "failed to refresh charges");
                Phase::Done(DrainOutcome::ChargesExhausted)
            }
        }
    }

    async fn attempt<S: SessionProvider>(
        &mut self,
        session: &mut AccountSession<'_, S>,
        instruction: PaintInstruction,
    ) -> Attempt {
        if self.ledger.is_painted(instruction.cell).await {
            tracing::debug!(cell = instruction.cell, "already painted, skipping");
            return Attempt::AlreadyPainted;
        }

        let api = self.api;
        let result =
            session.call(move |token| async move { api.repaint(&token, instruction).await }).await;
        let attempt = match result {
            Ok(response) => {
                if let Err(e) = self.ledger.mark_painted(instruction.cell).await {
                    tracing::error!(
                        cell = instruction.cell,
                        error = %e,
                        "painted cell could not be persisted; it may be painted again after a restart"
                    );
                }
                tracing::info!(
                    cell = instruction.cell,
                    color = %instruction.color,
                    balance = response.balance,
                    "pixel painted"
                );
                Attempt::Painted(response.balance)
            }
            Err(e @ CallError::RenewalFailed { .. }) => {
                tracing::warn!(cell = instruction.cell, error = %e, "repaint abandoned");
                Attempt::SessionLost
            }
            Err(e) => {
                tracing::warn!(
                    cell = instruction.cell,
                    kind = e.kind(),
                    status = ?e.status(),
                    error = %e,
                    "repaint failed"
                );
                Attempt::Failed
            }
        };
        tokio::time::sleep(self.settings.paint_delay).await;
        attempt
    }
}
