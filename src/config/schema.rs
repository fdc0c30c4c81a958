//! Configuration schema types for `notpixel.toml`
//!
//! Defines the structure and validation rules for the bot configuration.

use crate::account::AccountSettings;
use crate::analyze::Checkpoint;
use crate::api::{HttpOptions, RetryPolicy, DEFAULT_BASE_URL, MY_TEMPLATE_ENDPOINT};
use crate::color::{parse_color, PaletteColor};
use crate::executor::{DrainSettings, DEFAULT_SPECIAL_KIND};
use crate::ledger::LEDGER_FILENAME;
use crate::plan::DEFAULT_ROW_STRIDE;
use crate::profiles::PROFILES_FILENAME;
use crate::schedule::ScheduleMode;
use crate::session::SESSIONS_FILENAME;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Remote API section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Retries of transient failures
    pub retries: u32,
    /// Linear backoff step between retries
    pub retry_delay_ms: u64,
    /// Template endpoint, relative to `base_url` or absolute
    pub template_endpoint: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            retries: 3,
            retry_delay_ms: 1000,
            template_endpoint: MY_TEMPLATE_ENDPOINT.to_string(),
        }
    }
}

/// Input and state files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    pub profiles: PathBuf,
    pub sessions: PathBuf,
    /// One `#RRGGBB` per line
    pub palette: PathBuf,
    /// Reference image
    pub image: PathBuf,
    pub ledger: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            profiles: PathBuf::from(PROFILES_FILENAME),
            sessions: PathBuf::from(SESSIONS_FILENAME),
            palette: PathBuf::from("mau.txt"),
            image: PathBuf::from("image.png"),
            ledger: PathBuf::from(LEDGER_FILENAME),
        }
    }
}

/// Advisory pixel check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Row-major pixel index in the reference image
    pub index: usize,
    pub color: String,
}

/// Repaint section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepaintConfig {
    pub enabled: bool,
    pub row_stride: u64,
    pub paint_delay_ms: u64,
    pub refresh_charges: bool,
    pub max_stalled_passes: u32,
    pub special_action: bool,
    pub special_kind: u32,
    /// Restrict painting to these colors (defaults to the whole palette)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_colors: Option<Vec<String>>,
    pub checkpoints: Vec<CheckpointConfig>,
}

impl Default for RepaintConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            row_stride: DEFAULT_ROW_STRIDE,
            paint_delay_ms: 3000,
            refresh_charges: true,
            max_stalled_passes: 3,
            special_action: true,
            special_kind: DEFAULT_SPECIAL_KIND,
            allowed_colors: None,
            checkpoints: Vec::new(),
        }
    }
}

/// Scheduling section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Accounts in flight at once
    pub concurrency: usize,
    pub mode: ScheduleMode,
    /// Pause between cycles
    pub cycle_interval_secs: u64,
    pub claim_rewards: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { concurrency: 10, mode: ScheduleMode::Batch, cycle_interval_secs: 600, claim_rewards: true }
    }
}

/// Session renewal section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Program and arguments; the profile name is appended
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renew_command: Option<Vec<String>>,
}

/// Complete notpixel.toml configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub repaint: RepaintConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "repaint.allowed_colors[2]")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notpixel.toml: '{}' {}", self.field, self.message)
    }
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigValidationError {
    ConfigValidationError { field: field.into(), message: message.into() }
}

impl BotConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.api.base_url.trim().is_empty() {
            errors.push(invalid("api.base_url", "must be a non-empty URL"));
        }
        if self.api.timeout_secs == 0 {
            errors.push(invalid("api.timeout_secs", "must be a positive integer"));
        }
        if self.repaint.row_stride == 0 {
            errors.push(invalid("repaint.row_stride", "must be a positive integer"));
        }
        if self.repaint.max_stalled_passes == 0 {
            errors.push(invalid("repaint.max_stalled_passes", "must be a positive integer"));
        }
        if self.schedule.concurrency == 0 {
            errors.push(invalid("schedule.concurrency", "must be a positive integer"));
        }

        if let Some(colors) = &self.repaint.allowed_colors {
            if colors.is_empty() {
                errors.push(invalid("repaint.allowed_colors", "must list at least one color"));
            }
            for (i, color) in colors.iter().enumerate() {
                if let Err(e) = parse_color(color) {
                    errors.push(invalid(format!("repaint.allowed_colors[{}]", i), e.to_string()));
                }
            }
        }
        for (i, checkpoint) in self.repaint.checkpoints.iter().enumerate() {
            if let Err(e) = parse_color(&checkpoint.color) {
                errors.push(invalid(format!("repaint.checkpoints[{}].color", i), e.to_string()));
            }
        }

        if let Some(argv) = &self.session.renew_command {
            if argv.first().map_or(true, |program| program.trim().is_empty()) {
                errors.push(invalid("session.renew_command", "must name a program"));
            }
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Parsed `allowed_colors`. Entries that fail to parse are skipped
    /// (`validate` reports them).
    pub fn allowed_colors(&self) -> Option<Vec<PaletteColor>> {
        self.repaint
            .allowed_colors
            .as_ref()
            .map(|colors| colors.iter().filter_map(|c| parse_color(c).ok()).collect())
    }

    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.repaint
            .checkpoints
            .iter()
            .filter_map(|c| parse_color(&c.color).ok().map(|expected| Checkpoint { index: c.index, expected }))
            .collect()
    }

    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            base_url: self.api.base_url.clone(),
            timeout: Duration::from_secs(self.api.timeout_secs),
            retry: RetryPolicy {
                retries: self.api.retries,
                base_delay: Duration::from_millis(self.api.retry_delay_ms),
            },
            template_endpoint: self.api.template_endpoint.clone(),
        }
    }

    pub fn drain_settings(&self) -> DrainSettings {
        DrainSettings {
            paint_delay: Duration::from_millis(self.repaint.paint_delay_ms),
            refresh_charges: self.repaint.refresh_charges,
            max_stalled_passes: self.repaint.max_stalled_passes,
            special_kind: self.repaint.special_action.then_some(self.repaint.special_kind),
            row_stride: self.repaint.row_stride,
        }
    }

    pub fn account_settings(&self) -> AccountSettings {
        AccountSettings { claim_rewards: self.schedule.claim_rewards, drain: self.drain_settings() }
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.cycle_interval_secs)
    }
}
