//! Notpixel - library for a multi-account repaint bot
//!
//! This library provides functionality to:
//! - Quantize a reference image against the canvas palette
//! - Plan which canvas cells to paint for an account's template
//! - Spend paint charges across many accounts without painting a cell twice
//! - Run the whole thing as a cycle under a bounded concurrency limit

pub mod account;
pub mod analyze;
pub mod api;
pub mod cli;
pub mod color;
pub mod config;
pub mod cycle;
pub mod executor;
pub mod ledger;
pub mod logging;
pub mod palette;
pub mod plan;
pub mod profiles;
pub mod schedule;
pub mod session;
