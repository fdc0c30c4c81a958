//! Log output setup.

use tracing_subscriber::filter::{LevelFilter, ParseError};
use tracing_subscriber::EnvFilter;

/// Build the log filter. An explicit `level` (a level name or a full
/// directive string) wins over `RUST_LOG`; without either, `info`.
pub fn filter(level: Option<&str>) -> Result<EnvFilter, ParseError> {
    match level {
        Some(directives) => EnvFilter::builder().parse(directives),
        None => Ok(EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy()),
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(level: Option<&str>) -> Result<(), ParseError> {
    let filter = filter(level)?;
    // already installed when called twice (e.g. from tests)
    let _ = tracing_subscriber::fmt::fmt().with_env_filter(filter).with_target(false).try_init();
    Ok(())
}
