//! Log sink setup for node processes.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use wayfinder_core::ServiceError;

use crate::config::LoggingConfig;

/// Install the global fmt subscriber at the configured level.
///
/// Fails when the level does not parse. A subscriber installed earlier
/// (tests, embedding processes) is left in place.
pub fn init(config: &LoggingConfig) -> Result<(), ServiceError> {
    let level = config.level_filter()?;
    let installed = tracing_subscriber::registry()
        .with(level)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
    if installed.is_err() {
        tracing::debug!("global subscriber already installed");
    }
    Ok(())
}
